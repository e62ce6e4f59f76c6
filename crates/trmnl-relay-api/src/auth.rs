use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// Device identity header understood by every TRMNL-compatible backend.
pub const DEVICE_ID_HEADER: &str = "ID";

/// Account token header used by the cloud API.
pub const ACCESS_TOKEN_HEADER: &str = "Access-Token";

/// How a client presents its credentials on every request.
///
/// Marker enum (no data) -- the secrets are passed alongside when the
/// headers are built, so this can be copied around and logged freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// `ID` plus `Access-Token` (usetrmnl.com account API).
    AccessToken,
    /// `ID` plus `Authorization: Bearer` (Terminus and other BYOS servers).
    Bearer,
}

impl AuthScheme {
    /// Build the default header map for this scheme.
    ///
    /// The key header is omitted when no key is configured; the device id
    /// header is always sent. Secret values are marked sensitive so they
    /// never show up in reqwest's debug output.
    pub fn headers(self, device_id: &str, key: Option<&SecretString>) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("id"),
            HeaderValue::from_str(device_id).map_err(|e| Error::InvalidCredentials {
                message: format!("invalid device id header value: {e}"),
            })?,
        );

        let Some(key) = key.filter(|k| !k.expose_secret().is_empty()) else {
            return Ok(headers);
        };

        let (name, raw) = match self {
            Self::AccessToken => (
                HeaderName::from_static("access-token"),
                key.expose_secret().to_owned(),
            ),
            Self::Bearer => (AUTHORIZATION, format!("Bearer {}", key.expose_secret())),
        };
        let mut value = HeaderValue::from_str(&raw).map_err(|e| Error::InvalidCredentials {
            message: format!("invalid API key header value: {e}"),
        })?;
        value.set_sensitive(true);
        headers.insert(name, value);

        Ok(headers)
    }
}
