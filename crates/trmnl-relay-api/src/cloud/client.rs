// Async HTTP client for the hosted TRMNL service (usetrmnl.com).
//
// Account endpoints (`/api/current_screen`, `/api/devices`, plugin
// creation) authenticate with `ID` + `Access-Token` default headers.
// Private-plugin webhooks (`/api/custom_plugins/{uuid}`) are addressed by
// the plugin uuid alone; the default headers ride along harmlessly.

use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::auth::AuthScheme;
use crate::error::Error;
use crate::response::{handle_response, handle_response_or_default, normalize_base_url};
use crate::transport::TransportConfig;

// ── Client ───────────────────────────────────────────────────────────

/// Raw HTTP client for the TRMNL cloud API.
///
/// Endpoint methods live in `plugins.rs` and `devices.rs`; this module
/// only owns URL construction and the HTTP verbs.
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
}

impl CloudClient {
    /// Build from a device id, account API key, and transport config.
    ///
    /// `base_url` is normally [`CLOUD_BASE_URL`](crate::CLOUD_BASE_URL);
    /// tests point it at a mock server.
    pub fn from_api_key(
        base_url: &str,
        device_id: &str,
        api_key: &SecretString,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let headers = AuthScheme::AccessToken.headers(device_id, Some(api_key))?;
        let http = transport.build_client_with_headers(headers)?;
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
        })
    }

    /// Wrap an existing `reqwest::Client` (caller manages auth headers).
    pub fn from_reqwest(base_url: &str, http: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            http,
            base_url: normalize_base_url(base_url)?,
        })
    }

    /// The service base URL (always ends in `/`).
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builder ──────────────────────────────────────────────────

    pub(crate) fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    // ── HTTP verbs ───────────────────────────────────────────────────

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        handle_response(resp).await
    }

    pub(crate) async fn post<T: DeserializeOwned + Default, B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("POST {url}");

        let resp = self.http.post(url).json(body).send().await?;
        handle_response_or_default(resp).await
    }
}
