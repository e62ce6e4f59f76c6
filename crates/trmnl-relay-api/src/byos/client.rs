// Async HTTP client for self-hosted TRMNL servers (Terminus and friends).
//
// BYOS servers expose the device-facing `/api/display` endpoint; POSTing
// to it changes what the device fetches next. Requests carry the `ID`
// header and, when a key is configured, a bearer token.

use reqwest::header::CONTENT_TYPE;
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};
use url::Url;

use super::models::{DisplayAck, DisplayStatus, DisplayUpdate};
use crate::auth::AuthScheme;
use crate::error::Error;
use crate::response::{decode, handle_empty, handle_response, normalize_base_url, parse_error};
use crate::transport::TransportConfig;

const DISPLAY_PATH: &str = "api/display";
const SETUP_PATH: &str = "api/setup";

/// Raw HTTP client for a BYOS server.
pub struct ByosClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ByosClient {
    pub fn new(
        base_url: &str,
        device_id: &str,
        key: Option<&SecretString>,
        scheme: AuthScheme,
        transport: &TransportConfig,
    ) -> Result<Self, Error> {
        let headers = scheme.headers(device_id, key)?;
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

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn url(&self, path: &str) -> Result<Url, Error> {
        Ok(self.base_url.join(path)?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, Error> {
        let url = self.url(path)?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        handle_response(resp).await
    }

    async fn send_display(&self, update: &DisplayUpdate) -> Result<reqwest::Response, Error> {
        let url = self.url(DISPLAY_PATH)?;
        debug!("POST {url}");
        trace!(?update, "display update");

        Ok(self.http.post(url).json(update).send().await?)
    }

    // ── Display ──────────────────────────────────────────────────────

    /// Push a display update and decode the acknowledgement.
    ///
    /// A body is decoded when the server labels it JSON or sends anything
    /// at all; an undecodable body is an error. An empty non-JSON body is
    /// an empty acknowledgement.
    pub async fn post_display(&self, update: &DisplayUpdate) -> Result<DisplayAck, Error> {
        let resp = self.send_display(update).await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(parse_error(status, resp).await);
        }

        let is_json = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));
        let body = resp.text().await?;

        if body.trim().is_empty() && !is_json {
            return Ok(DisplayAck::default());
        }
        decode(&body)
    }

    /// Push a display update; any 2xx is success and the body is ignored.
    pub async fn post_display_unchecked(&self, update: &DisplayUpdate) -> Result<(), Error> {
        let resp = self.send_display(update).await?;
        handle_empty(resp).await
    }

    /// What the device will fetch next (`GET /api/display`).
    pub async fn display_status(&self) -> Result<DisplayStatus, Error> {
        self.get(DISPLAY_PATH).await
    }

    /// Reachability check (`GET /api/setup`); any 2xx passes.
    pub async fn check_setup(&self) -> Result<(), Error> {
        let url = self.url(SETUP_PATH)?;
        debug!("GET {url}");

        let resp = self.http.get(url).send().await?;
        handle_empty(resp).await
    }
}
