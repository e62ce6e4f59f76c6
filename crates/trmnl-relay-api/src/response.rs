// Response decoding shared by the cloud and BYOS clients.
//
// Both protocols report failures the same way: a non-2xx status with an
// optional JSON body carrying `error` or `message`.

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::Error;

const ERROR_PREVIEW_LEN: usize = 200;

#[derive(serde::Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Parse the base URL and make sure `join` keeps any path prefix.
pub(crate) fn normalize_base_url(raw: &str) -> Result<Url, Error> {
    let mut url = Url::parse(raw)?;
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&format!("{path}/"));
    Ok(url)
}

/// Decode a 2xx JSON body into `T`, or turn a non-2xx into `Error::Backend`.
pub(crate) async fn handle_response<T: DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, Error> {
    let status = resp.status();
    if !status.is_success() {
        return Err(parse_error(status, resp).await);
    }
    let body = resp.text().await?;
    decode(&body)
}

/// Like [`handle_response`], but an empty 2xx body yields `T::default()`.
///
/// Webhook endpoints answer with either a small JSON acknowledgement or
/// nothing at all.
pub(crate) async fn handle_response_or_default<T: DeserializeOwned + Default>(
    resp: reqwest::Response,
) -> Result<T, Error> {
    let status = resp.status();
    if !status.is_success() {
        return Err(parse_error(status, resp).await);
    }
    let body = resp.text().await?;
    if body.trim().is_empty() {
        return Ok(T::default());
    }
    decode(&body)
}

/// Accept any 2xx regardless of body.
pub(crate) async fn handle_empty(resp: reqwest::Response) -> Result<(), Error> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(parse_error(status, resp).await)
    }
}

pub(crate) fn decode<T: DeserializeOwned>(body: &str) -> Result<T, Error> {
    serde_json::from_str(body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", preview(body)),
        body: body.to_owned(),
    })
}

pub(crate) async fn parse_error(status: StatusCode, resp: reqwest::Response) -> Error {
    let raw = resp.text().await.unwrap_or_default();

    let message = serde_json::from_str::<ErrorResponse>(&raw)
        .ok()
        .and_then(|e| e.error.or(e.message))
        .unwrap_or_else(|| {
            if raw.is_empty() {
                status.to_string()
            } else {
                preview(&raw).to_owned()
            }
        });

    Error::Backend {
        status: status.as_u16(),
        message,
        body: preview(&raw).to_owned(),
    }
}

fn preview(body: &str) -> &str {
    if body.len() <= ERROR_PREVIEW_LEN {
        return body;
    }
    let mut end = ERROR_PREVIEW_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
