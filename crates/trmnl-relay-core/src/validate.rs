// Request validation. Runs before the rate limiter so a malformed
// request never consumes quota.

use serde_json::{Map, Value};
use url::Url;

use crate::error::CoreError;
use crate::model::{ImageUrl, MergeStrategy, Payload, RefreshRate, ValidatedPayload, Variables};

pub fn image_url(raw: &str) -> Result<Url, CoreError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(CoreError::invalid("image_url", "must not be empty"));
    }
    let url = Url::parse(raw)
        .map_err(|e| CoreError::invalid("image_url", format!("{raw:?} is not an absolute URL ({e})")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::invalid(
            "image_url",
            format!("scheme {:?} is not http or https", url.scheme()),
        ));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(CoreError::invalid("image_url", "missing host"));
    }
    Ok(url)
}

pub fn refresh_rate(seconds: i64) -> Result<u32, CoreError> {
    if seconds <= 0 {
        return Err(CoreError::invalid(
            "refresh_rate",
            format!("must be a positive number of seconds, got {seconds}"),
        ));
    }
    u32::try_from(seconds)
        .map_err(|_| CoreError::invalid("refresh_rate", format!("{seconds} is too large")))
}

pub fn variables(value: &Value) -> Result<&Map<String, Value>, CoreError> {
    value.as_object().ok_or_else(|| {
        CoreError::invalid(
            "variables",
            format!("must be a JSON object, got {}", json_type(value)),
        )
    })
}

/// Absent means `deep_merge`.
pub fn merge_strategy(raw: Option<&str>) -> Result<MergeStrategy, CoreError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(MergeStrategy::default()),
        Some(s) => s.parse().map_err(|_| {
            CoreError::invalid(
                "merge_strategy",
                format!("{s:?} is not one of deep_merge, stream"),
            )
        }),
    }
}

pub fn payload(payload: &Payload) -> Result<ValidatedPayload, CoreError> {
    match payload {
        Payload::Image {
            image_url,
            refresh_rate,
        } => Ok(ValidatedPayload::Image {
            image_url: ImageUrl::parse(image_url)?,
            refresh_rate: refresh_rate.map(RefreshRate::new).transpose()?,
        }),
        Payload::Variables {
            variables,
            merge_strategy: strategy,
        } => Ok(ValidatedPayload::Variables {
            variables: Variables::from_value(variables)?,
            merge_strategy: merge_strategy(strategy.as_deref())?,
        }),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
