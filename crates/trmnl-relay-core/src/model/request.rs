// ── Send requests ──
//
// `Payload` is what a caller asked for, as loosely typed as the service
// call that carried it. `ValidatedPayload` is the same request after
// `validate::payload`, built from newtypes that cannot hold bad values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use super::device::DeviceId;
use crate::error::CoreError;
use crate::validate;

// ── Merge strategy ──────────────────────────────────────────────────

/// How the backend combines new variables with the ones it holds.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MergeStrategy {
    /// Recursive key-wise merge.
    #[default]
    DeepMerge,
    /// Append/replace as a sequence.
    Stream,
}

// ── Validated newtypes ──────────────────────────────────────────────

/// Absolute http(s) URL of an image the device should display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUrl(Url);

impl ImageUrl {
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        validate::image_url(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for ImageUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0.as_str())
    }
}

impl FromStr for ImageUrl {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Positive refresh interval in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RefreshRate(u32);

impl RefreshRate {
    pub fn new(seconds: i64) -> Result<Self, CoreError> {
        validate::refresh_rate(seconds).map(Self)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

/// JSON object of template variables (nested values allowed).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Variables(Map<String, Value>);

impl Variables {
    pub fn from_value(value: &Value) -> Result<Self, CoreError> {
        validate::variables(value).map(|m| Self(m.clone()))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Payloads ────────────────────────────────────────────────────────

/// Unvalidated request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Payload {
    Image {
        image_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refresh_rate: Option<i64>,
    },
    Variables {
        variables: Value,
        /// Kept raw so an unknown strategy fails validation, not parsing.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        merge_strategy: Option<String>,
    },
}

impl Payload {
    pub fn operation(&self) -> Operation {
        match self {
            Self::Image { .. } => Operation::SendImage,
            Self::Variables { .. } => Operation::SendMergeVariables,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedPayload {
    Image {
        image_url: ImageUrl,
        refresh_rate: Option<RefreshRate>,
    },
    Variables {
        variables: Variables,
        merge_strategy: MergeStrategy,
    },
}

/// Which caller-facing operation produced a request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operation {
    SendImage,
    SendMergeVariables,
}

/// One service call: a device and what to send it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendRequest {
    pub device_id: DeviceId,
    #[serde(flatten)]
    pub payload: Payload,
}

impl SendRequest {
    pub fn image(
        device_id: impl Into<DeviceId>,
        image_url: impl Into<String>,
        refresh_rate: Option<i64>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            payload: Payload::Image {
                image_url: image_url.into(),
                refresh_rate,
            },
        }
    }

    pub fn variables(
        device_id: impl Into<DeviceId>,
        variables: Value,
        merge_strategy: Option<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            payload: Payload::Variables {
                variables,
                merge_strategy,
            },
        }
    }

    pub fn operation(&self) -> Operation {
        self.payload.operation()
    }
}

// ── Service-call parameters ─────────────────────────────────────────

/// Parameters of the `send_image` service call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendImageParams {
    pub device_id: String,
    pub image_url: String,
    #[serde(default)]
    pub refresh_rate: Option<i64>,
}

/// Parameters of the `send_merge_variables` service call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMergeVariablesParams {
    pub device_id: String,
    pub variables: Value,
    /// Defaults to `deep_merge`.
    #[serde(default)]
    pub merge_strategy: Option<String>,
}

impl From<SendImageParams> for SendRequest {
    fn from(p: SendImageParams) -> Self {
        Self::image(p.device_id, p.image_url, p.refresh_rate)
    }
}

impl From<SendMergeVariablesParams> for SendRequest {
    fn from(p: SendMergeVariablesParams) -> Self {
        Self::variables(p.device_id, p.variables, p.merge_strategy)
    }
}
