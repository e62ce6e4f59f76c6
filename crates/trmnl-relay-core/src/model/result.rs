// ── Send outcomes ──

use std::time::Duration;

use serde::{Serialize, Serializer};

use super::device::{BackendKind, DeviceId};
use super::request::Operation;
use crate::error::{CoreError, ErrorKind};

/// Lifecycle of one request.
///
/// `Received -> Validated -> (Admitted | Denied) -> (Success | Failed)`.
/// A request may also fail straight out of `Received` or `Validated`
/// (bad input, unknown device, unusable client).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestState {
    Received,
    Validated,
    Admitted,
    Denied,
    Success,
    Failed,
}

impl RequestState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Denied | Self::Success | Self::Failed)
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Received, Self::Validated | Self::Failed)
                | (Self::Validated, Self::Admitted | Self::Denied | Self::Failed)
                | (Self::Admitted, Self::Success | Self::Failed)
        )
    }
}

/// What the backend told us about an accepted delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryMetadata {
    /// Refresh interval the backend assigned, in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

/// Uniform outcome of a dispatched request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SendResult {
    pub device_id: DeviceId,
    pub operation: Operation,
    pub success: bool,
    pub state: RequestState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CoreError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "opt_secs"
    )]
    pub retry_after: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DeliveryMetadata>,
}

impl SendResult {
    pub fn delivered(device_id: DeviceId, operation: Operation, metadata: DeliveryMetadata) -> Self {
        Self {
            device_id,
            operation,
            success: true,
            state: RequestState::Success,
            error: None,
            error_kind: None,
            retry_after: None,
            metadata: Some(metadata),
        }
    }

    /// Rate-limited before any delivery attempt.
    pub fn denied(device_id: DeviceId, operation: Operation, retry_after: Duration) -> Self {
        let error = CoreError::RateLimited {
            device_id: device_id.to_string(),
            retry_after,
        };
        Self {
            device_id,
            operation,
            success: false,
            state: RequestState::Denied,
            error_kind: Some(error.kind()),
            error: Some(error),
            retry_after: Some(retry_after),
            metadata: None,
        }
    }

    pub fn failed(device_id: DeviceId, operation: Operation, error: CoreError) -> Self {
        Self {
            device_id,
            operation,
            success: false,
            state: RequestState::Failed,
            error_kind: Some(error.kind()),
            retry_after: error.retry_after(),
            error: Some(error),
            metadata: None,
        }
    }
}

#[allow(clippy::ref_option)]
fn opt_secs<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    match d {
        Some(d) => s.serialize_some(&d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

/// Snapshot of what a device is showing (or will fetch next).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceStatus {
    pub device_id: DeviceId,
    pub backend: BackendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_rate: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_uuid: Option<String>,
}
