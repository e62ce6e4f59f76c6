// ── Core error types ──
//
// Delivery-facing errors from trmnl-relay-core. Consumers see a stable
// taxonomy rather than raw reqwest or serde failures; the
// `From<trmnl_relay_api::Error>` impl does the translation.

use std::time::Duration;

use serde::{Serialize, Serializer};
use thiserror::Error;

/// Unified error type for the core crate.
///
/// `Clone` + `Serialize` so a failure can be carried inside a
/// [`SendResult`](crate::SendResult) and rendered by callers.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CoreError {
    // ── Request errors ───────────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("Rate limit reached for {device_id}, retry in {}s", retry_after.as_secs())]
    RateLimited {
        device_id: String,
        #[serde(serialize_with = "as_secs")]
        retry_after: Duration,
    },

    #[error("Device {device_id} has no private plugin registered")]
    NotRegistered { device_id: String },

    // ── Delivery errors ──────────────────────────────────────────────
    #[error("Transport error: {message}")]
    Transport { message: String, timed_out: bool },

    #[error("Backend rejected request (HTTP {status}): {message}")]
    Backend {
        status: u16,
        message: String,
        body: String,
    },

    #[error("Unexpected response from backend: {message}")]
    Protocol { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Unknown backend kind: {backend}")]
    UnknownBackend { backend: String },

    #[error("Device not configured: {device_id}")]
    DeviceNotFound { device_id: String },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Field-less classification of a [`CoreError`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    InvalidArgument,
    RateLimited,
    NotRegistered,
    Transport,
    Backend,
    Protocol,
    UnknownBackend,
    DeviceNotFound,
    Config,
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::NotRegistered { .. } => ErrorKind::NotRegistered,
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Backend { .. } => ErrorKind::Backend,
            Self::Protocol { .. } => ErrorKind::Protocol,
            Self::UnknownBackend { .. } => ErrorKind::UnknownBackend,
            Self::DeviceNotFound { .. } => ErrorKind::DeviceNotFound,
            Self::Config { .. } => ErrorKind::Config,
        }
    }

    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }

    /// Wait time for a rate-limit denial.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Returns `true` if the backend rejected the device's credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Backend { status: 401 | 403, .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { timed_out: true, .. })
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn as_secs<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<trmnl_relay_api::Error> for CoreError {
    fn from(err: trmnl_relay_api::Error) -> Self {
        use trmnl_relay_api::Error as Api;

        match err {
            Api::Transport(ref e) => CoreError::Transport {
                message: err.to_string(),
                timed_out: e.is_timeout(),
            },
            Api::Timeout { timeout_secs } => CoreError::Transport {
                message: format!("request timed out after {timeout_secs}s"),
                timed_out: true,
            },
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("invalid endpoint URL: {e}"),
            },
            Api::Tls(message) | Api::InvalidCredentials { message } => {
                CoreError::Config { message }
            }
            Api::Backend {
                status,
                message,
                body,
            } => CoreError::Backend {
                status,
                message,
                body,
            },
            Api::Deserialization { message, body: _ } => CoreError::Protocol { message },
        }
    }
}
