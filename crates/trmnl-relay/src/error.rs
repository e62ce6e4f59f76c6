//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and a stable exit code per outcome class.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

use trmnl_relay_config::ConfigError;
use trmnl_relay_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const RATE_LIMITED: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Rate limiting ────────────────────────────────────────────────
    #[error("Rate limit reached for {device}")]
    #[diagnostic(
        code(trmnl_relay::rate_limited),
        help(
            "Next slot opens in {wait} (at {at}).\n\
             The limiter mirrors the backend's own quota; --no-rate-limit skips it\n\
             but the backend may then reject the request."
        )
    )]
    RateLimited {
        device: String,
        wait: String,
        at: String,
    },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the backend: {message}")]
    #[diagnostic(
        code(trmnl_relay::connection_failed),
        help("Check api_endpoint in your profile and that the server is running.")
    )]
    ConnectionFailed { message: String },

    #[error("Request timed out: {message}")]
    #[diagnostic(
        code(trmnl_relay::timeout),
        help("Increase the timeout with --timeout or check backend responsiveness.")
    )]
    Timeout { message: String },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed (HTTP {status})")]
    #[diagnostic(
        code(trmnl_relay::auth_failed),
        help(
            "Verify the API key for this device.\n\
             Run: trmnl-relay config set-key"
        )
    )]
    AuthFailed { status: u16 },

    #[error("No API key configured for device '{profile}'")]
    #[diagnostic(
        code(trmnl_relay::no_credentials),
        help(
            "Store one with: trmnl-relay config set-key --profile {profile}\n\
             Or set api_key_env in the profile, or pass --api-key."
        )
    )]
    NoCredentials { profile: String },

    #[error("Device {device} has no private plugin registered")]
    #[diagnostic(
        code(trmnl_relay::not_registered),
        help("Run: trmnl-relay register --device <profile>")
    )]
    NotRegistered { device: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(trmnl_relay::not_found),
        help("Run: trmnl-relay {list_command} to see what is available")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Backend ──────────────────────────────────────────────────────
    #[error("Backend rejected request (HTTP {status}): {message}")]
    #[diagnostic(code(trmnl_relay::api_error))]
    Api { status: u16, message: String },

    #[error("Unexpected response from backend: {message}")]
    #[diagnostic(
        code(trmnl_relay::protocol),
        help("Check that the backend kind in your profile matches the server.")
    )]
    Protocol { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(trmnl_relay::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("No devices configured")]
    #[diagnostic(
        code(trmnl_relay::no_config),
        help(
            "Create one with: trmnl-relay config init\n\
             Expected at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Device profile '{name}' not found in configuration")]
    #[diagnostic(
        code(trmnl_relay::profile_not_found),
        help("Run: trmnl-relay devices to list configured profiles")
    )]
    ProfileNotFound { name: String },

    #[error("{message}")]
    #[diagnostic(code(trmnl_relay::config))]
    Config { message: String },

    // ── Batch ────────────────────────────────────────────────────────
    #[error("{failed} of {total} requests failed")]
    #[diagnostic(code(trmnl_relay::batch))]
    BatchFailed { failed: usize, total: usize },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    #[diagnostic(code(trmnl_relay::json), help("Check the JSON contents and try again."))]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML: {0}")]
    #[diagnostic(code(trmnl_relay::yaml))]
    Yaml(#[from] serde_yaml::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::RateLimited { .. } => exit_code::RATE_LIMITED,
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } | Self::ProfileNotFound { .. } => exit_code::NOT_FOUND,
            Self::Validation { .. } | Self::Json(_) | Self::Yaml(_) => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn rate_limited(device: String, retry_after: Duration) -> Self {
        let wait = humantime::format_duration(Duration::from_secs(
            retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0),
        ))
        .to_string();
        let at = chrono::TimeDelta::from_std(retry_after)
            .ok()
            .and_then(|delta| chrono::Local::now().checked_add_signed(delta))
            .map_or_else(|| "-".into(), |t| t.format("%H:%M:%S").to_string());
        Self::RateLimited { device, wait, at }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidArgument { field, reason } => Self::Validation { field, reason },

            CoreError::RateLimited {
                device_id,
                retry_after,
            } => Self::rate_limited(device_id, retry_after),

            CoreError::NotRegistered { device_id } => Self::NotRegistered { device: device_id },

            CoreError::Transport {
                message,
                timed_out: true,
            } => Self::Timeout { message },

            CoreError::Transport { message, .. } => Self::ConnectionFailed { message },

            CoreError::Backend {
                status: status @ (401 | 403),
                ..
            } => Self::AuthFailed { status },

            CoreError::Backend {
                status, message, ..
            } => Self::Api { status, message },

            CoreError::Protocol { message } => Self::Protocol { message },

            CoreError::UnknownBackend { backend } => Self::Validation {
                field: "backend".into(),
                reason: format!(
                    "unknown backend '{backend}', expected standard, terminus or generic_byos"
                ),
            },

            CoreError::DeviceNotFound { device_id } => Self::NotFound {
                resource_type: "device".into(),
                identifier: device_id,
                list_command: "devices".into(),
            },

            CoreError::Config { message } => Self::Config { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::UnknownDevice { name } => Self::ProfileNotFound { name },
            ConfigError::NoDevices => Self::NoConfig {
                path: trmnl_relay_config::config_path().display().to_string(),
            },
            ConfigError::NoDefaultDevice => Self::Validation {
                field: "device".into(),
                reason: "several devices are configured; pass --device or set default_device"
                    .into(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config {
                message: other.to_string(),
            },
        }
    }
}
