// ── Device identity and configuration ──
//
// A `DeviceConfig` is built by the caller (CLI, config loader) and handed
// to the dispatcher. Core never reads config files.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use trmnl_relay_api::{AuthScheme, CLOUD_BASE_URL, TlsMode, TransportConfig};

use crate::error::CoreError;

/// Requests per window on the standard cloud plan.
pub const DEFAULT_QUOTA: i64 = 12;
/// Requests per window on the premium cloud plan.
pub const PREMIUM_QUOTA: i64 = 30;
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ── DeviceId ────────────────────────────────────────────────────────

/// Stable device identifier.
///
/// MAC-like ids (`aa-bb-cc-dd-ee-ff`, `aabbccddeeff`, ...) are normalized
/// to upper-case colon form (`AA:BB:CC:DD:EE:FF`) so the same device
/// always maps to the same rate-limit window. Anything else is kept
/// verbatim apart from surrounding whitespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(raw: impl AsRef<str>) -> Self {
        let raw = raw.as_ref().trim();
        Self(normalize_mac(raw).unwrap_or_else(|| raw.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn normalize_mac(raw: &str) -> Option<String> {
    let hex: String = raw
        .chars()
        .filter(|c| !matches!(c, ':' | '-' | '.'))
        .collect();
    let separators = raw.len() - hex.len();
    if hex.len() != 12
        || !hex.chars().all(|c| c.is_ascii_hexdigit())
        || !matches!(separators, 0 | 2 | 5)
    {
        return None;
    }

    let upper = hex.to_ascii_uppercase();
    let pairs: Vec<&str> = (0..6).filter_map(|i| upper.get(i * 2..i * 2 + 2)).collect();
    Some(pairs.join(":"))
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id = Self::new(s);
        if id.is_empty() {
            return Err(CoreError::invalid("device_id", "must not be empty"));
        }
        Ok(id)
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

// ── BackendKind ─────────────────────────────────────────────────────

/// Which wire protocol a device speaks.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[strum(ascii_case_insensitive)]
pub enum BackendKind {
    /// usetrmnl.com private-plugin webhooks.
    #[serde(rename = "standard")]
    #[strum(to_string = "standard")]
    Standard,
    /// Terminus self-hosted server.
    #[serde(rename = "terminus")]
    #[strum(to_string = "terminus")]
    Terminus,
    /// Any other server speaking the BYOS display protocol.
    #[serde(rename = "generic_byos", alias = "generic")]
    #[strum(to_string = "generic_byos", serialize = "generic")]
    Generic,
}

impl BackendKind {
    /// Endpoint used when the device config leaves it unset.
    pub fn default_endpoint(self) -> Option<&'static str> {
        match self {
            Self::Standard => Some(CLOUD_BASE_URL),
            Self::Terminus | Self::Generic => None,
        }
    }

    pub fn auth_scheme(self) -> AuthScheme {
        match self {
            Self::Standard => AuthScheme::AccessToken,
            Self::Terminus | Self::Generic => AuthScheme::Bearer,
        }
    }
}

// ── Rate limit options ──────────────────────────────────────────────

/// Per-device limiter settings, re-read on every check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitOptions {
    /// Admitted requests per window. Zero or negative denies everything.
    pub quota: i64,
    pub window: Duration,
    /// Disabling is not recommended: the backend enforces its own limits.
    pub enabled: bool,
}

impl Default for RateLimitOptions {
    fn default() -> Self {
        Self {
            quota: DEFAULT_QUOTA,
            window: DEFAULT_WINDOW,
            enabled: true,
        }
    }
}

// ── TLS ─────────────────────────────────────────────────────────────

/// TLS verification strategy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(PathBuf),
    /// Skip verification (self-signed BYOS servers).
    DangerAcceptInvalid,
}

// ── DeviceConfig ────────────────────────────────────────────────────

/// Everything needed to talk to one device.
///
/// `backend` stays a raw string so an unknown kind surfaces as
/// [`CoreError::UnknownBackend`] from the factory instead of a parse
/// failure at load time.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub device_id: DeviceId,
    pub backend: String,
    pub api_key: Option<SecretString>,
    /// Overrides [`BackendKind::default_endpoint`]. Required for BYOS.
    pub api_endpoint: Option<String>,
    /// Private plugin uuid (standard backend), set by registration.
    pub plugin_uuid: Option<String>,
    pub rate_limit: RateLimitOptions,
    pub timeout: Duration,
    pub tls: TlsVerification,
}

impl DeviceConfig {
    pub fn new(device_id: impl Into<DeviceId>, backend: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            backend: backend.into(),
            api_key: None,
            api_endpoint: None,
            plugin_uuid: None,
            rate_limit: RateLimitOptions::default(),
            timeout: DEFAULT_TIMEOUT,
            tls: TlsVerification::default(),
        }
    }

    pub fn with_api_key(mut self, key: SecretString) -> Self {
        self.api_key = Some(key);
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.api_endpoint = Some(endpoint.into());
        self
    }

    pub fn with_plugin_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.plugin_uuid = Some(uuid.into());
        self
    }

    pub fn with_rate_limit(mut self, options: RateLimitOptions) -> Self {
        self.rate_limit = options;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_tls(mut self, tls: TlsVerification) -> Self {
        self.tls = tls;
        self
    }

    pub fn backend_kind(&self) -> Result<BackendKind, CoreError> {
        self.backend
            .trim()
            .parse()
            .map_err(|_| CoreError::UnknownBackend {
                backend: self.backend.clone(),
            })
    }

    /// Resolved base URL for this device's backend.
    pub fn endpoint(&self) -> Result<String, CoreError> {
        if let Some(url) = self.api_endpoint.as_deref().filter(|u| !u.trim().is_empty()) {
            return Ok(url.trim().to_owned());
        }
        let kind = self.backend_kind()?;
        kind.default_endpoint()
            .map(str::to_owned)
            .ok_or_else(|| CoreError::Config {
                message: format!("{kind} device {} needs an api_endpoint", self.device_id),
            })
    }

    /// HTTP transport settings derived from timeout and TLS mode.
    pub fn transport(&self) -> TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => TlsMode::System,
            TlsVerification::CustomCa(path) => TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => TlsMode::DangerAcceptInvalid,
        };
        TransportConfig::new(self.timeout).with_tls(tls)
    }
}
