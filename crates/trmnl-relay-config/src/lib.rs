//! Configuration for trmnl-relay.
//!
//! TOML device profiles, credential resolution (env + keyring +
//! plaintext), and translation to `trmnl_relay_core::DeviceConfig`.
//! The CLI layers its global flags on top.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use trmnl_relay_core::{
    BackendKind, DEFAULT_QUOTA, DEFAULT_WINDOW, DeviceConfig, PREMIUM_QUOTA, RateLimitOptions,
    TlsVerification,
};

/// Keyring service name; entries are `{profile}/api-key`.
pub const KEYRING_SERVICE: &str = "trmnl-relay";

/// Environment prefix for overrides (`TRMNL_DEFAULTS__TIMEOUT=10`).
pub const ENV_PREFIX: &str = "TRMNL_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no API key configured for device '{profile}'")]
    NoCredentials { profile: String },

    #[error("no device named '{name}' in config")]
    UnknownDevice { name: String },

    #[error("no devices configured")]
    NoDevices,

    #[error("several devices configured and no default_device set")]
    NoDefaultDevice,

    #[error("keyring error: {0}")]
    Keyring(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Profile used when `--device` is not given.
    pub default_device: Option<String>,

    #[serde(default)]
    pub defaults: Defaults,

    /// Named device profiles.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceProfile>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_timeout")]
    pub timeout: u64,

    #[serde(default = "default_quota")]
    pub quota: i64,

    #[serde(default = "default_window")]
    pub window_seconds: u64,

    #[serde(default = "default_true")]
    pub enable_rate_limiting: bool,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            timeout: default_timeout(),
            quota: default_quota(),
            window_seconds: default_window(),
            enable_rate_limiting: true,
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_quota() -> i64 {
    DEFAULT_QUOTA
}
fn default_window() -> u64 {
    DEFAULT_WINDOW.as_secs()
}
fn default_true() -> bool {
    true
}

/// One configured display.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceProfile {
    /// Device id, usually the MAC address.
    pub device_id: String,

    /// `standard`, `terminus` or `generic_byos`.
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Base URL; defaults to usetrmnl.com for the standard backend.
    pub api_endpoint: Option<String>,

    /// API key (plaintext, prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Private plugin uuid from `register`.
    pub plugin_uuid: Option<String>,

    /// Premium plan: 30 requests per window instead of 12.
    pub premium: Option<bool>,

    pub quota: Option<i64>,
    pub window_seconds: Option<u64>,
    pub enable_rate_limiting: Option<bool>,
    pub timeout: Option<u64>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept self-signed certificates.
    pub insecure: Option<bool>,
}

fn default_backend() -> String {
    BackendKind::Standard.to_string()
}

impl DeviceProfile {
    pub fn new(device_id: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            device_id: device_id.into(),
            backend: backend.to_string(),
            api_endpoint: None,
            api_key: None,
            api_key_env: None,
            plugin_uuid: None,
            premium: None,
            quota: None,
            window_seconds: None,
            enable_rate_limiting: None,
            timeout: None,
            ca_cert: None,
            insecure: None,
        }
    }
}

impl Config {
    /// Pick a profile: explicit name, then `default_device`, then the
    /// only configured device.
    pub fn select(&self, name: Option<&str>) -> Result<(&str, &DeviceProfile), ConfigError> {
        let name = match name.or(self.default_device.as_deref()) {
            Some(n) => n,
            None => match self.devices.len() {
                0 => return Err(ConfigError::NoDevices),
                1 => self.devices.keys().next().map_or("", String::as_str),
                _ => return Err(ConfigError::NoDefaultDevice),
            },
        };
        self.devices
            .get_key_value(name)
            .map(|(k, v)| (k.as_str(), v))
            .ok_or_else(|| ConfigError::UnknownDevice { name: name.into() })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "trmnl-relay", "trmnl-relay").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("trmnl-relay");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load from an explicit file + environment. A missing file is empty.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to pretty TOML, creating the parent directory.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{profile_name}/api-key"))
}

/// Resolve an API key: env var named by `api_key_env`, then the system
/// keyring, then plaintext `api_key`.
pub fn resolve_api_key(
    profile: &DeviceProfile,
    profile_name: &str,
) -> Result<SecretString, ConfigError> {
    // 1. Profile's api_key_env → env var lookup
    if let Some(val) = profile
        .api_key_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
        .filter(|v| !v.is_empty())
    {
        return Ok(SecretString::from(val));
    }

    // 2. System keyring
    if let Some(secret) = keyring_entry(profile_name)
        .ok()
        .and_then(|entry| entry.get_password().ok())
    {
        return Ok(SecretString::from(secret));
    }

    // 3. Plaintext in config
    if let Some(key) = profile.api_key.as_ref().filter(|k| !k.is_empty()) {
        return Ok(SecretString::from(key.clone()));
    }

    Err(ConfigError::NoCredentials {
        profile: profile_name.into(),
    })
}

/// Store an API key in the system keyring.
pub fn store_api_key(profile_name: &str, key: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)
        .and_then(|entry| entry.set_password(key))
        .map_err(|e| ConfigError::Keyring(e.to_string()))
}

// ── Translation to core ─────────────────────────────────────────────

/// Build a `DeviceConfig` from a profile and the global defaults.
///
/// The standard backend needs an API key; BYOS backends send one only
/// if configured.
pub fn profile_to_device_config(
    profile: &DeviceProfile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<DeviceConfig, ConfigError> {
    let backend: BackendKind =
        profile
            .backend
            .trim()
            .parse()
            .map_err(|_| ConfigError::Validation {
                field: "backend".into(),
                reason: format!(
                    "expected 'standard', 'terminus' or 'generic_byos', got '{}'",
                    profile.backend
                ),
            })?;

    if profile.device_id.trim().is_empty() {
        return Err(ConfigError::Validation {
            field: "device_id".into(),
            reason: "must not be empty".into(),
        });
    }

    if let Some(endpoint) = &profile.api_endpoint {
        url::Url::parse(endpoint).map_err(|_| ConfigError::Validation {
            field: "api_endpoint".into(),
            reason: format!("invalid URL: {endpoint}"),
        })?;
    } else if backend.default_endpoint().is_none() {
        return Err(ConfigError::Validation {
            field: "api_endpoint".into(),
            reason: format!("required for the {backend} backend"),
        });
    }

    let api_key = match resolve_api_key(profile, profile_name) {
        Ok(key) => Some(key),
        Err(ConfigError::NoCredentials { .. }) if backend != BackendKind::Standard => None,
        Err(e) => return Err(e),
    };

    let tls = if profile.insecure.unwrap_or(false) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ca_path) = &profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let plan_quota = if profile.premium.unwrap_or(false) {
        PREMIUM_QUOTA
    } else {
        defaults.quota
    };
    let rate_limit = RateLimitOptions {
        quota: profile.quota.unwrap_or(plan_quota),
        window: Duration::from_secs(profile.window_seconds.unwrap_or(defaults.window_seconds)),
        enabled: profile
            .enable_rate_limiting
            .unwrap_or(defaults.enable_rate_limiting),
    };

    let mut config = DeviceConfig::new(profile.device_id.as_str(), backend.to_string())
        .with_rate_limit(rate_limit)
        .with_timeout(Duration::from_secs(
            profile.timeout.unwrap_or(defaults.timeout),
        ))
        .with_tls(tls);
    config.api_key = api_key;
    config.api_endpoint.clone_from(&profile.api_endpoint);
    config.plugin_uuid.clone_from(&profile.plugin_uuid);
    Ok(config)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    fn byos_profile() -> DeviceProfile {
        DeviceProfile {
            api_endpoint: Some("http://terminus.local:2300".into()),
            ..DeviceProfile::new("aa-bb-cc-dd-ee-ff", BackendKind::Terminus)
        }
    }

    #[test]
    fn round_trips_through_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");

        let mut cfg = Config {
            default_device: Some("office".into()),
            ..Config::default()
        };
        let mut office = DeviceProfile::new("AA:BB:CC:DD:EE:FF", BackendKind::Standard);
        office.api_key_env = Some("OFFICE_KEY".into());
        office.plugin_uuid = Some("plug-1".into());
        cfg.devices.insert("office".into(), office);
        cfg.devices.insert("kitchen".into(), byos_profile());

        save_config_to(&cfg, &path).unwrap();
        let loaded = load_config_from(&path).unwrap();

        assert_eq!(loaded.default_device.as_deref(), Some("office"));
        assert_eq!(loaded.devices.len(), 2);
        assert_eq!(loaded.devices["office"].plugin_uuid.as_deref(), Some("plug-1"));
        assert_eq!(loaded.devices["kitchen"].backend, "terminus");
        assert_eq!(loaded.defaults.quota, 12);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert!(cfg.devices.is_empty());
        assert_eq!(cfg.defaults.timeout, 30);
        assert_eq!(cfg.defaults.window_seconds, 3600);
        assert!(cfg.defaults.enable_rate_limiting);
    }

    #[test]
    fn parses_hand_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
default_device = "office"

[defaults]
quota = 20

[devices.office]
device_id = "aabbccddeeff"
api_key = "plain"
premium = true
"#,
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        let (name, profile) = cfg.select(None).unwrap();
        assert_eq!(name, "office");
        assert_eq!(profile.backend, "standard");
        assert_eq!(cfg.defaults.quota, 20);
        assert_eq!(cfg.defaults.timeout, 30);

        let device = profile_to_device_config(profile, name, &cfg.defaults).unwrap();
        assert_eq!(device.device_id.as_str(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(device.rate_limit.quota, PREMIUM_QUOTA);
        assert_eq!(device.api_key.unwrap().expose_secret(), "plain");
    }

    #[test]
    fn select_rules() {
        let mut cfg = Config::default();
        assert!(matches!(cfg.select(None), Err(ConfigError::NoDevices)));

        cfg.devices.insert("kitchen".into(), byos_profile());
        assert_eq!(cfg.select(None).unwrap().0, "kitchen");

        cfg.devices.insert("office".into(), byos_profile());
        assert!(matches!(cfg.select(None), Err(ConfigError::NoDefaultDevice)));
        assert_eq!(cfg.select(Some("office")).unwrap().0, "office");
        assert!(matches!(
            cfg.select(Some("garage")),
            Err(ConfigError::UnknownDevice { .. })
        ));
    }

    #[test]
    fn env_var_key_wins_over_plaintext() {
        let expected = std::env::var("PATH").unwrap();
        let mut profile = DeviceProfile::new("dev", BackendKind::Standard);
        profile.api_key_env = Some("PATH".into());
        profile.api_key = Some("plain".into());
        let key = resolve_api_key(&profile, "trmnl-relay-config-test").unwrap();
        assert_eq!(key.expose_secret(), expected);
    }

    #[test]
    fn standard_without_key_is_an_error() {
        let profile = DeviceProfile::new("dev", BackendKind::Standard);
        let err =
            profile_to_device_config(&profile, "no-such-profile-xyz", &Defaults::default())
                .unwrap_err();
        assert!(matches!(err, ConfigError::NoCredentials { .. }));
    }

    #[test]
    fn byos_profile_translation() {
        let mut profile = byos_profile();
        profile.quota = Some(0);
        profile.timeout = Some(5);
        profile.insecure = Some(true);

        let device =
            profile_to_device_config(&profile, "no-such-profile-xyz", &Defaults::default())
                .unwrap();
        assert_eq!(device.backend, "terminus");
        assert!(device.api_key.is_none());
        assert_eq!(device.rate_limit.quota, 0);
        assert_eq!(device.timeout, Duration::from_secs(5));
        assert_eq!(device.tls, TlsVerification::DangerAcceptInvalid);
        assert_eq!(device.api_endpoint.as_deref(), Some("http://terminus.local:2300"));
    }

    #[test]
    fn byos_without_endpoint_is_invalid() {
        let profile = DeviceProfile::new("dev", BackendKind::Generic);
        let err = profile_to_device_config(&profile, "x", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "api_endpoint"));
    }

    #[test]
    fn unknown_backend_is_invalid() {
        let mut profile = byos_profile();
        profile.backend = "byos2000".into();
        let err = profile_to_device_config(&profile, "x", &Defaults::default()).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "backend"));
    }
}
