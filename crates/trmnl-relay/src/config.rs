//! CLI configuration: a thin layer over `trmnl_relay_config`.
//!
//! Adds the `--config` path override and the global flag overrides
//! (`--api-key`, `--timeout`, `--no-rate-limit`) on top of the profiles.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use trmnl_relay_config::{ConfigError, DeviceProfile, profile_to_device_config};
use trmnl_relay_core::{DeviceConfig, RateLimitOptions, ServiceDispatcher};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use trmnl_relay_config::Config;

/// `--config` if given, else the platform path.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(trmnl_relay_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    Ok(trmnl_relay_config::load_config_from(&config_path(global))?)
}

pub fn save(global: &GlobalOpts, cfg: &Config) -> Result<(), CliError> {
    Ok(trmnl_relay_config::save_config_to(cfg, &config_path(global))?)
}

/// Pick the active profile: `--device`, then `default_device`, then the
/// only one configured.
pub fn select<'a>(
    global: &GlobalOpts,
    cfg: &'a Config,
) -> Result<(&'a str, &'a DeviceProfile), CliError> {
    cfg.select(global.device.as_deref()).map_err(|e| match e {
        ConfigError::NoDevices => CliError::NoConfig {
            path: config_path(global).display().to_string(),
        },
        other => other.into(),
    })
}

/// Translate a profile into a `DeviceConfig`, applying flag overrides.
pub fn device_config(
    global: &GlobalOpts,
    cfg: &Config,
    name: &str,
    profile: &DeviceProfile,
) -> Result<DeviceConfig, CliError> {
    let mut device = match profile_to_device_config(profile, name, &cfg.defaults) {
        Ok(device) => device,
        // The flag can stand in for a key that is configured nowhere.
        Err(ConfigError::NoCredentials { .. }) if global.api_key.is_some() => {
            let mut bare = profile.clone();
            bare.api_key = global.api_key.clone();
            profile_to_device_config(&bare, name, &cfg.defaults)?
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(key) = &global.api_key {
        device.api_key = Some(SecretString::from(key.clone()));
    }
    if let Some(secs) = global.timeout {
        device.timeout = Duration::from_secs(secs);
    }
    if global.no_rate_limit {
        device.rate_limit.enabled = false;
    }
    Ok(device)
}

fn limiter_defaults(global: &GlobalOpts, cfg: &Config) -> RateLimitOptions {
    RateLimitOptions {
        quota: cfg.defaults.quota,
        window: Duration::from_secs(cfg.defaults.window_seconds),
        enabled: cfg.defaults.enable_rate_limiting && !global.no_rate_limit,
    }
}

/// Dispatcher holding only the active device.
pub fn single_device(
    global: &GlobalOpts,
    cfg: &Config,
) -> Result<(ServiceDispatcher, DeviceConfig), CliError> {
    let (name, profile) = select(global, cfg)?;
    let device = device_config(global, cfg, name, profile)?;
    let dispatcher = ServiceDispatcher::with_rate_limit_defaults(limiter_defaults(global, cfg));
    dispatcher.add_device(device.clone())?;
    Ok((dispatcher, device))
}

/// Dispatcher holding every profile that resolves.
///
/// A broken profile is skipped with a warning; requests for it then fail
/// as "device not found" without affecting the others.
pub fn all_devices(global: &GlobalOpts, cfg: &Config) -> ServiceDispatcher {
    let dispatcher = ServiceDispatcher::with_rate_limit_defaults(limiter_defaults(global, cfg));
    for (name, profile) in &cfg.devices {
        let added = device_config(global, cfg, name, profile)
            .and_then(|device| dispatcher.add_device(device).map_err(CliError::from));
        if let Err(e) = added {
            warn!(profile = %name, error = %e, "skipping device profile");
        }
    }
    dispatcher
}
