//! Config command handlers.

use std::fmt::Write as _;

use dialoguer::{Input, Select};

use trmnl_relay_config::{Config, DeviceProfile, store_api_key};
use trmnl_relay_core::BackendKind;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::config;
use crate::error::CliError;
use crate::output;

// ── Helpers ─────────────────────────────────────────────────────────

/// Render config as TOML-ish text with secrets replaced by `****`.
fn format_config_redacted(cfg: &Config) -> String {
    let mut out = String::new();

    if let Some(default) = &cfg.default_device {
        let _ = writeln!(out, "default_device = \"{default}\"");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "[defaults]");
    let _ = writeln!(out, "output = \"{}\"", cfg.defaults.output);
    let _ = writeln!(out, "timeout = {}", cfg.defaults.timeout);
    let _ = writeln!(out, "quota = {}", cfg.defaults.quota);
    let _ = writeln!(out, "window_seconds = {}", cfg.defaults.window_seconds);
    let _ = writeln!(
        out,
        "enable_rate_limiting = {}",
        cfg.defaults.enable_rate_limiting
    );

    for (name, p) in &cfg.devices {
        let _ = writeln!(out);
        let _ = writeln!(out, "[devices.{name}]");
        let _ = writeln!(out, "device_id = \"{}\"", p.device_id);
        let _ = writeln!(out, "backend = \"{}\"", p.backend);
        if let Some(endpoint) = &p.api_endpoint {
            let _ = writeln!(out, "api_endpoint = \"{endpoint}\"");
        }
        if p.api_key.is_some() {
            let _ = writeln!(out, "api_key = \"****\"");
        }
        if let Some(env) = &p.api_key_env {
            let _ = writeln!(out, "api_key_env = \"{env}\"");
        }
        if let Some(uuid) = &p.plugin_uuid {
            let _ = writeln!(out, "plugin_uuid = \"{uuid}\"");
        }
        if let Some(premium) = p.premium {
            let _ = writeln!(out, "premium = {premium}");
        }
        if let Some(quota) = p.quota {
            let _ = writeln!(out, "quota = {quota}");
        }
        if let Some(window) = p.window_seconds {
            let _ = writeln!(out, "window_seconds = {window}");
        }
        if let Some(enabled) = p.enable_rate_limiting {
            let _ = writeln!(out, "enable_rate_limiting = {enabled}");
        }
        if let Some(timeout) = p.timeout {
            let _ = writeln!(out, "timeout = {timeout}");
        }
        if let Some(ca) = &p.ca_cert {
            let _ = writeln!(out, "ca_cert = \"{}\"", ca.display());
        }
        if let Some(insecure) = p.insecure {
            let _ = writeln!(out, "insecure = {insecure}");
        }
    }

    out
}

/// Structured view for json/yaml output, with the same redaction.
fn redacted(cfg: &Config) -> serde_json::Value {
    let mut value = serde_json::to_value(cfg).unwrap_or_default();
    if let Some(devices) = value
        .get_mut("devices")
        .and_then(serde_json::Value::as_object_mut)
    {
        for profile in devices.values_mut() {
            if let Some(key) = profile.get_mut("api_key").filter(|k| !k.is_null()) {
                *key = "****".into();
            }
        }
    }
    value
}

fn prompt_err(e: impl std::fmt::Display) -> CliError {
    CliError::Validation {
        field: "interactive".into(),
        reason: format!("prompt failed: {e}"),
    }
}

/// Store a key in the keyring, or hand it back for the config file.
fn prompt_key_storage(key: String, profile_name: &str) -> Result<Option<String>, CliError> {
    let choices = &[
        "Store in system keyring (recommended)",
        "Save to config file (plaintext)",
    ];
    let selection = Select::new()
        .with_prompt("Where to store the API key?")
        .items(choices)
        .default(0)
        .interact()
        .map_err(prompt_err)?;

    if selection == 0 {
        store_api_key(profile_name, &key)?;
        eprintln!("   ✓ API key stored in system keyring");
        Ok(None)
    } else {
        Ok(Some(key))
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init => init(global),

        ConfigCommand::Show => {
            let cfg = config::load(global)?;
            let out = match global.output {
                OutputFormat::Table => format_config_redacted(&cfg),
                _ => output::render_single(
                    &global.output,
                    &redacted(&cfg),
                    |_| String::new(),
                    |_| "config".into(),
                ),
            };
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            println!("{}", config::config_path(global).display());
            Ok(())
        }

        ConfigCommand::SetKey { profile } => {
            let cfg = config::load(global)?;
            let name = match profile.or_else(|| global.device.clone()) {
                Some(name) => name,
                None => config::select(global, &cfg)?.0.to_owned(),
            };
            if !cfg.devices.contains_key(&name) {
                return Err(CliError::ProfileNotFound { name });
            }

            let key = rpassword::prompt_password("API key: ").map_err(prompt_err)?;
            if key.is_empty() {
                return Err(CliError::Validation {
                    field: "api_key".into(),
                    reason: "API key cannot be empty".into(),
                });
            }
            store_api_key(&name, &key)?;
            eprintln!("✓ API key stored in system keyring for device '{name}'");
            Ok(())
        }
    }
}

/// Interactive wizard: adds one device profile to the config file.
fn init(global: &GlobalOpts) -> Result<(), CliError> {
    let path = config::config_path(global);
    eprintln!("trmnl-relay configuration wizard");
    eprintln!("   Config path: {}\n", path.display());

    let mut cfg = config::load(global)?;

    let profile_name: String = Input::new()
        .with_prompt("Profile name")
        .default("default".into())
        .interact_text()
        .map_err(prompt_err)?;

    let backends = [
        BackendKind::Standard,
        BackendKind::Terminus,
        BackendKind::Generic,
    ];
    let labels = &[
        "standard (usetrmnl.com private plugin)",
        "terminus (self-hosted Terminus server)",
        "generic_byos (other BYOS server)",
    ];
    let selection = Select::new()
        .with_prompt("Backend")
        .items(labels)
        .default(0)
        .interact()
        .map_err(prompt_err)?;
    let backend = backends.get(selection).copied().unwrap_or(BackendKind::Standard);

    let device_id: String = Input::new()
        .with_prompt("Device ID (MAC address)")
        .interact_text()
        .map_err(prompt_err)?;

    let mut profile = DeviceProfile::new(device_id, backend);

    if backend.default_endpoint().is_none() {
        let endpoint: String = Input::new()
            .with_prompt("Server URL")
            .default("http://localhost:2300".into())
            .interact_text()
            .map_err(prompt_err)?;
        profile.api_endpoint = Some(endpoint);
    }

    let key = rpassword::prompt_password(if backend == BackendKind::Standard {
        "API key: "
    } else {
        "API key (empty for none): "
    })
    .map_err(prompt_err)?;
    if key.is_empty() {
        if backend == BackendKind::Standard {
            return Err(CliError::Validation {
                field: "api_key".into(),
                reason: "the standard backend needs an API key".into(),
            });
        }
    } else {
        profile.api_key = prompt_key_storage(key, &profile_name)?;
    }

    cfg.devices.insert(profile_name.clone(), profile);
    if cfg.default_device.is_none() {
        cfg.default_device = Some(profile_name.clone());
    }
    config::save(global, &cfg)?;

    eprintln!("\n✓ Configuration written to {}", path.display());
    eprintln!("  Device profile: {profile_name}");
    if backend == BackendKind::Standard {
        eprintln!("\n  Next: trmnl-relay register --device {profile_name}");
    } else {
        eprintln!("\n  Test it: trmnl-relay status --device {profile_name}");
    }
    Ok(())
}
