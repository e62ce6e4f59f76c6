//! Device command handlers: register, status, devices.

use serde::Serialize;
use tabled::Tabled;

use trmnl_relay_core::{CloudDevice, DeviceStatus, LimiterStatus};

use crate::cli::{DevicesArgs, GlobalOpts};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output;
use crate::state;

// ── Register ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Registration {
    profile: String,
    device_id: String,
    plugin_uuid: String,
}

/// Create (or confirm) the private plugin and save its uuid to the profile.
pub async fn register(global: &GlobalOpts) -> Result<(), CliError> {
    let mut cfg = config::load(global)?;
    let (dispatcher, device) = config::single_device(global, &cfg)?;
    let profile_name = config::select(global, &cfg)?.0.to_owned();

    let uuid = dispatcher.register(&device.device_id).await?;

    let stale = cfg
        .devices
        .get_mut(&profile_name)
        .filter(|p| p.plugin_uuid.as_deref() != Some(uuid.as_str()));
    if let Some(profile) = stale {
        profile.plugin_uuid = Some(uuid.clone());
        config::save(global, &cfg)?;
        eprintln!("✓ Plugin uuid saved to profile '{profile_name}'");
    }

    let registration = Registration {
        profile: profile_name,
        device_id: device.device_id.to_string(),
        plugin_uuid: uuid,
    };
    let out = output::render_single(
        &global.output,
        &registration,
        |r| {
            format!(
                "Profile:     {}\nDevice:      {}\nPlugin uuid: {}",
                r.profile, r.device_id, r.plugin_uuid
            )
        },
        |r| r.plugin_uuid.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Status ──────────────────────────────────────────────────────────

#[derive(Serialize)]
struct StatusView {
    #[serde(flatten)]
    device: DeviceStatus,
    rate_limit: LimiterStatus,
}

fn status_detail(view: &StatusView) -> String {
    let d = &view.device;
    let rl = &view.rate_limit;
    let mut lines = vec![
        format!("Device:      {}", d.device_id),
        format!("Backend:     {}", d.backend),
        format!("Image:       {}", d.image_url.as_deref().unwrap_or("-")),
        format!("Filename:    {}", d.filename.as_deref().unwrap_or("-")),
        format!(
            "Refresh:     {}",
            d.refresh_rate.map_or_else(|| "-".into(), |r| format!("{r}s"))
        ),
    ];
    if let Some(uuid) = &d.plugin_uuid {
        lines.push(format!("Plugin uuid: {uuid}"));
    }
    if rl.enabled {
        lines.push(format!(
            "Rate limit:  {}/{} used per {}",
            rl.used,
            rl.quota,
            humantime::format_duration(rl.window)
        ));
        if !rl.wait.is_zero() {
            lines.push(format!(
                "Next slot:   in {}",
                humantime::format_duration(rl.wait)
            ));
        }
    } else {
        lines.push("Rate limit:  disabled".into());
    }
    lines.join("\n")
}

pub async fn status(global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let (dispatcher, device) = config::single_device(global, &cfg)?;
    // Read-only: restore, then release the lock straight away.
    drop(state::Session::open(global, &dispatcher));

    let view = StatusView {
        device: dispatcher.status(&device.device_id).await?,
        rate_limit: dispatcher.limiter_status(&device.device_id)?,
    };
    let out = output::render_single(&global.output, &view, status_detail, |v| {
        v.device.image_url.clone().unwrap_or_default()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Devices ─────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ProfileView {
    name: String,
    device_id: String,
    backend: String,
    api_endpoint: Option<String>,
    registered: bool,
    default: bool,
}

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "Profile")]
    name: String,
    #[tabled(rename = "Device ID")]
    device_id: String,
    #[tabled(rename = "Backend")]
    backend: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Registered")]
    registered: String,
}

impl From<&ProfileView> for ProfileRow {
    fn from(p: &ProfileView) -> Self {
        Self {
            name: if p.default {
                format!("{} *", p.name)
            } else {
                p.name.clone()
            },
            device_id: p.device_id.clone(),
            backend: p.backend.clone(),
            endpoint: p.api_endpoint.clone().unwrap_or_else(|| "-".into()),
            registered: if p.registered { "yes" } else { "-" }.into(),
        }
    }
}

fn profiles(cfg: &Config) -> Vec<ProfileView> {
    let default = cfg.default_device.as_deref();
    cfg.devices
        .iter()
        .map(|(name, p)| ProfileView {
            name: name.clone(),
            device_id: p.device_id.clone(),
            backend: p.backend.clone(),
            api_endpoint: p.api_endpoint.clone(),
            registered: p.plugin_uuid.is_some(),
            default: default == Some(name.as_str()),
        })
        .collect()
}

#[derive(Tabled)]
struct CloudRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Friendly ID")]
    friendly_id: String,
    #[tabled(rename = "MAC")]
    mac: String,
    #[tabled(rename = "Battery")]
    battery: String,
    #[tabled(rename = "RSSI")]
    rssi: String,
}

impl From<&CloudDevice> for CloudRow {
    fn from(d: &CloudDevice) -> Self {
        Self {
            name: d.name.clone().unwrap_or_default(),
            friendly_id: d.friendly_id.clone().unwrap_or_default(),
            mac: d.mac_address.clone().unwrap_or_default(),
            battery: d
                .battery_voltage
                .map_or_else(|| "-".into(), |v| format!("{v:.2}V")),
            rssi: d.rssi.map_or_else(|| "-".into(), |v| v.to_string()),
        }
    }
}

pub async fn devices(args: DevicesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;

    if args.remote {
        let (dispatcher, device) = config::single_device(global, &cfg)?;
        let devices = dispatcher.account_devices(&device.device_id).await?;
        let out = output::render_list(&global.output, &devices, |d| CloudRow::from(d), |d| {
            d.identifier().unwrap_or_default()
        });
        output::print_output(&out, global.quiet);
        return Ok(());
    }

    let views = profiles(&cfg);
    if views.is_empty() {
        eprintln!("No devices configured. Run: trmnl-relay config init");
        return Ok(());
    }
    let out = output::render_list(&global.output, &views, |p| ProfileRow::from(p), |p| {
        p.name.clone()
    });
    output::print_output(&out, global.quiet);
    Ok(())
}
