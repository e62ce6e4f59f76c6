//! Send command handlers: send-image, send-variables, batch.

use std::io::Read;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use trmnl_relay_core::{
    CoreError, DeviceId, Payload, SendImageParams, SendMergeVariablesParams, SendRequest,
    SendResult, ServiceDispatcher,
};

use crate::cli::{BatchArgs, GlobalOpts, OutputFormat, SendImageArgs, SendVariablesArgs};
use crate::config::{self, Config};
use crate::error::CliError;
use crate::output::{self, ResultRow};
use crate::state;

// ── Single sends ────────────────────────────────────────────────────

pub async fn image(args: SendImageArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let cfg = config::load(global)?;
    let (dispatcher, device) = config::single_device(global, &cfg)?;

    let params = SendImageParams {
        device_id: device.device_id.to_string(),
        image_url: args.url,
        refresh_rate: args.refresh_rate,
    };
    let result = with_state(global, &dispatcher, dispatcher.send_image(params)).await;
    report(&result, global)
}

pub async fn variables(args: SendVariablesArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let variables = parse_variables(&args.variables)?;
    let cfg = config::load(global)?;
    let (dispatcher, device) = config::single_device(global, &cfg)?;

    let params = SendMergeVariablesParams {
        device_id: device.device_id.to_string(),
        variables,
        merge_strategy: args.merge_strategy,
    };
    let result = with_state(global, &dispatcher, dispatcher.send_merge_variables(params)).await;
    report(&result, global)
}

/// Run a send with the persisted limiter window loaded around it.
async fn with_state<F>(global: &GlobalOpts, dispatcher: &ServiceDispatcher, send: F) -> F::Output
where
    F: Future,
{
    let session = state::Session::open(global, dispatcher);
    let out = send.await;
    session.persist(dispatcher);
    out
}

/// `{"k": 1}` inline, `@vars.json` from a file, `@-` from stdin.
fn parse_variables(raw: &str) -> Result<Value, CliError> {
    let text = match raw.strip_prefix('@') {
        Some(path) => read_source(Path::new(path))?,
        None => raw.to_owned(),
    };
    Ok(serde_json::from_str(&text)?)
}

fn read_source(path: &Path) -> Result<String, CliError> {
    if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        Ok(buf)
    } else {
        Ok(std::fs::read_to_string(path)?)
    }
}

fn detail(result: &SendResult) -> String {
    let mut lines = vec![
        format!("Device:    {}", result.device_id),
        format!("Operation: {}", result.operation),
        format!("State:     {}", result.state),
    ];
    if let Some(meta) = &result.metadata {
        if let Some(msg) = &meta.message {
            lines.push(format!("Message:   {msg}"));
        }
        if let Some(rate) = meta.refresh_rate {
            lines.push(format!("Refresh:   {rate}s"));
        }
        if let Some(url) = &meta.image_url {
            lines.push(format!("Image:     {url}"));
        }
    }
    lines.join("\n")
}

/// Print a delivered result; turn a failed one into the matching error.
///
/// Structured formats print failures too, so scripts always get a record.
fn report(result: &SendResult, global: &GlobalOpts) -> Result<(), CliError> {
    if result.success || global.output != OutputFormat::Table {
        let out = output::render_single(&global.output, result, detail, |r| r.state.to_string());
        output::print_output(&out, global.quiet);
    }
    match &result.error {
        Some(err) => Err(err.clone().into()),
        None => Ok(()),
    }
}

// ── Batch ───────────────────────────────────────────────────────────

/// One entry of a batch file.
///
/// `device` names a config profile, `device_id` a raw id; with neither
/// the active device is used.
#[derive(Debug, Deserialize)]
struct BatchEntry {
    #[serde(default)]
    device: Option<String>,
    #[serde(default)]
    device_id: Option<String>,
    #[serde(flatten)]
    payload: Payload,
}

fn parse_batch(path: &Path, text: &str) -> Result<Vec<BatchEntry>, CliError> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        Ok(serde_json::from_str(text)?)
    } else {
        Ok(serde_yaml::from_str(text)?)
    }
}

/// Resolve an entry's target device, or the failure to report for it.
fn resolve_target(
    entry: &BatchEntry,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<DeviceId, CoreError> {
    if let Some(name) = &entry.device {
        return cfg
            .devices
            .get(name)
            .map(|p| DeviceId::new(&p.device_id))
            .ok_or_else(|| CoreError::DeviceNotFound {
                device_id: name.clone(),
            });
    }
    if let Some(id) = &entry.device_id {
        return Ok(DeviceId::new(id));
    }
    config::select(global, cfg)
        .map(|(_, p)| DeviceId::new(&p.device_id))
        .map_err(|e| CoreError::Config {
            message: e.to_string(),
        })
}

pub async fn batch(args: BatchArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let text = read_source(&args.file)?;
    let entries = parse_batch(&args.file, &text)?;
    let cfg = config::load(global)?;
    let dispatcher = config::all_devices(global, &cfg);

    // Entries without a usable target fail up front; the rest go out
    // together and keep their position in the output.
    let mut results: Vec<Option<SendResult>> = Vec::with_capacity(entries.len());
    let mut requests = Vec::new();
    for entry in entries {
        match resolve_target(&entry, &cfg, global) {
            Ok(device_id) => {
                results.push(None);
                requests.push(SendRequest {
                    device_id,
                    payload: entry.payload,
                });
            }
            Err(e) => {
                let label = entry
                    .device
                    .or(entry.device_id)
                    .unwrap_or_else(|| "-".into());
                results.push(Some(SendResult::failed(
                    DeviceId::new(label),
                    entry.payload.operation(),
                    e,
                )));
            }
        }
    }
    debug!(requests = requests.len(), "dispatching batch");

    let mut sent = with_state(global, &dispatcher, dispatcher.dispatch_all(requests))
        .await
        .into_iter();
    let results: Vec<SendResult> = results
        .into_iter()
        .filter_map(|slot| slot.or_else(|| sent.next()))
        .collect();

    let color = output::should_color(&global.color);
    let out = output::render_list(
        &global.output,
        &results,
        |r| ResultRow::new(r, color),
        |r| format!("{}\t{}", r.device_id, r.state),
    );
    output::print_output(&out, global.quiet);

    let failed = results.iter().filter(|r| !r.success).count();
    if failed == 0 {
        Ok(())
    } else {
        Err(CliError::BatchFailed {
            failed,
            total: results.len(),
        })
    }
}
