//! Output formatting: table, JSON, YAML, plain.
//!
//! Table uses `tabled`, structured formats use serde, plain emits one
//! identifier per line.

use std::io::{self, IsTerminal, Write};

use owo_colors::OwoColorize;
use tabled::{Table, Tabled, settings::Style};

use trmnl_relay_core::{RequestState, SendResult};

use crate::cli::{ColorMode, OutputFormat};

// ── Color helpers ────────────────────────────────────────────────────

pub fn should_color(mode: &ColorMode) -> bool {
    match mode {
        ColorMode::Always => true,
        ColorMode::Never => false,
        ColorMode::Auto => io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err(),
    }
}

/// Request state label, colored by outcome.
pub fn paint_state(state: RequestState, color: bool) -> String {
    let label = state.to_string();
    if !color {
        return label;
    }
    match state {
        RequestState::Success => label.green().to_string(),
        RequestState::Denied => label.yellow().to_string(),
        RequestState::Failed => label.red().to_string(),
        _ => label,
    }
}

// ── Render dispatchers ───────────────────────────────────────────────

/// Render a list of serde-serializable + tabled items in the chosen format.
pub fn render_list<T, R>(
    format: &OutputFormat,
    data: &[T],
    to_row: impl Fn(&T) -> R,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
    R: Tabled,
{
    match format {
        OutputFormat::Table => {
            let rows: Vec<R> = data.iter().map(to_row).collect();
            render_table(&rows)
        }
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => data.iter().map(&id_fn).collect::<Vec<_>>().join("\n"),
    }
}

/// Render a single item; table format uses `detail_fn` instead of `Tabled`.
pub fn render_single<T>(
    format: &OutputFormat,
    data: &T,
    detail_fn: impl Fn(&T) -> String,
    id_fn: impl Fn(&T) -> String,
) -> String
where
    T: serde::Serialize,
{
    match format {
        OutputFormat::Table => detail_fn(data),
        OutputFormat::Json => render_json(data, false),
        OutputFormat::JsonCompact => render_json(data, true),
        OutputFormat::Yaml => render_yaml(data),
        OutputFormat::Plain => id_fn(data),
    }
}

pub fn print_output(output: &str, quiet: bool) {
    if quiet || output.is_empty() {
        return;
    }
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{output}");
}

// ── Send results ─────────────────────────────────────────────────────

#[derive(Tabled)]
pub struct ResultRow {
    #[tabled(rename = "Device")]
    device: String,
    #[tabled(rename = "Operation")]
    operation: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

impl ResultRow {
    pub fn new(result: &SendResult, color: bool) -> Self {
        Self {
            device: result.device_id.to_string(),
            operation: result.operation.to_string(),
            state: paint_state(result.state, color),
            detail: result_detail(result),
        }
    }
}

/// One-line summary of what happened.
pub fn result_detail(result: &SendResult) -> String {
    if let Some(err) = &result.error {
        return err.to_string();
    }
    result.metadata.as_ref().map_or_else(String::new, |m| {
        let mut parts = Vec::new();
        if let Some(msg) = &m.message {
            parts.push(msg.clone());
        }
        if let Some(rate) = m.refresh_rate {
            parts.push(format!("refresh in {rate}s"));
        }
        parts.join(", ")
    })
}

// ── Format-specific renderers ────────────────────────────────────────

fn render_table<R: Tabled>(rows: &[R]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}

fn render_json<T: serde::Serialize + ?Sized>(data: &T, compact: bool) -> String {
    let rendered = if compact {
        serde_json::to_string(data)
    } else {
        serde_json::to_string_pretty(data)
    };
    rendered.unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

fn render_yaml<T: serde::Serialize + ?Sized>(data: &T) -> String {
    serde_yaml::to_string(data).unwrap_or_else(|e| format!("error: serialization failed: {e}\n"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use trmnl_relay_core::{DeliveryMetadata, DeviceId, Operation};

    #[test]
    fn detail_summarizes_delivery_and_failure() {
        let ok = SendResult::delivered(
            DeviceId::new("d"),
            Operation::SendImage,
            DeliveryMetadata {
                refresh_rate: Some(900),
                message: Some("queued".into()),
                image_url: None,
            },
        );
        assert_eq!(result_detail(&ok), "queued, refresh in 900s");

        let denied =
            SendResult::denied(DeviceId::new("d"), Operation::SendImage, Duration::from_secs(5));
        assert!(result_detail(&denied).contains("retry in 5s"));
    }

    #[test]
    fn plain_state_has_no_escape_codes() {
        assert_eq!(paint_state(RequestState::Failed, false), "failed");
        assert!(paint_state(RequestState::Failed, true).contains('\u{1b}'));
    }

    #[test]
    fn compact_json_is_one_line() {
        let out = render_single(
            &OutputFormat::JsonCompact,
            &serde_json::json!({"a": [1, 2]}),
            |_| String::new(),
            |_| String::new(),
        );
        assert_eq!(out, r#"{"a":[1,2]}"#);
    }
}
