//! Clap derive structures for the `trmnl-relay` CLI.
//!
//! Also compiled by `build.rs` for man pages, so this module may only
//! depend on clap and clap_complete.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// trmnl-relay -- push content to TRMNL e-ink displays
#[derive(Debug, Parser)]
#[command(
    name = "trmnl-relay",
    version,
    about = "Push images and merge variables to TRMNL e-ink displays",
    long_about = "Send images and merge variables to TRMNL displays through the\n\
        usetrmnl.com cloud, a Terminus server, or any BYOS-compatible server.\n\n\
        Requests are rate limited per device with a sliding window\n\
        (12 per hour by default) so the backend never rejects them.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Device profile to use
    #[arg(long, short = 'd', env = "TRMNL_RELAY_DEVICE", global = true)]
    pub device: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "TRMNL_RELAY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// API key (overrides profile, env and keyring)
    #[arg(long, env = "TRMNL_RELAY_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "TRMNL_RELAY_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (overrides profile)
    #[arg(long, env = "TRMNL_RELAY_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Skip the client-side rate limiter (the backend still enforces its own)
    #[arg(long, global = true)]
    pub no_rate_limit: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show an image on the device
    #[command(alias = "image")]
    SendImage(SendImageArgs),

    /// Merge variables into the device's plugin
    #[command(alias = "vars")]
    SendVariables(SendVariablesArgs),

    /// Dispatch a JSON or YAML list of requests concurrently
    Batch(BatchArgs),

    /// Create the private plugin for a standard (cloud) device
    Register,

    /// Show what the device is displaying and its rate-limit window
    Status,

    /// List configured devices (or the cloud account's devices)
    #[command(alias = "ls")]
    Devices(DevicesArgs),

    /// Manage CLI configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Sending ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SendImageArgs {
    /// Absolute http(s) URL of the image
    pub url: String,

    /// Seconds until the device fetches again
    #[arg(long, short = 'r', allow_negative_numbers = true)]
    pub refresh_rate: Option<i64>,
}

#[derive(Debug, Args)]
pub struct SendVariablesArgs {
    /// JSON object, or @path to a file containing one
    pub variables: String,

    /// deep_merge (default) or stream
    #[arg(long, short = 'm')]
    pub merge_strategy: Option<String>,
}

#[derive(Debug, Args)]
pub struct BatchArgs {
    /// File with a list of requests (.json, .yaml or .yml); `-` reads stdin
    pub file: PathBuf,
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    /// Ask the cloud account which devices it owns (standard backend)
    #[arg(long)]
    pub remote: bool,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Add a device profile with guided setup
    Init,

    /// Display current configuration (secrets redacted)
    Show,

    /// Print the config file path
    Path,

    /// Store a device's API key in the system keyring
    SetKey {
        /// Profile name (defaults to the active device)
        #[arg(long)]
        profile: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
