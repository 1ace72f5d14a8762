//! Clap derive structures for the `firewalla` CLI.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// firewalla -- keep a Firewalla box in sync and pause/resume its rules
#[derive(Debug, Parser)]
#[command(
    name = "firewalla",
    version,
    about = "Sync and control a Firewalla box through the MSP API",
    long_about = "Polls box status, devices, rules and alarms from the Firewalla MSP\n\
        cloud API and pauses or resumes rules with optimistic confirmation.",
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
    /// Config profile to use
    #[arg(long, short = 'p', env = "FIREWALLA_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "FIREWALLA_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// MSP domain or URL (overrides profile)
    #[arg(long, env = "FIREWALLA_HOST", global = true)]
    pub host: Option<String>,

    /// Box gid to track (overrides profile)
    #[arg(long = "box", env = "FIREWALLA_BOX", global = true)]
    pub box_gid: Option<String>,

    /// MSP API token
    #[arg(long, env = "FIREWALLA_API_KEY", global = true, hide_env = true)]
    pub api_key: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "FIREWALLA_OUTPUT",
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

    /// Skip TLS certificate verification
    #[arg(long, short = 'k', env = "FIREWALLA_INSECURE", global = true)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, env = "FIREWALLA_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
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
    /// Poll once and show box, counters, devices or rules
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Keep polling and log every change until interrupted
    Watch(WatchArgs),

    /// Pause a rule
    Pause(RuleArgs),

    /// Resume a paused rule
    Resume(RuleArgs),

    /// Inspect configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// What to show
    #[arg(value_enum, default_value = "box")]
    pub view: StatusView,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StatusView {
    /// Box summary and counters
    Box,
    /// Device entities
    Devices,
    /// Rule switches
    Rules,
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Poll interval (e.g. "30s", "2m"); overrides the profile
    #[arg(long, short = 'i', value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,
}

// ── Rules ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RuleArgs {
    /// Rule id as reported by the MSP API
    pub rule_id: String,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file path
    Path,

    /// Display the loaded configuration (secrets redacted)
    Show,

    /// Set a value on the active profile
    Set {
        /// Key: host, box, api_key_env, ca_cert, insecure, timeout,
        /// poll_interval, failure_threshold, missing_threshold,
        /// confirm_cycles, retry_attempts
        key: String,
        value: String,
    },

    /// List configured profiles (* marks the default)
    Profiles,

    /// Make a profile the default
    Use { name: String },

    /// Store the active profile's API key in the system keyring (read from stdin)
    SetKey,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
