//! Clap derive structures for the `fleetbus` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fleetbus -- drive IoT devices through a per-tenant command/event bus
#[derive(Debug, Parser)]
#[command(
    name = "fleetbus",
    version,
    about = "Drive IoT devices through a per-tenant command/event bus",
    long_about = "Lists, calls and watches devices through the fleetbus worker bus.\n\n\
        Runs against a built-in simulated device cloud (account demo/demo,\n\
        product 4242 token: product-4242-token).",
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
    /// Account profile to use
    #[arg(long, short = 'p', env = "FLEETBUS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Account username (overrides profile)
    #[arg(long, short = 'u', env = "FLEETBUS_USERNAME", global = true)]
    pub username: Option<String>,

    /// Account password
    #[arg(
        long,
        env = "FLEETBUS_PASSWORD",
        global = true,
        hide_env_values = true
    )]
    pub password: Option<String>,

    /// Access token; skips credential login
    #[arg(long, env = "FLEETBUS_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Product id to operate on (default: the account's own devices)
    #[arg(long, env = "FLEETBUS_PRODUCT", global = true)]
    pub product: Option<u32>,

    /// Output format
    #[arg(long, short = 'o', env = "FLEETBUS_OUTPUT", global = true)]
    pub output: Option<OutputFormat>,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Request timeout in seconds (0 waits forever)
    #[arg(long, env = "FLEETBUS_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
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
    /// List devices visible to the tenant
    #[command(alias = "dev", alias = "d")]
    Devices,

    /// Call a device function
    Call(CallArgs),

    /// Read a device variable
    Get(GetArgs),

    /// Rename a device
    Rename(RenameArgs),

    /// Release a device from the account
    Unclaim(DeviceArg),

    /// Publish an event
    #[command(alias = "pub")]
    Publish(PublishArgs),

    /// Subscribe to events and print them as they arrive
    Watch(WatchArgs),

    /// Inspect CLI configuration
    Config(ConfigArgs),
}

// ── Device Commands ──────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DeviceArg {
    /// Device id or name
    pub device: String,
}

#[derive(Debug, Args)]
pub struct CallArgs {
    /// Device id or name
    pub device: String,

    /// Function name
    pub function: String,

    /// Function arguments
    #[arg(trailing_var_arg = true)]
    pub args: Vec<String>,
}

#[derive(Debug, Args)]
pub struct GetArgs {
    /// Device id or name
    pub device: String,

    /// Variable name
    pub variable: String,
}

#[derive(Debug, Args)]
pub struct RenameArgs {
    /// Device id or name
    pub device: String,

    /// New device name
    pub name: String,
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PublishArgs {
    /// Event name
    pub name: String,

    /// Event payload
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Publish as a private event
    #[arg(long)]
    pub private: bool,

    /// Seconds the cloud retains the event
    #[arg(long)]
    pub ttl: Option<u32>,
}

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Event name prefix to subscribe to
    pub prefix: String,

    /// Only events from this device (id or name)
    #[arg(long)]
    pub device: Option<String>,

    /// Stop after this many events
    #[arg(long, short = 'n')]
    pub count: Option<usize>,

    /// Interval between simulated events, in milliseconds
    #[arg(long, default_value = "1000")]
    pub interval_ms: u64,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration (passwords omitted)
    Show,

    /// Print the config file location
    Path,

    /// List configured profiles
    Profiles,
}
