//! CLI error types with miette diagnostics.
//!
//! Maps `BusError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fleetbus_config::ConfigError;
use fleetbus_core::BusError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(fleetbus::auth_failed),
        help(
            "Verify your username and password, or the token for the selected product.\n\
             Product operations need --token together with --product."
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for profile '{profile}'")]
    #[diagnostic(
        code(fleetbus::no_credentials),
        help(
            "Set FLEETBUS_USERNAME and FLEETBUS_PASSWORD, pass --token,\n\
             or add username / password_env to the profile."
        )
    )]
    NoCredentials { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(fleetbus::not_found),
        help("Run: fleetbus {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── Bus ──────────────────────────────────────────────────────────
    #[error("Cloud call failed: {message}")]
    #[diagnostic(code(fleetbus::remote))]
    Remote { message: String },

    #[error("Request timed out after {millis}ms")]
    #[diagnostic(
        code(fleetbus::timeout),
        help("Increase the deadline with --timeout, or pass --timeout 0 to wait indefinitely.")
    )]
    Timeout { millis: u128 },

    #[error("The bus shut down before the request completed")]
    #[diagnostic(code(fleetbus::shutdown))]
    Shutdown,

    #[error("Bus setup failed: {message}")]
    #[diagnostic(code(fleetbus::setup))]
    Setup { message: String },

    #[error("Unexpected reply from worker: {message}")]
    #[diagnostic(code(fleetbus::protocol))]
    Protocol { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fleetbus::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fleetbus::profile_not_found),
        help("Available profiles: {available}")
    )]
    ProfileNotFound { name: String, available: String },

    #[error(transparent)]
    #[diagnostic(code(fleetbus::config))]
    Config(ConfigError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    #[diagnostic(code(fleetbus::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Shutdown => exit_code::CONNECTION,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: "device".into(),
            identifier: identifier.into(),
            list_command: "devices".into(),
        }
    }
}

// ── BusError → CliError mapping ──────────────────────────────────────

impl From<BusError> for CliError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::Auth { message } => Self::AuthFailed { message },
            BusError::NotFound { device_id } => Self::device_not_found(device_id),
            BusError::Remote { message } => Self::Remote { message },
            BusError::Timeout { timeout } => Self::Timeout {
                millis: timeout.as_millis(),
            },
            BusError::Shutdown => Self::Shutdown,
            BusError::Setup { tenant, message } => Self::Setup {
                message: format!("{tenant}: {message}"),
            },
            BusError::Protocol { message } => Self::Protocol { message },
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NoCredentials { profile } => Self::NoCredentials { profile },
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            other => Self::Config(other),
        }
    }
}
