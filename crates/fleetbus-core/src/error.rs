// ── Core error types ──
//
// Errors surfaced to callers of the bus. Worker-side failures never
// propagate as panics or provider errors; they cross back as `WireError`
// data and are translated here.

use std::time::Duration;

use thiserror::Error;

use crate::boundary::{WireError, WireErrorKind};
use crate::model::Tenant;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    // ── Lifecycle errors ─────────────────────────────────────────────
    #[error("Cannot start worker for {tenant}: {message}")]
    Setup { tenant: Tenant, message: String },

    #[error("Bus is shut down")]
    Shutdown,

    // ── Session errors ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    // ── Request errors ───────────────────────────────────────────────
    #[error("Cloud request failed: {message}")]
    Remote { message: String },

    #[error("Device not found: {device_id} (refresh the device list)")]
    NotFound { device_id: String },

    #[error("No reply within {}ms", timeout.as_millis())]
    Timeout { timeout: Duration },

    #[error("Unexpected reply: {message}")]
    Protocol { message: String },
}

impl BusError {
    /// The device list must be fetched again before retrying.
    pub fn is_refresh_required(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Retrying the same call may succeed without caller intervention.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::NotFound { .. })
    }

    pub(crate) fn protocol(expected: &str, got: &impl std::fmt::Debug) -> Self {
        Self::Protocol {
            message: format!("expected {expected}, got {got:?}"),
        }
    }
}

// ── Conversion from boundary errors ──────────────────────────────────

impl From<WireError> for BusError {
    fn from(err: WireError) -> Self {
        match err.kind {
            WireErrorKind::Auth => Self::Auth {
                message: err.message,
            },
            WireErrorKind::NotFound => Self::NotFound {
                device_id: err.message,
            },
            WireErrorKind::Remote => Self::Remote {
                message: err.message,
            },
            WireErrorKind::Internal => Self::Remote {
                message: format!("worker fault: {}", err.message),
            },
        }
    }
}
