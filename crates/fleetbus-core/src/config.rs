// ── Runtime bus configuration ──
//
// Tuning for the worker pool and request correlation. Built by the host
// (or `fleetbus-config`) and handed to `Fleet::new`; core never reads files.

use std::time::Duration;

/// Default seconds a published event is retained by the cloud.
pub const DEFAULT_PUBLISH_TTL: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Deadline for a correlated request. `Duration::ZERO` = no deadline.
    pub request_timeout: Duration,
    /// Capacity of each command worker's mailbox.
    pub command_channel_size: usize,
    /// Maximum live workers across all tenants. 0 = unlimited.
    pub max_workers: usize,
    /// TTL applied to publishes that do not set one.
    pub default_publish_ttl: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            command_channel_size: 64,
            max_workers: 0,
            default_publish_ttl: DEFAULT_PUBLISH_TTL,
        }
    }
}

impl BusConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub(crate) fn deadline(&self) -> Option<Duration> {
        (!self.request_timeout.is_zero()).then_some(self.request_timeout)
    }
}
