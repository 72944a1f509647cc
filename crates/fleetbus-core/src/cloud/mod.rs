// ── Cloud provider interface ──
//
// The vendor SDK is an external collaborator. The bus drives it through
// `CloudProvider`; workers are the only callers of the async methods, so
// network I/O never runs on the caller's task.

pub mod sim;

use async_trait::async_trait;
use secrecy::SecretString;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::model::{CloudEvent, DeviceEvent, DeviceSnapshot, SubscriptionKey, VariableValue};

pub use sim::{PublishedEvent, SimOperation, SimulatedCloud};

/// Failure reported by a cloud provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("{0}")]
    Remote(String),

    #[error("Unknown device: {0}")]
    UnknownDevice(String),
}

/// Provider-issued handle for one native event subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

impl SubscriptionHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Where a provider pushes events for one subscription.
///
/// The sink stamps each event with the subscription key it was created
/// for; providers only decide which events match.
#[derive(Debug, Clone)]
pub struct EventSink {
    key: SubscriptionKey,
    tx: mpsc::UnboundedSender<(SubscriptionKey, DeviceEvent)>,
}

impl EventSink {
    pub fn new(
        key: SubscriptionKey,
        tx: mpsc::UnboundedSender<(SubscriptionKey, DeviceEvent)>,
    ) -> Self {
        Self { key, tx }
    }

    pub fn key(&self) -> &SubscriptionKey {
        &self.key
    }

    /// Returns `false` once the owning event worker has gone away.
    pub fn deliver(&self, event: CloudEvent) -> bool {
        let event = DeviceEvent::from_cloud(self.key.prefix(), event);
        self.tx.send((self.key.clone(), event)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Session and device operations offered by a device cloud.
///
/// One provider instance is shared by every tenant; switching tenants is
/// done by injecting that tenant's access token.
#[async_trait]
pub trait CloudProvider: Send + Sync + 'static {
    // ── Session ──────────────────────────────────────────────────────
    async fn login(&self, username: &str, password: &SecretString) -> Result<(), CloudError>;

    /// Replace the session's access token. Must not perform I/O.
    fn inject_token(&self, token: &SecretString);

    fn access_token(&self) -> Option<SecretString>;

    fn is_authenticated(&self) -> bool;

    fn set_oauth_client(&self, client_id: &str, client_secret: &SecretString);

    fn logout(&self);

    // ── Devices ──────────────────────────────────────────────────────
    async fn list_devices(&self) -> Result<Vec<DeviceSnapshot>, CloudError>;

    async fn get_variable(&self, device_id: &str, name: &str)
    -> Result<VariableValue, CloudError>;

    async fn call_function(
        &self,
        device_id: &str,
        name: &str,
        args: &[String],
    ) -> Result<i32, CloudError>;

    async fn rename(&self, device_id: &str, name: &str) -> Result<(), CloudError>;

    async fn unclaim(&self, device_id: &str) -> Result<(), CloudError>;

    // ── Events ───────────────────────────────────────────────────────
    async fn publish(
        &self,
        name: &str,
        data: Option<&str>,
        is_private: bool,
        ttl: u32,
    ) -> Result<(), CloudError>;

    /// Start delivering events whose name starts with `prefix` to `sink`,
    /// restricted to `device_id` when given.
    async fn subscribe(
        &self,
        prefix: &str,
        device_id: Option<&str>,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, CloudError>;

    fn unsubscribe(&self, handle: SubscriptionHandle);
}
