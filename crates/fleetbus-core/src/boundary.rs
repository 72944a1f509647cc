// ── Worker boundary ──
//
// Everything that travels between the facade and a worker. These types
// are plain owned data: they serialize to the envelope shapes below and
// never hold references, handles or callbacks.
//
//   outbound  {"action": ..., "options": {...}, "correlationId"?: n}
//   inbound   {"success": bool, "correlationId"?: n, "result"?: .., "error"?: ..}
//   events    {"success": bool, "key": .., "data"?: event, "error"?: ..}

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

use crate::error::BusError;
use crate::model::{DeviceEvent, DeviceRecord, SubscriptionKey, VariableValue};

/// Types allowed to cross into or out of a worker.
pub trait Boundary: Serialize + DeserializeOwned + Send + 'static {
    /// JSON envelope form, for trace logging.
    fn to_wire(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("<unserializable: {e}>"))
    }
}

impl Boundary for CommandRequest {
    fn to_wire(&self) -> String {
        let mut shown = self.clone();
        if let CommandAction::Login { password, .. } = &mut shown.action {
            *password = Redacted::new("[REDACTED]");
        }
        serde_json::to_string(&shown).unwrap_or_else(|e| format!("<unserializable: {e}>"))
    }
}
impl Boundary for CommandReply {}
impl Boundary for EventAction {}
impl Boundary for EventMessage {}

/// Bounded worker mailbox. Only boundary types can be carried.
pub(crate) fn channel<T: Boundary>(capacity: usize) -> (mpsc::Sender<T>, mpsc::Receiver<T>) {
    mpsc::channel(capacity.max(1))
}

/// Unbounded worker mailbox for traffic that must never apply backpressure
/// to a synchronous caller.
pub(crate) fn unbounded<T: Boundary>() -> (mpsc::UnboundedSender<T>, mpsc::UnboundedReceiver<T>) {
    mpsc::unbounded_channel()
}

// ── Correlation ──────────────────────────────────────────────────────

/// Pairs a request with its reply. Unique per worker for its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(u64);

impl CorrelationId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ── Command worker traffic ───────────────────────────────────────────

/// A string that never appears in debug output.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Redacted(String);

impl Redacted {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Redacted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Outbound command envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    #[serde(flatten)]
    pub action: CommandAction,
    /// Absent for fire-and-forget commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "action",
    content = "options",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum CommandAction {
    Login {
        username: String,
        password: Redacted,
    },
    ListDevices,
    GetVariable {
        device_id: String,
        name: String,
    },
    CallFunction {
        device_id: String,
        name: String,
        args: Vec<String>,
    },
    Rename {
        device_id: String,
        name: String,
    },
    Unclaim {
        device_id: String,
    },
    Publish {
        name: String,
        data: Option<String>,
        is_private: bool,
        ttl: u32,
    },
}

impl CommandAction {
    /// Short action name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Login { .. } => "login",
            Self::ListDevices => "listDevices",
            Self::GetVariable { .. } => "getVariable",
            Self::CallFunction { .. } => "callFunction",
            Self::Rename { .. } => "rename",
            Self::Unclaim { .. } => "unclaim",
            Self::Publish { .. } => "publish",
        }
    }
}

/// Inbound reply envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandReply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<CorrelationId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ReplyData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl CommandReply {
    pub fn ok(correlation_id: Option<CorrelationId>, result: ReplyData) -> Self {
        Self {
            success: true,
            correlation_id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(correlation_id: Option<CorrelationId>, error: WireError) -> Self {
        Self {
            success: false,
            correlation_id,
            result: None,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> Result<ReplyData, BusError> {
        if self.success {
            return Ok(self.result.unwrap_or(ReplyData::Done));
        }
        Err(self.error.map_or_else(
            || BusError::Protocol {
                message: "failed reply carried no error".into(),
            },
            BusError::from,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ReplyData {
    Done,
    Devices(Vec<DeviceRecord>),
    Variable(VariableValue),
    ReturnCode(i32),
}

// ── Errors as data ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WireErrorKind {
    Auth,
    Remote,
    NotFound,
    Internal,
}

/// A failure reported by a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireError {
    pub kind: WireErrorKind,
    pub message: String,
}

impl WireError {
    pub fn new(kind: WireErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn remote(message: impl Into<String>) -> Self {
        Self::new(WireErrorKind::Remote, message)
    }

    pub fn not_found(device_id: impl Into<String>) -> Self {
        Self::new(WireErrorKind::NotFound, device_id)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(WireErrorKind::Internal, message)
    }
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

// ── Event worker traffic ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", content = "options", rename_all = "camelCase")]
pub enum EventAction {
    /// `generation` names the local registration the subscribe is for.
    Subscribe {
        key: SubscriptionKey,
        generation: u64,
    },
    Unsubscribe { key: SubscriptionKey },
}

/// Inbound event envelope. A failed message reports a rejected subscribe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub success: bool,
    pub key: SubscriptionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<DeviceEvent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<WireError>,
}

impl EventMessage {
    pub fn event(key: SubscriptionKey, event: DeviceEvent) -> Self {
        Self {
            success: true,
            key,
            generation: None,
            data: Some(event),
            error: None,
        }
    }

    pub fn rejected(key: SubscriptionKey, generation: u64, error: WireError) -> Self {
        Self {
            success: false,
            key,
            generation: Some(generation),
            data: None,
            error: Some(error),
        }
    }
}
