// ── Event and subscription types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An event as published on the cloud's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudEvent {
    pub event_name: String,
    pub data: Option<String>,
    pub published_at: DateTime<Utc>,
    pub device_id: Option<String>,
}

impl CloudEvent {
    pub fn new(event_name: impl Into<String>, data: Option<String>) -> Self {
        Self {
            event_name: event_name.into(),
            data,
            published_at: Utc::now(),
            device_id: None,
        }
    }

    pub fn from_device(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// An event as delivered to a local subscriber.
///
/// `prefix` is the subscription prefix that matched, not the full event name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceEvent {
    pub prefix: String,
    pub event_name: String,
    pub data: Option<String>,
    pub published_at: DateTime<Utc>,
    pub device_id: Option<String>,
}

impl DeviceEvent {
    pub fn from_cloud(prefix: impl Into<String>, event: CloudEvent) -> Self {
        Self {
            prefix: prefix.into(),
            event_name: event.event_name,
            data: event.data,
            published_at: event.published_at,
            device_id: event.device_id,
        }
    }
}

/// Registry key for one local event handler.
///
/// Global and device-scoped keys are distinct variants, so a device id
/// plus prefix can never alias a global prefix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "scope", rename_all = "camelCase")]
pub enum SubscriptionKey {
    Global {
        prefix: String,
    },
    #[serde(rename_all = "camelCase")]
    Device {
        device_id: String,
        prefix: String,
    },
}

impl SubscriptionKey {
    pub fn global(prefix: impl Into<String>) -> Self {
        Self::Global {
            prefix: prefix.into(),
        }
    }

    pub fn device(device_id: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::Device {
            device_id: device_id.into(),
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        match self {
            Self::Global { prefix } | Self::Device { prefix, .. } => prefix,
        }
    }

    pub fn device_id(&self) -> Option<&str> {
        match self {
            Self::Global { .. } => None,
            Self::Device { device_id, .. } => Some(device_id),
        }
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global { prefix } => write!(f, "global:{prefix}"),
            Self::Device { device_id, prefix } => write!(f, "device:{device_id}:{prefix}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_and_global_keys_never_alias() {
        let device = SubscriptionKey::device("x", "y");
        let global = SubscriptionKey::global("x_y");
        assert_ne!(device, global);
        assert_eq!(device.prefix(), "y");
        assert_eq!(device.device_id(), Some("x"));
        assert_eq!(global.device_id(), None);
    }

    #[test]
    fn delivered_event_keeps_matched_prefix() {
        let cloud = CloudEvent::new("temp/kitchen", Some("21.5".into())).from_device("dev1");
        let event = DeviceEvent::from_cloud("temp", cloud);
        assert_eq!(event.prefix, "temp");
        assert_eq!(event.event_name, "temp/kitchen");
        assert_eq!(event.device_id.as_deref(), Some("dev1"));
    }
}
