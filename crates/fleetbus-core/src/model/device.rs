// ── Device domain types ──

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

use super::tenant::ProductId;

/// Hardware family, normalized from the cloud's numeric platform id.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[non_exhaustive]
pub enum DeviceType {
    Core,
    Photon,
    P1,
    Electron,
    RaspberryPi,
    DigistumpOak,
    RedBearDuo,
    Bluz,
    Unknown,
}

impl DeviceType {
    pub fn from_platform_id(platform_id: u32) -> Self {
        match platform_id {
            0 => Self::Core,
            6 => Self::Photon,
            8 => Self::P1,
            10 => Self::Electron,
            31 => Self::RaspberryPi,
            82 => Self::DigistumpOak,
            88 => Self::RedBearDuo,
            103 => Self::Bluz,
            other => {
                debug!(platform_id = other, "unrecognized platform id");
                Self::Unknown
            }
        }
    }
}

/// Declared type of a cloud variable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum VariableType {
    Int,
    Double,
    String,
}

impl VariableType {
    /// Map the type name a device declares for a variable.
    ///
    /// Unknown names fall back to `String`, which every value can be read as.
    pub fn from_declared(declared: &str) -> Self {
        match declared.to_ascii_lowercase().as_str() {
            "int" | "int32" => Self::Int,
            "double" => Self::Double,
            "string" => Self::String,
            other => {
                debug!(declared = other, "unknown variable type, treating as string");
                Self::String
            }
        }
    }
}

/// A variable value read from a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariableValue {
    Int(i64),
    Double(f64),
    String(String),
}

impl VariableValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(_) | Self::String(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            Self::Int(_) | Self::Double(_) => None,
        }
    }
}

impl fmt::Display for VariableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => f.write_str(v),
        }
    }
}

/// Raw device description as reported by a cloud provider.
///
/// Variable types are kept as the provider's declared names; conversion
/// into a [`DeviceRecord`] normalizes them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSnapshot {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub connected: bool,
    pub platform_id: u32,
    pub product_id: Option<ProductId>,
    pub functions: Vec<String>,
    pub variables: Vec<(String, String)>,
}

impl DeviceSnapshot {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: Some(name.into()),
            status: Some("normal".into()),
            ..Self::default()
        }
    }

    pub fn with_platform(mut self, platform_id: u32) -> Self {
        self.platform_id = platform_id;
        self
    }

    pub fn with_product(mut self, product_id: ProductId) -> Self {
        self.product_id = Some(product_id);
        self
    }

    pub fn with_function(mut self, name: impl Into<String>) -> Self {
        self.functions.push(name.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, declared: impl Into<String>) -> Self {
        self.variables.push((name.into(), declared.into()));
        self
    }

    pub fn connected(mut self, connected: bool) -> Self {
        self.connected = connected;
        self
    }
}

/// Cached, data-only snapshot of a device taken at list time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRecord {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub connected: bool,
    pub product_id: Option<ProductId>,
    pub device_type: DeviceType,
    pub functions: BTreeSet<String>,
    pub variables: BTreeMap<String, VariableType>,
}

impl DeviceRecord {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}
