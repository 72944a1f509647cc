// ── Domain model ──
//
// Plain data shared by the facade, the workers and the cloud provider
// interface. Nothing here carries behavior that reaches back into the bus.

pub mod device;
pub mod event;
pub mod requests;
pub mod tenant;

pub use device::{DeviceRecord, DeviceSnapshot, DeviceType, VariableType, VariableValue};
pub use event::{CloudEvent, DeviceEvent, SubscriptionKey};
pub use requests::{LoginOptions, PublishOptions};
pub use tenant::{ProductId, Tenant};
