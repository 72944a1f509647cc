//! Per-tenant command/event bus between a host application and an IoT
//! device cloud.
//!
//! All cloud I/O runs inside isolated worker tasks; the host only ever
//! talks to them through plain-data messages:
//!
//! - **[`Fleet`]**: Public facade. [`login()`](Fleet::login) authenticates,
//!   [`list_devices()`](Fleet::list_devices) returns [`Device`] handles whose
//!   methods forward back into the bus, and [`subscribe()`](Fleet::subscribe)
//!   fans cloud events out to local handlers.
//!
//! - **Workers** ([`worker`]): One command worker and one event worker per
//!   [`Tenant`], created lazily by the [`WorkerPool`] and torn down on logout.
//!   The command worker owns the tenant's device cache and runs provider
//!   calls concurrently.
//!
//! - **[`Correlator`]**: Pairs each request with its reply by correlation
//!   id, so concurrent calls on one worker can never cross-resolve.
//!
//! - **[`SubscriptionRegistry`]**: One handler per global or device-scoped
//!   [`SubscriptionKey`], dispatched from the event worker's pump.
//!
//! - **[`TenantAuth`]**: Per-tenant access tokens, injected into the shared
//!   [`CloudProvider`] session whenever the active tenant changes.
//!
//! - **[`SimulatedCloud`]**: In-memory provider for tests and demos.

pub mod auth;
pub mod boundary;
pub mod cloud;
pub mod config;
pub mod convert;
pub mod correlator;
pub mod device;
pub mod error;
pub mod fleet;
pub mod model;
pub mod pool;
pub mod registry;
pub mod worker;

// ── Primary re-exports ──────────────────────────────────────────────
pub use auth::{SessionGuard, TenantAuth};
pub use boundary::{CorrelationId, WireError, WireErrorKind};
pub use cloud::{
    CloudError, CloudProvider, EventSink, SimOperation, SimulatedCloud, SubscriptionHandle,
};
pub use config::{BusConfig, DEFAULT_PUBLISH_TTL};
pub use correlator::Correlator;
pub use device::Device;
pub use error::BusError;
pub use fleet::Fleet;
pub use pool::WorkerPool;
pub use registry::{EventHandler, SubscriptionRegistry};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    CloudEvent, DeviceEvent, DeviceRecord, DeviceSnapshot, DeviceType, LoginOptions, ProductId,
    PublishOptions, SubscriptionKey, Tenant, VariableType, VariableValue,
};
