// Shared fixtures for fleetbus-core integration tests.
#![allow(dead_code, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use fleetbus_core::{
    BusConfig, Device, DeviceEvent, DeviceSnapshot, Fleet, LoginOptions, ProductId,
    SimulatedCloud, Tenant, VariableValue,
};
use tokio::sync::mpsc;

pub const USERNAME: &str = "ada";
pub const PASSWORD: &str = "analytical-engine";

pub const LAMP: &str = "e00fce68a1b2c3d4e5f60718";
pub const SENSOR: &str = "e00fce68feedface00000001";
pub const BEACON: &str = "e00fce68feedface00000002";

pub const PRODUCT_A: u32 = 1001;
pub const PRODUCT_B: u32 = 1002;
pub const TOKEN_A: &str = "token-product-a";
pub const TOKEN_B: &str = "token-product-b";

// ── Cloud fixtures ──────────────────────────────────────────────────

pub fn lamp() -> DeviceSnapshot {
    DeviceSnapshot::new(LAMP, "lamp")
        .with_platform(6)
        .with_function("setBrightness")
        .with_function("toggle")
        .with_variable("brightness", "int32")
        .connected(true)
}

/// One account, a lamp on the default tenant and one device per product.
pub fn base_cloud() -> SimulatedCloud {
    SimulatedCloud::new()
        .with_account(USERNAME, PASSWORD)
        .with_device(lamp())
        .with_variable(LAMP, "brightness", VariableValue::Int(50))
        .with_tenant_devices(
            TOKEN_A,
            vec![
                DeviceSnapshot::new(SENSOR, "sensor")
                    .with_platform(10)
                    .with_product(ProductId::new(PRODUCT_A))
                    .with_function("ping"),
            ],
        )
        .with_tenant_devices(
            TOKEN_B,
            vec![
                DeviceSnapshot::new(BEACON, "beacon")
                    .with_platform(103)
                    .with_product(ProductId::new(PRODUCT_B))
                    .with_function("ping"),
            ],
        )
}

pub fn product_a() -> Tenant {
    Tenant::Product(ProductId::new(PRODUCT_A))
}

pub fn product_b() -> Tenant {
    Tenant::Product(ProductId::new(PRODUCT_B))
}

pub fn fleet(cloud: &Arc<SimulatedCloud>) -> Fleet {
    fleet_with(cloud, BusConfig::default())
}

pub fn fleet_with(cloud: &Arc<SimulatedCloud>, config: BusConfig) -> Fleet {
    let provider: Arc<SimulatedCloud> = Arc::clone(cloud);
    Fleet::new(provider, config)
}

pub async fn signed_in(cloud: &Arc<SimulatedCloud>) -> Fleet {
    let fleet = fleet(cloud);
    fleet
        .login(LoginOptions::new(USERNAME, PASSWORD))
        .await
        .unwrap();
    fleet
}

pub async fn find_device(fleet: &Fleet, tenant: Tenant, id: &str) -> Device {
    fleet
        .list_devices(tenant)
        .await
        .unwrap()
        .into_iter()
        .find(|device| device.id == id)
        .unwrap()
}

// ── Async helpers ───────────────────────────────────────────────────

/// Let worker and pump tasks run until they go idle.
pub async fn settle() {
    for _ in 0..32 {
        tokio::task::yield_now().await;
    }
}

/// Poll `check` between yields until it holds.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..256 {
        if check() {
            return true;
        }
        tokio::task::yield_now().await;
    }
    check()
}

/// A handler that forwards every event into a channel.
pub fn collector() -> (
    impl Fn(DeviceEvent) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<DeviceEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let handler = move |event: DeviceEvent| {
        let _ = tx.send(event);
    };
    (handler, rx)
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<DeviceEvent>) -> Option<DeviceEvent> {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .ok()
        .flatten()
}
