// Concurrency and timeout behavior of correlated requests.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use fleetbus_core::{BusConfig, BusError, DeviceSnapshot, LoginOptions, SimulatedCloud, Tenant};
use futures_util::future::join_all;

use common::*;

const FUNCTIONS: [(&str, u64, i32); 5] = [
    ("alpha", 500, 10),
    ("bravo", 400, 20),
    ("charlie", 300, 30),
    ("delta", 200, 40),
    ("echo", 100, 50),
];

fn staggered_cloud() -> Arc<SimulatedCloud> {
    let mut device = DeviceSnapshot::new(LAMP, "lamp");
    let mut cloud = SimulatedCloud::new().with_account(USERNAME, PASSWORD);
    for (name, delay_ms, code) in FUNCTIONS {
        device = device.with_function(name);
        cloud = cloud
            .with_call_delay(LAMP, name, Duration::from_millis(delay_ms))
            .with_function_result(LAMP, name, code);
    }
    Arc::new(cloud.with_device(device))
}

// ── Correlation ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_concurrent_calls_resolve_with_their_own_results() {
    let cloud = staggered_cloud();
    let fleet = signed_in(&cloud).await;
    let lamp = find_device(&fleet, Tenant::Default, LAMP).await;

    // Issued slowest-first, so replies come back in reverse order.
    let calls = FUNCTIONS
        .iter()
        .map(|(name, _, _)| lamp.call_function(name, Vec::<String>::new()));
    let results = join_all(calls).await;

    let expected: Vec<Result<i32, BusError>> =
        FUNCTIONS.iter().map(|(_, _, code)| Ok(*code)).collect();
    assert_eq!(results, expected);
}

#[tokio::test(start_paused = true)]
async fn test_many_inflight_calls_on_one_worker() {
    let cloud = staggered_cloud();
    let fleet = signed_in(&cloud).await;
    let lamp = find_device(&fleet, Tenant::Default, LAMP).await;

    let calls = (0..40).map(|i| {
        let (name, _, code) = FUNCTIONS[i % FUNCTIONS.len()];
        let call = lamp.call_function(name, [i.to_string()]);
        async move { (call.await.unwrap(), code) }
    });
    for (got, want) in join_all(calls).await {
        assert_eq!(got, want);
    }
}

// ── Timeouts ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_timeout_rejects_request_but_keeps_worker() {
    let cloud = staggered_cloud();
    let fleet = fleet_with(
        &cloud,
        BusConfig::default().with_request_timeout(Duration::from_millis(250)),
    );
    fleet
        .login(LoginOptions::new(USERNAME, PASSWORD))
        .await
        .unwrap();
    let lamp = find_device(&fleet, Tenant::Default, LAMP).await;

    let err = lamp
        .call_function("alpha", Vec::<String>::new())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        BusError::Timeout {
            timeout: Duration::from_millis(250)
        }
    );
    assert!(err.is_retryable());

    // A late reply for the expired request is dropped; new calls still work.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(lamp.call_function("echo", Vec::<String>::new()).await.unwrap(), 50);
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_waits_for_slow_reply() {
    let cloud = staggered_cloud();
    let fleet = fleet_with(
        &cloud,
        BusConfig::default().with_request_timeout(Duration::ZERO),
    );
    fleet
        .login(LoginOptions::new(USERNAME, PASSWORD))
        .await
        .unwrap();
    let lamp = find_device(&fleet, Tenant::Default, LAMP).await;

    assert_eq!(
        lamp.call_function("alpha", Vec::<String>::new()).await.unwrap(),
        10
    );
}
