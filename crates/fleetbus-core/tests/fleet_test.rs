// End-to-end tests for the `Fleet` facade against the simulated cloud.
#![allow(clippy::unwrap_used)]

mod common;

use std::sync::Arc;

use fleetbus_core::{
    BusError, DeviceType, LoginOptions, PublishOptions, SimOperation, Tenant, VariableType,
    VariableValue,
};
use pretty_assertions::assert_eq;
use secrecy::{ExposeSecret, SecretString};

use common::*;

// ── Session ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_login_list_and_call_end_to_end() {
    let cloud = Arc::new(base_cloud());
    let fleet = signed_in(&cloud).await;

    let devices = fleet.list_devices(Tenant::Default).await.unwrap();
    assert_eq!(devices.len(), 1);
    let lamp = &devices[0];
    assert_eq!(lamp.id, LAMP);
    assert_eq!(lamp.device_type, DeviceType::Photon);
    assert_eq!(lamp.variables["brightness"], VariableType::Int);
    assert!(lamp.has_function("setBrightness"));
    assert_eq!(lamp.tenant(), Tenant::Default);

    let code = lamp.call_function("setBrightness", ["50"]).await.unwrap();
    assert_eq!(code, 1);
}

#[tokio::test]
async fn test_wrong_password_is_auth_error() {
    let cloud = Arc::new(base_cloud());
    let fleet = fleet(&cloud);
    let err = fleet
        .login(LoginOptions::new(USERNAME, "wrong"))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::Auth { .. }));
    assert!(!fleet.is_authenticated());
}

#[tokio::test]
async fn test_session_queries_reflect_provider() {
    let cloud = Arc::new(base_cloud());
    let fleet = fleet(&cloud);
    assert!(!fleet.is_authenticated());
    assert!(fleet.access_token().is_none());

    fleet
        .login(LoginOptions::new(USERNAME, PASSWORD))
        .await
        .unwrap();
    assert!(fleet.is_authenticated());
    assert_eq!(
        fleet.access_token().unwrap().expose_secret(),
        format!("sim-token-{USERNAME}")
    );
    assert_eq!(fleet.active_tenant(), Some(Tenant::Default));

    fleet.set_oauth_config("my-app", &SecretString::from("shh"));
    assert_eq!(cloud.oauth_client().as_deref(), Some("my-app"));
}

#[tokio::test]
async fn test_listing_without_session_is_auth_error() {
    let cloud = Arc::new(base_cloud());
    let fleet = fleet(&cloud);
    let err = fleet.list_devices(Tenant::Default).await.unwrap_err();
    assert!(matches!(err, BusError::Auth { .. }));
}

// ── Device operations ───────────────────────────────────────────────

#[tokio::test]
async fn test_stale_device_requires_refresh() {
    let cloud = Arc::new(base_cloud());
    let fleet = signed_in(&cloud).await;
    let lamp = find_device(&fleet, Tenant::Default, LAMP).await;

    cloud.remove_device(LAMP);
    assert!(fleet.list_devices(Tenant::Default).await.unwrap().is_empty());

    let err = lamp.call_function("toggle", Vec::<String>::new()).await.unwrap_err();
    assert_eq!(
        err,
        BusError::NotFound {
            device_id: LAMP.into()
        }
    );
    assert!(err.is_refresh_required());
}

#[tokio::test]
async fn test_rename_updates_handle_and_listing() {
    let cloud = Arc::new(base_cloud());
    let fleet = signed_in(&cloud).await;
    let mut lamp = find_device(&fleet, Tenant::Default, LAMP).await;

    lamp.rename("porch light").await.unwrap();
    assert_eq!(lamp.display_name(), "porch light");

    let relisted = find_device(&fleet, Tenant::Default, LAMP).await;
    assert_eq!(relisted.name.as_deref(), Some("porch light"));
}

#[tokio::test]
async fn test_unclaim_evicts_device() {
    let cloud = Arc::new(base_cloud());
    let fleet = signed_in(&cloud).await;
    let lamp = find_device(&fleet, Tenant::Default, LAMP).await;

    lamp.unclaim().await.unwrap();
    let err = lamp.get_variable("brightness").await.unwrap_err();
    assert!(err.is_refresh_required());
}

#[tokio::test]
async fn test_get_variable_returns_typed_value() {
    let cloud = Arc::new(base_cloud());
    let fleet = signed_in(&cloud).await;
    let lamp = find_device(&fleet, Tenant::Default, LAMP).await;

    assert_eq!(
        lamp.get_variable("brightness").await.unwrap(),
        VariableValue::Int(50)
    );
    let err = lamp.get_variable("missing").await.unwrap_err();
    assert!(matches!(err, BusError::Remote { ref message } if message.contains("missing")));
}

#[tokio::test]
async fn test_provider_failure_surfaces_as_remote() {
    let cloud = Arc::new(base_cloud().with_failure(SimOperation::ListDevices, "cloud down"));
    let fleet = signed_in(&cloud).await;
    let err = fleet.list_devices(Tenant::Default).await.unwrap_err();
    assert_eq!(
        err,
        BusError::Remote {
            message: "cloud down".into()
        }
    );
}

#[tokio::test]
async fn test_provider_panic_is_caught_at_worker_boundary() {
    let cloud = Arc::new(base_cloud().with_panicking_function(LAMP, "toggle"));
    let fleet = signed_in(&cloud).await;
    let lamp = find_device(&fleet, Tenant::Default, LAMP).await;

    let err = lamp.call_function("toggle", Vec::<String>::new()).await.unwrap_err();
    assert!(matches!(err, BusError::Remote { .. }));

    // The worker survives and keeps serving.
    assert_eq!(lamp.call_function("setBrightness", ["10"]).await.unwrap(), 1);
}

// ── Publish ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_publish_applies_default_ttl() {
    let cloud = Arc::new(base_cloud());
    let fleet = signed_in(&cloud).await;

    fleet
        .publish(
            PublishOptions::new("greeting").with_data("hello"),
            Tenant::Default,
        )
        .await
        .unwrap();
    fleet
        .publish(PublishOptions::new("secret").private().with_ttl(5), Tenant::Default)
        .await
        .unwrap();

    assert!(eventually(|| cloud.published().len() == 2).await);
    let published = cloud.published();
    let greeting = published.iter().find(|p| p.name == "greeting").unwrap();
    assert_eq!(greeting.ttl, 60);
    assert_eq!(greeting.data.as_deref(), Some("hello"));
    let secret = published.iter().find(|p| p.name == "secret").unwrap();
    assert_eq!(secret.ttl, 5);
    assert!(secret.is_private);
}

#[tokio::test]
async fn test_failed_publish_still_resolves() {
    let cloud = Arc::new(base_cloud().with_failure(SimOperation::Publish, "quota exceeded"));
    let fleet = signed_in(&cloud).await;
    fleet
        .publish(PublishOptions::new("greeting"), Tenant::Default)
        .await
        .unwrap();
    settle().await;
    assert!(cloud.published().is_empty());
}

// ── Tenants ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_product_devices_route_through_product_tenant() {
    let cloud = Arc::new(base_cloud());
    let fleet = fleet(&cloud);
    fleet.login_with_token(SecretString::from(TOKEN_A), product_a());

    let sensor = find_device(&fleet, product_a(), SENSOR).await;
    assert_eq!(sensor.tenant(), product_a());
    assert_eq!(sensor.device_type, DeviceType::Electron);
    assert_eq!(sensor.call_function("ping", Vec::<String>::new()).await.unwrap(), 1);
}

#[tokio::test]
async fn test_product_without_token_is_auth_error() {
    let cloud = Arc::new(base_cloud());
    let fleet = signed_in(&cloud).await;
    let err = fleet.list_devices(product_b()).await.unwrap_err();
    assert!(matches!(err, BusError::Auth { .. }));
}
