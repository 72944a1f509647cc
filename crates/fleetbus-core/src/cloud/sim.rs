// ── In-memory cloud provider ──
//
// A scriptable `CloudProvider` for tests and the CLI demo mode. Accounts,
// devices, per-call delays and failures are configured up front; events
// can be emitted at any time and are routed to matching subscriptions.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{CloudError, CloudProvider, EventSink, SubscriptionHandle};
use crate::model::{CloudEvent, DeviceSnapshot, ProductId, VariableValue};

/// Provider operations that can be scripted to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimOperation {
    Login,
    ListDevices,
    GetVariable,
    CallFunction,
    Rename,
    Unclaim,
    Publish,
    Subscribe,
}

/// An event recorded by [`SimulatedCloud::publish`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedEvent {
    pub name: String,
    pub data: Option<String>,
    pub is_private: bool,
    pub ttl: u32,
}

struct SimSubscription {
    prefix: String,
    device_id: Option<String>,
    sink: EventSink,
}

impl SimSubscription {
    fn matches(&self, event: &CloudEvent) -> bool {
        if !event.event_name.starts_with(&self.prefix) {
            return false;
        }
        match &self.device_id {
            Some(id) => event.device_id.as_deref() == Some(id.as_str()),
            None => true,
        }
    }
}

type DeviceKey = (String, String);

#[derive(Default)]
struct SimState {
    accounts: HashMap<String, String>,
    session: Option<String>,
    oauth_client: Option<String>,
    default_devices: Vec<DeviceSnapshot>,
    tenant_devices: HashMap<String, Vec<DeviceSnapshot>>,
    variables: HashMap<DeviceKey, VariableValue>,
    function_results: HashMap<DeviceKey, i32>,
    delays: HashMap<DeviceKey, Duration>,
    panicking: HashSet<DeviceKey>,
    failures: HashMap<SimOperation, String>,
    subscriptions: HashMap<u64, SimSubscription>,
    next_handle: u64,
    injected: Vec<String>,
    subscribe_calls: usize,
    login_calls: usize,
    published: Vec<PublishedEvent>,
}

impl SimState {
    fn check(&self, op: SimOperation) -> Result<(), CloudError> {
        match self.failures.get(&op) {
            Some(message) => Err(CloudError::Remote(message.clone())),
            None => Ok(()),
        }
    }

    fn require_session(&self) -> Result<&str, CloudError> {
        self.session
            .as_deref()
            .ok_or_else(|| CloudError::Auth("no active session".into()))
    }

    fn visible_devices(&self) -> Result<&[DeviceSnapshot], CloudError> {
        let token = self.require_session()?;
        Ok(self
            .tenant_devices
            .get(token)
            .map_or(self.default_devices.as_slice(), Vec::as_slice))
    }

    fn all_devices_mut(&mut self) -> impl Iterator<Item = &mut Vec<DeviceSnapshot>> {
        std::iter::once(&mut self.default_devices).chain(self.tenant_devices.values_mut())
    }

    fn find_device(&self, device_id: &str) -> Result<&DeviceSnapshot, CloudError> {
        self.visible_devices()?
            .iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| CloudError::UnknownDevice(device_id.to_owned()))
    }

    fn delay_for(&self, device_id: &str, name: &str) -> Option<Duration> {
        self.delays
            .get(&(device_id.to_owned(), name.to_owned()))
            .copied()
    }
}

/// Scriptable in-memory device cloud.
#[derive(Default)]
pub struct SimulatedCloud {
    state: Mutex<SimState>,
}

impl SimulatedCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small fleet for interactive use: account `demo` / `demo`, three
    /// devices on the default tenant and one on product 4242.
    pub fn demo() -> Self {
        Self::new()
            .with_account("demo", "demo")
            .with_device(
                DeviceSnapshot::new("e00fce68a1b2c3d4e5f60718", "lamp")
                    .with_platform(6)
                    .with_function("setBrightness")
                    .with_function("toggle")
                    .with_variable("brightness", "int32")
                    .with_variable("label", "string")
                    .connected(true),
            )
            .with_device(
                DeviceSnapshot::new("e00fce68deadbeefcafe0001", "thermostat")
                    .with_platform(10)
                    .with_function("reset")
                    .with_variable("temperature", "double")
                    .connected(true),
            )
            .with_device(DeviceSnapshot::new("e00fce68deadbeefcafe0002", "gateway").with_platform(31))
            .with_variable("e00fce68a1b2c3d4e5f60718", "brightness", VariableValue::Int(50))
            .with_variable(
                "e00fce68a1b2c3d4e5f60718",
                "label",
                VariableValue::String("living room".into()),
            )
            .with_variable(
                "e00fce68deadbeefcafe0001",
                "temperature",
                VariableValue::Double(21.5),
            )
            .with_tenant_devices(
                "product-4242-token",
                vec![
                    DeviceSnapshot::new("e00fce68feedface00004242", "sensor-1")
                        .with_platform(10)
                        .with_product(ProductId::new(4242))
                        .with_function("ping")
                        .connected(true),
                ],
            )
    }

    // ── Builders ─────────────────────────────────────────────────────

    pub fn with_account(self, username: &str, password: &str) -> Self {
        self.state()
            .accounts
            .insert(username.to_owned(), password.to_owned());
        self
    }

    /// Device visible to any session without tenant-specific devices.
    pub fn with_device(self, device: DeviceSnapshot) -> Self {
        self.state().default_devices.push(device);
        self
    }

    /// Devices visible only while `token` is the session token.
    pub fn with_tenant_devices(self, token: &str, devices: Vec<DeviceSnapshot>) -> Self {
        self.state()
            .tenant_devices
            .insert(token.to_owned(), devices);
        self
    }

    pub fn with_variable(self, device_id: &str, name: &str, value: VariableValue) -> Self {
        self.state()
            .variables
            .insert((device_id.to_owned(), name.to_owned()), value);
        self
    }

    /// Return code for a function; functions without one return `1`.
    pub fn with_function_result(self, device_id: &str, name: &str, code: i32) -> Self {
        self.state()
            .function_results
            .insert((device_id.to_owned(), name.to_owned()), code);
        self
    }

    /// Delay applied to function calls and variable reads named `name`.
    pub fn with_call_delay(self, device_id: &str, name: &str, delay: Duration) -> Self {
        self.state()
            .delays
            .insert((device_id.to_owned(), name.to_owned()), delay);
        self
    }

    pub fn with_failure(self, op: SimOperation, message: &str) -> Self {
        self.fail(op, message);
        self
    }

    pub fn with_panicking_function(self, device_id: &str, name: &str) -> Self {
        self.state()
            .panicking
            .insert((device_id.to_owned(), name.to_owned()));
        self
    }

    // ── Runtime controls ─────────────────────────────────────────────

    pub fn fail(&self, op: SimOperation, message: &str) {
        self.state().failures.insert(op, message.to_owned());
    }

    pub fn clear_failure(&self, op: SimOperation) {
        self.state().failures.remove(&op);
    }

    /// Drop a device from every listing, as if it was unclaimed elsewhere.
    pub fn remove_device(&self, device_id: &str) {
        let mut state = self.state();
        for devices in state.all_devices_mut() {
            devices.retain(|d| d.id != device_id);
        }
    }

    /// Push an event to every matching subscription. Returns how many
    /// subscriptions received it.
    pub fn emit(&self, event: &CloudEvent) -> usize {
        let mut state = self.state();
        let mut delivered = 0;
        state.subscriptions.retain(|_, sub| {
            if sub.sink.is_closed() {
                return false;
            }
            if sub.matches(event) && sub.sink.deliver(event.clone()) {
                delivered += 1;
            }
            true
        });
        delivered
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Tokens injected so far, in order.
    pub fn injected_tokens(&self) -> Vec<String> {
        self.state().injected.clone()
    }

    pub fn subscribe_calls(&self) -> usize {
        self.state().subscribe_calls
    }

    pub fn login_calls(&self) -> usize {
        self.state().login_calls
    }

    pub fn active_subscriptions(&self) -> usize {
        self.state().subscriptions.len()
    }

    pub fn published(&self) -> Vec<PublishedEvent> {
        self.state().published.clone()
    }

    pub fn oauth_client(&self) -> Option<String> {
        self.state().oauth_client.clone()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn pause(delay: Option<Duration>) {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CloudProvider for SimulatedCloud {
    async fn login(&self, username: &str, password: &SecretString) -> Result<(), CloudError> {
        let mut state = self.state();
        state.login_calls += 1;
        state.check(SimOperation::Login)?;
        match state.accounts.get(username) {
            Some(expected) if expected == password.expose_secret() => {
                state.session = Some(format!("sim-token-{username}"));
                debug!(username, "simulated login");
                Ok(())
            }
            _ => Err(CloudError::Auth("invalid username or password".into())),
        }
    }

    fn inject_token(&self, token: &SecretString) {
        let mut state = self.state();
        let token = token.expose_secret().to_owned();
        state.injected.push(token.clone());
        state.session = Some(token);
    }

    fn access_token(&self) -> Option<SecretString> {
        self.state().session.clone().map(SecretString::from)
    }

    fn is_authenticated(&self) -> bool {
        self.state().session.is_some()
    }

    fn set_oauth_client(&self, client_id: &str, _client_secret: &SecretString) {
        self.state().oauth_client = Some(client_id.to_owned());
    }

    fn logout(&self) {
        self.state().session = None;
    }

    async fn list_devices(&self) -> Result<Vec<DeviceSnapshot>, CloudError> {
        let state = self.state();
        state.check(SimOperation::ListDevices)?;
        Ok(state.visible_devices()?.to_vec())
    }

    async fn get_variable(
        &self,
        device_id: &str,
        name: &str,
    ) -> Result<VariableValue, CloudError> {
        let delay = {
            let state = self.state();
            state.check(SimOperation::GetVariable)?;
            state.find_device(device_id)?;
            state.delay_for(device_id, name)
        };
        Self::pause(delay).await;
        self.state()
            .variables
            .get(&(device_id.to_owned(), name.to_owned()))
            .cloned()
            .ok_or_else(|| CloudError::Remote(format!("variable {name} not found")))
    }

    async fn call_function(
        &self,
        device_id: &str,
        name: &str,
        _args: &[String],
    ) -> Result<i32, CloudError> {
        let (delay, panics) = {
            let state = self.state();
            state.check(SimOperation::CallFunction)?;
            let device = state.find_device(device_id)?;
            if !device.functions.iter().any(|f| f == name) {
                return Err(CloudError::Remote(format!("function {name} not found")));
            }
            let key = (device_id.to_owned(), name.to_owned());
            (state.delays.get(&key).copied(), state.panicking.contains(&key))
        };
        Self::pause(delay).await;
        assert!(!panics, "simulated provider fault in {name}");
        Ok(self
            .state()
            .function_results
            .get(&(device_id.to_owned(), name.to_owned()))
            .copied()
            .unwrap_or(1))
    }

    async fn rename(&self, device_id: &str, name: &str) -> Result<(), CloudError> {
        let mut state = self.state();
        state.check(SimOperation::Rename)?;
        state.find_device(device_id)?;
        for devices in state.all_devices_mut() {
            for device in devices.iter_mut().filter(|d| d.id == device_id) {
                device.name = Some(name.to_owned());
            }
        }
        Ok(())
    }

    async fn unclaim(&self, device_id: &str) -> Result<(), CloudError> {
        {
            let state = self.state();
            state.check(SimOperation::Unclaim)?;
            state.find_device(device_id)?;
        }
        self.remove_device(device_id);
        Ok(())
    }

    async fn publish(
        &self,
        name: &str,
        data: Option<&str>,
        is_private: bool,
        ttl: u32,
    ) -> Result<(), CloudError> {
        {
            let mut state = self.state();
            state.check(SimOperation::Publish)?;
            state.require_session()?;
            state.published.push(PublishedEvent {
                name: name.to_owned(),
                data: data.map(str::to_owned),
                is_private,
                ttl,
            });
        }
        self.emit(&CloudEvent::new(name, data.map(str::to_owned)));
        Ok(())
    }

    async fn subscribe(
        &self,
        prefix: &str,
        device_id: Option<&str>,
        sink: EventSink,
    ) -> Result<SubscriptionHandle, CloudError> {
        let mut state = self.state();
        state.subscribe_calls += 1;
        state.check(SimOperation::Subscribe)?;
        state.next_handle += 1;
        let id = state.next_handle;
        state.subscriptions.insert(
            id,
            SimSubscription {
                prefix: prefix.to_owned(),
                device_id: device_id.map(str::to_owned),
                sink,
            },
        );
        Ok(SubscriptionHandle::new(id))
    }

    fn unsubscribe(&self, handle: SubscriptionHandle) {
        self.state().subscriptions.remove(&handle.get());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::SubscriptionKey;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn listing_requires_a_session() {
        let cloud = SimulatedCloud::demo();
        assert!(matches!(
            cloud.list_devices().await,
            Err(CloudError::Auth(_))
        ));

        cloud
            .login("demo", &SecretString::from("demo"))
            .await
            .unwrap();
        assert_eq!(cloud.list_devices().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let cloud = SimulatedCloud::demo();
        let err = cloud
            .login("demo", &SecretString::from("nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, CloudError::Auth(_)));
        assert!(!cloud.is_authenticated());
    }

    #[tokio::test]
    async fn tenant_token_selects_tenant_devices() {
        let cloud = SimulatedCloud::demo();
        cloud.inject_token(&SecretString::from("product-4242-token"));
        let devices = cloud.list_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].product_id, Some(ProductId::new(4242)));
        assert_eq!(cloud.injected_tokens(), vec!["product-4242-token"]);
    }

    #[tokio::test]
    async fn emit_respects_prefix_and_device_filter() {
        let cloud = SimulatedCloud::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let global = SubscriptionKey::global("temp");
        let scoped = SubscriptionKey::device("dev1", "temp");
        cloud
            .subscribe("temp", None, EventSink::new(global.clone(), tx.clone()))
            .await
            .unwrap();
        cloud
            .subscribe("temp", Some("dev1"), EventSink::new(scoped.clone(), tx))
            .await
            .unwrap();

        let from_other = CloudEvent::new("temp/x", None).from_device("dev2");
        assert_eq!(cloud.emit(&from_other), 1);
        let (key, _) = rx.try_recv().unwrap();
        assert_eq!(key, global);

        assert_eq!(cloud.emit(&CloudEvent::new("humidity", None)), 0);
        assert_eq!(cloud.subscribe_calls(), 2);
    }
}
