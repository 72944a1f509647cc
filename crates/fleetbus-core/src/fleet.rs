// ── Fleet facade ──
//
// The public entry point. Composes the worker pool, the subscription
// registry and the tenant auth manager around one shared cloud provider.
// Every operation either returns immediately or is async; provider I/O
// only ever runs inside a tenant's workers.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use crate::auth::TenantAuth;
use crate::boundary::{CommandAction, EventAction, Redacted, ReplyData};
use crate::cloud::CloudProvider;
use crate::config::BusConfig;
use crate::device::Device;
use crate::error::BusError;
use crate::model::{
    DeviceEvent, LoginOptions, PublishOptions, SubscriptionKey, Tenant, VariableValue,
};
use crate::pool::WorkerPool;
use crate::registry::{EventHandler, SubscriptionRegistry};
use crate::worker::CommandWorker;

/// Handle to the command/event bus. Cheaply cloneable; clones share state.
#[derive(Clone)]
pub struct Fleet {
    inner: Arc<FleetInner>,
}

struct FleetInner {
    config: BusConfig,
    cloud: Arc<dyn CloudProvider>,
    auth: Arc<TenantAuth>,
    registry: Arc<SubscriptionRegistry>,
    pool: WorkerPool,
}

impl Fleet {
    pub fn new(cloud: Arc<dyn CloudProvider>, config: BusConfig) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new());
        let auth = Arc::new(TenantAuth::new());
        let pool = WorkerPool::new(
            Arc::clone(&cloud),
            config.clone(),
            Arc::clone(&auth),
            Arc::clone(&registry),
        );
        Self {
            inner: Arc::new(FleetInner {
                config,
                cloud,
                auth,
                registry,
                pool,
            }),
        }
    }

    // ── Session ──────────────────────────────────────────────────────

    /// Log in with account credentials. The login itself runs in the
    /// default tenant's command worker, which also records the session
    /// token for the default tenant.
    pub async fn login(&self, options: LoginOptions) -> Result<(), BusError> {
        info!(username = %options.username, "logging in");
        self.inner.pool.reopen();
        let worker = self.inner.pool.ensure_command_worker(Tenant::Default)?;
        worker
            .request(CommandAction::Login {
                username: options.username,
                password: Redacted::new(options.password.expose_secret()),
            })
            .await?;
        info!("login succeeded");
        Ok(())
    }

    /// Adopt an existing access token for `tenant` and make it active. While
    /// another tenant's calls are in flight the injection waits for them.
    pub fn login_with_token(&self, token: SecretString, tenant: Tenant) {
        self.inner.pool.reopen();
        self.inner
            .auth
            .activate(tenant, token, self.inner.cloud.as_ref());
        info!(tenant = %tenant, "logged in with token");
    }

    pub fn set_oauth_config(&self, client_id: &str, client_secret: &SecretString) {
        self.inner.cloud.set_oauth_client(client_id, client_secret);
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.cloud.is_authenticated()
    }

    pub fn access_token(&self) -> Option<SecretString> {
        self.inner.cloud.access_token()
    }

    /// Inject `tenant`'s token if another tenant is active and idle. Returns
    /// whether an injection happened. Workers do this themselves before
    /// every provider call.
    pub fn auth_if_needed(&self, tenant: Tenant) -> bool {
        self.inner
            .auth
            .auth_if_needed(tenant, self.inner.cloud.as_ref())
    }

    /// Terminate every worker, reject pending requests with `Shutdown` and
    /// forget all tokens and subscriptions.
    pub fn logout(&self) {
        let rejected = self.inner.pool.terminate_all();
        self.inner.registry.clear();
        self.inner.auth.clear();
        self.inner.cloud.logout();
        info!(rejected, "logged out");
    }

    // ── Devices ──────────────────────────────────────────────────────

    pub async fn list_devices(&self, tenant: Tenant) -> Result<Vec<Device>, BusError> {
        let worker = self.prepare(tenant)?;
        match worker.request(CommandAction::ListDevices).await? {
            ReplyData::Devices(records) => {
                debug!(tenant = %tenant, count = records.len(), "devices listed");
                Ok(records
                    .into_iter()
                    .map(|record| Device::new(record, tenant, self.clone()))
                    .collect())
            }
            other => Err(BusError::protocol("device list", &other)),
        }
    }

    pub(crate) async fn rename(
        &self,
        tenant: Tenant,
        device_id: &str,
        name: &str,
    ) -> Result<(), BusError> {
        let worker = self.prepare(tenant)?;
        worker
            .request(CommandAction::Rename {
                device_id: device_id.to_owned(),
                name: name.to_owned(),
            })
            .await
            .map(drop)
    }

    pub(crate) async fn unclaim(&self, tenant: Tenant, device_id: &str) -> Result<(), BusError> {
        let worker = self.prepare(tenant)?;
        worker
            .request(CommandAction::Unclaim {
                device_id: device_id.to_owned(),
            })
            .await
            .map(drop)
    }

    pub(crate) async fn call_function(
        &self,
        tenant: Tenant,
        device_id: &str,
        name: String,
        args: Vec<String>,
    ) -> Result<i32, BusError> {
        let worker = self.prepare(tenant)?;
        let reply = worker
            .request(CommandAction::CallFunction {
                device_id: device_id.to_owned(),
                name,
                args,
            })
            .await?;
        match reply {
            ReplyData::ReturnCode(code) => Ok(code),
            other => Err(BusError::protocol("return code", &other)),
        }
    }

    pub(crate) async fn get_variable(
        &self,
        tenant: Tenant,
        device_id: &str,
        name: &str,
    ) -> Result<VariableValue, BusError> {
        let worker = self.prepare(tenant)?;
        let reply = worker
            .request(CommandAction::GetVariable {
                device_id: device_id.to_owned(),
                name: name.to_owned(),
            })
            .await?;
        match reply {
            ReplyData::Variable(value) => Ok(value),
            other => Err(BusError::protocol("variable value", &other)),
        }
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Publish an event. Resolves once the command is handed to the worker;
    /// provider failures are logged, not returned.
    pub async fn publish(&self, options: PublishOptions, tenant: Tenant) -> Result<(), BusError> {
        let worker = self.prepare(tenant)?;
        let ttl = options.ttl.unwrap_or(self.inner.config.default_publish_ttl);
        worker
            .post(CommandAction::Publish {
                name: options.name,
                data: options.data,
                is_private: options.is_private,
                ttl,
            })
            .await
    }

    /// Subscribe `handler` to events whose name starts with `prefix`.
    /// A prefix that already has a handler is left untouched.
    pub fn subscribe<F>(&self, prefix: &str, handler: F, tenant: Tenant) -> Result<(), BusError>
    where
        F: Fn(DeviceEvent) + Send + Sync + 'static,
    {
        self.subscribe_key(tenant, SubscriptionKey::global(prefix), Arc::new(handler))
    }

    pub fn unsubscribe(&self, prefix: &str, tenant: Tenant) -> Result<(), BusError> {
        self.unsubscribe_key(tenant, &SubscriptionKey::global(prefix))
    }

    pub(crate) fn subscribe_key(
        &self,
        tenant: Tenant,
        key: SubscriptionKey,
        handler: EventHandler,
    ) -> Result<(), BusError> {
        if self.inner.registry.contains(tenant, &key) {
            debug!(tenant = %tenant, key = %key, "already subscribed");
            return Ok(());
        }
        self.admit(tenant)?;
        let worker = self.inner.pool.ensure_event_worker(tenant)?;
        let Some(generation) = self
            .inner
            .registry
            .insert_if_absent(tenant, key.clone(), handler)
        else {
            debug!(tenant = %tenant, key = %key, "already subscribed");
            return Ok(());
        };
        let subscribe = EventAction::Subscribe {
            key: key.clone(),
            generation,
        };
        if let Err(e) = worker.send(subscribe) {
            self.inner
                .registry
                .remove_registration(tenant, &key, generation);
            return Err(e);
        }
        debug!(tenant = %tenant, key = %key, "subscribed");
        Ok(())
    }

    pub(crate) fn unsubscribe_key(
        &self,
        tenant: Tenant,
        key: &SubscriptionKey,
    ) -> Result<(), BusError> {
        if !self.inner.registry.remove(tenant, key) {
            debug!(tenant = %tenant, key = %key, "not subscribed, nothing to do");
            return Ok(());
        }
        let worker = self.inner.pool.ensure_event_worker(tenant)?;
        worker.send(EventAction::Unsubscribe { key: key.clone() })?;
        debug!(tenant = %tenant, key = %key, "unsubscribed");
        Ok(())
    }

    // ── Introspection ────────────────────────────────────────────────

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    pub fn subscription_count(&self) -> usize {
        self.inner.registry.len()
    }

    pub fn is_subscribed(&self, tenant: Tenant, key: &SubscriptionKey) -> bool {
        self.inner.registry.contains(tenant, key)
    }

    pub fn active_tenant(&self) -> Option<Tenant> {
        self.inner.auth.active()
    }

    fn prepare(&self, tenant: Tenant) -> Result<CommandWorker, BusError> {
        self.admit(tenant)?;
        self.inner.pool.ensure_command_worker(tenant)
    }

    /// Refuse work before any worker is started for it. The pool check
    /// comes first so calls after logout report `Shutdown`.
    fn admit(&self, tenant: Tenant) -> Result<(), BusError> {
        if !self.inner.pool.is_open() {
            return Err(BusError::Shutdown);
        }
        self.inner.auth.check(tenant, self.inner.cloud.as_ref())
    }
}
