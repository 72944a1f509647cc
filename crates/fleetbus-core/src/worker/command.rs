// ── Command worker ──
//
// One per tenant. Receives `CommandRequest`s, runs the provider calls
// concurrently, keeps the tenant's device cache, and sends correlated
// replies back to a pump task that resolves them on the facade side.
// Each provider call runs inside the tenant's session, so the call always
// sees that tenant's token.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::cache::DeviceCache;
use super::guarded;
use crate::auth::TenantAuth;
use crate::boundary::{
    self, Boundary, CommandAction, CommandReply, CommandRequest, CorrelationId, ReplyData, WireError,
};
use crate::cloud::CloudProvider;
use crate::config::BusConfig;
use crate::correlator::Correlator;
use crate::error::BusError;
use crate::model::{DeviceRecord, Tenant, VariableValue};

// ── Handle ───────────────────────────────────────────────────────────

/// Facade-side handle to a tenant's command worker. Cheaply cloneable.
#[derive(Clone)]
pub struct CommandWorker {
    inner: Arc<CommandWorkerInner>,
}

struct CommandWorkerInner {
    tenant: Tenant,
    tx: mpsc::Sender<CommandRequest>,
    correlator: Arc<Correlator>,
    cancel: CancellationToken,
    deadline: Option<Duration>,
}

impl CommandWorker {
    /// Start the worker and its reply pump on `runtime`.
    pub fn spawn(
        tenant: Tenant,
        cloud: Arc<dyn CloudProvider>,
        auth: Arc<TenantAuth>,
        config: &BusConfig,
        runtime: &Handle,
    ) -> Self {
        let (tx, rx) = boundary::channel::<CommandRequest>(config.command_channel_size);
        let (reply_tx, reply_rx) = boundary::unbounded::<CommandReply>();
        let correlator = Arc::new(Correlator::new());
        let cancel = CancellationToken::new();

        runtime.spawn(command_worker_task(
            tenant,
            cloud,
            auth,
            rx,
            reply_tx,
            cancel.clone(),
        ));
        runtime.spawn(reply_pump_task(
            tenant,
            reply_rx,
            Arc::clone(&correlator),
            cancel.clone(),
        ));

        Self {
            inner: Arc::new(CommandWorkerInner {
                tenant,
                tx,
                correlator,
                cancel,
                deadline: config.deadline(),
            }),
        }
    }

    pub fn tenant(&self) -> Tenant {
        self.inner.tenant
    }

    /// Send a correlated command and wait for its reply.
    pub async fn request(&self, action: CommandAction) -> Result<ReplyData, BusError> {
        let (correlation_id, reply_rx) = self.inner.correlator.register()?;
        debug!(
            tenant = %self.inner.tenant,
            action = action.name(),
            correlation_id = %correlation_id,
            "sending command"
        );
        let request = CommandRequest {
            action,
            correlation_id: Some(correlation_id),
        };
        if self.inner.tx.send(request).await.is_err() {
            self.inner.correlator.expire(correlation_id);
            return Err(BusError::Shutdown);
        }
        self.inner
            .correlator
            .wait(correlation_id, reply_rx, self.inner.deadline)
            .await
    }

    /// Hand a command to the worker without waiting for its outcome.
    pub async fn post(&self, action: CommandAction) -> Result<(), BusError> {
        if self.is_terminated() {
            return Err(BusError::Shutdown);
        }
        debug!(tenant = %self.inner.tenant, action = action.name(), "posting command");
        self.inner
            .tx
            .send(CommandRequest {
                action,
                correlation_id: None,
            })
            .await
            .map_err(|_| BusError::Shutdown)
    }

    /// Stop the worker and reject everything still pending. Returns the
    /// number of rejected requests.
    pub fn terminate(&self) -> usize {
        self.inner.correlator.close();
        self.inner.cancel.cancel();
        let rejected = self.inner.correlator.reject_all();
        debug!(tenant = %self.inner.tenant, rejected, "command worker terminated");
        rejected
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.correlator.is_closed()
    }

    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }
}

impl fmt::Debug for CommandWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandWorker")
            .field("tenant", &self.inner.tenant)
            .field("pending", &self.pending_requests())
            .field("terminated", &self.is_terminated())
            .finish_non_exhaustive()
    }
}

// ── Worker side ──────────────────────────────────────────────────────

/// What a provider call produced, before the cache has seen it.
#[derive(Debug)]
enum Outcome {
    Done,
    Devices(Vec<DeviceRecord>),
    Variable(VariableValue),
    ReturnCode(i32),
    Renamed { device_id: String, name: String },
    Unclaimed { device_id: String },
}

struct Completion {
    correlation_id: Option<CorrelationId>,
    action: &'static str,
    result: Result<Outcome, WireError>,
}

async fn command_worker_task(
    tenant: Tenant,
    cloud: Arc<dyn CloudProvider>,
    auth: Arc<TenantAuth>,
    mut requests: mpsc::Receiver<CommandRequest>,
    replies: mpsc::UnboundedSender<CommandReply>,
    cancel: CancellationToken,
) {
    debug!(tenant = %tenant, "command worker started");
    let mut cache = DeviceCache::default();
    let mut in_flight: JoinSet<Completion> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => match joined {
                Ok(completion) => finish(tenant, completion, &mut cache, &replies),
                Err(e) => warn!(tenant = %tenant, error = %e, "provider task aborted"),
            },
            request = requests.recv() => {
                let Some(request) = request else { break };
                trace!(tenant = %tenant, envelope = %request.to_wire(), "command received");
                dispatch(tenant, request, &cache, &cloud, &auth, &mut in_flight, &replies);
            }
        }
    }

    in_flight.abort_all();
    debug!(tenant = %tenant, "command worker stopped");
}

/// Validate device-scoped commands against the cache, then start the
/// provider call. Unknown devices are answered without touching the cloud.
fn dispatch(
    tenant: Tenant,
    request: CommandRequest,
    cache: &DeviceCache,
    cloud: &Arc<dyn CloudProvider>,
    auth: &Arc<TenantAuth>,
    in_flight: &mut JoinSet<Completion>,
    replies: &mpsc::UnboundedSender<CommandReply>,
) {
    let CommandRequest {
        action,
        correlation_id,
    } = request;
    let name = action.name();

    if let Some(device_id) = target_device(&action) {
        if let Err(error) = cache.lookup(device_id) {
            debug!(device_id, action = name, "device not in cache");
            if correlation_id.is_some() {
                let _ = replies.send(CommandReply::failed(correlation_id, error));
            }
            return;
        }
    }

    let cloud = Arc::clone(cloud);
    let auth = Arc::clone(auth);
    in_flight.spawn(async move {
        let result = run(tenant, &auth, cloud.as_ref(), action).await;
        Completion {
            correlation_id,
            action: name,
            result,
        }
    });
}

fn target_device(action: &CommandAction) -> Option<&str> {
    match action {
        CommandAction::GetVariable { device_id, .. }
        | CommandAction::CallFunction { device_id, .. }
        | CommandAction::Rename { device_id, .. }
        | CommandAction::Unclaim { device_id } => Some(device_id),
        CommandAction::Login { .. } | CommandAction::ListDevices | CommandAction::Publish { .. } => {
            None
        }
    }
}

/// Hold the tenant's session for the whole provider call. Login is the
/// one call that may enter without credentials.
async fn run(
    tenant: Tenant,
    auth: &TenantAuth,
    cloud: &dyn CloudProvider,
    action: CommandAction,
) -> Result<Outcome, WireError> {
    let name = action.name();
    let _session = if matches!(action, CommandAction::Login { .. }) {
        auth.enter_unauthenticated(tenant).await
    } else {
        auth.enter(tenant, cloud).await?
    };
    guarded(name, execute(tenant, auth, cloud, action)).await
}

async fn execute(
    tenant: Tenant,
    auth: &TenantAuth,
    cloud: &dyn CloudProvider,
    action: CommandAction,
) -> Result<Outcome, WireError> {
    match action {
        CommandAction::Login { username, password } => {
            let password = SecretString::from(password.expose().to_owned());
            cloud.login(&username, &password).await?;
            if let Some(token) = cloud.access_token() {
                auth.record_session(tenant, token);
            }
            Ok(Outcome::Done)
        }
        CommandAction::ListDevices => {
            let snapshots = cloud.list_devices().await?;
            Ok(Outcome::Devices(
                snapshots.into_iter().map(DeviceRecord::from).collect(),
            ))
        }
        CommandAction::GetVariable { device_id, name } => {
            let value = cloud.get_variable(&device_id, &name).await?;
            Ok(Outcome::Variable(value))
        }
        CommandAction::CallFunction {
            device_id,
            name,
            args,
        } => {
            let code = cloud.call_function(&device_id, &name, &args).await?;
            Ok(Outcome::ReturnCode(code))
        }
        CommandAction::Rename { device_id, name } => {
            cloud.rename(&device_id, &name).await?;
            Ok(Outcome::Renamed { device_id, name })
        }
        CommandAction::Unclaim { device_id } => {
            cloud.unclaim(&device_id).await?;
            Ok(Outcome::Unclaimed { device_id })
        }
        CommandAction::Publish {
            name,
            data,
            is_private,
            ttl,
        } => {
            cloud
                .publish(&name, data.as_deref(), is_private, ttl)
                .await?;
            Ok(Outcome::Done)
        }
    }
}

fn finish(
    tenant: Tenant,
    completion: Completion,
    cache: &mut DeviceCache,
    replies: &mpsc::UnboundedSender<CommandReply>,
) {
    let Completion {
        correlation_id,
        action,
        result,
    } = completion;

    let reply = match result {
        Ok(outcome) => CommandReply::ok(correlation_id, apply(cache, outcome)),
        Err(error) => {
            if correlation_id.is_none() {
                warn!(tenant = %tenant, action, error = %error, "command failed");
                return;
            }
            CommandReply::failed(correlation_id, error)
        }
    };

    if correlation_id.is_some() && replies.send(reply).is_err() {
        debug!(tenant = %tenant, action, "reply pump gone, dropping reply");
    }
}

/// Fold a provider outcome into the cache and produce the reply payload.
fn apply(cache: &mut DeviceCache, outcome: Outcome) -> ReplyData {
    match outcome {
        Outcome::Done => ReplyData::Done,
        Outcome::Devices(records) => {
            cache.replace(&records);
            ReplyData::Devices(records)
        }
        Outcome::Variable(value) => ReplyData::Variable(value),
        Outcome::ReturnCode(code) => ReplyData::ReturnCode(code),
        Outcome::Renamed { device_id, name } => {
            cache.rename(&device_id, &name);
            ReplyData::Done
        }
        Outcome::Unclaimed { device_id } => {
            cache.evict(&device_id);
            ReplyData::Done
        }
    }
}

// ── Reply pump ───────────────────────────────────────────────────────

async fn reply_pump_task(
    tenant: Tenant,
    mut replies: mpsc::UnboundedReceiver<CommandReply>,
    correlator: Arc<Correlator>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            reply = replies.recv() => {
                let Some(reply) = reply else { break };
                correlator.resolve(reply);
            }
        }
    }
    debug!(tenant = %tenant, "reply pump stopped");
}
