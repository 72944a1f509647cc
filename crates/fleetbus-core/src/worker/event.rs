// ── Event worker ──
//
// One per tenant. Owns the tenant's native provider subscriptions and
// forwards matching events as `EventMessage`s to a pump task, which
// hands them to the subscription registry on the facade side. Native
// subscribes run inside the tenant's session.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::guarded;
use crate::auth::TenantAuth;
use crate::boundary::{self, Boundary, EventAction, EventMessage, WireError};
use crate::cloud::{CloudProvider, EventSink, SubscriptionHandle};
use crate::error::BusError;
use crate::model::{DeviceEvent, SubscriptionKey, Tenant};
use crate::registry::SubscriptionRegistry;

/// Facade-side handle to a tenant's event worker.
#[derive(Clone)]
pub struct EventWorker {
    inner: Arc<EventWorkerInner>,
}

struct EventWorkerInner {
    tenant: Tenant,
    tx: mpsc::UnboundedSender<EventAction>,
    cancel: CancellationToken,
}

impl EventWorker {
    /// Start the worker and its event pump on `runtime`.
    pub fn spawn(
        tenant: Tenant,
        cloud: Arc<dyn CloudProvider>,
        auth: Arc<TenantAuth>,
        registry: Arc<SubscriptionRegistry>,
        runtime: &Handle,
    ) -> Self {
        let (tx, rx) = boundary::unbounded::<EventAction>();
        let (message_tx, message_rx) = boundary::unbounded::<EventMessage>();
        let cancel = CancellationToken::new();

        runtime.spawn(event_worker_task(
            tenant,
            cloud,
            auth,
            rx,
            message_tx,
            cancel.clone(),
        ));
        runtime.spawn(event_pump_task(
            tenant,
            message_rx,
            registry,
            cancel.clone(),
        ));

        Self {
            inner: Arc::new(EventWorkerInner { tenant, tx, cancel }),
        }
    }

    pub fn tenant(&self) -> Tenant {
        self.inner.tenant
    }

    pub fn send(&self, action: EventAction) -> Result<(), BusError> {
        if self.is_terminated() {
            return Err(BusError::Shutdown);
        }
        self.inner.tx.send(action).map_err(|_| BusError::Shutdown)
    }

    pub fn terminate(&self) {
        self.inner.cancel.cancel();
        debug!(tenant = %self.inner.tenant, "event worker terminated");
    }

    pub fn is_terminated(&self) -> bool {
        self.inner.cancel.is_cancelled()
    }
}

impl fmt::Debug for EventWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventWorker")
            .field("tenant", &self.inner.tenant)
            .field("terminated", &self.is_terminated())
            .finish_non_exhaustive()
    }
}

// ── Worker side ──────────────────────────────────────────────────────

async fn event_worker_task(
    tenant: Tenant,
    cloud: Arc<dyn CloudProvider>,
    auth: Arc<TenantAuth>,
    mut actions: mpsc::UnboundedReceiver<EventAction>,
    messages: mpsc::UnboundedSender<EventMessage>,
    cancel: CancellationToken,
) {
    debug!(tenant = %tenant, "event worker started");
    let (sink_tx, mut sink_rx) = mpsc::unbounded_channel::<(SubscriptionKey, DeviceEvent)>();
    let mut native: HashMap<SubscriptionKey, SubscriptionHandle> = HashMap::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            action = actions.recv() => {
                let Some(action) = action else { break };
                trace!(tenant = %tenant, envelope = %action.to_wire(), "event action received");
                match action {
                    EventAction::Subscribe { key, generation } => {
                        if native.contains_key(&key) {
                            debug!(tenant = %tenant, key = %key, "already subscribed natively");
                            continue;
                        }
                        let sink = EventSink::new(key.clone(), sink_tx.clone());
                        let subscribed = match auth.enter(tenant, cloud.as_ref()).await {
                            Ok(_session) => {
                                guarded("subscribe", async {
                                    cloud
                                        .subscribe(key.prefix(), key.device_id(), sink)
                                        .await
                                        .map_err(WireError::from)
                                })
                                .await
                            }
                            Err(error) => Err(error),
                        };
                        match subscribed {
                            Ok(handle) => {
                                debug!(tenant = %tenant, key = %key, "native subscription created");
                                native.insert(key, handle);
                            }
                            Err(error) => {
                                let _ = messages.send(EventMessage::rejected(key, generation, error));
                            }
                        }
                    }
                    EventAction::Unsubscribe { key } => {
                        if let Some(handle) = native.remove(&key) {
                            cloud.unsubscribe(handle);
                            debug!(tenant = %tenant, key = %key, "native subscription removed");
                        } else {
                            debug!(tenant = %tenant, key = %key, "no native subscription to remove");
                        }
                    }
                }
            }
            Some((key, event)) = sink_rx.recv() => {
                // Events queued before an unsubscribe are dropped here.
                if native.contains_key(&key) && messages.send(EventMessage::event(key, event)).is_err() {
                    break;
                }
            }
        }
    }

    for (_, handle) in native.drain() {
        cloud.unsubscribe(handle);
    }
    debug!(tenant = %tenant, "event worker stopped");
}

// ── Event pump ───────────────────────────────────────────────────────

async fn event_pump_task(
    tenant: Tenant,
    mut messages: mpsc::UnboundedReceiver<EventMessage>,
    registry: Arc<SubscriptionRegistry>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = messages.recv() => {
                let Some(message) = message else { break };
                deliver(tenant, message, &registry);
            }
        }
    }
    debug!(tenant = %tenant, "event pump stopped");
}

fn deliver(tenant: Tenant, message: EventMessage, registry: &SubscriptionRegistry) {
    let EventMessage {
        success,
        key,
        generation,
        data,
        error,
    } = message;

    if success {
        if let Some(event) = data {
            registry.dispatch(tenant, &key, event);
        }
        return;
    }

    let reason = error.map_or_else(|| "unknown error".to_owned(), |e| e.to_string());
    warn!(tenant = %tenant, key = %key, error = %reason, "subscription rejected");
    let removed = generation.is_some_and(|g| registry.remove_registration(tenant, &key, g));
    if !removed {
        debug!(tenant = %tenant, key = %key, "key was registered again, keeping handler");
    }
}
