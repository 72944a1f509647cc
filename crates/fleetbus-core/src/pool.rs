// ── Worker pool ──
//
// Lazily creates one command worker and one event worker per tenant and
// tears them all down on logout. Once terminated the pool refuses new
// workers until a new login reopens it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::auth::TenantAuth;
use crate::cloud::CloudProvider;
use crate::config::BusConfig;
use crate::error::BusError;
use crate::model::Tenant;
use crate::registry::SubscriptionRegistry;
use crate::worker::{CommandWorker, EventWorker};

pub struct WorkerPool {
    cloud: Arc<dyn CloudProvider>,
    config: BusConfig,
    auth: Arc<TenantAuth>,
    registry: Arc<SubscriptionRegistry>,
    command: DashMap<Tenant, CommandWorker>,
    event: DashMap<Tenant, EventWorker>,
    open: AtomicBool,
    live: AtomicUsize,
    spawned: AtomicUsize,
}

impl WorkerPool {
    pub fn new(
        cloud: Arc<dyn CloudProvider>,
        config: BusConfig,
        auth: Arc<TenantAuth>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        Self {
            cloud,
            config,
            auth,
            registry,
            command: DashMap::new(),
            event: DashMap::new(),
            open: AtomicBool::new(true),
            live: AtomicUsize::new(0),
            spawned: AtomicUsize::new(0),
        }
    }

    /// The tenant's command worker, started on first use.
    pub fn ensure_command_worker(&self, tenant: Tenant) -> Result<CommandWorker, BusError> {
        self.ensure(&self.command, tenant, "command", CommandWorker::terminate, |runtime| {
            CommandWorker::spawn(
                tenant,
                Arc::clone(&self.cloud),
                Arc::clone(&self.auth),
                &self.config,
                runtime,
            )
        })
    }

    /// The tenant's event worker, started on first use.
    pub fn ensure_event_worker(&self, tenant: Tenant) -> Result<EventWorker, BusError> {
        self.ensure(&self.event, tenant, "event", EventWorker::terminate, |runtime| {
            EventWorker::spawn(
                tenant,
                Arc::clone(&self.cloud),
                Arc::clone(&self.auth),
                Arc::clone(&self.registry),
                runtime,
            )
        })
    }

    fn ensure<W, R>(
        &self,
        workers: &DashMap<Tenant, W>,
        tenant: Tenant,
        kind: &'static str,
        terminate: impl Fn(&W) -> R,
        spawn: impl FnOnce(&Handle) -> W,
    ) -> Result<W, BusError>
    where
        W: Clone,
    {
        if !self.is_open() {
            return Err(BusError::Shutdown);
        }
        if let Some(worker) = workers.get(&tenant) {
            return Ok(worker.clone());
        }

        let worker = match workers.entry(tenant) {
            Entry::Occupied(existing) => existing.get().clone(),
            Entry::Vacant(slot) => {
                let runtime = Handle::try_current().map_err(|e| BusError::Setup {
                    tenant,
                    message: e.to_string(),
                })?;
                self.reserve(tenant)?;
                let worker = spawn(&runtime);
                self.spawned.fetch_add(1, Ordering::Relaxed);
                debug!(tenant = %tenant, kind, "worker spawned");
                slot.insert(worker.clone());
                worker
            }
        };

        // A concurrent terminate_all may have drained the map before our insert.
        if !self.is_open() {
            if let Some((_, stale)) = workers.remove(&tenant) {
                terminate(&stale);
                self.live.fetch_sub(1, Ordering::SeqCst);
            }
            return Err(BusError::Shutdown);
        }
        Ok(worker)
    }

    fn reserve(&self, tenant: Tenant) -> Result<(), BusError> {
        let limit = self.config.max_workers;
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (limit == 0 || live < limit).then_some(live + 1)
            })
            .map(|_| ())
            .map_err(|_| BusError::Setup {
                tenant,
                message: format!("worker limit of {limit} reached"),
            })
    }

    /// Stop every worker and reject all pending requests before returning.
    /// Returns the number of rejected requests.
    pub fn terminate_all(&self) -> usize {
        self.open.store(false, Ordering::SeqCst);
        let mut rejected = 0;
        let mut stopped = 0;
        self.command.retain(|_, worker| {
            rejected += worker.terminate();
            stopped += 1;
            false
        });
        self.event.retain(|_, worker| {
            worker.terminate();
            stopped += 1;
            false
        });
        self.live.fetch_sub(stopped, Ordering::SeqCst);
        info!(stopped, rejected, "worker pool terminated");
        rejected
    }

    pub fn reopen(&self) {
        if !self.open.swap(true, Ordering::SeqCst) {
            debug!("worker pool reopened");
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    pub fn command_workers(&self) -> usize {
        self.command.len()
    }

    pub fn event_workers(&self) -> usize {
        self.event.len()
    }

    /// Total workers started over the pool's lifetime.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cloud::SimulatedCloud;
    use crate::model::ProductId;

    fn pool(config: BusConfig) -> WorkerPool {
        WorkerPool::new(
            Arc::new(SimulatedCloud::new()),
            config,
            Arc::new(TenantAuth::new()),
            Arc::new(SubscriptionRegistry::new()),
        )
    }

    #[tokio::test]
    async fn creation_is_idempotent_per_tenant() {
        let pool = pool(BusConfig::default());
        pool.ensure_command_worker(Tenant::Default).unwrap();
        pool.ensure_command_worker(Tenant::Default).unwrap();
        pool.ensure_event_worker(Tenant::Default).unwrap();
        assert_eq!(pool.spawned(), 2);
        assert_eq!(pool.command_workers(), 1);
        assert_eq!(pool.event_workers(), 1);
    }

    #[test]
    fn spawning_without_runtime_is_setup_error() {
        let pool = pool(BusConfig::default());
        let err = pool.ensure_command_worker(Tenant::Default).unwrap_err();
        assert!(matches!(err, BusError::Setup { tenant: Tenant::Default, .. }));
        assert_eq!(pool.command_workers(), 0);
    }

    #[tokio::test]
    async fn worker_limit_is_enforced() {
        let pool = pool(BusConfig::default().with_max_workers(1));
        pool.ensure_command_worker(Tenant::Default).unwrap();
        let other = Tenant::Product(ProductId::new(9));
        let err = pool.ensure_command_worker(other).unwrap_err();
        assert!(matches!(err, BusError::Setup { tenant, .. } if tenant == other));
    }

    #[tokio::test]
    async fn terminated_pool_stays_closed_until_reopened() {
        let pool = pool(BusConfig::default().with_max_workers(2));
        let worker = pool.ensure_command_worker(Tenant::Default).unwrap();
        pool.ensure_event_worker(Tenant::Default).unwrap();

        pool.terminate_all();
        assert!(worker.is_terminated());
        assert_eq!(pool.command_workers(), 0);
        assert!(matches!(
            pool.ensure_command_worker(Tenant::Default),
            Err(BusError::Shutdown)
        ));

        pool.reopen();
        let fresh = pool.ensure_command_worker(Tenant::Default).unwrap();
        assert!(!fresh.is_terminated());
        pool.ensure_event_worker(Tenant::Default).unwrap();
    }
}
