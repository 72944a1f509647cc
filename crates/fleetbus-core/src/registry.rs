// ── Subscription registry ──
//
// Maps (tenant, key) to the one local handler registered for it. Shared
// by the facade, which inserts and removes, and the event pumps, which
// dispatch. Handlers are cloned out of the map before they run, so a
// concurrent unsubscribe never pulls a handler out from under a delivery.
// Every registration gets a fresh generation, so a late answer for an
// earlier registration of the same key cannot touch the current one.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{trace, warn};

use crate::model::{DeviceEvent, SubscriptionKey, Tenant};

/// Callback invoked for each event delivered to a subscription.
pub type EventHandler = Arc<dyn Fn(DeviceEvent) + Send + Sync>;

struct Registration {
    handler: EventHandler,
    generation: u64,
}

#[derive(Default)]
pub struct SubscriptionRegistry {
    handlers: DashMap<(Tenant, SubscriptionKey), Registration>,
    next_generation: AtomicU64,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` unless the key already has one. Returns the
    /// generation of the stored registration.
    pub fn insert_if_absent(
        &self,
        tenant: Tenant,
        key: SubscriptionKey,
        handler: EventHandler,
    ) -> Option<u64> {
        match self.handlers.entry((tenant, key)) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
                slot.insert(Registration {
                    handler,
                    generation,
                });
                Some(generation)
            }
        }
    }

    pub fn remove(&self, tenant: Tenant, key: &SubscriptionKey) -> bool {
        self.handlers.remove(&(tenant, key.clone())).is_some()
    }

    /// Remove the handler only while it is still registration `generation`.
    pub fn remove_registration(
        &self,
        tenant: Tenant,
        key: &SubscriptionKey,
        generation: u64,
    ) -> bool {
        self.handlers
            .remove_if(&(tenant, key.clone()), |_, registration| {
                registration.generation == generation
            })
            .is_some()
    }

    pub fn contains(&self, tenant: Tenant, key: &SubscriptionKey) -> bool {
        self.handlers.contains_key(&(tenant, key.clone()))
    }

    pub fn clear(&self) {
        self.handlers.clear();
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler registered for `key`. Events for unknown keys are
    /// dropped. A panicking handler is logged and does not affect others.
    pub fn dispatch(&self, tenant: Tenant, key: &SubscriptionKey, event: DeviceEvent) -> bool {
        let handler = self
            .handlers
            .get(&(tenant, key.clone()))
            .map(|entry| Arc::clone(&entry.value().handler));
        let Some(handler) = handler else {
            trace!(tenant = %tenant, key = %key, "no handler for event");
            return false;
        };
        if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
            warn!(tenant = %tenant, key = %key, "event handler panicked");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;

    fn event(prefix: &str) -> DeviceEvent {
        DeviceEvent {
            prefix: prefix.into(),
            event_name: format!("{prefix}/x"),
            data: None,
            published_at: Utc::now(),
            device_id: None,
        }
    }

    fn counting(counter: &Arc<AtomicUsize>) -> EventHandler {
        let counter = Arc::clone(counter);
        Arc::new(move |_: DeviceEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn second_handler_for_a_key_is_ignored() {
        let registry = SubscriptionRegistry::new();
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let key = SubscriptionKey::global("temp");

        assert_eq!(
            registry.insert_if_absent(Tenant::Default, key.clone(), counting(&first)),
            Some(1)
        );
        assert_eq!(
            registry.insert_if_absent(Tenant::Default, key.clone(), counting(&second)),
            None
        );

        assert!(registry.dispatch(Tenant::Default, &key, event("temp")));
        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn tenants_do_not_share_handlers() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let key = SubscriptionKey::global("temp");
        registry.insert_if_absent(Tenant::from(Some(1_u32)), key.clone(), counting(&hits));

        assert!(!registry.dispatch(Tenant::Default, &key, event("temp")));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn panicking_handler_is_contained() {
        let registry = SubscriptionRegistry::new();
        let key = SubscriptionKey::device("dev1", "alarm");
        let faulty: EventHandler = Arc::new(|_: DeviceEvent| panic!("handler bug"));
        registry.insert_if_absent(Tenant::Default, key.clone(), faulty);
        assert!(registry.dispatch(Tenant::Default, &key, event("alarm")));
        assert!(registry.contains(Tenant::Default, &key));
    }

    #[test]
    fn removal_leaves_inflight_handler_usable() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let key = SubscriptionKey::global("temp");
        registry.insert_if_absent(Tenant::Default, key.clone(), counting(&hits));

        let held = registry
            .handlers
            .get(&(Tenant::Default, key.clone()))
            .map(|entry| Arc::clone(&entry.value().handler));
        assert!(registry.remove(Tenant::Default, &key));
        if let Some(handler) = held {
            handler(event("temp"));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn stale_generation_leaves_newer_handler() {
        let registry = SubscriptionRegistry::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let key = SubscriptionKey::global("temp");

        let old = registry
            .insert_if_absent(Tenant::Default, key.clone(), counting(&hits))
            .unwrap_or_default();
        registry.remove(Tenant::Default, &key);
        let current = registry
            .insert_if_absent(Tenant::Default, key.clone(), counting(&hits))
            .unwrap_or_default();
        assert!(current > old);

        assert!(!registry.remove_registration(Tenant::Default, &key, old));
        assert!(registry.dispatch(Tenant::Default, &key, event("temp")));
        assert!(registry.remove_registration(Tenant::Default, &key, current));
        assert!(registry.is_empty());
    }
}
