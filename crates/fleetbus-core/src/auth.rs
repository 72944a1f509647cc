// ── Tenant auth manager ──
//
// All tenants share one provider session. Each tenant's access token is
// kept here and injected whenever a call for that tenant follows a call
// for another one. Tokens live only in memory.
//
// Workers enter the session before every provider call. While one tenant
// holds it, calls for that tenant run concurrently and every other tenant
// waits, so a token switch can never land under a call in flight.

use std::collections::HashMap;
use std::convert::Infallible;
use std::pin::pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

use secrecy::SecretString;
use tokio::sync::Notify;
use tracing::{debug, trace};

use crate::boundary::{WireError, WireErrorKind};
use crate::cloud::CloudProvider;
use crate::error::BusError;
use crate::model::Tenant;

#[derive(Default)]
struct AuthState {
    tokens: HashMap<Tenant, SecretString>,
    active: Option<Tenant>,
    /// Tenant whose calls currently own the provider session.
    holder: Option<Tenant>,
    in_flight: usize,
}

impl AuthState {
    /// Whether the session may switch to `tenant` right now.
    fn is_free_for(&self, tenant: Tenant) -> bool {
        self.holder.is_none_or(|holder| holder == tenant)
    }

    fn switch_to(&mut self, tenant: Tenant, cloud: &dyn CloudProvider) -> bool {
        if self.active == Some(tenant) {
            return false;
        }
        let Some(token) = self.tokens.get(&tenant) else {
            return false;
        };
        cloud.inject_token(token);
        self.active = Some(tenant);
        debug!(tenant = %tenant, "switched session to tenant");
        true
    }

    /// The default tenant may ride on a session nobody injected.
    fn is_authorized(&self, tenant: Tenant, cloud: &dyn CloudProvider) -> bool {
        self.tokens.contains_key(&tenant)
            || (tenant.is_default() && self.active.is_none() && cloud.is_authenticated())
    }
}

fn missing_token(tenant: Tenant) -> String {
    format!("no access token for {tenant}")
}

#[derive(Default)]
pub struct TenantAuth {
    state: Mutex<AuthState>,
    released: Notify,
}

impl TenantAuth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `token` for `tenant` and make it the session's token, unless
    /// another tenant's calls hold the session. Then it is injected on
    /// that tenant's next call.
    pub fn activate(&self, tenant: Tenant, token: SecretString, cloud: &dyn CloudProvider) {
        let mut state = self.state();
        let free = state.is_free_for(tenant);
        if free {
            cloud.inject_token(&token);
            state.active = Some(tenant);
        }
        state.tokens.insert(tenant, token);
        debug!(tenant = %tenant, deferred = !free, "access token activated");
    }

    /// Remember the token a login left on the session, without injecting it.
    pub fn record_session(&self, tenant: Tenant, token: SecretString) {
        let mut state = self.state();
        state.tokens.insert(tenant, token);
        state.active = Some(tenant);
    }

    /// Inject `tenant`'s token if it has one, is not already active and no
    /// other tenant holds the session. Returns whether an injection happened.
    pub fn auth_if_needed(&self, tenant: Tenant, cloud: &dyn CloudProvider) -> bool {
        let mut state = self.state();
        state.is_free_for(tenant) && state.switch_to(tenant, cloud)
    }

    /// Fail fast when a call for `tenant` could never be authorized.
    pub fn check(&self, tenant: Tenant, cloud: &dyn CloudProvider) -> Result<(), BusError> {
        if self.state().is_authorized(tenant, cloud) {
            Ok(())
        } else {
            Err(BusError::Auth {
                message: missing_token(tenant),
            })
        }
    }

    /// Wait until the session is free for `tenant`, switch to its token
    /// and hold the session until the returned guard drops.
    pub async fn enter(
        &self,
        tenant: Tenant,
        cloud: &dyn CloudProvider,
    ) -> Result<SessionGuard<'_>, WireError> {
        self.acquire(tenant, |state| {
            if !state.is_authorized(tenant, cloud) {
                return Err(WireError::new(WireErrorKind::Auth, missing_token(tenant)));
            }
            state.switch_to(tenant, cloud);
            Ok(())
        })
        .await
    }

    /// Hold the session for `tenant` without requiring credentials, for
    /// calls that establish them.
    pub async fn enter_unauthenticated(&self, tenant: Tenant) -> SessionGuard<'_> {
        match self.acquire::<Infallible>(tenant, |_| Ok(())).await {
            Ok(guard) => guard,
            Err(never) => match never {},
        }
    }

    async fn acquire<E>(
        &self,
        tenant: Tenant,
        admit: impl Fn(&mut AuthState) -> Result<(), E>,
    ) -> Result<SessionGuard<'_>, E> {
        loop {
            let mut released = pin!(self.released.notified());
            released.as_mut().enable();
            {
                let mut state = self.state();
                if state.is_free_for(tenant) {
                    admit(&mut state)?;
                    state.holder = Some(tenant);
                    state.in_flight += 1;
                    return Ok(SessionGuard { auth: self });
                }
                trace!(tenant = %tenant, holder = ?state.holder, "waiting for session");
            }
            released.await;
        }
    }

    fn leave(&self) {
        let mut state = self.state();
        state.in_flight = state.in_flight.saturating_sub(1);
        if state.in_flight == 0 {
            state.holder = None;
            drop(state);
            self.released.notify_waiters();
        }
    }

    pub fn has_token(&self, tenant: Tenant) -> bool {
        self.state().tokens.contains_key(&tenant)
    }

    pub fn active(&self) -> Option<Tenant> {
        self.state().active
    }

    /// Forget every token. Sessions still held are released by their guards.
    pub fn clear(&self) {
        let mut state = self.state();
        state.tokens.clear();
        state.active = None;
    }

    fn state(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Holds the provider session for one tenant's call.
#[must_use = "the session is released as soon as the guard drops"]
pub struct SessionGuard<'a> {
    auth: &'a TenantAuth,
}

impl std::fmt::Debug for SessionGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionGuard").finish_non_exhaustive()
    }
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.auth.leave();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::cloud::SimulatedCloud;
    use crate::model::ProductId;
    use tokio_test::{assert_pending, assert_ready_ok, task};

    fn product(id: u32) -> Tenant {
        Tenant::Product(ProductId::new(id))
    }

    #[test]
    fn switching_tenants_injects_once() {
        let cloud = SimulatedCloud::new();
        let auth = TenantAuth::new();
        auth.activate(product(1), SecretString::from("token-a"), &cloud);
        auth.activate(product(2), SecretString::from("token-b"), &cloud);
        assert!(auth.auth_if_needed(product(1), &cloud));

        assert!(auth.auth_if_needed(product(2), &cloud));
        assert!(!auth.auth_if_needed(product(2), &cloud));
        assert!(!auth.auth_if_needed(product(2), &cloud));
        assert_eq!(
            cloud.injected_tokens(),
            vec!["token-a", "token-b", "token-a", "token-b"]
        );
        assert_eq!(auth.active(), Some(product(2)));
    }

    #[test]
    fn tenant_without_token_is_unauthenticated() {
        let cloud = SimulatedCloud::new();
        let auth = TenantAuth::new();
        assert!(matches!(
            auth.check(product(5), &cloud),
            Err(BusError::Auth { .. })
        ));
        assert!(matches!(
            auth.check(Tenant::Default, &cloud),
            Err(BusError::Auth { .. })
        ));

        cloud.inject_token(&SecretString::from("session"));
        assert!(auth.check(Tenant::Default, &cloud).is_ok());
        assert!(!auth.auth_if_needed(product(5), &cloud));
    }

    #[test]
    fn default_tenant_does_not_ride_on_a_product_token() {
        let cloud = SimulatedCloud::new();
        let auth = TenantAuth::new();
        auth.activate(product(1), SecretString::from("token-a"), &cloud);
        assert!(cloud.is_authenticated());
        assert!(matches!(
            auth.check(Tenant::Default, &cloud),
            Err(BusError::Auth { .. })
        ));
    }

    #[test]
    fn recorded_session_is_reinjected_after_a_switch() {
        let cloud = SimulatedCloud::new();
        let auth = TenantAuth::new();
        auth.record_session(Tenant::Default, SecretString::from("login-token"));
        auth.activate(product(3), SecretString::from("product-token"), &cloud);

        assert!(auth.auth_if_needed(Tenant::Default, &cloud));
        assert_eq!(
            cloud.injected_tokens(),
            vec!["product-token", "login-token"]
        );
    }

    #[test]
    fn clear_forgets_every_token() {
        let cloud = SimulatedCloud::new();
        let auth = TenantAuth::new();
        auth.activate(Tenant::Default, SecretString::from("t"), &cloud);
        auth.clear();
        assert!(!auth.has_token(Tenant::Default));
        assert_eq!(auth.active(), None);
    }

    // ── Session ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn other_tenants_wait_for_the_session() {
        let cloud = SimulatedCloud::new();
        let auth = TenantAuth::new();
        auth.activate(product(1), SecretString::from("token-a"), &cloud);
        auth.activate(product(2), SecretString::from("token-b"), &cloud);

        let first = auth.enter(product(1), &cloud).await.unwrap();
        let second = auth.enter(product(1), &cloud).await.unwrap();
        let mut waiting = task::spawn(auth.enter(product(2), &cloud));
        assert_pending!(waiting.poll());

        drop(first);
        assert_pending!(waiting.poll());
        assert_eq!(cloud.injected_tokens(), vec!["token-a", "token-b", "token-a"]);

        drop(second);
        assert!(waiting.is_woken());
        let _session = assert_ready_ok!(waiting.poll());
        assert_eq!(
            cloud.injected_tokens(),
            vec!["token-a", "token-b", "token-a", "token-b"]
        );
        assert_eq!(auth.active(), Some(product(2)));
    }

    #[tokio::test]
    async fn token_activated_mid_call_is_deferred() {
        let cloud = SimulatedCloud::new();
        let auth = TenantAuth::new();
        auth.activate(product(1), SecretString::from("token-a"), &cloud);
        let session = auth.enter(product(1), &cloud).await.unwrap();

        auth.activate(product(2), SecretString::from("token-b"), &cloud);
        assert!(!auth.auth_if_needed(product(2), &cloud));
        assert_eq!(cloud.injected_tokens(), vec!["token-a"]);
        assert_eq!(auth.active(), Some(product(1)));

        drop(session);
        assert!(auth.auth_if_needed(product(2), &cloud));
        assert_eq!(cloud.injected_tokens(), vec!["token-a", "token-b"]);
    }

    #[tokio::test]
    async fn refused_entry_does_not_hold_the_session() {
        let cloud = SimulatedCloud::new();
        let auth = TenantAuth::new();
        let refused = auth.enter(product(5), &cloud).await.err().map(|e| e.kind);
        assert_eq!(refused, Some(WireErrorKind::Auth));

        auth.activate(product(6), SecretString::from("token-f"), &cloud);
        assert_eq!(cloud.injected_tokens(), vec!["token-f"]);
    }
}
