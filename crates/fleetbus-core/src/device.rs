// ── Device handle ──
//
// A listed `DeviceRecord` with its operations reattached. Every method
// forwards into the bus using only the device id and the tenant that
// listed the device; nothing here touches worker state.

use std::fmt;
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use crate::error::BusError;
use crate::fleet::Fleet;
use crate::model::{DeviceEvent, DeviceRecord, SubscriptionKey, Tenant, VariableValue};

#[derive(Clone)]
pub struct Device {
    record: DeviceRecord,
    tenant: Tenant,
    fleet: Fleet,
}

impl Device {
    pub(crate) fn new(record: DeviceRecord, tenant: Tenant, fleet: Fleet) -> Self {
        Self {
            record,
            tenant,
            fleet,
        }
    }

    pub fn record(&self) -> &DeviceRecord {
        &self.record
    }

    pub fn into_record(self) -> DeviceRecord {
        self.record
    }

    /// The tenant whose worker listed this device and serves its calls.
    pub fn tenant(&self) -> Tenant {
        self.tenant
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.record.functions.contains(name)
    }

    /// Rename the device. The local record is updated once the cloud
    /// accepts the new name.
    pub async fn rename(&mut self, name: &str) -> Result<(), BusError> {
        self.fleet.rename(self.tenant, &self.record.id, name).await?;
        self.record.name = Some(name.to_owned());
        Ok(())
    }

    /// Release the device from the account. Later calls through any handle
    /// to it fail with `NotFound`.
    pub async fn unclaim(&self) -> Result<(), BusError> {
        self.fleet.unclaim(self.tenant, &self.record.id).await
    }

    /// Invoke a cloud function and return its integer result.
    pub fn call_function<I>(
        &self,
        name: &str,
        args: I,
    ) -> impl Future<Output = Result<i32, BusError>> + Send + '_
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let name = name.to_owned();
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        async move {
            self.fleet
                .call_function(self.tenant, &self.record.id, name, args)
                .await
        }
    }

    pub async fn get_variable(&self, name: &str) -> Result<VariableValue, BusError> {
        self.fleet
            .get_variable(self.tenant, &self.record.id, name)
            .await
    }

    /// Subscribe to this device's events starting with `prefix`.
    pub fn subscribe<F>(&self, prefix: &str, handler: F) -> Result<(), BusError>
    where
        F: Fn(DeviceEvent) + Send + Sync + 'static,
    {
        self.fleet
            .subscribe_key(self.tenant, self.key(prefix), Arc::new(handler))
    }

    pub fn unsubscribe(&self, prefix: &str) -> Result<(), BusError> {
        self.fleet.unsubscribe_key(self.tenant, &self.key(prefix))
    }

    fn key(&self, prefix: &str) -> SubscriptionKey {
        SubscriptionKey::device(self.record.id.clone(), prefix)
    }
}

impl Deref for Device {
    type Target = DeviceRecord;

    fn deref(&self) -> &Self::Target {
        &self.record
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("id", &self.record.id)
            .field("name", &self.record.name)
            .field("tenant", &self.tenant)
            .finish_non_exhaustive()
    }
}
