// ── Device cache ──
//
// Owned by one command worker. Empty until the first successful listing;
// lookups before then, or for ids the last listing did not return, fail
// with `NotFound` so callers know to refresh.

use std::collections::HashMap;

use crate::boundary::WireError;
use crate::model::DeviceRecord;

#[derive(Debug, Default)]
pub(crate) struct DeviceCache {
    devices: Option<HashMap<String, DeviceRecord>>,
}

impl DeviceCache {
    pub(crate) fn replace(&mut self, records: &[DeviceRecord]) {
        self.devices = Some(
            records
                .iter()
                .map(|record| (record.id.clone(), record.clone()))
                .collect(),
        );
    }

    pub(crate) fn lookup(&self, device_id: &str) -> Result<&DeviceRecord, WireError> {
        self.devices
            .as_ref()
            .and_then(|devices| devices.get(device_id))
            .ok_or_else(|| WireError::not_found(device_id))
    }

    pub(crate) fn rename(&mut self, device_id: &str, name: &str) {
        if let Some(record) = self.devices.as_mut().and_then(|d| d.get_mut(device_id)) {
            record.name = Some(name.to_owned());
        }
    }

    pub(crate) fn evict(&mut self, device_id: &str) {
        if let Some(devices) = self.devices.as_mut() {
            devices.remove(device_id);
        }
    }

    #[cfg(test)]
    pub(crate) fn is_populated(&self) -> bool {
        self.devices.is_some()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::DeviceSnapshot;

    fn lamp() -> DeviceRecord {
        DeviceSnapshot::new("dev1", "lamp").into()
    }

    #[test]
    fn lookup_before_listing_is_not_found() {
        let cache = DeviceCache::default();
        assert!(!cache.is_populated());
        assert_eq!(cache.lookup("dev1").unwrap_err(), WireError::not_found("dev1"));
    }

    #[test]
    fn rename_and_evict_update_cached_records() {
        let mut cache = DeviceCache::default();
        cache.replace(&[lamp()]);
        cache.rename("dev1", "porch");
        assert_eq!(cache.lookup("dev1").unwrap().name.as_deref(), Some("porch"));

        cache.evict("dev1");
        assert!(cache.lookup("dev1").is_err());
        assert!(cache.is_populated());
    }

    #[test]
    fn replace_drops_stale_ids() {
        let mut cache = DeviceCache::default();
        cache.replace(&[lamp()]);
        cache.replace(&[DeviceSnapshot::new("dev2", "fan").into()]);
        assert!(cache.lookup("dev1").is_err());
        assert!(cache.lookup("dev2").is_ok());
    }
}
