// ── Provider → boundary conversions ──
//
// Provider data is normalized here before it crosses back to the facade.

use crate::boundary::{WireError, WireErrorKind};
use crate::cloud::CloudError;
use crate::model::{DeviceRecord, DeviceSnapshot, DeviceType, VariableType};

impl From<DeviceSnapshot> for DeviceRecord {
    fn from(snapshot: DeviceSnapshot) -> Self {
        Self {
            device_type: DeviceType::from_platform_id(snapshot.platform_id),
            functions: snapshot.functions.into_iter().collect(),
            variables: snapshot
                .variables
                .into_iter()
                .map(|(name, declared)| {
                    let kind = VariableType::from_declared(&declared);
                    (name, kind)
                })
                .collect(),
            id: snapshot.id,
            name: snapshot.name,
            status: snapshot.status,
            connected: snapshot.connected,
            product_id: snapshot.product_id,
        }
    }
}

impl From<CloudError> for WireError {
    fn from(err: CloudError) -> Self {
        match err {
            CloudError::Auth(message) => WireError::new(WireErrorKind::Auth, message),
            CloudError::UnknownDevice(id) => WireError::not_found(id),
            CloudError::Network(_) | CloudError::Remote(_) => WireError::remote(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ProductId;
    use pretty_assertions::assert_eq;

    #[test]
    fn snapshot_normalizes_into_record() {
        let snapshot = DeviceSnapshot::new("dev1", "lamp")
            .with_platform(6)
            .with_product(ProductId::new(9))
            .with_function("toggle")
            .with_function("toggle")
            .with_variable("brightness", "int32")
            .with_variable("blob", "bytes")
            .connected(true);

        let record = DeviceRecord::from(snapshot);
        assert_eq!(record.device_type, DeviceType::Photon);
        assert_eq!(record.functions.len(), 1);
        assert_eq!(record.variables["brightness"], VariableType::Int);
        assert_eq!(record.variables["blob"], VariableType::String);
        assert_eq!(record.product_id, Some(ProductId::new(9)));
        assert!(record.connected);
    }

    #[test]
    fn unknown_device_becomes_not_found() {
        let wire = WireError::from(CloudError::UnknownDevice("dev9".into()));
        assert_eq!(wire, WireError::not_found("dev9"));

        let wire = WireError::from(CloudError::Network("reset".into()));
        assert_eq!(wire.kind, WireErrorKind::Remote);
        assert_eq!(wire.message, "Network error: reset");
    }
}
