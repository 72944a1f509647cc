//! Shared helpers for command handlers.

use fleetbus_core::Device;

use super::Session;
use crate::error::CliError;

/// Resolve a device by id or name from a fresh listing.
///
/// The listing also primes the tenant's device cache, which every
/// device-scoped call requires.
pub async fn find_device(session: &Session, identifier: &str) -> Result<Device, CliError> {
    let devices = session.fleet.list_devices(session.tenant).await?;
    devices
        .into_iter()
        .find(|d| d.id == identifier || d.name.as_deref() == Some(identifier))
        .ok_or_else(|| CliError::device_not_found(identifier))
}
