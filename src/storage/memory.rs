use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{device_id_from_column, device_id_to_column, DeviceScope, DeviceStore, StoreError};
use crate::models::{Device, DeviceChanges, NewDevice};

/// Process-local store with the same uniqueness rules as the Postgres table.
#[derive(Default)]
pub struct MemoryDeviceStore {
    devices: RwLock<BTreeMap<i64, Device>>,
}

impl MemoryDeviceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn stored_device_id(value: i128) -> Result<u64, StoreError> {
    device_id_to_column(value).map(device_id_from_column)
}

/// One past the highest id, like a sequence. Once a client has taken
/// `i64::MAX` the lowest free positive id is used instead.
fn next_id(devices: &BTreeMap<i64, Device>) -> i64 {
    match devices.keys().next_back() {
        None => 1,
        Some(last) => last
            .checked_add(1)
            .unwrap_or_else(|| (1..).find(|id| !devices.contains_key(id)).unwrap_or(1)),
    }
}

#[async_trait]
impl DeviceStore for MemoryDeviceStore {
    async fn list(&self, scope: DeviceScope) -> Result<Vec<Device>, StoreError> {
        let devices = self.devices.read().await;
        Ok(devices
            .values()
            .filter(|device| scope.contains(device))
            .cloned()
            .collect())
    }

    async fn find_by_registration_id(
        &self,
        scope: DeviceScope,
        registration_id: &str,
    ) -> Result<Option<Device>, StoreError> {
        let devices = self.devices.read().await;
        Ok(devices
            .values()
            .find(|device| device.registration_id == registration_id && scope.contains(device))
            .cloned())
    }

    async fn registration_id_taken(
        &self,
        registration_id: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let devices = self.devices.read().await;
        Ok(devices
            .values()
            .any(|device| device.registration_id == registration_id && Some(device.id) != exclude_id))
    }

    async fn insert(&self, device: NewDevice) -> Result<Device, StoreError> {
        let device_id = device.device_id.map(stored_device_id).transpose()?;

        let mut devices = self.devices.write().await;
        let id = match device.id {
            Some(id) if devices.contains_key(&id) => return Err(StoreError::duplicate_id()),
            Some(id) => id,
            None => next_id(&devices),
        };
        if devices
            .values()
            .any(|existing| existing.registration_id == device.registration_id)
        {
            return Err(StoreError::duplicate_registration_id());
        }

        let stored = Device {
            id,
            name: device.name,
            registration_id: device.registration_id,
            device_id,
            active: device.active,
            date_created: Utc::now(),
            user_id: device.user_id,
        };
        devices.insert(id, stored.clone());

        Ok(stored)
    }

    async fn update(&self, id: i64, changes: DeviceChanges) -> Result<Device, StoreError> {
        let device_id = match changes.device_id {
            Some(Some(value)) => Some(Some(stored_device_id(value)?)),
            Some(None) => Some(None),
            None => None,
        };

        let mut devices = self.devices.write().await;
        if let Some(registration_id) = &changes.registration_id {
            if devices
                .values()
                .any(|other| other.id != id && &other.registration_id == registration_id)
            {
                return Err(StoreError::duplicate_registration_id());
            }
        }

        let device = devices.get_mut(&id).ok_or(StoreError::NotFound)?;
        if let Some(name) = changes.name {
            device.name = name;
        }
        if let Some(registration_id) = changes.registration_id {
            device.registration_id = registration_id;
        }
        if let Some(device_id) = device_id {
            device.device_id = device_id;
        }
        if let Some(active) = changes.active {
            device.active = active;
        }
        if let Some(user_id) = changes.user_id {
            device.user_id = Some(user_id);
        }

        Ok(device.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut devices = self.devices.write().await;
        devices.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}
