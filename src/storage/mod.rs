pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{
    Device, DeviceChanges, NewDevice, DEVICE_ID_OUT_OF_RANGE_MESSAGE, DUPLICATE_ID_MESSAGE,
    UNIQUE_FIELD_MESSAGE,
};

pub use memory::MemoryDeviceStore;
pub use postgres::PgDeviceStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{field}: {message}")]
    Conflict {
        field: &'static str,
        message: &'static str,
    },
    #[error("{field}: {message}")]
    OutOfRange {
        field: &'static str,
        message: &'static str,
    },
    #[error("Device not found")]
    NotFound,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn duplicate_registration_id() -> Self {
        StoreError::Conflict {
            field: "registration_id",
            message: UNIQUE_FIELD_MESSAGE,
        }
    }

    pub fn duplicate_id() -> Self {
        StoreError::Conflict {
            field: "id",
            message: DUPLICATE_ID_MESSAGE,
        }
    }
}

/// Which records a query may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceScope {
    All,
    OwnedBy(Uuid),
}

impl DeviceScope {
    pub fn owner(&self) -> Option<Uuid> {
        match self {
            DeviceScope::All => None,
            DeviceScope::OwnedBy(user_id) => Some(*user_id),
        }
    }

    pub fn contains(&self, device: &Device) -> bool {
        match self {
            DeviceScope::All => true,
            DeviceScope::OwnedBy(user_id) => device.is_owned_by(*user_id),
        }
    }
}

/// Persistence for device registrations.
///
/// Implementations must enforce uniqueness of both `id` and
/// `registration_id`, reporting violations as [`StoreError::Conflict`].
#[async_trait]
pub trait DeviceStore: Send + Sync {
    async fn list(&self, scope: DeviceScope) -> Result<Vec<Device>, StoreError>;

    async fn find_by_registration_id(
        &self,
        scope: DeviceScope,
        registration_id: &str,
    ) -> Result<Option<Device>, StoreError>;

    /// Whether any record other than `exclude_id` uses `registration_id`.
    async fn registration_id_taken(
        &self,
        registration_id: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError>;

    async fn insert(&self, device: NewDevice) -> Result<Device, StoreError>;

    async fn update(&self, id: i64, changes: DeviceChanges) -> Result<Device, StoreError>;

    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}

/// Map a decoded device id onto the signed 64-bit column.
///
/// Values above `i64::MAX` keep their unsigned bit pattern, so anything in
/// `i64::MIN..=u64::MAX` is storable.
pub fn device_id_to_column(value: i128) -> Result<i64, StoreError> {
    let out_of_range = StoreError::OutOfRange {
        field: "device_id",
        message: DEVICE_ID_OUT_OF_RANGE_MESSAGE,
    };

    if value < 0 {
        i64::try_from(value).map_err(|_| out_of_range)
    } else {
        u64::try_from(value)
            .map(|unsigned| unsigned as i64)
            .map_err(|_| out_of_range)
    }
}

pub fn device_id_from_column(value: i64) -> u64 {
    value as u64
}
