use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const UNIQUE_FIELD_MESSAGE: &str = "This field must be unique.";
pub const DEVICE_ID_OUT_OF_RANGE_MESSAGE: &str = "Device ID is out of range";
pub const DUPLICATE_ID_MESSAGE: &str = "device with this id already exists.";

/// An FCM device registration.
///
/// `device_id` is reported as a plain integer; the hex form is only accepted
/// on input. The owner is never serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Device {
    pub id: i64,
    pub name: Option<String>,
    pub registration_id: String,
    #[serde(serialize_with = "crate::services::hex_integer::serialize")]
    pub device_id: Option<u64>,
    pub active: bool,
    pub date_created: DateTime<Utc>,
    #[serde(skip)]
    pub user_id: Option<Uuid>,
}

impl Device {
    pub fn is_owned_by(&self, user_id: Uuid) -> bool {
        self.user_id == Some(user_id)
    }
}

/// A device about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDevice {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub registration_id: String,
    pub device_id: Option<i128>,
    pub active: bool,
    pub user_id: Option<Uuid>,
}

/// Column changes for an existing device. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceChanges {
    pub name: Option<Option<String>>,
    pub registration_id: Option<String>,
    pub device_id: Option<Option<i128>>,
    pub active: Option<bool>,
    pub user_id: Option<Uuid>,
}
