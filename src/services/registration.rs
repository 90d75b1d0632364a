//! Uniqueness check for `registration_id` ahead of a write.
//!
//! The check reads before the write and can race with a concurrent request;
//! the `fcm_devices_registration_id_key` constraint catches what slips past.

use axum::http::Method;
use serde_json::Value;

use super::serializer::DeviceAttrs;
use crate::{
    error::{AppError, AppResult},
    models::{Device, UNIQUE_FIELD_MESSAGE},
    storage::DeviceStore,
};

/// How an incoming write is treated by the uniqueness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Create,
    /// Update of the record with this id, which is left out of the lookup.
    Update { exclude_id: Option<i64> },
}

/// Classify a write.
///
/// A non-empty `registration_id` in the raw body decides by whether an
/// existing record is being written. Without one, the request method
/// decides and anything other than POST/PUT/PATCH is not checked.
pub fn classify(
    raw: &Value,
    instance: Option<&Device>,
    method: &Method,
    attrs: &DeviceAttrs,
) -> Option<WriteKind> {
    let supplied = raw.get("registration_id").is_some_and(is_truthy);

    if supplied {
        return Some(match instance {
            Some(device) => WriteKind::Update {
                exclude_id: Some(device.id),
            },
            None => WriteKind::Create,
        });
    }

    if *method == Method::PUT || *method == Method::PATCH {
        Some(WriteKind::Update {
            exclude_id: attrs.id,
        })
    } else if *method == Method::POST {
        Some(WriteKind::Create)
    } else {
        None
    }
}

/// Reject the write when another record already holds the registration id.
pub async fn ensure_unique_registration(
    store: &dyn DeviceStore,
    kind: Option<WriteKind>,
    attrs: &DeviceAttrs,
) -> AppResult<()> {
    let (Some(kind), Some(registration_id)) = (kind, attrs.registration_id.as_deref()) else {
        return Ok(());
    };

    let exclude_id = match kind {
        WriteKind::Create => None,
        WriteKind::Update { exclude_id } => exclude_id,
    };

    if store
        .registration_id_taken(registration_id, exclude_id)
        .await?
    {
        tracing::debug!(
            "Rejecting duplicate registration_id {} ({:?})",
            registration_id,
            kind
        );
        return Err(AppError::field("registration_id", UNIQUE_FIELD_MESSAGE));
    }

    Ok(())
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        Value::String(text) => !text.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewDevice;
    use crate::storage::MemoryDeviceStore;
    use chrono::Utc;
    use serde_json::json;

    fn attrs(registration_id: &str) -> DeviceAttrs {
        DeviceAttrs {
            registration_id: Some(registration_id.to_string()),
            active: Some(true),
            ..Default::default()
        }
    }

    fn device(id: i64, registration_id: &str) -> Device {
        Device {
            id,
            name: None,
            registration_id: registration_id.to_string(),
            device_id: None,
            active: true,
            date_created: Utc::now(),
            user_id: None,
        }
    }

    async fn store_with(registration_ids: &[&str]) -> MemoryDeviceStore {
        let store = MemoryDeviceStore::new();
        for registration_id in registration_ids {
            store
                .insert(NewDevice {
                    id: None,
                    name: None,
                    registration_id: registration_id.to_string(),
                    device_id: None,
                    active: true,
                    user_id: None,
                })
                .await
                .unwrap();
        }
        store
    }

    #[test]
    fn supplied_registration_id_with_instance_is_update() {
        let existing = device(3, "R1");
        let kind = classify(
            &json!({"registration_id": "R9"}),
            Some(&existing),
            &Method::PATCH,
            &attrs("R9"),
        );
        assert_eq!(kind, Some(WriteKind::Update { exclude_id: Some(3) }));
    }

    #[test]
    fn supplied_registration_id_without_instance_is_create() {
        // The method is irrelevant once the body names a registration id.
        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let kind = classify(&json!({"registration_id": "R1"}), None, &method, &attrs("R1"));
            assert_eq!(kind, Some(WriteKind::Create), "method {method}");
        }
    }

    #[test]
    fn missing_registration_id_falls_back_to_method() {
        let raw = json!({"name": "phone"});
        let with_id = DeviceAttrs {
            id: Some(8),
            ..Default::default()
        };

        assert_eq!(
            classify(&raw, None, &Method::PUT, &with_id),
            Some(WriteKind::Update { exclude_id: Some(8) })
        );
        assert_eq!(
            classify(&raw, None, &Method::PATCH, &DeviceAttrs::default()),
            Some(WriteKind::Update { exclude_id: None })
        );
        assert_eq!(
            classify(&raw, None, &Method::POST, &with_id),
            Some(WriteKind::Create)
        );
        assert_eq!(classify(&raw, None, &Method::DELETE, &with_id), None);
        assert_eq!(classify(&raw, None, &Method::GET, &with_id), None);
    }

    #[test]
    fn empty_registration_id_counts_as_missing() {
        let existing = device(3, "R1");
        for raw in [
            json!({"registration_id": ""}),
            json!({"registration_id": null}),
        ] {
            let kind = classify(&raw, Some(&existing), &Method::DELETE, &attrs("R1"));
            assert_eq!(kind, None);
        }
    }

    #[tokio::test]
    async fn create_rejects_taken_registration_id() {
        let store = store_with(&["R1"]).await;

        let err = ensure_unique_registration(&store, Some(WriteKind::Create), &attrs("R1"))
            .await
            .unwrap_err();
        match err {
            AppError::Validation(errors) => assert_eq!(
                errors.get("registration_id").unwrap(),
                &[UNIQUE_FIELD_MESSAGE.to_string()]
            ),
            other => panic!("unexpected error: {other:?}"),
        }

        ensure_unique_registration(&store, Some(WriteKind::Create), &attrs("R2"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn update_excludes_the_record_itself() {
        let store = store_with(&["R1", "R2"]).await;

        ensure_unique_registration(
            &store,
            Some(WriteKind::Update { exclude_id: Some(1) }),
            &attrs("R1"),
        )
        .await
        .unwrap();

        let taken = ensure_unique_registration(
            &store,
            Some(WriteKind::Update { exclude_id: Some(1) }),
            &attrs("R2"),
        )
        .await;
        assert!(matches!(taken, Err(AppError::Validation(_))));
    }

    #[tokio::test]
    async fn unclassified_writes_are_not_checked() {
        let store = store_with(&["R1"]).await;

        let raw = json!({"registration_id": ""});
        let kind = classify(&raw, None, &Method::DELETE, &attrs("R1"));
        ensure_unique_registration(&store, kind, &attrs("R1"))
            .await
            .unwrap();
    }
}
