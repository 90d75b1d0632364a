use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::{device_id_from_column, device_id_to_column, DeviceScope, DeviceStore, StoreError};
use crate::models::{Device, DeviceChanges, NewDevice};

const PRIMARY_KEY_CONSTRAINT: &str = "fcm_devices_pkey";
const REGISTRATION_ID_CONSTRAINT: &str = "fcm_devices_registration_id_key";

#[derive(Debug, FromRow)]
struct DeviceRow {
    id: i64,
    name: Option<String>,
    registration_id: String,
    device_id: Option<i64>,
    active: bool,
    date_created: DateTime<Utc>,
    user_id: Option<Uuid>,
}

impl From<DeviceRow> for Device {
    fn from(row: DeviceRow) -> Self {
        Device {
            id: row.id,
            name: row.name,
            registration_id: row.registration_id,
            device_id: row.device_id.map(device_id_from_column),
            active: row.active,
            date_created: row.date_created,
            user_id: row.user_id,
        }
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            match db_err.constraint() {
                Some(REGISTRATION_ID_CONSTRAINT) => return StoreError::duplicate_registration_id(),
                Some(PRIMARY_KEY_CONSTRAINT) => return StoreError::duplicate_id(),
                _ => {}
            }
        }
    }
    StoreError::Database(err)
}

#[derive(Clone)]
pub struct PgDeviceStore {
    db: PgPool,
}

impl PgDeviceStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeviceStore for PgDeviceStore {
    async fn list(&self, scope: DeviceScope) -> Result<Vec<Device>, StoreError> {
        let rows: Vec<DeviceRow> = sqlx::query_as(
            r#"
            SELECT id, name, registration_id, device_id, active, date_created, user_id
            FROM fcm_devices
            WHERE ($1::uuid IS NULL OR user_id = $1)
            ORDER BY id
            "#,
        )
        .bind(scope.owner())
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Device::from).collect())
    }

    async fn find_by_registration_id(
        &self,
        scope: DeviceScope,
        registration_id: &str,
    ) -> Result<Option<Device>, StoreError> {
        let row: Option<DeviceRow> = sqlx::query_as(
            r#"
            SELECT id, name, registration_id, device_id, active, date_created, user_id
            FROM fcm_devices
            WHERE registration_id = $1 AND ($2::uuid IS NULL OR user_id = $2)
            "#,
        )
        .bind(registration_id)
        .bind(scope.owner())
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(Device::from))
    }

    async fn registration_id_taken(
        &self,
        registration_id: &str,
        exclude_id: Option<i64>,
    ) -> Result<bool, StoreError> {
        let taken: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM fcm_devices
                WHERE registration_id = $1 AND ($2::bigint IS NULL OR id <> $2)
            )
            "#,
        )
        .bind(registration_id)
        .bind(exclude_id)
        .fetch_one(&self.db)
        .await?;

        Ok(taken)
    }

    async fn insert(&self, device: NewDevice) -> Result<Device, StoreError> {
        let device_id = device.device_id.map(device_id_to_column).transpose()?;

        let mut tx = self.db.begin().await?;

        let row: DeviceRow = sqlx::query_as(
            r#"
            INSERT INTO fcm_devices (id, name, registration_id, device_id, active, user_id)
            VALUES (
                COALESCE($1, nextval(pg_get_serial_sequence('fcm_devices', 'id'))),
                $2, $3, $4, $5, $6
            )
            RETURNING id, name, registration_id, device_id, active, date_created, user_id
            "#,
        )
        .bind(device.id)
        .bind(&device.name)
        .bind(&device.registration_id)
        .bind(device_id)
        .bind(device.active)
        .bind(device.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_write_error)?;

        // A client-chosen id must not be handed out again by the sequence.
        if device.id.is_some() {
            sqlx::query(
                r#"
                SELECT setval('fcm_devices_id_seq', $1)
                WHERE $1 >= (SELECT last_value FROM fcm_devices_id_seq)
                "#,
            )
            .bind(row.id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(row.into())
    }

    async fn update(&self, id: i64, changes: DeviceChanges) -> Result<Device, StoreError> {
        let device_id = match changes.device_id {
            Some(Some(value)) => Some(device_id_to_column(value)?),
            _ => None,
        };

        let row: Option<DeviceRow> = sqlx::query_as(
            r#"
            UPDATE fcm_devices
            SET name = CASE WHEN $2 THEN $3 ELSE name END,
                registration_id = COALESCE($4, registration_id),
                device_id = CASE WHEN $5 THEN $6 ELSE device_id END,
                active = COALESCE($7, active),
                user_id = COALESCE($8, user_id)
            WHERE id = $1
            RETURNING id, name, registration_id, device_id, active, date_created, user_id
            "#,
        )
        .bind(id)
        .bind(changes.name.is_some())
        .bind(changes.name.flatten())
        .bind(changes.registration_id)
        .bind(changes.device_id.is_some())
        .bind(device_id)
        .bind(changes.active)
        .bind(changes.user_id)
        .fetch_optional(&self.db)
        .await
        .map_err(map_write_error)?;

        row.map(Device::from).ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM fcm_devices WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }
}
