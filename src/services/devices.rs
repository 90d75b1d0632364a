use std::sync::Arc;

use serde_json::Value;

use super::{
    policies::{
        AllDevices, AuthenticatedOwner, IsAuthenticated, IsOwner, OwnedByPrincipal, OwnerAssigner,
        Permission, RequestContext, ScopedQuery,
    },
    registration::{classify, ensure_unique_registration},
    serializer::{parse_attrs, DeviceAttrs},
};
use crate::{
    error::{AppError, AppResult},
    models::{Device, DeviceChanges, NewDevice},
    storage::DeviceStore,
};

/// CRUD over device registrations, keyed by `registration_id`.
///
/// Visibility, owner stamping and access checks are supplied as strategies,
/// so the public and the owner-scoped endpoints share one implementation.
#[derive(Clone)]
pub struct DeviceViewSet {
    store: Arc<dyn DeviceStore>,
    scope: Arc<dyn ScopedQuery>,
    owner: Arc<dyn OwnerAssigner>,
    permissions: Vec<Arc<dyn Permission>>,
}

impl DeviceViewSet {
    pub fn new(
        store: Arc<dyn DeviceStore>,
        scope: Arc<dyn ScopedQuery>,
        owner: Arc<dyn OwnerAssigner>,
    ) -> Self {
        Self {
            store,
            scope,
            owner,
            permissions: Vec::new(),
        }
    }

    pub fn with_permission(mut self, permission: Arc<dyn Permission>) -> Self {
        self.permissions.push(permission);
        self
    }

    /// Every device, no access restrictions.
    pub fn public(store: Arc<dyn DeviceStore>) -> Self {
        Self::new(store, Arc::new(AllDevices), Arc::new(AuthenticatedOwner))
    }

    /// Only the caller's own devices; requires authentication.
    pub fn authorized(store: Arc<dyn DeviceStore>) -> Self {
        Self::new(store, Arc::new(OwnedByPrincipal), Arc::new(AuthenticatedOwner))
            .with_permission(Arc::new(IsAuthenticated))
            .with_permission(Arc::new(IsOwner))
    }

    pub async fn list(&self, ctx: &RequestContext) -> AppResult<Vec<Device>> {
        self.check_permissions(ctx)?;
        let scope = self.scope.scope(ctx)?;

        Ok(self.store.list(scope).await?)
    }

    pub async fn create(&self, ctx: &RequestContext, raw: &Value) -> AppResult<Device> {
        self.check_permissions(ctx)?;

        let attrs = self.validate(ctx, raw, None, false).await?;
        let registration_id = attrs
            .registration_id
            .ok_or_else(|| AppError::field("registration_id", "This field is required."))?;

        let device = self
            .store
            .insert(NewDevice {
                id: attrs.id,
                name: attrs.name.flatten(),
                registration_id,
                device_id: attrs.device_id.flatten(),
                active: attrs.active.unwrap_or(true),
                user_id: self.owner.owner(ctx),
            })
            .await?;

        tracing::info!(
            "Registered device {} (id {}) for {:?}",
            device.registration_id,
            device.id,
            device.user_id
        );

        Ok(device)
    }

    pub async fn retrieve(&self, ctx: &RequestContext, registration_id: &str) -> AppResult<Device> {
        self.check_permissions(ctx)?;
        self.get_object(ctx, registration_id).await
    }

    /// Full (`partial = false`, PUT) or partial (PATCH) update.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        registration_id: &str,
        raw: &Value,
        partial: bool,
    ) -> AppResult<Device> {
        self.check_permissions(ctx)?;
        let instance = self.get_object(ctx, registration_id).await?;

        let attrs = self.validate(ctx, raw, Some(&instance), partial).await?;
        let changes = DeviceChanges {
            name: attrs.name,
            registration_id: attrs.registration_id,
            device_id: attrs.device_id,
            active: attrs.active,
            user_id: self.owner.owner(ctx),
        };

        let device = self.store.update(instance.id, changes).await?;

        tracing::info!(
            "Updated device {} (id {})",
            device.registration_id,
            device.id
        );

        Ok(device)
    }

    pub async fn destroy(&self, ctx: &RequestContext, registration_id: &str) -> AppResult<()> {
        self.check_permissions(ctx)?;
        let instance = self.get_object(ctx, registration_id).await?;

        self.store.delete(instance.id).await?;

        tracing::info!(
            "Removed device {} (id {})",
            instance.registration_id,
            instance.id
        );

        Ok(())
    }

    async fn validate(
        &self,
        ctx: &RequestContext,
        raw: &Value,
        instance: Option<&Device>,
        partial: bool,
    ) -> AppResult<DeviceAttrs> {
        let attrs = parse_attrs(raw, partial).map_err(|errors| {
            tracing::debug!("Device payload rejected: {}", errors);
            AppError::Validation(errors)
        })?;

        let kind = classify(raw, instance, &ctx.method, &attrs);
        ensure_unique_registration(self.store.as_ref(), kind, &attrs).await?;

        Ok(attrs)
    }

    fn check_permissions(&self, ctx: &RequestContext) -> AppResult<()> {
        if self.permissions.iter().all(|p| p.has_permission(ctx)) {
            return Ok(());
        }

        if ctx.is_authenticated() {
            Err(AppError::PermissionDenied)
        } else {
            Err(AppError::Unauthorized)
        }
    }

    async fn get_object(&self, ctx: &RequestContext, registration_id: &str) -> AppResult<Device> {
        let scope = self.scope.scope(ctx)?;
        let device = self
            .store
            .find_by_registration_id(scope, registration_id)
            .await?
            .ok_or(AppError::DeviceNotFound)?;

        if !self
            .permissions
            .iter()
            .all(|p| p.has_object_permission(ctx, &device))
        {
            return Err(AppError::PermissionDenied);
        }

        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::UNIQUE_FIELD_MESSAGE, storage::MemoryDeviceStore};
    use axum::http::Method;
    use serde_json::json;
    use uuid::Uuid;

    fn ctx(method: Method, principal: Option<Uuid>) -> RequestContext {
        RequestContext::new(method, principal)
    }

    fn store() -> Arc<dyn DeviceStore> {
        Arc::new(MemoryDeviceStore::new())
    }

    fn unique_error(result: AppResult<Device>) -> bool {
        match result {
            Err(AppError::Validation(errors)) => {
                errors.get("registration_id") == Some(&[UNIQUE_FIELD_MESSAGE.to_string()][..])
            }
            _ => false,
        }
    }

    #[tokio::test]
    async fn create_then_duplicate_then_self_update() {
        let viewset = DeviceViewSet::public(store());
        let post = ctx(Method::POST, None);

        let first = viewset
            .create(&post, &json!({"registration_id": "R1", "device_id": "0x1A"}))
            .await
            .unwrap();
        assert_eq!(first.device_id, Some(26));
        assert!(first.active);

        let duplicate = viewset.create(&post, &json!({"registration_id": "R1"})).await;
        assert!(unique_error(duplicate));

        let updated = viewset
            .update(
                &ctx(Method::PUT, None),
                "R1",
                &json!({"registration_id": "R1", "name": "renamed"}),
                false,
            )
            .await
            .unwrap();
        assert_eq!(updated.id, first.id);
        assert_eq!(updated.name.as_deref(), Some("renamed"));
    }

    #[tokio::test]
    async fn update_onto_another_devices_registration_id_fails() {
        let viewset = DeviceViewSet::public(store());
        let post = ctx(Method::POST, None);
        viewset.create(&post, &json!({"registration_id": "A"})).await.unwrap();
        viewset.create(&post, &json!({"registration_id": "B"})).await.unwrap();

        let result = viewset
            .update(&ctx(Method::PATCH, None), "A", &json!({"registration_id": "B"}), true)
            .await;
        assert!(unique_error(result));
    }

    #[tokio::test]
    async fn authenticated_writes_stamp_the_owner() {
        let viewset = DeviceViewSet::public(store());
        let alice = Uuid::new_v4();

        let anonymous = viewset
            .create(&ctx(Method::POST, None), &json!({"registration_id": "R1"}))
            .await
            .unwrap();
        assert_eq!(anonymous.user_id, None);

        let claimed = viewset
            .update(&ctx(Method::PATCH, Some(alice)), "R1", &json!({"active": false}), true)
            .await
            .unwrap();
        assert_eq!(claimed.user_id, Some(alice));
        assert!(!claimed.active);

        // An anonymous update keeps the existing owner.
        let kept = viewset
            .update(&ctx(Method::PATCH, None), "R1", &json!({"name": "x"}), true)
            .await
            .unwrap();
        assert_eq!(kept.user_id, Some(alice));
    }

    #[tokio::test]
    async fn put_resets_active_default() {
        let viewset = DeviceViewSet::public(store());
        viewset
            .create(
                &ctx(Method::POST, None),
                &json!({"registration_id": "R1", "active": false}),
            )
            .await
            .unwrap();

        let updated = viewset
            .update(&ctx(Method::PUT, None), "R1", &json!({"registration_id": "R1"}), false)
            .await
            .unwrap();
        assert!(updated.active);
    }

    #[tokio::test]
    async fn authorized_viewset_scopes_to_owner() {
        let store = store();
        let public = DeviceViewSet::public(store.clone());
        let authorized = DeviceViewSet::authorized(store);
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        public
            .create(&ctx(Method::POST, Some(alice)), &json!({"registration_id": "A1"}))
            .await
            .unwrap();
        public
            .create(&ctx(Method::POST, Some(bob)), &json!({"registration_id": "B1"}))
            .await
            .unwrap();

        let listed = authorized.list(&ctx(Method::GET, Some(alice))).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].registration_id, "A1");

        let foreign = authorized.retrieve(&ctx(Method::GET, Some(alice)), "B1").await;
        assert!(matches!(foreign, Err(AppError::DeviceNotFound)));

        let anonymous = authorized.list(&ctx(Method::GET, None)).await;
        assert!(matches!(anonymous, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn object_permission_is_enforced_even_with_wide_scope() {
        let store = store();
        let alice = Uuid::new_v4();
        DeviceViewSet::public(store.clone())
            .create(&ctx(Method::POST, Some(alice)), &json!({"registration_id": "A1"}))
            .await
            .unwrap();

        let viewset = DeviceViewSet::new(store, Arc::new(AllDevices), Arc::new(AuthenticatedOwner))
            .with_permission(Arc::new(IsOwner));

        let denied = viewset
            .retrieve(&ctx(Method::GET, Some(Uuid::new_v4())), "A1")
            .await;
        assert!(matches!(denied, Err(AppError::PermissionDenied)));

        let allowed = viewset.retrieve(&ctx(Method::GET, Some(alice)), "A1").await;
        assert!(allowed.is_ok());
    }

    #[tokio::test]
    async fn destroy_removes_device() {
        let viewset = DeviceViewSet::public(store());
        viewset
            .create(&ctx(Method::POST, None), &json!({"registration_id": "R1"}))
            .await
            .unwrap();

        viewset.destroy(&ctx(Method::DELETE, None), "R1").await.unwrap();

        let gone = viewset.retrieve(&ctx(Method::GET, None), "R1").await;
        assert!(matches!(gone, Err(AppError::DeviceNotFound)));
    }

    #[tokio::test]
    async fn client_supplied_id_is_kept_on_create_only() {
        let viewset = DeviceViewSet::public(store());
        let created = viewset
            .create(&ctx(Method::POST, None), &json!({"id": 77, "registration_id": "R1"}))
            .await
            .unwrap();
        assert_eq!(created.id, 77);

        let updated = viewset
            .update(&ctx(Method::PATCH, None), "R1", &json!({"id": 5}), true)
            .await
            .unwrap();
        assert_eq!(updated.id, 77);
    }
}
