//! Access strategies composed into a [`DeviceViewSet`](super::devices::DeviceViewSet).

use axum::http::Method;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::Device,
    storage::DeviceScope,
};

/// Per-request facts handed to every device operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub method: Method,
    pub principal: Option<Uuid>,
}

impl RequestContext {
    pub fn new(method: Method, principal: Option<Uuid>) -> Self {
        Self { method, principal }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }
}

pub trait Permission: Send + Sync {
    fn has_permission(&self, _ctx: &RequestContext) -> bool {
        true
    }

    fn has_object_permission(&self, _ctx: &RequestContext, _device: &Device) -> bool {
        true
    }
}

/// Requires an authenticated principal.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsAuthenticated;

impl Permission for IsAuthenticated {
    fn has_permission(&self, ctx: &RequestContext) -> bool {
        ctx.is_authenticated()
    }
}

/// Only the owner may touch a device.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsOwner;

impl Permission for IsOwner {
    fn has_object_permission(&self, ctx: &RequestContext, device: &Device) -> bool {
        ctx.principal
            .is_some_and(|principal| device.is_owned_by(principal))
    }
}

/// Decides which records a request may list or look up.
pub trait ScopedQuery: Send + Sync {
    fn scope(&self, ctx: &RequestContext) -> AppResult<DeviceScope>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllDevices;

impl ScopedQuery for AllDevices {
    fn scope(&self, _ctx: &RequestContext) -> AppResult<DeviceScope> {
        Ok(DeviceScope::All)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OwnedByPrincipal;

impl ScopedQuery for OwnedByPrincipal {
    fn scope(&self, ctx: &RequestContext) -> AppResult<DeviceScope> {
        ctx.principal
            .map(DeviceScope::OwnedBy)
            .ok_or(AppError::Unauthorized)
    }
}

/// Picks the owner stamped on created and updated devices.
pub trait OwnerAssigner: Send + Sync {
    /// `None` leaves the owner as it is (or unset on create).
    fn owner(&self, ctx: &RequestContext) -> Option<Uuid>;
}

/// Stamps the authenticated principal, if any.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthenticatedOwner;

impl OwnerAssigner for AuthenticatedOwner {
    fn owner(&self, ctx: &RequestContext) -> Option<Uuid> {
        ctx.principal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn device(user_id: Option<Uuid>) -> Device {
        Device {
            id: 1,
            name: None,
            registration_id: "R1".to_string(),
            device_id: None,
            active: true,
            date_created: Utc::now(),
            user_id,
        }
    }

    #[test]
    fn is_owner_matches_principal() {
        let owner = Uuid::new_v4();
        let ctx = RequestContext::new(Method::GET, Some(owner));

        assert!(IsOwner.has_object_permission(&ctx, &device(Some(owner))));
        assert!(!IsOwner.has_object_permission(&ctx, &device(Some(Uuid::new_v4()))));
        assert!(!IsOwner.has_object_permission(&ctx, &device(None)));

        let anonymous = RequestContext::new(Method::GET, None);
        assert!(!IsOwner.has_object_permission(&anonymous, &device(None)));
    }

    #[test]
    fn is_authenticated_needs_principal() {
        assert!(IsAuthenticated.has_permission(&RequestContext::new(Method::GET, Some(Uuid::new_v4()))));
        assert!(!IsAuthenticated.has_permission(&RequestContext::new(Method::GET, None)));
    }

    #[test]
    fn owned_scope_requires_principal() {
        let user_id = Uuid::new_v4();

        assert_eq!(
            OwnedByPrincipal
                .scope(&RequestContext::new(Method::GET, Some(user_id)))
                .unwrap(),
            DeviceScope::OwnedBy(user_id)
        );
        assert!(matches!(
            OwnedByPrincipal.scope(&RequestContext::new(Method::GET, None)),
            Err(AppError::Unauthorized)
        ));
        assert_eq!(
            AllDevices.scope(&RequestContext::new(Method::GET, None)).unwrap(),
            DeviceScope::All
        );
    }

    #[test]
    fn authenticated_owner_follows_principal() {
        let user_id = Uuid::new_v4();
        assert_eq!(
            AuthenticatedOwner.owner(&RequestContext::new(Method::POST, Some(user_id))),
            Some(user_id)
        );
        assert_eq!(
            AuthenticatedOwner.owner(&RequestContext::new(Method::POST, None)),
            None
        );
    }
}
