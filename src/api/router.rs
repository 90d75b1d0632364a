use axum::{middleware, routing::get, Router};

use super::{
    handlers,
    middleware::{auth_middleware, optional_auth_middleware},
};
use crate::{services::devices::DeviceViewSet, AppState};

pub fn create_router(state: AppState) -> Router<AppState> {
    // Device routes (token optional, no ownership filtering)
    let public_device_routes = device_routes(DeviceViewSet::public(state.store.clone()))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    // Device routes (protected, scoped to the caller)
    let authorized_device_routes = device_routes(DeviceViewSet::authorized(state.store.clone()))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .nest("/devices/fcm", public_device_routes)
        .nest("/authorized/devices/fcm", authorized_device_routes)
        .with_state(state)
}

fn device_routes<S>(viewset: DeviceViewSet) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route(
            "/",
            get(handlers::devices::list_devices).post(handlers::devices::create_device),
        )
        .route(
            "/:registration_id",
            get(handlers::devices::get_device)
                .put(handlers::devices::update_device)
                .patch(handlers::devices::partial_update_device)
                .delete(handlers::devices::delete_device),
        )
        .with_state(viewset)
}
