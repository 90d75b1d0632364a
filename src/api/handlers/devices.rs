use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;

use crate::{
    error::AppResult,
    models::Device,
    services::{devices::DeviceViewSet, policies::RequestContext},
};

pub async fn list_devices(
    State(viewset): State<DeviceViewSet>,
    ctx: RequestContext,
) -> AppResult<Json<Vec<Device>>> {
    let devices = viewset.list(&ctx).await?;

    Ok(Json(devices))
}

pub async fn create_device(
    State(viewset): State<DeviceViewSet>,
    ctx: RequestContext,
    Json(raw): Json<Value>,
) -> AppResult<(StatusCode, Json<Device>)> {
    let device = viewset.create(&ctx, &raw).await?;

    Ok((StatusCode::CREATED, Json(device)))
}

pub async fn get_device(
    State(viewset): State<DeviceViewSet>,
    ctx: RequestContext,
    Path(registration_id): Path<String>,
) -> AppResult<Json<Device>> {
    let device = viewset.retrieve(&ctx, &registration_id).await?;

    Ok(Json(device))
}

pub async fn update_device(
    State(viewset): State<DeviceViewSet>,
    ctx: RequestContext,
    Path(registration_id): Path<String>,
    Json(raw): Json<Value>,
) -> AppResult<Json<Device>> {
    let device = viewset.update(&ctx, &registration_id, &raw, false).await?;

    Ok(Json(device))
}

pub async fn partial_update_device(
    State(viewset): State<DeviceViewSet>,
    ctx: RequestContext,
    Path(registration_id): Path<String>,
    Json(raw): Json<Value>,
) -> AppResult<Json<Device>> {
    let device = viewset.update(&ctx, &registration_id, &raw, true).await?;

    Ok(Json(device))
}

pub async fn delete_device(
    State(viewset): State<DeviceViewSet>,
    ctx: RequestContext,
    Path(registration_id): Path<String>,
) -> AppResult<StatusCode> {
    viewset.destroy(&ctx, &registration_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
