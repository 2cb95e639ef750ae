/// Device reading ingest
///
/// Listing and lookup share the generic record handlers.
///
/// # Endpoints
///
/// - `POST /v1/device-readings` - Record one reading
/// - `POST /v1/device-readings/batch` - Record up to 500 readings atomically
/// - `PATCH /v1/device-readings/:id` - Correct a reading
/// - `DELETE /v1/device-readings/:id` - Delete a reading

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use ranchbook_shared::{
    auth::middleware::Principal,
    models::device_reading::{CreateDeviceReading, DeviceReading, UpdateDeviceReading},
};
use serde::Serialize;
use uuid::Uuid;

/// Batch ingest response
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub inserted: usize,
    pub data: Vec<DeviceReading>,
}

pub async fn create(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(data): Json<CreateDeviceReading>,
) -> ApiResult<(StatusCode, Json<DeviceReading>)> {
    let reading = DeviceReading::create(&state.db, &principal, data).await?;
    Ok((StatusCode::CREATED, Json(reading)))
}

/// Records a batch; one invalid reading rejects the whole batch
pub async fn create_batch(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(readings): Json<Vec<CreateDeviceReading>>,
) -> ApiResult<(StatusCode, Json<BatchResponse>)> {
    let data = DeviceReading::create_batch(&state.db, &principal, readings).await?;

    Ok((
        StatusCode::CREATED,
        Json(BatchResponse {
            inserted: data.len(),
            data,
        }),
    ))
}

pub async fn update(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateDeviceReading>,
) -> ApiResult<Json<DeviceReading>> {
    let reading = DeviceReading::update(&state.db, id, &principal, data).await?;
    Ok(Json(reading))
}

pub async fn delete(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    DeviceReading::delete(&state.db, id, &principal).await?;
    Ok(StatusCode::NO_CONTENT)
}
