/// Farm, membership and audit endpoints
///
/// # Endpoints
///
/// - `GET    /v1/farms` - Farms of the caller, with the caller's role
/// - `POST   /v1/farms` - Create a farm; the caller becomes administrator
/// - `GET    /v1/farms/:id` - Farm details (members)
/// - `PATCH  /v1/farms/:id` - Update (administrator)
/// - `DELETE /v1/farms/:id` - Delete with all its records (administrator)
/// - `GET    /v1/farms/:id/members` - Members (members)
/// - `POST   /v1/farms/:id/members` - Add a user by email (administrator)
/// - `PATCH  /v1/farms/:id/members/:user_id` - Change role (administrator)
/// - `DELETE /v1/farms/:id/members/:user_id` - Remove (administrator)
/// - `GET    /v1/farms/:id/audit?limit=` - Recent audit rows (administrator)

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use ranchbook_shared::{
    auth::{authorization::authorize_farm, middleware::Principal},
    models::{
        audit_log::AuditLog,
        farm::{CreateFarm, Farm, FarmWithRole, UpdateFarm},
        membership::{FarmRole, MemberDetail, Membership},
    },
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

/// Add member request
#[derive(Debug, Deserialize, Validate)]
pub struct AddMemberRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[serde(default = "default_role")]
    pub role: FarmRole,
}

fn default_role() -> FarmRole {
    FarmRole::Worker
}

/// Change role request
#[derive(Debug, Deserialize)]
pub struct ChangeRoleRequest {
    pub role: FarmRole,
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    pub limit: Option<i64>,
}

pub async fn list_farms(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<FarmWithRole>>> {
    Ok(Json(Farm::list_for_principal(&state.db, &principal).await?))
}

pub async fn create_farm(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(data): Json<CreateFarm>,
) -> ApiResult<(StatusCode, Json<Farm>)> {
    let farm = Farm::create(&state.db, &principal, data).await?;
    Ok((StatusCode::CREATED, Json(farm)))
}

pub async fn get_farm(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Farm>> {
    Ok(Json(Farm::get(&state.db, id, &principal).await?))
}

pub async fn update_farm(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateFarm>,
) -> ApiResult<Json<Farm>> {
    Ok(Json(Farm::update(&state.db, id, &principal, data).await?))
}

pub async fn delete_farm(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    Farm::delete(&state.db, id, &principal).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_members(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<MemberDetail>>> {
    authorize_farm(&state.db, id, &principal).await?;
    Ok(Json(Membership::list_members(&state.db, id).await?))
}

pub async fn add_member(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(req): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<Membership>)> {
    req.validate()?;

    let membership = Membership::add_member(&state.db, &principal, id, &req.email, req.role).await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

pub async fn change_role(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<ChangeRoleRequest>,
) -> ApiResult<Json<Membership>> {
    Ok(Json(
        Membership::change_role(&state.db, &principal, id, user_id, req.role).await?,
    ))
}

pub async fn remove_member(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    Membership::remove_member(&state.db, &principal, id, user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_audit(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Query(query): Query<AuditQuery>,
) -> ApiResult<Json<Vec<AuditLog>>> {
    let limit = query.limit.unwrap_or(100);
    Ok(Json(AuditLog::list_for_farm(&state.db, &principal, id, limit).await?))
}
