/// Authentication endpoints
///
/// # Endpoints
///
/// - `POST /v1/auth/register` - Register new user
/// - `POST /v1/auth/login` - Login and get tokens
/// - `POST /v1/auth/refresh` - Refresh access token
/// - `POST /v1/auth/switch-farm` - Re-issue tokens for another farm (authenticated)
/// - `GET  /v1/auth/me` - Current user and their farms (authenticated)
///
/// Registration does not create a farm; a new user starts with no active
/// farm and creates one through `POST /v1/farms`.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult, ValidationErrorDetail},
};
use axum::{extract::State, http::StatusCode, Extension, Json};
use ranchbook_shared::{
    auth::{authorization::authorize_farm, jwt, middleware::Principal, password},
    models::{
        farm::{Farm, FarmWithRole},
        membership::Membership,
        user::{CreateUser, User},
    },
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Register request
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    /// Password (also checked for strength)
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(max = 100, message = "Name must be at most 100 characters"))]
    pub name: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    pub password: String,
}

/// Refresh token request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Switch farm request
#[derive(Debug, Deserialize)]
pub struct SwitchFarmRequest {
    pub farm_id: Uuid,
}

/// Tokens plus the identity they carry
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user_id: Uuid,

    /// Active farm encoded in the tokens, if any
    pub farm_id: Option<Uuid>,

    /// Access token (12h)
    pub access_token: String,

    /// Refresh token (30d)
    pub refresh_token: String,
}

/// Refresh token response
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// Current user response
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: User,
    pub active_farm_id: Option<Uuid>,
    pub farms: Vec<FarmWithRole>,
}

fn auth_response(user_id: Uuid, email: &str, farm_id: Option<Uuid>, secret: &str) -> ApiResult<AuthResponse> {
    let pair = jwt::issue_pair(user_id, email, farm_id, secret)?;

    Ok(AuthResponse {
        user_id,
        farm_id,
        access_token: pair.access_token,
        refresh_token: pair.refresh_token,
    })
}

/// Register a new user
///
/// # Errors
///
/// - `422 Unprocessable Entity`: Validation failed or weak password
/// - `409 Conflict`: Email already exists
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    req.validate()?;

    password::validate_password_strength(&req.password).map_err(|e| {
        ApiError::ValidationError(vec![ValidationErrorDetail {
            field: "password".to_string(),
            message: e,
        }])
    })?;

    if User::find_by_email(&state.db, &req.email).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let password_hash = password::hash_password(&req.password)?;

    let user = User::create(
        &state.db,
        CreateUser {
            email: req.email.trim().to_string(),
            password_hash,
            name: req.name,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, "User registered");

    let response = auth_response(user.id, &user.email, None, state.jwt_secret())?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Authenticate with email and password
///
/// The first farm the user joined becomes the active farm.
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid credentials
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    req.validate()?;

    let user = User::find_by_email(&state.db, &req.email)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid email or password".to_string()))?;

    if !password::verify_password(&req.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login rejected");
        return Err(ApiError::Unauthorized(
            "Invalid email or password".to_string(),
        ));
    }

    let farm_id = Membership::list_by_user(&state.db, user.id)
        .await?
        .first()
        .map(|m| m.farm_id);

    User::update_last_login(&state.db, user.id).await?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(auth_response(user.id, &user.email, farm_id, state.jwt_secret())?))
}

/// Exchange a refresh token for a new access token
///
/// # Errors
///
/// - `401 Unauthorized`: Invalid, expired or non-refresh token
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    let access_token = jwt::refresh_access_token(&req.refresh_token, state.jwt_secret())?;

    Ok(Json(RefreshResponse { access_token }))
}

/// Re-issue tokens with another active farm
///
/// # Errors
///
/// - `403 Forbidden`: Caller is not a member of the farm
pub async fn switch_farm(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(req): Json<SwitchFarmRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let farm: Farm = authorize_farm(&state.db, req.farm_id, &principal).await?;

    tracing::debug!(user_id = %principal.user_id, farm_id = %farm.id, "Switched farm");

    Ok(Json(auth_response(
        principal.user_id,
        &principal.email,
        Some(farm.id),
        state.jwt_secret(),
    )?))
}

/// Current user, active farm and every farm they belong to
pub async fn me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<MeResponse>> {
    let user = User::find_by_id(&state.db, principal.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    let farms = Farm::list_for_principal(&state.db, &principal).await?;

    Ok(Json(MeResponse {
        user,
        active_farm_id: principal.farm_id,
        farms,
    }))
}
