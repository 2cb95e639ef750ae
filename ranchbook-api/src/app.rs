/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use ranchbook_api::{app::AppState, config::Config};
/// use sqlx::PgPool;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let pool = PgPool::connect(&config.database.url).await?;
/// let state = AppState::new(pool, config);
/// let app = ranchbook_api::app::build_router(state);
/// # Ok(())
/// # }
/// ```

use crate::{
    config::Config,
    error::ApiError,
    middleware::security::SecurityHeadersLayer,
    routes::{auth, dashboard, device_readings, exports, farms, health, records},
};
use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method},
    middleware::{self, Next},
    response::Response,
    routing::{get, patch, post},
    Router,
};
use ranchbook_shared::{
    auth::middleware::authenticate_bearer,
    models::{
        animal::Animal, crop_field::CropField, device_reading::DeviceReading,
        health_event::HealthEvent, ledger_entry::LedgerEntry, medication::Medication,
        occurrence::Occurrence, paddock::Paddock, purchase::Purchase, weighing::Weighing,
    },
};
use sqlx::PgPool;
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

/// Shared application state
///
/// Cloned for each request handler via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: PgPool,

    /// Application configuration
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: PgPool, config: Config) -> Self {
        Self {
            db,
            config: Arc::new(config),
        }
    }

    /// JWT secret for token operations
    pub fn jwt_secret(&self) -> &str {
        &self.config.jwt.secret
    }
}

/// Mounts the five generic endpoints of a record type under `path`
fn record_routes<T: records::Resource>(router: Router<AppState>, path: &str) -> Router<AppState> {
    router
        .route(path, get(records::list::<T>).post(records::create::<T>))
        .route(
            &format!("{}/:id", path),
            get(records::get::<T>)
                .patch(records::update::<T>)
                .delete(records::delete::<T>),
        )
}

/// Builds the complete Axum router with all routes and middleware
///
/// # Layout
///
/// ```text
/// /health                          public
/// /v1/auth/{register,login,refresh} public
/// /v1/auth/{switch-farm,me}        bearer
/// /v1/farms[/:id[/members|/audit|/dashboard/*]]
/// /v1/{paddocks,crop-fields,animals,weighings,medications,
///      health-events,occurrences,purchases,ledger}[/:id]
/// /v1/device-readings[/batch|/:id]
/// /v1/exports/:kind
/// ```
///
/// # Middleware Stack
///
/// Outermost first: security headers, CORS, request tracing, then bearer
/// authentication on everything except `/health` and the public auth routes.
pub fn build_router(state: AppState) -> Router {
    let public_auth = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/refresh", post(auth::refresh));

    let farm_routes = Router::new()
        .route("/farms", get(farms::list_farms).post(farms::create_farm))
        .route(
            "/farms/:id",
            get(farms::get_farm)
                .patch(farms::update_farm)
                .delete(farms::delete_farm),
        )
        .route(
            "/farms/:id/members",
            get(farms::list_members).post(farms::add_member),
        )
        .route(
            "/farms/:id/members/:user_id",
            patch(farms::change_role).delete(farms::remove_member),
        )
        .route("/farms/:id/audit", get(farms::list_audit))
        .route("/farms/:id/dashboard/summary", get(dashboard::summary))
        .route("/farms/:id/dashboard/finance", get(dashboard::monthly_finance))
        .route("/farms/:id/dashboard/weighings", get(dashboard::monthly_weighings));

    let mut protected = Router::new()
        .route("/auth/switch-farm", post(auth::switch_farm))
        .route("/auth/me", get(auth::me))
        .merge(farm_routes)
        .route(
            "/device-readings",
            get(records::list::<DeviceReading>).post(device_readings::create),
        )
        .route("/device-readings/batch", post(device_readings::create_batch))
        .route(
            "/device-readings/:id",
            get(records::get::<DeviceReading>)
                .patch(device_readings::update)
                .delete(device_readings::delete),
        )
        .route("/exports/:kind", get(exports::export_csv));

    protected = record_routes::<Paddock>(protected, "/paddocks");
    protected = record_routes::<CropField>(protected, "/crop-fields");
    protected = record_routes::<Animal>(protected, "/animals");
    protected = record_routes::<Weighing>(protected, "/weighings");
    protected = record_routes::<Medication>(protected, "/medications");
    protected = record_routes::<HealthEvent>(protected, "/health-events");
    protected = record_routes::<Occurrence>(protected, "/occurrences");
    protected = record_routes::<Purchase>(protected, "/purchases");
    protected = record_routes::<LedgerEntry>(protected, "/ledger");

    let protected = protected.route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth_layer));

    let v1_routes = Router::new().merge(public_auth).merge(protected);

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_layer(&state.config))
        .layer(SecurityHeadersLayer::new(state.config.api.production))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.cors_permissive() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .expose_headers([header::CONTENT_DISPOSITION])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

/// Validates the bearer token and injects the `Principal`
async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = authenticate_bearer(req.headers(), state.jwt_secret())?;

    tracing::trace!(user_id = %principal.user_id, "Authenticated request");
    req.extensions_mut().insert(principal);

    Ok(next.run(req).await)
}
