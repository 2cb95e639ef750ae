/// Generic handlers for farm-scoped records
///
/// Every record type exposes the same five endpoints:
///
/// ```text
/// GET    /v1/{records}?take&skip&search&farm_id&parent_id&from&to
/// POST   /v1/{records}
/// GET    /v1/{records}/:id
/// PATCH  /v1/{records}/:id
/// DELETE /v1/{records}/:id
/// ```
///
/// Listing and lookup only need the [`FarmScoped`] description of the
/// table; writes go through the record's own operations via [`Resource`].
/// A cross-farm lookup answers `403`, an unknown id `404`.

use crate::{app::AppState, error::ApiResult};
use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use ranchbook_shared::{
    auth::middleware::Principal,
    error::ScopeResult,
    models::{
        animal::{Animal, CreateAnimal, UpdateAnimal},
        crop_field::{CreateCropField, CropField, UpdateCropField},
        health_event::{CreateHealthEvent, HealthEvent, UpdateHealthEvent},
        ledger_entry::{CreateLedgerEntry, LedgerEntry, UpdateLedgerEntry},
        medication::{CreateMedication, Medication, UpdateMedication},
        occurrence::{CreateOccurrence, Occurrence, UpdateOccurrence},
        paddock::{CreatePaddock, Paddock, UpdatePaddock},
        purchase::{CreatePurchase, Purchase, UpdatePurchase},
        weighing::{CreateWeighing, UpdateWeighing, Weighing},
    },
    scope::{self, FarmScoped, ListParams, Page},
};
use serde::{de::DeserializeOwned, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Record type with create/update/delete operations
#[async_trait]
pub trait Resource: FarmScoped + Serialize + Sized + Sync {
    type Create: DeserializeOwned + Send + 'static;
    type Update: DeserializeOwned + Send + 'static;

    async fn create(pool: &PgPool, principal: &Principal, data: Self::Create) -> ScopeResult<Self>;

    async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: Self::Update,
    ) -> ScopeResult<Self>;

    async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()>;
}

// Forwards to the record's inherent operations
macro_rules! resource {
    ($record:ty, $create:ty, $update:ty) => {
        #[async_trait]
        impl Resource for $record {
            type Create = $create;
            type Update = $update;

            async fn create(pool: &PgPool, principal: &Principal, data: $create) -> ScopeResult<Self> {
                <$record>::create(pool, principal, data).await
            }

            async fn update(
                pool: &PgPool,
                id: Uuid,
                principal: &Principal,
                data: $update,
            ) -> ScopeResult<Self> {
                <$record>::update(pool, id, principal, data).await
            }

            async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
                <$record>::delete(pool, id, principal).await
            }
        }
    };
}

resource!(Paddock, CreatePaddock, UpdatePaddock);
resource!(CropField, CreateCropField, UpdateCropField);
resource!(Animal, CreateAnimal, UpdateAnimal);
resource!(Weighing, CreateWeighing, UpdateWeighing);
resource!(Medication, CreateMedication, UpdateMedication);
resource!(HealthEvent, CreateHealthEvent, UpdateHealthEvent);
resource!(Occurrence, CreateOccurrence, UpdateOccurrence);
resource!(LedgerEntry, CreateLedgerEntry, UpdateLedgerEntry);
resource!(Purchase, CreatePurchase, UpdatePurchase);

/// Lists records of the caller's farms
pub async fn list<T>(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<Page<T>>>
where
    T: FarmScoped + Serialize,
{
    Ok(Json(scope::list::<T>(&state.db, &principal, &params).await?))
}

/// Fetches one record
pub async fn get<T>(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<T>>
where
    T: FarmScoped + Serialize,
{
    Ok(Json(scope::find::<T>(&state.db, id, &principal).await?))
}

pub async fn create<T: Resource>(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(data): Json<T::Create>,
) -> ApiResult<(StatusCode, Json<T>)> {
    let record = T::create(&state.db, &principal, data).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

pub async fn update<T: Resource>(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
    Json(data): Json<T::Update>,
) -> ApiResult<Json<T>> {
    Ok(Json(T::update(&state.db, id, &principal, data).await?))
}

pub async fn delete<T: Resource>(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    T::delete(&state.db, id, &principal).await?;
    Ok(StatusCode::NO_CONTENT)
}
