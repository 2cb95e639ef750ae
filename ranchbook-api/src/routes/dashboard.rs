/// Dashboard endpoints
///
/// # Endpoints
///
/// - `GET /v1/farms/:id/dashboard/summary?from&to`
/// - `GET /v1/farms/:id/dashboard/finance?from&to`
/// - `GET /v1/farms/:id/dashboard/weighings?from&to&animal_id`
///
/// Dates are `YYYY-MM-DD` and both bounds are inclusive.

use crate::{app::AppState, error::ApiResult};
use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::NaiveDate;
use ranchbook_shared::{
    auth::middleware::Principal,
    dashboard::{self, DateRange, MonthlyFinance, MonthlyWeighing, Summary},
};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct WeighingSeriesQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub animal_id: Option<Uuid>,
}

pub async fn summary(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(farm_id): Path<Uuid>,
    Query(range): Query<DateRange>,
) -> ApiResult<Json<Summary>> {
    Ok(Json(dashboard::summary(&state.db, farm_id, &principal, range).await?))
}

pub async fn monthly_finance(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(farm_id): Path<Uuid>,
    Query(range): Query<DateRange>,
) -> ApiResult<Json<Vec<MonthlyFinance>>> {
    Ok(Json(
        dashboard::monthly_finance(&state.db, farm_id, &principal, range).await?,
    ))
}

pub async fn monthly_weighings(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(farm_id): Path<Uuid>,
    Query(query): Query<WeighingSeriesQuery>,
) -> ApiResult<Json<Vec<MonthlyWeighing>>> {
    let range = DateRange {
        from: query.from,
        to: query.to,
    };

    Ok(Json(
        dashboard::monthly_weighings(&state.db, farm_id, &principal, range, query.animal_id).await?,
    ))
}
