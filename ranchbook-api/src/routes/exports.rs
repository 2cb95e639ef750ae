/// CSV export endpoint
///
/// ```text
/// GET /v1/exports/:kind?search&farm_id&parent_id&from&to
/// ```
///
/// `kind` is one of `animals`, `weighings`, `purchases`, `ledger`. Filters
/// are the same as the matching listing; paging parameters are ignored.

use crate::{
    app::AppState,
    error::{ApiError, ApiResult},
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue},
    response::{IntoResponse, Response},
    Extension,
};
use ranchbook_shared::{
    auth::middleware::Principal,
    export::{self, ExportKind},
    scope::ListParams,
};

const CSV_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

fn attachment(filename: &str) -> ApiResult<HeaderValue> {
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
        .map_err(|e| ApiError::InternalError(format!("Invalid export filename: {}", e)))
}

pub async fn export_csv(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(kind): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<Response> {
    let kind: ExportKind = kind.parse()?;
    let csv = export::export(&state.db, &principal, kind, &params).await?;

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(CSV_CONTENT_TYPE)),
            (header::CONTENT_DISPOSITION, attachment(&csv.filename)?),
        ],
        csv.body,
    )
        .into_response())
}
