/// CSV export of listings
///
/// An export runs the same scoped filter as the corresponding listing, but
/// without paging, capped at [`EXPORT_LIMIT`](crate::scope::EXPORT_LIMIT)
/// rows. The header row is always written, so an empty export is still a
/// valid CSV file.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

use crate::auth::middleware::Principal;
use crate::error::{ScopeError, ScopeResult};
use crate::models::animal::Animal;
use crate::models::ledger_entry::LedgerEntry;
use crate::models::purchase::Purchase;
use crate::models::weighing::Weighing;
use crate::scope::{self, FarmScoped, ListParams};

/// Row type with a fixed CSV header
///
/// `HEADER` lists the serialized fields in declaration order.
pub trait CsvRow: FarmScoped + Serialize {
    const HEADER: &'static [&'static str];
}

impl CsvRow for Animal {
    const HEADER: &'static [&'static str] = &[
        "id", "farm_id", "paddock_id", "tag", "name", "breed", "sex", "birth_date", "status",
        "created_at", "updated_at",
    ];
}

impl CsvRow for Weighing {
    const HEADER: &'static [&'static str] =
        &["id", "animal_id", "weighed_on", "weight_kg", "notes", "created_at"];
}

impl CsvRow for Purchase {
    const HEADER: &'static [&'static str] = &[
        "id", "farm_id", "purchased_on", "item", "quantity", "unit", "amount", "supplier",
        "created_at", "updated_at",
    ];
}

impl CsvRow for LedgerEntry {
    const HEADER: &'static [&'static str] = &[
        "id", "farm_id", "purchase_id", "entry_date", "description", "amount", "kind", "category",
        "created_at", "updated_at",
    ];
}

/// Exportable listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Animals,
    Weighings,
    Purchases,
    Ledger,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Animals => "animals",
            ExportKind::Weighings => "weighings",
            ExportKind::Purchases => "purchases",
            ExportKind::Ledger => "ledger",
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportKind {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "animals" => Ok(ExportKind::Animals),
            "weighings" => Ok(ExportKind::Weighings),
            "purchases" => Ok(ExportKind::Purchases),
            "ledger" => Ok(ExportKind::Ledger),
            other => Err(ScopeError::Validation(format!("Unknown export: {}", other))),
        }
    }
}

/// Rendered CSV document
#[derive(Debug, Clone)]
pub struct CsvExport {
    /// Suggested attachment name, e.g. `animals-20240110.csv`
    pub filename: String,
    pub rows: usize,
    pub body: Vec<u8>,
}

/// Renders rows as CSV with the row type's header
pub fn render<T: CsvRow>(rows: &[T]) -> ScopeResult<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer
        .write_record(T::HEADER)
        .map_err(|e| ScopeError::Export(e.to_string()))?;
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| ScopeError::Export(e.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| ScopeError::Export(e.to_string()))
}

async fn export_rows<T: CsvRow>(
    pool: &PgPool,
    principal: &Principal,
    params: &ListParams,
) -> ScopeResult<(usize, Vec<u8>)> {
    let rows = scope::list_all::<T>(pool, principal, params).await?;
    Ok((rows.len(), render(&rows)?))
}

/// Exports a listing visible to the principal
pub async fn export(
    pool: &PgPool,
    principal: &Principal,
    kind: ExportKind,
    params: &ListParams,
) -> ScopeResult<CsvExport> {
    let (rows, body) = match kind {
        ExportKind::Animals => export_rows::<Animal>(pool, principal, params).await?,
        ExportKind::Weighings => export_rows::<Weighing>(pool, principal, params).await?,
        ExportKind::Purchases => export_rows::<Purchase>(pool, principal, params).await?,
        ExportKind::Ledger => export_rows::<LedgerEntry>(pool, principal, params).await?,
    };

    tracing::info!(user_id = %principal.user_id, export = kind.as_str(), rows, "CSV export");

    Ok(CsvExport {
        filename: format!("{}-{}.csv", kind, Utc::now().format("%Y%m%d")),
        rows,
        body,
    })
}
