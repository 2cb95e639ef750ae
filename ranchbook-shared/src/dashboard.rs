/// Farm dashboard aggregations
///
/// All figures are computed for one farm the principal can reach, optionally
/// bounded by an inclusive date range.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::authorization::authorize_farm;
use crate::auth::middleware::Principal;
use crate::error::{ScopeError, ScopeResult};

/// Inclusive date range; either bound may be open
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    fn check(&self) -> ScopeResult<()> {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => Err(ScopeError::validation("from must not be after to")),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub farm_id: Uuid,
    pub active_animals: i64,
    pub paddocks: i64,
    pub crop_fields: i64,
    pub revenue: Decimal,
    pub expense: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyFinance {
    /// First day of the month
    pub month: NaiveDate,
    pub revenue: Decimal,
    pub expense: Decimal,
    pub balance: Decimal,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct MonthlyWeighing {
    /// First day of the month
    pub month: NaiveDate,
    pub weighings: i64,
    pub average_weight_kg: Decimal,
}

#[derive(sqlx::FromRow)]
struct FinanceRow {
    month: NaiveDate,
    revenue: Decimal,
    expense: Decimal,
}

impl From<FinanceRow> for MonthlyFinance {
    fn from(row: FinanceRow) -> Self {
        Self {
            month: row.month,
            revenue: row.revenue,
            expense: row.expense,
            balance: row.revenue - row.expense,
        }
    }
}

/// Herd, land and cash position of a farm
///
/// Counts and totals are read from one `REPEATABLE READ` snapshot.
pub async fn summary(
    pool: &PgPool,
    farm_id: Uuid,
    principal: &Principal,
    range: DateRange,
) -> ScopeResult<Summary> {
    range.check()?;
    authorize_farm(pool, farm_id, principal).await?;

    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
        .execute(&mut *tx)
        .await?;

    let (active_animals, paddocks, crop_fields): (i64, i64, i64) = sqlx::query_as(
        r#"
        SELECT
            (SELECT COUNT(*) FROM animals WHERE farm_id = $1 AND status = 'active'),
            (SELECT COUNT(*) FROM paddocks WHERE farm_id = $1),
            (SELECT COUNT(*) FROM crop_fields WHERE farm_id = $1)
        "#,
    )
    .bind(farm_id)
    .fetch_one(&mut *tx)
    .await?;

    let (revenue, expense): (Decimal, Decimal) = sqlx::query_as(
        r#"
        SELECT
            COALESCE(SUM(amount) FILTER (WHERE kind = 'revenue'), 0),
            COALESCE(SUM(amount) FILTER (WHERE kind = 'expense'), 0)
        FROM ledger_entries
        WHERE farm_id = $1
          AND ($2::date IS NULL OR entry_date >= $2)
          AND ($3::date IS NULL OR entry_date <= $3)
        "#,
    )
    .bind(farm_id)
    .bind(range.from)
    .bind(range.to)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Summary {
        farm_id,
        active_animals,
        paddocks,
        crop_fields,
        revenue,
        expense,
        balance: revenue - expense,
    })
}

/// Ledger grouped by calendar month, oldest month first
pub async fn monthly_finance(
    pool: &PgPool,
    farm_id: Uuid,
    principal: &Principal,
    range: DateRange,
) -> ScopeResult<Vec<MonthlyFinance>> {
    range.check()?;
    authorize_farm(pool, farm_id, principal).await?;

    let rows = sqlx::query_as::<_, FinanceRow>(
        r#"
        SELECT
            date_trunc('month', entry_date)::date AS month,
            COALESCE(SUM(amount) FILTER (WHERE kind = 'revenue'), 0) AS revenue,
            COALESCE(SUM(amount) FILTER (WHERE kind = 'expense'), 0) AS expense
        FROM ledger_entries
        WHERE farm_id = $1
          AND ($2::date IS NULL OR entry_date >= $2)
          AND ($3::date IS NULL OR entry_date <= $3)
        GROUP BY 1
        ORDER BY 1
        "#,
    )
    .bind(farm_id)
    .bind(range.from)
    .bind(range.to)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(MonthlyFinance::from).collect())
}

/// Weighings grouped by calendar month, oldest month first
///
/// `animal_id` narrows the series to one animal of the farm.
pub async fn monthly_weighings(
    pool: &PgPool,
    farm_id: Uuid,
    principal: &Principal,
    range: DateRange,
    animal_id: Option<Uuid>,
) -> ScopeResult<Vec<MonthlyWeighing>> {
    range.check()?;
    authorize_farm(pool, farm_id, principal).await?;

    let rows = sqlx::query_as::<_, MonthlyWeighing>(
        r#"
        SELECT
            date_trunc('month', w.weighed_on)::date AS month,
            COUNT(*) AS weighings,
            ROUND(AVG(w.weight_kg), 2) AS average_weight_kg
        FROM weighings w
        JOIN animals a ON a.id = w.animal_id
        WHERE a.farm_id = $1
          AND ($2::date IS NULL OR w.weighed_on >= $2)
          AND ($3::date IS NULL OR w.weighed_on <= $3)
          AND ($4::uuid IS NULL OR w.animal_id = $4)
        GROUP BY 1
        ORDER BY 1
        "#,
    )
    .bind(farm_id)
    .bind(range.from)
    .bind(range.to)
    .bind(animal_id)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}
