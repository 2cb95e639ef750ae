/// Purchases and their derived ledger entries
///
/// Every purchase owns exactly one expense line in `ledger_entries`,
/// described `"Purchase of {item}"` and dated and valued like the purchase.
/// The line is linked by `ledger_entries.purchase_id`, so create, update and
/// delete find it by identity rather than by its (mutable) content.
///
/// A purchase with no linked line falls back to its content key
/// `(description, date, amount, expense, farm)` and adopts at most one
/// unlinked row that matches it, oldest first. Ledgers imported from a schema
/// without the link keep following their purchases. Once a purchase has a
/// linked line the key is never consulted, so manual entries that happen to
/// share its content are left alone.
///
/// # Ordering
///
/// 1. The farm guard runs first; a purchase outside the caller's scope fails
///    before anything is written
/// 2. One transaction locks the purchase row and its ledger rows
///    (`FOR UPDATE`), rewrites the ledger from the pre-update values, then
///    writes the purchase
///
/// # Example
///
/// ```no_run
/// use chrono::NaiveDate;
/// use ranchbook_shared::auth::middleware::Principal;
/// use ranchbook_shared::models::purchase::{CreatePurchase, Purchase, UpdatePurchase};
/// use rust_decimal::Decimal;
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, principal: Principal) -> Result<(), Box<dyn std::error::Error>> {
/// let purchase = Purchase::create(&pool, &principal, CreatePurchase {
///     farm_id: principal.farm_id,
///     purchased_on: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
///     item: "Ração".to_string(),
///     quantity: Decimal::from(20),
///     unit: "saco".to_string(),
///     amount: Decimal::from(500),
///     supplier: None,
/// }).await?;
///
/// let update = UpdatePurchase { amount: Some(Decimal::from(650)), ..Default::default() };
/// Purchase::update(&pool, purchase.id, &principal, update).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;
use validator::Validate;

use super::audit_log::{AuditAction, AuditLog};
use super::ledger_entry::{check_amount, LedgerKind};
use crate::auth::authorization::{authorize_entity, authorize_farm};
use crate::auth::middleware::Principal;
use crate::error::{ScopeError, ScopeResult};
use crate::scope::{nullable, target_farm, FarmScoped, Patch, ScopedTable};

/// Ledger category written on purchase-derived entries
pub const PURCHASE_CATEGORY: &str = "purchase";

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub purchased_on: NaiveDate,
    pub item: String,
    pub quantity: Decimal,
    pub unit: String,

    /// Total paid
    pub amount: Decimal,

    pub supplier: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FarmScoped for Purchase {
    const TABLE: ScopedTable = ScopedTable {
        table: "purchases",
        label: "Purchase",
        from: "purchases t",
        farm_column: "t.farm_id",
        columns: "t.id, t.farm_id, t.purchased_on, t.item, t.quantity, t.unit, t.amount, \
                  t.supplier, t.created_at, t.updated_at",
        search_columns: &["t.item", "t.supplier"],
        parent_column: None,
        date_column: Some("t.purchased_on"),
        order_by: "t.purchased_on DESC, t.id ASC",
        has_updated_at: true,
    };
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePurchase {
    pub farm_id: Option<Uuid>,
    pub purchased_on: NaiveDate,

    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub item: String,

    pub quantity: Decimal,

    #[validate(length(min = 1, max = 20), custom(function = "crate::scope::not_blank"))]
    pub unit: String,

    pub amount: Decimal,

    #[validate(length(max = 200))]
    pub supplier: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePurchase {
    pub purchased_on: Option<NaiveDate>,

    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub item: Option<String>,

    pub quantity: Option<Decimal>,

    #[validate(length(min = 1, max = 20), custom(function = "crate::scope::not_blank"))]
    pub unit: Option<String>,

    pub amount: Option<Decimal>,

    #[serde(default, deserialize_with = "nullable")]
    pub supplier: Option<Option<String>>,
}

/// Ledger description derived from a purchased item
pub fn ledger_description(item: &str) -> String {
    format!("Purchase of {}", item)
}

/// Content of the ledger line a purchase implies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerKey {
    pub farm_id: Uuid,
    pub description: String,
    pub entry_date: NaiveDate,
    pub amount: Decimal,
}

impl LedgerKey {
    fn of(purchase: &Purchase) -> Self {
        Self {
            farm_id: purchase.farm_id,
            description: ledger_description(&purchase.item),
            entry_date: purchase.purchased_on,
            amount: purchase.amount,
        }
    }

    /// Key after applying `update` to `current`; absent fields keep their
    /// current value
    fn after(current: &Purchase, update: &UpdatePurchase) -> Self {
        let item = update.item.as_deref().map(str::trim).unwrap_or(&current.item);
        Self {
            farm_id: current.farm_id,
            description: ledger_description(item),
            entry_date: update.purchased_on.unwrap_or(current.purchased_on),
            amount: update.amount.unwrap_or(current.amount),
        }
    }
}

fn check_figures(quantity: Option<Decimal>, amount: Option<Decimal>) -> ScopeResult<()> {
    if quantity.is_some_and(|q| q <= Decimal::ZERO) {
        return Err(ScopeError::validation("quantity must be positive"));
    }
    check_amount(amount)
}

async fn insert_ledger_line(
    tx: &mut Transaction<'_, Postgres>,
    purchase_id: Uuid,
    key: &LedgerKey,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries (farm_id, purchase_id, entry_date, description, amount, kind, category)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(key.farm_id)
    .bind(purchase_id)
    .bind(key.entry_date)
    .bind(&key.description)
    .bind(key.amount)
    .bind(LedgerKind::Expense)
    .bind(PURCHASE_CATEGORY)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Locks the ledger rows a purchase owns
///
/// Linked rows win. Only when there are none is a single unlinked row with
/// the purchase's content key taken.
async fn owned_lines(
    tx: &mut Transaction<'_, Postgres>,
    purchase_id: Uuid,
    key: &LedgerKey,
) -> Result<Vec<Uuid>, sqlx::Error> {
    let linked: Vec<Uuid> =
        sqlx::query_scalar("SELECT id FROM ledger_entries WHERE purchase_id = $1 FOR UPDATE")
            .bind(purchase_id)
            .fetch_all(&mut **tx)
            .await?;

    if !linked.is_empty() {
        return Ok(linked);
    }

    let legacy: Option<Uuid> = sqlx::query_scalar(
        r#"
        SELECT id FROM ledger_entries
        WHERE farm_id = $1
          AND kind = 'expense'
          AND purchase_id IS NULL
          AND description = $2
          AND entry_date = $3
          AND amount = $4
        ORDER BY created_at, id
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(key.farm_id)
    .bind(&key.description)
    .bind(key.entry_date)
    .bind(key.amount)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(legacy.into_iter().collect())
}

async fn lock(tx: &mut Transaction<'_, Postgres>, id: Uuid) -> ScopeResult<Purchase> {
    let sql = format!(
        "SELECT {} FROM {} WHERE t.id = $1 FOR UPDATE",
        Purchase::TABLE.columns,
        Purchase::TABLE.from
    );

    sqlx::query_as::<_, Purchase>(&sql)
        .bind(id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(ScopeError::NotFound(Purchase::TABLE.label))
}

impl Purchase {
    /// Records a purchase and its expense line in one transaction
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreatePurchase) -> ScopeResult<Self> {
        data.validate()?;
        check_figures(Some(data.quantity), Some(data.amount))?;
        let farm_id = target_farm(data.farm_id, principal)?;
        authorize_farm(pool, farm_id, principal).await?;

        let mut tx = pool.begin().await?;

        let sql = format!(
            "INSERT INTO purchases AS t (farm_id, purchased_on, item, quantity, unit, amount, supplier) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            Self::TABLE.columns
        );
        let purchase = sqlx::query_as::<_, Purchase>(&sql)
            .bind(farm_id)
            .bind(data.purchased_on)
            .bind(data.item.trim())
            .bind(data.quantity)
            .bind(data.unit.trim())
            .bind(data.amount)
            .bind(data.supplier)
            .fetch_one(&mut *tx)
            .await?;

        insert_ledger_line(&mut tx, purchase.id, &LedgerKey::of(&purchase)).await?;

        tx.commit().await?;

        tracing::info!(
            purchase_id = %purchase.id,
            farm_id = %farm_id,
            amount = %purchase.amount,
            "Purchase recorded"
        );
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Create, "purchase", Some(purchase.id)).await;

        Ok(purchase)
    }

    /// Updates a purchase and re-syncs its ledger line
    ///
    /// # Errors
    ///
    /// - `NotFound` / `AccessDenied` from the guard, before any write
    /// - `Validation` for non-positive quantity or negative amount
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdatePurchase,
    ) -> ScopeResult<Self> {
        data.validate()?;
        check_figures(data.quantity, data.amount)?;
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        let mut tx = pool.begin().await?;
        let current = lock(&mut tx, id).await?;

        let old_key = LedgerKey::of(&current);
        let new_key = LedgerKey::after(&current, &data);

        let lines = owned_lines(&mut tx, id, &old_key).await?;

        let synced = sqlx::query(
            r#"
            UPDATE ledger_entries
            SET entry_date = $1, description = $2, amount = $3, purchase_id = $4, updated_at = NOW()
            WHERE id = ANY($5)
            "#,
        )
        .bind(new_key.entry_date)
        .bind(&new_key.description)
        .bind(new_key.amount)
        .bind(id)
        .bind(&lines)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if synced == 0 {
            tracing::warn!(purchase_id = %id, "Purchase had no ledger line, recreating it");
            insert_ledger_line(&mut tx, id, &new_key).await?;
        }

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("purchased_on", data.purchased_on)
            .set_some("item", data.item.map(|i| i.trim().to_string()))
            .set_some("quantity", data.quantity)
            .set_some("unit", data.unit.map(|u| u.trim().to_string()))
            .set_some("amount", data.amount)
            .set_some("supplier", data.supplier);
        let purchase = patch.apply::<Self, _>(&mut *tx, id).await?;

        tx.commit().await?;

        tracing::info!(purchase_id = %id, ledger_rows = synced, "Purchase updated");
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Update, "purchase", Some(id)).await;

        Ok(purchase)
    }

    /// Deletes a purchase together with its ledger line
    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        let mut tx = pool.begin().await?;
        let current = lock(&mut tx, id).await?;
        let key = LedgerKey::of(&current);

        let lines = owned_lines(&mut tx, id, &key).await?;

        let removed = sqlx::query("DELETE FROM ledger_entries WHERE id = ANY($1)")
            .bind(&lines)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        sqlx::query("DELETE FROM purchases WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(purchase_id = %id, ledger_rows = removed, "Purchase deleted");
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "purchase", Some(id)).await;

        Ok(())
    }
}
