/// Financial ledger
///
/// Ledger entries are either manual (revenue or expense typed in by a user)
/// or derived from a purchase. Derived entries carry `purchase_id` and can
/// only change through their purchase, see [`crate::models::purchase`].
///
/// # Schema
///
/// ```sql
/// CREATE TYPE ledger_kind AS ENUM ('revenue', 'expense');
///
/// CREATE TABLE ledger_entries (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     farm_id UUID NOT NULL REFERENCES farms(id) ON DELETE CASCADE,
///     purchase_id UUID REFERENCES purchases(id) ON DELETE CASCADE,
///     entry_date DATE NOT NULL,
///     description TEXT NOT NULL,
///     amount NUMERIC(14, 2) NOT NULL CHECK (amount >= 0),
///     kind ledger_kind NOT NULL,
///     category TEXT,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::audit_log::{AuditAction, AuditLog};
use crate::auth::authorization::{authorize_entity, authorize_farm};
use crate::auth::middleware::Principal;
use crate::error::{ScopeError, ScopeResult};
use crate::scope::{self, nullable, target_farm, FarmScoped, Patch, ScopedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ledger_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LedgerKind {
    Revenue,
    Expense,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub farm_id: Uuid,

    /// Set when the entry is derived from a purchase
    pub purchase_id: Option<Uuid>,

    pub entry_date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
    pub kind: LedgerKind,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FarmScoped for LedgerEntry {
    const TABLE: ScopedTable = ScopedTable {
        table: "ledger_entries",
        label: "Ledger entry",
        from: "ledger_entries t",
        farm_column: "t.farm_id",
        columns: "t.id, t.farm_id, t.purchase_id, t.entry_date, t.description, t.amount, t.kind, \
                  t.category, t.created_at, t.updated_at",
        search_columns: &["t.description", "t.category"],
        parent_column: Some("t.purchase_id"),
        date_column: Some("t.entry_date"),
        order_by: "t.entry_date DESC, t.id ASC",
        has_updated_at: true,
    };
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateLedgerEntry {
    pub farm_id: Option<Uuid>,
    pub entry_date: NaiveDate,

    #[validate(length(min = 1, max = 500), custom(function = "crate::scope::not_blank"))]
    pub description: String,

    pub amount: Decimal,
    pub kind: LedgerKind,

    #[validate(length(max = 100))]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateLedgerEntry {
    pub entry_date: Option<NaiveDate>,

    #[validate(length(min = 1, max = 500), custom(function = "crate::scope::not_blank"))]
    pub description: Option<String>,

    pub amount: Option<Decimal>,
    pub kind: Option<LedgerKind>,

    #[serde(default, deserialize_with = "nullable")]
    pub category: Option<Option<String>>,
}

pub(crate) fn check_amount(amount: Option<Decimal>) -> ScopeResult<()> {
    if amount.is_some_and(|a| a < Decimal::ZERO) {
        return Err(ScopeError::validation("amount must not be negative"));
    }
    Ok(())
}

impl LedgerEntry {
    /// Records a manual ledger entry
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreateLedgerEntry) -> ScopeResult<Self> {
        data.validate()?;
        check_amount(Some(data.amount))?;
        let farm_id = target_farm(data.farm_id, principal)?;
        authorize_farm(pool, farm_id, principal).await?;

        let sql = format!(
            "INSERT INTO ledger_entries AS t (farm_id, entry_date, description, amount, kind, category) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            Self::TABLE.columns
        );
        let entry = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(farm_id)
            .bind(data.entry_date)
            .bind(data.description.trim())
            .bind(data.amount)
            .bind(data.kind)
            .bind(data.category)
            .fetch_one(pool)
            .await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Create, "ledger_entry", Some(entry.id)).await;
        Ok(entry)
    }

    /// Edits a manual entry
    ///
    /// # Errors
    ///
    /// `Validation` when the entry is derived from a purchase.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdateLedgerEntry,
    ) -> ScopeResult<Self> {
        data.validate()?;
        check_amount(data.amount)?;
        let current = scope::find::<Self>(pool, id, principal).await?;
        reject_derived(&current)?;

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("entry_date", data.entry_date)
            .set_some("description", data.description.map(|d| d.trim().to_string()))
            .set_some("amount", data.amount)
            .set_some("kind", data.kind)
            .set_some("category", data.category);
        let entry = patch.apply::<Self, _>(pool, id).await?;

        AuditLog::record(pool, principal, Some(current.farm_id), AuditAction::Update, "ledger_entry", Some(id)).await;
        Ok(entry)
    }

    /// Deletes a manual entry
    ///
    /// # Errors
    ///
    /// `Validation` when the entry is derived from a purchase.
    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        let result = sqlx::query("DELETE FROM ledger_entries WHERE id = $1 AND purchase_id IS NULL")
            .bind(id)
            .execute(pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ScopeError::validation(
                "Ledger entries created by a purchase change only through the purchase",
            ));
        }

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "ledger_entry", Some(id)).await;
        Ok(())
    }
}

fn reject_derived(entry: &LedgerEntry) -> ScopeResult<()> {
    if entry.purchase_id.is_some() {
        return Err(ScopeError::validation(
            "Ledger entries created by a purchase change only through the purchase",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(purchase_id: Option<Uuid>) -> LedgerEntry {
        LedgerEntry {
            id: Uuid::new_v4(),
            farm_id: Uuid::new_v4(),
            purchase_id,
            entry_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            description: "Venda de bezerros".into(),
            amount: Decimal::new(1_200_000, 2),
            kind: LedgerKind::Revenue,
            category: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_derived_entries_are_read_only() {
        assert!(reject_derived(&entry(None)).is_ok());
        assert!(matches!(
            reject_derived(&entry(Some(Uuid::new_v4()))),
            Err(ScopeError::Validation(_))
        ));
    }

    #[test]
    fn test_negative_amount_rejected() {
        assert!(check_amount(Some(Decimal::new(-1, 2))).is_err());
        assert!(check_amount(Some(Decimal::ZERO)).is_ok());
    }

    #[test]
    fn test_kind_serde() {
        assert_eq!(serde_json::to_string(&LedgerKind::Expense).unwrap(), "\"expense\"");
    }
}
