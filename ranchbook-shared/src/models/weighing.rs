/// Weighings
///
/// A weighing has no farm column of its own: its farm is the farm of the
/// weighed animal.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::animal::Animal;
use super::audit_log::{AuditAction, AuditLog};
use crate::auth::authorization::authorize_entity;
use crate::auth::middleware::Principal;
use crate::error::{ScopeError, ScopeResult};
use crate::scope::{self, nullable, FarmScoped, Patch, ScopedTable};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Weighing {
    pub id: Uuid,
    pub animal_id: Uuid,
    pub weighed_on: NaiveDate,
    pub weight_kg: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FarmScoped for Weighing {
    const TABLE: ScopedTable = ScopedTable {
        table: "weighings",
        label: "Weighing",
        from: "weighings t JOIN animals a ON a.id = t.animal_id",
        farm_column: "a.farm_id",
        columns: "t.id, t.animal_id, t.weighed_on, t.weight_kg, t.notes, t.created_at",
        search_columns: &["a.tag", "t.notes"],
        parent_column: Some("t.animal_id"),
        date_column: Some("t.weighed_on"),
        order_by: "t.weighed_on DESC, t.id ASC",
        has_updated_at: false,
    };
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateWeighing {
    pub animal_id: Uuid,
    pub weighed_on: NaiveDate,
    pub weight_kg: Decimal,

    #[validate(length(max = 1000))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateWeighing {
    pub weighed_on: Option<NaiveDate>,
    pub weight_kg: Option<Decimal>,

    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

fn check_weight(weight_kg: Option<Decimal>) -> ScopeResult<()> {
    if weight_kg.is_some_and(|w| w <= Decimal::ZERO) {
        return Err(ScopeError::validation("weight_kg must be positive"));
    }
    Ok(())
}

impl Weighing {
    /// Records a weighing for an animal the principal can reach
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreateWeighing) -> ScopeResult<Self> {
        data.validate()?;
        check_weight(Some(data.weight_kg))?;
        let farm_id = authorize_entity::<Animal>(pool, data.animal_id, principal).await?;

        let sql = format!(
            "INSERT INTO weighings AS t (animal_id, weighed_on, weight_kg, notes) \
             VALUES ($1, $2, $3, $4) RETURNING {}",
            Self::TABLE.columns
        );
        let weighing = sqlx::query_as::<_, Weighing>(&sql)
            .bind(data.animal_id)
            .bind(data.weighed_on)
            .bind(data.weight_kg)
            .bind(data.notes)
            .fetch_one(pool)
            .await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Create, "weighing", Some(weighing.id)).await;
        Ok(weighing)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdateWeighing,
    ) -> ScopeResult<Self> {
        data.validate()?;
        check_weight(data.weight_kg)?;
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("weighed_on", data.weighed_on)
            .set_some("weight_kg", data.weight_kg)
            .set_some("notes", data.notes);
        let weighing = patch.apply::<Self, _>(pool, id).await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Update, "weighing", Some(id)).await;
        Ok(weighing)
    }

    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        let farm_id = scope::delete::<Self>(pool, id, principal).await?;
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "weighing", Some(id)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_must_be_positive() {
        assert!(check_weight(Some(Decimal::new(4525, 1))).is_ok());
        assert!(check_weight(Some(Decimal::ZERO)).is_err());
        assert!(check_weight(Some(Decimal::new(-10, 0))).is_err());
        assert!(check_weight(None).is_ok());
    }

    #[test]
    fn test_owner_resolved_through_animal() {
        assert_eq!(Weighing::TABLE.farm_column, "a.farm_id");
        assert!(Weighing::TABLE.from.contains("JOIN animals a"));
        assert!(Weighing::TABLE.order_by.ends_with("t.id ASC"));
    }
}
