/// Medication stock

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

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Medication {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub name: String,
    pub active_ingredient: Option<String>,
    pub stock_quantity: Decimal,

    /// Unit of `stock_quantity`, e.g. "ml", "doses"
    pub unit: String,

    pub expires_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FarmScoped for Medication {
    const TABLE: ScopedTable = ScopedTable {
        table: "medications",
        label: "Medication",
        from: "medications t",
        farm_column: "t.farm_id",
        columns: "t.id, t.farm_id, t.name, t.active_ingredient, t.stock_quantity, t.unit, \
                  t.expires_on, t.created_at, t.updated_at",
        search_columns: &["t.name", "t.active_ingredient"],
        parent_column: None,
        date_column: Some("t.expires_on"),
        order_by: "t.name ASC, t.id ASC",
        has_updated_at: true,
    };
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateMedication {
    pub farm_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub name: String,

    #[validate(length(max = 200))]
    pub active_ingredient: Option<String>,

    #[serde(default)]
    pub stock_quantity: Decimal,

    #[validate(length(min = 1, max = 20), custom(function = "crate::scope::not_blank"))]
    pub unit: String,

    pub expires_on: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateMedication {
    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub active_ingredient: Option<Option<String>>,

    pub stock_quantity: Option<Decimal>,

    #[validate(length(min = 1, max = 20), custom(function = "crate::scope::not_blank"))]
    pub unit: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub expires_on: Option<Option<NaiveDate>>,
}

fn check_stock(stock: Option<Decimal>) -> ScopeResult<()> {
    if stock.is_some_and(|s| s < Decimal::ZERO) {
        return Err(ScopeError::validation("stock_quantity must not be negative"));
    }
    Ok(())
}

impl Medication {
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreateMedication) -> ScopeResult<Self> {
        data.validate()?;
        check_stock(Some(data.stock_quantity))?;
        let farm_id = target_farm(data.farm_id, principal)?;
        authorize_farm(pool, farm_id, principal).await?;

        let sql = format!(
            "INSERT INTO medications AS t (farm_id, name, active_ingredient, stock_quantity, unit, expires_on) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            Self::TABLE.columns
        );
        let medication = sqlx::query_as::<_, Medication>(&sql)
            .bind(farm_id)
            .bind(data.name.trim())
            .bind(data.active_ingredient)
            .bind(data.stock_quantity)
            .bind(data.unit.trim())
            .bind(data.expires_on)
            .fetch_one(pool)
            .await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Create, "medication", Some(medication.id)).await;
        Ok(medication)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdateMedication,
    ) -> ScopeResult<Self> {
        data.validate()?;
        check_stock(data.stock_quantity)?;
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("name", data.name.map(|n| n.trim().to_string()))
            .set_some("active_ingredient", data.active_ingredient)
            .set_some("stock_quantity", data.stock_quantity)
            .set_some("unit", data.unit.map(|u| u.trim().to_string()))
            .set_some("expires_on", data.expires_on);
        let medication = patch.apply::<Self, _>(pool, id).await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Update, "medication", Some(id)).await;
        Ok(medication)
    }

    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        let farm_id = scope::delete::<Self>(pool, id, principal).await?;
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "medication", Some(id)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_default_and_check() {
        let data: CreateMedication =
            serde_json::from_str(r#"{"name": "Ivermectina 1%", "unit": "ml"}"#).unwrap();
        assert_eq!(data.stock_quantity, Decimal::ZERO);
        assert!(check_stock(Some(data.stock_quantity)).is_ok());
        assert!(check_stock(Some(Decimal::new(-1, 0))).is_err());
    }
}
