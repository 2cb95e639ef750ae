/// Paddocks (pasture subdivisions of a farm)

use chrono::{DateTime, Utc};
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
pub struct Paddock {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub name: String,
    pub area_hectares: Option<Decimal>,

    /// Head of cattle the paddock supports
    pub capacity: Option<i32>,

    /// Forage grown, e.g. "Brachiaria brizantha"
    pub forage: Option<String>,

    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FarmScoped for Paddock {
    const TABLE: ScopedTable = ScopedTable {
        table: "paddocks",
        label: "Paddock",
        from: "paddocks t",
        farm_column: "t.farm_id",
        columns: "t.id, t.farm_id, t.name, t.area_hectares, t.capacity, t.forage, t.notes, \
                  t.created_at, t.updated_at",
        search_columns: &["t.name", "t.forage"],
        parent_column: None,
        date_column: None,
        order_by: "t.name ASC, t.id ASC",
        has_updated_at: true,
    };
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreatePaddock {
    /// Defaults to the principal's active farm
    pub farm_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub name: String,

    pub area_hectares: Option<Decimal>,

    #[validate(range(min = 0))]
    pub capacity: Option<i32>,

    #[validate(length(max = 200))]
    pub forage: Option<String>,

    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdatePaddock {
    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub area_hectares: Option<Option<Decimal>>,

    #[serde(default, deserialize_with = "nullable")]
    pub capacity: Option<Option<i32>>,

    #[serde(default, deserialize_with = "nullable")]
    pub forage: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

fn check_figures(area: Option<Decimal>, capacity: Option<i32>) -> ScopeResult<()> {
    if area.is_some_and(|a| a < Decimal::ZERO) {
        return Err(ScopeError::validation("area_hectares must not be negative"));
    }
    if capacity.is_some_and(|c| c < 0) {
        return Err(ScopeError::validation("capacity must not be negative"));
    }
    Ok(())
}

impl Paddock {
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreatePaddock) -> ScopeResult<Self> {
        data.validate()?;
        check_figures(data.area_hectares, data.capacity)?;
        let farm_id = target_farm(data.farm_id, principal)?;
        authorize_farm(pool, farm_id, principal).await?;

        let sql = format!(
            "INSERT INTO paddocks AS t (farm_id, name, area_hectares, capacity, forage, notes) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            Self::TABLE.columns
        );
        let paddock = sqlx::query_as::<_, Paddock>(&sql)
            .bind(farm_id)
            .bind(data.name.trim())
            .bind(data.area_hectares)
            .bind(data.capacity)
            .bind(data.forage)
            .bind(data.notes)
            .fetch_one(pool)
            .await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Create, "paddock", Some(paddock.id)).await;
        Ok(paddock)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdatePaddock,
    ) -> ScopeResult<Self> {
        data.validate()?;
        check_figures(data.area_hectares.flatten(), data.capacity.flatten())?;
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("name", data.name.map(|n| n.trim().to_string()))
            .set_some("area_hectares", data.area_hectares)
            .set_some("capacity", data.capacity)
            .set_some("forage", data.forage)
            .set_some("notes", data.notes);
        let paddock = patch.apply::<Self, _>(pool, id).await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Update, "paddock", Some(id)).await;
        Ok(paddock)
    }

    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        let farm_id = scope::delete::<Self>(pool, id, principal).await?;
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "paddock", Some(id)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_figures() {
        assert!(check_figures(Some(Decimal::from(12)), Some(40)).is_ok());
        assert!(check_figures(Some(Decimal::from(-1)), None).is_err());
        assert!(check_figures(None, Some(-3)).is_err());
    }

    #[test]
    fn test_create_requires_name() {
        let data = CreatePaddock {
            farm_id: None,
            name: String::new(),
            area_hectares: None,
            capacity: None,
            forage: None,
            notes: None,
        };
        assert!(data.validate().is_err());
    }
}
