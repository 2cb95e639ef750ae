/// Farm model
///
/// A farm is the tenancy root. Every operational record belongs to exactly
/// one farm, directly or through a parent row.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE farms (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name TEXT NOT NULL,
///     location TEXT,
///     area_hectares NUMERIC(12, 2),
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::audit_log::{AuditAction, AuditLog};
use super::membership::{FarmRole, Membership};
use crate::auth::authorization::{authorize_farm, require_role};
use crate::auth::middleware::Principal;
use crate::error::{ScopeError, ScopeResult};
use crate::scope::{nullable, FarmScoped, Patch, ScopedTable};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Farm {
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub area_hectares: Option<Decimal>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FarmScoped for Farm {
    const TABLE: ScopedTable = ScopedTable {
        table: "farms",
        label: "Farm",
        from: "farms t",
        farm_column: "t.id",
        columns: "t.id, t.name, t.location, t.area_hectares, t.created_at, t.updated_at",
        search_columns: &["t.name", "t.location"],
        parent_column: None,
        date_column: None,
        order_by: "t.name ASC, t.id ASC",
        has_updated_at: true,
    };
}

/// Farm together with the caller's role in it
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct FarmWithRole {
    pub id: Uuid,
    pub name: String,
    pub location: Option<String>,
    pub area_hectares: Option<Decimal>,
    pub role: FarmRole,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateFarm {
    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub name: String,

    #[validate(length(max = 500))]
    pub location: Option<String>,

    pub area_hectares: Option<Decimal>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateFarm {
    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub location: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    pub area_hectares: Option<Option<Decimal>>,
}

fn check_area(area: Option<Decimal>) -> ScopeResult<()> {
    match area {
        Some(a) if a < Decimal::ZERO => Err(ScopeError::validation("area_hectares must not be negative")),
        _ => Ok(()),
    }
}

impl Farm {
    /// Creates a farm and makes the caller its administrator
    ///
    /// Farm and membership are inserted in one transaction.
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreateFarm) -> ScopeResult<Self> {
        data.validate()?;
        check_area(data.area_hectares)?;

        let mut tx = pool.begin().await?;

        let farm = sqlx::query_as::<_, Farm>(
            r#"
            INSERT INTO farms (name, location, area_hectares)
            VALUES ($1, $2, $3)
            RETURNING id, name, location, area_hectares, created_at, updated_at
            "#,
        )
        .bind(data.name.trim())
        .bind(data.location)
        .bind(data.area_hectares)
        .fetch_one(&mut *tx)
        .await?;

        Membership::insert(&mut *tx, farm.id, principal.user_id, FarmRole::Administrator).await?;

        tx.commit().await?;

        tracing::info!(farm_id = %farm.id, user_id = %principal.user_id, "Farm created");
        AuditLog::record(pool, principal, Some(farm.id), AuditAction::Create, "farm", Some(farm.id)).await;

        Ok(farm)
    }

    /// Farms the caller belongs to, with the caller's role
    pub async fn list_for_principal(pool: &PgPool, principal: &Principal) -> ScopeResult<Vec<FarmWithRole>> {
        let farms = sqlx::query_as::<_, FarmWithRole>(
            r#"
            SELECT f.id, f.name, f.location, f.area_hectares, m.role, f.created_at
            FROM farms f
            JOIN farm_members m ON m.farm_id = f.id
            WHERE m.user_id = $1
            ORDER BY f.name ASC, f.id ASC
            "#,
        )
        .bind(principal.user_id)
        .fetch_all(pool)
        .await?;

        Ok(farms)
    }

    pub async fn get(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<Self> {
        authorize_farm(pool, id, principal).await
    }

    /// Updates the farm record (administrators only)
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdateFarm,
    ) -> ScopeResult<Self> {
        data.validate()?;
        check_area(data.area_hectares.flatten())?;
        require_role(pool, id, principal, FarmRole::Administrator).await?;

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("name", data.name.map(|n| n.trim().to_string()))
            .set_some("location", data.location)
            .set_some("area_hectares", data.area_hectares);
        let farm = patch.apply::<Self, _>(pool, id).await?;

        AuditLog::record(pool, principal, Some(id), AuditAction::Update, "farm", Some(id)).await;
        Ok(farm)
    }

    /// Deletes the farm and, by cascade, everything recorded under it
    /// (administrators only)
    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        require_role(pool, id, principal, FarmRole::Administrator).await?;

        sqlx::query("DELETE FROM farms WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        tracing::info!(farm_id = %id, user_id = %principal.user_id, "Farm deleted");
        AuditLog::record(pool, principal, None, AuditAction::Delete, "farm", Some(id)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_create_farm_validation() {
        let ok = CreateFarm {
            name: "Fazenda Boa Vista".into(),
            location: Some("Goiás".into()),
            area_hectares: Some(Decimal::from(350)),
        };
        assert!(ok.validate().is_ok());

        let empty = CreateFarm {
            name: String::new(),
            location: None,
            area_hectares: None,
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_negative_area_rejected() {
        assert!(check_area(Some(Decimal::from_str("-1.5").unwrap())).is_err());
        assert!(check_area(Some(Decimal::ZERO)).is_ok());
        assert!(check_area(None).is_ok());
    }

    #[test]
    fn test_update_farm_clears_location() {
        let update: UpdateFarm = serde_json::from_str(r#"{"location": null}"#).unwrap();
        assert_eq!(update.location, Some(None));
        assert!(update.name.is_none());
        assert!(update.area_hectares.is_none());
    }
}
