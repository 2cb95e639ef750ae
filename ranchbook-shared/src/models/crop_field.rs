/// Crop fields (cultivated plots)

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
pub struct CropField {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub name: String,
    pub area_hectares: Option<Decimal>,
    pub crop: Option<String>,
    pub planted_on: Option<NaiveDate>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FarmScoped for CropField {
    const TABLE: ScopedTable = ScopedTable {
        table: "crop_fields",
        label: "Crop field",
        from: "crop_fields t",
        farm_column: "t.farm_id",
        columns: "t.id, t.farm_id, t.name, t.area_hectares, t.crop, t.planted_on, t.notes, \
                  t.created_at, t.updated_at",
        search_columns: &["t.name", "t.crop"],
        parent_column: None,
        date_column: Some("t.planted_on"),
        order_by: "t.name ASC, t.id ASC",
        has_updated_at: true,
    };
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCropField {
    pub farm_id: Option<Uuid>,

    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub name: String,

    pub area_hectares: Option<Decimal>,

    #[validate(length(max = 200))]
    pub crop: Option<String>,

    pub planted_on: Option<NaiveDate>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateCropField {
    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub name: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub area_hectares: Option<Option<Decimal>>,

    #[serde(default, deserialize_with = "nullable")]
    pub crop: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    pub planted_on: Option<Option<NaiveDate>>,

    #[serde(default, deserialize_with = "nullable")]
    pub notes: Option<Option<String>>,
}

fn check_area(area: Option<Decimal>) -> ScopeResult<()> {
    if area.is_some_and(|a| a < Decimal::ZERO) {
        return Err(ScopeError::validation("area_hectares must not be negative"));
    }
    Ok(())
}

impl CropField {
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreateCropField) -> ScopeResult<Self> {
        data.validate()?;
        check_area(data.area_hectares)?;
        let farm_id = target_farm(data.farm_id, principal)?;
        authorize_farm(pool, farm_id, principal).await?;

        let sql = format!(
            "INSERT INTO crop_fields AS t (farm_id, name, area_hectares, crop, planted_on, notes) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            Self::TABLE.columns
        );
        let field = sqlx::query_as::<_, CropField>(&sql)
            .bind(farm_id)
            .bind(data.name.trim())
            .bind(data.area_hectares)
            .bind(data.crop)
            .bind(data.planted_on)
            .bind(data.notes)
            .fetch_one(pool)
            .await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Create, "crop_field", Some(field.id)).await;
        Ok(field)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdateCropField,
    ) -> ScopeResult<Self> {
        data.validate()?;
        check_area(data.area_hectares.flatten())?;
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("name", data.name.map(|n| n.trim().to_string()))
            .set_some("area_hectares", data.area_hectares)
            .set_some("crop", data.crop)
            .set_some("planted_on", data.planted_on)
            .set_some("notes", data.notes);
        let field = patch.apply::<Self, _>(pool, id).await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Update, "crop_field", Some(id)).await;
        Ok(field)
    }

    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        let farm_id = scope::delete::<Self>(pool, id, principal).await?;
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "crop_field", Some(id)).await;
        Ok(())
    }
}
