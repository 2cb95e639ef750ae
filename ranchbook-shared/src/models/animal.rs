/// Animal registry
///
/// Animals are identified within a farm by their ear tag; `(farm_id, tag)` is
/// unique. An animal may be placed in a paddock of the same farm.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE animals (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     farm_id UUID NOT NULL REFERENCES farms(id) ON DELETE CASCADE,
///     paddock_id UUID REFERENCES paddocks(id) ON DELETE SET NULL,
///     tag TEXT NOT NULL,
///     name TEXT,
///     breed TEXT,
///     sex animal_sex NOT NULL,
///     birth_date DATE,
///     status animal_status NOT NULL DEFAULT 'active',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     CONSTRAINT animals_farm_tag_key UNIQUE (farm_id, tag)
/// );
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::audit_log::{AuditAction, AuditLog};
use super::paddock::Paddock;
use crate::auth::authorization::{authorize_entity, authorize_farm};
use crate::auth::middleware::Principal;
use crate::error::{ScopeError, ScopeResult};
use crate::scope::{self, ensure_in_farm, nullable, target_farm, FarmScoped, Patch, ScopedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "animal_sex", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "animal_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum AnimalStatus {
    Active,
    Sold,
    Dead,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Animal {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub paddock_id: Option<Uuid>,

    /// Ear tag, unique within the farm
    pub tag: String,

    pub name: Option<String>,
    pub breed: Option<String>,
    pub sex: Sex,
    pub birth_date: Option<NaiveDate>,
    pub status: AnimalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FarmScoped for Animal {
    const TABLE: ScopedTable = ScopedTable {
        table: "animals",
        label: "Animal",
        from: "animals t",
        farm_column: "t.farm_id",
        columns: "t.id, t.farm_id, t.paddock_id, t.tag, t.name, t.breed, t.sex, t.birth_date, \
                  t.status, t.created_at, t.updated_at",
        search_columns: &["t.tag", "t.name"],
        parent_column: Some("t.paddock_id"),
        date_column: Some("t.birth_date"),
        order_by: "t.tag ASC, t.id ASC",
        has_updated_at: true,
    };
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateAnimal {
    pub farm_id: Option<Uuid>,
    pub paddock_id: Option<Uuid>,

    #[validate(length(min = 1, max = 50), custom(function = "crate::scope::not_blank"))]
    pub tag: String,

    #[validate(length(max = 200))]
    pub name: Option<String>,

    #[validate(length(max = 100))]
    pub breed: Option<String>,

    pub sex: Sex,
    pub birth_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateAnimal {
    #[serde(default, deserialize_with = "nullable")]
    pub paddock_id: Option<Option<Uuid>>,

    #[validate(length(min = 1, max = 50), custom(function = "crate::scope::not_blank"))]
    pub tag: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub name: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    pub breed: Option<Option<String>>,

    pub sex: Option<Sex>,

    #[serde(default, deserialize_with = "nullable")]
    pub birth_date: Option<Option<NaiveDate>>,

    pub status: Option<AnimalStatus>,
}

fn check_birth_date(birth_date: Option<NaiveDate>) -> ScopeResult<()> {
    if birth_date.is_some_and(|d| d > Utc::now().date_naive()) {
        return Err(ScopeError::validation("birth_date must not be in the future"));
    }
    Ok(())
}

impl Animal {
    /// Registers an animal
    ///
    /// # Errors
    ///
    /// - `Validation` when the paddock belongs to another farm
    /// - `Conflict` when the tag is already used in the farm
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreateAnimal) -> ScopeResult<Self> {
        data.validate()?;
        check_birth_date(data.birth_date)?;
        let farm_id = target_farm(data.farm_id, principal)?;
        authorize_farm(pool, farm_id, principal).await?;

        if let Some(paddock_id) = data.paddock_id {
            ensure_in_farm(pool, &Paddock::TABLE, paddock_id, farm_id).await?;
        }

        let sql = format!(
            "INSERT INTO animals AS t (farm_id, paddock_id, tag, name, breed, sex, birth_date) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            Self::TABLE.columns
        );
        let animal = sqlx::query_as::<_, Animal>(&sql)
            .bind(farm_id)
            .bind(data.paddock_id)
            .bind(data.tag.trim())
            .bind(data.name)
            .bind(data.breed)
            .bind(data.sex)
            .bind(data.birth_date)
            .fetch_one(pool)
            .await?;

        tracing::debug!(animal_id = %animal.id, farm_id = %farm_id, tag = %animal.tag, "Animal registered");
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Create, "animal", Some(animal.id)).await;
        Ok(animal)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdateAnimal,
    ) -> ScopeResult<Self> {
        data.validate()?;
        check_birth_date(data.birth_date.flatten())?;
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        if let Some(Some(paddock_id)) = data.paddock_id {
            ensure_in_farm(pool, &Paddock::TABLE, paddock_id, farm_id).await?;
        }

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("paddock_id", data.paddock_id)
            .set_some("tag", data.tag.map(|t| t.trim().to_string()))
            .set_some("name", data.name)
            .set_some("breed", data.breed)
            .set_some("sex", data.sex)
            .set_some("birth_date", data.birth_date)
            .set_some("status", data.status);
        let animal = patch.apply::<Self, _>(pool, id).await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Update, "animal", Some(id)).await;
        Ok(animal)
    }

    /// Deletes an animal together with its weighings and health events
    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        let farm_id = scope::delete::<Self>(pool, id, principal).await?;
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "animal", Some(id)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_enums_serde() {
        assert_eq!(serde_json::to_string(&Sex::Female).unwrap(), "\"female\"");
        let status: AnimalStatus = serde_json::from_str("\"sold\"").unwrap();
        assert_eq!(status, AnimalStatus::Sold);
    }

    #[test]
    fn test_birth_date_in_future_rejected() {
        let tomorrow = Utc::now().date_naive() + Duration::days(1);
        assert!(check_birth_date(Some(tomorrow)).is_err());
        assert!(check_birth_date(NaiveDate::from_ymd_opt(2020, 5, 1)).is_ok());
        assert!(check_birth_date(None).is_ok());
    }

    #[test]
    fn test_update_moves_out_of_paddock() {
        let update: UpdateAnimal = serde_json::from_str(r#"{"paddock_id": null, "status": "dead"}"#).unwrap();
        assert_eq!(update.paddock_id, Some(None));
        assert_eq!(update.status, Some(AnimalStatus::Dead));
        assert!(update.tag.is_none());
    }

    #[test]
    fn test_tag_length() {
        let data = CreateAnimal {
            farm_id: None,
            paddock_id: None,
            tag: "x".repeat(51),
            name: None,
            breed: None,
            sex: Sex::Male,
            birth_date: None,
        };
        assert!(data.validate().is_err());
    }
}
