/// Health events (vaccinations, treatments, exams)
///
/// Reached through the animal like weighings. A referenced medication must be
/// stocked by the animal's farm.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::animal::Animal;
use super::audit_log::{AuditAction, AuditLog};
use super::medication::Medication;
use crate::auth::authorization::authorize_entity;
use crate::auth::middleware::Principal;
use crate::error::ScopeResult;
use crate::scope::{self, ensure_in_farm, nullable, FarmScoped, Patch, ScopedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "health_event_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum HealthEventKind {
    Vaccination,
    Treatment,
    Exam,
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct HealthEvent {
    pub id: Uuid,
    pub animal_id: Uuid,
    pub medication_id: Option<Uuid>,
    pub occurred_on: NaiveDate,
    pub kind: HealthEventKind,
    pub description: String,
    pub dosage: Option<String>,
    pub veterinarian: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl FarmScoped for HealthEvent {
    const TABLE: ScopedTable = ScopedTable {
        table: "health_events",
        label: "Health event",
        from: "health_events t JOIN animals a ON a.id = t.animal_id",
        farm_column: "a.farm_id",
        columns: "t.id, t.animal_id, t.medication_id, t.occurred_on, t.kind, t.description, \
                  t.dosage, t.veterinarian, t.created_at",
        search_columns: &["t.description", "a.tag"],
        parent_column: Some("t.animal_id"),
        date_column: Some("t.occurred_on"),
        order_by: "t.occurred_on DESC, t.id ASC",
        has_updated_at: false,
    };
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateHealthEvent {
    pub animal_id: Uuid,
    pub medication_id: Option<Uuid>,
    pub occurred_on: NaiveDate,
    pub kind: HealthEventKind,

    #[validate(length(min = 1, max = 2000), custom(function = "crate::scope::not_blank"))]
    pub description: String,

    #[validate(length(max = 100))]
    pub dosage: Option<String>,

    #[validate(length(max = 200))]
    pub veterinarian: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateHealthEvent {
    #[serde(default, deserialize_with = "nullable")]
    pub medication_id: Option<Option<Uuid>>,

    pub occurred_on: Option<NaiveDate>,
    pub kind: Option<HealthEventKind>,

    #[validate(length(min = 1, max = 2000), custom(function = "crate::scope::not_blank"))]
    pub description: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub dosage: Option<Option<String>>,

    #[serde(default, deserialize_with = "nullable")]
    pub veterinarian: Option<Option<String>>,
}

impl HealthEvent {
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreateHealthEvent) -> ScopeResult<Self> {
        data.validate()?;
        let farm_id = authorize_entity::<Animal>(pool, data.animal_id, principal).await?;

        if let Some(medication_id) = data.medication_id {
            ensure_in_farm(pool, &Medication::TABLE, medication_id, farm_id).await?;
        }

        let sql = format!(
            "INSERT INTO health_events AS t \
             (animal_id, medication_id, occurred_on, kind, description, dosage, veterinarian) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            Self::TABLE.columns
        );
        let event = sqlx::query_as::<_, HealthEvent>(&sql)
            .bind(data.animal_id)
            .bind(data.medication_id)
            .bind(data.occurred_on)
            .bind(data.kind)
            .bind(data.description)
            .bind(data.dosage)
            .bind(data.veterinarian)
            .fetch_one(pool)
            .await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Create, "health_event", Some(event.id)).await;
        Ok(event)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdateHealthEvent,
    ) -> ScopeResult<Self> {
        data.validate()?;
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        if let Some(Some(medication_id)) = data.medication_id {
            ensure_in_farm(pool, &Medication::TABLE, medication_id, farm_id).await?;
        }

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("medication_id", data.medication_id)
            .set_some("occurred_on", data.occurred_on)
            .set_some("kind", data.kind)
            .set_some("description", data.description)
            .set_some("dosage", data.dosage)
            .set_some("veterinarian", data.veterinarian);
        let event = patch.apply::<Self, _>(pool, id).await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Update, "health_event", Some(id)).await;
        Ok(event)
    }

    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        let farm_id = scope::delete::<Self>(pool, id, principal).await?;
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "health_event", Some(id)).await;
        Ok(())
    }
}
