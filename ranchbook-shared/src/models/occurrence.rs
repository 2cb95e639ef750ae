/// Field occurrences (fence down, water shortage, predator sighting, ...)

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::audit_log::{AuditAction, AuditLog};
use super::paddock::Paddock;
use crate::auth::authorization::{authorize_entity, authorize_farm};
use crate::auth::middleware::Principal;
use crate::error::ScopeResult;
use crate::scope::{self, ensure_in_farm, nullable, target_farm, FarmScoped, Patch, ScopedTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "occurrence_severity", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Occurrence {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub paddock_id: Option<Uuid>,
    pub occurred_on: NaiveDate,
    pub title: String,
    pub description: Option<String>,
    pub severity: Severity,
    pub created_at: DateTime<Utc>,
}

impl FarmScoped for Occurrence {
    const TABLE: ScopedTable = ScopedTable {
        table: "occurrences",
        label: "Occurrence",
        from: "occurrences t",
        farm_column: "t.farm_id",
        columns: "t.id, t.farm_id, t.paddock_id, t.occurred_on, t.title, t.description, \
                  t.severity, t.created_at",
        search_columns: &["t.title", "t.description"],
        parent_column: Some("t.paddock_id"),
        date_column: Some("t.occurred_on"),
        order_by: "t.occurred_on DESC, t.id ASC",
        has_updated_at: false,
    };
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateOccurrence {
    pub farm_id: Option<Uuid>,
    pub paddock_id: Option<Uuid>,
    pub occurred_on: NaiveDate,

    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub title: String,

    pub description: Option<String>,

    #[serde(default = "default_severity")]
    pub severity: Severity,
}

fn default_severity() -> Severity {
    Severity::Low
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateOccurrence {
    #[serde(default, deserialize_with = "nullable")]
    pub paddock_id: Option<Option<Uuid>>,

    pub occurred_on: Option<NaiveDate>,

    #[validate(length(min = 1, max = 200), custom(function = "crate::scope::not_blank"))]
    pub title: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub description: Option<Option<String>>,

    pub severity: Option<Severity>,
}

impl Occurrence {
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreateOccurrence) -> ScopeResult<Self> {
        data.validate()?;
        let farm_id = target_farm(data.farm_id, principal)?;
        authorize_farm(pool, farm_id, principal).await?;

        if let Some(paddock_id) = data.paddock_id {
            ensure_in_farm(pool, &Paddock::TABLE, paddock_id, farm_id).await?;
        }

        let sql = format!(
            "INSERT INTO occurrences AS t (farm_id, paddock_id, occurred_on, title, description, severity) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
            Self::TABLE.columns
        );
        let occurrence = sqlx::query_as::<_, Occurrence>(&sql)
            .bind(farm_id)
            .bind(data.paddock_id)
            .bind(data.occurred_on)
            .bind(data.title.trim())
            .bind(data.description)
            .bind(data.severity)
            .fetch_one(pool)
            .await?;

        if occurrence.severity == Severity::High {
            tracing::warn!(farm_id = %farm_id, occurrence_id = %occurrence.id, title = %occurrence.title, "High severity occurrence");
        }

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Create, "occurrence", Some(occurrence.id)).await;
        Ok(occurrence)
    }

    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdateOccurrence,
    ) -> ScopeResult<Self> {
        data.validate()?;
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        if let Some(Some(paddock_id)) = data.paddock_id {
            ensure_in_farm(pool, &Paddock::TABLE, paddock_id, farm_id).await?;
        }

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("paddock_id", data.paddock_id)
            .set_some("occurred_on", data.occurred_on)
            .set_some("title", data.title.map(|t| t.trim().to_string()))
            .set_some("description", data.description)
            .set_some("severity", data.severity);
        let occurrence = patch.apply::<Self, _>(pool, id).await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Update, "occurrence", Some(id)).await;
        Ok(occurrence)
    }

    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        let farm_id = scope::delete::<Self>(pool, id, principal).await?;
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "occurrence", Some(id)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_defaults_to_low() {
        let data: CreateOccurrence =
            serde_json::from_str(r#"{"occurred_on": "2024-03-02", "title": "Cerca caída"}"#).unwrap();
        assert_eq!(data.severity, Severity::Low);
        assert!(data.validate().is_ok());
    }
}
