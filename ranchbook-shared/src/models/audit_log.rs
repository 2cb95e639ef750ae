/// Audit log
///
/// Mutations on farm data append a row here. Recording is best effort: a
/// failed insert is logged and swallowed, it never fails the operation that
/// triggered it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::authorization::require_role;
use crate::auth::middleware::Principal;
use crate::error::ScopeResult;
use crate::models::membership::FarmRole;

/// Kind of mutation recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    Create,
    Update,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AuditLog {
    pub id: Uuid,
    pub farm_id: Option<Uuid>,
    pub user_id: Uuid,
    pub action: String,
    pub entity: String,
    pub entity_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl AuditLog {
    /// Appends an audit row, logging instead of failing on error
    pub async fn record(
        pool: &PgPool,
        principal: &Principal,
        farm_id: Option<Uuid>,
        action: AuditAction,
        entity: &str,
        entity_id: Option<Uuid>,
    ) {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (farm_id, user_id, action, entity, entity_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(farm_id)
        .bind(principal.user_id)
        .bind(action.as_str())
        .bind(entity)
        .bind(entity_id)
        .execute(pool)
        .await;

        if let Err(e) = result {
            tracing::warn!(
                error = %e,
                user_id = %principal.user_id,
                action = action.as_str(),
                entity,
                "Failed to record audit log"
            );
        }
    }

    /// Most recent audit rows of a farm (administrators only)
    pub async fn list_for_farm(
        pool: &PgPool,
        principal: &Principal,
        farm_id: Uuid,
        limit: i64,
    ) -> ScopeResult<Vec<Self>> {
        require_role(pool, farm_id, principal, FarmRole::Administrator).await?;

        let rows = sqlx::query_as::<_, AuditLog>(
            r#"
            SELECT id, farm_id, user_id, action, entity, entity_id, created_at
            FROM audit_logs
            WHERE farm_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(farm_id)
        .bind(limit.clamp(1, 500))
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }
}
