/// Farm membership model
///
/// A membership is the `(farm, user, role)` triple that grants a user access
/// to a farm. Every access check in the system traverses this table.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE farm_role AS ENUM ('administrator', 'manager', 'worker', 'viewer');
///
/// CREATE TABLE farm_members (
///     farm_id UUID NOT NULL REFERENCES farms(id) ON DELETE CASCADE,
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE,
///     role farm_role NOT NULL DEFAULT 'worker',
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     PRIMARY KEY (farm_id, user_id)
/// );
/// ```
///
/// # Roles
///
/// - **administrator**: manage the farm record and its members
/// - **manager**, **worker**, **viewer**: record keeping on the farm's data

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgExecutor, PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::audit_log::{AuditAction, AuditLog};
use crate::auth::middleware::Principal;
use crate::error::{ScopeError, ScopeResult};

/// Role of a user within a farm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "farm_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FarmRole {
    Administrator,
    Manager,
    Worker,
    Viewer,
}

impl FarmRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            FarmRole::Administrator => "administrator",
            FarmRole::Manager => "manager",
            FarmRole::Worker => "worker",
            FarmRole::Viewer => "viewer",
        }
    }

    /// Hierarchy: Administrator > Manager > Worker > Viewer
    pub fn has_permission(&self, required: &FarmRole) -> bool {
        self.level() >= required.level()
    }

    fn level(&self) -> u8 {
        match self {
            FarmRole::Administrator => 4,
            FarmRole::Manager => 3,
            FarmRole::Worker => 2,
            FarmRole::Viewer => 1,
        }
    }
}

/// Membership row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Membership {
    pub farm_id: Uuid,
    pub user_id: Uuid,
    pub role: FarmRole,
    pub created_at: DateTime<Utc>,
}

/// Member listing row joined with the user's identity
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberDetail {
    pub user_id: Uuid,
    pub email: String,
    pub name: Option<String>,
    pub role: FarmRole,
    pub created_at: DateTime<Utc>,
}

impl Membership {
    /// Inserts a membership row
    pub async fn insert<'e, E: PgExecutor<'e>>(
        executor: E,
        farm_id: Uuid,
        user_id: Uuid,
        role: FarmRole,
    ) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            INSERT INTO farm_members (farm_id, user_id, role)
            VALUES ($1, $2, $3)
            RETURNING farm_id, user_id, role, created_at
            "#,
        )
        .bind(farm_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(executor)
        .await
    }

    /// Returns the user's role in a farm, or None if they are not a member
    pub async fn get_role(
        pool: &PgPool,
        farm_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<FarmRole>, sqlx::Error> {
        sqlx::query_scalar("SELECT role FROM farm_members WHERE farm_id = $1 AND user_id = $2")
            .bind(farm_id)
            .bind(user_id)
            .fetch_optional(pool)
            .await
    }

    /// Lists the members of a farm
    pub async fn list_members(pool: &PgPool, farm_id: Uuid) -> Result<Vec<MemberDetail>, sqlx::Error> {
        sqlx::query_as::<_, MemberDetail>(
            r#"
            SELECT u.id AS user_id, u.email, u.name, m.role, m.created_at
            FROM farm_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.farm_id = $1
            ORDER BY m.created_at ASC, u.id ASC
            "#,
        )
        .bind(farm_id)
        .fetch_all(pool)
        .await
    }

    /// Lists every membership of a user, oldest first
    pub async fn list_by_user(pool: &PgPool, user_id: Uuid) -> Result<Vec<Self>, sqlx::Error> {
        sqlx::query_as::<_, Membership>(
            r#"
            SELECT farm_id, user_id, role, created_at
            FROM farm_members
            WHERE user_id = $1
            ORDER BY created_at ASC, farm_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await
    }

    async fn count_administrators<'e, E: PgExecutor<'e>>(
        executor: E,
        farm_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM farm_members WHERE farm_id = $1 AND role = 'administrator'",
        )
        .bind(farm_id)
        .fetch_one(executor)
        .await
    }

    /// Serializes administrator changes on a farm
    ///
    /// Locks the farm row, then re-reads the caller's role under that lock so a
    /// caller demoted or removed by a concurrent change is refused.
    async fn lock_farm(
        tx: &mut Transaction<'_, Postgres>,
        farm_id: Uuid,
        principal: &Principal,
    ) -> ScopeResult<()> {
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM farms WHERE id = $1 FOR UPDATE")
            .bind(farm_id)
            .fetch_optional(&mut **tx)
            .await?
            .ok_or(ScopeError::NotFound("Farm"))?;

        let actual: FarmRole =
            sqlx::query_scalar("SELECT role FROM farm_members WHERE farm_id = $1 AND user_id = $2")
                .bind(farm_id)
                .bind(principal.user_id)
                .fetch_optional(&mut **tx)
                .await?
                .ok_or(ScopeError::AccessDenied)?;

        if actual != FarmRole::Administrator {
            return Err(ScopeError::InsufficientRole {
                required: FarmRole::Administrator,
                actual,
            });
        }

        Ok(())
    }

    /// Adds an existing user (looked up by email) to a farm
    ///
    /// Requires the administrator role. Fails with `NotFound("User")` when no
    /// account uses that email and `Conflict` when the user is already a member.
    pub async fn add_member(
        pool: &PgPool,
        principal: &Principal,
        farm_id: Uuid,
        email: &str,
        role: FarmRole,
    ) -> ScopeResult<Self> {
        crate::auth::authorization::require_role(pool, farm_id, principal, FarmRole::Administrator)
            .await?;

        let user_id: Uuid = sqlx::query_scalar("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(pool)
            .await?
            .ok_or(ScopeError::NotFound("User"))?;

        let membership = Self::insert(pool, farm_id, user_id, role).await?;
        tracing::info!(farm_id = %farm_id, user_id = %user_id, role = role.as_str(), "Member added");
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Create, "member", Some(user_id)).await;
        Ok(membership)
    }

    /// Changes a member's role
    ///
    /// The last administrator of a farm cannot be demoted. The farm row is
    /// locked before administrators are counted.
    pub async fn change_role(
        pool: &PgPool,
        principal: &Principal,
        farm_id: Uuid,
        user_id: Uuid,
        role: FarmRole,
    ) -> ScopeResult<Self> {
        crate::auth::authorization::require_role(pool, farm_id, principal, FarmRole::Administrator)
            .await?;

        let mut tx = pool.begin().await?;
        Self::lock_farm(&mut tx, farm_id, principal).await?;

        let current: FarmRole = sqlx::query_scalar(
            "SELECT role FROM farm_members WHERE farm_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(farm_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ScopeError::NotFound("Member"))?;

        if current == FarmRole::Administrator
            && role != FarmRole::Administrator
            && Self::count_administrators(&mut *tx, farm_id).await? <= 1
        {
            return Err(ScopeError::validation("A farm must keep at least one administrator"));
        }

        let membership = sqlx::query_as::<_, Membership>(
            r#"
            UPDATE farm_members SET role = $3
            WHERE farm_id = $1 AND user_id = $2
            RETURNING farm_id, user_id, role, created_at
            "#,
        )
        .bind(farm_id)
        .bind(user_id)
        .bind(role)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(farm_id = %farm_id, user_id = %user_id, role = role.as_str(), "Member role changed");
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Update, "member", Some(user_id)).await;
        Ok(membership)
    }

    /// Removes a member from a farm
    ///
    /// The last administrator of a farm cannot be removed. The farm row is
    /// locked before administrators are counted.
    pub async fn remove_member(
        pool: &PgPool,
        principal: &Principal,
        farm_id: Uuid,
        user_id: Uuid,
    ) -> ScopeResult<()> {
        crate::auth::authorization::require_role(pool, farm_id, principal, FarmRole::Administrator)
            .await?;

        let mut tx = pool.begin().await?;
        Self::lock_farm(&mut tx, farm_id, principal).await?;

        let current: FarmRole = sqlx::query_scalar(
            "SELECT role FROM farm_members WHERE farm_id = $1 AND user_id = $2 FOR UPDATE",
        )
        .bind(farm_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ScopeError::NotFound("Member"))?;

        if current == FarmRole::Administrator
            && Self::count_administrators(&mut *tx, farm_id).await? <= 1
        {
            return Err(ScopeError::validation("A farm must keep at least one administrator"));
        }

        sqlx::query("DELETE FROM farm_members WHERE farm_id = $1 AND user_id = $2")
            .bind(farm_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(farm_id = %farm_id, user_id = %user_id, "Member removed");
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "member", Some(user_id)).await;
        Ok(())
    }
}
