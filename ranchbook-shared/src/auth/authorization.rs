/// Farm-membership guard
///
/// Every farm-scoped operation goes through this module before it reads or
/// writes anything:
///
/// 1. Resolve the owning farm of the target (directly or through its parent,
///    e.g. Weighing -> Animal -> Farm), see [`FarmScoped`]
/// 2. Require a membership row joining that farm and the principal
/// 3. Optionally require a minimum [`FarmRole`]
///
/// A farm that does not exist and a farm the principal is not a member of
/// both fail with `AccessDenied`, so callers cannot discover farm ids.
///
/// # Example
///
/// ```no_run
/// use ranchbook_shared::auth::authorization::{authorize_entity, authorize_farm};
/// use ranchbook_shared::auth::middleware::Principal;
/// use ranchbook_shared::models::animal::Animal;
/// use sqlx::PgPool;
/// use uuid::Uuid;
///
/// # async fn example(pool: PgPool, principal: Principal, farm_id: Uuid, animal_id: Uuid)
/// #     -> Result<(), Box<dyn std::error::Error>> {
/// let farm = authorize_farm(&pool, farm_id, &principal).await?;
/// let owner = authorize_entity::<Animal>(&pool, animal_id, &principal).await?;
/// # Ok(())
/// # }
/// ```

use sqlx::PgPool;
use uuid::Uuid;

use super::middleware::Principal;
use crate::error::{ScopeError, ScopeResult};
use crate::models::farm::Farm;
use crate::models::membership::{FarmRole, Membership};
use crate::scope::{self, FarmScoped};

/// Returns the farm iff the principal is a member of it
pub async fn authorize_farm(pool: &PgPool, farm_id: Uuid, principal: &Principal) -> ScopeResult<Farm> {
    let farm = sqlx::query_as::<_, Farm>(
        r#"
        SELECT f.id, f.name, f.location, f.area_hectares, f.created_at, f.updated_at
        FROM farms f
        JOIN farm_members m ON m.farm_id = f.id
        WHERE f.id = $1 AND m.user_id = $2
        "#,
    )
    .bind(farm_id)
    .bind(principal.user_id)
    .fetch_optional(pool)
    .await?;

    farm.ok_or_else(|| {
        tracing::debug!(farm_id = %farm_id, user_id = %principal.user_id, "Farm access denied");
        ScopeError::AccessDenied
    })
}

/// Resolves the owning farm of an entity and checks membership on it
///
/// Returns the owning farm id.
///
/// # Errors
///
/// - `NotFound` when the id does not resolve to any row
/// - `AccessDenied` when the row belongs to a farm the principal cannot reach
pub async fn authorize_entity<T: FarmScoped>(
    pool: &PgPool,
    id: Uuid,
    principal: &Principal,
) -> ScopeResult<Uuid> {
    let farm_id = scope::resolve_owner::<T>(pool, id)
        .await?
        .ok_or(ScopeError::NotFound(T::TABLE.label))?;

    authorize_farm(pool, farm_id, principal).await?;
    Ok(farm_id)
}

/// Checks that the principal holds at least `required` in the farm
///
/// Non-members get `AccessDenied`; members below the required role get
/// `InsufficientRole`.
pub async fn require_role(
    pool: &PgPool,
    farm_id: Uuid,
    principal: &Principal,
    required: FarmRole,
) -> ScopeResult<FarmRole> {
    let actual = Membership::get_role(pool, farm_id, principal.user_id)
        .await?
        .ok_or(ScopeError::AccessDenied)?;

    if !actual.has_permission(&required) {
        return Err(ScopeError::InsufficientRole { required, actual });
    }

    Ok(actual)
}
