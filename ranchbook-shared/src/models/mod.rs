/// Database models for Ranchbook
///
/// This module contains every entity and its farm-scoped operations.
///
/// # Models
///
/// - `user`: User accounts
/// - `farm`: Farms, the tenancy root
/// - `membership`: User-farm relationships with roles
/// - `paddock`, `crop_field`: Land
/// - `animal`, `weighing`, `health_event`, `medication`: Herd records
/// - `occurrence`, `device_reading`: Field log and sensor data
/// - `purchase`, `ledger_entry`: Finance; purchases keep a derived ledger line
/// - `audit_log`: Best-effort record of mutations
///
/// # Example
///
/// ```no_run
/// use ranchbook_shared::auth::middleware::Principal;
/// use ranchbook_shared::models::animal::{Animal, CreateAnimal, Sex};
/// use ranchbook_shared::scope::{self, ListParams};
/// use sqlx::PgPool;
///
/// # async fn example(pool: PgPool, principal: Principal) -> Result<(), Box<dyn std::error::Error>> {
/// let animal = Animal::create(&pool, &principal, CreateAnimal {
///     farm_id: principal.farm_id,
///     paddock_id: None,
///     tag: "BR-0001".to_string(),
///     name: Some("Mimosa".to_string()),
///     breed: Some("Nelore".to_string()),
///     sex: Sex::Female,
///     birth_date: None,
/// }).await?;
///
/// let page = scope::list::<Animal>(&pool, &principal, &ListParams::default()).await?;
/// assert!(page.total >= 1);
/// # Ok(())
/// # }
/// ```

pub mod animal;
pub mod audit_log;
pub mod crop_field;
pub mod device_reading;
pub mod farm;
pub mod health_event;
pub mod ledger_entry;
pub mod medication;
pub mod membership;
pub mod occurrence;
pub mod paddock;
pub mod purchase;
pub mod user;
pub mod weighing;
