/// Generic farm-scoped CRUD template
///
/// Every operational entity (paddock, animal, weighing, purchase, ...) is a
/// row that belongs to exactly one farm, either through its own `farm_id`
/// column or through a parent row. Instead of repeating the membership check
/// in every module, each entity describes itself once with a [`ScopedTable`]
/// and the functions here implement list/find/delete/export on top of it.
///
/// Listing inverts the single-entity check: results are restricted to
/// `farm IN (farms where the principal is a member)` and optionally narrowed
/// to one explicit farm, which must itself pass the guard.
///
/// Conventions for the SQL fragments of a [`ScopedTable`]:
///
/// - the entity table is always aliased `t`
/// - `columns` only references `t`, so it can be reused in `RETURNING`
/// - `order_by` ends with `t.id` so paging is deterministic

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::auth::authorization::{authorize_entity, authorize_farm};
use crate::auth::middleware::Principal;
use crate::error::{ScopeError, ScopeResult};

/// Page size used when the caller does not ask for one
pub const DEFAULT_TAKE: i64 = 20;

/// Largest page a caller can request
pub const MAX_TAKE: i64 = 100;

/// Row cap for unpaginated exports
pub const EXPORT_LIMIT: i64 = 10_000;

/// SQL description of a farm-scoped entity
#[derive(Debug, Clone, Copy)]
pub struct ScopedTable {
    /// Physical table name
    pub table: &'static str,

    /// Human label used in `NotFound` errors
    pub label: &'static str,

    /// FROM clause, entity aliased `t`, plus any join needed to reach the farm
    pub from: &'static str,

    /// Expression yielding the owning farm id
    pub farm_column: &'static str,

    /// Select list (only `t.` columns)
    pub columns: &'static str,

    /// Text columns matched by the `search` parameter
    pub search_columns: &'static [&'static str],

    /// Column matched by the `parent_id` parameter
    pub parent_column: Option<&'static str>,

    /// Date expression filtered by `from`/`to`
    pub date_column: Option<&'static str>,

    /// Stable ordering, ending in `t.id`
    pub order_by: &'static str,

    /// Whether the table carries an `updated_at` column
    pub has_updated_at: bool,
}

/// Entity that belongs to a farm
pub trait FarmScoped: for<'r> sqlx::FromRow<'r, PgRow> + Send + Unpin + 'static {
    const TABLE: ScopedTable;
}

/// Query parameters accepted by every list endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub take: Option<i64>,
    pub skip: Option<i64>,
    pub search: Option<String>,
    pub farm_id: Option<Uuid>,
    #[serde(alias = "animal_id", alias = "paddock_id", alias = "purchase_id")]
    pub parent_id: Option<Uuid>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl ListParams {
    /// Resolves `(take, skip)`: defaults `(20, 0)`, `take` capped at 100
    pub fn window(&self) -> ScopeResult<(i64, i64)> {
        let take = self.take.unwrap_or(DEFAULT_TAKE);
        let skip = self.skip.unwrap_or(0);

        if take < 1 {
            return Err(ScopeError::validation("take must be at least 1"));
        }
        if skip < 0 {
            return Err(ScopeError::validation("skip must not be negative"));
        }

        Ok((take.min(MAX_TAKE), skip))
    }

    fn check_for(&self, table: &ScopedTable) -> ScopeResult<()> {
        if self.parent_id.is_some() && table.parent_column.is_none() {
            return Err(ScopeError::Validation(format!(
                "{} listings cannot be filtered by parent",
                table.label
            )));
        }
        if (self.from.is_some() || self.to.is_some()) && table.date_column.is_none() {
            return Err(ScopeError::Validation(format!(
                "{} listings cannot be filtered by date",
                table.label
            )));
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(ScopeError::validation("from must not be after to"));
            }
        }
        Ok(())
    }

    fn search_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", escape_like(s)))
    }
}

/// One page of a scoped listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
}

/// Escapes LIKE metacharacters so user input matches literally
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn push_filters(
    builder: &mut QueryBuilder<'_, Postgres>,
    table: &ScopedTable,
    principal: &Principal,
    params: &ListParams,
) {
    builder
        .push(" WHERE ")
        .push(table.farm_column)
        .push(" IN (SELECT farm_id FROM farm_members WHERE user_id = ")
        .push_bind(principal.user_id)
        .push(")");

    if let Some(farm_id) = params.farm_id {
        builder
            .push(" AND ")
            .push(table.farm_column)
            .push(" = ")
            .push_bind(farm_id);
    }

    if let (Some(column), Some(parent_id)) = (table.parent_column, params.parent_id) {
        builder.push(" AND ").push(column).push(" = ").push_bind(parent_id);
    }

    if let Some(pattern) = params.search_pattern() {
        if !table.search_columns.is_empty() {
            builder.push(" AND (");
            for (i, column) in table.search_columns.iter().enumerate() {
                if i > 0 {
                    builder.push(" OR ");
                }
                builder
                    .push(*column)
                    .push(" ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" ESCAPE '\\'");
            }
            builder.push(")");
        }
    }

    if let Some(column) = table.date_column {
        if let Some(from) = params.from {
            builder.push(" AND ").push(column).push(" >= ").push_bind(from);
        }
        if let Some(to) = params.to {
            builder.push(" AND ").push(column).push(" <= ").push_bind(to);
        }
    }
}

/// Returns the owning farm of an entity, or None if the id is unknown
pub async fn resolve_owner<T: FarmScoped>(pool: &PgPool, id: Uuid) -> Result<Option<Uuid>, sqlx::Error> {
    let table = &T::TABLE;
    let sql = format!(
        "SELECT {} FROM {} WHERE t.id = $1",
        table.farm_column, table.from
    );

    sqlx::query_scalar(&sql).bind(id).fetch_optional(pool).await
}

/// Lists entities visible to the principal
///
/// Count and page are read in one `REPEATABLE READ` transaction so `total`
/// and `data` observe the same snapshot.
pub async fn list<T: FarmScoped>(
    pool: &PgPool,
    principal: &Principal,
    params: &ListParams,
) -> ScopeResult<Page<T>> {
    let table = &T::TABLE;
    let (take, skip) = params.window()?;
    params.check_for(table)?;

    if let Some(farm_id) = params.farm_id {
        authorize_farm(pool, farm_id, principal).await?;
    }

    let mut tx = pool.begin().await?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
        .execute(&mut *tx)
        .await?;

    let mut count = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", table.from));
    push_filters(&mut count, table, principal, params);
    let total: i64 = count.build_query_scalar().fetch_one(&mut *tx).await?;

    let mut select = QueryBuilder::new(format!("SELECT {} FROM {}", table.columns, table.from));
    push_filters(&mut select, table, principal, params);
    select
        .push(" ORDER BY ")
        .push(table.order_by)
        .push(" LIMIT ")
        .push_bind(take)
        .push(" OFFSET ")
        .push_bind(skip);
    let data = select.build_query_as::<T>().fetch_all(&mut *tx).await?;

    tx.commit().await?;

    tracing::debug!(
        entity = table.label,
        user_id = %principal.user_id,
        total,
        returned = data.len(),
        "Scoped list"
    );

    Ok(Page { data, total })
}

/// Lists every matching entity (no paging), bounded by [`EXPORT_LIMIT`]
pub async fn list_all<T: FarmScoped>(
    pool: &PgPool,
    principal: &Principal,
    params: &ListParams,
) -> ScopeResult<Vec<T>> {
    let table = &T::TABLE;
    params.check_for(table)?;

    if let Some(farm_id) = params.farm_id {
        authorize_farm(pool, farm_id, principal).await?;
    }

    let mut select = QueryBuilder::new(format!("SELECT {} FROM {}", table.columns, table.from));
    push_filters(&mut select, table, principal, params);
    select
        .push(" ORDER BY ")
        .push(table.order_by)
        .push(" LIMIT ")
        .push_bind(EXPORT_LIMIT);

    Ok(select.build_query_as::<T>().fetch_all(pool).await?)
}

/// Fetches a row by id without any access check
pub async fn fetch<'e, T: FarmScoped, E: PgExecutor<'e>>(
    executor: E,
    id: Uuid,
) -> Result<Option<T>, sqlx::Error> {
    let table = &T::TABLE;
    let sql = format!("SELECT {} FROM {} WHERE t.id = $1", table.columns, table.from);

    sqlx::query_as::<_, T>(&sql).bind(id).fetch_optional(executor).await
}

/// Fetches one entity after running the guard on its owning farm
pub async fn find<T: FarmScoped>(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<T> {
    authorize_entity::<T>(pool, id, principal).await?;

    fetch::<T, _>(pool, id)
        .await?
        .ok_or(ScopeError::NotFound(T::TABLE.label))
}

/// Deletes one entity after running the guard on its owning farm
///
/// Returns the owning farm id.
pub async fn delete<T: FarmScoped>(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<Uuid> {
    let farm_id = authorize_entity::<T>(pool, id, principal).await?;

    let sql = format!("DELETE FROM {} WHERE id = $1", T::TABLE.table);
    let result = sqlx::query(&sql).bind(id).execute(pool).await?;

    if result.rows_affected() == 0 {
        return Err(ScopeError::NotFound(T::TABLE.label));
    }

    tracing::info!(entity = T::TABLE.label, id = %id, farm_id = %farm_id, "Deleted");
    Ok(farm_id)
}

/// Picks the farm a new record goes to: the explicit one, else the
/// principal's active farm
pub fn target_farm(explicit: Option<Uuid>, principal: &Principal) -> ScopeResult<Uuid> {
    explicit
        .or(principal.farm_id)
        .ok_or_else(|| ScopeError::validation("farm_id is required when no farm is selected"))
}

/// Requires a referenced row (paddock, medication, ...) to belong to `farm_id`
pub async fn ensure_in_farm<'e, E: PgExecutor<'e>>(
    executor: E,
    table: &ScopedTable,
    id: Uuid,
    farm_id: Uuid,
) -> ScopeResult<()> {
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE t.id = $1 AND {} = $2)",
        table.from, table.farm_column
    );
    let exists: bool = sqlx::query_scalar(&sql)
        .bind(id)
        .bind(farm_id)
        .fetch_one(executor)
        .await?;

    if !exists {
        return Err(ScopeError::Validation(format!(
            "{} does not belong to this farm",
            table.label
        )));
    }
    Ok(())
}

/// Partial `UPDATE ... RETURNING` builder
///
/// Only the columns passed to [`Patch::set`] are written.
pub struct Patch<'a> {
    table: ScopedTable,
    builder: QueryBuilder<'a, Postgres>,
    assignments: usize,
}

impl<'a> Patch<'a> {
    pub fn new(table: ScopedTable) -> Self {
        let mut builder = QueryBuilder::new(format!("UPDATE {} AS t SET ", table.table));
        let mut assignments = 0;
        if table.has_updated_at {
            builder.push("updated_at = NOW()");
            assignments += 1;
        }
        Self {
            table,
            builder,
            assignments,
        }
    }

    pub fn set<V>(&mut self, column: &str, value: V) -> &mut Self
    where
        V: 'a + sqlx::Encode<'a, Postgres> + sqlx::Type<Postgres> + Send,
    {
        if self.assignments > 0 {
            self.builder.push(", ");
        }
        self.builder.push(column).push(" = ").push_bind(value);
        self.assignments += 1;
        self
    }

    /// Sets the column only when a value is present
    pub fn set_some<V>(&mut self, column: &str, value: Option<V>) -> &mut Self
    where
        V: 'a + sqlx::Encode<'a, Postgres> + sqlx::Type<Postgres> + Send,
    {
        if let Some(value) = value {
            self.set(column, value);
        }
        self
    }

    /// Runs the update and returns the new row
    pub async fn apply<'e, T: FarmScoped, E: PgExecutor<'e>>(
        mut self,
        executor: E,
        id: Uuid,
    ) -> ScopeResult<T> {
        if self.assignments == 0 {
            self.builder.push("id = id");
        }
        self.builder
            .push(" WHERE t.id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(self.table.columns);

        self.builder
            .build_query_as::<T>()
            .fetch_optional(executor)
            .await?
            .ok_or(ScopeError::NotFound(self.table.label))
    }
}

/// Deserializes a field that distinguishes "absent" from "null"
///
/// Use with `#[serde(default, deserialize_with = "nullable")]` on an
/// `Option<Option<T>>`: absent → `None`, `null` → `Some(None)`.
pub fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Rejects text that is empty once trimmed
///
/// Paired with `length(min = 1)` on fields that are stored trimmed.
pub fn not_blank(value: &str) -> Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        let mut error = validator::ValidationError::new("blank");
        error.message = Some("must not be blank".into());
        return Err(error);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_blank() {
        assert!(not_blank("Sal").is_ok());
        assert!(not_blank("  Sal ").is_ok());
        assert!(not_blank("").is_err());
        assert!(not_blank(" \t\n ").is_err());
    }

    const TABLE: ScopedTable = ScopedTable {
        table: "weighings",
        label: "Weighing",
        from: "weighings t JOIN animals a ON a.id = t.animal_id",
        farm_column: "a.farm_id",
        columns: "t.id",
        search_columns: &["a.tag", "t.notes"],
        parent_column: Some("t.animal_id"),
        date_column: Some("t.weighed_on"),
        order_by: "t.weighed_on DESC, t.id ASC",
        has_updated_at: false,
    };

    #[test]
    fn test_window_defaults_and_cap() {
        assert_eq!(ListParams::default().window().unwrap(), (20, 0));

        let params = ListParams {
            take: Some(500),
            skip: Some(40),
            ..Default::default()
        };
        assert_eq!(params.window().unwrap(), (100, 40));
    }

    #[test]
    fn test_window_rejects_negative() {
        let params = ListParams {
            take: Some(0),
            ..Default::default()
        };
        assert!(matches!(params.window(), Err(ScopeError::Validation(_))));

        let params = ListParams {
            skip: Some(-1),
            ..Default::default()
        };
        assert!(matches!(params.window(), Err(ScopeError::Validation(_))));
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("Nelore"), "Nelore");
        assert_eq!(escape_like("50%_off"), "50\\%\\_off");
        assert_eq!(escape_like("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_search_pattern_ignores_blank() {
        let params = ListParams {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(params.search_pattern(), None);

        let params = ListParams {
            search: Some(" Sal ".into()),
            ..Default::default()
        };
        assert_eq!(params.search_pattern().as_deref(), Some("%Sal%"));
    }

    #[test]
    fn test_check_for_date_range() {
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();
        let params = ListParams {
            from: Some(day(10)),
            to: Some(day(1)),
            ..Default::default()
        };
        assert!(params.check_for(&TABLE).is_err());

        let no_dates = ScopedTable {
            date_column: None,
            ..TABLE
        };
        let params = ListParams {
            from: Some(day(1)),
            ..Default::default()
        };
        assert!(params.check_for(&no_dates).is_err());
        assert!(params.check_for(&TABLE).is_ok());
    }

    #[test]
    fn test_filters_sql() {
        let principal = Principal::new(Uuid::new_v4(), None, "a@example.com");
        let params = ListParams {
            search: Some("nel".into()),
            farm_id: Some(Uuid::new_v4()),
            parent_id: Some(Uuid::new_v4()),
            from: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..Default::default()
        };

        let mut builder = QueryBuilder::new(format!("SELECT COUNT(*) FROM {}", TABLE.from));
        push_filters(&mut builder, &TABLE, &principal, &params);
        let sql = builder.sql();

        assert!(sql.contains("a.farm_id IN (SELECT farm_id FROM farm_members WHERE user_id = $1)"));
        assert!(sql.contains("AND a.farm_id = $2"));
        assert!(sql.contains("AND t.animal_id = $3"));
        assert!(sql.contains("(a.tag ILIKE $4 ESCAPE '\\' OR t.notes ILIKE $5 ESCAPE '\\')"));
        assert!(sql.contains("AND t.weighed_on >= $6"));
    }

    #[test]
    fn test_patch_sql() {
        const PADDOCKS: ScopedTable = ScopedTable {
            table: "paddocks",
            label: "Paddock",
            from: "paddocks t",
            farm_column: "t.farm_id",
            columns: "t.id",
            search_columns: &[],
            parent_column: None,
            date_column: None,
            order_by: "t.id",
            has_updated_at: true,
        };

        let mut patch = Patch::new(PADDOCKS);
        patch.set("name", "Piquete 1".to_string()).set_some::<i32>("capacity", None);
        assert_eq!(patch.builder.sql(), "UPDATE paddocks AS t SET updated_at = NOW(), name = $1");
    }

    #[test]
    fn test_nullable_field() {
        #[derive(Deserialize)]
        struct Body {
            #[serde(default, deserialize_with = "nullable")]
            notes: Option<Option<String>>,
        }

        let absent: Body = serde_json::from_str("{}").unwrap();
        assert_eq!(absent.notes, None);

        let cleared: Body = serde_json::from_str(r#"{"notes":null}"#).unwrap();
        assert_eq!(cleared.notes, Some(None));

        let set: Body = serde_json::from_str(r#"{"notes":"x"}"#).unwrap();
        assert_eq!(set.notes, Some(Some("x".to_string())));
    }

    #[test]
    fn test_target_farm() {
        let active = Uuid::new_v4();
        let explicit = Uuid::new_v4();
        let principal = Principal::new(Uuid::new_v4(), Some(active), "a@example.com");

        assert_eq!(target_farm(Some(explicit), &principal).unwrap(), explicit);
        assert_eq!(target_farm(None, &principal).unwrap(), active);

        let none = Principal::new(Uuid::new_v4(), None, "a@example.com");
        assert!(target_farm(None, &none).is_err());
    }
}
