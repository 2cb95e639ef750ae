/// Device readings (weather stations, water level sensors, scales)
///
/// Readings arrive singly or in batches. A reading can be corrected after the
/// fact; its farm never changes.

use chrono::{DateTime, Utc};
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

/// Largest batch accepted by [`DeviceReading::create_batch`]
pub const MAX_BATCH: usize = 500;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceReading {
    pub id: Uuid,
    pub farm_id: Uuid,
    pub paddock_id: Option<Uuid>,
    pub device_id: String,

    /// What was measured, e.g. "rainfall", "temperature"
    pub metric: String,

    pub value: f64,
    pub unit: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl FarmScoped for DeviceReading {
    const TABLE: ScopedTable = ScopedTable {
        table: "device_readings",
        label: "Device reading",
        from: "device_readings t",
        farm_column: "t.farm_id",
        columns: "t.id, t.farm_id, t.paddock_id, t.device_id, t.metric, t.value, t.unit, \
                  t.recorded_at, t.created_at",
        search_columns: &["t.device_id", "t.metric"],
        parent_column: Some("t.paddock_id"),
        date_column: Some("(t.recorded_at AT TIME ZONE 'UTC')::date"),
        order_by: "t.recorded_at DESC, t.id ASC",
        has_updated_at: false,
    };
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateDeviceReading {
    pub farm_id: Option<Uuid>,
    pub paddock_id: Option<Uuid>,

    #[validate(length(min = 1, max = 100), custom(function = "crate::scope::not_blank"))]
    pub device_id: String,

    #[validate(length(min = 1, max = 50), custom(function = "crate::scope::not_blank"))]
    pub metric: String,

    pub value: f64,

    #[validate(length(max = 20))]
    pub unit: Option<String>,

    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateDeviceReading {
    #[serde(default, deserialize_with = "nullable")]
    pub paddock_id: Option<Option<Uuid>>,

    #[validate(length(min = 1, max = 100), custom(function = "crate::scope::not_blank"))]
    pub device_id: Option<String>,

    #[validate(length(min = 1, max = 50), custom(function = "crate::scope::not_blank"))]
    pub metric: Option<String>,

    pub value: Option<f64>,

    #[serde(default, deserialize_with = "nullable")]
    pub unit: Option<Option<String>>,

    pub recorded_at: Option<DateTime<Utc>>,
}

fn check_value(value: f64) -> ScopeResult<()> {
    if !value.is_finite() {
        return Err(ScopeError::validation("value must be a finite number"));
    }
    Ok(())
}

impl DeviceReading {
    pub async fn create(pool: &PgPool, principal: &Principal, data: CreateDeviceReading) -> ScopeResult<Self> {
        let mut created = Self::create_batch(pool, principal, vec![data]).await?;
        created.pop().ok_or(ScopeError::NotFound("Device reading"))
    }

    /// Inserts a batch of readings in one transaction
    ///
    /// Every reading is checked (farm membership, paddock consistency) before
    /// the first insert; one bad reading rejects the whole batch.
    pub async fn create_batch(
        pool: &PgPool,
        principal: &Principal,
        readings: Vec<CreateDeviceReading>,
    ) -> ScopeResult<Vec<Self>> {
        if readings.is_empty() {
            return Err(ScopeError::validation("at least one reading is required"));
        }
        if readings.len() > MAX_BATCH {
            return Err(ScopeError::Validation(format!(
                "at most {} readings per batch",
                MAX_BATCH
            )));
        }

        let mut targets = Vec::with_capacity(readings.len());
        for reading in &readings {
            reading.validate()?;
            check_value(reading.value)?;
            let farm_id = target_farm(reading.farm_id, principal)?;
            if !targets.contains(&farm_id) {
                authorize_farm(pool, farm_id, principal).await?;
            }
            if let Some(paddock_id) = reading.paddock_id {
                ensure_in_farm(pool, &Paddock::TABLE, paddock_id, farm_id).await?;
            }
            targets.push(farm_id);
        }

        let sql = format!(
            "INSERT INTO device_readings AS t \
             (farm_id, paddock_id, device_id, metric, value, unit, recorded_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {}",
            Self::TABLE.columns
        );

        let mut tx = pool.begin().await?;
        let mut created = Vec::with_capacity(readings.len());
        for (reading, farm_id) in readings.into_iter().zip(targets) {
            let row = sqlx::query_as::<_, DeviceReading>(&sql)
                .bind(farm_id)
                .bind(reading.paddock_id)
                .bind(reading.device_id)
                .bind(reading.metric)
                .bind(reading.value)
                .bind(reading.unit)
                .bind(reading.recorded_at)
                .fetch_one(&mut *tx)
                .await?;
            created.push(row);
        }
        tx.commit().await?;

        tracing::debug!(user_id = %principal.user_id, count = created.len(), "Device readings stored");
        for reading in &created {
            AuditLog::record(
                pool,
                principal,
                Some(reading.farm_id),
                AuditAction::Create,
                "device_reading",
                Some(reading.id),
            )
            .await;
        }
        Ok(created)
    }

    /// Corrects a reading
    ///
    /// A new paddock must belong to the reading's farm.
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        principal: &Principal,
        data: UpdateDeviceReading,
    ) -> ScopeResult<Self> {
        data.validate()?;
        if let Some(value) = data.value {
            check_value(value)?;
        }
        if data.unit.as_ref().and_then(|u| u.as_ref()).is_some_and(|u| u.chars().count() > 20) {
            return Err(ScopeError::validation("unit must be at most 20 characters"));
        }
        let farm_id = authorize_entity::<Self>(pool, id, principal).await?;

        if let Some(Some(paddock_id)) = data.paddock_id {
            ensure_in_farm(pool, &Paddock::TABLE, paddock_id, farm_id).await?;
        }

        let mut patch = Patch::new(Self::TABLE);
        patch
            .set_some("paddock_id", data.paddock_id)
            .set_some("device_id", data.device_id.map(|d| d.trim().to_string()))
            .set_some("metric", data.metric.map(|m| m.trim().to_string()))
            .set_some("value", data.value)
            .set_some("unit", data.unit)
            .set_some("recorded_at", data.recorded_at);
        let reading = patch.apply::<Self, _>(pool, id).await?;

        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Update, "device_reading", Some(id)).await;
        Ok(reading)
    }

    pub async fn delete(pool: &PgPool, id: Uuid, principal: &Principal) -> ScopeResult<()> {
        let farm_id = scope::delete::<Self>(pool, id, principal).await?;
        AuditLog::record(pool, principal, Some(farm_id), AuditAction::Delete, "device_reading", Some(id)).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_must_be_finite() {
        assert!(check_value(12.5).is_ok());
        assert!(check_value(f64::NAN).is_err());
        assert!(check_value(f64::INFINITY).is_err());
    }

    #[test]
    fn test_reading_from_json() {
        let reading: CreateDeviceReading = serde_json::from_str(
            r#"{"device_id": "pluv-01", "metric": "rainfall", "value": 12.4, "unit": "mm",
                "recorded_at": "2024-02-01T06:00:00Z"}"#,
        )
        .unwrap();
        assert!(reading.validate().is_ok());
        assert_eq!(reading.metric, "rainfall");
    }

    #[test]
    fn test_update_distinguishes_null_from_absent() {
        let update: UpdateDeviceReading =
            serde_json::from_str(r#"{"paddock_id": null, "value": 3.5}"#).unwrap();
        assert_eq!(update.paddock_id, Some(None));
        assert_eq!(update.value, Some(3.5));
        assert!(update.unit.is_none());
        assert!(update.validate().is_ok());

        let blank: UpdateDeviceReading = serde_json::from_str(r#"{"metric": "   "}"#).unwrap();
        assert!(blank.validate().is_err());
    }
}
