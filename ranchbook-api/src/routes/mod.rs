/// API route handlers
///
/// - `health`: Health check endpoint
/// - `auth`: Register, login, refresh, switch farm
/// - `farms`: Farms, their members and audit trail
/// - `records`: Generic handlers for the farm-scoped record types, purchases included
/// - `device_readings`: Sensor readings (create-only, batch ingest)
/// - `dashboard`: Per-farm aggregates
/// - `exports`: CSV downloads

pub mod auth;
pub mod dashboard;
pub mod device_readings;
pub mod exports;
pub mod farms;
pub mod health;
pub mod records;
