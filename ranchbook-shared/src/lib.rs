//! # Ranchbook Shared Library
//!
//! Domain types, persistence and access control used by the Ranchbook API
//! server.
//!
//! ## Module Organization
//!
//! - `db`: Connection pool and migrations
//! - `auth`: Password hashing, JWT, principal extraction and the farm guard
//! - `scope`: Generic farm-scoped list/get/delete template
//! - `models`: Entities and their scoped CRUD operations
//! - `dashboard`: Monthly aggregation over the ledger and weighings
//! - `export`: CSV rendering of listings
//! - `error`: Domain error taxonomy

pub mod auth;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod export;
pub mod models;
pub mod scope;

/// Current version of the Ranchbook shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
