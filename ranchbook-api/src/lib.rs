//! # Ranchbook API Server Library
//!
//! HTTP surface of Ranchbook: every handler authenticates the caller, builds
//! a `Principal` and hands it to the farm-scoped operations in
//! `ranchbook-shared`.
//!
//! ## Modules
//!
//! - `app`: Application state and router builder
//! - `config`: Configuration management
//! - `error`: Error handling and HTTP response mapping
//! - `middleware`: Response hardening headers
//! - `routes`: API route handlers

pub mod app;
pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
