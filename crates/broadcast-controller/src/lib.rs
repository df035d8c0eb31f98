//! Broadcast Controller Service Library
//!
//! Core functionality for the broadcast session controller of a community
//! radio platform:
//!
//! - Slot booking with availability and lead-time rules
//! - Broadcast session lifecycle (go-live, pause, complete, expiry)
//! - Recording finalization via provider webhooks and public archival
//! - Identity reconciliation across slots, co-broadcasters, and tips
//! - Tip payout sweeping through the payments provider
//!
//! # Architecture
//!
//! The service follows the Handler -> Service -> Repository pattern:
//!
//! ```text
//! routes/mod.rs -> handlers/*.rs -> services/*.rs -> repositories/*.rs
//! ```
//!
//! # Modules
//!
//! - `config` - Service configuration from environment
//! - `errors` - Error types with HTTP status code mapping
//! - `handlers` - HTTP request handlers
//! - `middleware` - HTTP metrics middleware
//! - `models` - Data models
//! - `observability` - Metrics recording helpers
//! - `repositories` - Database access
//! - `routes` - Axum router setup
//! - `services` - Business rules and provider clients
//! - `tasks` - Background sweepers and the outbox dispatcher

pub mod config;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod tasks;
