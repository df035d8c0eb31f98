//! HTTP handlers for the Broadcast Controller.

pub mod accounts;
pub mod health;
pub mod sessions;
pub mod slots;
pub mod webhooks;

pub use accounts::reconcile_account;
pub use health::{health_check, metrics_handler, readiness_check};
pub use sessions::{complete, go_live, pause};
pub use slots::{book_slot, get_slot};
pub use webhooks::recording_webhook;
