//! Background tasks for the Broadcast Controller.
//!
//! Long-running maintenance loops, each driven by an interval timer and a
//! cancellation token for graceful shutdown.
//!
//! # Tasks
//!
//! - `expiry_sweeper` - Forces elapsed slots into terminal states
//! - `payout_sweeper` - Transfers succeeded, identity-resolved tips
//! - `outbox_dispatcher` - Delivers queued notification emails

pub mod expiry_sweeper;
pub mod outbox_dispatcher;
pub mod payout_sweeper;

pub use expiry_sweeper::{start_expiry_sweeper, ExpirySweeperConfig};
pub use outbox_dispatcher::{start_outbox_dispatcher, OutboxDispatcherConfig};
pub use payout_sweeper::{start_payout_sweeper, PayoutSweeperConfig};
