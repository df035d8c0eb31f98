//! Service layer for the Broadcast Controller.
//!
//! Business rules and external system clients.
//!
//! # Components
//!
//! - `availability` - Booking window rules and overlap checks
//! - `mail_client` - HTTP client for the transactional mail provider
//! - `media_session` - Provider session orchestration for go-live and stop
//! - `payments_client` - HTTP client for the payments provider
//! - `payouts` - Tip payout sweep
//! - `reconciler` - Identity back-fill across slots, co-DJs, and tips
//! - `recording` - Webhook signature, recording merge, archive slugs
//! - `session` - Slot lifecycle guards and handle resolution
//! - `status_cache` - TTL cache for payout destination readiness
//! - `streaming_client` - HTTP client for the streaming provider

pub mod availability;
pub mod mail_client;
pub mod media_session;
pub mod payments_client;
pub mod payouts;
pub mod reconciler;
pub mod recording;
pub mod session;
pub mod status_cache;
pub mod streaming_client;

pub use mail_client::{EmailMessage, HttpMailClient, MailClient, MockMailClient};
pub use media_session::MediaSessionService;
pub use payments_client::{
    CreateTransferRequest, DestinationStatus, HttpPaymentsClient, MockPaymentsClient,
    PaymentsClient, TransferResponse,
};
pub use payouts::{PayoutReport, PayoutService};
pub use reconciler::ReconcilerService;
pub use status_cache::DestinationStatusCache;
pub use streaming_client::{
    HttpStreamingClient, MockStreamingClient, SessionInfo, SessionStatus, StartSessionRequest,
    StreamingClient,
};
