//! Repository layer for the Broadcast Controller.
//!
//! Database access following the Handler -> Service -> Repository
//! architecture. Lifecycle transitions are expressed as status-conditional
//! updates so concurrent writers race safely.

pub mod accounts;
pub mod archives;
pub mod egress_mappings;
pub mod outbox;
pub mod slots;
pub mod tips;

pub use accounts::AccountsRepository;
pub use archives::ArchivesRepository;
pub use egress_mappings::EgressMappingsRepository;
pub use outbox::OutboxRepository;
pub use slots::{ExpiredSlot, SlotsRepository};
pub use tips::TipsRepository;
