//! Live voting and channel-selection coordinator.
//!
//! [`Coordinator`] owns the [`Catalog`], [`SessionRegistry`], [`VoteTally`]
//! and [`Selector`] behind one lock and queues the resulting
//! [`Envelope`](chanswap_core::Envelope)s for fan-out.

pub mod catalog;
pub mod coordinator;
pub mod selector;
pub mod sessions;
pub mod tally;

pub use catalog::Catalog;
pub use coordinator::{Coordinator, CoordinatorOptions, Snapshot, VoteOutcome};
pub use selector::Selector;
pub use sessions::SessionRegistry;
pub use tally::{should_trigger, VoteTally};
