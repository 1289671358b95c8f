use crate::ids::{ConnectionId, ItemId};

/// Failures raised by coordinator operations.
///
/// Every failing operation leaves coordinator state untouched.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CoordinatorError {
    // Recoverable, reported to the caller
    #[error("connection {0} has already voted this round")]
    DuplicateVote(ConnectionId),
    #[error("item {0} not found")]
    NotFound(ItemId),
    #[error("connection {0} is not registered")]
    UnknownSession(ConnectionId),
    #[error("invalid item: {0}")]
    InvalidItem(String),

    // Internal invariant violations
    #[error("item id {0} is already in use")]
    DuplicateId(ItemId),
    #[error("connection {0} is already registered")]
    DuplicateSession(ConnectionId),
}

impl CoordinatorError {
    /// True for violations of invariants the coordinator maintains itself.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::DuplicateId(_) | Self::DuplicateSession(_))
    }

    /// Short classification string for logging/metrics.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::DuplicateVote(_) => "duplicate_vote",
            Self::NotFound(_) => "not_found",
            Self::UnknownSession(_) => "unknown_session",
            Self::InvalidItem(_) => "invalid_item",
            Self::DuplicateId(_) => "duplicate_id",
            Self::DuplicateSession(_) => "duplicate_session",
        }
    }
}
