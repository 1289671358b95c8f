use std::collections::HashSet;

use chanswap_core::{ConnectionId, CoordinatorError};

/// Strict majority of present sessions: `votes > present / 2` (floor division).
/// Nobody present never triggers.
pub fn should_trigger(votes: u32, present: u32) -> bool {
    present > 0 && votes > present / 2
}

/// Votes cast in the current round. The count is the size of the voted set,
/// so the two can never disagree.
#[derive(Debug, Default)]
pub struct VoteTally {
    voted: HashSet<ConnectionId>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn votes(&self) -> u32 {
        self.voted.len() as u32
    }

    pub fn has_voted(&self, id: &ConnectionId) -> bool {
        self.voted.contains(id)
    }

    /// Record a vote and return the new count.
    pub fn cast_vote(&mut self, id: &ConnectionId) -> Result<u32, CoordinatorError> {
        if !self.voted.insert(id.clone()) {
            return Err(CoordinatorError::DuplicateVote(id.clone()));
        }
        Ok(self.votes())
    }

    /// Clear the round. Returns how many votes were discarded.
    pub fn reset(&mut self) -> u32 {
        let cleared = self.votes();
        self.voted.clear();
        cleared
    }
}
