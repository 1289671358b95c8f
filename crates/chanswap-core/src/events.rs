use serde::{Deserialize, Serialize};

use crate::ids::ConnectionId;
use crate::items::Item;

/// Vote tally as reported to clients.
///
/// `visitors` excludes the passive display connection: it is the present
/// connection count minus one, floored at zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub votes: u32,
    pub visitors: u32,
}

impl Stats {
    pub fn from_presence(votes: u32, present: u32) -> Self {
        Self {
            votes,
            visitors: present.saturating_sub(1),
        }
    }
}

/// Outbound events pushed to connected clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelEvent {
    StatsChanged(Stats),
    ActiveItemChanged { item: Option<Item> },
    CatalogChanged { items: Vec<Item> },
    /// Unicast only. Sent to the connection whose vote was refused.
    VoteRejected { reason: String },
}

impl ChannelEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::StatsChanged(_) => "statsChanged",
            Self::ActiveItemChanged { .. } => "activeItemChanged",
            Self::CatalogChanged { .. } => "catalogChanged",
            Self::VoteRejected { .. } => "voteRejected",
        }
    }
}

/// Who should receive an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    All,
    One(ConnectionId),
}

/// An event paired with its audience, as queued by the coordinator.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope {
    pub target: Target,
    pub event: ChannelEvent,
}

impl Envelope {
    pub fn all(event: ChannelEvent) -> Self {
        Self {
            target: Target::All,
            event,
        }
    }

    pub fn one(connection_id: ConnectionId, event: ChannelEvent) -> Self {
        Self {
            target: Target::One(connection_id),
            event,
        }
    }
}
