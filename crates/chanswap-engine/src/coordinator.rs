//! The broadcast coordinator: one lock over catalog, sessions, tally and the
//! active item.
//!
//! Every public mutation runs start to finish under the lock, including any
//! cascading selection and round reset. Outbound events are queued on a
//! `tokio::sync::broadcast` channel while the lock is held. That send never
//! blocks, and it keeps event order identical to commit order across
//! concurrent callers. Per-socket delivery happens later in the transport's
//! bridge task, outside the lock.

use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

use chanswap_core::{
    ChannelEvent, ConnectionId, CoordinatorError, Envelope, Item, ItemId, NewItem, Stats,
};
use chanswap_telemetry::metrics::{
    CHANNEL_SWITCHES_TOTAL, SESSIONS_PRESENT, VOTES_CAST_TOTAL, VOTES_REJECTED_TOTAL,
};

use crate::catalog::Catalog;
use crate::selector::Selector;
use crate::sessions::SessionRegistry;
use crate::tally::{should_trigger, VoteTally};

#[derive(Clone, Debug)]
pub struct CoordinatorOptions {
    /// Capacity of the outbound event channel. Slow subscribers that fall
    /// further behind than this lose events.
    pub event_buffer: usize,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self { event_buffer: 1024 }
    }
}

/// Result of an accepted vote.
#[derive(Clone, Debug, PartialEq)]
pub struct VoteOutcome {
    /// Stats after the vote and, if it triggered, after the reset.
    pub stats: Stats,
    /// Whether this vote reached quorum.
    pub triggered: bool,
    /// The active item after the vote.
    pub active: Option<Item>,
}

/// Consistent view of all coordinator state, taken under one lock.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot {
    pub votes: u32,
    pub present: u32,
    pub stats: Stats,
    pub active: Option<Item>,
    pub items: Vec<Item>,
}

#[derive(Clone, Copy, Debug)]
enum SwitchCause {
    Quorum,
    Departure,
    Removal,
}

impl SwitchCause {
    fn as_str(self) -> &'static str {
        match self {
            Self::Quorum => "quorum",
            Self::Departure => "departure",
            Self::Removal => "removal",
        }
    }
}

struct State {
    catalog: Catalog,
    sessions: SessionRegistry,
    tally: VoteTally,
    selector: Selector,
    active: Option<ItemId>,
    persist: Option<watch::Sender<Vec<Item>>>,
}

impl State {
    fn stats(&self) -> Stats {
        Stats::from_presence(self.tally.votes(), self.sessions.present_count())
    }

    fn active_item(&self) -> Option<Item> {
        self.active.and_then(|id| self.catalog.get(id).cloned())
    }

    fn persist(&self) {
        if let Some(tx) = &self.persist {
            let _ = tx.send_replace(self.catalog.list());
        }
    }
}

pub struct Coordinator {
    state: Mutex<State>,
    events: broadcast::Sender<Envelope>,
}

impl Coordinator {
    /// Build a coordinator over an already-loaded catalog. The first item, if
    /// any, becomes the active item.
    pub fn new(items: Vec<Item>, options: CoordinatorOptions) -> Self {
        let catalog = Catalog::from_items(items);
        let active = catalog.first().map(|item| item.id);
        if let Some(item) = catalog.first() {
            info!(item_id = %item.id, name = %item.name, "initial active item");
        }
        let (events, _) = broadcast::channel(options.event_buffer.max(1));

        Self {
            state: Mutex::new(State {
                catalog,
                sessions: SessionRegistry::new(),
                tally: VoteTally::new(),
                selector: Selector::from_os_rng(),
                active,
                persist: None,
            }),
            events,
        }
    }

    /// Publish every catalog change to `tx`. Pair with a persistence writer.
    pub fn with_persistence(self, tx: watch::Sender<Vec<Item>>) -> Self {
        self.state.lock().persist = Some(tx);
        self
    }

    /// Drop the persistence sender so the writer can flush and exit, even
    /// while other handles to the coordinator are still alive. Later catalog
    /// changes are kept in memory only.
    pub fn close_persistence(&self) {
        if self.state.lock().persist.take().is_some() {
            debug!("persistence channel closed");
        }
    }

    /// Replace the random source, e.g. with a seeded one in tests.
    pub fn with_selector(self, selector: Selector) -> Self {
        self.state.lock().selector = selector;
        self
    }

    /// Receive every event queued from now on, in commit order.
    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.events.subscribe()
    }

    // ── Session lifecycle ──

    pub fn connect(&self, id: &ConnectionId) -> Result<Stats, CoordinatorError> {
        let mut state = self.state.lock();
        if let Err(e) = state.sessions.connect(id) {
            error!(connection_id = %id, error = %e, "connection registered twice");
            return Err(e);
        }

        let stats = state.stats();
        gauge!(SESSIONS_PRESENT).set(f64::from(state.sessions.present_count()));
        debug!(connection_id = %id, present = state.sessions.present_count(), "session joined");
        self.emit(Envelope::all(ChannelEvent::StatsChanged(stats)));
        Ok(stats)
    }

    /// Remove a session. Its vote, if any, stays in the round.
    ///
    /// Quorum is judged against current presence, so a departure can complete
    /// a quorum; that runs the same switch as a deciding vote. When the last
    /// session leaves, the round is cleared.
    pub fn disconnect(&self, id: &ConnectionId) -> Result<Stats, CoordinatorError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if let Err(e) = state.sessions.disconnect(id) {
            debug!(connection_id = %id, "disconnect for unknown session ignored");
            return Err(e);
        }

        let present = state.sessions.present_count();
        gauge!(SESSIONS_PRESENT).set(f64::from(present));
        if present == 0 && state.tally.votes() > 0 {
            let cleared = state.tally.reset();
            debug!(cleared, "last session left, round cleared");
        }

        debug!(connection_id = %id, present, votes = state.tally.votes(), "session left");
        self.emit(Envelope::all(ChannelEvent::StatsChanged(state.stats())));

        if should_trigger(state.tally.votes(), present) {
            self.switch_channel(state, SwitchCause::Departure);
        }
        Ok(state.stats())
    }

    // ── Voting ──

    /// Cast the connection's vote for a channel switch.
    ///
    /// A repeat vote in the same round is refused with
    /// [`CoordinatorError::DuplicateVote`] and a `voteRejected` notice to that
    /// connection only.
    pub fn vote(&self, id: &ConnectionId) -> Result<VoteOutcome, CoordinatorError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.sessions.is_present(id) {
            warn!(connection_id = %id, "vote from unregistered connection");
            counter!(VOTES_REJECTED_TOTAL, "reason" => "unknown_session").increment(1);
            return Err(CoordinatorError::UnknownSession(id.clone()));
        }

        let votes = match state.tally.cast_vote(id) {
            Ok(votes) => votes,
            Err(e) => {
                debug!(connection_id = %id, "duplicate vote rejected");
                counter!(VOTES_REJECTED_TOTAL, "reason" => e.error_kind()).increment(1);
                self.emit(Envelope::one(
                    id.clone(),
                    ChannelEvent::VoteRejected {
                        reason: e.to_string(),
                    },
                ));
                return Err(e);
            }
        };

        let present = state.sessions.present_count();
        counter!(VOTES_CAST_TOTAL).increment(1);
        debug!(connection_id = %id, votes, present, "vote accepted");
        self.emit(Envelope::all(ChannelEvent::StatsChanged(state.stats())));

        let triggered = should_trigger(votes, present);
        if triggered {
            self.switch_channel(state, SwitchCause::Quorum);
        }

        Ok(VoteOutcome {
            stats: state.stats(),
            triggered,
            active: state.active_item(),
        })
    }

    // ── Catalog ──

    pub fn add_item(&self, new: NewItem) -> Result<Item, CoordinatorError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let item = match state.catalog.add(new) {
            Ok(item) => item,
            Err(e) => {
                if e.is_internal() {
                    error!(error = %e, "item id collision");
                } else {
                    debug!(error = %e, "item rejected");
                }
                return Err(e);
            }
        };
        info!(item_id = %item.id, name = %item.name, "item added");

        state.persist();
        self.emit(Envelope::all(ChannelEvent::CatalogChanged {
            items: state.catalog.list(),
        }));

        if state.active.is_none() {
            state.active = Some(item.id);
            info!(item_id = %item.id, "first item became active");
            self.emit(Envelope::all(ChannelEvent::ActiveItemChanged {
                item: Some(item.clone()),
            }));
        }
        Ok(item)
    }

    /// Remove an item. Removing the active item draws a replacement, or
    /// clears the active item when the catalog becomes empty.
    pub fn remove_item(&self, id: ItemId) -> Result<Item, CoordinatorError> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let removed = match state.catalog.remove(id) {
            Ok(item) => item,
            Err(e) => {
                warn!(item_id = %id, "remove for unknown item ignored");
                return Err(e);
            }
        };
        info!(item_id = %id, name = %removed.name, "item removed");

        state.persist();
        self.emit(Envelope::all(ChannelEvent::CatalogChanged {
            items: state.catalog.list(),
        }));

        if state.active == Some(id) {
            let next = state.selector.pick_next(state.catalog.items(), Some(id));
            state.active = next.as_ref().map(|item| item.id);
            counter!(CHANNEL_SWITCHES_TOTAL, "cause" => SwitchCause::Removal.as_str()).increment(1);
            info!(
                removed = %id,
                item_id = ?state.active.map(|i| i.0),
                "active item removed, replacement drawn"
            );
            self.emit(Envelope::all(ChannelEvent::ActiveItemChanged { item: next }));
        }
        Ok(removed)
    }

    // ── Queries ──

    pub fn stats(&self) -> Stats {
        self.state.lock().stats()
    }

    pub fn items(&self) -> Vec<Item> {
        self.state.lock().catalog.list()
    }

    pub fn current_item(&self) -> Option<Item> {
        self.state.lock().active_item()
    }

    pub fn has_voted(&self, id: &ConnectionId) -> bool {
        self.state.lock().tally.has_voted(id)
    }

    pub fn present_count(&self) -> u32 {
        self.state.lock().sessions.present_count()
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.lock();
        Snapshot {
            votes: state.tally.votes(),
            present: state.sessions.present_count(),
            stats: state.stats(),
            active: state.active_item(),
            items: state.catalog.list(),
        }
    }

    // ── Internals (lock held by caller) ──

    /// Draw a new active item, reset the round, and announce both.
    fn switch_channel(&self, state: &mut State, cause: SwitchCause) {
        let next = state.selector.pick_next(state.catalog.items(), state.active);
        let cleared = state.tally.reset();
        if let Some(item) = &next {
            state.active = Some(item.id);
        }

        counter!(CHANNEL_SWITCHES_TOTAL, "cause" => cause.as_str()).increment(1);
        info!(
            cause = cause.as_str(),
            cleared,
            item_id = ?next.as_ref().map(|i| i.id.0),
            "quorum reached, channel switched"
        );

        if next.is_some() {
            self.emit(Envelope::all(ChannelEvent::ActiveItemChanged { item: next }));
        }
        self.emit(Envelope::all(ChannelEvent::StatsChanged(state.stats())));
    }

    fn emit(&self, envelope: Envelope) {
        // Err only means nobody is subscribed.
        if self.events.send(envelope).is_err() {
            debug!("no event subscribers");
        }
    }
}
