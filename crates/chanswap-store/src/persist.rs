//! Startup load and the background persistence writer.

use std::collections::HashSet;
use std::sync::Arc;

use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use chanswap_core::{Item, ItemId};
use chanswap_telemetry::metrics::PERSIST_FAILURES_TOTAL;

use crate::CatalogStore;

/// Reassign ids sequentially from 1 (in list order) if any id repeats.
/// Returns true when the list was rewritten.
pub fn repair_duplicate_ids(items: &mut [Item]) -> bool {
    let mut seen = HashSet::with_capacity(items.len());
    if items.iter().all(|item| seen.insert(item.id)) {
        return false;
    }
    let mut next = ItemId::FIRST;
    for item in items.iter_mut() {
        item.id = next;
        next = next.next();
    }
    true
}

/// Load the catalog for startup.
///
/// A failed load yields an empty catalog. Duplicate ids are repaired and the
/// repaired list is written back immediately.
pub fn load_catalog(store: &dyn CatalogStore) -> Vec<Item> {
    let mut items = match store.load() {
        Ok(items) => items,
        Err(e) => {
            warn!(error = %e, "failed to load catalog, starting empty");
            return Vec::new();
        }
    };

    if repair_duplicate_ids(&mut items) {
        warn!(count = items.len(), "duplicate item ids found, reassigned sequentially");
        if let Err(e) = store.save(&items) {
            warn!(error = %e, "failed to save repaired catalog");
            counter!(PERSIST_FAILURES_TOTAL).increment(1);
        }
    }

    info!(count = items.len(), "catalog loaded");
    items
}

/// Spawn the task that writes catalog snapshots to `store`.
///
/// Only the newest snapshot is written when several arrive while a save is in
/// flight. Failures are logged and counted; the in-memory catalog stays
/// authoritative. The task ends after the sender is dropped and the last
/// pending snapshot is flushed.
pub fn spawn_writer(
    store: Arc<dyn CatalogStore>,
    mut rx: watch::Receiver<Vec<Item>>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            let count = snapshot.len();
            let store = Arc::clone(&store);
            match tokio::task::spawn_blocking(move || store.save(&snapshot)).await {
                Ok(Ok(())) => debug!(count, "catalog persisted"),
                Ok(Err(e)) => {
                    warn!(error = %e, count, "failed to persist catalog");
                    counter!(PERSIST_FAILURES_TOTAL).increment(1);
                }
                Err(e) => {
                    warn!(error = %e, "catalog save task panicked");
                    counter!(PERSIST_FAILURES_TOTAL).increment(1);
                }
            }
        }
        debug!("catalog writer stopped");
    })
}
