use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use chanswap_core::Item;

use crate::error::StoreError;
use crate::CatalogStore;

/// Volatile store for tests and ephemeral runs. Can be told to fail.
#[derive(Default)]
pub struct MemoryStore {
    items: Mutex<Vec<Item>>,
    fail: AtomicBool,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_items(items: Vec<Item>) -> Self {
        Self {
            items: Mutex::new(items),
            ..Self::default()
        }
    }

    /// Make subsequent loads and saves fail with an IO error.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> Vec<Item> {
        self.items.lock().clone()
    }
}

impl CatalogStore for MemoryStore {
    fn load(&self) -> Result<Vec<Item>, StoreError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(StoreError::Io("memory store set to fail".into()));
        }
        Ok(self.items.lock().clone())
    }

    fn save(&self, items: &[Item]) -> Result<(), StoreError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(StoreError::Io("memory store set to fail".into()));
        }
        *self.items.lock() = items.to_vec();
        let _ = self.saves.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
