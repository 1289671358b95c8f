pub mod database;
pub mod error;
pub mod json;
pub mod memory;
pub mod persist;
pub mod schema;
pub mod sqlite;

pub use database::Database;
pub use error::StoreError;
pub use json::JsonFileStore;
pub use memory::MemoryStore;
pub use persist::{load_catalog, repair_duplicate_ids, spawn_writer};
pub use sqlite::SqliteItemStore;

use chanswap_core::Item;

/// Durable home for the catalog. Implementations are called off the
/// coordinator's critical section.
pub trait CatalogStore: Send + Sync {
    /// Load the catalog in stored order.
    fn load(&self) -> Result<Vec<Item>, StoreError>;

    /// Replace the stored catalog with `items`, preserving order.
    fn save(&self, items: &[Item]) -> Result<(), StoreError>;
}
