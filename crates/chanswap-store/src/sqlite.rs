use tracing::instrument;

use chanswap_core::{Item, ItemId};

use crate::database::Database;
use crate::error::StoreError;
use crate::CatalogStore;

/// Catalog persisted in a SQLite `items` table, ordered by `position`.
pub struct SqliteItemStore {
    db: Database,
}

impl SqliteItemStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

impl CatalogStore for SqliteItemStore {
    #[instrument(skip(self))]
    fn load(&self) -> Result<Vec<Item>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, description FROM items ORDER BY position")?;
            let rows = stmt.query_map([], |row| {
                Ok(Item {
                    id: ItemId(row.get(0)?),
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
        })
    }

    #[instrument(skip(self, items), fields(count = items.len()))]
    fn save(&self, items: &[Item]) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute("DELETE FROM items", [])?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO items (position, id, name, description) VALUES (?1, ?2, ?3, ?4)",
                )?;
                for (position, item) in items.iter().enumerate() {
                    stmt.execute(rusqlite::params![
                        position as i64,
                        item.id.0,
                        item.name,
                        item.description,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
    }
}
