use std::path::{Path, PathBuf};

use tracing::{debug, instrument};

use chanswap_core::Item;

use crate::error::StoreError;
use crate::CatalogStore;

/// Catalog persisted as a JSON array of `{id, name, description?}` records.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl CatalogStore for JsonFileStore {
    /// A missing file is created empty.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> Result<Vec<Item>, StoreError> {
        if !self.path.exists() {
            debug!("catalog file not found, creating empty catalog");
            self.save(&[])?;
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    #[instrument(skip(self, items), fields(path = %self.path.display(), count = items.len()))]
    fn save(&self, items: &[Item]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(items)?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chanswap_core::ItemId;

    use super::*;

    #[test]
    fn missing_file_loads_empty_and_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tvshows.json");
        let store = JsonFileStore::new(&path);

        assert!(store.load().unwrap().is_empty());
        assert!(path.exists());
        assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("sub").join("items.json"));
        let items = vec![
            Item {
                id: ItemId(1),
                name: "News".into(),
                description: Some("evening bulletin".into()),
            },
            Item {
                id: ItemId(2),
                name: "Cartoons".into(),
                description: None,
            },
        ];

        store.save(&items).unwrap();
        assert_eq!(store.load().unwrap(), items);
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn reads_files_without_descriptions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tvshows.json");
        std::fs::write(&path, r#"[{"id":1,"name":"News"},{"id":2,"name":"Sports"}]"#).unwrap();

        let loaded = JsonFileStore::new(&path).load().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[1].name, "Sports");
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tvshows.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = JsonFileStore::new(&path).load().unwrap_err();
        assert!(matches!(err, StoreError::Serialization(_)));
    }
}
