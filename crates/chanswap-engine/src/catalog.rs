use chanswap_core::{CoordinatorError, Item, ItemId, NewItem};

/// Ordered set of selectable items. Ids are unique among live items.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    items: Vec<Item>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from previously persisted items. Ids must already be unique.
    pub fn from_items(items: Vec<Item>) -> Self {
        Self { items }
    }

    /// The id the next added item receives: `max + 1`, or 1 when empty.
    pub fn next_id(&self) -> ItemId {
        self.items
            .iter()
            .map(|item| item.id)
            .max()
            .map_or(ItemId::FIRST, ItemId::next)
    }

    pub fn add(&mut self, new: NewItem) -> Result<Item, CoordinatorError> {
        let name = new.name.trim();
        if name.is_empty() {
            return Err(CoordinatorError::InvalidItem("name must not be empty".into()));
        }

        let id = self.next_id();
        if self.contains(id) {
            return Err(CoordinatorError::DuplicateId(id));
        }

        let item = Item {
            id,
            name: name.to_string(),
            description: new
                .description
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty()),
        };
        self.items.push(item.clone());
        Ok(item)
    }

    pub fn remove(&mut self, id: ItemId) -> Result<Item, CoordinatorError> {
        let pos = self
            .items
            .iter()
            .position(|item| item.id == id)
            .ok_or(CoordinatorError::NotFound(id))?;
        Ok(self.items.remove(pos))
    }

    pub fn get(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.get(id).is_some()
    }

    /// Borrowed view in insertion order.
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Owned snapshot in insertion order.
    pub fn list(&self) -> Vec<Item> {
        self.items.clone()
    }

    pub fn first(&self) -> Option<&Item> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
