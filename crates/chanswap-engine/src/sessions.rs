use std::collections::HashSet;

use chanswap_core::{ConnectionId, CoordinatorError};

/// Tracks which connections are currently present.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    present: HashSet<ConnectionId>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, id: &ConnectionId) -> Result<(), CoordinatorError> {
        if !self.present.insert(id.clone()) {
            return Err(CoordinatorError::DuplicateSession(id.clone()));
        }
        Ok(())
    }

    pub fn disconnect(&mut self, id: &ConnectionId) -> Result<(), CoordinatorError> {
        if !self.present.remove(id) {
            return Err(CoordinatorError::UnknownSession(id.clone()));
        }
        Ok(())
    }

    pub fn is_present(&self, id: &ConnectionId) -> bool {
        self.present.contains(id)
    }

    pub fn present_count(&self) -> u32 {
        self.present.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_and_disconnect_track_presence() {
        let mut registry = SessionRegistry::new();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        registry.connect(&a).unwrap();
        registry.connect(&b).unwrap();
        assert_eq!(registry.present_count(), 2);
        assert!(registry.is_present(&a));

        registry.disconnect(&a).unwrap();
        assert_eq!(registry.present_count(), 1);
        assert!(!registry.is_present(&a));
    }

    #[test]
    fn duplicate_connect_fails_without_change() {
        let mut registry = SessionRegistry::new();
        let a = ConnectionId::new();
        registry.connect(&a).unwrap();

        let err = registry.connect(&a).unwrap_err();
        assert_eq!(err, CoordinatorError::DuplicateSession(a));
        assert_eq!(registry.present_count(), 1);
    }

    #[test]
    fn disconnect_unknown_fails() {
        let mut registry = SessionRegistry::new();
        let ghost = ConnectionId::new();
        assert!(matches!(
            registry.disconnect(&ghost),
            Err(CoordinatorError::UnknownSession(_))
        ));
    }
}
