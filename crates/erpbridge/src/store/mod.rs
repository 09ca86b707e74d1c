/// Client-side key-value state (what the browser keeps in local storage)
mod sqlite;

pub use sqlite::SqliteStore;

use crate::error::BridgeError;
use dashmap::DashMap;

/// The values the bridge persists between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKey {
    /// Last dashboard HTML; holds the CSRF token for logout and for resuming
    DashboardHtml,
    /// Last parsed attendance report, as JSON
    SubjectSnapshot,
    /// Username to prefill on the login form
    RememberedUsername,
}

impl StoreKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKey::DashboardHtml => "erpDashboardHtml",
            StoreKey::SubjectSnapshot => "erpSubjects",
            StoreKey::RememberedUsername => "rememberedId",
        }
    }
}

/// Opaque key-value storage owned by the client.
pub trait ClientStore: Send + Sync {
    fn get(&self, key: StoreKey) -> Result<Option<String>, BridgeError>;
    fn set(&self, key: StoreKey, value: &str) -> Result<(), BridgeError>;
    fn remove(&self, key: StoreKey) -> Result<(), BridgeError>;
}

/// In-memory store, for tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<StoreKey, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ClientStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, BridgeError> {
        Ok(self.entries.get(&key).map(|entry| entry.value().clone()))
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), BridgeError> {
        self.entries.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<(), BridgeError> {
        self.entries.remove(&key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get(StoreKey::RememberedUsername).unwrap(), None);

        store.set(StoreKey::RememberedUsername, "2300031234").unwrap();
        assert_eq!(
            store.get(StoreKey::RememberedUsername).unwrap().as_deref(),
            Some("2300031234")
        );

        store.remove(StoreKey::RememberedUsername).unwrap();
        assert_eq!(store.get(StoreKey::RememberedUsername).unwrap(), None);
    }

    #[test]
    fn test_key_names() {
        assert_eq!(StoreKey::DashboardHtml.as_str(), "erpDashboardHtml");
        assert_eq!(StoreKey::SubjectSnapshot.as_str(), "erpSubjects");
    }
}
