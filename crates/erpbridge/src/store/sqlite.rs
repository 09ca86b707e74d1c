/// SQLite-backed client store
use super::{ClientStore, StoreKey};
use crate::error::BridgeError;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS client_state (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
);";

pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Opens (or creates) the store at `db_path` and initializes the schema.
    pub fn open(db_path: &str) -> Result<Self, BridgeError> {
        Self::from_connection(Connection::open(db_path)?)
    }

    /// A store that lives only as long as this value.
    pub fn in_memory() -> Result<Self, BridgeError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, BridgeError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, BridgeError> {
        self.db.lock().map_err(|_| BridgeError::Store {
            message: "client store lock poisoned".to_string(),
        })
    }
}

impl ClientStore for SqliteStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>, BridgeError> {
        let db = self.lock()?;
        let value = db
            .query_row(
                "SELECT value FROM client_state WHERE key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<(), BridgeError> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO client_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key.as_str(), value],
        )?;
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<(), BridgeError> {
        let db = self.lock()?;
        db.execute(
            "DELETE FROM client_state WHERE key = ?1",
            params![key.as_str()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_overwrites() {
        let store = SqliteStore::in_memory().unwrap();
        store.set(StoreKey::DashboardHtml, "<html>1</html>").unwrap();
        store.set(StoreKey::DashboardHtml, "<html>2</html>").unwrap();
        assert_eq!(
            store.get(StoreKey::DashboardHtml).unwrap().as_deref(),
            Some("<html>2</html>")
        );
    }

    #[test]
    fn test_remove_missing_key_is_ok() {
        let store = SqliteStore::in_memory().unwrap();
        store.remove(StoreKey::SubjectSnapshot).unwrap();
        assert_eq!(store.get(StoreKey::SubjectSnapshot).unwrap(), None);
    }
}
