//! Session storage for the tab registry (spec.md §9 "Shared-resource
//! policy"): a single-row sqlite snapshot, written on a debounced schedule
//! rather than on every mutation. Mirrors the teacher's `Database` handle
//! (`rusqlite::Connection` behind a `Mutex`, `open`/`open_in_memory`).

use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;

use super::tab::TabRegistrySnapshot;
use crate::error::SessionStoreError;

pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SessionStoreError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn in_memory() -> Result<Self, SessionStoreError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, SessionStoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS tab_registry_snapshot (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                payload TEXT NOT NULL
            );",
        )?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn save(&self, snapshot: &TabRegistrySnapshot) -> Result<(), SessionStoreError> {
        let payload = serde_json::to_string(snapshot)?;
        let conn = self.conn.lock().expect("session store connection mutex poisoned");
        conn.execute(
            "INSERT INTO tab_registry_snapshot (id, payload) VALUES (1, ?1)
             ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
            rusqlite::params![payload],
        )?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<TabRegistrySnapshot>, SessionStoreError> {
        let conn = self.conn.lock().expect("session store connection mutex poisoned");
        let payload: Option<String> = conn
            .query_row("SELECT payload FROM tab_registry_snapshot WHERE id = 1", [], |row| row.get(0))
            .ok();
        Ok(match payload {
            Some(payload) => Some(serde_json::from_str(&payload)?),
            None => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_snapshot() {
        let store = SessionStore::in_memory().unwrap();
        assert!(store.load().unwrap().is_none());

        let snapshot = TabRegistrySnapshot {
            alias_counter: 3,
            tabs: vec![],
        };
        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.alias_counter, 3);
    }

    #[test]
    fn save_overwrites_the_single_row() {
        let store = SessionStore::in_memory().unwrap();
        store.save(&TabRegistrySnapshot { alias_counter: 1, tabs: vec![] }).unwrap();
        store.save(&TabRegistrySnapshot { alias_counter: 2, tabs: vec![] }).unwrap();
        assert_eq!(store.load().unwrap().unwrap().alias_counter, 2);
    }
}
