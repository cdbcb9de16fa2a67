use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

/// Top-level keys of the persisted layout
pub mod keys {
    pub const BLACKLIST: &str = "blacklist";
    pub const FOCUS_STATE: &str = "focusState";
    pub const TIMER_STATE: &str = "timerState";
    pub const WARNING_MESSAGE: &str = "customWarningMessage";
}

/// Durable key-value storage surviving process restart
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be read
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write `value` under `key`, replacing any previous value
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written
    fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Delete `key` if present
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying storage cannot be written
    fn remove(&self, key: &str) -> Result<()>;

    /// Write several keys. Implementations backed by a transactional store
    /// apply them all or none.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails
    fn set_many(&self, entries: &[(&str, Value)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }
}

/// Read and decode `key`.
///
/// A value that does not decode as `T` is treated as absent and logged, so a
/// corrupted entry never takes the caller down.
///
/// # Errors
///
/// Returns an error only when the store itself fails
pub fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: &str) -> Result<Option<T>> {
    let Some(raw) = store.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_value(raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            log::warn!("Ignoring malformed value under '{key}': {e}");
            Ok(None)
        }
    }
}

/// Encode and write `value` under `key`
///
/// # Errors
///
/// Returns an error if encoding or the store write fails
pub fn save_json<T: Serialize>(store: &dyn KeyValueStore, key: &str, value: &T) -> Result<()> {
    let encoded =
        serde_json::to_value(value).with_context(|| format!("Failed to encode '{key}'"))?;
    store.set(key, &encoded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::models::FocusState;
    use serde_json::json;

    #[test]
    fn test_load_missing_key() {
        let store = MemoryStore::new();
        let loaded: Option<Vec<String>> = load_json(&store, keys::BLACKLIST).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_load_malformed_value_is_absent() {
        let store = MemoryStore::new();
        store.set(keys::BLACKLIST, &json!({"not": "a list"})).unwrap();
        let loaded: Option<Vec<String>> = load_json(&store, keys::BLACKLIST).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_and_load_focus_state() {
        let store = MemoryStore::new();
        let state = FocusState {
            active: true,
            hidden_tabs: Vec::new(),
        };
        save_json(&store, keys::FOCUS_STATE, &state).unwrap();
        let loaded: FocusState = load_json(&store, keys::FOCUS_STATE).unwrap().unwrap();
        assert_eq!(loaded, state);
    }
}
