use anyhow::{anyhow, bail, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::store::KeyValueStore;

/// In-process store. Nothing survives the process; used for tests and for
/// running the host without a database file.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail until switched back
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory store is read-only");
        }
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Value>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.check_writable()?;
        self.lock()?.insert(key.to_string(), value.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.check_writable()?;
        self.lock()?.remove(key);
        Ok(())
    }

    fn set_many(&self, entries: &[(&str, Value)]) -> Result<()> {
        self.check_writable()?;
        let mut map = self.lock()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_failing_writes_leave_data_untouched() {
        let store = MemoryStore::new();
        store.set("blacklist", &json!(["a.com"])).unwrap();

        store.set_fail_writes(true);
        assert!(store.set("blacklist", &json!([])).is_err());
        assert!(store.remove("blacklist").is_err());
        assert_eq!(store.get("blacklist").unwrap(), Some(json!(["a.com"])));

        store.set_fail_writes(false);
        store.remove("blacklist").unwrap();
        assert_eq!(store.get("blacklist").unwrap(), None);
    }
}
