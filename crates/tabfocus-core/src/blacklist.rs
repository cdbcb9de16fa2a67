//! Blacklist registry: the user's blocked host fragments.
//!
//! Entries are normalized once, when stored. Matching is symmetric substring
//! containment, so `reddit.com` blocks `old.reddit.com` and a short entry such
//! as `x` blocks every host containing an `x`. The false positives on short or
//! generic entries are a known limitation.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tabfocus_storage::{keys, load_json, save_json, KeyValueStore};
use url::Url;

/// Schemes of pages the browser or an extension owns. Tabs on these are never
/// hidden and navigations to them are never redirected.
const INTERNAL_SCHEMES: &[&str] = &[
    "chrome",
    "chrome-extension",
    "about",
    "edge",
    "moz-extension",
    "devtools",
];

/// Normalize a user-typed site into a blacklist entry.
///
/// Lowercases, trims, strips an `http://`/`https://` prefix, a leading `www.`
/// and trailing slashes. Returns `None` when nothing is left.
#[must_use]
pub fn normalize_site(raw: &str) -> Option<String> {
    let mut site = raw.trim().to_lowercase();

    for scheme in ["https://", "http://"] {
        if let Some(rest) = site.strip_prefix(scheme) {
            site = rest.to_string();
            break;
        }
    }
    if let Some(rest) = site.strip_prefix("www.") {
        site = rest.to_string();
    }

    let site = site.trim_end_matches('/').trim();
    if site.is_empty() {
        None
    } else {
        Some(site.to_string())
    }
}

/// Symmetric substring containment between a hostname and an entry
#[must_use]
pub fn host_matches(hostname: &str, entry: &str) -> bool {
    let host = hostname.trim().to_lowercase();
    if host.is_empty() || entry.is_empty() {
        return false;
    }
    host.contains(entry) || entry.contains(host.as_str())
}

/// Whether `url` points at a browser- or extension-owned page
#[must_use]
pub fn is_internal_url(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => INTERNAL_SCHEMES.contains(&parsed.scheme()),
        Err(_) => url.trim().is_empty(),
    }
}

/// Lowercased hostname of `url`, or `None` for malformed or host-less URLs
#[must_use]
pub fn hostname_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_lowercase();
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}

/// First entry in `entries` that blocks `url`, if any.
/// Internal pages and malformed URLs never match.
#[must_use]
pub fn blocking_entry<'a>(url: &str, entries: &'a [String]) -> Option<&'a str> {
    if is_internal_url(url) {
        return None;
    }
    let host = hostname_of(url)?;
    entries
        .iter()
        .find(|entry| host_matches(&host, entry))
        .map(String::as_str)
}

/// Ordered set of blocked host fragments, persisted under `blacklist`.
///
/// The store is the source of truth; the in-memory copy serves the navigation
/// guard and stands in when the store cannot be read. Every
/// read-modify-write of the stored list runs under `write_lock`.
pub struct BlacklistRegistry {
    store: Arc<dyn KeyValueStore>,
    cache: RwLock<Vec<String>>,
    write_lock: Mutex<()>,
}

impl BlacklistRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            cache: RwLock::new(Vec::new()),
            write_lock: Mutex::new(()),
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Load the registry at startup.
    ///
    /// A missing or malformed key is initialised to an empty list. Entries
    /// written by older versions are normalized and de-duplicated in place.
    pub fn hydrate(&self) {
        let _guard = self.lock_writes();
        let stored: Option<Vec<String>> = match load_json(self.store.as_ref(), keys::BLACKLIST) {
            Ok(value) => value,
            Err(e) => {
                log::error!("Failed to load blacklist: {e:#}");
                return;
            }
        };

        let Some(stored) = stored else {
            log::info!("Blacklist key missing, initializing");
            self.write(Vec::new());
            return;
        };

        let mut normalized: Vec<String> = Vec::with_capacity(stored.len());
        for entry in &stored {
            if let Some(site) = normalize_site(entry) {
                if !normalized.contains(&site) {
                    normalized.push(site);
                }
            }
        }

        if normalized == stored {
            self.replace_cache(normalized);
        } else {
            log::info!(
                "Normalized stored blacklist ({} -> {} entries)",
                stored.len(),
                normalized.len()
            );
            self.write(normalized);
        }
    }

    /// Current entries in insertion order. Never fails: an unreadable store
    /// falls back to the last known list, a corrupted value to an empty one.
    #[must_use]
    pub fn list(&self) -> Vec<String> {
        match load_json::<Vec<String>>(self.store.as_ref(), keys::BLACKLIST) {
            Ok(Some(entries)) => {
                self.replace_cache(entries.clone());
                entries
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                log::error!("Failed to read blacklist, using cached copy: {e:#}");
                self.cached()
            }
        }
    }

    /// Entries as last loaded or written, without touching the store
    #[must_use]
    pub fn cached(&self) -> Vec<String> {
        match self.cache.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Add a site. Returns whether an insertion happened.
    pub fn add(&self, raw_site: &str) -> bool {
        let Some(site) = normalize_site(raw_site) else {
            log::debug!("Rejected empty blacklist entry {raw_site:?}");
            return false;
        };

        let _guard = self.lock_writes();
        let mut entries = self.list();
        if entries.contains(&site) {
            return false;
        }
        entries.push(site.clone());

        if self.write(entries) {
            log::info!("Added '{site}' to blacklist");
            true
        } else {
            false
        }
    }

    /// Remove the entry equal to the normalized `site`.
    /// Returns whether a removal happened.
    pub fn remove(&self, site: &str) -> bool {
        let Some(site) = normalize_site(site) else {
            return false;
        };

        let _guard = self.lock_writes();
        let mut entries = self.list();
        let before = entries.len();
        entries.retain(|entry| *entry != site);
        if entries.len() == before {
            return false;
        }

        if self.write(entries) {
            log::info!("Removed '{site}' from blacklist");
            true
        } else {
            false
        }
    }

    fn write(&self, entries: Vec<String>) -> bool {
        match save_json(self.store.as_ref(), keys::BLACKLIST, &entries) {
            Ok(()) => {
                self.replace_cache(entries);
                true
            }
            Err(e) => {
                log::error!("Failed to persist blacklist: {e:#}");
                false
            }
        }
    }

    fn replace_cache(&self, entries: Vec<String>) {
        match self.cache.write() {
            Ok(mut guard) => *guard = entries,
            Err(poisoned) => *poisoned.into_inner() = entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tabfocus_storage::MemoryStore;

    /// Store whose reads stall after fetching, widening the gap between a
    /// read and the write that follows it
    struct SlowReadStore {
        inner: MemoryStore,
        delay: Duration,
    }

    impl KeyValueStore for SlowReadStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
            let value = self.inner.get(key);
            std::thread::sleep(self.delay);
            value
        }

        fn set(&self, key: &str, value: &Value) -> anyhow::Result<()> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.inner.remove(key)
        }

        fn set_many(&self, entries: &[(&str, Value)]) -> anyhow::Result<()> {
            self.inner.set_many(entries)
        }
    }

    fn registry() -> (BlacklistRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = BlacklistRegistry::new(store.clone());
        registry.hydrate();
        (registry, store)
    }

    #[test]
    fn test_normalize_site() {
        assert_eq!(normalize_site("https://www.X.com/"), Some("x.com".to_string()));
        assert_eq!(normalize_site("  http://Reddit.com//  "), Some("reddit.com".to_string()));
        assert_eq!(normalize_site("www.youtube.com"), Some("youtube.com".to_string()));
        assert_eq!(normalize_site("news.ycombinator.com"), Some("news.ycombinator.com".to_string()));
        assert_eq!(normalize_site("   "), None);
        assert_eq!(normalize_site("https://"), None);
        assert_eq!(normalize_site("https://www./"), None);
    }

    #[test]
    fn test_host_matches_is_symmetric() {
        assert!(host_matches("old.reddit.com", "reddit.com"));
        assert!(host_matches("REDDIT.COM", "reddit.com"));
        assert!(host_matches("x.com", "www.x.com"));
        assert!(!host_matches("example.org", "reddit.com"));
        assert!(!host_matches("", "reddit.com"));
    }

    #[test]
    fn test_blocking_entry_skips_internal_and_malformed() {
        let entries = vec!["newtab".to_string(), "reddit.com".to_string()];
        assert_eq!(blocking_entry("chrome://newtab/", &entries), None);
        assert_eq!(blocking_entry("about:blank", &entries), None);
        assert_eq!(blocking_entry("not a url", &entries), None);
        assert_eq!(
            blocking_entry("https://old.reddit.com/r/rust", &entries),
            Some("reddit.com")
        );
    }

    #[test]
    fn test_add_equivalent_inputs_once() {
        let (registry, _) = registry();
        assert!(registry.add("https://www.X.com/"));
        assert!(!registry.add("x.com"));
        assert!(!registry.add("  X.COM "));
        assert!(!registry.add("http://x.com"));

        let list = registry.list();
        assert_eq!(list.iter().filter(|s| *s == "x.com").count(), 1);
    }

    #[test]
    fn test_add_rejects_empty() {
        let (registry, _) = registry();
        assert!(!registry.add(""));
        assert!(!registry.add("https://"));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_insertion_order_preserved() {
        let (registry, _) = registry();
        registry.add("b.com");
        registry.add("a.com");
        registry.add("c.com");
        assert_eq!(registry.list(), vec!["b.com", "a.com", "c.com"]);
    }

    #[test]
    fn test_remove() {
        let (registry, _) = registry();
        registry.add("reddit.com");
        assert!(registry.remove("https://www.reddit.com/"));
        assert!(!registry.remove("reddit.com"));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_hydrate_initializes_missing_key() {
        let (_, store) = registry();
        assert_eq!(store.get(keys::BLACKLIST).unwrap(), Some(json!([])));
    }

    #[test]
    fn test_hydrate_normalizes_legacy_entries() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(keys::BLACKLIST, &json!(["Reddit.com", "https://reddit.com/", "www.x.com", ""]))
            .unwrap();
        let registry = BlacklistRegistry::new(store.clone());
        registry.hydrate();

        assert_eq!(registry.list(), vec!["reddit.com", "x.com"]);
        assert_eq!(registry.cached(), vec!["reddit.com", "x.com"]);
    }

    #[test]
    fn test_corrupted_store_lists_empty() {
        let (registry, store) = registry();
        store.set(keys::BLACKLIST, &json!("garbage")).unwrap();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_failed_write_is_not_an_insertion() {
        let (registry, store) = registry();
        store.set_fail_writes(true);
        assert!(!registry.add("reddit.com"));
        store.set_fail_writes(false);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_concurrent_adds_keep_both_entries() {
        let store = Arc::new(SlowReadStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(100),
        });
        let registry = BlacklistRegistry::new(store);
        registry.hydrate();

        let (added_a, added_b) = std::thread::scope(|scope| {
            let a = scope.spawn(|| registry.add("a.com"));
            let b = scope.spawn(|| registry.add("b.com"));
            (a.join().unwrap(), b.join().unwrap())
        });

        assert!(added_a && added_b);
        let mut list = registry.list();
        list.sort();
        assert_eq!(list, vec!["a.com", "b.com"]);
    }

    #[test]
    fn test_concurrent_add_and_remove_serialized() {
        let store = Arc::new(SlowReadStore {
            inner: MemoryStore::new(),
            delay: Duration::from_millis(50),
        });
        let registry = BlacklistRegistry::new(store);
        registry.hydrate();
        registry.add("reddit.com");

        let (added, removed) = std::thread::scope(|scope| {
            let add = scope.spawn(|| registry.add("x.com"));
            let remove = scope.spawn(|| registry.remove("reddit.com"));
            (add.join().unwrap(), remove.join().unwrap())
        });

        assert!(added && removed);
        assert_eq!(registry.list(), vec!["x.com"]);
    }
}
