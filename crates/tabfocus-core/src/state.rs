//! The single owned engine state and its persistence.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tabfocus_storage::{keys, load_json, FocusState, KeyValueStore, TimerState};

/// Focus and timer state held by the engines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineState {
    pub focus: FocusState,
    pub timer: TimerState,
}

/// Engine state plus the store it is persisted to.
///
/// Mutation goes through [`SharedState::update`]; the lock is never held
/// across an `.await`. Persistence is an explicit call after each mutation;
/// `persist_lock` keeps one store write in flight at a time.
pub struct SharedState {
    inner: Mutex<EngineState>,
    persist_lock: Mutex<()>,
    store: Arc<dyn KeyValueStore>,
}

impl SharedState {
    /// Start with inert defaults
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            inner: Mutex::new(EngineState::default()),
            persist_lock: Mutex::new(()),
            store,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> EngineState {
        self.lock().clone()
    }

    pub fn read<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
        f(&self.lock())
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> R {
        f(&mut self.lock())
    }

    /// Replace in-memory state with what the store holds.
    ///
    /// Missing keys keep the inert defaults. On a store failure the in-memory
    /// state is left as is.
    pub fn hydrate(&self) {
        let focus = load_json::<FocusState>(self.store.as_ref(), keys::FOCUS_STATE);
        let timer = load_json::<TimerState>(self.store.as_ref(), keys::TIMER_STATE);

        let (mut focus, mut timer) = match (focus, timer) {
            (Ok(focus), Ok(timer)) => (focus.unwrap_or_default(), timer.unwrap_or_default()),
            (Err(e), _) | (_, Err(e)) => {
                log::error!("Failed to load state from store: {e:#}");
                return;
            }
        };

        let dropped = focus.normalize();
        if dropped > 0 {
            log::warn!("Dropped {dropped} hidden tab records stored with inactive focus mode");
        }
        if timer.normalize() {
            log::warn!("Stored timer state was inconsistent, treating timer as stopped");
        }

        log::info!(
            "State loaded (focus active: {}, timer active: {})",
            focus.active,
            timer.active
        );
        self.update(|state| {
            state.focus = focus;
            state.timer = timer;
        });
    }

    /// Write focus and timer state. Failures are logged; the in-memory state
    /// stays the state of record. Returns whether the write succeeded.
    ///
    /// The snapshot is taken after acquiring `persist_lock`, so writes land
    /// in the order their snapshots were taken and the last one wins.
    pub fn persist(&self) -> bool {
        let _guard = self
            .persist_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.snapshot();
        let encoded = serde_json::to_value(&snapshot.focus)
            .and_then(|focus| serde_json::to_value(&snapshot.timer).map(|timer| (focus, timer)));

        let (focus, timer) = match encoded {
            Ok(values) => values,
            Err(e) => {
                log::error!("Failed to encode state: {e}");
                return false;
            }
        };

        match self
            .store
            .set_many(&[(keys::FOCUS_STATE, focus), (keys::TIMER_STATE, timer)])
        {
            Ok(()) => true,
            Err(e) => {
                log::error!("Failed to save state: {e:#}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tabfocus_storage::{HiddenTabRecord, MemoryStore, TimerMode};

    /// Store whose first `set_many` stalls before writing
    struct SlowWriteStore {
        inner: MemoryStore,
        entered: AtomicBool,
        delay: Duration,
    }

    impl KeyValueStore for SlowWriteStore {
        fn get(&self, key: &str) -> anyhow::Result<Option<Value>> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &Value) -> anyhow::Result<()> {
            self.inner.set(key, value)
        }

        fn remove(&self, key: &str) -> anyhow::Result<()> {
            self.inner.remove(key)
        }

        fn set_many(&self, entries: &[(&str, Value)]) -> anyhow::Result<()> {
            if !self.entered.swap(true, Ordering::SeqCst) {
                std::thread::sleep(self.delay);
            }
            self.inner.set_many(entries)
        }
    }

    #[test]
    fn test_persist_then_hydrate() {
        let store = Arc::new(MemoryStore::new());
        let state = SharedState::new(store.clone());
        state.update(|s| {
            s.focus.active = true;
            s.focus.hidden_tabs.push(HiddenTabRecord::new("https://reddit.com/", "Reddit"));
            s.timer = TimerState::running(TimerMode::Work, 25, true, chrono::Utc::now());
        });
        assert!(state.persist());

        let fresh = SharedState::new(store);
        fresh.hydrate();
        assert_eq!(fresh.snapshot(), state.snapshot());
    }

    #[test]
    fn test_hydrate_defaults_when_empty() {
        let state = SharedState::new(Arc::new(MemoryStore::new()));
        state.hydrate();
        assert_eq!(state.snapshot(), EngineState::default());
    }

    #[test]
    fn test_hydrate_repairs_inconsistent_state() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                keys::FOCUS_STATE,
                &json!({"active": false, "hiddenTabs": [{"url": "https://x.com", "title": ""}]}),
            )
            .unwrap();
        store
            .set(keys::TIMER_STATE, &json!({"active": false, "mode": "work", "endTime": 5}))
            .unwrap();

        let state = SharedState::new(store);
        state.hydrate();
        let snapshot = state.snapshot();
        assert!(snapshot.focus.hidden_tabs.is_empty());
        assert_eq!(snapshot.timer.mode, None);
        assert_eq!(snapshot.timer.end_time, None);
    }

    #[test]
    fn test_failed_persist_keeps_memory_state() {
        let store = Arc::new(MemoryStore::new());
        let state = SharedState::new(store.clone());
        store.set_fail_writes(true);
        state.update(|s| s.focus.active = true);
        assert!(!state.persist());
        assert!(state.read(|s| s.focus.active));
    }

    #[test]
    fn test_overlapping_persists_keep_latest_state() {
        let store = Arc::new(SlowWriteStore {
            inner: MemoryStore::new(),
            entered: AtomicBool::new(false),
            delay: Duration::from_millis(300),
        });
        let state = SharedState::new(store.clone());
        state.update(|s| s.focus.active = true);

        std::thread::scope(|scope| {
            let first = scope.spawn(|| state.persist());
            while !store.entered.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            state.update(|s| s.focus.active = false);
            assert!(state.persist());
            assert!(first.join().unwrap());
        });

        assert!(!state.read(|s| s.focus.active));
        let stored = store.get(keys::FOCUS_STATE).unwrap().unwrap();
        assert_eq!(stored["active"], false);
    }
}
