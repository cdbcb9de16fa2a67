//! Session engine: focus mode lifecycle.
//!
//! `start` snapshots and closes every tab whose host matches the blacklist;
//! `stop` reopens the snapshot. Both run under one operation lock, so a second
//! call issued while the first is suspended on a browser call waits for it and
//! then sees the finished state.

use std::sync::{Arc, Mutex, MutexGuard};
use tabfocus_storage::HiddenTabRecord;
use tokio::sync::Mutex as AsyncMutex;

use crate::blacklist::{blocking_entry, BlacklistRegistry};
use crate::browser::{NavigationEvent, TabHost, TabId};
use crate::guard::{GuardSubscription, NavigationGuard};
use crate::state::SharedState;
use crate::status::StatusReporter;

pub struct SessionEngine {
    state: Arc<SharedState>,
    blacklist: Arc<BlacklistRegistry>,
    tabs: Arc<dyn TabHost>,
    status: Arc<StatusReporter>,
    guard: Arc<NavigationGuard>,
    subscription: Mutex<Option<GuardSubscription>>,
    op_lock: AsyncMutex<()>,
}

impl SessionEngine {
    #[must_use]
    pub fn new(
        state: Arc<SharedState>,
        blacklist: Arc<BlacklistRegistry>,
        tabs: Arc<dyn TabHost>,
        status: Arc<StatusReporter>,
        guard: Arc<NavigationGuard>,
    ) -> Self {
        Self {
            state,
            blacklist,
            tabs,
            status,
            guard,
            subscription: Mutex::new(None),
            op_lock: AsyncMutex::new(()),
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.read(|s| s.focus.active)
    }

    #[must_use]
    pub fn hidden_tabs(&self) -> Vec<HiddenTabRecord> {
        self.state.read(|s| s.focus.hidden_tabs.clone())
    }

    fn subscription(&self) -> MutexGuard<'_, Option<GuardSubscription>> {
        match self.subscription.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Enter focus mode. Returns `false` if it was already active.
    pub async fn start(&self) -> bool {
        let _op = self.op_lock.lock().await;
        if self.is_active() {
            log::debug!("Focus mode already active");
            return false;
        }

        let entries = self.blacklist.list();
        let tabs = match self.tabs.query_tabs().await {
            Ok(tabs) => tabs,
            Err(e) => {
                log::error!("Failed to enumerate tabs, nothing will be hidden: {e:#}");
                Vec::new()
            }
        };

        // Snapshot the whole hide set before closing anything
        let mut hide_set: Vec<TabId> = Vec::new();
        let mut records: Vec<HiddenTabRecord> = Vec::new();
        for tab in &tabs {
            let Some(url) = tab.url.as_deref() else {
                continue;
            };
            if blocking_entry(url, &entries).is_some() {
                hide_set.push(tab.id);
                records.push(HiddenTabRecord::new(url, tab.title.clone().unwrap_or_default()));
            }
        }

        for id in &hide_set {
            if let Err(e) = self.tabs.remove_tab(*id).await {
                log::warn!("Failed to close tab {id}, keeping it recorded: {e:#}");
            }
        }

        let hidden = records.len();
        self.state.update(|s| {
            s.focus.active = true;
            s.focus.hidden_tabs = records;
        });
        self.state.persist();
        self.install_guard();
        self.status.refresh(&self.state).await;
        self.status
            .notify("Focus Mode Started", format!("Blocked {hidden} distracting tabs"))
            .await;

        log::info!("Focus mode started, {hidden} tabs hidden");
        true
    }

    /// Leave focus mode and reopen hidden tabs. Returns `false` if it was not
    /// active.
    pub async fn stop(&self) -> bool {
        let _op = self.op_lock.lock().await;
        if !self.is_active() {
            log::debug!("Focus mode not active");
            return false;
        }

        let records = self.hidden_tabs();
        let mut restored = 0usize;
        for record in &records {
            match self.tabs.create_tab(&record.url, false).await {
                Ok(_) => restored += 1,
                Err(e) => log::warn!("Failed to restore {}: {e:#}", record.url),
            }
        }

        self.state.update(|s| {
            s.focus.active = false;
            s.focus.hidden_tabs.clear();
        });
        self.state.persist();
        if let Some(subscription) = self.subscription().take() {
            subscription.dispose();
        }
        self.status.refresh(&self.state).await;

        let message = if restored == records.len() {
            "All tabs have been restored".to_string()
        } else {
            format!("Restored {restored} of {} tabs", records.len())
        };
        self.status.notify("Focus Mode Ended", message).await;

        log::info!("Focus mode stopped, {restored}/{} tabs restored", records.len());
        true
    }

    /// Reattach the navigation guard after a restart that found focus mode
    /// active in the store
    pub fn resume(&self) {
        if self.is_active() {
            self.install_guard();
        }
    }

    fn install_guard(&self) {
        let mut slot = self.subscription();
        if slot.as_ref().is_some_and(GuardSubscription::is_live) {
            return;
        }
        *slot = Some(self.guard.install());
    }

    /// Route a pre-navigation event to the guard. Returns whether the tab was
    /// redirected.
    pub async fn on_before_navigate(&self, event: &NavigationEvent) -> bool {
        let subscription = self.subscription().clone();
        let Some(subscription) = subscription else {
            return false;
        };
        // Delivery can race the guard's removal
        if !self.is_active() {
            return false;
        }
        subscription.inspect(event).await
    }
}
