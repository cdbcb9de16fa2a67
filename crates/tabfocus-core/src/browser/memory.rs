use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use super::{Badge, Notification, StatusPort, TabHost, TabId, TabInfo};

#[derive(Debug, Default)]
struct Inner {
    tabs: Vec<TabInfo>,
    next_id: TabId,
    failing_removals: HashSet<TabId>,
    failing_creations: HashSet<String>,
    badges: Vec<Badge>,
    notifications: Vec<Notification>,
    redirects: Vec<(TabId, String)>,
    latency: Option<Duration>,
}

/// In-process browser: a tab table plus recorded badges and notifications.
///
/// Backs the headless host and the engine tests. Individual tabs can be made
/// to refuse closing or opening, and every call can be given latency so that
/// concurrent engine operations actually interleave.
#[derive(Debug, Default)]
pub struct MemoryBrowser {
    inner: Mutex<Inner>,
}

impl MemoryBrowser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Open a tab directly (not through the engine)
    pub fn open_tab(&self, url: &str, title: &str) -> TabId {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.tabs.push(TabInfo {
            id,
            url: Some(url.to_string()),
            title: Some(title.to_string()),
            active: false,
        });
        id
    }

    /// Mark `id` as the focused tab
    pub fn focus_tab(&self, id: TabId) {
        for tab in &mut self.lock().tabs {
            tab.active = tab.id == id;
        }
    }

    pub fn fail_removal_of(&self, id: TabId) {
        self.lock().failing_removals.insert(id);
    }

    pub fn fail_creation_of(&self, url: &str) {
        self.lock().failing_creations.insert(url.to_string());
    }

    /// Delay every browser call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.lock().latency = latency;
    }

    #[must_use]
    pub fn tabs(&self) -> Vec<TabInfo> {
        self.lock().tabs.clone()
    }

    /// URLs of open tabs, in opening order
    #[must_use]
    pub fn urls(&self) -> Vec<String> {
        self.lock()
            .tabs
            .iter()
            .filter_map(|tab| tab.url.clone())
            .collect()
    }

    #[must_use]
    pub fn badges(&self) -> Vec<Badge> {
        self.lock().badges.clone()
    }

    #[must_use]
    pub fn last_badge(&self) -> Option<Badge> {
        self.lock().badges.last().cloned()
    }

    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.lock().notifications.clone()
    }

    /// Navigations rewritten through `update_tab_url`
    #[must_use]
    pub fn redirects(&self) -> Vec<(TabId, String)> {
        self.lock().redirects.clone()
    }

    async fn simulate_latency(&self) {
        let latency = self.lock().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl TabHost for MemoryBrowser {
    async fn query_tabs(&self) -> Result<Vec<TabInfo>> {
        self.simulate_latency().await;
        Ok(self.tabs())
    }

    async fn remove_tab(&self, id: TabId) -> Result<()> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        if inner.failing_removals.contains(&id) {
            bail!("tab {id} refused to close");
        }
        let before = inner.tabs.len();
        inner.tabs.retain(|tab| tab.id != id);
        if inner.tabs.len() == before {
            bail!("no tab with id {id}");
        }
        Ok(())
    }

    async fn create_tab(&self, url: &str, active: bool) -> Result<TabId> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        if inner.failing_creations.contains(url) {
            bail!("cannot open {url}");
        }
        inner.next_id += 1;
        let id = inner.next_id;
        inner.tabs.push(TabInfo {
            id,
            url: Some(url.to_string()),
            title: None,
            active,
        });
        Ok(id)
    }

    async fn update_tab_url(&self, id: TabId, url: &str) -> Result<()> {
        self.simulate_latency().await;
        let mut inner = self.lock();
        let tab = inner
            .tabs
            .iter_mut()
            .find(|tab| tab.id == id)
            .ok_or_else(|| anyhow!("no tab with id {id}"))?;
        tab.url = Some(url.to_string());
        inner.redirects.push((id, url.to_string()));
        Ok(())
    }

    async fn active_tab(&self) -> Result<Option<TabInfo>> {
        self.simulate_latency().await;
        Ok(self.lock().tabs.iter().find(|tab| tab.active).cloned())
    }
}

#[async_trait]
impl StatusPort for MemoryBrowser {
    async fn set_badge(&self, badge: &Badge) -> Result<()> {
        self.lock().badges.push(badge.clone());
        Ok(())
    }

    async fn notify(&self, notification: &Notification) -> Result<()> {
        log::debug!("[notification] {}: {}", notification.title, notification.message);
        self.lock().notifications.push(notification.clone());
        Ok(())
    }
}
