//! Navigation guard: redirects navigations to blocked hosts while focus mode
//! is active.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::form_urlencoded;

use crate::blacklist::{blocking_entry, hostname_of, BlacklistRegistry};
use crate::browser::{NavigationEvent, TabHost};

pub struct NavigationGuard {
    blacklist: Arc<BlacklistRegistry>,
    tabs: Arc<dyn TabHost>,
    warning_page: String,
}

impl NavigationGuard {
    #[must_use]
    pub fn new(
        blacklist: Arc<BlacklistRegistry>,
        tabs: Arc<dyn TabHost>,
        warning_page: impl Into<String>,
    ) -> Self {
        Self {
            blacklist,
            tabs,
            warning_page: warning_page.into(),
        }
    }

    /// Start receiving navigation events. The returned subscription is the
    /// only way events reach the guard; disposing it detaches the guard.
    #[must_use]
    pub fn install(self: &Arc<Self>) -> GuardSubscription {
        log::debug!("Navigation guard installed");
        GuardSubscription {
            guard: Arc::clone(self),
            live: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Hostname to block for a navigation to `url`, if any
    #[must_use]
    pub fn blocked_host(&self, url: &str) -> Option<String> {
        let entries = self.blacklist.cached();
        blocking_entry(url, &entries).and_then(|_| hostname_of(url))
    }

    /// Warning page URL carrying the offending hostname as `site`
    #[must_use]
    pub fn warning_url(&self, hostname: &str) -> String {
        let encoded: String = form_urlencoded::byte_serialize(hostname.as_bytes()).collect();
        let separator = if self.warning_page.contains('?') { '&' } else { '?' };
        format!("{}{separator}site={encoded}", self.warning_page)
    }

    async fn check(&self, event: &NavigationEvent) -> bool {
        let Some(host) = self.blocked_host(&event.url) else {
            return false;
        };

        let target = self.warning_url(&host);
        match self.tabs.update_tab_url(event.tab_id, &target).await {
            Ok(()) => {
                log::info!("Blocked navigation to {host} in tab {}", event.tab_id);
                true
            }
            Err(e) => {
                log::warn!("Failed to redirect tab {} away from {host}: {e:#}", event.tab_id);
                false
            }
        }
    }
}

/// Handle for an installed guard, held by the session engine while focus
/// mode is active
#[derive(Clone)]
pub struct GuardSubscription {
    guard: Arc<NavigationGuard>,
    live: Arc<AtomicBool>,
}

impl GuardSubscription {
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    /// Detach the guard. Events already in flight are ignored from now on.
    pub fn dispose(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            log::debug!("Navigation guard removed");
        }
    }

    /// Handle one pre-navigation event. Returns whether the tab was
    /// redirected.
    pub async fn inspect(&self, event: &NavigationEvent) -> bool {
        if !self.is_live() {
            return false;
        }
        self.guard.check(event).await
    }
}
