//! Request dispatcher wiring the engines together.

use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tabfocus_storage::{keys, load_json, save_json, KeyValueStore};

use crate::blacklist::{hostname_of, BlacklistRegistry};
use crate::browser::{NavigationEvent, StatusPort, TabHost};
use crate::config::Config;
use crate::guard::NavigationGuard;
use crate::housekeeping::Housekeeping;
use crate::protocol::{Request, Response, SessionStatus};
use crate::session::SessionEngine;
use crate::state::SharedState;
use crate::status::StatusReporter;
use crate::timer::TimerEngine;

/// The running core: engines, their shared state and background jobs.
///
/// Every entry point (UI request, navigation event, housekeeping tick) goes
/// through here. Failures become `success: false` responses, never panics.
pub struct FocusService {
    config: Config,
    store: Arc<dyn KeyValueStore>,
    state: Arc<SharedState>,
    blacklist: Arc<BlacklistRegistry>,
    session: Arc<SessionEngine>,
    timer: Arc<TimerEngine>,
    status: Arc<StatusReporter>,
    tabs: Arc<dyn TabHost>,
    housekeeping: Mutex<Option<Housekeeping>>,
}

impl FocusService {
    #[must_use]
    pub fn new(
        config: Config,
        store: Arc<dyn KeyValueStore>,
        tabs: Arc<dyn TabHost>,
        port: Arc<dyn StatusPort>,
    ) -> Self {
        let state = Arc::new(SharedState::new(store.clone()));
        let blacklist = Arc::new(BlacklistRegistry::new(store.clone()));
        let status = Arc::new(StatusReporter::new(port));
        let guard = Arc::new(NavigationGuard::new(
            blacklist.clone(),
            tabs.clone(),
            config.warning_page.clone(),
        ));
        let session = Arc::new(SessionEngine::new(
            state.clone(),
            blacklist.clone(),
            tabs.clone(),
            status.clone(),
            guard,
        ));
        let timer = TimerEngine::new(state.clone(), session.clone(), status.clone());

        Self {
            config,
            store,
            state,
            blacklist,
            session,
            timer,
            status,
            tabs,
            housekeeping: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn session(&self) -> &Arc<SessionEngine> {
        &self.session
    }

    #[must_use]
    pub fn timer(&self) -> &Arc<TimerEngine> {
        &self.timer
    }

    #[must_use]
    pub fn blacklist(&self) -> &Arc<BlacklistRegistry> {
        &self.blacklist
    }

    /// Load the blacklist and engine state from the store
    pub fn hydrate(&self) {
        self.blacklist.hydrate();
        self.state.hydrate();
    }

    /// Pick up where the previous process left off: reattach the guard for an
    /// active focus session and reschedule or expire a running timer.
    pub async fn resume(&self) {
        self.session.resume();
        self.timer.resume().await;
        self.status.refresh(&self.state).await;
    }

    pub fn start_housekeeping(&self) {
        let mut slot = self.housekeeping_slot();
        if slot.is_some() {
            return;
        }
        *slot = Some(Housekeeping::start(
            &self.state,
            &self.status,
            self.config.badge_refresh_interval(),
            self.config.autosave_interval(),
        ));
    }

    fn housekeeping_slot(&self) -> MutexGuard<'_, Option<Housekeeping>> {
        match self.housekeeping.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Decode and handle a raw request object
    pub async fn handle_value(&self, value: Value) -> Response {
        match Request::from_value(value) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                log::warn!("Rejected request: {e}");
                Response::failure(e)
            }
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        log::debug!("Handling {}", request.action());
        match request {
            Request::GetBlacklist => Response::Blacklist {
                blacklist: self.blacklist.list(),
            },
            Request::AddToBlacklist { site } => {
                let success = self.blacklist.add(&site);
                Response::BlacklistUpdate {
                    success,
                    blacklist: self.blacklist.list(),
                }
            }
            Request::RemoveFromBlacklist { site } => {
                let success = self.blacklist.remove(&site);
                Response::BlacklistUpdate {
                    success,
                    blacklist: self.blacklist.list(),
                }
            }
            Request::GetSessionStatus => Response::Status(self.session_status()),
            Request::StartFocus => {
                self.session.start().await;
                Response::done(true)
            }
            Request::StopFocus => {
                self.session.stop().await;
                Response::done(true)
            }
            Request::StartWorkTimer {
                minutes,
                auto_continue,
            } => {
                let minutes = minutes.unwrap_or(self.config.default_work_minutes);
                Response::done(self.timer.start_work(minutes, auto_continue).await)
            }
            Request::StartBreakTimer {
                minutes,
                auto_continue,
            } => {
                let minutes = minutes.unwrap_or(self.config.default_break_minutes);
                Response::done(self.timer.start_break(minutes, auto_continue).await)
            }
            Request::StopTimer => {
                self.timer.stop().await;
                Response::done(true)
            }
            Request::SetAutoContinue { enabled } => {
                self.timer.set_auto_continue(enabled).await;
                Response::done(true)
            }
            Request::GetCurrentTab => self.current_tab().await,
            Request::GetWarningMessage => self.warning_message(),
            Request::SetWarningMessage { message } => self.set_warning_message(message),
        }
    }

    #[must_use]
    pub fn session_status(&self) -> SessionStatus {
        self.state.read(|s| SessionStatus {
            focus_active: s.focus.active,
            timer_active: s.timer.active,
            timer_mode: s.timer.mode,
            timer_end_time: s.timer.end_time,
            timer_duration: s.timer.duration_minutes,
        })
    }

    async fn current_tab(&self) -> Response {
        let tab = match self.tabs.active_tab().await {
            Ok(tab) => tab,
            Err(e) => {
                log::warn!("Failed to query active tab: {e:#}");
                None
            }
        };
        let url = tab.and_then(|t| t.url).unwrap_or_default();
        Response::CurrentTab {
            hostname: hostname_of(&url).unwrap_or_default(),
            url,
        }
    }

    fn warning_message(&self) -> Response {
        match load_json::<String>(self.store.as_ref(), keys::WARNING_MESSAGE) {
            Ok(message) => Response::WarningMessage {
                success: true,
                message,
            },
            Err(e) => {
                log::error!("Failed to read warning message: {e:#}");
                Response::failure(format!("{e:#}"))
            }
        }
    }

    /// Store a custom warning message; an empty or missing one clears it
    fn set_warning_message(&self, message: Option<String>) -> Response {
        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        let result = match &message {
            Some(text) => save_json(self.store.as_ref(), keys::WARNING_MESSAGE, text),
            None => self.store.remove(keys::WARNING_MESSAGE),
        };
        match result {
            Ok(()) => Response::WarningMessage {
                success: true,
                message,
            },
            Err(e) => {
                log::error!("Failed to save warning message: {e:#}");
                Response::failure(format!("{e:#}"))
            }
        }
    }

    /// Deliver a pre-navigation event. Returns whether the tab was redirected.
    pub async fn on_navigation(&self, event: &NavigationEvent) -> bool {
        self.session.on_before_navigate(event).await
    }

    /// Stop background work and flush state. A running timer is left in the
    /// store so the next start resumes it.
    pub fn shutdown(&self) {
        if let Some(mut jobs) = self.housekeeping_slot().take() {
            jobs.shutdown();
        }
        self.timer.suspend();
        self.state.persist();
        log::info!("Focus service stopped");
    }
}
