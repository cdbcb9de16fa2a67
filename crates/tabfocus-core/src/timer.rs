//! Timer engine: work/break countdown with a single deferred wake-up.
//!
//! At most one wake-up task exists at a time. Every scheduled task carries a
//! generation number; a task only acts if it still owns the slot when it gets
//! the operation lock, so a wake-up racing a manual stop is a no-op.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tabfocus_storage::{TimerMode, TimerState};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use crate::session::SessionEngine;
use crate::state::SharedState;
use crate::status::StatusReporter;

/// Work length used when a break auto-continues
pub const AUTO_WORK_MINUTES: u32 = 25;
/// Break length used when a work session auto-continues
pub const AUTO_BREAK_MINUTES: u32 = 5;
/// Delay between expiry and the auto-continued phase
pub const AUTO_CONTINUE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeupKind {
    Expiry,
    AutoContinue { was_work: bool },
}

struct Wakeup {
    generation: u64,
    kind: WakeupKind,
    handle: JoinHandle<()>,
}

pub struct TimerEngine {
    state: Arc<SharedState>,
    session: Arc<SessionEngine>,
    status: Arc<StatusReporter>,
    wakeup: Mutex<Option<Wakeup>>,
    generation: AtomicU64,
    op_lock: AsyncMutex<()>,
    this: Weak<TimerEngine>,
}

impl TimerEngine {
    #[must_use]
    pub fn new(
        state: Arc<SharedState>,
        session: Arc<SessionEngine>,
        status: Arc<StatusReporter>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            state,
            session,
            status,
            wakeup: Mutex::new(None),
            generation: AtomicU64::new(0),
            op_lock: AsyncMutex::new(()),
            this: this.clone(),
        })
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.read(|s| s.timer.active)
    }

    #[must_use]
    pub fn timer_state(&self) -> TimerState {
        self.state.read(|s| s.timer.clone())
    }

    /// Kind of the wake-up currently scheduled, if any
    #[must_use]
    pub fn pending_wakeup(&self) -> Option<WakeupKind> {
        self.slot().as_ref().map(|w| w.kind)
    }

    fn slot(&self) -> MutexGuard<'_, Option<Wakeup>> {
        match self.wakeup.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Start a work phase, entering focus mode. Any running timer is stopped
    /// first. Returns `false` for a zero-length phase.
    pub async fn start_work(&self, minutes: u32, auto_continue: bool) -> bool {
        let _op = self.op_lock.lock().await;
        self.start_work_locked(minutes, auto_continue).await
    }

    /// Start a break phase, leaving focus mode if it is active
    pub async fn start_break(&self, minutes: u32, auto_continue: bool) -> bool {
        let _op = self.op_lock.lock().await;
        self.start_break_locked(minutes, auto_continue).await
    }

    async fn start_work_locked(&self, minutes: u32, auto_continue: bool) -> bool {
        if minutes == 0 {
            log::warn!("Refusing to start a zero-minute work timer");
            return false;
        }
        self.stop_locked().await;

        self.install(TimerMode::Work, minutes, auto_continue);
        self.session.start().await;
        self.schedule(WakeupKind::Expiry, minutes_to_duration(u64::from(minutes)));
        self.status.refresh(&self.state).await;
        self.status
            .notify("Work Session Started", format!("Focus for {minutes} minutes"))
            .await;

        log::info!("Work timer started: {minutes} min (auto-continue: {auto_continue})");
        true
    }

    async fn start_break_locked(&self, minutes: u32, auto_continue: bool) -> bool {
        if minutes == 0 {
            log::warn!("Refusing to start a zero-minute break timer");
            return false;
        }
        self.stop_locked().await;

        self.install(TimerMode::Break, minutes, auto_continue);
        if self.session.is_active() {
            self.session.stop().await;
        }
        self.schedule(WakeupKind::Expiry, minutes_to_duration(u64::from(minutes)));
        self.status.refresh(&self.state).await;
        self.status
            .notify("Break Started", format!("Relax for {minutes} minutes"))
            .await;

        log::info!("Break timer started: {minutes} min (auto-continue: {auto_continue})");
        true
    }

    fn install(&self, mode: TimerMode, minutes: u32, auto_continue: bool) {
        self.state
            .update(|s| s.timer = TimerState::running(mode, minutes, auto_continue, Utc::now()));
        self.state.persist();
    }

    /// Stop the running timer. Focus mode is left as it is. A pending
    /// auto-continue is cancelled too. Returns whether a timer was running.
    pub async fn stop(&self) -> bool {
        let _op = self.op_lock.lock().await;
        self.stop_locked().await
    }

    async fn stop_locked(&self) -> bool {
        self.cancel_wakeup();
        if !self.is_active() {
            return false;
        }

        self.state.update(|s| s.timer.clear());
        self.state.persist();
        self.status.refresh(&self.state).await;
        log::info!("Timer stopped");
        true
    }

    /// Expire the running timer now. No-op if no timer is running.
    pub async fn on_expire(&self) -> bool {
        let _op = self.op_lock.lock().await;
        if !self.is_active() {
            log::debug!("Expiry with no running timer ignored");
            return false;
        }
        self.cancel_wakeup();
        self.expire_locked().await;
        true
    }

    async fn expire_locked(&self) {
        let (was_work, auto) = self.state.update(|s| {
            let was_work = s.timer.mode == Some(TimerMode::Work);
            let auto = s.timer.auto_continue;
            s.timer.clear();
            (was_work, auto)
        });
        self.state.persist();
        self.status.refresh(&self.state).await;

        if was_work {
            self.status
                .notify("Work Session Complete", "Time for a break!")
                .await;
        } else {
            self.status.notify("Break Over", "Time to focus!").await;
        }
        log::info!(
            "{} timer expired",
            if was_work { TimerMode::Work } else { TimerMode::Break }
        );

        if auto {
            self.schedule(WakeupKind::AutoContinue { was_work }, AUTO_CONTINUE_GRACE);
        }
    }

    /// Reschedule a timer found running in the store after a restart.
    ///
    /// The wake-up is set for the remaining time rounded up to whole minutes.
    /// A timer whose end already passed expires immediately.
    pub async fn resume(&self) {
        let _op = self.op_lock.lock().await;
        let timer = self.timer_state();
        if !timer.active {
            return;
        }

        match timer.remaining_ms(Utc::now()) {
            Some(ms) if ms > 0 => {
                let minutes = ms.div_ceil(60_000);
                let mode = timer.mode.map_or("unknown", |m| m.as_str());
                log::info!("Resuming {mode} timer, {minutes} min left");
                if timer.mode == Some(TimerMode::Work) && !self.session.is_active() {
                    self.session.start().await;
                }
                self.schedule(WakeupKind::Expiry, minutes_to_duration(minutes));
                self.status.refresh(&self.state).await;
            }
            _ => {
                log::info!("Stored timer ended while the host was down, expiring now");
                self.expire_locked().await;
            }
        }
    }

    /// Change the auto-continue preference of the current (or next) timer
    pub async fn set_auto_continue(&self, enabled: bool) {
        let _op = self.op_lock.lock().await;
        self.state.update(|s| s.timer.auto_continue = enabled);
        self.state.persist();
        log::info!("Auto-continue {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Drop the pending wake-up without touching state, so that the timer
    /// resumes on the next start
    pub fn suspend(&self) {
        if let Some(wakeup) = self.slot().take() {
            wakeup.handle.abort();
            log::debug!("Pending {:?} wake-up suspended", wakeup.kind);
        }
    }

    fn schedule(&self, kind: WakeupKind, delay: Duration) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let this = self.this.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(engine) = this.upgrade() {
                engine.fire(generation, kind).await;
            }
        });

        let previous = self.slot().replace(Wakeup {
            generation,
            kind,
            handle,
        });
        if let Some(previous) = previous {
            previous.handle.abort();
        }
        log::debug!("Scheduled {kind:?} wake-up in {}s", delay.as_secs());
    }

    fn cancel_wakeup(&self) {
        if let Some(wakeup) = self.slot().take() {
            wakeup.handle.abort();
            log::debug!("Cancelled {:?} wake-up", wakeup.kind);
        }
    }

    /// Take the slot if it still belongs to `generation`. The handle is not
    /// aborted: it is the task calling this.
    fn claim(&self, generation: u64) -> bool {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|w| w.generation == generation) {
            slot.take();
            true
        } else {
            false
        }
    }

    async fn fire(&self, generation: u64, kind: WakeupKind) {
        let _op = self.op_lock.lock().await;
        if !self.claim(generation) {
            log::debug!("Stale {kind:?} wake-up ignored");
            return;
        }

        match kind {
            WakeupKind::Expiry => {
                if self.is_active() {
                    self.expire_locked().await;
                }
            }
            WakeupKind::AutoContinue { was_work: true } => {
                self.start_break_locked(AUTO_BREAK_MINUTES, true).await;
            }
            WakeupKind::AutoContinue { was_work: false } => {
                self.start_work_locked(AUTO_WORK_MINUTES, true).await;
            }
        }
    }
}

fn minutes_to_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}
