//! Periodic background work owned by the service: badge refresh and
//! autosave. Each job is a [`RepeatingTask`] aborted on drop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::state::SharedState;
use crate::status::StatusReporter;

/// A job run every `period`, starting one period after spawn
pub struct RepeatingTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut job: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticks.tick().await;
            loop {
                ticks.tick().await;
                job().await;
            }
        });
        log::debug!("Started '{name}' every {}s", period.as_secs());
        Self { name, handle }
    }

    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            log::debug!("Cancelled '{}'", self.name);
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Badge refresh while a timer runs, autosave while anything is active
pub struct Housekeeping {
    tasks: Vec<RepeatingTask>,
}

impl Housekeeping {
    #[must_use]
    pub fn start(
        state: &Arc<SharedState>,
        status: &Arc<StatusReporter>,
        badge_every: Duration,
        autosave_every: Duration,
    ) -> Self {
        let badge = {
            let state = state.clone();
            let status = status.clone();
            RepeatingTask::spawn("badge refresh", badge_every, move || {
                let state = state.clone();
                let status = status.clone();
                async move {
                    if state.read(|s| s.timer.active) {
                        status.refresh(&state).await;
                    }
                }
            })
        };

        let autosave = {
            let state = state.clone();
            RepeatingTask::spawn("autosave", autosave_every, move || {
                let state = state.clone();
                async move {
                    if state.read(|s| s.focus.active || s.timer.active) && !state.persist() {
                        log::warn!("Autosave failed");
                    }
                }
            })
        };

        Self {
            tasks: vec![badge, autosave],
        }
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.cancel();
        }
    }
}
