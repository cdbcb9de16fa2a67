//! Badge and notification output driven by engine state changes.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tabfocus_storage::TimerMode;

use crate::browser::{Badge, Notification, StatusPort};
use crate::state::{EngineState, SharedState};

pub const WORK_COLOR: &str = "#4CAF50";
pub const BREAK_COLOR: &str = "#2196F3";
pub const FOCUS_COLOR: &str = "#FF9800";

/// Badge for the given state: a running timer shows its remaining minutes,
/// otherwise active focus mode shows `ON`, otherwise the badge is cleared.
#[must_use]
pub fn compute_badge(state: &EngineState, now: DateTime<Utc>) -> Badge {
    if let Some(minutes) = state.timer.remaining_minutes_ceil(now) {
        let color = match state.timer.mode {
            Some(TimerMode::Break) => BREAK_COLOR,
            _ => WORK_COLOR,
        };
        return Badge {
            text: minutes.to_string(),
            color: Some(color.to_string()),
        };
    }
    if state.focus.active {
        return Badge {
            text: "ON".to_string(),
            color: Some(FOCUS_COLOR.to_string()),
        };
    }
    Badge::default()
}

/// Pushes state changes to the [`StatusPort`]. Port failures are logged and
/// never reach the engines.
pub struct StatusReporter {
    port: Arc<dyn StatusPort>,
}

impl StatusReporter {
    #[must_use]
    pub fn new(port: Arc<dyn StatusPort>) -> Self {
        Self { port }
    }

    pub async fn refresh(&self, state: &SharedState) {
        let badge = compute_badge(&state.snapshot(), Utc::now());
        if let Err(e) = self.port.set_badge(&badge).await {
            log::warn!("Failed to update badge: {e:#}");
        }
    }

    pub async fn notify(&self, title: &str, message: impl Into<String>) {
        let notification = Notification::new(title, message);
        if let Err(e) = self.port.notify(&notification).await {
            log::warn!("Failed to show notification '{title}': {e:#}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tabfocus_storage::TimerState;

    fn at(minute: u32, second: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, minute, second).unwrap()
    }

    #[test]
    fn test_badge_idle() {
        assert_eq!(compute_badge(&EngineState::default(), at(0, 0)), Badge::default());
    }

    #[test]
    fn test_badge_focus_only() {
        let mut state = EngineState::default();
        state.focus.active = true;
        let badge = compute_badge(&state, at(0, 0));
        assert_eq!(badge.text, "ON");
        assert_eq!(badge.color.as_deref(), Some(FOCUS_COLOR));
    }

    #[test]
    fn test_badge_timer_wins_over_focus() {
        let mut state = EngineState::default();
        state.focus.active = true;
        state.timer = TimerState::running(TimerMode::Work, 25, false, at(0, 0));

        let badge = compute_badge(&state, at(0, 30));
        assert_eq!(badge.text, "25");
        assert_eq!(badge.color.as_deref(), Some(WORK_COLOR));

        let badge = compute_badge(&state, at(24, 1));
        assert_eq!(badge.text, "1");
    }

    #[test]
    fn test_badge_break_color_and_clamp() {
        let mut state = EngineState::default();
        state.timer = TimerState::running(TimerMode::Break, 5, false, at(0, 0));
        let badge = compute_badge(&state, at(10, 0));
        assert_eq!(badge.text, "0");
        assert_eq!(badge.color.as_deref(), Some(BREAK_COLOR));
    }
}
