use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a tab removed when a focus session started
///
/// The browser's tab id is deliberately not kept: it is invalid once the tab
/// is closed, so restoration only needs the URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenTabRecord {
    pub url: String,
    #[serde(default)]
    pub title: String,
}

impl HiddenTabRecord {
    #[must_use]
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
        }
    }
}

/// Focus mode state, persisted under `focusState`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusState {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub hidden_tabs: Vec<HiddenTabRecord>,
}

impl FocusState {
    /// Enforce `hidden_tabs` being empty while inactive.
    ///
    /// Returns the number of records dropped.
    pub fn normalize(&mut self) -> usize {
        if self.active {
            return 0;
        }
        let dropped = self.hidden_tabs.len();
        self.hidden_tabs.clear();
        dropped
    }
}

/// Phase of the interval timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    Work,
    Break,
}

impl TimerMode {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "work",
            Self::Break => "break",
        }
    }
}

impl std::fmt::Display for TimerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interval timer state, persisted under `timerState`
///
/// Instants are epoch milliseconds so the stored layout stays readable by the
/// extension side (`Date.now()` values).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerState {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub mode: Option<TimerMode>,
    #[serde(default, rename = "duration")]
    pub duration_minutes: u32,
    #[serde(default)]
    pub start_time: Option<i64>,
    #[serde(default)]
    pub end_time: Option<i64>,
    #[serde(default)]
    pub auto_continue: bool,
}

impl TimerState {
    /// Build the state of a timer that starts at `now`
    #[must_use]
    pub fn running(mode: TimerMode, minutes: u32, auto_continue: bool, now: DateTime<Utc>) -> Self {
        let start = now.timestamp_millis();
        Self {
            active: true,
            mode: Some(mode),
            duration_minutes: minutes,
            start_time: Some(start),
            end_time: Some(start + i64::from(minutes) * 60_000),
            auto_continue,
        }
    }

    /// Deactivate the timer. Duration, start time and the auto-continue
    /// preference are kept for display.
    pub fn clear(&mut self) {
        self.active = false;
        self.mode = None;
        self.end_time = None;
    }

    /// Enforce `active == false` implying no mode and no end time.
    ///
    /// Returns whether anything had to be corrected.
    pub fn normalize(&mut self) -> bool {
        if self.active && self.mode.is_some() && self.end_time.is_some() {
            return false;
        }
        if !self.active && self.mode.is_none() && self.end_time.is_none() {
            return false;
        }
        self.clear();
        true
    }

    /// Milliseconds left until `end_time`, clamped at zero.
    /// `None` when no timer is running.
    #[must_use]
    pub fn remaining_ms(&self, now: DateTime<Utc>) -> Option<u64> {
        if !self.active {
            return None;
        }
        let end = self.end_time?;
        let left = end.saturating_sub(now.timestamp_millis()).max(0);
        Some(u64::try_from(left).unwrap_or(0))
    }

    /// Remaining time rounded up to whole minutes
    #[must_use]
    pub fn remaining_minutes_ceil(&self, now: DateTime<Utc>) -> Option<u64> {
        self.remaining_ms(now).map(|ms| ms.div_ceil(60_000))
    }
}
