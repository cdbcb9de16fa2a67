//! Request/response contract shared by the extension UI, the native bridge
//! and the local IPC socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabfocus_storage::TimerMode;

use crate::error::{FocusError, Result};

/// One UI request, tagged by its `action` field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Request {
    GetBlacklist,
    AddToBlacklist {
        site: String,
    },
    RemoveFromBlacklist {
        site: String,
    },
    GetSessionStatus,
    StartFocus,
    StopFocus,
    StartWorkTimer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minutes: Option<u32>,
        #[serde(default, rename = "autoContinue")]
        auto_continue: bool,
    },
    StartBreakTimer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minutes: Option<u32>,
        #[serde(default, rename = "autoContinue")]
        auto_continue: bool,
    },
    StopTimer,
    SetAutoContinue {
        enabled: bool,
    },
    GetCurrentTab,
    GetWarningMessage,
    SetWarningMessage {
        #[serde(default)]
        message: Option<String>,
    },
}

impl Request {
    pub const ACTIONS: &'static [&'static str] = &[
        "get_blacklist",
        "add_to_blacklist",
        "remove_from_blacklist",
        "get_session_status",
        "start_focus",
        "stop_focus",
        "start_work_timer",
        "start_break_timer",
        "stop_timer",
        "set_auto_continue",
        "get_current_tab",
        "get_warning_message",
        "set_warning_message",
    ];

    /// Decode a request object.
    ///
    /// # Errors
    ///
    /// `UnknownAction` if `action` is missing or not one of [`Self::ACTIONS`];
    /// `InvalidRequest` if the payload fields do not fit the action.
    pub fn from_value(value: Value) -> Result<Self> {
        let action = value
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if !Self::ACTIONS.contains(&action.as_str()) {
            return Err(FocusError::UnknownAction(action));
        }
        serde_json::from_value(value)
            .map_err(|e| FocusError::InvalidRequest(format!("{action}: {e}")))
    }

    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::GetBlacklist => "get_blacklist",
            Self::AddToBlacklist { .. } => "add_to_blacklist",
            Self::RemoveFromBlacklist { .. } => "remove_from_blacklist",
            Self::GetSessionStatus => "get_session_status",
            Self::StartFocus => "start_focus",
            Self::StopFocus => "stop_focus",
            Self::StartWorkTimer { .. } => "start_work_timer",
            Self::StartBreakTimer { .. } => "start_break_timer",
            Self::StopTimer => "stop_timer",
            Self::SetAutoContinue { .. } => "set_auto_continue",
            Self::GetCurrentTab => "get_current_tab",
            Self::GetWarningMessage => "get_warning_message",
            Self::SetWarningMessage { .. } => "set_warning_message",
        }
    }
}

/// Answer to `get_session_status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub focus_active: bool,
    pub timer_active: bool,
    pub timer_mode: Option<TimerMode>,
    pub timer_end_time: Option<i64>,
    pub timer_duration: u32,
}

/// Plain result object sent back for a [`Request`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Blacklist {
        blacklist: Vec<String>,
    },
    BlacklistUpdate {
        success: bool,
        blacklist: Vec<String>,
    },
    Status(SessionStatus),
    Done {
        success: bool,
    },
    CurrentTab {
        hostname: String,
        url: String,
    },
    WarningMessage {
        success: bool,
        message: Option<String>,
    },
    Failure {
        success: bool,
        error: String,
    },
}

impl Response {
    #[must_use]
    pub fn done(success: bool) -> Self {
        Self::Done { success }
    }

    #[must_use]
    pub fn failure(error: impl std::fmt::Display) -> Self {
        Self::Failure {
            success: false,
            error: error.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_flat_payload() {
        let request = Request::from_value(json!({
            "action": "start_work_timer",
            "minutes": 50,
            "autoContinue": true
        }))
        .unwrap();
        assert_eq!(
            request,
            Request::StartWorkTimer {
                minutes: Some(50),
                auto_continue: true
            }
        );

        let request = Request::from_value(json!({"action": "start_break_timer"})).unwrap();
        assert_eq!(
            request,
            Request::StartBreakTimer {
                minutes: None,
                auto_continue: false
            }
        );
    }

    #[test]
    fn test_unknown_action() {
        let err = Request::from_value(json!({"action": "hide_tabs"})).unwrap_err();
        assert!(matches!(err, FocusError::UnknownAction(ref a) if a == "hide_tabs"));

        let err = Request::from_value(json!({"site": "x.com"})).unwrap_err();
        assert!(matches!(err, FocusError::UnknownAction(_)));
    }

    #[test]
    fn test_invalid_payload() {
        let err = Request::from_value(json!({"action": "add_to_blacklist"})).unwrap_err();
        assert!(matches!(err, FocusError::InvalidRequest(_)));
    }

    #[test]
    fn test_action_names_match_serde_tags() {
        let requests = [
            Request::GetBlacklist,
            Request::StopTimer,
            Request::SetAutoContinue { enabled: true },
            Request::SetWarningMessage { message: None },
        ];
        for request in requests {
            let value = serde_json::to_value(&request).unwrap();
            assert_eq!(value["action"], request.action());
            assert!(Request::ACTIONS.contains(&request.action()));
        }
    }

    #[test]
    fn test_response_shapes() {
        let status = Response::Status(SessionStatus {
            focus_active: true,
            timer_active: true,
            timer_mode: Some(TimerMode::Work),
            timer_end_time: Some(1_700_000_000_000),
            timer_duration: 25,
        });
        assert_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "focusActive": true,
                "timerActive": true,
                "timerMode": "work",
                "timerEndTime": 1_700_000_000_000_i64,
                "timerDuration": 25
            })
        );

        let failure = Response::failure("Unknown action");
        assert_eq!(
            serde_json::to_value(&failure).unwrap(),
            json!({"success": false, "error": "Unknown action"})
        );
    }
}
