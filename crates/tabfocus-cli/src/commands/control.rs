//! Commands that drive a running host over the control socket
use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tabfocus_core::{ipc::IpcClient, Config, Request, SessionStatus};
use tabfocus_storage::TimerState;

use crate::{BlacklistAction, Commands, FocusAction, TimerAction, Toggle};

pub async fn run(config: &Config, command: Commands) -> Result<()> {
    let request = request_for(command)?;
    let sock_path = config.socket_path()?;
    let client = IpcClient::new(&sock_path);

    let response = client.send_command(&request).await.map_err(|e| {
        log::debug!("Control request failed: {e:#}");
        anyhow::anyhow!("Host is not running (start the browser or `tabfocus host --headless`)")
    })?;

    if response.get("success") == Some(&Value::Bool(false)) {
        if let Some(error) = response.get("error").and_then(Value::as_str) {
            bail!("Host refused {}: {error}", request.action());
        }
    }

    println!("{}", describe(&request, &response, Utc::now()));
    Ok(())
}

fn request_for(command: Commands) -> Result<Request> {
    let request = match command {
        Commands::Status => Request::GetSessionStatus,
        Commands::Focus { action } => match action {
            FocusAction::Start => Request::StartFocus,
            FocusAction::Stop => Request::StopFocus,
        },
        Commands::Timer { action } => match action {
            TimerAction::Work { minutes, auto } => Request::StartWorkTimer {
                minutes,
                auto_continue: auto,
            },
            TimerAction::Break { minutes, auto } => Request::StartBreakTimer {
                minutes,
                auto_continue: auto,
            },
            TimerAction::Stop => Request::StopTimer,
        },
        Commands::Blacklist { action } => match action {
            BlacklistAction::List => Request::GetBlacklist,
            BlacklistAction::Add { site } => Request::AddToBlacklist { site },
            BlacklistAction::Remove { site } => Request::RemoveFromBlacklist { site },
        },
        Commands::AutoContinue { state } => Request::SetAutoContinue {
            enabled: state == Toggle::On,
        },
        Commands::WarningMessage { text: None, clear: false } => Request::GetWarningMessage,
        Commands::WarningMessage { text, .. } => Request::SetWarningMessage { message: text },
        Commands::Host { .. } | Commands::Manifest { .. } => {
            bail!("not a control command")
        }
    };
    Ok(request)
}

fn succeeded(response: &Value) -> bool {
    response.get("success").and_then(Value::as_bool).unwrap_or(false)
}

fn describe(request: &Request, response: &Value, now: DateTime<Utc>) -> String {
    match request {
        Request::GetSessionStatus => match serde_json::from_value::<SessionStatus>(response.clone()) {
            Ok(status) => format_status(&status, now),
            Err(_) => response.to_string(),
        },
        Request::GetBlacklist => {
            let entries: Vec<&str> = response["blacklist"]
                .as_array()
                .map(|a| a.iter().filter_map(Value::as_str).collect())
                .unwrap_or_default();
            if entries.is_empty() {
                "Blacklist is empty.".to_string()
            } else {
                entries.join("\n")
            }
        }
        Request::AddToBlacklist { site } => {
            if succeeded(response) {
                format!("Blocked {site}")
            } else {
                format!("{site} is already blocked or invalid")
            }
        }
        Request::RemoveFromBlacklist { site } => {
            if succeeded(response) {
                format!("Unblocked {site}")
            } else {
                format!("{site} was not in the blacklist")
            }
        }
        Request::StartWorkTimer { .. } | Request::StartBreakTimer { .. } if !succeeded(response) => {
            "Timer not started: duration must be at least one minute".to_string()
        }
        Request::GetWarningMessage | Request::SetWarningMessage { .. } => {
            match response["message"].as_str() {
                Some(message) => message.to_string(),
                None => "No custom warning message.".to_string(),
            }
        }
        _ => "OK".to_string(),
    }
}

fn format_status(status: &SessionStatus, now: DateTime<Utc>) -> String {
    let focus = if status.focus_active { "on" } else { "off" };
    let timer = match (status.timer_active, status.timer_mode, status.timer_end_time) {
        (true, Some(mode), Some(end)) => {
            let running = TimerState {
                active: true,
                mode: Some(mode),
                end_time: Some(end),
                ..TimerState::default()
            };
            let left_min = running.remaining_minutes_ceil(now).unwrap_or(0);
            format!(
                "{mode}, {left_min} min left of {}",
                status.timer_duration
            )
        }
        _ => "stopped".to_string(),
    };
    format!("Focus mode: {focus}\nTimer: {timer}")
}
