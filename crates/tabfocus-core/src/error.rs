use thiserror::Error;

/// Errors raised by the host plumbing (bridge, protocol, configuration).
///
/// Engine operations never surface these to the UI; they are logged and
/// folded into a `success: false` response.
#[derive(Debug, Error)]
pub enum FocusError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("browser bridge closed")]
    BridgeClosed,

    #[error("browser command '{op}' timed out after {secs}s")]
    Timeout { op: &'static str, secs: u64 },

    #[error("browser rejected '{op}': {message}")]
    Rejected { op: &'static str, message: String },

    #[error("frame of {0} bytes exceeds the allowed size")]
    FrameTooLarge(usize),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = FocusError> = std::result::Result<T, E>;
