use thiserror::Error;

/// Failure of a single completion request.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("stream error: {0}")]
    Stream(String),
    #[error("response contained no message")]
    EmptyResponse,
    #[error("mock backend has no scripted response left")]
    ScriptExhausted,
}

impl BackendError {
    /// Short actionable hint for the operator, if the failure has a common cause.
    pub fn operator_hint(&self) -> Option<&'static str> {
        match self {
            BackendError::Api { status: 401, .. } => Some("Invalid API key."),
            BackendError::Api { status: 429, .. } => Some("Rate limit exceeded. Wait and retry."),
            BackendError::Http(e) if e.is_connect() || e.is_timeout() => {
                Some("Network error. Check your connection.")
            }
            _ => None,
        }
    }
}
