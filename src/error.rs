//! Client error types.
//!
//! Errors are categorized by where they stop:
//!
//! | Category | Variants | Recovery |
//! |----------|----------|----------|
//! | **Validation** | `Validation` | Fix input; nothing was sent |
//! | **Transport** | `Network`, `Http`, `Decode`, `JobNotFound` | Surface to the user, retry manually |
//! | **Auth** | `AuthenticationFailed` | Re-authenticate |
//! | **Controller** | `Busy`, `InvalidState`, `Cancelled` | Caller misuse or teardown |
//! | **Config** | `Configuration` | Fix configuration |
//!
//! A job that ends `failed` or `cancelled` is not an error: it is a normal
//! terminal state reported through the job record.

use thiserror::Error;

use crate::controller::Phase;

/// Errors raised by the research job client.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DrkrError {
    // ── Local validation (never sent) ────────────────────────────────
    /// Incomplete or malformed local input.
    #[error("Invalid input: {0}")]
    Validation(String),

    // ── Transport ────────────────────────────────────────────────────
    /// The request never produced an HTTP response.
    #[error("Network error: {0}")]
    Network(String),

    /// The backend answered with a non-2xx status.
    #[error("HTTP error with status {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body did not match the expected payload.
    #[error("Unexpected response body: {0}")]
    Decode(String),

    /// The backend does not know the job.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    // ── Auth ─────────────────────────────────────────────────────────
    /// Token acquisition failed or the backend rejected the token.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    // ── Controller ───────────────────────────────────────────────────
    /// Another request of this workflow is still in flight.
    #[error("A request is already in flight ({0})")]
    Busy(Phase),

    /// The operation does not apply in the controller's current phase.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The workflow was cancelled while the request was in flight.
    #[error("Cancelled")]
    Cancelled,

    // ── Config ───────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl DrkrError {
    /// Build an error from a non-2xx status and the response body.
    ///
    /// FastAPI-style `{"detail": "..."}` bodies are unwrapped to the detail
    /// text.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = extract_detail(body).unwrap_or_else(|| body.trim().to_string());
        match status {
            401 | 403 => Self::AuthenticationFailed(message),
            404 => Self::JobNotFound(message),
            _ => Self::Http { status, message },
        }
    }

    /// Returns `true` if the operation may succeed when retried unchanged.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns `true` for failures that happened before anything was sent.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Notification text for the presentation layer.
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { message, .. } if message.is_empty() => format!("Error: {self}"),
            Self::Http { message, .. }
            | Self::Network(message)
            | Self::Decode(message)
            | Self::JobNotFound(message)
            | Self::AuthenticationFailed(message)
            | Self::Validation(message) => format!("Error: {message}"),
            other => format!("Error: {other}"),
        }
    }
}

impl From<reqwest::Error> for DrkrError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status(status.as_u16(), &err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DrkrError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

fn extract_detail(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(detail) => Some(detail.clone()),
        other => Some(other.to_string()),
    }
}

/// Result type for client operations.
pub type DrkrResult<T> = Result<T, DrkrError>;
