#![forbid(unsafe_code)]

use thiserror::Error;

/// Failures that abort a single agent's startup or a host operation.
/// Sync anomalies and message-send failures are deliberately NOT here;
/// those are logged and execution continues.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("login for {user} failed with status {status}")]
    LoginFailed { user: String, status: u16 },

    #[error("registration for {user} returned status {status} without an access token")]
    SignupFailed { user: String, status: u16 },

    #[error("response missing expected field `{0}`")]
    MissingField(&'static str),

    #[error("host coordinator has no transport bound yet")]
    TransportUnbound,
}

pub type Result<T> = std::result::Result<T, HarnessError>;
