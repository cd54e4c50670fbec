// ABOUTME: Error types with structured exit codes for CLI
// ABOUTME: Maps credential, debugger, and API failures to specific exit codes

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("No credential available: {0}")]
    Auth(String),

    #[error("No session stored. Run `jobtrail capture` to grab one from your browser, or `jobtrail set-session <cookie>` to store one manually")]
    NoSession,

    #[error("Session expired or rejected by the identity provider ({status}). Run `jobtrail capture` to refresh it")]
    SessionExpired { status: u16 },

    #[error("Unexpected token response shape (no jwt/token field): {body}")]
    UnexpectedResponse { body: String },

    #[error("Token refresh failed with status {status}: {body}")]
    RefreshFailed { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Browser debugger unreachable: {0}")]
    Debugger(String),

    #[error("In-page evaluation failed: {0}")]
    Evaluate(String),

    #[error("No suitable browser tab found: {0}")]
    TabNotFound(String),

    #[error("Session capture timed out: {0}")]
    CaptureTimeout(String),

    #[error("API error {status} on {endpoint}: {message}")]
    Api {
        endpoint: String,
        status: u16,
        message: String,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Filesystem error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Secret store error: {0}")]
    Store(String),
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Auth(_) => 2,
            Error::Network(_) => 3,
            Error::Api { .. } => 4,
            Error::Parse(_) => 5,
            Error::Io(_) => 6,
            Error::Store(_) => 7,
            Error::NoSession => 8,
            Error::SessionExpired { .. } => 9,
            Error::UnexpectedResponse { .. } | Error::RefreshFailed { .. } => 10,
            Error::Debugger(_) | Error::Evaluate(_) => 11,
            Error::TabNotFound(_) | Error::CaptureTimeout(_) => 12,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
