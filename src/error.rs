//! Error types for Orbit

use thiserror::Error;

/// Result type alias for Orbit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Shown whenever the Google account has to be (re)connected.
pub const RECONNECT_PROMPT: &str = "You need to connect your Gmail account first using `orbit connect`. Once connected, I can help you with your emails and calendar!";

/// Shown when Google rejects a call for missing scopes.
pub const INSUFFICIENT_PERMISSIONS: &str = "Insufficient permissions. Please disconnect and reconnect your Google account to grant additional permissions.";

/// Errors that can occur in Orbit
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not connected to Gmail")]
    NotConnected,

    #[error("Gmail token expired and no refresh token available")]
    TokenExpiredNoRefresh,

    #[error("Failed to refresh Gmail token: {0}")]
    TokenRefreshFailed(String),

    #[error("Google API error: {status} {body}")]
    Api { status: u16, body: String },

    #[error("Invalid arguments for {tool}: {reason}")]
    ToolValidation { tool: String, reason: String },

    #[error("{0}")]
    ToolExecution(String),

    #[error("No emails found")]
    NoEmailsFound,

    #[error("Invalid message ID provided. Please specify a valid email message ID.")]
    InvalidMessageId,

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Tool call {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: String,
        from: &'static str,
        to: &'static str,
    },

    #[error("Tool call id {0} already exists in this conversation")]
    DuplicateToolCallId(String),

    #[error("Waiting for a decision on {} tool call(s)", .0.len())]
    AwaitingConfirmation(Vec<String>),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("OAuth error: {0}")]
    OAuth(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Authentication failures: the user has to reconnect.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Error::NotConnected
                | Error::TokenExpiredNoRefresh
                | Error::TokenRefreshFailed(_)
                | Error::Api { status: 401, .. }
        )
    }

    /// Scope failures: the user has to re-grant permissions.
    pub fn is_permission(&self) -> bool {
        match self {
            Error::Api { status: 403, .. } => true,
            Error::Api { body, .. } => body.to_ascii_lowercase().contains("insufficient scope"),
            _ => false,
        }
    }

    /// User-facing guidance for auth and permission failures, `None` otherwise.
    pub fn user_guidance(&self) -> Option<String> {
        if self.is_auth() {
            Some(RECONNECT_PROMPT.to_string())
        } else if self.is_permission() {
            Some(format!("❌ {}", INSUFFICIENT_PERMISSIONS))
        } else {
            None
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
