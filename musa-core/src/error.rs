//! Error types for musa-core

use thiserror::Error;

/// Main error type for the musa-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Local store error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// No auth token is held for an operation that needs one
    #[error("not signed in")]
    Unauthorized,

    /// Guest analysis limit reached; the user has to sign up
    #[error("guest analysis limit reached")]
    LimitReached,

    /// Client-side validation failed before any network call
    #[error("validation error: {0}")]
    Validation(String),

    /// Transport-level failure talking to the backend
    #[error("HTTP request failed: {0}")]
    Transport(String),

    /// Backend answered with a non-success status
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    /// Backend answered with a body we could not decode
    #[error("failed to parse response: {0}")]
    Decode(String),

    /// Task not present on the board
    #[error("task not found: {0}")]
    TaskNotFound(i64),

    /// A completion request for this task is already running
    #[error("task {0} is already being completed")]
    CompletionInFlight(i64),
}

/// Result type alias for musa-core
pub type Result<T> = std::result::Result<T, Error>;

/// How an error is presented to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing or expired token; always send the user to sign in
    Authorization,
    /// Guest usage cap; open the sign-up prompt instead of an error banner
    RateLimit,
    /// Backend or network failure, shown inline, never retried
    Network,
    /// Rejected locally before any request was made
    Validation,
    /// Local failures (store, config, IO)
    Internal,
}

impl Error {
    /// Classify this error for presentation.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Unauthorized => ErrorClass::Authorization,
            Error::Api { status, .. } if *status == 401 || *status == 403 => {
                ErrorClass::Authorization
            }
            Error::LimitReached => ErrorClass::RateLimit,
            Error::Validation(_) | Error::TaskNotFound(_) | Error::CompletionInFlight(_) => {
                ErrorClass::Validation
            }
            Error::Transport(_) | Error::Api { .. } | Error::Decode(_) => ErrorClass::Network,
            Error::Database(_) | Error::Io(_) | Error::Config(_) => {
                ErrorClass::Internal
            }
        }
    }

    /// The string shown to the user at the front-end boundary.
    pub fn user_message(&self) -> String {
        if let Error::Validation(message) = self {
            return message.clone();
        }
        match self.class() {
            ErrorClass::Authorization => "Please sign in to continue.".to_string(),
            ErrorClass::RateLimit => {
                "You have used all free analyses. Sign up to keep going.".to_string()
            }
            ErrorClass::Validation => self.to_string(),
            ErrorClass::Network => "Something went wrong. Please try again.".to_string(),
            ErrorClass::Internal => format!("Local error: {}", self),
        }
    }
}
