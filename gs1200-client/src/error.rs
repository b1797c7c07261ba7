use thiserror::Error;

use crate::script::ScriptError;

/// Why the switch rejected a login that it answered with HTTP 200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Another browser session currently holds the single admin slot.
    AlreadyLoggedIn,
    /// The password (or its obfuscated form) was not accepted.
    WrongPassword,
}

impl std::fmt::Display for AuthFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthFailure::AlreadyLoggedIn => write!(f, "another user is already logged in"),
            AuthFailure::WrongPassword => write!(f, "incorrect password"),
        }
    }
}

/// Errors raised while turning raw page variables into the data model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("{what} has {len} entries, index {index} is out of range")]
    IndexOutOfRange {
        what: String,
        index: usize,
        len: usize,
    },

    #[error("VLAN {vlan}: invalid port mask {value:?}")]
    InvalidMask { vlan: String, value: String },

    #[error("{port}: traffic counter column {column} is not a number")]
    NonNumericStat { port: String, column: usize },

    #[error("Max_port must not be negative, got {0}")]
    NegativePortCount(i64),
}

/// Errors that abort a scrape.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Login rejected: {0}")]
    Auth(AuthFailure),

    #[error("Failed to fetch {path}: {reason}")]
    Fetch { path: String, reason: String },

    #[error("Script error: {0}")]
    Parse(#[from] ScriptError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Invalid device address: {0}")]
    InvalidAddress(String),
}

impl CollectError {
    /// Whether the session client already issued its own logout for this error.
    pub(crate) fn session_released(&self) -> bool {
        matches!(
            self,
            CollectError::Transport(_) | CollectError::Auth(_) | CollectError::Fetch { .. }
        )
    }
}

/// Result type alias using [`CollectError`].
pub type Result<T> = std::result::Result<T, CollectError>;
