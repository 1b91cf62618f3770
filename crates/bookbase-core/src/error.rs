use thiserror::Error;

use crate::models::BookStatus;

/// All errors that can occur in bookbase-core.
#[derive(Debug, Error)]
pub enum BookbaseError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Book not found: {0}")]
    NotFound(String),

    #[error("Cannot {action} book {id}: it is {status}")]
    InvalidTransition {
        id: String,
        status: BookStatus,
        action: LifecycleAction,
    },

    #[error("Invalid book id: {0}")]
    InvalidId(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

/// The lifecycle transition that was attempted when an
/// [`BookbaseError::InvalidTransition`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Checkout,
    Checkin,
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Checkout => write!(f, "check out"),
            Self::Checkin => write!(f, "check in"),
        }
    }
}

/// Exit codes used by the `bookbase` binary.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success = 0,
    GeneralError = 1,
    NotFound = 2,
    InvalidArgs = 3,
    FileSystemError = 4,
    Conflict = 7,
    ConfirmRequired = 8,
}

impl From<&BookbaseError> for ExitCode {
    fn from(err: &BookbaseError) -> Self {
        match err {
            BookbaseError::NotFound(_) => Self::NotFound,
            BookbaseError::Validation(_) | BookbaseError::InvalidId(_) => Self::InvalidArgs,
            BookbaseError::InvalidTransition { .. } => Self::Conflict,
            BookbaseError::Io(_) => Self::FileSystemError,
            _ => Self::GeneralError,
        }
    }
}

pub type Result<T> = std::result::Result<T, BookbaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_message() {
        let err = BookbaseError::InvalidTransition {
            id: "abc".to_string(),
            status: BookStatus::CheckedOut,
            action: LifecycleAction::Checkout,
        };
        assert_eq!(err.to_string(), "Cannot check out book abc: it is checked-out");
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::from(&BookbaseError::NotFound("x".into())), ExitCode::NotFound);
        assert_eq!(ExitCode::from(&BookbaseError::Validation("x".into())), ExitCode::InvalidArgs);
        assert_eq!(ExitCode::from(&BookbaseError::Config("x".into())), ExitCode::GeneralError);
        assert_eq!(ExitCode::Conflict as i32, 7);
    }
}
