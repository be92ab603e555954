use thiserror::Error;

/// Caller-supplied input that failed validation. Raised before any write.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid location {value:?}: {reason}")]
    Location { value: String, reason: String },

    #[error("invalid user id {value:?}: {reason}")]
    User { value: String, reason: String },

    #[error("invalid timestamp {value:?}: {reason}")]
    Timestamp { value: String, reason: String },

    #[error("invalid title: {reason}")]
    Title { reason: String },
}

#[derive(Debug, Error)]
pub enum ErnaError {
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ErnaError {
    /// Short, stable error code for logs and operator output.
    pub fn code(&self) -> &'static str {
        match self {
            ErnaError::Config(_) => "CONFIG_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ErnaError>;
