//! Naming error types

use thiserror::Error;

/// Errors raised while building or parsing identifiers and patterns
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NamingError {
    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

impl NamingError {
    pub fn invalid_identifier(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Replace the offending text, keeping the reason
    pub(crate) fn with_subject(self, subject: &str) -> Self {
        match self {
            Self::InvalidIdentifier { reason, .. } => Self::invalid_identifier(subject, reason),
            Self::InvalidPattern { reason, .. } => Self::invalid_pattern(subject, reason),
        }
    }
}

/// Result type for naming operations
pub type Result<T> = std::result::Result<T, NamingError>;
