//! Content command errors.

use thiserror::Error;

use crate::guard::GuardError;
use crate::store::StoreError;

use super::model::ContentStatus;

/// Content lifecycle error type.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Malformed input or a transition precondition on the item's fields
    #[error("invalid content: {0}")]
    Validation(String),

    /// No such item, or the caller's organization does not own its domain
    #[error("content not found: {0}")]
    NotFound(String),

    /// The item's status does not allow the requested transition
    #[error("cannot {action} content in status {from}")]
    InvalidTransition {
        from: ContentStatus,
        action: &'static str,
    },

    #[error("content is already published")]
    AlreadyPublished,

    #[error("content is archived")]
    Archived,

    #[error("content already exists: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ContentError {
    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::NotFound(_) => "CONTENT_NOT_FOUND",
            Self::InvalidTransition { .. } => "INVALID_STATUS_TRANSITION",
            Self::AlreadyPublished => "ALREADY_PUBLISHED",
            Self::Archived => "CONTENT_ARCHIVED",
            Self::AlreadyExists(_) => "CONTENT_EXISTS",
            Self::Guard(e) => e.error_code(),
            Self::Store(e) => e.error_code(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

/// Result type for content commands.
pub type ContentResult<T> = Result<T, ContentError>;
