//! Transport-facing error taxonomy.
//!
//! Internal errors from the verifier, guard and content service collapse into
//! seven kinds, each with a fixed HTTP status. Messages are safe to return to
//! callers; infrastructure details are logged here and replaced by a generic
//! message.

use std::time::Duration;

use cms_auth::AuthError;
use cms_core::{ContentError, GuardError, StoreError};
use cms_rbac::{Action, ResourceType};
use thiserror::Error;
use tracing::error;

const INTERNAL_MESSAGE: &str = "an internal error occurred";

/// API error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// Missing, malformed, expired or otherwise invalid credentials
    #[error("{message}")]
    Authentication { code: &'static str, message: String },

    /// Insufficient role or domain not owned
    #[error("{message}")]
    Authorization { code: &'static str, message: String },

    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// Wrong status, duplicate, or a transfer race
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    #[error("rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Storage or configuration failure, already logged
    #[error("{}", INTERNAL_MESSAGE)]
    Infrastructure { code: &'static str },
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authentication { .. } => 401,
            Self::Authorization { .. } => 403,
            Self::Validation { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } => 409,
            Self::RateLimited { .. } => 429,
            Self::Infrastructure { .. } => 500,
        }
    }

    /// Stable machine-readable code.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Authentication { code, .. }
            | Self::Authorization { code, .. }
            | Self::Validation { code, .. }
            | Self::NotFound { code, .. }
            | Self::Conflict { code, .. }
            | Self::Infrastructure { code } => *code,
            Self::RateLimited { .. } => "RATE_LIMITED",
        }
    }

    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::RateLimited {
            retry_after_secs: ceil_secs(retry_after),
        }
    }

    /// The caller's role lacks `action` on `resource`.
    pub fn forbidden(resource: ResourceType, action: Action) -> Self {
        Self::Authorization {
            code: "INSUFFICIENT_ROLE",
            message: format!(
                "role does not permit {} on {}",
                action.as_str(),
                resource.as_str()
            ),
        }
    }

    fn infrastructure(code: &'static str, cause: &dyn std::fmt::Display) -> Self {
        error!(code, error = %cause, "Infrastructure failure");
        Self::Infrastructure { code }
    }
}

/// Whole seconds, rounded up.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        if err.is_server_error() {
            return Self::infrastructure(err.error_code(), &err);
        }
        Self::Authentication {
            code: err.error_code(),
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SerializationConflict => Self::Conflict {
                code: err.error_code(),
                message: "the request conflicted with a concurrent change, retry it".to_string(),
            },
            StoreError::Duplicate(_) => Self::Conflict {
                code: err.error_code(),
                message: "the resource already exists".to_string(),
            },
            other => Self::infrastructure(other.error_code(), &other),
        }
    }
}

impl From<GuardError> for ApiError {
    fn from(err: GuardError) -> Self {
        let code = err.error_code();
        match err {
            GuardError::NotOwned { .. } => Self::Authorization {
                code,
                message: "organization does not own this domain".to_string(),
            },
            GuardError::TransferNotApplied { .. } => Self::Conflict {
                code,
                message: "ownership changed while the transfer was in progress".to_string(),
            },
            GuardError::AlreadyRegistered { .. } => Self::Conflict {
                code,
                message: "domain is already registered".to_string(),
            },
            GuardError::SameOrganization => Self::Validation {
                code,
                message: err.to_string(),
            },
            GuardError::Store(e) => e.into(),
        }
    }
}

impl From<ContentError> for ApiError {
    fn from(err: ContentError) -> Self {
        let code = err.error_code();
        match err {
            ContentError::Validation(_) => Self::Validation {
                code,
                message: err.to_string(),
            },
            ContentError::NotFound(_) => Self::NotFound {
                code,
                message: err.to_string(),
            },
            ContentError::InvalidTransition { .. }
            | ContentError::AlreadyPublished
            | ContentError::Archived
            | ContentError::AlreadyExists(_) => Self::Conflict {
                code,
                message: err.to_string(),
            },
            ContentError::Guard(e) => e.into(),
            ContentError::Store(e) => e.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_auth::VerificationFailure;
    use cms_core::ContentStatus;
    use cms_tenant::{DomainId, OrgId};

    #[test]
    fn test_status_codes() {
        let cases: Vec<(ApiError, u16)> = vec![
            (AuthError::MissingToken.into(), 401),
            (AuthError::VerificationFailed(VerificationFailure::Expired).into(), 401),
            (AuthError::ConfigError("bad".into()).into(), 500),
            (ApiError::forbidden(ResourceType::Domain, Action::Transfer), 403),
            (ContentError::Validation("title is required".into()).into(), 400),
            (ContentError::NotFound("page-0001".into()).into(), 404),
            (ContentError::AlreadyPublished.into(), 409),
            (
                ContentError::InvalidTransition {
                    from: ContentStatus::Scheduled,
                    action: "schedule",
                }
                .into(),
                409,
            ),
            (ApiError::rate_limited(Duration::from_millis(1500)), 429),
            (StoreError::Timeout.into(), 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err:?}");
        }
    }

    #[test]
    fn test_not_owned_is_forbidden_and_sanitized() {
        let err: ApiError = ContentError::Guard(GuardError::NotOwned {
            org_id: OrgId::new("org-internal-17"),
            domain_id: DomainId::new("shop.acme.test"),
        })
        .into();

        assert_eq!(err.status_code(), 403);
        assert_eq!(err.error_code(), "DOMAIN_NOT_OWNED");
        assert!(!err.to_string().contains("org-internal-17"));
    }

    #[test]
    fn test_conflicts_after_retries() {
        let err: ApiError = GuardError::Store(StoreError::SerializationConflict).into();
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.error_code(), "SERIALIZATION_CONFLICT");

        let err: ApiError = GuardError::TransferNotApplied {
            domain_id: DomainId::new("shop.acme.test"),
        }
        .into();
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_infrastructure_message_is_generic() {
        let err: ApiError =
            ContentError::Store(StoreError::Database("relation \"content_items\" is locked".into()))
                .into();
        assert!(err.is_server_error());
        assert_eq!(err.to_string(), INTERNAL_MESSAGE);
        assert_eq!(err.error_code(), "STORE_ERROR");
    }

    #[test]
    fn test_verification_failures_share_message() {
        let expired: ApiError = AuthError::VerificationFailed(VerificationFailure::Expired).into();
        let forged: ApiError =
            AuthError::VerificationFailed(VerificationFailure::BadSignature).into();
        assert_eq!(expired, forged);
    }

    #[test]
    fn test_rate_limited_rounds_up() {
        assert_eq!(
            ApiError::rate_limited(Duration::from_millis(1500)),
            ApiError::RateLimited { retry_after_secs: 2 }
        );
        assert_eq!(ceil_secs(Duration::from_secs(3)), 3);
    }
}
