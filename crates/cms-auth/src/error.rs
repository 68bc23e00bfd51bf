//! Error types for token verification
//!
//! Every failure carries a stable machine code and a classification used for
//! audit. The classification says *which check* failed; it never carries
//! token bytes or library-internal error text.

use thiserror::Error;

/// Why a structurally valid token failed verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VerificationFailure {
    /// `exp` is in the past (beyond leeway)
    Expired,
    /// Signature did not verify under any configured key, or wrong algorithm
    BadSignature,
    /// `iss` does not match the configured issuer
    InvalidIssuer,
    /// `aud` does not intersect the configured audience
    InvalidAudience,
    /// `nbf` is in the future (beyond leeway)
    NotYetValid,
    /// Claims could not be decoded or carry an unknown value
    Malformed,
}

impl VerificationFailure {
    /// Audit classification label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::BadSignature => "bad_signature",
            Self::InvalidIssuer => "invalid_issuer",
            Self::InvalidAudience => "invalid_audience",
            Self::NotYetValid => "not_yet_valid",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for VerificationFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication error types.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No Authorization header, or an empty one
    #[error("Missing bearer token")]
    MissingToken,

    /// Header is not `Bearer <three-segment token>`
    #[error("Invalid authorization header format")]
    InvalidFormat,

    /// Signature, issuer, audience, or time checks failed
    ///
    /// The display text is identical for every failure kind so callers cannot
    /// tell them apart.
    #[error("Token verification failed")]
    VerificationFailed(VerificationFailure),

    /// Token is missing a required claim
    #[error("Missing required claim: {0}")]
    MissingClaim(&'static str),

    /// `bound_org_id` is present and differs from `org_id`
    #[error("Token is not valid for this organization")]
    OrgBindingMismatch,

    /// Verifier misconfiguration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl AuthError {
    /// Check if this error should be logged at error level.
    ///
    /// Rejected credentials are expected traffic, not server faults.
    pub fn is_server_error(&self) -> bool {
        matches!(self, AuthError::ConfigError(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthError::MissingToken
            | AuthError::InvalidFormat
            | AuthError::VerificationFailed(_)
            | AuthError::MissingClaim(_)
            | AuthError::OrgBindingMismatch => 401,

            AuthError::ConfigError(_) => 500,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "MISSING_TOKEN",
            AuthError::InvalidFormat => "INVALID_FORMAT",
            AuthError::VerificationFailed(_) => "VERIFICATION_FAILED",
            AuthError::MissingClaim(_) => "MISSING_CLAIM",
            AuthError::OrgBindingMismatch => "ORG_BINDING_MISMATCH",
            AuthError::ConfigError(_) => "CONFIG_ERROR",
        }
    }

    /// Audit classification for this failure.
    pub fn classification(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "missing_token",
            AuthError::InvalidFormat => "invalid_format",
            AuthError::VerificationFailed(kind) => kind.as_str(),
            AuthError::MissingClaim(_) => "missing_claim",
            AuthError::OrgBindingMismatch => "org_binding_mismatch",
            AuthError::ConfigError(_) => "config_error",
        }
    }
}

impl From<VerificationFailure> for AuthError {
    fn from(kind: VerificationFailure) -> Self {
        AuthError::VerificationFailed(kind)
    }
}
