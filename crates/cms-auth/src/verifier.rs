//! Bearer token verification
//!
//! Turns a raw Authorization header into an [`AuthContext`] or a typed
//! [`AuthError`]. The order of checks is fixed:
//!
//! 1. `Bearer ` prefix (constant time)
//! 2. three-segment token shape, before any cryptographic work
//! 3. signature under the primary key, then the secondary key on a signature
//!    mismatch, with one symmetric algorithm, issuer, audience, and bounded skew
//! 4. mandatory `exp`, `sub`, and `org_id`
//! 5. `bound_org_id == org_id` (constant time) when a binding is present
//!
//! Every outcome is handed to the configured [`AuditSink`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use cms_limits::{CacheConfig, CacheStats, Sweep, TtlCache};
use cms_tenant::{OrgId, TenantRole};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::audit::{AuditOutcome, AuditSink, AuthAuditEvent, TracingAuditSink};
use crate::claims::TokenClaims;
use crate::constant_time::{constant_time_str_eq, strip_bearer};
use crate::context::{AuthContext, RequestMetadata};
use crate::error::{AuthError, AuthResult, VerificationFailure};

/// Minimum HMAC secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

static TOKEN_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$").expect("valid token shape regex")
});

/// Supported JWT algorithms. Exactly one is accepted per verifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum JwtAlgorithm {
    /// HMAC using SHA-256
    #[default]
    HS256,
    /// HMAC using SHA-384
    HS384,
    /// HMAC using SHA-512
    HS512,
}

impl JwtAlgorithm {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "HS256" => Some(Self::HS256),
            "HS384" => Some(Self::HS384),
            "HS512" => Some(Self::HS512),
            _ => None,
        }
    }
}

impl From<JwtAlgorithm> for Algorithm {
    fn from(alg: JwtAlgorithm) -> Self {
        match alg {
            JwtAlgorithm::HS256 => Algorithm::HS256,
            JwtAlgorithm::HS384 => Algorithm::HS384,
            JwtAlgorithm::HS512 => Algorithm::HS512,
        }
    }
}

/// Token verifier configuration.
#[derive(Clone)]
pub struct VerifierConfig {
    /// Current signing secret
    pub primary_secret: String,

    /// Previous signing secret, accepted during key rotation
    pub secondary_secret: Option<String>,

    /// Accepted algorithm
    pub algorithm: JwtAlgorithm,

    /// Expected `iss`
    pub issuer: String,

    /// Accepted `aud` values
    pub audience: Vec<String>,

    /// Clock-skew tolerance for `exp` and `nbf`
    pub leeway: Duration,
}

impl std::fmt::Debug for VerifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierConfig")
            .field("primary_secret", &"[REDACTED]")
            .field(
                "secondary_secret",
                &self.secondary_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("algorithm", &self.algorithm)
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl VerifierConfig {
    /// Config with one secret and the default 30s leeway.
    pub fn new(
        primary_secret: impl Into<String>,
        issuer: impl Into<String>,
        audience: impl Into<String>,
    ) -> Self {
        Self {
            primary_secret: primary_secret.into(),
            secondary_secret: None,
            algorithm: JwtAlgorithm::HS256,
            issuer: issuer.into(),
            audience: vec![audience.into()],
            leeway: Duration::from_secs(30),
        }
    }

    pub fn with_secondary_secret(mut self, secret: impl Into<String>) -> Self {
        self.secondary_secret = Some(secret.into());
        self
    }

    pub fn with_algorithm(mut self, algorithm: JwtAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }

    /// Reject weak secrets and empty issuer/audience.
    pub fn validate(&self) -> AuthResult<()> {
        if self.primary_secret.len() < MIN_SECRET_LEN {
            return Err(AuthError::ConfigError(format!(
                "primary secret must be at least {MIN_SECRET_LEN} bytes"
            )));
        }
        if let Some(secondary) = &self.secondary_secret {
            if secondary.len() < MIN_SECRET_LEN {
                return Err(AuthError::ConfigError(format!(
                    "secondary secret must be at least {MIN_SECRET_LEN} bytes"
                )));
            }
        }
        if self.issuer.trim().is_empty() {
            return Err(AuthError::ConfigError("issuer must be set".to_string()));
        }
        if self.audience.iter().all(|aud| aud.trim().is_empty()) {
            return Err(AuthError::ConfigError("audience must be set".to_string()));
        }
        Ok(())
    }
}

/// Identity facts memoised per verified token.
#[derive(Debug, Clone)]
struct VerifiedIdentity {
    user_id: String,
    org_id: OrgId,
    roles: Vec<TenantRole>,
    session_id: Option<String>,
}

impl VerifiedIdentity {
    fn into_context(self, request_id: &str) -> AuthContext {
        AuthContext {
            user_id: self.user_id,
            org_id: self.org_id,
            roles: self.roles,
            session_id: self.session_id,
            request_id: request_id.to_string(),
        }
    }
}

/// Verifies bearer tokens issued by the external identity provider.
pub struct TokenVerifier {
    config: VerifierConfig,
    primary_key: DecodingKey,
    secondary_key: Option<DecodingKey>,
    validation: Validation,
    cache: Option<TtlCache<String, VerifiedIdentity>>,
    audit: Arc<dyn AuditSink>,
}

impl Sweep for TokenVerifier {
    fn sweep(&self) -> usize {
        self.purge_expired()
    }
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("config", &self.config)
            .field("primary_key", &"[REDACTED]")
            .field("secondary_key", &self.secondary_key.as_ref().map(|_| "[REDACTED]"))
            .field("token_cache", &self.cache.is_some())
            .finish()
    }
}

impl TokenVerifier {
    /// Create a verifier that audits to the tracing sink.
    pub fn new(config: VerifierConfig) -> AuthResult<Self> {
        config.validate()?;

        let mut validation = Validation::new(config.algorithm.into());
        validation.leeway = config.leeway.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&config.audience);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let primary_key = DecodingKey::from_secret(config.primary_secret.as_bytes());
        let secondary_key = config
            .secondary_secret
            .as_ref()
            .map(|secret| DecodingKey::from_secret(secret.as_bytes()));

        Ok(Self {
            config,
            primary_key,
            secondary_key,
            validation,
            cache: None,
            audit: Arc::new(TracingAuditSink),
        })
    }

    /// Replace the audit sink.
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = sink;
        self
    }

    /// Memoise verified tokens.
    ///
    /// Entries are keyed by the SHA-256 digest of the token and never outlive
    /// the token's own expiry.
    pub fn with_token_cache(mut self, config: CacheConfig) -> Self {
        self.cache = Some(TtlCache::new(config));
        self
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(TtlCache::stats)
    }

    /// Drop expired cache entries.
    pub fn purge_expired(&self) -> usize {
        self.cache.as_ref().map_or(0, TtlCache::cleanup)
    }

    /// Verify the request's bearer token.
    pub fn verify(&self, meta: &RequestMetadata) -> AuthResult<AuthContext> {
        match self.verify_header(meta.authorization.as_deref()) {
            Ok((identity, cached)) => {
                let ctx = identity.into_context(&meta.request_id);
                self.audit.record(AuthAuditEvent {
                    outcome: AuditOutcome::Success,
                    classification: None,
                    client_ip: meta.client_ip,
                    user_agent: meta.user_agent.clone(),
                    request_id: meta.request_id.clone(),
                    user_id: Some(ctx.user_id.clone()),
                    org_id: Some(ctx.org_id.clone()),
                    cached,
                    occurred_at: Utc::now(),
                });
                Ok(ctx)
            }
            Err(err) => {
                self.audit.record(AuthAuditEvent {
                    outcome: AuditOutcome::Failure,
                    classification: Some(err.classification()),
                    client_ip: meta.client_ip,
                    user_agent: meta.user_agent.clone(),
                    request_id: meta.request_id.clone(),
                    user_id: None,
                    org_id: None,
                    cached: false,
                    occurred_at: Utc::now(),
                });
                Err(err)
            }
        }
    }

    /// Verify when a token is presented, degrading to anonymous otherwise.
    ///
    /// An absent header is anonymous access and is not audited. Any presented
    /// token that fails verification is audited and yields `None`.
    pub fn verify_optional(&self, meta: &RequestMetadata) -> Option<AuthContext> {
        match meta.authorization.as_deref() {
            None => None,
            Some(value) if value.trim().is_empty() => None,
            Some(_) => self.verify(meta).ok(),
        }
    }

    fn verify_header(&self, header: Option<&str>) -> AuthResult<(VerifiedIdentity, bool)> {
        let header = header
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(AuthError::MissingToken)?;

        let token = strip_bearer(header).ok_or(AuthError::InvalidFormat)?;
        if !TOKEN_SHAPE.is_match(token) {
            return Err(AuthError::InvalidFormat);
        }

        let cache_key = self.cache.as_ref().map(|_| token_digest(token));
        if let (Some(cache), Some(key)) = (&self.cache, &cache_key) {
            if let Some(identity) = cache.get(key) {
                return Ok((identity, true));
            }
        }

        let claims = self.decode_claims(token)?;
        let identity = Self::identity_from_claims(&claims)?;

        if let (Some(cache), Some(key)) = (&self.cache, cache_key) {
            let remaining = claims.remaining_secs(Utc::now().timestamp()).unwrap_or(0);
            if remaining > 0 {
                let ttl = Duration::from_secs(remaining as u64).min(cache.config().default_ttl);
                cache.set_with_ttl(key, identity.clone(), ttl);
            }
        }

        Ok((identity, false))
    }

    fn decode_claims(&self, token: &str) -> AuthResult<TokenClaims> {
        let primary = decode::<TokenClaims>(token, &self.primary_key, &self.validation);

        let result = match (primary, &self.secondary_key) {
            (Err(e), Some(secondary)) if matches!(e.kind(), ErrorKind::InvalidSignature) => {
                decode::<TokenClaims>(token, secondary, &self.validation)
            }
            (result, _) => result,
        };

        result
            .map(|data| data.claims)
            .map_err(|e| map_jwt_error(e.kind()))
    }

    fn identity_from_claims(claims: &TokenClaims) -> AuthResult<VerifiedIdentity> {
        if claims.exp.is_none() {
            return Err(AuthError::MissingClaim("exp"));
        }

        let user_id = non_empty(claims.sub.as_deref()).ok_or(AuthError::MissingClaim("sub"))?;
        let org_id = non_empty(claims.org_id.as_deref()).ok_or(AuthError::MissingClaim("org_id"))?;

        let role = match non_empty(claims.role.as_deref()) {
            None => TenantRole::Viewer,
            Some(raw) => TenantRole::parse(raw)
                .ok_or(AuthError::VerificationFailed(VerificationFailure::Malformed))?,
        };

        if let Some(bound) = claims.bound_org_id.as_deref() {
            if !constant_time_str_eq(bound, org_id) {
                return Err(AuthError::OrgBindingMismatch);
            }
        }

        Ok(VerifiedIdentity {
            user_id: user_id.to_string(),
            org_id: OrgId::new(org_id),
            roles: vec![role],
            session_id: claims.jti.clone(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn token_digest(token: &str) -> String {
    format!("{:x}", Sha256::digest(token.as_bytes()))
}

fn map_jwt_error(kind: &ErrorKind) -> AuthError {
    match kind {
        ErrorKind::ExpiredSignature => VerificationFailure::Expired.into(),
        ErrorKind::ImmatureSignature => VerificationFailure::NotYetValid.into(),
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
            VerificationFailure::BadSignature.into()
        }
        ErrorKind::InvalidIssuer => VerificationFailure::InvalidIssuer.into(),
        ErrorKind::InvalidAudience => VerificationFailure::InvalidAudience.into(),
        ErrorKind::MissingRequiredClaim(claim) => match claim.as_str() {
            "exp" => AuthError::MissingClaim("exp"),
            "sub" => AuthError::MissingClaim("sub"),
            "iss" => VerificationFailure::InvalidIssuer.into(),
            "aud" => VerificationFailure::InvalidAudience.into(),
            _ => VerificationFailure::Malformed.into(),
        },
        _ => VerificationFailure::Malformed.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const PRIMARY: &str = "primary-secret-for-tests-0123456789abcdef";
    const SECONDARY: &str = "secondary-secret-for-tests-0123456789abcdef";
    const ISSUER: &str = "https://id.cms.test";
    const AUDIENCE: &str = "cms-api";

    fn verifier(sink: Arc<MemoryAuditSink>) -> TokenVerifier {
        let config = VerifierConfig::new(PRIMARY, ISSUER, AUDIENCE).with_secondary_secret(SECONDARY);
        TokenVerifier::new(config).unwrap().with_audit_sink(sink)
    }

    fn claims() -> TokenClaims {
        TokenClaims::new("user-1", "org-acme", chrono::Duration::minutes(10))
            .with_issuer(ISSUER)
            .with_audience(AUDIENCE)
            .with_role("editor")
    }

    fn sign(claims: &TokenClaims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn request(token: &str) -> RequestMetadata {
        RequestMetadata::new("203.0.113.9".parse().unwrap(), "req-1")
            .with_bearer(token)
            .with_user_agent("tests/1.0")
    }

    fn failure(verifier: &TokenVerifier, meta: &RequestMetadata) -> AuthError {
        verifier.verify(meta).unwrap_err()
    }

    #[test]
    fn test_valid_token_with_primary_key() {
        let sink = Arc::new(MemoryAuditSink::new());
        let verifier = verifier(sink.clone());

        let ctx = verifier.verify(&request(&sign(&claims(), PRIMARY))).unwrap();
        assert_eq!(ctx.user_id, "user-1");
        assert_eq!(ctx.org_id, OrgId::new("org-acme"));
        assert_eq!(ctx.roles, vec![TenantRole::Editor]);
        assert_eq!(ctx.request_id, "req-1");
        assert!(ctx.session_id.is_some());

        let event = sink.last().unwrap();
        assert_eq!(event.outcome, AuditOutcome::Success);
        assert_eq!(event.user_agent.as_deref(), Some("tests/1.0"));
    }

    #[test]
    fn test_valid_token_with_secondary_key() {
        let verifier = verifier(Arc::new(MemoryAuditSink::new()));
        let ctx = verifier.verify(&request(&sign(&claims(), SECONDARY))).unwrap();
        assert_eq!(ctx.user_id, "user-1");
    }

    #[test]
    fn test_unknown_key_is_bad_signature() {
        let sink = Arc::new(MemoryAuditSink::new());
        let verifier = verifier(sink.clone());
        let token = sign(&claims(), "some-other-secret-0123456789abcdefghijkl");

        let err = failure(&verifier, &request(&token));
        assert!(matches!(
            err,
            AuthError::VerificationFailed(VerificationFailure::BadSignature)
        ));
        assert_eq!(sink.last().unwrap().classification, Some("bad_signature"));
    }

    #[test]
    fn test_missing_exp_always_fails() {
        let verifier = verifier(Arc::new(MemoryAuditSink::new()));
        let token = sign(&claims().without_expiration(), PRIMARY);

        assert!(matches!(
            failure(&verifier, &request(&token)),
            AuthError::MissingClaim("exp")
        ));
    }

    #[test]
    fn test_expired_token_beyond_leeway() {
        let verifier = verifier(Arc::new(MemoryAuditSink::new()));

        let mut expired = claims();
        expired.exp = Some(Utc::now().timestamp() - 120);
        assert!(matches!(
            failure(&verifier, &request(&sign(&expired, PRIMARY))),
            AuthError::VerificationFailed(VerificationFailure::Expired)
        ));

        let mut within_leeway = claims();
        within_leeway.exp = Some(Utc::now().timestamp() - 5);
        assert!(verifier.verify(&request(&sign(&within_leeway, PRIMARY))).is_ok());
    }

    #[test]
    fn test_wrong_issuer_and_audience() {
        let verifier = verifier(Arc::new(MemoryAuditSink::new()));

        let token = sign(&claims().with_issuer("https://evil.test"), PRIMARY);
        assert!(matches!(
            failure(&verifier, &request(&token)),
            AuthError::VerificationFailed(VerificationFailure::InvalidIssuer)
        ));

        let token = sign(&claims().with_audience("billing"), PRIMARY);
        assert!(matches!(
            failure(&verifier, &request(&token)),
            AuthError::VerificationFailed(VerificationFailure::InvalidAudience)
        ));
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let verifier = verifier(Arc::new(MemoryAuditSink::new()));
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims(),
            &EncodingKey::from_secret(PRIMARY.as_bytes()),
        )
        .unwrap();

        assert!(matches!(
            failure(&verifier, &request(&token)),
            AuthError::VerificationFailed(VerificationFailure::BadSignature)
        ));
    }

    #[test]
    fn test_missing_org_claim() {
        let verifier = verifier(Arc::new(MemoryAuditSink::new()));
        let mut no_org = claims();
        no_org.org_id = None;

        assert!(matches!(
            failure(&verifier, &request(&sign(&no_org, PRIMARY))),
            AuthError::MissingClaim("org_id")
        ));
    }

    #[test]
    fn test_missing_role_defaults_to_viewer_unknown_role_rejected() {
        let verifier = verifier(Arc::new(MemoryAuditSink::new()));

        let mut no_role = claims();
        no_role.role = None;
        let ctx = verifier.verify(&request(&sign(&no_role, PRIMARY))).unwrap();
        assert_eq!(ctx.roles, vec![TenantRole::Viewer]);

        let token = sign(&claims().with_role("superuser"), PRIMARY);
        assert!(matches!(
            failure(&verifier, &request(&token)),
            AuthError::VerificationFailed(VerificationFailure::Malformed)
        ));
    }

    #[test]
    fn test_bound_org_must_match() {
        let verifier = verifier(Arc::new(MemoryAuditSink::new()));

        let token = sign(&claims().with_bound_org("org-acme"), PRIMARY);
        assert!(verifier.verify(&request(&token)).is_ok());

        let token = sign(&claims().with_bound_org("org-other"), PRIMARY);
        assert!(matches!(
            failure(&verifier, &request(&token)),
            AuthError::OrgBindingMismatch
        ));
    }

    #[test]
    fn test_header_shape_checks() {
        let sink = Arc::new(MemoryAuditSink::new());
        let verifier = verifier(sink.clone());
        let ip = "203.0.113.9".parse().unwrap();

        let meta = RequestMetadata::new(ip, "r");
        assert!(matches!(failure(&verifier, &meta), AuthError::MissingToken));

        let meta = RequestMetadata::new(ip, "r").with_authorization("Token abc.def.ghi");
        assert!(matches!(failure(&verifier, &meta), AuthError::InvalidFormat));

        let meta = RequestMetadata::new(ip, "r").with_bearer("not-a-jwt");
        assert!(matches!(failure(&verifier, &meta), AuthError::InvalidFormat));

        let meta = RequestMetadata::new(ip, "r").with_bearer("a.b.c.d");
        assert!(matches!(failure(&verifier, &meta), AuthError::InvalidFormat));

        // every failure is audited with a classification only
        let classifications: Vec<_> = sink.events().iter().map(|e| e.classification).collect();
        assert_eq!(
            classifications,
            vec![
                Some("missing_token"),
                Some("invalid_format"),
                Some("invalid_format"),
                Some("invalid_format")
            ]
        );
    }

    #[test]
    fn test_verify_optional() {
        let sink = Arc::new(MemoryAuditSink::new());
        let verifier = verifier(sink.clone());
        let ip = "203.0.113.9".parse().unwrap();

        assert!(verifier.verify_optional(&RequestMetadata::new(ip, "r")).is_none());
        assert!(sink.is_empty());

        let bad = RequestMetadata::new(ip, "r").with_bearer("x.y.z");
        assert!(verifier.verify_optional(&bad).is_none());
        assert_eq!(sink.len(), 1);

        let good = request(&sign(&claims(), PRIMARY));
        assert!(verifier.verify_optional(&good).is_some());
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn test_token_cache_hit_is_still_audited() {
        let sink = Arc::new(MemoryAuditSink::new());
        let verifier = verifier(sink.clone())
            .with_token_cache(CacheConfig::new(100, Duration::from_secs(60)));
        let token = sign(&claims(), PRIMARY);

        let first = verifier.verify(&request(&token)).unwrap();
        let second_meta = RequestMetadata::new("203.0.113.9".parse().unwrap(), "req-2")
            .with_bearer(&token);
        let second = verifier.verify(&second_meta).unwrap();

        assert_eq!(first.user_id, second.user_id);
        assert_eq!(second.request_id, "req-2");

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(!events[0].cached);
        assert!(events[1].cached);
        assert_eq!(verifier.cache_stats().unwrap().hits, 1);
    }

    #[test]
    fn test_weak_secret_rejected() {
        let err = TokenVerifier::new(VerifierConfig::new("short", ISSUER, AUDIENCE)).unwrap_err();
        assert!(matches!(err, AuthError::ConfigError(_)));

        let err = TokenVerifier::new(
            VerifierConfig::new(PRIMARY, ISSUER, AUDIENCE).with_secondary_secret("short"),
        )
        .unwrap_err();
        assert!(matches!(err, AuthError::ConfigError(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = VerifierConfig::new(PRIMARY, ISSUER, AUDIENCE).with_secondary_secret(SECONDARY);
        let rendered = format!("{config:?}");
        assert!(!rendered.contains(PRIMARY));
        assert!(!rendered.contains(SECONDARY));
    }
}
