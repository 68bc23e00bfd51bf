//! Bearer token claims
//!
//! The identity provider issues tokens with a fixed claim shape: subject,
//! organization id, optional role, optional bound-organization id, mandatory
//! expiration, issued-at, and token id. Every field is optional at the serde
//! level so a missing claim surfaces as a typed `MissingClaim` error rather
//! than an opaque decode failure.

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `aud` may be a single string or an array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audience {
    Single(String),
    Many(Vec<String>),
}

impl Audience {
    /// Check whether the audience names `value`.
    pub fn contains(&self, value: &str) -> bool {
        match self {
            Audience::Single(aud) => aud == value,
            Audience::Many(auds) => auds.iter().any(|aud| aud == value),
        }
    }
}

/// Claims carried by a CMS bearer token.
///
/// # Example
///
/// ```
/// use cms_auth::TokenClaims;
///
/// let claims = TokenClaims::new("user-1", "org-acme", chrono::Duration::minutes(15))
///     .with_role("editor")
///     .with_issuer("https://id.example.test")
///     .with_audience("cms");
///
/// assert_eq!(claims.role.as_deref(), Some("editor"));
/// assert!(claims.exp.is_some());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject (user ID)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Organization the token acts for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,

    /// Tenant role within `org_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// When present, the token is only valid for this organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound_org_id: Option<String>,

    /// Expiration time (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Not before (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// JWT ID, used as the session id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,

    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Audience>,
}

impl TokenClaims {
    /// Claims for `sub` acting in `org_id`, valid from now for `duration`.
    pub fn new(sub: impl Into<String>, org_id: impl Into<String>, duration: Duration) -> Self {
        let now = Utc::now();
        Self {
            sub: Some(sub.into()),
            org_id: Some(org_id.into()),
            exp: Some((now + duration).timestamp()),
            iat: Some(now.timestamp()),
            jti: Some(Uuid::now_v7().to_string()),
            ..Default::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_bound_org(mut self, org_id: impl Into<String>) -> Self {
        self.bound_org_id = Some(org_id.into());
        self
    }

    pub fn with_issuer(mut self, iss: impl Into<String>) -> Self {
        self.iss = Some(iss.into());
        self
    }

    pub fn with_audience(mut self, aud: impl Into<String>) -> Self {
        self.aud = Some(Audience::Single(aud.into()));
        self
    }

    /// Drop the expiration claim.
    pub fn without_expiration(mut self) -> Self {
        self.exp = None;
        self
    }

    /// Seconds until expiry relative to `now`, negative once expired.
    pub fn remaining_secs(&self, now: i64) -> Option<i64> {
        self.exp.map(|exp| exp - now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_claims_deserialize_as_none() {
        let claims: TokenClaims = serde_json::from_str(r#"{"sub":"u1"}"#).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("u1"));
        assert!(claims.exp.is_none());
        assert!(claims.org_id.is_none());
    }

    #[test]
    fn test_audience_forms() {
        let single: TokenClaims = serde_json::from_str(r#"{"aud":"cms"}"#).unwrap();
        let many: TokenClaims = serde_json::from_str(r#"{"aud":["billing","cms"]}"#).unwrap();

        assert!(single.aud.unwrap().contains("cms"));
        assert!(many.aud.unwrap().contains("cms"));
    }

    #[test]
    fn test_without_expiration_omits_exp() {
        let claims = TokenClaims::new("u1", "org", Duration::minutes(5)).without_expiration();
        let json = serde_json::to_value(&claims).unwrap();
        assert!(json.get("exp").is_none());
    }
}
