//! Per-request identity and transport metadata.

use std::net::IpAddr;

use cms_rbac::PermissionSet;
use cms_tenant::{OrgId, TenantRole};
use serde::{Deserialize, Serialize};

/// Verified identity and tenant context attached to one request.
///
/// Produced once per request by the verifier and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthContext {
    pub user_id: String,
    pub org_id: OrgId,
    pub roles: Vec<TenantRole>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub request_id: String,
}

impl AuthContext {
    /// Highest role held, or viewer when none.
    pub fn highest_role(&self) -> TenantRole {
        self.roles.iter().copied().max().unwrap_or_default()
    }

    /// Check whether any held role is at least `role`.
    pub fn has_role(&self, role: TenantRole) -> bool {
        self.highest_role() >= role
    }

    /// Permissions granted by the held roles.
    pub fn permissions(&self) -> PermissionSet {
        PermissionSet::for_roles(&self.roles)
    }
}

/// Transport facts about an inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    /// Raw Authorization header value
    pub authorization: Option<String>,
    pub client_ip: IpAddr,
    pub user_agent: Option<String>,
    /// Correlation id, propagated to events and audit records
    pub request_id: String,
}

impl RequestMetadata {
    pub fn new(client_ip: IpAddr, request_id: impl Into<String>) -> Self {
        Self {
            authorization: None,
            client_ip,
            user_agent: None,
            request_id: request_id.into(),
        }
    }

    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Set `Authorization: Bearer <token>`.
    pub fn with_bearer(self, token: &str) -> Self {
        self.with_authorization(format!("Bearer {token}"))
    }

    pub fn with_user_agent(mut self, value: impl Into<String>) -> Self {
        self.user_agent = Some(value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cms_rbac::{Action, ResourceType};

    #[test]
    fn test_permissions_follow_roles() {
        let ctx = AuthContext {
            user_id: "u1".into(),
            org_id: OrgId::new("org"),
            roles: vec![TenantRole::Editor],
            session_id: None,
            request_id: "req".into(),
        };

        assert_eq!(ctx.highest_role(), TenantRole::Editor);
        assert!(ctx.has_role(TenantRole::Viewer));
        assert!(!ctx.has_role(TenantRole::Owner));
        assert!(ctx
            .permissions()
            .allows(ResourceType::Content, Action::Publish));
    }
}
