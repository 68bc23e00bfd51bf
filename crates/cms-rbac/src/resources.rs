//! # Resource Types
//!
//! Tenant-scoped resources that permissions are granted on.

use serde::{Deserialize, Serialize};

/// Resource types that can have permissions assigned.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Content items (pages, posts) living inside a domain.
    Content,
    /// Domains owned by an organization.
    Domain,
}

impl ResourceType {
    /// Get the string representation of the resource type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Content => "content",
            ResourceType::Domain => "domain",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_uses_display_names() {
        for resource in [ResourceType::Content, ResourceType::Domain] {
            let json = serde_json::to_string(&resource).unwrap();
            assert_eq!(json, format!("\"{resource}\""));
        }
    }
}
