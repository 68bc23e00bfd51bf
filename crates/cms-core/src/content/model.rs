//! Content items and their lifecycle.
//!
//! ```text
//! draft ──schedule──▶ scheduled ──publish_scheduled──▶ published
//!   │                    │                                │
//!   └──────publish───────┴──────────▶ published           │
//!   │                    │                                │
//!   └────────────────────┴──────────archive───────────────┴──▶ archived
//! ```
//!
//! [`ContentItem`] is immutable. Every transition borrows the current value and
//! returns the next one together with the [`ContentEvent`] describing it, so the
//! state machine is fully testable without storage.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use cms_tenant::DomainId;
use serde::{Deserialize, Serialize};

use super::error::{ContentError, ContentResult};
use super::events::ContentEvent;

/// Shortest accepted content id.
pub const MIN_CONTENT_ID_LEN: usize = 8;

/// Furthest into the future an item may be scheduled.
pub const MAX_SCHEDULE_HORIZON_DAYS: i64 = 365;

/// Lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Scheduled,
    Published,
    Archived,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Scheduled => "scheduled",
            Self::Published => "published",
            Self::Archived => "archived",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "scheduled" => Some(Self::Scheduled),
            "published" => Some(Self::Published),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }

    /// No transition leaves a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Archived)
    }
}

impl fmt::Display for ContentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input for a new draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewContent {
    pub id: String,
    pub domain_id: DomainId,
    pub title: String,
    pub body: String,
    pub content_type: String,
}

impl NewContent {
    /// Check the fields a draft needs, without touching storage.
    pub fn validate(&self) -> ContentResult<()> {
        let id = self.id.trim();
        if id.is_empty() {
            return Err(ContentError::validation("content id is required"));
        }
        if id.chars().count() < MIN_CONTENT_ID_LEN {
            return Err(ContentError::validation(format!(
                "content id must be at least {MIN_CONTENT_ID_LEN} characters"
            )));
        }
        if self.domain_id.is_empty() {
            return Err(ContentError::validation("domain id is required"));
        }
        if self.content_type.trim().is_empty() {
            return Err(ContentError::validation("content type is required"));
        }
        Ok(())
    }
}

/// A piece of content belonging to one domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub domain_id: DomainId,
    pub title: String,
    pub body: String,
    pub content_type: String,
    pub status: ContentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publish_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ContentItem {
    /// Validate input and build a new draft.
    pub fn draft(input: NewContent, now: DateTime<Utc>) -> ContentResult<(Self, ContentEvent)> {
        input.validate()?;
        let id = input.id.trim();

        let item = Self {
            id: id.to_string(),
            domain_id: input.domain_id,
            title: input.title,
            body: input.body,
            content_type: input.content_type.trim().to_string(),
            status: ContentStatus::Draft,
            publish_at: None,
            published_at: None,
            archived_at: None,
            created_at: now,
            updated_at: now,
        };
        let event = ContentEvent::Created {
            content_id: item.id.clone(),
            domain_id: item.domain_id.clone(),
            title: item.title.clone(),
            content_type: item.content_type.clone(),
            at: now,
        };
        Ok((item, event))
    }

    /// Publish now. Accepted from `draft` and `scheduled`.
    pub fn publish(&self, now: DateTime<Utc>) -> ContentResult<(Self, ContentEvent)> {
        match self.status {
            ContentStatus::Published => return Err(ContentError::AlreadyPublished),
            ContentStatus::Archived => return Err(ContentError::Archived),
            ContentStatus::Draft | ContentStatus::Scheduled => {}
        }
        if self.title.trim().is_empty() {
            return Err(ContentError::validation("title is required to publish"));
        }
        Ok(self.published(now, false))
    }

    /// Schedule a draft for publication at `publish_at`.
    pub fn schedule(
        &self,
        publish_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ContentResult<(Self, ContentEvent)> {
        match self.status {
            ContentStatus::Draft => {}
            ContentStatus::Archived => return Err(ContentError::Archived),
            from => {
                return Err(ContentError::InvalidTransition {
                    from,
                    action: "schedule",
                })
            }
        }
        if publish_at <= now {
            return Err(ContentError::validation("publish time must be in the future"));
        }
        if publish_at > now + Duration::days(MAX_SCHEDULE_HORIZON_DAYS) {
            return Err(ContentError::validation(format!(
                "publish time must be within {MAX_SCHEDULE_HORIZON_DAYS} days"
            )));
        }
        if self.title.trim().is_empty() {
            return Err(ContentError::validation("title is required to schedule"));
        }
        if self.body.trim().is_empty() {
            return Err(ContentError::validation("body is required to schedule"));
        }

        let item = Self {
            status: ContentStatus::Scheduled,
            publish_at: Some(publish_at),
            updated_at: now,
            ..self.clone()
        };
        let event = ContentEvent::Scheduled {
            content_id: item.id.clone(),
            domain_id: item.domain_id.clone(),
            publish_at,
            at: now,
        };
        Ok((item, event))
    }

    /// Soft delete. Accepted from every non-terminal status.
    pub fn archive(&self, now: DateTime<Utc>) -> ContentResult<(Self, ContentEvent)> {
        if self.status.is_terminal() {
            return Err(ContentError::Archived);
        }
        let item = Self {
            status: ContentStatus::Archived,
            archived_at: Some(now),
            updated_at: now,
            ..self.clone()
        };
        let event = ContentEvent::Archived {
            content_id: item.id.clone(),
            domain_id: item.domain_id.clone(),
            previous_status: self.status,
            at: now,
        };
        Ok((item, event))
    }

    /// Sweep transition for a scheduled item whose time has come.
    pub fn publish_scheduled(&self, now: DateTime<Utc>) -> ContentResult<(Self, ContentEvent)> {
        if self.status != ContentStatus::Scheduled {
            return Err(ContentError::InvalidTransition {
                from: self.status,
                action: "publish scheduled",
            });
        }
        match self.publish_at {
            Some(at) if at <= now => Ok(self.published(now, true)),
            _ => Err(ContentError::validation("scheduled publish time has not passed")),
        }
    }

    /// Whether a scheduled item is due at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == ContentStatus::Scheduled && self.publish_at.is_some_and(|at| at <= now)
    }

    fn published(&self, now: DateTime<Utc>, was_scheduled: bool) -> (Self, ContentEvent) {
        let item = Self {
            status: ContentStatus::Published,
            publish_at: None,
            published_at: Some(now),
            updated_at: now,
            ..self.clone()
        };
        let event = ContentEvent::Published {
            content_id: item.id.clone(),
            domain_id: item.domain_id.clone(),
            was_scheduled,
            at: now,
        };
        (item, event)
    }
}

/// Default page size for listings.
pub const DEFAULT_LIST_LIMIT: u32 = 50;

/// Largest page size for listings.
pub const MAX_LIST_LIMIT: u32 = 200;

/// Listing filter over one domain's content.
///
/// Search matches titles only, case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentQuery {
    pub domain_id: DomainId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ContentStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    DEFAULT_LIST_LIMIT
}

impl ContentQuery {
    pub fn new(domain_id: DomainId) -> Self {
        Self {
            domain_id,
            status: None,
            search: None,
            limit: DEFAULT_LIST_LIMIT,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: ContentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    pub fn with_page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = limit;
        self.offset = offset;
        self
    }

    /// Clamp the page size and drop a blank search term.
    pub fn normalized(mut self) -> Self {
        self.limit = match self.limit {
            0 => DEFAULT_LIST_LIMIT,
            n => n.min(MAX_LIST_LIMIT),
        };
        self.search = self
            .search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    /// Apply the status and title filters to one item.
    pub fn matches(&self, item: &ContentItem) -> bool {
        if item.domain_id != self.domain_id {
            return false;
        }
        if self.status.is_some_and(|status| status != item.status) {
            return false;
        }
        match &self.search {
            Some(term) => item.title.to_lowercase().contains(&term.to_lowercase()),
            None => true,
        }
    }
}
