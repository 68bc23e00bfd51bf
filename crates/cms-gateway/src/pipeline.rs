//! Request pipeline.
//!
//! Every command passes the same stages in the same order:
//!
//! 1. rate limit, keyed by client address, before any token work
//! 2. token verification
//! 3. role check against the command's resource and action
//! 4. the content service, which runs the ownership guard
//!
//! Each stage short-circuits with an [`ApiError`]; the rate-limit headers are
//! attached to every response, rejected or not.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use cms_auth::{RequestMetadata, TokenVerifier, TracingAuditSink};
use cms_core::{
    Actor, ContentItem, ContentQuery, ContentReceipt, ContentService, NewContent,
    OwnershipGuard, TenancyStore, TransferReceipt,
};
use cms_events::EventBus;
use cms_limits::{client_key, RateLimit, RateLimiter, Sweeper};
use cms_rbac::{Action, ResourceType};
use cms_tenant::{DomainId, OrgId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::{ConfigError, GatewayConfig};
use crate::error::ApiError;
use crate::outcome::{CommandOutcome, RateLimitHeaders};

/// A content command issued by an authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ContentCommand {
    CreateDraft(NewContent),
    #[serde(rename_all = "camelCase")]
    Publish {
        domain_id: DomainId,
        content_id: String,
    },
    #[serde(rename_all = "camelCase")]
    Schedule {
        domain_id: DomainId,
        content_id: String,
        publish_at: DateTime<Utc>,
    },
    #[serde(rename_all = "camelCase")]
    Archive { content_id: String },
    List(ContentQuery),
    #[serde(rename_all = "camelCase")]
    TransferDomain { domain_id: DomainId, to_org: OrgId },
}

impl ContentCommand {
    /// Resource and action the caller's role must allow.
    pub fn required_permission(&self) -> (ResourceType, Action) {
        match self {
            Self::CreateDraft(_) => (ResourceType::Content, Action::Create),
            Self::Publish { .. } => (ResourceType::Content, Action::Publish),
            Self::Schedule { .. } => (ResourceType::Content, Action::Schedule),
            Self::Archive { .. } => (ResourceType::Content, Action::Archive),
            Self::List(_) => (ResourceType::Content, Action::List),
            Self::TransferDomain { .. } => (ResourceType::Domain, Action::Transfer),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateDraft(_) => "create_draft",
            Self::Publish { .. } => "publish",
            Self::Schedule { .. } => "schedule",
            Self::Archive { .. } => "archive",
            Self::List(_) => "list",
            Self::TransferDomain { .. } => "transfer_domain",
        }
    }

    fn success_status(&self) -> u16 {
        match self {
            Self::CreateDraft(_) => 201,
            _ => 200,
        }
    }
}

/// Payload of a successful command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandItem {
    Content(ContentReceipt),
    Listing(Vec<ContentItem>),
    Transfer(TransferReceipt),
}

/// What the transport layer writes back.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status: u16,
    pub rate_limit: RateLimitHeaders,
    pub body: CommandOutcome<CommandItem>,
}

impl GatewayResponse {
    pub fn is_success(&self) -> bool {
        self.body.success
    }

    pub fn headers(&self) -> Vec<(&'static str, String)> {
        self.rate_limit.to_pairs()
    }

    pub fn error_code(&self) -> Option<&str> {
        self.body.error.as_ref().map(|e| e.code.as_str())
    }
}

/// Composes the limiter, verifier and content service.
pub struct Gateway<S: TenancyStore> {
    limiter: Arc<RateLimiter>,
    rate_limit: RateLimit,
    verifier: Arc<TokenVerifier>,
    service: ContentService<S>,
}

impl<S: TenancyStore> Gateway<S> {
    pub fn new(
        limiter: Arc<RateLimiter>,
        rate_limit: RateLimit,
        verifier: Arc<TokenVerifier>,
        service: ContentService<S>,
    ) -> Self {
        Self {
            limiter,
            rate_limit,
            verifier,
            service,
        }
    }

    /// Assemble a gateway from configuration over `store`.
    pub fn from_config(
        config: &GatewayConfig,
        store: S,
        bus: Arc<dyn EventBus>,
    ) -> Result<Self, ConfigError> {
        let mut verifier = TokenVerifier::new(config.verifier_config())
            .map_err(|e| ConfigError::InvalidValue {
                key: "CMS_JWT_PRIMARY_SECRET".to_string(),
                message: e.to_string(),
            })?
            .with_audit_sink(Arc::new(TracingAuditSink));
        if let Some(cache) = config.token_cache_config() {
            verifier = verifier.with_token_cache(cache);
        }

        let guard = OwnershipGuard::with_config(store, config.guard_config());
        let service = ContentService::new(guard, bus).with_source(config.service_name.clone());

        info!(
            issuer = %config.jwt_issuer,
            rate_limit = config.rate_limit_max_requests,
            window_ms = config.rate_limit_window_ms,
            "Gateway configured"
        );

        Ok(Self::new(
            Arc::new(RateLimiter::new(config.rate_limiter_config())),
            config.rate_limit(),
            Arc::new(verifier),
            service,
        ))
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn verifier(&self) -> &Arc<TokenVerifier> {
        &self.verifier
    }

    pub fn service(&self) -> &ContentService<S> {
        &self.service
    }

    /// Start the background sweeps of the limiter and the token cache.
    ///
    /// Must be called from within a tokio runtime. Dropping the handles stops
    /// the sweeps.
    pub fn spawn_sweepers(&self) -> Vec<Sweeper> {
        let interval = self.limiter.config().sweep_interval;
        let mut sweepers = vec![Sweeper::spawn("rate-limit", self.limiter.clone(), interval)];
        if self.verifier.cache_stats().is_some() {
            sweepers.push(Sweeper::spawn("token-cache", self.verifier.clone(), interval));
        }
        sweepers
    }

    /// Run one command through the full pipeline.
    #[instrument(skip_all, fields(request_id = %meta.request_id, command = command.name()))]
    pub async fn handle(&self, meta: &RequestMetadata, command: ContentCommand) -> GatewayResponse {
        let decision = self
            .limiter
            .allow(&client_key(meta.client_ip, None), &self.rate_limit);
        let rate_limit = RateLimitHeaders::from_decision(&decision, Utc::now());

        if let Some(wait) = decision.retry_after() {
            debug!(client_ip = %meta.client_ip, "Request rate limited");
            return respond(rate_limit, 0, Err(ApiError::rate_limited(wait)));
        }

        let status = command.success_status();
        let result = self.execute(meta, command).await;
        respond(rate_limit, status, result)
    }

    async fn execute(
        &self,
        meta: &RequestMetadata,
        command: ContentCommand,
    ) -> Result<CommandItem, ApiError> {
        let ctx = self.verifier.verify(meta)?;

        let (resource, action) = command.required_permission();
        if !ctx.permissions().allows(resource, action) {
            return Err(ApiError::forbidden(resource, action));
        }

        let actor = Actor::new(ctx.org_id, meta.request_id.clone());
        let item = match command {
            ContentCommand::CreateDraft(input) => {
                CommandItem::Content(self.service.create_draft(&actor, input).await?)
            }
            ContentCommand::Publish {
                domain_id,
                content_id,
            } => CommandItem::Content(self.service.publish(&actor, &domain_id, &content_id).await?),
            ContentCommand::Schedule {
                domain_id,
                content_id,
                publish_at,
            } => CommandItem::Content(
                self.service
                    .schedule(&actor, &domain_id, &content_id, publish_at)
                    .await?,
            ),
            ContentCommand::Archive { content_id } => {
                CommandItem::Content(self.service.archive(&actor, &content_id).await?)
            }
            ContentCommand::List(query) => {
                CommandItem::Listing(self.service.list(&actor, query).await?)
            }
            ContentCommand::TransferDomain { domain_id, to_org } => CommandItem::Transfer(
                self.service
                    .transfer_domain(&actor, &domain_id, &to_org)
                    .await?,
            ),
        };
        Ok(item)
    }
}

impl<S: TenancyStore> std::fmt::Debug for Gateway<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("limiter", &self.limiter)
            .field("rate_limit", &self.rate_limit)
            .field("verifier", &self.verifier)
            .finish_non_exhaustive()
    }
}

fn respond(
    rate_limit: RateLimitHeaders,
    success_status: u16,
    result: Result<CommandItem, ApiError>,
) -> GatewayResponse {
    let status = match &result {
        Ok(_) => success_status,
        Err(e) => {
            if !e.is_server_error() {
                debug!(code = e.error_code(), status = e.status_code(), "Command rejected");
            }
            e.status_code()
        }
    };
    GatewayResponse {
        status,
        rate_limit,
        body: result.into(),
    }
}
