//! Full pipeline scenarios: rate limit, token, role, ownership, lifecycle.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{Duration, Utc};
use cms_auth::{RequestMetadata, TokenClaims};
use cms_core::{ContentStatus, MemoryStore, NewContent};
use cms_events::{EventBus, MemoryEventBus};
use cms_gateway::{CommandItem, ContentCommand, Gateway, GatewayConfig, GatewayResponse};
use cms_tenant::{DomainId, OrgId};
use jsonwebtoken::{encode, EncodingKey, Header};

const PRIMARY: &str = "primary-signing-secret-for-gateway-tests";
const SECONDARY: &str = "retired-signing-secret-for-gateway-tests";
const ISSUER: &str = "https://id.example.test";
const AUDIENCE: &str = "cms-api";

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

fn config() -> GatewayConfig {
    GatewayConfig {
        jwt_primary_secret: PRIMARY.to_string(),
        jwt_secondary_secret: Some(SECONDARY.to_string()),
        jwt_issuer: ISSUER.to_string(),
        jwt_audience: vec![AUDIENCE.to_string()],
        ..GatewayConfig::default()
    }
}

fn domain() -> DomainId {
    DomainId::new("shop.acme.test")
}

fn token_with(secret: &str, org: &str, role: &str) -> String {
    let claims = TokenClaims::new(format!("user-{role}"), org, Duration::minutes(15))
        .with_role(role)
        .with_issuer(ISSUER)
        .with_audience(AUDIENCE);
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

fn token(org: &str, role: &str) -> String {
    token_with(PRIMARY, org, role)
}

fn request(ip: &str, token: &str) -> RequestMetadata {
    let ip: IpAddr = ip.parse().unwrap();
    RequestMetadata::new(ip, format!("req-{}", NEXT_REQUEST.fetch_add(1, Ordering::Relaxed)))
        .with_bearer(token)
}

fn draft(id: &str) -> ContentCommand {
    ContentCommand::CreateDraft(NewContent {
        id: id.into(),
        domain_id: domain(),
        title: "Spring sale".into(),
        body: "Everything must go".into(),
        content_type: "page".into(),
    })
}

async fn gateway_with(config: GatewayConfig) -> (Gateway<MemoryStore>, Arc<MemoryEventBus>) {
    let bus = Arc::new(MemoryEventBus::new());
    let gateway = Gateway::from_config(&config, MemoryStore::new(), bus.clone()).unwrap();
    gateway
        .service()
        .guard()
        .register_domain(&domain(), &OrgId::new("org-a"))
        .await
        .unwrap();
    (gateway, bus)
}

async fn gateway() -> (Gateway<MemoryStore>, Arc<MemoryEventBus>) {
    gateway_with(config()).await
}

fn content_status(response: &GatewayResponse) -> ContentStatus {
    match response.body.item.as_ref() {
        Some(CommandItem::Content(receipt)) => receipt.item.status,
        other => panic!("expected a content item, got {other:?}"),
    }
}

#[tokio::test]
async fn ownership_transfer_scenario() {
    let (gateway, bus) = gateway().await;
    let mut events = bus.subscribe("#").await.unwrap();

    let owner_a = token("org-a", "owner");
    let editor_b = token("org-b", "editor");
    let ip = "203.0.113.10";

    let created = gateway.handle(&request(ip, &owner_a), draft("page-0001")).await;
    assert_eq!(created.status, 201, "{created:?}");
    assert_eq!(content_status(&created), ContentStatus::Draft);

    let schedule = ContentCommand::Schedule {
        domain_id: domain(),
        content_id: "page-0001".into(),
        publish_at: Utc::now() + Duration::hours(1),
    };
    let scheduled = gateway.handle(&request(ip, &owner_a), schedule.clone()).await;
    assert_eq!(scheduled.status, 200, "{scheduled:?}");
    assert_eq!(content_status(&scheduled), ContentStatus::Scheduled);

    let rescheduled = gateway.handle(&request(ip, &owner_a), schedule).await;
    assert_eq!(rescheduled.status, 409);
    assert_eq!(rescheduled.error_code(), Some("INVALID_STATUS_TRANSITION"));

    let published = gateway
        .handle(
            &request(ip, &owner_a),
            ContentCommand::Publish {
                domain_id: domain(),
                content_id: "page-0001".into(),
            },
        )
        .await;
    assert_eq!(published.status, 200, "{published:?}");
    assert_eq!(content_status(&published), ContentStatus::Published);

    let transferred = gateway
        .handle(
            &request(ip, &owner_a),
            ContentCommand::TransferDomain {
                domain_id: domain(),
                to_org: OrgId::new("org-b"),
            },
        )
        .await;
    assert_eq!(transferred.status, 200, "{transferred:?}");
    match transferred.body.item.as_ref() {
        Some(CommandItem::Transfer(receipt)) => {
            assert_eq!(receipt.transfer.from_org, OrgId::new("org-a"));
            assert_eq!(receipt.transfer.to_org, OrgId::new("org-b"));
        }
        other => panic!("expected a transfer, got {other:?}"),
    }

    let stale = gateway
        .handle(
            &request(ip, &owner_a),
            ContentCommand::Archive {
                content_id: "page-0001".into(),
            },
        )
        .await;
    assert_eq!(stale.status, 404);
    assert_eq!(stale.error_code(), Some("CONTENT_NOT_FOUND"));

    let archived = gateway
        .handle(
            &request(ip, &editor_b),
            ContentCommand::Archive {
                content_id: "page-0001".into(),
            },
        )
        .await;
    assert_eq!(archived.status, 200, "{archived:?}");
    assert_eq!(content_status(&archived), ContentStatus::Archived);

    let mut names = Vec::new();
    while let Some(event) = events.try_recv() {
        assert_eq!(event.meta.domain_id, domain());
        assert_eq!(event.meta.source, "cms-core");
        names.push(event.name);
    }
    assert_eq!(
        names,
        vec![
            "content.created",
            "content.scheduled",
            "content.published",
            "domain.ownership_transferred",
            "content.archived",
        ]
    );
}

#[tokio::test]
async fn role_check_runs_before_the_guard() {
    let (gateway, _bus) = gateway().await;
    let ip = "203.0.113.11";

    let viewer = token("org-a", "viewer");
    let denied = gateway.handle(&request(ip, &viewer), draft("page-0002")).await;
    assert_eq!(denied.status, 403);
    assert_eq!(denied.error_code(), Some("INSUFFICIENT_ROLE"));

    let listed = gateway
        .handle(
            &request(ip, &viewer),
            ContentCommand::List(cms_core::ContentQuery::new(domain())),
        )
        .await;
    assert_eq!(listed.status, 200);
    assert!(matches!(listed.body.item, Some(CommandItem::Listing(ref items)) if items.is_empty()));

    let editor = token("org-a", "editor");
    let transfer = gateway
        .handle(
            &request(ip, &editor),
            ContentCommand::TransferDomain {
                domain_id: domain(),
                to_org: OrgId::new("org-b"),
            },
        )
        .await;
    assert_eq!(transfer.status, 403);
    assert_eq!(transfer.error_code(), Some("INSUFFICIENT_ROLE"));
}

#[tokio::test]
async fn foreign_organization_is_forbidden() {
    let (gateway, _bus) = gateway().await;
    let outsider = token("org-b", "owner");

    let response = gateway
        .handle(&request("203.0.113.12", &outsider), draft("page-0003"))
        .await;
    assert_eq!(response.status, 403);
    assert_eq!(response.error_code(), Some("DOMAIN_NOT_OWNED"));
    assert!(!response.body.error.as_ref().unwrap().message.contains("org-b"));

    let listing = gateway
        .handle(
            &request("203.0.113.12", &outsider),
            ContentCommand::List(cms_core::ContentQuery::new(domain())),
        )
        .await;
    assert_eq!(listing.status, 403);
}

#[tokio::test]
async fn authentication_failures_are_uniform() {
    let (gateway, _bus) = gateway().await;
    let ip = "203.0.113.13";

    let missing = RequestMetadata::new(ip.parse().unwrap(), "req-missing");
    let response = gateway.handle(&missing, draft("page-0004")).await;
    assert_eq!(response.status, 401);
    assert_eq!(response.error_code(), Some("MISSING_TOKEN"));
    assert_eq!(response.headers().len(), 3);

    let forged = token_with("some-other-secret-that-is-long-enough!!", "org-a", "owner");
    let bad_sig = gateway.handle(&request(ip, &forged), draft("page-0004")).await;

    let expired_claims = TokenClaims::new("user-1", "org-a", Duration::minutes(-10))
        .with_role("owner")
        .with_issuer(ISSUER)
        .with_audience(AUDIENCE);
    let expired = encode(
        &Header::default(),
        &expired_claims,
        &EncodingKey::from_secret(PRIMARY.as_bytes()),
    )
    .unwrap();
    let expired = gateway.handle(&request(ip, &expired), draft("page-0004")).await;

    assert_eq!(bad_sig.status, 401);
    assert_eq!(expired.status, 401);
    assert_eq!(bad_sig.body.error, expired.body.error);
}

#[tokio::test]
async fn secondary_key_is_accepted_during_rotation() {
    let (gateway, _bus) = gateway().await;
    let rotated = token_with(SECONDARY, "org-a", "editor");

    let response = gateway
        .handle(&request("203.0.113.14", &rotated), draft("page-0005"))
        .await;
    assert_eq!(response.status, 201, "{response:?}");
}

#[tokio::test]
async fn rate_limit_applies_before_verification() {
    let (gateway, _bus) = gateway_with(GatewayConfig {
        rate_limit_max_requests: 2,
        ..config()
    })
    .await;
    let ip = "203.0.113.15";
    let garbage = "not-a-jwt";

    let first = gateway.handle(&request(ip, garbage), draft("page-0006")).await;
    assert_eq!(first.status, 401);
    assert_eq!(first.rate_limit.remaining, 1);

    let second = gateway.handle(&request(ip, garbage), draft("page-0006")).await;
    assert_eq!(second.status, 401);
    assert_eq!(second.rate_limit.remaining, 0);

    let valid = token("org-a", "owner");
    let third = gateway.handle(&request(ip, &valid), draft("page-0006")).await;
    assert_eq!(third.status, 429);
    assert_eq!(third.error_code(), Some("RATE_LIMITED"));
    let headers = third.headers();
    assert_eq!(headers.len(), 4);
    assert_eq!(headers[3].0, "Retry-After");
    assert_eq!(headers[0], ("X-RateLimit-Limit", "2".to_string()));

    let other_client = gateway
        .handle(&request("203.0.113.16", &valid), draft("page-0006"))
        .await;
    assert_eq!(other_client.status, 201);
}

#[tokio::test]
async fn validation_errors_map_to_bad_request() {
    let (gateway, _bus) = gateway().await;
    let owner = token("org-a", "owner");

    let response = gateway
        .handle(&request("203.0.113.17", &owner), draft("short"))
        .await;
    assert_eq!(response.status, 400);
    assert_eq!(response.error_code(), Some("VALIDATION_FAILED"));

    let body = serde_json::to_value(&response.body).unwrap();
    assert_eq!(body["success"], false);
    assert!(body.get("item").is_none());
}
