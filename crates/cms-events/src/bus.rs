//! Event bus implementation
//!
//! The bus abstraction the content service publishes committed envelopes to,
//! plus an in-process implementation.

use crate::envelope::DomainEventEnvelope;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};

/// Event bus error types.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// Failed to publish event
    #[error("Failed to publish event: {0}")]
    PublishError(String),

    /// Failed to subscribe
    #[error("Failed to subscribe: {0}")]
    SubscribeError(String),

    /// Channel closed
    #[error("Channel closed")]
    ChannelClosed,
}

/// Result type for event bus operations.
pub type EventBusResult<T> = Result<T, EventBusError>;

/// Subscription handle for receiving events.
pub struct Subscription {
    /// Subscription ID
    pub id: String,
    /// Topic pattern
    pub topic: String,
    receiver: broadcast::Receiver<DomainEventEnvelope>,
}

impl Subscription {
    /// Receive the next event.
    ///
    /// A subscriber that fell behind skips the overwritten events and keeps
    /// receiving from the oldest one still buffered.
    pub async fn recv(&mut self) -> EventBusResult<DomainEventEnvelope> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Ok(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(topic = %self.topic, skipped, "Subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed)
                }
            }
        }
    }

    /// Receive an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<DomainEventEnvelope> {
        self.receiver.try_recv().ok()
    }
}

/// Event handler trait for processing events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: DomainEventEnvelope) -> EventBusResult<()>;

    /// Get the topics this handler is interested in.
    fn topics(&self) -> Vec<String>;
}

/// Event bus trait for publish/subscribe operations.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish an event.
    async fn publish(&self, event: DomainEventEnvelope) -> EventBusResult<()>;

    /// Subscribe to a topic pattern.
    ///
    /// Topic patterns support wildcards:
    /// - `*` matches any single segment
    /// - `#` matches zero or more segments
    ///
    /// Examples:
    /// - `content.*` matches `content.created`, `content.published`
    /// - `#` matches everything
    async fn subscribe(&self, topic: &str) -> EventBusResult<Subscription>;

    /// Register an event handler.
    async fn register_handler(&self, handler: Arc<dyn EventHandler>) -> EventBusResult<()>;

    /// Get event bus stats.
    async fn stats(&self) -> EventBusStats;
}

/// Event bus statistics.
#[derive(Debug, Clone, Default)]
pub struct EventBusStats {
    /// Total events published
    pub events_published: u64,
    /// Total deliveries to subscribers and handlers
    pub events_delivered: u64,
    /// Live subscriptions
    pub active_subscriptions: usize,
    /// Registered handlers
    pub registered_handlers: usize,
}

/// Check if a dotted topic matches a pattern.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let topic: Vec<&str> = topic.split('.').collect();
    segments_match(&pattern, &topic)
}

fn segments_match(pattern: &[&str], topic: &[&str]) -> bool {
    match (pattern.split_first(), topic.split_first()) {
        (None, None) => true,
        (Some((&"#", rest)), _) => {
            (0..=topic.len()).any(|skip| segments_match(rest, &topic[skip..]))
        }
        (Some((&"*", rest)), Some((_, topic_rest))) => segments_match(rest, topic_rest),
        (Some((segment, rest)), Some((head, topic_rest))) => {
            segment == head && segments_match(rest, topic_rest)
        }
        _ => false,
    }
}

/// In-memory event bus implementation.
///
/// Single-process only. Delivery is best effort: an envelope published with
/// no matching subscriber is dropped.
pub struct MemoryEventBus {
    subscribers: RwLock<HashMap<String, broadcast::Sender<DomainEventEnvelope>>>,
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
    published: AtomicU64,
    delivered: Arc<AtomicU64>,
    channel_capacity: usize,
}

impl std::fmt::Debug for MemoryEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEventBus")
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

impl MemoryEventBus {
    /// Create a new in-memory event bus.
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create with custom channel capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            handlers: RwLock::new(Vec::new()),
            published: AtomicU64::new(0),
            delivered: Arc::new(AtomicU64::new(0)),
            channel_capacity: capacity.max(1),
        }
    }
}

impl Default for MemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventBus for MemoryEventBus {
    async fn publish(&self, event: DomainEventEnvelope) -> EventBusResult<()> {
        self.published.fetch_add(1, Ordering::Relaxed);

        {
            let subscribers = self.subscribers.read().await;
            for (pattern, sender) in subscribers.iter() {
                if topic_matches(pattern, event.topic()) {
                    if let Ok(receivers) = sender.send(event.clone()) {
                        self.delivered.fetch_add(receivers as u64, Ordering::Relaxed);
                    }
                }
            }
        }

        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            if !handler
                .topics()
                .iter()
                .any(|pattern| topic_matches(pattern, event.topic()))
            {
                continue;
            }

            let handler = handler.clone();
            let event = event.clone();
            let delivered = self.delivered.clone();
            tokio::spawn(async move {
                let name = event.name.clone();
                match handler.handle(event).await {
                    Ok(()) => {
                        delivered.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => tracing::error!(event = %name, error = %e, "Event handler failed"),
                }
            });
        }

        tracing::debug!(event = %event.name, event_id = %event.id, "Event published");
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> EventBusResult<Subscription> {
        if topic.is_empty() {
            return Err(EventBusError::SubscribeError(
                "topic pattern must not be empty".to_string(),
            ));
        }

        let receiver = {
            let mut subscribers = self.subscribers.write().await;
            subscribers
                .entry(topic.to_string())
                .or_insert_with(|| broadcast::channel(self.channel_capacity).0)
                .subscribe()
        };

        Ok(Subscription {
            id: uuid::Uuid::now_v7().to_string(),
            topic: topic.to_string(),
            receiver,
        })
    }

    async fn register_handler(&self, handler: Arc<dyn EventHandler>) -> EventBusResult<()> {
        self.handlers.write().await.push(handler);
        Ok(())
    }

    async fn stats(&self) -> EventBusStats {
        let active_subscriptions = self
            .subscribers
            .read()
            .await
            .values()
            .map(|sender| sender.receiver_count())
            .sum();

        EventBusStats {
            events_published: self.published.load(Ordering::Relaxed),
            events_delivered: self.delivered.load(Ordering::Relaxed),
            active_subscriptions,
            registered_handlers: self.handlers.read().await.len(),
        }
    }
}
