//! EventBus: topic registry, global listeners and request/response correlation.
//!
//! One bus per running system. It is constructed explicitly and handed to whoever
//! needs it; clones share the same state.
//!
//! Shared state is limited to three maps (channels, global listeners, pending
//! requests), each behind its own mutex. No guard is ever held across an `.await`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use super::channel::{Channel, ChannelStats, DEFAULT_HISTORY_CAPACITY};
use super::listener::{EventListener, ListenerSet, Subscription, notify_all, subscribe_to};
use crate::domain::config::millis;
use crate::domain::{
    BusError, ComponentEvent, EventDraft, EventMetadata, ListenerError, RequestId,
};
use crate::ports::{Clock, IdGenerator, SystemClock, UlidGenerator};

/// Source recorded on responses published by `respond` / `respond_error`.
pub const RESPONSE_SOURCE: &str = "system";

/// Topic a request's answer is published on.
pub fn response_topic(topic: &str) -> String {
    format!("{topic}:response")
}

/// Bus settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BusConfig {
    /// Events kept per channel.
    pub history_capacity: usize,

    /// Timeout used by `request_default`.
    #[serde(with = "millis")]
    pub default_request_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            default_request_timeout: Duration::from_millis(30_000),
        }
    }
}

struct PendingRequest {
    topic: String,
    tx: oneshot::Sender<Result<Value, BusError>>,
}

type PendingTable = Arc<Mutex<HashMap<RequestId, PendingRequest>>>;

struct Inner {
    config: BusConfig,
    channels: Mutex<HashMap<String, Arc<Channel>>>,
    global: Arc<Mutex<ListenerSet>>,
    pending: PendingTable,
    clock: Arc<dyn Clock>,
    ids: Box<dyn IdGenerator>,
}

/// Process-wide message hub.
///
/// # Example
/// ```ignore
/// let bus = EventBus::new(BusConfig::default());
/// let _sub = bus.subscribe("chat", listener_fn(|event| {
///     println!("{}", event.event_type);
///     Ok(())
/// }));
/// bus.publish("chat", EventDraft::new("message", "chat-interface")).await;
/// ```
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Inner>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Bus whose event timestamps and ids come from `clock`.
    pub fn with_clock(config: BusConfig, clock: Arc<dyn Clock>) -> Self {
        let ids = Box::new(UlidGenerator::new(Arc::clone(&clock)));
        Self {
            inner: Arc::new(Inner {
                config,
                channels: Mutex::new(HashMap::new()),
                global: Arc::new(Mutex::new(ListenerSet::default())),
                pending: Arc::new(Mutex::new(HashMap::new())),
                clock,
                ids,
            }),
        }
    }

    pub fn config(&self) -> &BusConfig {
        &self.inner.config
    }

    fn channel(&self, topic: &str) -> Arc<Channel> {
        let mut channels = self.inner.channels.lock();
        let channel = channels.entry(topic.to_string()).or_insert_with(|| {
            debug!(channel = topic, "creating channel");
            Arc::new(Channel::new(topic, self.inner.config.history_capacity))
        });
        Arc::clone(channel)
    }

    fn existing_channel(&self, topic: &str) -> Option<Arc<Channel>> {
        self.inner.channels.lock().get(topic).cloned()
    }

    /// Stamp `draft` with an id and timestamp and deliver it.
    ///
    /// Topic listeners run first, then global listeners receive a copy tagged with
    /// the topic name. Listener failures are contained and logged.
    pub async fn publish(&self, topic: &str, draft: EventDraft) -> ComponentEvent {
        let event = ComponentEvent::from_draft(
            draft,
            self.inner.ids.generate_event_id(),
            self.inner.clock.now(),
        );
        debug!(
            channel = topic,
            event_id = %event.id,
            event_type = %event.event_type,
            source = %event.source,
            "publish"
        );

        let channel = self.channel(topic);
        channel.publish(event.clone()).await;

        let global = self.inner.global.lock().snapshot();
        if !global.is_empty() {
            let tagged = event.tagged(topic);
            notify_all("*", global, &tagged).await;
        }

        event
    }

    pub fn subscribe(&self, topic: &str, listener: Arc<dyn EventListener>) -> Subscription {
        self.channel(topic).subscribe(listener)
    }

    /// Receive every event published on any topic. Delivered events carry `channel`.
    pub fn subscribe_global(&self, listener: Arc<dyn EventListener>) -> Subscription {
        subscribe_to(&self.inner.global, listener)
    }

    /// Publish `draft` on `topic` and wait for the matching answer.
    ///
    /// The draft's metadata gets a fresh `request_id` and `response_channel =
    /// "<topic>:response"`. Resolves with the response's `data`, or fails with
    /// `RequestTimeout` if nothing arrives within `timeout`. Each request id
    /// resolves at most once; later answers are ignored.
    ///
    /// Listeners on `topic` run on a spawned task, so the timer starts immediately
    /// and a slow responder is never cancelled by the caller giving up.
    pub async fn request(
        &self,
        topic: &str,
        mut draft: EventDraft,
        timeout: Duration,
    ) -> Result<Value, BusError> {
        let request_id = self.inner.ids.generate_request_id();
        let response_channel = response_topic(topic);
        let (tx, rx) = oneshot::channel();

        self.inner.pending.lock().insert(
            request_id,
            PendingRequest {
                topic: topic.to_string(),
                tx,
            },
        );
        let subscription = self.subscribe(
            &response_channel,
            Arc::new(ResponseListener {
                request_id,
                pending: Arc::clone(&self.inner.pending),
            }),
        );
        let _guard = RequestGuard {
            request_id,
            pending: Arc::clone(&self.inner.pending),
            subscription,
        };

        let mut metadata = draft.metadata.take().unwrap_or_default();
        metadata.request_id = Some(request_id);
        metadata.response_channel = Some(response_channel);
        let draft = draft.with_metadata(metadata);

        debug!(channel = topic, request_id = %request_id, ?timeout, "request");
        let bus = self.clone();
        let target = topic.to_string();
        tokio::spawn(async move {
            bus.publish(&target, draft).await;
        });

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(BusError::ShuttingDown),
            Err(_) => {
                warn!(channel = topic, request_id = %request_id, ?timeout, "request timed out");
                Err(BusError::RequestTimeout {
                    topic: topic.to_string(),
                    request_id,
                    timeout,
                })
            }
        }
    }

    /// `request` with `BusConfig::default_request_timeout`.
    pub async fn request_default(&self, topic: &str, draft: EventDraft) -> Result<Value, BusError> {
        let timeout = self.inner.config.default_request_timeout;
        self.request(topic, draft, timeout).await
    }

    /// Answer a request event with `data`.
    ///
    /// Returns false (and logs a warning) when `original` carries no correlation
    /// metadata.
    pub async fn respond(&self, original: &ComponentEvent, data: Value) -> bool {
        let Some((request_id, response_channel)) = correlation_of(original) else {
            warn!(event_id = %original.id, "cannot respond: missing responseChannel or requestId");
            return false;
        };
        let draft = EventDraft::new("response", RESPONSE_SOURCE)
            .with_data(data)
            .with_metadata(EventMetadata {
                request_id: Some(request_id),
                ..Default::default()
            });
        self.publish(&response_channel, draft).await;
        true
    }

    /// Answer a request event with a failure. The requester gets `BusError::Responder`.
    pub async fn respond_error(&self, original: &ComponentEvent, message: impl Into<String>) -> bool {
        let Some((request_id, response_channel)) = correlation_of(original) else {
            warn!(event_id = %original.id, "cannot respond with error: missing responseChannel or requestId");
            return false;
        };
        let draft = EventDraft::new("error", RESPONSE_SOURCE).with_metadata(EventMetadata {
            request_id: Some(request_id),
            error: Some(message.into()),
            ..Default::default()
        });
        self.publish(&response_channel, draft).await;
        true
    }

    /// Past events of `topic`, oldest first. Empty for unknown topics.
    pub fn history(&self, topic: &str, limit: Option<usize>) -> Vec<ComponentEvent> {
        self.existing_channel(topic)
            .map(|channel| channel.history(limit))
            .unwrap_or_default()
    }

    /// Names of all channels created so far, sorted.
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.channels.lock().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn channel_stats(&self, topic: &str) -> Option<ChannelStats> {
        self.existing_channel(topic).map(|channel| channel.stats())
    }

    /// Drop a channel with its listeners and history. Returns false if it did not exist.
    pub fn clear_channel(&self, topic: &str) -> bool {
        let removed = self.inner.channels.lock().remove(topic);
        match removed {
            Some(channel) => {
                channel.clear();
                true
            }
            None => false,
        }
    }

    /// Requests still waiting for an answer.
    pub fn pending_request_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    /// Tear the bus down.
    ///
    /// Every outstanding request fails with `BusError::ShuttingDown`; all channels and
    /// global listeners are dropped. The bus stays usable afterwards: publishing
    /// again creates fresh channels.
    pub fn shutdown(&self) {
        let pending: Vec<(RequestId, PendingRequest)> =
            self.inner.pending.lock().drain().collect();
        for (request_id, request) in pending {
            debug!(request_id = %request_id, channel = %request.topic, "rejecting pending request");
            let _ = request.tx.send(Err(BusError::ShuttingDown));
        }

        let channels: Vec<Arc<Channel>> =
            self.inner.channels.lock().drain().map(|(_, channel)| channel).collect();
        for channel in &channels {
            channel.clear();
        }
        self.inner.global.lock().clear();

        debug!(channels = channels.len(), "event bus shut down");
    }
}

fn correlation_of(event: &ComponentEvent) -> Option<(RequestId, String)> {
    event
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.correlation())
        .map(|(request_id, channel)| (request_id, channel.to_string()))
}

/// Resolves one pending request from its response channel.
struct ResponseListener {
    request_id: RequestId,
    pending: PendingTable,
}

#[async_trait]
impl EventListener for ResponseListener {
    async fn on_event(&self, event: &ComponentEvent) -> Result<(), ListenerError> {
        if event.request_id() != Some(self.request_id) {
            return Ok(());
        }
        // Removal is the at-most-once point: whoever takes the entry resolves it.
        let Some(pending) = self.pending.lock().remove(&self.request_id) else {
            return Ok(());
        };
        let result = match event.error() {
            Some(message) => Err(BusError::Responder(message.to_string())),
            None => Ok(event.data.clone()),
        };
        let _ = pending.tx.send(result);
        Ok(())
    }
}

/// Cleans up a request on every exit path, including the caller dropping the future.
struct RequestGuard {
    request_id: RequestId,
    pending: PendingTable,
    subscription: Subscription,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.pending.lock().remove(&self.request_id);
        self.subscription.unsubscribe();
    }
}
