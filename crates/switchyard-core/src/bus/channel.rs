//! Channel: one named topic with a listener set and a bounded replay buffer.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use super::listener::{EventListener, ListenerSet, Subscription, notify_all, subscribe_to};
use crate::domain::ComponentEvent;

/// Default number of events each channel keeps.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Listener and history counts for one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub listener_count: usize,
    pub history_size: usize,
}

/// A single topic.
///
/// Invariants:
/// - history length never exceeds `capacity`; the oldest event is evicted first
/// - history order is exactly publish order
/// - no lock is held while listeners run, so a listener may publish again
pub struct Channel {
    name: String,
    capacity: usize,
    listeners: Arc<Mutex<ListenerSet>>,
    history: Mutex<VecDeque<ComponentEvent>>,
}

impl Channel {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            listeners: Arc::new(Mutex::new(ListenerSet::default())),
            history: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> Subscription {
        subscribe_to(&self.listeners, listener)
    }

    /// Record `event` and deliver it to every current listener.
    ///
    /// Returns once all listeners have finished. Listener failures are logged and
    /// counted in the return value; they never fail the publish.
    pub async fn publish(&self, event: ComponentEvent) -> usize {
        {
            let mut history = self.history.lock();
            history.push_back(event.clone());
            while history.len() > self.capacity {
                history.pop_front();
            }
        }

        let listeners = self.listeners.lock().snapshot();
        notify_all(&self.name, listeners, &event).await
    }

    /// Past events, oldest first. `limit` keeps only the most recent ones.
    pub fn history(&self, limit: Option<usize>) -> Vec<ComponentEvent> {
        let history = self.history.lock();
        let skip = match limit {
            Some(limit) => history.len().saturating_sub(limit),
            None => 0,
        };
        history.iter().skip(skip).cloned().collect()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            listener_count: self.listener_count(),
            history_size: self.history.lock().len(),
        }
    }

    /// Drop every listener. History is kept.
    pub fn clear(&self) {
        self.listeners.lock().clear();
    }
}
