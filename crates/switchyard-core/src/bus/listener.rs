//! Listener - リスナー登録と購読ハンドル
//!
//! # 方針
//! - リスナーは並行に呼び、エラーと panic はログに残して握りつぶす
//! - `Subscription` を drop しても購読は解除されない（`unsubscribe` で明示的に外す）

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::join_all;
use parking_lot::Mutex;
use tracing::warn;

use crate::domain::{ComponentEvent, ListenerError};

/// Receives events published on a channel (or on every channel, when global).
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, event: &ComponentEvent) -> Result<(), ListenerError>;
}

struct FnListener<F>(F);

#[async_trait]
impl<F> EventListener for FnListener<F>
where
    F: Fn(&ComponentEvent) -> Result<(), ListenerError> + Send + Sync,
{
    async fn on_event(&self, event: &ComponentEvent) -> Result<(), ListenerError> {
        (self.0)(event)
    }
}

/// Wrap a synchronous closure as a listener.
pub fn listener_fn<F>(f: F) -> Arc<dyn EventListener>
where
    F: Fn(&ComponentEvent) -> Result<(), ListenerError> + Send + Sync + 'static,
{
    Arc::new(FnListener(f))
}

struct AsyncFnListener<F>(F);

#[async_trait]
impl<F, Fut> EventListener for AsyncFnListener<F>
where
    F: Fn(ComponentEvent) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ListenerError>> + Send,
{
    async fn on_event(&self, event: &ComponentEvent) -> Result<(), ListenerError> {
        (self.0)(event.clone()).await
    }
}

/// Wrap an async closure as a listener. The closure receives its own copy of the event,
/// which lets responders move it into `EventBus::respond`.
pub fn async_listener_fn<F, Fut>(f: F) -> Arc<dyn EventListener>
where
    F: Fn(ComponentEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), ListenerError>> + Send + 'static,
{
    Arc::new(AsyncFnListener(f))
}

/// Unordered set of listeners keyed by a per-set id.
#[derive(Default)]
pub(crate) struct ListenerSet {
    next_id: u64,
    listeners: HashMap<u64, Arc<dyn EventListener>>,
}

impl ListenerSet {
    pub(crate) fn insert(&mut self, listener: Arc<dyn EventListener>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.listeners.insert(id, listener);
        id
    }

    pub(crate) fn remove(&mut self, id: u64) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn EventListener>> {
        self.listeners.values().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn clear(&mut self) {
        self.listeners.clear();
    }
}

/// Subscribe `listener` to `set` and hand back the removal handle.
pub(crate) fn subscribe_to(
    set: &Arc<Mutex<ListenerSet>>,
    listener: Arc<dyn EventListener>,
) -> Subscription {
    let id = set.lock().insert(listener);
    Subscription {
        id,
        set: Arc::downgrade(set),
    }
}

/// Handle returned by `subscribe`.
///
/// Dropping it keeps the listener subscribed; call `unsubscribe` to remove it.
#[derive(Debug)]
#[must_use = "keep the handle if the listener ever needs to be removed"]
pub struct Subscription {
    id: u64,
    set: Weak<Mutex<ListenerSet>>,
}

impl Subscription {
    /// Remove the listener. Returns false if it was already gone (channel cleared,
    /// bus shut down, or unsubscribed twice).
    pub fn unsubscribe(&self) -> bool {
        match self.set.upgrade() {
            Some(set) => set.lock().remove(self.id),
            None => false,
        }
    }

    /// Whether the listener is still subscribed.
    pub fn is_active(&self) -> bool {
        self.set
            .upgrade()
            .map(|set| set.lock().listeners.contains_key(&self.id))
            .unwrap_or(false)
    }
}

/// Invoke every listener concurrently and wait for all of them.
///
/// Errors and panics are logged and counted, never propagated.
pub(crate) async fn notify_all(
    scope: &str,
    listeners: Vec<Arc<dyn EventListener>>,
    event: &ComponentEvent,
) -> usize {
    if listeners.is_empty() {
        return 0;
    }

    let calls = listeners.iter().map(|listener| async move {
        match AssertUnwindSafe(listener.on_event(event)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(ListenerError::Panicked(panic_message(payload.as_ref()))),
        }
    });

    let mut failures = 0;
    for result in join_all(calls).await {
        if let Err(err) = result {
            failures += 1;
            warn!(
                channel = scope,
                event_id = %event.id,
                event_type = %event.event_type,
                error = %err,
                "listener failed"
            );
        }
    }
    failures
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EventDraft, EventId};
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use ulid::Ulid;

    fn event() -> ComponentEvent {
        ComponentEvent::from_draft(
            EventDraft::new("ping", "test"),
            EventId::from_ulid(Ulid::new()),
            Utc::now(),
        )
    }

    #[test]
    fn unsubscribe_removes_listener_once() {
        let set = Arc::new(Mutex::new(ListenerSet::default()));
        let sub = subscribe_to(&set, listener_fn(|_| Ok(())));

        assert!(sub.is_active());
        assert!(sub.unsubscribe());
        assert!(!sub.unsubscribe());
        assert!(!sub.is_active());
        assert_eq!(set.lock().len(), 0);
    }

    #[test]
    fn unsubscribe_after_set_dropped_is_noop() {
        let set = Arc::new(Mutex::new(ListenerSet::default()));
        let sub = subscribe_to(&set, listener_fn(|_| Ok(())));
        drop(set);
        assert!(!sub.unsubscribe());
    }

    #[tokio::test]
    async fn failures_and_panics_are_contained() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let listeners = vec![
            listener_fn(|_| Err(ListenerError::msg("boom"))),
            listener_fn(|_| panic!("listener panic")),
            listener_fn(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        ];

        let failures = notify_all("test", listeners, &event()).await;
        assert_eq!(failures, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn async_listener_receives_owned_event() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = async_listener_fn(move |event: ComponentEvent| {
            let sink = Arc::clone(&sink);
            async move {
                sink.lock().push(event.event_type);
                Ok(())
            }
        });

        notify_all("test", vec![listener], &event()).await;
        assert_eq!(*seen.lock(), vec!["ping".to_string()]);
    }
}
