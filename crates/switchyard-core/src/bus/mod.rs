//! Bus - メッセージング（Channel, EventBus, listener）
//!
//! - `Channel`: one topic, listener set plus bounded history
//! - `EventBus`: lazily created channels, global listeners, request/response
//! - `EventListener` / `Subscription`: how code attaches to a topic

pub mod channel;
pub mod event_bus;
pub mod listener;

pub use channel::{Channel, ChannelStats, DEFAULT_HISTORY_CAPACITY};
pub use event_bus::{BusConfig, EventBus, RESPONSE_SOURCE, response_topic};
pub use listener::{EventListener, Subscription, async_listener_fn, listener_fn};

/// Topic carrying component lifecycle announcements.
pub const LIFECYCLE_TOPIC: &str = "lifecycle";

/// Topic carrying orchestrator-level announcements.
pub const SYSTEM_TOPIC: &str = "system";
