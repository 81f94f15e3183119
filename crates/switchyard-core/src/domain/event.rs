//! Event - バスに流れるイベント
//!
//! 発行側は `EventDraft` を作り、バスが id と timestamp を付けて `ComponentEvent` にする。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::{EventId, RequestId};

/// Correlation and error data attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,

    /// Topic the responder should publish its answer on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_channel: Option<String>,

    /// Set on error responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Caller-defined fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventMetadata {
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Correlation pair, present only on events that can be answered.
    pub fn correlation(&self) -> Option<(RequestId, &str)> {
        match (&self.request_id, &self.response_channel) {
            (Some(id), Some(channel)) => Some((*id, channel.as_str())),
            _ => None,
        }
    }
}

/// An event before publication: everything except `id` and `timestamp`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDraft {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    #[serde(default)]
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,
}

impl EventDraft {
    pub fn new(event_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            source: source.into(),
            data: Value::Null,
            metadata: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A published event. Never mutated after publication.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentEvent {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EventMetadata>,

    /// Topic name. Only set on the copies delivered to global listeners.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

impl ComponentEvent {
    pub fn from_draft(draft: EventDraft, id: EventId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            timestamp,
            event_type: draft.event_type,
            source: draft.source,
            data: draft.data,
            metadata: draft.metadata,
            channel: None,
        }
    }

    pub fn request_id(&self) -> Option<RequestId> {
        self.metadata.as_ref().and_then(|m| m.request_id)
    }

    pub fn error(&self) -> Option<&str> {
        self.metadata.as_ref().and_then(|m| m.error.as_deref())
    }

    pub(crate) fn tagged(&self, channel: &str) -> Self {
        let mut copy = self.clone();
        copy.channel = Some(channel.to_string());
        copy
    }
}
