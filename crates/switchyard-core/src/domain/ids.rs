//! Ids - ドメイン識別子
//!
//! Two families of ids live here:
//! - `ComponentId`: a human-chosen, stable string (`"context-manager"`). Components are
//!   declared in catalogs and configuration files, so the id must round-trip through JSON
//!   unchanged.
//! - `Id<T>`: ULID-backed ids generated at runtime (`EventId`, `RequestId`). The phantom
//!   marker keeps them from being mixed up while sharing one implementation.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// Identifier of a component. Unique across a `LifecycleManager`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComponentId(String);

impl ComponentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Normalize an enablement-map key into a component id.
    ///
    /// Configuration files commonly use camelCase keys (`aiActionsManager`) while
    /// component ids are kebab-case (`ai-actions-manager`). Keys that are already
    /// kebab-case are returned unchanged.
    pub fn from_config_key(key: &str) -> Self {
        let mut id = String::with_capacity(key.len() + 4);
        for (i, ch) in key.chars().enumerate() {
            if ch.is_ascii_uppercase() {
                if i > 0 && !id.ends_with('-') {
                    id.push('-');
                }
                id.push(ch.to_ascii_lowercase());
            } else if ch == '_' {
                id.push('-');
            } else {
                id.push(ch);
            }
        }
        Self(id)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ComponentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ComponentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl Borrow<str> for ComponentId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Marker trait for generated id types. Provides the `Display` prefix.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic ULID-backed id.
///
/// `T` only exists at compile time, so `EventId` and `RequestId` cannot be confused.
#[repr(transparent)]
#[derive(Serialize, Deserialize)]
#[serde(transparent, bound = "")]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

// Manual impls: derives would put the bounds on `T`, which is an uninhabited marker.
impl<T: IdMarker> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: IdMarker> Copy for Id<T> {}

impl<T: IdMarker> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl<T: IdMarker> Eq for Id<T> {}

impl<T: IdMarker> std::hash::Hash for Id<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl<T: IdMarker> PartialOrd for Id<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: IdMarker> Ord for Id<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Event {}

impl IdMarker for Event {
    fn prefix() -> &'static str {
        "evt-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Request {}

impl IdMarker for Request {
    fn prefix() -> &'static str {
        "req-"
    }
}

/// Identifier of a published event (unique per publish).
pub type EventId = Id<Event>;

/// Correlation id linking a request to its response.
pub type RequestId = Id<Request>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("contextManager", "context-manager")]
    #[case("aiActionsManager", "ai-actions-manager")]
    #[case("chat-interface", "chat-interface")]
    #[case("knowledge_base", "knowledge-base")]
    #[case("ContextManager", "context-manager")]
    fn config_keys_are_normalized(#[case] key: &str, #[case] expected: &str) {
        assert_eq!(ComponentId::from_config_key(key).as_str(), expected);
    }

    #[test]
    fn generated_ids_display_with_prefix() {
        let event = EventId::from_ulid(Ulid::new());
        let request = RequestId::from_ulid(Ulid::new());
        assert!(event.to_string().starts_with("evt-"));
        assert!(request.to_string().starts_with("req-"));
    }

    #[test]
    fn request_id_survives_json() {
        let id = RequestId::from_ulid(Ulid::new());
        let json = serde_json::to_string(&id).unwrap();
        let back: RequestId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn component_id_serializes_as_plain_string() {
        let id = ComponentId::new("toolbox-panel");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"toolbox-panel\"");
    }
}
