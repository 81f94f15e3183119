//! ComponentStatus - コンポーネントの状態と遷移可否

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a component.
///
/// State transitions:
/// - Idle -> Initializing -> Ready -> Running -> Paused
/// - Initializing / Ready / Running -> Error
/// - Paused -> Running (resume) or Paused -> Initializing (restart)
/// - Ready / Error -> Initializing (re-initialize)
/// - any -> Destroyed (terminal)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Registered, nothing run yet.
    #[default]
    Idle,

    /// `initialize` in progress.
    Initializing,

    /// Initialized and waiting to be started.
    Ready,

    /// Started.
    Running,

    /// Stopped after running. Can be resumed or re-initialized.
    Paused,

    /// The last lifecycle call failed.
    Error,

    /// Destroyed. No further transitions.
    Destroyed,
}

impl ComponentStatus {
    /// A component counts as healthy when it is ready or running.
    pub fn is_healthy(self) -> bool {
        matches!(self, ComponentStatus::Ready | ComponentStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ComponentStatus::Destroyed)
    }

    /// Whether `self -> next` is an edge of the lifecycle state machine.
    pub fn can_transition_to(self, next: ComponentStatus) -> bool {
        use ComponentStatus::*;

        if self == Destroyed {
            return false;
        }
        match (self, next) {
            (_, Destroyed) => true,
            (Idle, Initializing) => true,
            (Initializing, Ready | Error) => true,
            (Ready, Running | Error | Initializing) => true,
            (Running, Paused | Error) => true,
            (Paused, Running | Initializing | Error) => true,
            (Error, Initializing) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ComponentStatus::Idle => "idle",
            ComponentStatus::Initializing => "initializing",
            ComponentStatus::Ready => "ready",
            ComponentStatus::Running => "running",
            ComponentStatus::Paused => "paused",
            ComponentStatus::Error => "error",
            ComponentStatus::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
