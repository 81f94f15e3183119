//! Errors - レイヤーごとのエラー型
//!
//! - `ComponentError`: what a component reports from its own lifecycle calls.
//! - `BusError`: messaging failures (request timeout, responder error, shutdown).
//! - `LifecycleError`: registration, dependency and per-component lifecycle failures.
//! - `OrchestratorError`: everything the orchestration root can surface.
//! - `BuildError` / `ConfigError`: catalog validation and config loading.
//!
//! Structural errors (duplicate id, missing dependency, cycle) are raised before any
//! side effect. Lifecycle errors abort the batch they occur in without rollback.

use std::time::Duration;

use thiserror::Error;

use super::ids::{ComponentId, RequestId};
use super::status::ComponentStatus;

/// Boxed error for listener and factory failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ComponentError {
    #[error("{0}")]
    Failed(String),

    #[error("component not ready to start, current status: {status}")]
    NotReady { status: ComponentStatus },

    #[error("component not running, current status: {status}")]
    NotRunning { status: ComponentStatus },

    #[error("invalid settings: {0}")]
    InvalidSettings(String),
}

impl ComponentError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// A listener failed while handling an event. Contained by the channel.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("listener failed: {0}")]
    Failed(#[source] BoxError),

    #[error("listener panicked: {0}")]
    Panicked(String),
}

impl ListenerError {
    pub fn msg(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Failed(message.into())
    }
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("request {request_id} on '{topic}' timed out after {timeout:?}")]
    RequestTimeout {
        topic: String,
        request_id: RequestId,
        timeout: Duration,
    },

    #[error("responder returned an error: {0}")]
    Responder(String),

    #[error("system shutting down")]
    ShuttingDown,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("component {0} is already registered")]
    AlreadyRegistered(ComponentId),

    #[error("component {0} is not registered")]
    UnknownComponent(ComponentId),

    #[error("dependency cycle detected among {ids:?}")]
    DependencyCycle { ids: Vec<ComponentId> },

    #[error("missing dependencies: {}", format_missing(.missing))]
    MissingDependencies {
        /// (component, dependency it declares but nobody registered)
        missing: Vec<(ComponentId, ComponentId)>,
    },

    #[error("no components registered")]
    NothingRegistered,

    #[error("components have not been initialized")]
    NotInitialized,

    #[error("component {id} failed to initialize after {attempts} attempt(s): {source}")]
    InitializationFailed {
        id: ComponentId,
        attempts: u32,
        #[source]
        source: ComponentError,
    },

    #[error("component {id} failed to start: {source}")]
    StartFailed {
        id: ComponentId,
        #[source]
        source: ComponentError,
    },

    #[error("component {id} failed to stop: {source}")]
    StopFailed {
        id: ComponentId,
        #[source]
        source: ComponentError,
    },

    #[error("component {id} did not finish {operation} within {timeout:?}")]
    Timeout {
        id: ComponentId,
        operation: &'static str,
        timeout: Duration,
    },
}

impl LifecycleError {
    /// Ids this error is about, for structural errors.
    pub fn offending_ids(&self) -> Vec<ComponentId> {
        match self {
            LifecycleError::DependencyCycle { ids } => ids.clone(),
            LifecycleError::MissingDependencies { missing } => {
                missing.iter().map(|(_, dep)| dep.clone()).collect()
            }
            LifecycleError::AlreadyRegistered(id) | LifecycleError::UnknownComponent(id) => {
                vec![id.clone()]
            }
            LifecycleError::InitializationFailed { id, .. }
            | LifecycleError::StartFailed { id, .. }
            | LifecycleError::StopFailed { id, .. }
            | LifecycleError::Timeout { id, .. } => vec![id.clone()],
            LifecycleError::NothingRegistered | LifecycleError::NotInitialized => Vec::new(),
        }
    }
}

fn format_missing(missing: &[(ComponentId, ComponentId)]) -> String {
    missing
        .iter()
        .map(|(component, dep)| format!("{component} -> {dep}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("orchestrator has not been initialized")]
    NotInitialized,

    #[error("component {0} is not enabled")]
    NotEnabled(ComponentId),

    #[error("component {0} is not in the catalog")]
    UnknownComponent(ComponentId),

    #[error("component {id} is not a {expected}")]
    TypeMismatch {
        id: ComponentId,
        expected: &'static str,
    },

    #[error("factory for {id} failed: {source}")]
    Factory {
        id: ComponentId,
        #[source]
        source: ComponentError,
    },
}

/// Catalog and configuration validation, raised by `OrchestratorBuilder::build`
/// before anything is instantiated.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("component {0} is defined twice in the catalog")]
    DuplicateDefinition(ComponentId),

    #[error("configuration names components missing from the catalog: {0:?}")]
    UnknownComponents(Vec<String>),

    #[error("catalog dependencies point at undefined components: {}", format_missing(.0))]
    UnknownDependencies(Vec<(ComponentId, ComponentId)>),

    #[error("catalog dependency cycle among {0:?}")]
    DependencyCycle(Vec<ComponentId>),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_dependencies_message_lists_edges() {
        let err = LifecycleError::MissingDependencies {
            missing: vec![(ComponentId::new("b"), ComponentId::new("a"))],
        };
        assert_eq!(err.to_string(), "missing dependencies: b -> a");
        assert_eq!(err.offending_ids(), vec![ComponentId::new("a")]);
    }

    #[test]
    fn unknown_catalog_dependency_message() {
        let err = BuildError::UnknownDependencies(vec![(
            ComponentId::new("toolbox-panel"),
            ComponentId::new("ai-actions"),
        )]);
        assert_eq!(
            err.to_string(),
            "catalog dependencies point at undefined components: toolbox-panel -> ai-actions"
        );
    }

    #[test]
    fn cycle_reports_ids() {
        let err = LifecycleError::DependencyCycle {
            ids: vec![ComponentId::new("x"), ComponentId::new("y")],
        };
        assert!(err.to_string().contains("\"x\""));
        assert_eq!(err.offending_ids().len(), 2);
    }
}
