//! Domain - ドメインモデル（ids, status, config, event, errors）

pub mod config;
pub mod errors;
pub mod event;
pub mod ids;
pub mod status;

pub use config::{ComponentConfig, MetricsConfig, RetryPolicy};
pub use errors::{
    BoxError, BuildError, BusError, ComponentError, ConfigError, LifecycleError, ListenerError,
    OrchestratorError,
};
pub use event::{ComponentEvent, EventDraft, EventMetadata};
pub use ids::{ComponentId, EventId, RequestId};
pub use status::ComponentStatus;
