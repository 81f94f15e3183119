//! Lifecycle - 依存グラフ、LifecycleManager、health 集計

pub mod graph;
pub mod health;
pub mod manager;

pub use graph::DependencyGraph;
pub use health::{ComponentHealth, HealthReport};
pub use manager::{LifecycleManager, RestartOptions, events};
