//! switchyard-core
//!
//! Core building blocks for the Switchyard component runtime.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, status, config, event, errors）
//! - **ports**: 抽象化レイヤー（Component, Clock, IdGenerator）
//! - **bus**: Channel / EventBus / listener、request-response
//! - **lifecycle**: DependencyGraph、LifecycleManager、health 集計
//! - **app**: ComponentCatalog、OrchestratorBuilder、Orchestrator

pub mod app;
pub mod bus;
pub mod domain;
pub mod lifecycle;
pub mod ports;

pub use app::{ComponentCatalog, FactoryContext, Orchestrator, OrchestratorBuilder, OrchestratorConfig};
pub use bus::EventBus;
pub use domain::{ComponentConfig, ComponentEvent, ComponentId, ComponentStatus, EventDraft};
pub use lifecycle::LifecycleManager;
pub use ports::Component;
