//! App - アプリケーション層
//!
//! catalog と設定から Orchestrator を組み立て、コンポーネント群を駆動します。
//!
//! # 主要コンポーネント
//! - **ComponentCatalog**: id -> (factory, dependencies) の静的な定義集
//! - **OrchestratorConfig**: 有効化マップ、コンポーネント設定、autoStart
//! - **OrchestratorBuilder**: 検証とワイヤリング
//! - **Orchestrator**: 依存閉包の解決、生成、initialize / start / stop / cleanup
//! - **SystemStatus**: 全体状態のスナップショット

pub mod builder;
pub mod catalog;
pub mod config;
pub mod orchestrator;
pub mod status;

// 主要な型を再エクスポート
pub use self::builder::OrchestratorBuilder;
pub use self::catalog::{ComponentCatalog, FactoryContext};
pub use self::config::OrchestratorConfig;
pub use self::orchestrator::{ORCHESTRATOR_SOURCE, Orchestrator, events};
pub use self::status::SystemStatus;
