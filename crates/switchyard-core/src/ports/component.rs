//! Component port - ライフサイクル契約
//!
//! # 役割
//! - オーケストレーション対象の機能モジュールが実装する trait
//! - initialize / start / stop / destroy を LifecycleManager から呼ばれる
//!
//! 他コンポーネントとのやり取りは EventBus 経由のみ。

use async_trait::async_trait;

use crate::domain::{ComponentConfig, ComponentError, ComponentId, ComponentStatus};

/// A unit with a lifecycle, declared dependencies and a start priority.
///
/// The `LifecycleManager` drives these calls; components never call each other
/// directly and talk through the `EventBus` instead. All methods take `&self`, so
/// implementations keep their mutable state behind interior mutability.
///
/// # Example
/// ```ignore
/// struct Cache { config: ComponentConfig, status: Mutex<ComponentStatus> }
///
/// #[async_trait]
/// impl Component for Cache {
///     fn config(&self) -> &ComponentConfig { &self.config }
///     fn status(&self) -> ComponentStatus { *self.status.lock() }
///     async fn initialize(&self, _config: &ComponentConfig) -> Result<(), ComponentError> {
///         *self.status.lock() = ComponentStatus::Ready;
///         Ok(())
///     }
///     // start / stop / destroy ...
/// }
/// ```
#[async_trait]
pub trait Component: Send + Sync {
    /// Configuration record. Carries `id`, `name`, `dependencies` and `priority`.
    fn config(&self) -> &ComponentConfig;

    fn id(&self) -> &ComponentId {
        &self.config().id
    }

    fn name(&self) -> &str {
        &self.config().name
    }

    /// Status as the component itself sees it.
    fn status(&self) -> ComponentStatus;

    async fn initialize(&self, config: &ComponentConfig) -> Result<(), ComponentError>;

    async fn start(&self) -> Result<(), ComponentError>;

    async fn stop(&self) -> Result<(), ComponentError>;

    /// Release resources. Called exactly once, never fails.
    async fn destroy(&self);
}
