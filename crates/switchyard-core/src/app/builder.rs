//! OrchestratorBuilder - catalog と設定から Orchestrator を組み立てる
//!
//! # Fail-fast 設計
//! - build() 時に設定と catalog を突き合わせて検証する
//! - コンポーネントは一つも生成しない（生成は `Orchestrator::initialize` で行う）

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use super::catalog::ComponentCatalog;
use super::config::OrchestratorConfig;
use super::orchestrator::Orchestrator;
use crate::bus::EventBus;
use crate::domain::{BuildError, ComponentId};
use crate::lifecycle::DependencyGraph;
use crate::ports::Clock;

/// OrchestratorBuilder は Orchestrator を構築
///
/// # 使用例
/// ```ignore
/// let orchestrator = OrchestratorBuilder::new(catalog)
///     .config(OrchestratorConfig::from_path("switchyard.json")?)
///     .build()?;
/// ```
///
/// # 検証
/// - enabledComponents / components のキーが全て catalog に存在すること
/// - catalog の依存先が全て定義済みであること
/// - catalog の依存関係に循環がないこと
pub struct OrchestratorBuilder {
    catalog: ComponentCatalog,
    config: OrchestratorConfig,
    bus: Option<EventBus>,
    clock: Option<Arc<dyn Clock>>,
}

impl OrchestratorBuilder {
    pub fn new(catalog: ComponentCatalog) -> Self {
        Self {
            catalog,
            config: OrchestratorConfig::default(),
            bus: None,
            clock: None,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Use an existing bus instead of creating one from `config.bus`.
    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Clock for the bus created by `build`. Ignored when `bus` is set.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<Orchestrator, BuildError> {
        let enablement = self.config.enablement();
        let settings = self.config.settings();

        // 設定側のキーが catalog に存在するか
        let unknown: BTreeSet<String> = self
            .config
            .enabled_components
            .keys()
            .chain(self.config.components.keys())
            .filter(|key| !self.catalog.contains(&ComponentId::from_config_key(key)))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(BuildError::UnknownComponents(unknown.into_iter().collect()));
        }

        // catalog の依存先が定義済みか、循環がないか
        let mut graph = DependencyGraph::new();
        for id in self.catalog.ids() {
            let deps = self.catalog.dependencies_of(id).unwrap_or(&[]);
            graph.add_node(id.clone(), deps);
        }
        let missing = graph.missing_dependencies();
        if !missing.is_empty() {
            return Err(BuildError::UnknownDependencies(missing));
        }
        graph
            .topological_order()
            .map_err(BuildError::DependencyCycle)?;

        let enabled: Vec<ComponentId> = self
            .catalog
            .ids()
            .iter()
            .filter(|id| {
                enablement
                    .get(*id)
                    .copied()
                    .unwrap_or(self.config.default_enabled)
            })
            .cloned()
            .collect();
        debug!(enabled = enabled.len(), defined = self.catalog.len(), "orchestrator built");

        let bus = match (self.bus, self.clock) {
            (Some(bus), _) => bus,
            (None, Some(clock)) => EventBus::with_clock(self.config.bus.clone(), clock),
            (None, None) => EventBus::new(self.config.bus.clone()),
        };

        Ok(Orchestrator::new(
            self.catalog,
            self.config,
            enabled,
            settings,
            bus,
        ))
    }
}
