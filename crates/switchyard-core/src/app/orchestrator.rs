//! Orchestrator: turns a catalog plus an enablement map into live, ordered components.
//!
//! Flow: resolve closure -> instantiate bottom-up -> register -> initialize_all ->
//! start_all -> steady state -> stop_all -> destroy.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::catalog::{ComponentCatalog, FactoryContext, Instance};
use super::config::OrchestratorConfig;
use super::status::SystemStatus;
use crate::bus::{EventBus, SYSTEM_TOPIC};
use crate::domain::{ComponentError, ComponentId, EventDraft, LifecycleError, OrchestratorError};
use crate::lifecycle::{DependencyGraph, HealthReport, LifecycleManager};
use crate::ports::Component;

/// Source recorded on `system` topic events.
pub const ORCHESTRATOR_SOURCE: &str = "orchestrator";

/// Event types published on the `system` topic.
pub mod events {
    pub const SYSTEM_INITIALIZED: &str = "system_initialized";
    pub const SYSTEM_STARTED: &str = "system_started";
    pub const SYSTEM_STOPPED: &str = "system_stopped";
}

#[derive(Debug, Default, Clone, Copy)]
struct Phase {
    initialized: bool,
    started: bool,
}

/// Orchestration root. Owns the bus, the lifecycle manager and every created instance.
///
/// Built by `OrchestratorBuilder`.
pub struct Orchestrator {
    catalog: ComponentCatalog,
    config: OrchestratorConfig,
    enabled: Vec<ComponentId>,
    settings: BTreeMap<ComponentId, Value>,
    bus: EventBus,
    lifecycle: LifecycleManager,
    instances: Mutex<HashMap<ComponentId, Instance>>,
    phase: Mutex<Phase>,
}

impl Orchestrator {
    pub(crate) fn new(
        catalog: ComponentCatalog,
        config: OrchestratorConfig,
        enabled: Vec<ComponentId>,
        settings: BTreeMap<ComponentId, Value>,
        bus: EventBus,
    ) -> Self {
        let lifecycle = LifecycleManager::new(bus.clone());
        Self {
            catalog,
            config,
            enabled,
            settings,
            bus,
            lifecycle,
            instances: Mutex::new(HashMap::new()),
            phase: Mutex::new(Phase::default()),
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn lifecycle(&self) -> &LifecycleManager {
        &self.lifecycle
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Enabled components, in catalog order. Dependencies are not included.
    pub fn enabled_components(&self) -> Vec<ComponentId> {
        self.enabled.clone()
    }

    /// Enabled components plus everything they depend on, transitively, in catalog order.
    pub fn resolve_closure(&self) -> Vec<ComponentId> {
        let mut memo: HashMap<ComponentId, HashSet<ComponentId>> = HashMap::new();
        let mut closure: HashSet<ComponentId> = HashSet::new();
        for id in &self.enabled {
            closure.insert(id.clone());
            let mut visiting = HashSet::new();
            closure.extend(self.dependencies_of(id, &mut memo, &mut visiting));
        }

        let mut ordered: Vec<ComponentId> = closure.into_iter().collect();
        ordered.sort_by_key(|id| self.catalog.position(id));
        ordered
    }

    /// Transitive dependencies of `id`, memoized across the enabled roots.
    fn dependencies_of(
        &self,
        id: &ComponentId,
        memo: &mut HashMap<ComponentId, HashSet<ComponentId>>,
        visiting: &mut HashSet<ComponentId>,
    ) -> HashSet<ComponentId> {
        if let Some(known) = memo.get(id) {
            return known.clone();
        }
        // catalog cycles are rejected at build time; this only keeps recursion finite
        if !visiting.insert(id.clone()) {
            return HashSet::new();
        }

        let mut deps = HashSet::new();
        for dep in self.catalog.dependencies_of(id).unwrap_or(&[]) {
            deps.insert(dep.clone());
            deps.extend(self.dependencies_of(dep, memo, visiting));
        }

        visiting.remove(id);
        memo.insert(id.clone(), deps.clone());
        deps
    }

    /// The closure in instantiation order (dependencies first).
    pub fn creation_order(&self) -> Result<Vec<ComponentId>, OrchestratorError> {
        let mut graph = DependencyGraph::new();
        for id in self.resolve_closure() {
            let deps = self.catalog.dependencies_of(&id).unwrap_or(&[]).to_vec();
            graph.add_node(id, &deps);
        }
        graph
            .topological_order()
            .map_err(|ids| OrchestratorError::Lifecycle(LifecycleError::DependencyCycle { ids }))
    }

    /// Create and register the closure, initialize everything, and start when
    /// `auto_start` is set. A second call after success is a no-op.
    ///
    /// After a failure, calling again only creates components that are not
    /// registered yet and retries initialization.
    pub async fn initialize(&self) -> Result<(), OrchestratorError> {
        if self.phase.lock().initialized {
            warn!("orchestrator already initialized, skipping");
            return Ok(());
        }

        info!(enabled = self.enabled.len(), "initializing component system");
        let created = self.create_components()?;
        info!(created, "components created");

        self.lifecycle.initialize_all().await?;
        self.phase.lock().initialized = true;
        info!("component system initialized");

        self.announce(
            events::SYSTEM_INITIALIZED,
            json!({ "enabledComponents": self.enabled }),
        )
        .await;

        if self.config.auto_start {
            self.start().await?;
        }
        Ok(())
    }

    fn create_components(&self) -> Result<usize, OrchestratorError> {
        let mut created = 0;
        for id in self.creation_order()? {
            if self.lifecycle.contains(&id) {
                continue;
            }
            let entry = self
                .catalog
                .entry(&id)
                .ok_or_else(|| OrchestratorError::UnknownComponent(id.clone()))?;

            let ctx = FactoryContext {
                id: id.clone(),
                dependencies: entry.dependencies.clone(),
                bus: self.bus.clone(),
                settings: self.settings.get(&id).cloned(),
            };
            let instance = entry
                .create(ctx)
                .map_err(|source| OrchestratorError::Factory {
                    id: id.clone(),
                    source,
                })?;

            if instance.component.id() != &id {
                return Err(OrchestratorError::Factory {
                    id: id.clone(),
                    source: ComponentError::InvalidSettings(format!(
                        "factory produced component {}",
                        instance.component.id()
                    )),
                });
            }
            if instance.component.config().dependencies != entry.dependencies {
                warn!(
                    component = %id,
                    declared = ?instance.component.config().dependencies,
                    catalog = ?entry.dependencies,
                    "component dependencies differ from catalog"
                );
            }

            debug!(component = %id, type_name = entry.type_name, "created component");
            self.lifecycle.register(Arc::clone(&instance.component))?;
            self.instances.lock().insert(id, instance);
            created += 1;
        }
        Ok(created)
    }

    /// Start every initialized component. No-op if already started.
    pub async fn start(&self) -> Result<(), OrchestratorError> {
        {
            let phase = self.phase.lock();
            if !phase.initialized {
                return Err(OrchestratorError::NotInitialized);
            }
            if phase.started {
                warn!("orchestrator already started, skipping");
                return Ok(());
            }
        }

        info!("starting component system");
        self.lifecycle.start_all().await?;
        self.phase.lock().started = true;
        info!("component system started");

        self.announce(events::SYSTEM_STARTED, json!({})).await;
        Ok(())
    }

    /// Stop every running component. No-op unless started.
    pub async fn stop(&self) -> Result<(), OrchestratorError> {
        if !self.phase.lock().started {
            return Ok(());
        }

        info!("stopping component system");
        self.lifecycle.stop_all().await?;
        self.phase.lock().started = false;
        info!("component system stopped");

        self.announce(events::SYSTEM_STOPPED, json!({})).await;
        Ok(())
    }

    /// Stop, then destroy every component and forget all instances.
    ///
    /// Components are destroyed even when stopping fails; that failure is returned.
    pub async fn cleanup(&self) -> Result<(), OrchestratorError> {
        let stopped = self.stop().await;
        let cleaned = self.lifecycle.cleanup().await;

        self.instances.lock().clear();
        *self.phase.lock() = Phase::default();
        info!("component system cleaned up");

        stopped?;
        cleaned?;
        Ok(())
    }

    /// `cleanup`, then tear the bus down so pending requests fail fast.
    pub async fn shutdown(&self) -> Result<(), OrchestratorError> {
        let result = self.cleanup().await;
        self.bus.shutdown();
        result
    }

    /// Typed access to a created component.
    ///
    /// Fails with `UnknownComponent` for ids outside the catalog, `NotEnabled` for
    /// components outside the enabled closure, `NotInitialized` before creation and
    /// `TypeMismatch` if `T` is not the type the factory produced.
    pub fn get<T>(&self, id: impl Into<ComponentId>) -> Result<Arc<T>, OrchestratorError>
    where
        T: Component + 'static,
    {
        let instance = self.instance(id.into())?;
        let id = instance.component.id().clone();
        let actual = instance.type_name;
        instance.any.downcast::<T>().map_err(|_| {
            debug!(component = %id, actual, "typed access with the wrong type");
            OrchestratorError::TypeMismatch {
                id,
                expected: std::any::type_name::<T>(),
            }
        })
    }

    /// Untyped access to a created component.
    pub fn component(&self, id: impl Into<ComponentId>) -> Result<Arc<dyn Component>, OrchestratorError> {
        Ok(self.instance(id.into())?.component)
    }

    fn instance(&self, id: ComponentId) -> Result<Instance, OrchestratorError> {
        if let Some(instance) = self.instances.lock().get(&id) {
            return Ok(instance.clone());
        }
        if !self.catalog.contains(&id) {
            return Err(OrchestratorError::UnknownComponent(id));
        }
        if !self.resolve_closure().contains(&id) {
            return Err(OrchestratorError::NotEnabled(id));
        }
        Err(OrchestratorError::NotInitialized)
    }

    pub fn health_check(&self) -> HealthReport {
        self.lifecycle.health_check()
    }

    pub fn system_status(&self) -> SystemStatus {
        let phase = *self.phase.lock();
        SystemStatus {
            initialized: phase.initialized,
            started: phase.started,
            components: self.lifecycle.all_statuses().into_iter().collect(),
        }
    }

    async fn announce(&self, event_type: &str, data: Value) {
        self.bus
            .publish(
                SYSTEM_TOPIC,
                EventDraft::new(event_type, ORCHESTRATOR_SOURCE).with_data(data),
            )
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{OrchestratorBuilder, OrchestratorConfig};
    use crate::bus::listener_fn;
    use crate::domain::{ComponentConfig, ComponentStatus};
    use async_trait::async_trait;

    /// Minimal component that follows the status machine on its own.
    struct Unit {
        config: ComponentConfig,
        status: Mutex<ComponentStatus>,
        label: String,
    }

    impl Unit {
        fn from_ctx(ctx: FactoryContext) -> Result<Self, ComponentError> {
            let label = ctx
                .settings
                .as_ref()
                .and_then(|s| s.get("label"))
                .and_then(Value::as_str)
                .unwrap_or("default")
                .to_string();
            Ok(Self {
                config: ctx.component_config(ctx.id.as_str().to_uppercase()),
                status: Mutex::new(ComponentStatus::Idle),
                label,
            })
        }
    }

    #[async_trait]
    impl Component for Unit {
        fn config(&self) -> &ComponentConfig {
            &self.config
        }
        fn status(&self) -> ComponentStatus {
            *self.status.lock()
        }
        async fn initialize(&self, _config: &ComponentConfig) -> Result<(), ComponentError> {
            *self.status.lock() = ComponentStatus::Ready;
            Ok(())
        }
        async fn start(&self) -> Result<(), ComponentError> {
            *self.status.lock() = ComponentStatus::Running;
            Ok(())
        }
        async fn stop(&self) -> Result<(), ComponentError> {
            *self.status.lock() = ComponentStatus::Paused;
            Ok(())
        }
        async fn destroy(&self) {
            *self.status.lock() = ComponentStatus::Destroyed;
        }
    }

    struct Other {
        config: ComponentConfig,
    }

    #[async_trait]
    impl Component for Other {
        fn config(&self) -> &ComponentConfig {
            &self.config
        }
        fn status(&self) -> ComponentStatus {
            ComponentStatus::Idle
        }
        async fn initialize(&self, _config: &ComponentConfig) -> Result<(), ComponentError> {
            Ok(())
        }
        async fn start(&self) -> Result<(), ComponentError> {
            Ok(())
        }
        async fn stop(&self) -> Result<(), ComponentError> {
            Ok(())
        }
        async fn destroy(&self) {}
    }

    /// base <- mid <- top, plus an unrelated `side` and an `Other` typed `odd`.
    fn catalog() -> ComponentCatalog {
        ComponentCatalog::new()
            .define("base", Vec::<ComponentId>::new(), Unit::from_ctx)
            .and_then(|c| c.define("mid", ["base"], Unit::from_ctx))
            .and_then(|c| c.define("top", ["mid", "base"], Unit::from_ctx))
            .and_then(|c| c.define("side", Vec::<ComponentId>::new(), Unit::from_ctx))
            .and_then(|c| {
                c.define("odd", Vec::<ComponentId>::new(), |ctx: FactoryContext| {
                    Ok(Other {
                        config: ctx.component_config("Odd"),
                    })
                })
            })
            .unwrap()
    }

    fn orchestrator(config: OrchestratorConfig) -> Orchestrator {
        OrchestratorBuilder::new(catalog())
            .config(config)
            .build()
            .unwrap()
    }

    fn ids(list: &[&str]) -> Vec<ComponentId> {
        list.iter().map(|s| ComponentId::new(*s)).collect()
    }

    #[test]
    fn closure_pulls_in_transitive_dependencies() {
        let orchestrator = orchestrator(OrchestratorConfig::default().enable_only(["top"]));

        assert_eq!(orchestrator.resolve_closure(), ids(&["base", "mid", "top"]));
        assert_eq!(orchestrator.creation_order().unwrap(), ids(&["base", "mid", "top"]));
    }

    #[test]
    fn camel_case_keys_resolve() {
        let orchestrator = OrchestratorBuilder::new(
            ComponentCatalog::new()
                .define("context-manager", Vec::<ComponentId>::new(), Unit::from_ctx)
                .unwrap(),
        )
        .config(OrchestratorConfig::default().enable_only(["contextManager"]))
        .build()
        .unwrap();

        assert_eq!(orchestrator.resolve_closure(), ids(&["context-manager"]));
    }

    #[tokio::test]
    async fn initialize_creates_registers_and_initializes_closure_only() {
        let orchestrator = orchestrator(OrchestratorConfig::default().enable_only(["mid"]));

        orchestrator.initialize().await.unwrap();

        assert_eq!(orchestrator.lifecycle().initialization_order(), ids(&["base", "mid"]));
        let status = orchestrator.system_status();
        assert!(status.initialized);
        assert!(!status.started);
        assert_eq!(status.count(ComponentStatus::Ready), 2);
        assert!(orchestrator.health_check().healthy);
    }

    #[tokio::test]
    async fn typed_access_distinguishes_absent_cases() {
        let orchestrator = orchestrator(OrchestratorConfig::default().enable_only(["mid", "odd"]));

        assert!(matches!(
            orchestrator.get::<Unit>("mid"),
            Err(OrchestratorError::NotInitialized)
        ));
        orchestrator.initialize().await.unwrap();

        let mid = orchestrator.get::<Unit>("mid").unwrap();
        assert_eq!(mid.config().name, "MID");
        assert!(orchestrator.get::<Other>("odd").is_ok());
        assert!(matches!(
            orchestrator.get::<Other>("mid"),
            Err(OrchestratorError::TypeMismatch { .. })
        ));
        assert!(matches!(
            orchestrator.get::<Unit>("side"),
            Err(OrchestratorError::NotEnabled(_))
        ));
        assert!(matches!(
            orchestrator.get::<Unit>("nowhere"),
            Err(OrchestratorError::UnknownComponent(_))
        ));
        assert_eq!(orchestrator.component("base").unwrap().name(), "BASE");
    }

    #[tokio::test]
    async fn settings_reach_the_factory() {
        let mut config = OrchestratorConfig::default().enable_only(["side"]);
        config
            .components
            .insert("side".into(), serde_json::json!({ "label": "custom" }));
        let orchestrator = orchestrator(config);

        orchestrator.initialize().await.unwrap();
        assert_eq!(orchestrator.get::<Unit>("side").unwrap().label, "custom");
    }

    #[tokio::test]
    async fn start_requires_initialize() {
        let orchestrator = orchestrator(OrchestratorConfig::default());
        assert!(matches!(
            orchestrator.start().await,
            Err(OrchestratorError::NotInitialized)
        ));
    }

    #[tokio::test]
    async fn full_cycle_publishes_system_events() {
        let orchestrator =
            orchestrator(OrchestratorConfig::default().enable_only(["top"]).with_auto_start(true));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = orchestrator.bus().subscribe(
            SYSTEM_TOPIC,
            listener_fn(move |event| {
                sink.lock().push(event.event_type.clone());
                Ok(())
            }),
        );

        orchestrator.initialize().await.unwrap();
        assert!(orchestrator.system_status().started);
        // second call is a no-op
        orchestrator.initialize().await.unwrap();

        orchestrator.cleanup().await.unwrap();

        assert_eq!(
            *seen.lock(),
            vec![
                events::SYSTEM_INITIALIZED,
                events::SYSTEM_STARTED,
                events::SYSTEM_STOPPED
            ]
        );
        let status = orchestrator.system_status();
        assert!(!status.initialized);
        assert!(status.components.is_empty());
        assert!(matches!(
            orchestrator.get::<Unit>("top"),
            Err(OrchestratorError::NotInitialized)
        ));
    }
}
