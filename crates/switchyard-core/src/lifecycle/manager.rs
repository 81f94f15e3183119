//! LifecycleManager - 登録と順序付きの initialize / start / stop
//!
//! - initialize: strict topological order, one component at a time, fail-fast
//! - start: priority groups (higher first), members of one group concurrently
//! - stop: exact reverse of the last initialization order, sequentially
//!
//! Failures abort the batch they happen in. Components already processed keep
//! their state; there is no rollback.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::graph::DependencyGraph;
use super::health::{ComponentHealth, HealthReport};
use crate::bus::{EventBus, LIFECYCLE_TOPIC, Subscription, listener_fn};
use crate::domain::{ComponentError, ComponentId, ComponentStatus, EventDraft, LifecycleError};
use crate::ports::Component;

/// Event types published on the `lifecycle` topic.
pub mod events {
    pub const COMPONENT_INITIALIZED: &str = "component_initialized";
    pub const COMPONENT_STARTED: &str = "component_started";
    pub const COMPONENT_STOPPED: &str = "component_stopped";
    pub const COMPONENT_ERROR: &str = "component_error";
    pub const COMPONENT_DESTROYED: &str = "component_destroyed";
}

/// Options for `LifecycleManager::restart_component`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartOptions {
    /// Stop running direct dependents first and resume them afterwards.
    pub restart_dependents: bool,
}

impl Default for RestartOptions {
    fn default() -> Self {
        Self {
            restart_dependents: true,
        }
    }
}

struct Node {
    component: Arc<dyn Component>,
    status: ComponentStatus,
}

#[derive(Default)]
struct Registry {
    graph: DependencyGraph,
    nodes: HashMap<ComponentId, Node>,
    /// Order recorded by the last `initialize_all`. Stop order is its reverse.
    initialization_order: Vec<ComponentId>,
}

/// Owns registered components and drives their lifecycle.
///
/// Status here is the manager's view, updated around every call it makes; it is
/// what `health_check` reports.
pub struct LifecycleManager {
    bus: EventBus,
    registry: Mutex<Registry>,
    shutting_down: Arc<AtomicBool>,
    error_watch: Subscription,
}

impl LifecycleManager {
    pub fn new(bus: EventBus) -> Self {
        let shutting_down = Arc::new(AtomicBool::new(false));
        let quiet = Arc::clone(&shutting_down);
        let error_watch = bus.subscribe(
            LIFECYCLE_TOPIC,
            listener_fn(move |event| {
                if event.event_type == events::COMPONENT_ERROR && !quiet.load(Ordering::SeqCst) {
                    error!(component = %event.source, details = %event.data, "component error");
                }
                Ok(())
            }),
        );

        Self {
            bus,
            registry: Mutex::new(Registry::default()),
            shutting_down,
            error_watch,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Add a component. Its dependencies do not have to be registered yet, but must
    /// be by the time `initialize_all` runs.
    pub fn register(&self, component: Arc<dyn Component>) -> Result<(), LifecycleError> {
        let id = component.id().clone();
        let mut registry = self.registry.lock();
        if registry.nodes.contains_key(&id) {
            return Err(LifecycleError::AlreadyRegistered(id));
        }

        registry
            .graph
            .add_node(id.clone(), &component.config().dependencies);
        info!(component = %id, name = component.name(), "registered component");

        let status = component.status();
        registry.nodes.insert(id, Node { component, status });
        Ok(())
    }

    /// Stop (if running), destroy and remove a component.
    ///
    /// Components that declared it as a dependency stay registered; the next
    /// `initialize_all` reports them as having a missing dependency.
    pub async fn unregister(&self, id: &ComponentId) -> Result<(), LifecycleError> {
        let (component, status) = self
            .node(id)
            .ok_or_else(|| LifecycleError::UnknownComponent(id.clone()))?;

        if status == ComponentStatus::Running {
            self.stop_component(id).await?;
        }
        self.destroy_one(id, component.as_ref()).await;

        let mut registry = self.registry.lock();
        registry.graph.remove_node(id);
        registry.nodes.remove(id);
        registry.initialization_order.retain(|registered| registered != id);
        info!(component = %id, "unregistered component");
        Ok(())
    }

    /// Initialize every component in dependency order.
    ///
    /// Structural problems (nothing registered, missing dependency, cycle) are
    /// reported before any component is touched. A component that fails after
    /// exhausting its retry policy is marked `Error` and aborts the sequence.
    /// Components that are already running are left alone.
    pub async fn initialize_all(&self) -> Result<(), LifecycleError> {
        let plan = {
            let mut registry = self.registry.lock();
            if registry.graph.is_empty() {
                return Err(LifecycleError::NothingRegistered);
            }

            let missing = registry.graph.missing_dependencies();
            if !missing.is_empty() {
                error!(?missing, "unregistered dependencies");
                return Err(LifecycleError::MissingDependencies { missing });
            }

            let order = match registry.graph.topological_order() {
                Ok(order) => order,
                Err(ids) => {
                    error!(?ids, "dependency cycle detected");
                    return Err(LifecycleError::DependencyCycle { ids });
                }
            };
            registry.initialization_order = order.clone();

            order
                .into_iter()
                .filter_map(|id| {
                    let node = registry.nodes.get(&id)?;
                    Some((id, Arc::clone(&node.component), node.status))
                })
                .collect::<Vec<_>>()
        };

        info!(order = %join_ids(plan.iter().map(|(id, _, _)| id)), "initializing components");
        for (id, component, status) in plan {
            if status == ComponentStatus::Running {
                debug!(component = %id, "already running, skipping initialize");
                continue;
            }
            self.initialize_one(&id, &component).await?;
        }
        info!("all components initialized");
        Ok(())
    }

    /// Start every `Ready` component, grouped by priority.
    ///
    /// Groups run strictly one after another, highest priority first. Members of
    /// a group start concurrently and every start in a group runs to completion;
    /// if any of them failed, the first failure is returned and lower groups are
    /// not started.
    pub async fn start_all(&self) -> Result<(), LifecycleError> {
        let groups = {
            let registry = self.registry.lock();
            if registry.initialization_order.is_empty() {
                return Err(LifecycleError::NotInitialized);
            }

            let mut groups: BTreeMap<Reverse<i32>, Vec<(ComponentId, Arc<dyn Component>)>> =
                BTreeMap::new();
            for id in &registry.initialization_order {
                if let Some(node) = registry.nodes.get(id) {
                    groups
                        .entry(Reverse(node.component.config().priority))
                        .or_default()
                        .push((id.clone(), Arc::clone(&node.component)));
                }
            }
            groups
        };

        info!(groups = groups.len(), "starting components");
        for (Reverse(priority), group) in groups {
            debug!(priority, size = group.len(), "starting priority group");
            let results = join_all(
                group
                    .iter()
                    .map(|(id, component)| self.start_one(id, component, false)),
            )
            .await;
            if let Some(err) = results.into_iter().find_map(Result::err) {
                return Err(err);
            }
        }
        info!("all components started");
        Ok(())
    }

    /// Stop every running component in reverse initialization order.
    ///
    /// Shutdown keeps going past a failing component; the first failure is returned
    /// once every component has been visited.
    pub async fn stop_all(&self) -> Result<(), LifecycleError> {
        self.shutting_down.store(true, Ordering::SeqCst);
        let result = self.stop_in_reverse().await;
        self.shutting_down.store(false, Ordering::SeqCst);
        result
    }

    async fn stop_in_reverse(&self) -> Result<(), LifecycleError> {
        let order = self.initialization_order();
        info!(components = order.len(), "stopping components");

        let mut first_error = None;
        for id in order.iter().rev() {
            if let Err(err) = self.stop_component(id).await {
                warn!(component = %id, error = %err, "stop failed, continuing shutdown");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                info!("all components stopped");
                Ok(())
            }
        }
    }

    /// Stop one component. No-op unless it is running.
    pub async fn stop_component(&self, id: &ComponentId) -> Result<(), LifecycleError> {
        let (component, status) = self
            .node(id)
            .ok_or_else(|| LifecycleError::UnknownComponent(id.clone()))?;
        if status != ComponentStatus::Running {
            return Ok(());
        }
        self.stop_one(id, &component).await
    }

    /// Stop, re-initialize and start `id`.
    ///
    /// With `restart_dependents`, running direct dependents are stopped first and
    /// resumed once `id` is running again.
    pub async fn restart_component(
        &self,
        id: &ComponentId,
        options: RestartOptions,
    ) -> Result<(), LifecycleError> {
        let (component, _) = self
            .node(id)
            .ok_or_else(|| LifecycleError::UnknownComponent(id.clone()))?;
        info!(component = %id, restart_dependents = options.restart_dependents, "restarting component");

        let mut paused = Vec::new();
        if options.restart_dependents {
            for dependent in self.dependents(id) {
                if self.component_status(&dependent) == Some(ComponentStatus::Running) {
                    self.stop_component(&dependent).await?;
                    paused.push(dependent);
                }
            }
        }

        self.stop_component(id).await?;
        self.initialize_one(id, &component).await?;
        self.start_one(id, &component, false).await?;

        for dependent in paused {
            if let Some((component, _)) = self.node(&dependent) {
                self.start_one(&dependent, &component, true).await?;
            }
        }
        info!(component = %id, "restart complete");
        Ok(())
    }

    /// Stop everything, destroy every component exactly once and empty the registry.
    ///
    /// Components are destroyed even if stopping failed; the stop failure is
    /// returned afterwards.
    pub async fn cleanup(&self) -> Result<(), LifecycleError> {
        self.shutting_down.store(true, Ordering::SeqCst);
        let stopped = self.stop_in_reverse().await;

        let doomed: Vec<(ComponentId, Arc<dyn Component>)> = {
            let registry = self.registry.lock();
            let mut ids: Vec<ComponentId> =
                registry.initialization_order.iter().rev().cloned().collect();
            // never-initialized components go last
            for id in registry.graph.ids() {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
            ids.into_iter()
                .filter_map(|id| {
                    let node = registry.nodes.get(&id)?;
                    Some((id, Arc::clone(&node.component)))
                })
                .collect()
        };

        for (id, component) in &doomed {
            self.destroy_one(id, component.as_ref()).await;
        }
        *self.registry.lock() = Registry::default();
        self.shutting_down.store(false, Ordering::SeqCst);

        info!(destroyed = doomed.len(), "lifecycle manager cleaned up");
        stopped
    }

    /// Overall health: true iff every component is ready or running.
    pub fn health_check(&self) -> HealthReport {
        let registry = self.registry.lock();
        let components = registry
            .graph
            .ids()
            .iter()
            .filter_map(|id| {
                let node = registry.nodes.get(id)?;
                Some(ComponentHealth::new(
                    id.clone(),
                    node.component.name(),
                    node.status,
                ))
            })
            .collect();
        HealthReport::from_components(components)
    }

    pub fn component_status(&self, id: &ComponentId) -> Option<ComponentStatus> {
        self.registry.lock().nodes.get(id).map(|node| node.status)
    }

    /// Every component's status, in registration order.
    pub fn all_statuses(&self) -> Vec<(ComponentId, ComponentStatus)> {
        let registry = self.registry.lock();
        registry
            .graph
            .ids()
            .iter()
            .filter_map(|id| registry.nodes.get(id).map(|node| (id.clone(), node.status)))
            .collect()
    }

    pub fn component(&self, id: &ComponentId) -> Option<Arc<dyn Component>> {
        self.registry
            .lock()
            .nodes
            .get(id)
            .map(|node| Arc::clone(&node.component))
    }

    /// Registered components that declare `id` as a dependency.
    pub fn dependents(&self, id: &ComponentId) -> Vec<ComponentId> {
        self.registry.lock().graph.dependents_of(id)
    }

    pub fn initialization_order(&self) -> Vec<ComponentId> {
        self.registry.lock().initialization_order.clone()
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.registry.lock().nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.registry.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.lock().nodes.is_empty()
    }

    fn node(&self, id: &ComponentId) -> Option<(Arc<dyn Component>, ComponentStatus)> {
        self.registry
            .lock()
            .nodes
            .get(id)
            .map(|node| (Arc::clone(&node.component), node.status))
    }

    fn set_status(&self, id: &ComponentId, next: ComponentStatus) {
        let mut registry = self.registry.lock();
        if let Some(node) = registry.nodes.get_mut(id) {
            if !node.status.can_transition_to(next) {
                warn!(component = %id, from = %node.status, to = %next, "unexpected status transition");
            }
            debug!(component = %id, from = %node.status, to = %next, "status");
            node.status = next;
        }
    }

    async fn initialize_one(
        &self,
        id: &ComponentId,
        component: &Arc<dyn Component>,
    ) -> Result<(), LifecycleError> {
        let config = component.config().clone();
        let policy = &config.retry_policy;
        self.set_status(id, ComponentStatus::Initializing);

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            debug!(component = %id, attempt = attempts, "initializing");

            let settings = config.clone();
            let call = bounded(component, config.timeout, move |component| async move {
                component.initialize(&settings).await
            });
            let failure = match call.await {
                Call::Finished(Ok(())) => {
                    self.set_status(id, ComponentStatus::Ready);
                    self.announce(events::COMPONENT_INITIALIZED, id, component.name())
                        .await;
                    return Ok(());
                }
                Call::Finished(Err(source)) => LifecycleError::InitializationFailed {
                    id: id.clone(),
                    attempts,
                    source,
                },
                Call::Overdue(timeout) => LifecycleError::Timeout {
                    id: id.clone(),
                    operation: "initialize",
                    timeout,
                },
            };

            // an overdue call is still running, so it is never retried alongside itself
            let overdue = matches!(failure, LifecycleError::Timeout { .. });
            if !overdue && policy.allows_retry(attempts) {
                let delay = policy.next_delay(attempts);
                warn!(
                    component = %id,
                    attempt = attempts,
                    max_attempts = policy.max_attempts,
                    ?delay,
                    error = %failure,
                    "initialize failed, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            self.fail(id, component.name(), "initialize", &failure).await;
            return Err(failure);
        }
    }

    /// Start one component. `resume` also accepts `Paused` (dependents during restart).
    async fn start_one(
        &self,
        id: &ComponentId,
        component: &Arc<dyn Component>,
        resume: bool,
    ) -> Result<(), LifecycleError> {
        let startable = match self.component_status(id) {
            Some(ComponentStatus::Ready) => true,
            Some(ComponentStatus::Paused) => resume,
            _ => false,
        };
        if !startable {
            debug!(component = %id, "not ready, skipping start");
            return Ok(());
        }

        debug!(component = %id, "starting");
        self.set_status(id, ComponentStatus::Running);
        let timeout = component.config().timeout;
        let call = bounded(component, timeout, |component| async move { component.start().await });
        let result = match call.await {
            Call::Finished(Ok(())) => Ok(()),
            Call::Finished(Err(source)) => Err(LifecycleError::StartFailed {
                id: id.clone(),
                source,
            }),
            Call::Overdue(timeout) => Err(LifecycleError::Timeout {
                id: id.clone(),
                operation: "start",
                timeout,
            }),
        };

        match result {
            Ok(()) => {
                self.announce(events::COMPONENT_STARTED, id, component.name())
                    .await;
                Ok(())
            }
            Err(err) => {
                self.fail(id, component.name(), "start", &err).await;
                Err(err)
            }
        }
    }

    async fn stop_one(
        &self,
        id: &ComponentId,
        component: &Arc<dyn Component>,
    ) -> Result<(), LifecycleError> {
        debug!(component = %id, "stopping");
        self.set_status(id, ComponentStatus::Paused);
        let timeout = component.config().timeout;
        let call = bounded(component, timeout, |component| async move { component.stop().await });
        let result = match call.await {
            Call::Finished(Ok(())) => Ok(()),
            Call::Finished(Err(source)) => Err(LifecycleError::StopFailed {
                id: id.clone(),
                source,
            }),
            Call::Overdue(timeout) => Err(LifecycleError::Timeout {
                id: id.clone(),
                operation: "stop",
                timeout,
            }),
        };

        match result {
            Ok(()) => {
                self.announce(events::COMPONENT_STOPPED, id, component.name())
                    .await;
                Ok(())
            }
            Err(err) => {
                self.fail(id, component.name(), "stop", &err).await;
                Err(err)
            }
        }
    }

    async fn destroy_one(&self, id: &ComponentId, component: &dyn Component) {
        if self.component_status(id) == Some(ComponentStatus::Destroyed) {
            return;
        }
        component.destroy().await;
        self.set_status(id, ComponentStatus::Destroyed);
        self.announce(events::COMPONENT_DESTROYED, id, component.name())
            .await;
    }

    async fn fail(&self, id: &ComponentId, name: &str, operation: &str, err: &LifecycleError) {
        self.set_status(id, ComponentStatus::Error);
        let data = json!({
            "componentId": id,
            "name": name,
            "operation": operation,
            "error": err.to_string(),
        });
        self.publish(events::COMPONENT_ERROR, id, data).await;
    }

    async fn announce(&self, event_type: &str, id: &ComponentId, name: &str) {
        let data = json!({ "componentId": id, "name": name });
        self.publish(event_type, id, data).await;
    }

    async fn publish(&self, event_type: &str, id: &ComponentId, data: Value) {
        self.bus
            .publish(
                LIFECYCLE_TOPIC,
                EventDraft::new(event_type, id.as_str()).with_data(data),
            )
            .await;
    }
}

impl Drop for LifecycleManager {
    fn drop(&mut self) {
        self.error_watch.unsubscribe();
    }
}

/// Outcome of one lifecycle call on a component.
enum Call {
    Finished(Result<(), ComponentError>),
    /// The deadline passed. The call keeps running on its own task.
    Overdue(Duration),
}

/// Run `call` on `component`, waiting at most `timeout` when one is configured.
///
/// An in-progress call is never cancelled: without a timeout it is awaited to the end,
/// with one it runs on a spawned task that is detached once the deadline passes.
async fn bounded<F, Fut>(component: &Arc<dyn Component>, timeout: Option<Duration>, call: F) -> Call
where
    F: FnOnce(Arc<dyn Component>) -> Fut,
    Fut: Future<Output = Result<(), ComponentError>> + Send + 'static,
{
    let future = call(Arc::clone(component));
    let Some(limit) = timeout else {
        return Call::Finished(future.await);
    };

    let handle = tokio::spawn(future);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(result)) => Call::Finished(result),
        Ok(Err(join_error)) => Call::Finished(Err(ComponentError::failed(format!(
            "call did not complete: {join_error}"
        )))),
        Err(_) => Call::Overdue(limit),
    }
}

fn join_ids<'a>(ids: impl Iterator<Item = &'a ComponentId>) -> String {
    ids.map(ComponentId::as_str).collect::<Vec<_>>().join(" -> ")
}
