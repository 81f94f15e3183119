//! ComponentCatalog - 静的なコンポーネント定義の一覧
//!
//! # 役割
//! - component id -> (factory, dependencies) の対応表
//! - factory は具体型 `T` を返し、内部で `Arc<dyn Component>` と `Arc<dyn Any>` の
//!   両方に型消去して保持する（`Orchestrator::get::<T>` で具体型に戻せる）

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::bus::EventBus;
use crate::domain::{BuildError, ComponentConfig, ComponentError, ComponentId};
use crate::ports::Component;

/// What a factory gets when the orchestrator instantiates its component.
#[derive(Clone)]
pub struct FactoryContext {
    pub id: ComponentId,
    /// Dependencies declared in the catalog.
    pub dependencies: Vec<ComponentId>,
    /// The system bus. Components keep a clone to talk to each other.
    pub bus: EventBus,
    /// Per-component settings blob from the orchestrator configuration.
    pub settings: Option<Value>,
}

impl FactoryContext {
    /// Config record carrying the catalog id and dependencies.
    pub fn component_config(&self, name: impl Into<String>) -> ComponentConfig {
        ComponentConfig::new(self.id.clone(), name).with_dependencies(self.dependencies.clone())
    }

    /// Deserialize the settings blob, falling back to `T::default()` when absent.
    pub fn settings_or_default<T>(&self) -> Result<T, ComponentError>
    where
        T: serde::de::DeserializeOwned + Default,
    {
        match &self.settings {
            Some(value) => serde_json::from_value(value.clone())
                .map_err(|err| ComponentError::InvalidSettings(format!("{}: {err}", self.id))),
            None => Ok(T::default()),
        }
    }
}

/// A created component, kept both as a trait object and as `Any` for typed access.
#[derive(Clone)]
pub(crate) struct Instance {
    pub(crate) component: Arc<dyn Component>,
    pub(crate) any: Arc<dyn Any + Send + Sync>,
    pub(crate) type_name: &'static str,
}

type ErasedFactory = Box<dyn Fn(FactoryContext) -> Result<Instance, ComponentError> + Send + Sync>;

pub(crate) struct CatalogEntry {
    pub(crate) dependencies: Vec<ComponentId>,
    pub(crate) type_name: &'static str,
    factory: ErasedFactory,
}

impl CatalogEntry {
    pub(crate) fn create(&self, ctx: FactoryContext) -> Result<Instance, ComponentError> {
        (self.factory)(ctx)
    }
}

/// ComponentCatalog は orchestrator が生成しうるコンポーネントの定義集
///
/// # 使用例
/// ```ignore
/// let catalog = ComponentCatalog::new()
///     .define("context-manager", [], |ctx| Ok(ContextManager::new(ctx)))?
///     .define("chat-interface", ["context-manager"], |ctx| Ok(ChatInterface::new(ctx)))?;
/// ```
#[derive(Default)]
pub struct ComponentCatalog {
    order: Vec<ComponentId>,
    entries: HashMap<ComponentId, CatalogEntry>,
}

impl ComponentCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// 定義を追加（同じ id の二重定義は BuildError）
    pub fn define<T, F, I, D>(
        mut self,
        id: impl Into<ComponentId>,
        dependencies: I,
        factory: F,
    ) -> Result<Self, BuildError>
    where
        T: Component + 'static,
        F: Fn(FactoryContext) -> Result<T, ComponentError> + Send + Sync + 'static,
        I: IntoIterator<Item = D>,
        D: Into<ComponentId>,
    {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return Err(BuildError::DuplicateDefinition(id));
        }

        let erased: ErasedFactory = Box::new(move |ctx| {
            let concrete = Arc::new(factory(ctx)?);
            let component: Arc<dyn Component> = concrete.clone();
            let any: Arc<dyn Any + Send + Sync> = concrete;
            Ok(Instance {
                component,
                any,
                type_name: type_name::<T>(),
            })
        });

        self.entries.insert(
            id.clone(),
            CatalogEntry {
                dependencies: dependencies.into_iter().map(Into::into).collect(),
                type_name: type_name::<T>(),
                factory: erased,
            },
        );
        self.order.push(id);
        Ok(self)
    }

    pub fn contains(&self, id: &ComponentId) -> bool {
        self.entries.contains_key(id)
    }

    /// Defined ids in definition order.
    pub fn ids(&self) -> &[ComponentId] {
        &self.order
    }

    pub fn dependencies_of(&self, id: &ComponentId) -> Option<&[ComponentId]> {
        self.entries.get(id).map(|entry| entry.dependencies.as_slice())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub(crate) fn entry(&self, id: &ComponentId) -> Option<&CatalogEntry> {
        self.entries.get(id)
    }

    pub(crate) fn position(&self, id: &ComponentId) -> usize {
        self.order
            .iter()
            .position(|defined| defined == id)
            .unwrap_or(usize::MAX)
    }
}
