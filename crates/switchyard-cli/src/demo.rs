//! demo catalog - 8 つの機能モジュールを模したプレースホルダー
//!
//! 業務ロジックは持たない。依存関係と起動順序、バス経由の request/response を見せるためのもの。

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use switchyard_core::bus::{Subscription, async_listener_fn};
use switchyard_core::domain::{BuildError, ComponentError, ListenerError};
use switchyard_core::{
    Component, ComponentCatalog, ComponentConfig, ComponentStatus, EventBus, FactoryContext,
};

pub const CONTEXT_MANAGER: &str = "context-manager";

/// Topic the context manager answers on while running.
pub const CONTEXT_TOPIC: &str = "context.get";

/// (id, display name, dependencies, priority)
const FEATURES: &[(&str, &str, &[&str], i32)] = &[
    (CONTEXT_MANAGER, "Context Manager", &[], 100),
    ("stream-processor", "Stream Processor", &[CONTEXT_MANAGER], 90),
    ("knowledge-base", "Knowledge Base", &[CONTEXT_MANAGER], 90),
    (
        "ai-actions-manager",
        "AI Actions Manager",
        &[CONTEXT_MANAGER, "knowledge-base"],
        80,
    ),
    (
        "chat-interface",
        "Chat Interface",
        &[CONTEXT_MANAGER, "ai-actions-manager"],
        50,
    ),
    ("toolbox-panel", "Toolbox Panel", &["ai-actions-manager"], 50),
    ("insights-dashboard", "Insights Dashboard", &["stream-processor"], 50),
    (
        "workflow-designer",
        "Workflow Designer",
        &["toolbox-panel", "ai-actions-manager"],
        40,
    ),
];

/// Settings every placeholder understands.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FeatureSettings {
    /// Milliseconds `start` pretends to work for.
    warmup_ms: u64,
    /// Entry limit reported by the context manager.
    max_entries: Option<u64>,
}

pub fn catalog() -> Result<ComponentCatalog, BuildError> {
    FEATURES
        .iter()
        .try_fold(ComponentCatalog::new(), |catalog, (id, name, deps, priority)| {
            catalog.define(*id, deps.iter().copied(), move |ctx: FactoryContext| {
                Feature::new(ctx, name, *priority)
            })
        })
}

/// Placeholder feature module.
pub struct Feature {
    config: ComponentConfig,
    settings: FeatureSettings,
    bus: EventBus,
    status: Mutex<ComponentStatus>,
    serving: Mutex<Option<Subscription>>,
}

impl Feature {
    fn new(ctx: FactoryContext, name: &str, priority: i32) -> Result<Self, ComponentError> {
        let settings: FeatureSettings = ctx.settings_or_default()?;
        Ok(Self {
            config: ctx.component_config(name).with_priority(priority),
            settings,
            bus: ctx.bus,
            status: Mutex::new(ComponentStatus::Idle),
            serving: Mutex::new(None),
        })
    }

    /// The context manager answers lookups with its id and entry limit.
    fn serve_context(&self) -> Subscription {
        let bus = self.bus.clone();
        let max_entries = self.settings.max_entries.unwrap_or(100);
        self.bus.subscribe(
            CONTEXT_TOPIC,
            async_listener_fn(move |event| {
                let bus = bus.clone();
                async move {
                    debug!(request = ?event.request_id(), "context lookup");
                    if !bus
                        .respond(&event, json!({ "source": CONTEXT_MANAGER, "maxEntries": max_entries }))
                        .await
                    {
                        return Err(ListenerError::msg("lookup carried no request id"));
                    }
                    Ok(())
                }
            }),
        )
    }

    fn set_status(&self, status: ComponentStatus) {
        *self.status.lock() = status;
    }
}

#[async_trait]
impl Component for Feature {
    fn config(&self) -> &ComponentConfig {
        &self.config
    }

    fn status(&self) -> ComponentStatus {
        *self.status.lock()
    }

    async fn initialize(&self, _config: &ComponentConfig) -> Result<(), ComponentError> {
        self.set_status(ComponentStatus::Ready);
        Ok(())
    }

    async fn start(&self) -> Result<(), ComponentError> {
        let status = self.status();
        if !matches!(status, ComponentStatus::Ready | ComponentStatus::Paused) {
            return Err(ComponentError::NotReady { status });
        }
        if self.settings.warmup_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.settings.warmup_ms)).await;
        }
        if self.config.id.as_str() == CONTEXT_MANAGER {
            *self.serving.lock() = Some(self.serve_context());
        }
        self.set_status(ComponentStatus::Running);
        info!(component = %self.config.id, "feature running");
        Ok(())
    }

    async fn stop(&self) -> Result<(), ComponentError> {
        if let Some(subscription) = self.serving.lock().take() {
            subscription.unsubscribe();
        }
        self.set_status(ComponentStatus::Paused);
        Ok(())
    }

    async fn destroy(&self) {
        self.set_status(ComponentStatus::Destroyed);
    }
}
