//! Orchestrator configuration: enablement map, per-component settings, auto start.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bus::BusConfig;
use crate::domain::{ComponentId, ConfigError};

/// Configuration surface of an `Orchestrator`.
///
/// Keys of `enabled_components` and `components` may be component ids
/// (`"chat-interface"`) or camelCase config keys (`"chatInterface"`).
///
/// ```json
/// {
///   "enabledComponents": { "chatInterface": true, "insightsDashboard": false },
///   "components": { "contextManager": { "maxEntries": 100 } },
///   "autoStart": true,
///   "bus": { "historyCapacity": 100, "defaultRequestTimeout": 30000 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Explicit enable / disable per component.
    pub enabled_components: BTreeMap<String, bool>,

    /// Whether catalog components missing from `enabled_components` are enabled.
    pub default_enabled: bool,

    /// Settings blob handed to each component's factory.
    pub components: BTreeMap<String, Value>,

    /// Start right after a successful `initialize`.
    pub auto_start: bool,

    pub bus: BusConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            enabled_components: BTreeMap::new(),
            default_enabled: true,
            components: BTreeMap::new(),
            auto_start: false,
            bus: BusConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Enable exactly `ids`; everything else is disabled.
    pub fn enable_only<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.default_enabled = false;
        self.enabled_components = ids.into_iter().map(|id| (id.into(), true)).collect();
        self
    }

    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    /// Enablement keys normalized to component ids.
    pub(crate) fn enablement(&self) -> BTreeMap<ComponentId, bool> {
        self.enabled_components
            .iter()
            .map(|(key, enabled)| (ComponentId::from_config_key(key), *enabled))
            .collect()
    }

    /// Settings keys normalized to component ids.
    pub(crate) fn settings(&self) -> BTreeMap<ComponentId, Value> {
        self.components
            .iter()
            .map(|(key, value)| (ComponentId::from_config_key(key), value.clone()))
            .collect()
    }
}
