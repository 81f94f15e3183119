//! SystemStatus - orchestrator 全体の状態スナップショット

use std::collections::BTreeMap;

use serde::Serialize;

use crate::domain::{ComponentId, ComponentStatus};

/// Snapshot of the orchestrator and every registered component.
///
/// # 使用例
/// ```ignore
/// let status = orchestrator.system_status();
/// println!("{}", serde_json::to_string_pretty(&status)?);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemStatus {
    pub initialized: bool,
    pub started: bool,
    pub components: BTreeMap<ComponentId, ComponentStatus>,
}

impl SystemStatus {
    /// Components currently in `status`.
    pub fn count(&self, status: ComponentStatus) -> usize {
        self.components.values().filter(|s| **s == status).count()
    }
}
