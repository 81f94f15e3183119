use serde::Serialize;

use crate::domain::{ComponentId, ComponentStatus};

/// Aggregate health of every registered component.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthReport {
    /// True iff every component is ready or running.
    pub healthy: bool,
    pub components: Vec<ComponentHealth>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentHealth {
    pub id: ComponentId,
    pub name: String,
    pub status: ComponentStatus,
    pub healthy: bool,
}

impl HealthReport {
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let healthy = components.iter().all(|c| c.healthy);
        Self {
            healthy,
            components,
        }
    }

    /// Components that are not ready or running.
    pub fn unhealthy(&self) -> impl Iterator<Item = &ComponentHealth> {
        self.components.iter().filter(|c| !c.healthy)
    }
}

impl ComponentHealth {
    pub fn new(id: ComponentId, name: impl Into<String>, status: ComponentStatus) -> Self {
        Self {
            id,
            name: name.into(),
            status,
            healthy: status.is_healthy(),
        }
    }
}
