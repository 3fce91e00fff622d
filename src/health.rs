use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Service Health - order store and work queue checks behind GET /health
// ============================================================================
//
// Each backend answers `health()` with a ComponentHealth. The worst
// component decides the service status; any unhealthy component turns
// /health into a 503.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }

    fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded(_) => 1,
            HealthStatus::Unhealthy(_) => 2,
        }
    }
}

/// Result of checking one backend.
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    /// `order_store` or `work_queue`
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    /// Which backend answered, e.g. `scylla` or `in-memory`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: Vec<ComponentHealth>,
    pub check_time: DateTime<Utc>,
}

impl SystemHealth {
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let worst = components
            .iter()
            .map(|component| component.status.severity())
            .max()
            .unwrap_or(0);

        let overall_status = match worst {
            0 => HealthStatus::Healthy,
            1 => HealthStatus::Degraded(Self::reasons(&components, 1)),
            _ => HealthStatus::Unhealthy(Self::reasons(&components, 2)),
        };

        Self {
            overall_status,
            components,
            check_time: Utc::now(),
        }
    }

    /// "name: reason" for every component at the given severity.
    fn reasons(components: &[ComponentHealth], severity: u8) -> String {
        components
            .iter()
            .filter(|component| component.status.severity() == severity)
            .map(|component| match &component.status {
                HealthStatus::Degraded(reason) | HealthStatus::Unhealthy(reason) => {
                    format!("{}: {}", component.name, reason)
                }
                HealthStatus::Healthy => component.name.clone(),
            })
            .collect::<Vec<_>>()
            .join(", ")
    }
}
