use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Readiness check behind the database entry of the health report.
pub const DATABASE_CHECK: &str = "ensure_schema";

/// Readiness check behind the message broker entry of the health report.
pub const BROKER_CHECK: &str = "channel_status";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: String,
    pub checks: HashMap<String, ServiceHealth>,
}

/// Outcome of one dependency check. `check` names the operation that was
/// run, so an unhealthy database reads differently from a closed channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    pub check: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn passed(check: &str, response_time_ms: u64) -> Self {
        Self {
            status: HealthStatus::Ok,
            check: check.to_string(),
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn failed(check: &str, error: impl ToString) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            check: check.to_string(),
            response_time_ms: None,
            error: Some(error.to_string()),
        }
    }
}
