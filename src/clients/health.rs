use std::{collections::HashMap, sync::Arc, time::Instant};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    clients::{database::NotificationStore, rbmq::DeliveryBroker},
    models::health::{
        BROKER_CHECK, DATABASE_CHECK, HealthCheckResponse, HealthStatus, ServiceHealth,
    },
};

pub struct HealthChecker {
    store: Arc<dyn NotificationStore>,
    broker: Arc<dyn DeliveryBroker>,
}

impl HealthChecker {
    pub fn new(store: Arc<dyn NotificationStore>, broker: Arc<dyn DeliveryBroker>) -> Self {
        Self { store, broker }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("database".to_string(), self.check_database().await);
        checks.insert("message_broker".to_string(), self.check_rabbitmq().await);

        let status = if checks
            .values()
            .any(|health| health.status == HealthStatus::Unhealthy)
        {
            HealthStatus::Unhealthy
        } else {
            HealthStatus::Ok
        };

        HealthCheckResponse {
            status,
            timestamp: Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            checks,
        }
    }

    /// Schema creation doubles as the liveness query.
    async fn check_database(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.store.ensure_schema().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "Database health check passed");
                ServiceHealth::passed(DATABASE_CHECK, elapsed)
            }
            Err(e) => {
                warn!(error = %e, "Database health check failed");
                ServiceHealth::failed(DATABASE_CHECK, format!("db error: {}", e))
            }
        }
    }

    async fn check_rabbitmq(&self) -> ServiceHealth {
        let start = Instant::now();

        match self.broker.health_check().await {
            Ok(()) => {
                let elapsed = start.elapsed().as_millis() as u64;
                debug!(response_time_ms = elapsed, "RabbitMQ health check passed");
                ServiceHealth::passed(BROKER_CHECK, elapsed)
            }
            Err(e) => {
                warn!(error = %e, "RabbitMQ health check failed");
                ServiceHealth::failed(BROKER_CHECK, format!("broker error: {}", e))
            }
        }
    }
}
