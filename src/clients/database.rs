use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, postgres::PgPoolOptions};
use tracing::{debug, error, info};

use crate::{
    error::StoreError,
    models::{
        message::NotificationRequest,
        notification::{Fingerprint, ListFilter, PersistOutcome, PersistedNotification},
    },
};

/// Content-addressed persistence for notifications.
///
/// Implementations must make `persist` an atomic insert-if-absent keyed on the
/// request's [`Fingerprint`], so any number of concurrent or repeated calls
/// leave exactly one record behind.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    async fn persist(&self, request: &NotificationRequest) -> Result<PersistOutcome, StoreError>;

    async fn list(&self, filter: &ListFilter) -> Result<Vec<PersistedNotification>, StoreError>;
}

pub struct DatabaseClient {
    pool: PgPool,
}

impl DatabaseClient {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        info!(max_connections, "PostgreSQL connection established");

        Ok(Self { pool })
    }
}

#[async_trait]
impl NotificationStore for DatabaseClient {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id BIGSERIAL PRIMARY KEY,
                sender TEXT NOT NULL,
                recipient TEXT NOT NULL,
                message TEXT NOT NULL,
                fingerprint TEXT NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn persist(&self, request: &NotificationRequest) -> Result<PersistOutcome, StoreError> {
        let fingerprint = Fingerprint::of(request);

        let result = sqlx::query(
            r#"
            INSERT INTO notifications (sender, recipient, message, fingerprint)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (fingerprint) DO NOTHING
            "#,
        )
        .bind(&request.sender)
        .bind(&request.recipient)
        .bind(&request.message)
        .bind(fingerprint.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!(error = %e, fingerprint = %fingerprint, "Failed to persist notification");
            StoreError::from(e)
        })?;

        let outcome = if result.rows_affected() == 0 {
            PersistOutcome::AlreadyExists
        } else {
            PersistOutcome::Inserted
        };

        debug!(fingerprint = %fingerprint, outcome = %outcome, "Notification persisted");

        Ok(outcome)
    }

    async fn list(&self, filter: &ListFilter) -> Result<Vec<PersistedNotification>, StoreError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
            "SELECT id, sender, recipient, message, fingerprint, created_at FROM notifications",
        );

        let mut keyword = " WHERE ";
        if let Some(sender) = &filter.sender {
            query.push(keyword).push("sender = ").push_bind(sender.clone());
            keyword = " AND ";
        }
        if let Some(recipient) = &filter.recipient {
            query.push(keyword).push("recipient = ").push_bind(recipient.clone());
        }

        query
            .push(" ORDER BY id DESC LIMIT ")
            .push_bind(filter.effective_limit())
            .push(" OFFSET ")
            .push_bind(filter.effective_offset());

        let rows = query
            .build_query_as::<PersistedNotification>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }
}
