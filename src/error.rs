use thiserror::Error;

/// Failures reported by a notification store. Duplicates are never errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Pool exhaustion and I/O failures clear up on their own; everything
    /// else is still retried, but logged louder.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            StoreError::Unavailable(_) => true,
        }
    }
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("AMQP error: {0}")]
    Amqp(#[from] lapin::Error),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("Failed to declare {entity} '{name}': {source}")]
    Declare {
        entity: &'static str,
        name: String,
        #[source]
        source: lapin::Error,
    },

    #[error("Failed to bind '{queue}' to '{exchange}': {source}")]
    Bind {
        queue: String,
        exchange: String,
        #[source]
        source: lapin::Error,
    },
}

/// Startup failures: the consumer never runs against a half-declared topology.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Failed to connect to RabbitMQ: {0}")]
    Amqp(#[from] lapin::Error),

    #[error(transparent)]
    Topology(#[from] TopologyError),
}
