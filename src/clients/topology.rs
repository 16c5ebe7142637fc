use lapin::{
    Channel, ExchangeKind,
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
};
use tracing::info;

use crate::{error::TopologyError, models::topology::QueueTopology};

/// Declares the dead-letter exchange, the main/retry/dlq queues and their
/// bindings on the exchange. Every declaration is durable and carries fixed
/// arguments, so running this again on a new connection is a no-op.
pub async fn declare(channel: &Channel, topology: &QueueTopology) -> Result<(), TopologyError> {
    channel
        .exchange_declare(
            topology.dead_letter_exchange.as_str().into(),
            ExchangeKind::Direct,
            ExchangeDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .map_err(|source| TopologyError::Declare {
            entity: "exchange",
            name: topology.dead_letter_exchange.clone(),
            source,
        })?;

    declare_queue(channel, &topology.main, topology.main_arguments()).await?;
    declare_queue(channel, &topology.retry, topology.retry_arguments()).await?;
    declare_queue(channel, &topology.dlq, FieldTable::default()).await?;

    for binding in topology.bindings() {
        channel
            .queue_bind(
                binding.queue.into(),
                binding.exchange.into(),
                binding.routing_key.into(),
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|source| TopologyError::Bind {
                queue: binding.queue.to_string(),
                exchange: binding.exchange.to_string(),
                source,
            })?;
    }

    info!(
        main = %topology.main,
        retry = %topology.retry,
        dlq = %topology.dlq,
        exchange = %topology.dead_letter_exchange,
        "Queue topology declared"
    );

    Ok(())
}

async fn declare_queue(
    channel: &Channel,
    name: &str,
    arguments: FieldTable,
) -> Result<(), TopologyError> {
    channel
        .queue_declare(
            name.into(),
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            arguments,
        )
        .await
        .map_err(|source| TopologyError::Declare {
            entity: "queue",
            name: name.to_string(),
            source,
        })?;

    Ok(())
}
