use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
        BasicQosOptions, ConfirmSelectOptions,
    },
    types::FieldTable,
};
use tracing::{debug, info};

use crate::{
    clients::topology,
    config::Config,
    error::{BrokerError, ConnectError},
    models::{
        message::{NotificationRequest, QueuedMessage},
        topology::QueueTopology,
    },
};

const CONSUMER_TAG: &str = "notification_worker";

/// Broker operations the delivery pipeline needs.
///
/// Settling a delivery never requeues it in place: retries go through
/// dead-lettering so the broker keeps the attempt history.
#[async_trait]
pub trait DeliveryBroker: Send + Sync {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Removes an undecodable delivery without routing it to retry or the DLQ.
    async fn discard(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    /// Nack without requeue so the main queue dead-letters into retry.
    async fn retry_later(&self, delivery_tag: u64) -> Result<(), BrokerError>;

    async fn publish_to_dlq(&self, body: &[u8]) -> Result<(), BrokerError>;

    async fn publish(&self, request: &NotificationRequest) -> Result<(), BrokerError>;

    async fn health_check(&self) -> Result<(), BrokerError>;
}

pub struct RabbitMqClient {
    _connection: Connection,
    channel: Channel,
    topology: QueueTopology,
}

impl RabbitMqClient {
    /// Opens a channel and declares the full topology on it. Consumption must
    /// not start unless this succeeds.
    pub async fn connect(config: &Config) -> Result<Self, ConnectError> {
        info!("Connecting to RabbitMQ");

        let connection =
            Connection::connect(&config.rabbitmq_url, ConnectionProperties::default()).await?;

        let channel = connection.create_channel().await?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await?;

        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        let topology = config.topology();
        topology::declare(&channel, &topology).await?;

        info!(prefetch_count = config.prefetch_count, "RabbitMQ channel ready");

        Ok(Self {
            _connection: connection,
            channel,
            topology,
        })
    }

    /// Starts consuming the main queue with manual acknowledgement.
    pub async fn deliveries(
        &self,
    ) -> Result<impl Stream<Item = Result<QueuedMessage, BrokerError>> + Send + 'static, BrokerError>
    {
        let consumer = self
            .channel
            .basic_consume(
                self.topology.main.as_str().into(),
                CONSUMER_TAG.into(),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue = %self.topology.main, "Consumer created for queue");

        let main_queue = self.topology.main.clone();
        Ok(consumer.map(move |delivery| {
            delivery
                .map(|delivery| QueuedMessage::from_delivery(delivery, &main_queue))
                .map_err(BrokerError::from)
        }))
    }

    async fn publish_to(&self, queue: &str, payload: &[u8]) -> Result<(), BrokerError> {
        let confirmation = self
            .channel
            .basic_publish(
                "".into(),
                queue.into(),
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default()
                    .with_delivery_mode(2)
                    .with_content_type("application/json".into()),
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(BrokerError::Unavailable(format!(
                "Broker refused message for '{}'",
                queue
            )));
        }

        debug!(queue, bytes = payload.len(), "Message published");

        Ok(())
    }
}

#[async_trait]
impl DeliveryBroker for RabbitMqClient {
    async fn acknowledge(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;

        Ok(())
    }

    /// The main queue dead-letters every rejection, including
    /// `basic.reject` without requeue, so a discard is settled with an ack.
    async fn discard(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;

        Ok(())
    }

    async fn retry_later(&self, delivery_tag: u64) -> Result<(), BrokerError> {
        self.channel
            .basic_nack(
                delivery_tag,
                BasicNackOptions {
                    multiple: false,
                    requeue: false,
                },
            )
            .await?;

        Ok(())
    }

    async fn publish_to_dlq(&self, body: &[u8]) -> Result<(), BrokerError> {
        self.publish_to(&self.topology.dlq, body).await
    }

    async fn publish(&self, request: &NotificationRequest) -> Result<(), BrokerError> {
        let payload = request.encode()?;
        self.publish_to(&self.topology.main, &payload).await
    }

    async fn health_check(&self) -> Result<(), BrokerError> {
        if self.channel.status().connected() {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("RabbitMQ channel is closed".to_string()))
        }
    }
}
