use std::sync::Arc;

use futures_util::{Stream, StreamExt};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    clients::{database::NotificationStore, rbmq::DeliveryBroker},
    error::BrokerError,
    models::{message::QueuedMessage, status::Disposition},
    utils::{process_message, settle},
};

/// Serial consumer of the main queue.
///
/// Holds no per-message state: attempt history lives in the broker's x-death
/// headers and deduplication in the store's unique fingerprint.
#[derive(Clone)]
pub struct DeliveryConsumer {
    store: Arc<dyn NotificationStore>,
    broker: Arc<dyn DeliveryBroker>,
}

impl DeliveryConsumer {
    pub fn new(store: Arc<dyn NotificationStore>, broker: Arc<dyn DeliveryBroker>) -> Self {
        Self { store, broker }
    }

    /// Handles one delivery end to end and returns what was done with it.
    pub async fn handle(&self, message: QueuedMessage) -> Disposition {
        let disposition = process_message(self.store.as_ref(), &message).await;

        if let Err(e) = settle(self.broker.as_ref(), &message, &disposition).await {
            error!(
                delivery_tag = message.delivery_tag,
                disposition = %disposition,
                error = %e,
                "Failed to settle delivery, broker will redeliver"
            );
        }

        disposition
    }

    /// Consumes until the stream ends or `shutdown` fires. A delivery in
    /// flight at shutdown is left unacknowledged for redelivery.
    pub async fn run<S>(&self, deliveries: S, shutdown: CancellationToken) -> Result<(), BrokerError>
    where
        S: Stream<Item = Result<QueuedMessage, BrokerError>> + Send,
    {
        let mut deliveries = std::pin::pin!(deliveries);

        info!("Delivery consumer started");

        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, stopping delivery consumer");
                    return Ok(());
                }
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    let disposition = self.handle(message).await;
                    debug!(disposition = %disposition, "Delivery handled");
                }
                Some(Err(e)) => {
                    error!(error = %e, "Consumer stream failed");
                    return Err(e);
                }
                None => {
                    info!("Consumer stream closed");
                    return Ok(());
                }
            }
        }
    }

    /// Runs the consumer on its own task. Whenever it stops, for any reason,
    /// `shutdown` is cancelled so the rest of the process exits with it and a
    /// supervisor restart reconnects to the broker.
    pub fn spawn<S>(
        self,
        deliveries: S,
        shutdown: CancellationToken,
    ) -> JoinHandle<Result<(), BrokerError>>
    where
        S: Stream<Item = Result<QueuedMessage, BrokerError>> + Send + 'static,
    {
        tokio::spawn(async move {
            let result = self.run(deliveries, shutdown.clone()).await;

            if !shutdown.is_cancelled() {
                warn!("Delivery consumer exited, shutting down service");
                shutdown.cancel();
            }

            result
        })
    }
}
