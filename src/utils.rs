use tracing::{error, info, warn};

use crate::{
    clients::{database::NotificationStore, rbmq::DeliveryBroker},
    error::BrokerError,
    models::{
        message::{NotificationRequest, QueuedMessage},
        status::Disposition,
        topology::MAX_DELIVERY_ATTEMPTS,
        validation::{mask_email, validate_request},
    },
};

/// Decodes, validates and persists one delivery, and decides how it must be
/// settled. Every attempt reprocesses the message from scratch.
pub async fn process_message(store: &dyn NotificationStore, message: &QueuedMessage) -> Disposition {
    let request = match NotificationRequest::decode(&message.body) {
        Ok(request) => request,
        Err(e) => {
            warn!(
                delivery_tag = message.delivery_tag,
                error = %e,
                "Undecodable message, discarding"
            );
            return Disposition::Discarded(e.to_string());
        }
    };

    if let Err(e) = validate_request(&request) {
        warn!(
            delivery_tag = message.delivery_tag,
            error = %e,
            "Invalid notification request, dropping"
        );
        return Disposition::Dropped(e.to_string());
    }

    let attempt = message.attempt();

    match store.persist(&request).await {
        Ok(outcome) => {
            info!(
                sender = %mask_email(&request.sender),
                recipient = %mask_email(&request.recipient),
                outcome = %outcome,
                attempt,
                "Stored notification"
            );
            Disposition::Stored
        }
        Err(e) if attempt >= MAX_DELIVERY_ATTEMPTS => {
            error!(
                delivery_tag = message.delivery_tag,
                attempt,
                error = %e,
                "Persistence failed on final attempt"
            );
            Disposition::DeadLetter {
                attempt,
                reason: e.to_string(),
            }
        }
        Err(e) => {
            warn!(
                delivery_tag = message.delivery_tag,
                attempt,
                max_attempts = MAX_DELIVERY_ATTEMPTS,
                transient = e.is_transient(),
                error = %e,
                "Persistence failed, scheduling retry"
            );
            Disposition::Retry {
                attempt,
                reason: e.to_string(),
            }
        }
    }
}

/// Applies a disposition to the broker.
///
/// The DLQ copy is published before the original is acknowledged. If that
/// publish fails the original goes back through the retry path instead, so a
/// message is never acknowledged without landing somewhere.
pub async fn settle(
    broker: &dyn DeliveryBroker,
    message: &QueuedMessage,
    disposition: &Disposition,
) -> Result<(), BrokerError> {
    match disposition {
        Disposition::Stored | Disposition::Dropped(_) => {
            broker.acknowledge(message.delivery_tag).await
        }
        Disposition::Discarded(_) => broker.discard(message.delivery_tag).await,
        Disposition::Retry { .. } => broker.retry_later(message.delivery_tag).await,
        Disposition::DeadLetter { attempt, .. } => {
            if let Err(e) = broker.publish_to_dlq(&message.body).await {
                error!(
                    delivery_tag = message.delivery_tag,
                    error = %e,
                    "Failed to publish to DLQ, retrying instead"
                );
                return broker.retry_later(message.delivery_tag).await;
            }

            warn!(
                delivery_tag = message.delivery_tag,
                attempt, "Message moved to DLQ"
            );
            broker.acknowledge(message.delivery_tag).await
        }
    }
}
