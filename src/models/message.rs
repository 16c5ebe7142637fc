use lapin::{
    message::Delivery,
    types::{AMQPValue, FieldTable, LongString, ShortString},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Wire format on the main and retry queues.
///
/// Unknown fields are ignored on decode, which leaves room for an envelope
/// version field without breaking consumers already deployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub sender: String,
    pub recipient: String,
    pub message: String,
}

impl NotificationRequest {
    pub fn new(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
            message: message.into(),
        }
    }

    pub fn decode(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A delivery taken off the main queue, reduced to what the consumer needs.
///
/// `prior_failures` is how many times the broker has already dead-lettered this
/// message out of the main queue; it is never written by the consumer.
#[derive(Debug, Clone)]
pub struct QueuedMessage {
    pub delivery_tag: u64,
    pub body: Vec<u8>,
    pub prior_failures: u32,
}

impl QueuedMessage {
    pub fn new(delivery_tag: u64, body: Vec<u8>, prior_failures: u32) -> Self {
        Self {
            delivery_tag,
            body,
            prior_failures,
        }
    }

    pub fn from_delivery(delivery: Delivery, main_queue: &str) -> Self {
        let prior_failures =
            match prior_failures(delivery.properties.headers().as_ref(), main_queue) {
                Ok(count) => count,
                Err(e) => {
                    warn!(
                        delivery_tag = delivery.delivery_tag,
                        error = %e,
                        "Unreadable x-death header, counting as first attempt"
                    );
                    0
                }
            };

        Self {
            delivery_tag: delivery.delivery_tag,
            body: delivery.data,
            prior_failures,
        }
    }

    /// 1-based number of the delivery currently being handled.
    pub fn attempt(&self) -> u32 {
        self.prior_failures.saturating_add(1)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DeathHeaderError {
    #[error("x-death is not an array")]
    NotAnArray,

    #[error("x-death entry is not a table")]
    EntryNotATable,

    #[error("x-death entry for the main queue has no usable count")]
    MissingCount,
}

/// Reads the broker's dead-letter bookkeeping for `main_queue`.
///
/// Only the entry recorded when the main queue rejected the message counts;
/// the matching `expired` entry written by the retry queue is ignored. Missing
/// headers mean the message was never dead-lettered.
pub fn prior_failures(
    headers: Option<&FieldTable>,
    main_queue: &str,
) -> Result<u32, DeathHeaderError> {
    let Some(deaths) = headers.and_then(|h| h.inner().get(&ShortString::from("x-death"))) else {
        return Ok(0);
    };

    let AMQPValue::FieldArray(entries) = deaths else {
        return Err(DeathHeaderError::NotAnArray);
    };

    let queue = AMQPValue::LongString(LongString::from(main_queue));
    let rejected = AMQPValue::LongString(LongString::from("rejected"));

    let mut highest = 0;
    for entry in entries.as_slice() {
        let AMQPValue::FieldTable(table) = entry else {
            return Err(DeathHeaderError::EntryNotATable);
        };
        let fields = table.inner();

        if fields.get(&ShortString::from("queue")) != Some(&queue)
            || fields.get(&ShortString::from("reason")) != Some(&rejected)
        {
            continue;
        }

        let count = fields
            .get(&ShortString::from("count"))
            .and_then(as_count)
            .ok_or(DeathHeaderError::MissingCount)?;
        highest = highest.max(count);
    }

    Ok(highest)
}

fn as_count(value: &AMQPValue) -> Option<u32> {
    match value {
        AMQPValue::LongLongInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongInt(n) => u32::try_from(*n).ok(),
        AMQPValue::LongUInt(n) => Some(*n),
        AMQPValue::ShortInt(n) => u32::try_from(*n).ok(),
        AMQPValue::ShortUInt(n) => Some(u32::from(*n)),
        _ => None,
    }
}
