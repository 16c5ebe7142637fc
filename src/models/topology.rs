use lapin::types::{AMQPValue, FieldTable};

/// How long a failed message waits in the retry queue before returning to main.
pub const RETRY_DELAY_MS: i32 = 10_000;

/// Deliveries on the main queue before a message goes to the DLQ.
pub const MAX_DELIVERY_ATTEMPTS: u32 = 5;

/// Names of the queues and exchange making up the delivery pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTopology {
    pub main: String,
    pub retry: String,
    pub dlq: String,
    pub dead_letter_exchange: String,
}

/// A queue bound to an exchange under a routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding<'a> {
    pub queue: &'a str,
    pub exchange: &'a str,
    pub routing_key: &'a str,
}

impl QueueTopology {
    pub fn from_base(base: &str) -> Self {
        Self {
            main: base.to_string(),
            retry: format!("{base}.retry"),
            dlq: format!("{base}.dlq"),
            dead_letter_exchange: format!("{base}.dlx"),
        }
    }

    /// Exchange and routing key the main queue dead-letters rejections to.
    pub fn main_dead_letter_route(&self) -> (&str, &str) {
        (self.dead_letter_exchange.as_str(), self.retry.as_str())
    }

    /// Exchange and routing key expired retry messages are dead-lettered to.
    /// The empty name is the default exchange, which routes by queue name.
    pub fn retry_dead_letter_route(&self) -> (&str, &str) {
        ("", self.main.as_str())
    }

    /// Bindings on the DLX. A dead-lettered message whose routing key has no
    /// binding here is dropped by the broker without any error.
    pub fn bindings(&self) -> Vec<Binding<'_>> {
        vec![
            Binding {
                queue: &self.retry,
                exchange: &self.dead_letter_exchange,
                routing_key: &self.retry,
            },
            Binding {
                queue: &self.dlq,
                exchange: &self.dead_letter_exchange,
                routing_key: &self.dlq,
            },
        ]
    }

    /// Queue a message sent to `exchange` with `routing_key` ends up in, if any.
    pub fn route(&self, exchange: &str, routing_key: &str) -> Option<&str> {
        if exchange.is_empty() {
            return [&self.main, &self.retry, &self.dlq]
                .into_iter()
                .find(|queue| queue.as_str() == routing_key)
                .map(String::as_str);
        }

        self.bindings()
            .into_iter()
            .find(|binding| binding.exchange == exchange && binding.routing_key == routing_key)
            .map(|binding| binding.queue)
    }

    /// Rejected main-queue messages go through the DLX to the retry queue.
    pub fn main_arguments(&self) -> FieldTable {
        dead_letter_arguments(self.main_dead_letter_route())
    }

    /// Expired retry messages go back to main through the default exchange.
    pub fn retry_arguments(&self) -> FieldTable {
        let mut args = dead_letter_arguments(self.retry_dead_letter_route());
        args.insert("x-message-ttl".into(), AMQPValue::LongInt(RETRY_DELAY_MS));
        args
    }
}

fn dead_letter_arguments((exchange, routing_key): (&str, &str)) -> FieldTable {
    let mut args = FieldTable::default();
    args.insert(
        "x-dead-letter-exchange".into(),
        AMQPValue::LongString(exchange.into()),
    );
    args.insert(
        "x-dead-letter-routing-key".into(),
        AMQPValue::LongString(routing_key.into()),
    );
    args
}

impl Default for QueueTopology {
    fn default() -> Self {
        Self::from_base("notifications")
    }
}
