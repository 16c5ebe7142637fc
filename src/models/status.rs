use std::fmt::{Display, Formatter, Result};

/// What the consumer decided to do with a delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// Persisted (or already present): acknowledge.
    Stored,
    /// Decoded but semantically invalid: acknowledge and drop.
    Dropped(String),
    /// Undecodable body: removed without retry or dead-lettering.
    Discarded(String),
    /// Persistence failed with attempts left: nack into the retry queue.
    Retry { attempt: u32, reason: String },
    /// Persistence failed on the last attempt: copy to the DLQ, then acknowledge.
    DeadLetter { attempt: u32, reason: String },
}

impl Disposition {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Disposition::Retry { .. })
    }
}

impl Display for Disposition {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self {
            Disposition::Stored => write!(f, "stored"),
            Disposition::Dropped(_) => write!(f, "dropped"),
            Disposition::Discarded(_) => write!(f, "discarded"),
            Disposition::Retry { .. } => write!(f, "retry"),
            Disposition::DeadLetter { .. } => write!(f, "dead_letter"),
        }
    }
}
