use std::fmt::{Display, Formatter, Result as FmtResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::message::NotificationRequest;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Content address of a request: hex SHA-256 over
/// `sender \0 recipient \0 message`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(request: &NotificationRequest) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(request.sender.as_bytes());
        hasher.update([0u8]);
        hasher.update(request.recipient.as_bytes());
        hasher.update([0u8]);
        hasher.update(request.message.as_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Fingerprint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PersistedNotification {
    pub id: i64,
    pub sender: String,
    pub recipient: String,
    pub message: String,

    #[serde(skip_serializing, default)]
    pub fingerprint: String,

    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    AlreadyExists,
}

impl Display for PersistOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            PersistOutcome::Inserted => write!(f, "inserted"),
            PersistOutcome::AlreadyExists => write!(f, "already_exists"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl ListFilter {
    /// Absent or non-positive limits fall back to the default page; larger
    /// ones are clamped to the cap.
    pub fn effective_limit(&self) -> i64 {
        match self.limit {
            Some(limit) if limit > 0 => limit.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        }
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    pub fn matches(&self, notification: &PersistedNotification) -> bool {
        self.sender
            .as_deref()
            .is_none_or(|sender| sender == notification.sender)
            && self
                .recipient
                .as_deref()
                .is_none_or(|recipient| recipient == notification.recipient)
    }
}
