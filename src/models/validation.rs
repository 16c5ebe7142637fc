use thiserror::Error;
use validator::ValidateEmail;

use crate::models::message::NotificationRequest;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid sender email")]
    InvalidSender,

    #[error("invalid recipient email")]
    InvalidRecipient,

    #[error("message required")]
    EmptyMessage,
}

/// Semantic checks shared by the HTTP gateway and the queue consumer.
pub fn validate_request(request: &NotificationRequest) -> Result<(), ValidationError> {
    if !request.sender.validate_email() {
        return Err(ValidationError::InvalidSender);
    }

    if !request.recipient.validate_email() {
        return Err(ValidationError::InvalidRecipient);
    }

    if request.message.trim().is_empty() {
        return Err(ValidationError::EmptyMessage);
    }

    Ok(())
}

/// Masks an address for logging: `jdoe@example.com` becomes `j***e@example.com`.
pub fn mask_email(email: &str) -> String {
    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return "***".to_string();
    };

    let chars: Vec<char> = local.chars().collect();
    let masked_local = match chars.as_slice() {
        [first, .., last] if chars.len() > 2 => format!("{first}***{last}"),
        _ => "***".to_string(),
    };

    format!("{masked_local}@{domain}")
}
