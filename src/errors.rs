//! # Conversation Error Types
//!
//! Errors surfaced by the conversation engine. Input validation problems never
//! show up here; they are answered with a corrective prompt instead.

/// Custom error types for conversation handling
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationError {
    /// A store read or write failed
    Storage(String),
    /// The next prompt could not be delivered
    Delivery(String),
    /// A referenced product or order does not exist
    NotFound(String),
    /// A payment payload could not be parsed or settled
    Payment(String),
    /// A non-admin invoked an admin-only action
    Unauthorized,
}

impl std::fmt::Display for ConversationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationError::Storage(msg) => write!(f, "Storage error: {msg}"),
            ConversationError::Delivery(msg) => write!(f, "Delivery error: {msg}"),
            ConversationError::NotFound(msg) => write!(f, "Not found: {msg}"),
            ConversationError::Payment(msg) => write!(f, "Payment error: {msg}"),
            ConversationError::Unauthorized => write!(f, "Unauthorized"),
        }
    }
}

impl std::error::Error for ConversationError {}

impl From<anyhow::Error> for ConversationError {
    fn from(err: anyhow::Error) -> Self {
        // `{:#}` keeps the context chain on one line
        ConversationError::Storage(format!("{err:#}"))
    }
}
