//! Error types for the bridge.

use thiserror::Error;

/// Broad error category, used to decide how a failure is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Authentication,
    Api,
    Server,
    Network,
    Configuration,
    Serialization,
    LookupMiss,
    Channel,
    Unknown,
}

/// Primary error type for all bridge operations.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Contact not found for external id '{0}'")]
    ContactNotFound(String),

    #[error("Conversation '{0}' is not owned by this coordinator")]
    UnknownConversation(String),

    #[error("Chat channel error: {0}")]
    Channel(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl BridgeError {
    /// Create an API error.
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Api { status, .. } => match status {
                401 | 403 => ErrorCategory::Authentication,
                500..=599 => ErrorCategory::Server,
                _ => ErrorCategory::Api,
            },
            Self::Network(_) => ErrorCategory::Network,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::ContactNotFound(_) | Self::UnknownConversation(_) => ErrorCategory::LookupMiss,
            Self::Channel(_) => ErrorCategory::Channel,
            _ => ErrorCategory::Unknown,
        }
    }

    /// Whether the failure came from talking to the helpdesk.
    pub fn is_transport(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Authentication
                | ErrorCategory::Api
                | ErrorCategory::Server
                | ErrorCategory::Network
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, BridgeError>;
