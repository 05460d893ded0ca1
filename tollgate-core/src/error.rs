//! Unified error handling system
//!
//! Structured error types with context and recovery suggestions. Authentication
//! failures are deliberately absent: a rejected token is a normal `None` result,
//! not an error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub type TollgateResult<T> = Result<T, TollgateError>;

/// Error context providing additional information for debugging and recovery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: String,
    /// Timestamp when error occurred
    pub timestamp: DateTime<Utc>,
    /// Component where error originated
    pub component: String,
    /// Operation being performed when error occurred
    pub operation: Option<String>,
    /// Additional metadata
    pub metadata: std::collections::HashMap<String, String>,
    /// Recovery suggestions
    pub recovery_suggestions: Vec<String>,
}

impl ErrorContext {
    pub fn new(component: &str) -> Self {
        Self {
            error_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            component: component.to_string(),
            operation: None,
            metadata: std::collections::HashMap::new(),
            recovery_suggestions: Vec::new(),
        }
    }

    pub fn with_operation(mut self, operation: &str) -> Self {
        self.operation = Some(operation.to_string());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_suggestion(mut self, suggestion: &str) -> Self {
        self.recovery_suggestions.push(suggestion.to_string());
        self
    }
}

/// Main error type for the tollgate system
#[derive(Error, Debug)]
pub enum TollgateError {
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// The presented token is not a well-formed three-segment token.
    #[error("Malformed token: {reason}")]
    MalformedToken {
        reason: String,
        context: ErrorContext,
    },

    #[error("Persistence error: {message}")]
    Persistence {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        context: ErrorContext,
    },

    /// The session is live in memory but its durable copy was not written.
    /// The token remains valid for this process and is handed back here.
    #[error("Session created but not persisted: {source}")]
    NotPersisted {
        token: String,
        #[source]
        source: Box<TollgateError>,
        context: ErrorContext,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TollgateError {
    /// Get the error context
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            TollgateError::Config { context, .. } => Some(context),
            TollgateError::MalformedToken { context, .. } => Some(context),
            TollgateError::Persistence { context, .. } => Some(context),
            TollgateError::NotPersisted { context, .. } => Some(context),
            _ => None,
        }
    }

    /// Build a malformed-token error for the codec
    pub fn malformed(reason: impl Into<String>) -> Self {
        TollgateError::MalformedToken {
            reason: reason.into(),
            context: ErrorContext::new("token_codec").with_operation("decode"),
        }
    }

    pub fn is_malformed_token(&self) -> bool {
        matches!(self, TollgateError::MalformedToken { .. })
    }

    /// Token carried by a `NotPersisted` error, still usable in this process
    pub fn unpersisted_token(&self) -> Option<&str> {
        match self {
            TollgateError::NotPersisted { token, .. } => Some(token),
            _ => None,
        }
    }

    /// Check if error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            TollgateError::Persistence { .. } => true,
            TollgateError::NotPersisted { .. } => true,
            TollgateError::Io(_) => true,
            TollgateError::Config { .. } => false,
            TollgateError::MalformedToken { .. } => false,
            _ => false,
        }
    }

    /// Log the error with appropriate level
    pub fn log(&self) {
        match self {
            TollgateError::Config { .. } => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Configuration error"
                );
            }
            TollgateError::Persistence { .. } | TollgateError::NotPersisted { .. } => {
                warn!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Persistence error (may be recoverable)"
                );
            }
            TollgateError::MalformedToken { .. } => {
                tracing::debug!(error = %self, "Rejected malformed token");
            }
            _ => {
                error!(
                    error_id = ?self.context().map(|c| &c.error_id),
                    error = %self,
                    "Error occurred"
                );
            }
        }
    }
}

/// Convenience macros for creating errors with context
#[macro_export]
macro_rules! config_error {
    ($msg:expr, $component:expr) => {
        $crate::TollgateError::Config {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component)
                .with_suggestion("Check the [sessions] section of your configuration file"),
        }
    };
}

#[macro_export]
macro_rules! persistence_error {
    ($msg:expr, $component:expr) => {
        $crate::TollgateError::Persistence {
            message: $msg.to_string(),
            source: None,
            context: $crate::ErrorContext::new($component),
        }
    };
    ($msg:expr, $component:expr, $source:expr) => {
        $crate::TollgateError::Persistence {
            message: $msg.to_string(),
            source: Some(Box::new($source)),
            context: $crate::ErrorContext::new($component),
        }
    };
}
