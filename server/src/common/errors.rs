use std::time::Duration;
use thiserror::Error;

/// Errors produced while relaying requests over the queue pair.
///
/// The variants fall into three groups:
///
/// ## Caller errors
/// - [`Configuration`](RelayError::Configuration) - missing or invalid connection settings
/// - [`NotConnected`](RelayError::NotConnected) - an operation was attempted while disconnected
/// - [`Validation`](RelayError::Validation) - a request failed upfront validation
///
/// ## Correlation outcomes surfaced as errors by the typed request layer
/// - [`Timeout`](RelayError::Timeout) - no reply observed within the wait budget
/// - [`NoResponse`](RelayError::NoResponse) - the session ended without a reply
/// - [`UnexpectedResponseType`](RelayError::UnexpectedResponseType) - reply correlated by ID
///   but carrying a different response shape
/// - [`Api`](RelayError::Api) - the remote side answered with an error payload
///
/// ## Transport failures
/// Connection, receiver, send, receive and complete failures. These are fatal for the
/// current call and are never retried by the library.
///
/// # Examples
///
/// ```no_run
/// use server::common::RelayError;
///
/// fn describe(error: &RelayError) -> &'static str {
///     if error.is_transport_failure() {
///         "transport"
///     } else if error.is_timeout() {
///         "timeout"
///     } else {
///         "other"
///     }
/// }
/// ```
#[derive(Debug, Clone, Error)]
pub enum RelayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not connected: connect to the request and response queues first")]
    NotConnected,

    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("{command} has timed out after {timeout:?}")]
    Timeout { command: String, timeout: Duration },

    #[error("{command} has NO response")]
    NoResponse { command: String },

    #[error("{command} has unexpected response type: {actual} (expected {expected})")]
    UnexpectedResponseType {
        command: String,
        expected: String,
        actual: String,
    },

    #[error("{message}, {details}")]
    Api { message: String, details: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Session receiver failed: {0}")]
    ReceiverFailed(String),

    #[error("Message send failed: {0}")]
    MessageSendFailed(String),

    #[error("Message receive failed: {0}")]
    MessageReceiveFailed(String),

    #[error("Message complete failed: {0}")]
    MessageCompleteFailed(String),

    #[error("Operation timeout: {0}")]
    OperationTimeout(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl RelayError {
    /// Shorthand for a [`RelayError::Validation`] error.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a missing mandatory field.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::validation(field, "value is required")
    }

    /// True for errors raised by the broker connection rather than by the caller
    /// or by the correlation outcome.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            RelayError::ConnectionFailed(_)
                | RelayError::ReceiverFailed(_)
                | RelayError::MessageSendFailed(_)
                | RelayError::MessageReceiveFailed(_)
                | RelayError::MessageCompleteFailed(_)
                | RelayError::OperationTimeout(_)
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RelayError::Timeout { .. })
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Serialization(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for RelayError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        RelayError::OperationTimeout(err.to_string())
    }
}

// Result type alias for convenience
pub type RelayResult<T> = Result<T, RelayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_are_classified() {
        assert!(RelayError::ReceiverFailed("boom".into()).is_transport_failure());
        assert!(RelayError::MessageSendFailed("boom".into()).is_transport_failure());
        assert!(!RelayError::NotConnected.is_transport_failure());
        assert!(!RelayError::missing("Contact").is_transport_failure());
    }

    #[test]
    fn test_timeout_message_names_command() {
        let error = RelayError::Timeout {
            command: "RetrieveCompaniesRequest".to_string(),
            timeout: Duration::from_secs(20),
        };
        assert!(error.is_timeout());
        assert_eq!(
            error.to_string(),
            "RetrieveCompaniesRequest has timed out after 20s"
        );
    }

    #[test]
    fn test_serde_error_converts_to_serialization() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let relay: RelayError = err.into();
        assert!(matches!(relay, RelayError::Serialization(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_elapsed_is_a_transport_timeout_not_a_reply_timeout() {
        let elapsed = tokio::time::timeout(
            Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();
        let relay: RelayError = elapsed.into();
        assert!(relay.is_transport_failure());
        assert!(!relay.is_timeout());
    }
}
