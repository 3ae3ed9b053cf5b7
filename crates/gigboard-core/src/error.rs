//! Error types for gigboard.

use thiserror::Error;

/// Result type alias using gigboard's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for gigboard client operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Network-level failure (connection refused, DNS, TLS, broken pipe)
    #[error("Network error: {0}")]
    Network(String),

    /// Request or connect attempt exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Authentication failed (401), after any refresh-and-retry cycle
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Forbidden (authenticated but not authorized)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Server rejected the request (4xx other than 401/403/404)
    #[error("Validation error ({status}): {message}")]
    Validation { status: u16, message: String },

    /// Server failed to handle the request (5xx)
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Real-time channel failure (handshake, closed socket, missing ack)
    #[error("Channel error: {0}")]
    Channel(String),

    /// A message send is already outstanding for this session
    #[error("A message is already being sent for this session")]
    SendInFlight,

    /// The session reached a terminal state and accepts no more messages
    #[error("Session is closed: {0}")]
    SessionClosed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse error classes that decide how a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport failures and timeouts. Users see a generic message.
    Network,
    /// 401s that survived a refresh-and-retry cycle.
    Authorization,
    /// Client-side or server-side rejections with a message worth showing.
    Validation,
    /// Everything else (bugs, bad payloads, local I/O).
    Internal,
}

/// Generic text shown for failures whose details are not user-facing.
pub const GENERIC_USER_MESSAGE: &str = "Something went wrong. Please try again.";

impl Error {
    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Network(_) | Error::Timeout(_) | Error::Channel(_) | Error::Server { .. } => {
                ErrorCategory::Network
            }
            Error::Unauthorized(_) => ErrorCategory::Authorization,
            Error::Forbidden(_)
            | Error::NotFound(_)
            | Error::Validation { .. }
            | Error::SendInFlight
            | Error::SessionClosed(_)
            | Error::InvalidInput(_) => ErrorCategory::Validation,
            Error::Serialization(_) | Error::Config(_) | Error::Internal(_) | Error::Io(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Message suitable for a toast. Validation errors carry the server's text.
    pub fn user_message(&self) -> String {
        match self {
            Error::Validation { message, .. } => message.clone(),
            Error::Forbidden(msg) | Error::NotFound(msg) | Error::InvalidInput(msg) => msg.clone(),
            Error::SendInFlight | Error::SessionClosed(_) => self.to_string(),
            Error::Unauthorized(_) => "Your session has expired. Please sign in again.".to_string(),
            _ => GENERIC_USER_MESSAGE.to_string(),
        }
    }

    /// Build an error from an HTTP status and the server-provided message.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 => Error::Unauthorized(message),
            403 => Error::Forbidden(message),
            404 => Error::NotFound(message),
            408 => Error::Timeout(message),
            400..=499 => Error::Validation { status, message },
            _ => Error::Server { status, message },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_decode() {
            Error::Serialization(e.to_string())
        } else if let Some(status) = e.status() {
            Error::from_status(status.as_u16(), e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_validation() {
        let err = Error::Validation {
            status: 422,
            message: "title is required".to_string(),
        };
        assert_eq!(err.to_string(), "Validation error (422): title is required");
    }

    #[test]
    fn test_error_display_unauthorized() {
        let err = Error::Unauthorized("invalid token".to_string());
        assert_eq!(err.to_string(), "Unauthorized: invalid token");
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(Error::from_status(401, "x"), Error::Unauthorized(_)));
        assert!(matches!(Error::from_status(403, "x"), Error::Forbidden(_)));
        assert!(matches!(Error::from_status(404, "x"), Error::NotFound(_)));
        assert!(matches!(Error::from_status(408, "x"), Error::Timeout(_)));
        assert!(matches!(
            Error::from_status(422, "x"),
            Error::Validation { status: 422, .. }
        ));
        assert!(matches!(
            Error::from_status(503, "x"),
            Error::Server { status: 503, .. }
        ));
    }

    #[test]
    fn test_category_taxonomy() {
        assert_eq!(
            Error::Network("reset".into()).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            Error::Timeout("slow".into()).category(),
            ErrorCategory::Network
        );
        assert_eq!(
            Error::Unauthorized("expired".into()).category(),
            ErrorCategory::Authorization
        );
        assert_eq!(
            Error::from_status(400, "bad").category(),
            ErrorCategory::Validation
        );
        assert_eq!(Error::SendInFlight.category(), ErrorCategory::Validation);
        assert_eq!(
            Error::Serialization("eof".into()).category(),
            ErrorCategory::Internal
        );
    }

    #[test]
    fn test_user_message_surfaces_server_text_for_validation() {
        let err = Error::from_status(400, "Invitation has expired");
        assert_eq!(err.user_message(), "Invitation has expired");
    }

    #[test]
    fn test_user_message_hides_network_details() {
        let err = Error::Network("connection refused (os error 111)".into());
        assert_eq!(err.user_message(), GENERIC_USER_MESSAGE);
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(err.to_string().contains("Serialization error:"));
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
