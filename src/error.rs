//! Error types for the channel client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use realtime_channels::{Result, Socket};
//!
//! async fn example(socket: &Socket) -> Result<()> {
//!     let channel = socket.channel("room:42", serde_json::json!({}));
//!     let push = channel.join(std::time::Duration::from_secs(10))?;
//!     push.outcome().await;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::InvalidUrl`] |
//! | Connection | [`Error::NotConnected`], [`Error::Disconnected`], [`Error::ReconnectExhausted`] |
//! | Channel | [`Error::NotJoined`], [`Error::InvalidState`], [`Error::JoinRejected`] |
//! | Protocol | [`Error::MalformedFrame`] |
//! | Execution | [`Error::Timeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::channel::ChannelState;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Endpoint URL is missing, unparseable, or not a WebSocket URL.
    #[error("Invalid endpoint URL: {message}")]
    InvalidUrl {
        /// Description of the URL problem.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Send attempted while the transport is not open.
    #[error("Socket is not connected")]
    NotConnected,

    /// Transport lost mid-flight.
    #[error("Socket disconnected")]
    Disconnected,

    /// The reconnect attempt budget is spent; the socket is permanently
    /// closed and a new one must be created.
    #[error("Reconnect budget exhausted after {attempts} attempts")]
    ReconnectExhausted {
        /// Number of attempts made before giving up.
        attempts: u32,
    },

    // ========================================================================
    // Channel Errors
    // ========================================================================
    /// Push attempted before the channel join completed.
    #[error("Channel {topic} is not joined")]
    NotJoined {
        /// Topic of the channel.
        topic: String,
    },

    /// Lifecycle operation attempted from a state that does not allow it
    /// (e.g. `join` while already joined, `leave` while closed).
    #[error("Channel {topic} cannot do that while {state}")]
    InvalidState {
        /// Topic of the channel.
        topic: String,
        /// State the channel was in.
        state: ChannelState,
    },

    /// Server replied `error` to a join.
    #[error("Join rejected for {topic}: {reason}")]
    JoinRejected {
        /// Topic of the channel.
        topic: String,
        /// Server-supplied rejection payload.
        reason: Value,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// Inbound frame failed to decode.
    ///
    /// A single malformed frame is logged and dropped by the transport,
    /// never fatal to the connection.
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Description of the decode failure.
        message: String,
    },

    // ========================================================================
    // Execution Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates an invalid URL error.
    #[inline]
    pub fn invalid_url(message: impl Into<String>) -> Self {
        Self::InvalidUrl {
            message: message.into(),
        }
    }

    /// Creates a not-joined error.
    #[inline]
    pub fn not_joined(topic: impl Into<String>) -> Self {
        Self::NotJoined {
            topic: topic.into(),
        }
    }

    /// Creates an invalid-state error.
    #[inline]
    pub fn invalid_state(topic: impl Into<String>, state: ChannelState) -> Self {
        Self::InvalidState {
            topic: topic.into(),
            state,
        }
    }

    /// Creates a join-rejected error.
    #[inline]
    pub fn join_rejected(topic: impl Into<String>, reason: Value) -> Self {
        Self::JoinRejected {
            topic: topic.into(),
            reason,
        }
    }

    /// Creates a malformed-frame error.
    #[inline]
    pub fn malformed_frame(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::invalid_url(err.to_string())
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Returns `true` if this is a connection error.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::NotConnected
                | Self::Disconnected
                | Self::ReconnectExhausted { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error is recoverable.
    ///
    /// Recoverable errors may succeed on retry.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::NotConnected | Self::Disconnected
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    use serde_json::json;

    #[test]
    fn test_error_display() {
        let err = Error::not_joined("room:42");
        assert_eq!(err.to_string(), "Channel room:42 is not joined");
    }

    #[test]
    fn test_invalid_state_display() {
        let err = Error::invalid_state("room:42", ChannelState::Joined);
        assert_eq!(
            err.to_string(),
            "Channel room:42 cannot do that while joined"
        );
    }

    #[test]
    fn test_join_rejected_carries_reason() {
        let err = Error::join_rejected("room:42", json!({"reason": "unauthorized"}));
        assert!(err.to_string().contains("unauthorized"));
    }

    #[test]
    fn test_is_timeout() {
        let timeout_err = Error::timeout("join", 5000);
        let other_err = Error::NotConnected;

        assert!(timeout_err.is_timeout());
        assert!(!other_err.is_timeout());
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::NotConnected.is_connection_error());
        assert!(Error::Disconnected.is_connection_error());
        assert!(Error::ReconnectExhausted { attempts: 5 }.is_connection_error());
        assert!(!Error::not_joined("room:1").is_connection_error());
    }

    #[test]
    fn test_is_recoverable() {
        assert!(Error::timeout("push", 1000).is_recoverable());
        assert!(Error::Disconnected.is_recoverable());
        assert!(!Error::malformed_frame("truncated").is_recoverable());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "socket gone");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_url_error() {
        let parse_err = url::Url::parse("not a url").unwrap_err();
        let err: Error = parse_err.into();
        assert!(matches!(err, Error::InvalidUrl { .. }));
    }
}
