//! Reserved channel events and reply parsing.
//!
//! The protocol reserves a handful of event names for channel lifecycle;
//! everything else is an application event routed to listeners.
//!
//! # Reserved Events
//!
//! | Event | Direction | Purpose |
//! |-------|-----------|---------|
//! | `phx_join` | client → server | subscribe a session to a topic |
//! | `phx_leave` | client → server | unsubscribe a session |
//! | `phx_reply` | server → client | ok/error reply correlated by ref |
//! | `phx_close` | server → client | server closed the channel |
//! | `phx_error` | server → client | server crashed/errored the channel |
//! | `heartbeat` | client → server | connection liveness probe (topic `phoenix`) |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

// ============================================================================
// Reserved Names
// ============================================================================

/// Join a topic.
pub const PHX_JOIN: &str = "phx_join";

/// Leave a topic.
pub const PHX_LEAVE: &str = "phx_leave";

/// Correlated reply to a push.
pub const PHX_REPLY: &str = "phx_reply";

/// Server closed the channel.
pub const PHX_CLOSE: &str = "phx_close";

/// Server errored the channel.
pub const PHX_ERROR: &str = "phx_error";

/// Connection liveness probe.
pub const HEARTBEAT: &str = "heartbeat";

/// Topic heartbeats are sent on.
pub const PHOENIX_TOPIC: &str = "phoenix";

// ============================================================================
// ChannelEvent
// ============================================================================

/// Classification of a frame's event field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// `phx_join`.
    Join,
    /// `phx_leave`.
    Leave,
    /// `phx_reply`.
    Reply,
    /// `phx_close`.
    Close,
    /// `phx_error`.
    Error,
    /// `heartbeat`.
    Heartbeat,
    /// Any application-defined event.
    Custom(String),
}

impl ChannelEvent {
    /// Classifies an event name.
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name {
            PHX_JOIN => Self::Join,
            PHX_LEAVE => Self::Leave,
            PHX_REPLY => Self::Reply,
            PHX_CLOSE => Self::Close,
            PHX_ERROR => Self::Error,
            HEARTBEAT => Self::Heartbeat,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Returns the wire name of the event.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Join => PHX_JOIN,
            Self::Leave => PHX_LEAVE,
            Self::Reply => PHX_REPLY,
            Self::Close => PHX_CLOSE,
            Self::Error => PHX_ERROR,
            Self::Heartbeat => HEARTBEAT,
            Self::Custom(name) => name,
        }
    }

    /// Returns `true` if the event name is reserved by the protocol.
    #[inline]
    #[must_use]
    pub fn is_reserved(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for ChannelEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ReplyStatus
// ============================================================================

/// Status discriminator carried in a `phx_reply` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Request succeeded.
    Ok,
    /// Request failed; the response carries the reason.
    Error,
}

// ============================================================================
// Reply
// ============================================================================

/// Parsed `phx_reply` payload: `{"status": "ok"|"error", "response": ...}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Reply {
    /// Reply status.
    pub status: ReplyStatus,

    /// Server-supplied response payload.
    #[serde(default)]
    pub response: Value,
}

impl Reply {
    /// Parses a reply from a `phx_reply` frame's payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] if the payload is missing the
    /// `status` field or carries an unknown status.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        serde_json::from_value(payload.clone())
            .map_err(|e| Error::malformed_frame(format!("bad phx_reply payload: {e}")))
    }

    /// Returns `true` if this is an ok reply.
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_classification_round_trip() {
        for name in [PHX_JOIN, PHX_LEAVE, PHX_REPLY, PHX_CLOSE, PHX_ERROR, HEARTBEAT] {
            let event = ChannelEvent::from_name(name);
            assert!(event.is_reserved());
            assert_eq!(event.as_str(), name);
        }
    }

    #[test]
    fn test_custom_event() {
        let event = ChannelEvent::from_name("new_msg");
        assert_eq!(event, ChannelEvent::Custom("new_msg".to_string()));
        assert!(!event.is_reserved());
        assert_eq!(event.to_string(), "new_msg");
    }

    #[test]
    fn test_reply_ok() {
        let payload = json!({"status": "ok", "response": {"ping": "pong"}});
        let reply = Reply::from_payload(&payload).expect("parse reply");
        assert!(reply.is_ok());
        assert_eq!(reply.response, json!({"ping": "pong"}));
    }

    #[test]
    fn test_reply_error() {
        let payload = json!({"status": "error", "response": {"reason": "unmatched topic"}});
        let reply = Reply::from_payload(&payload).expect("parse reply");
        assert!(!reply.is_ok());
    }

    #[test]
    fn test_reply_missing_response_defaults_null() {
        let payload = json!({"status": "ok"});
        let reply = Reply::from_payload(&payload).expect("parse reply");
        assert_eq!(reply.response, Value::Null);
    }

    #[test]
    fn test_reply_rejects_unknown_status() {
        let payload = json!({"status": "maybe"});
        assert!(Reply::from_payload(&payload).is_err());
    }

    #[test]
    fn test_reply_rejects_missing_status() {
        let payload = json!({"response": {}});
        assert!(Reply::from_payload(&payload).is_err());
    }
}
