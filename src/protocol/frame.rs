//! Frame envelope and wire codec.
//!
//! Every message on the socket is one [`Frame`], serialized as the compact
//! JSON array `[join_ref, ref, topic, event, payload]` with refs encoded
//! as decimal strings and absent refs as `null`.
//!
//! # Format
//!
//! ```json
//! ["3", "7", "room:42", "phx_join", {"token": "..."}]
//! [null, null, "room:42", "new_msg", {"body": "hi"}]
//! ["3", "7", "room:42", "phx_reply", {"status": "ok", "response": {}}]
//! ```
//!
//! Encoding and decoding are pure functions over the frame; the codec
//! holds no state and is safe to call from any task.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{JoinRef, PushRef};

use super::event::{self, ChannelEvent, Reply};

// ============================================================================
// Frame
// ============================================================================

/// One protocol message: topic, event, payload, and correlation refs.
///
/// `push_ref` is present on requests and their replies, absent on
/// broadcasts. `join_ref` ties a frame to the join epoch of its channel;
/// the multiplexer drops frames whose join epoch is stale.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Join epoch the frame belongs to.
    pub join_ref: Option<JoinRef>,

    /// Correlation id of the push this frame is or answers.
    pub push_ref: Option<PushRef>,

    /// Topic routing key (e.g. `"room:42"`).
    pub topic: String,

    /// Event name, reserved or application-defined.
    pub event: String,

    /// Opaque structured payload.
    pub payload: Value,
}

// ============================================================================
// Frame - Constructors
// ============================================================================

impl Frame {
    /// Creates a broadcast-shaped frame with no refs.
    #[inline]
    #[must_use]
    pub fn new(topic: impl Into<String>, event: impl Into<String>, payload: Value) -> Self {
        Self {
            join_ref: None,
            push_ref: None,
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    /// Creates a `phx_join` frame opening a new join epoch.
    #[must_use]
    pub fn join(
        topic: impl Into<String>,
        params: Value,
        join_ref: JoinRef,
        push_ref: PushRef,
    ) -> Self {
        Self {
            join_ref: Some(join_ref),
            push_ref: Some(push_ref),
            topic: topic.into(),
            event: event::PHX_JOIN.to_string(),
            payload: params,
        }
    }

    /// Creates a `phx_leave` frame for the given join epoch.
    #[must_use]
    pub fn leave(topic: impl Into<String>, join_ref: JoinRef, push_ref: PushRef) -> Self {
        Self {
            join_ref: Some(join_ref),
            push_ref: Some(push_ref),
            topic: topic.into(),
            event: event::PHX_LEAVE.to_string(),
            payload: Value::Object(serde_json::Map::new()),
        }
    }

    /// Creates a heartbeat frame on the reserved `phoenix` topic.
    #[must_use]
    pub fn heartbeat(push_ref: PushRef) -> Self {
        Self {
            join_ref: None,
            push_ref: Some(push_ref),
            topic: event::PHOENIX_TOPIC.to_string(),
            event: event::HEARTBEAT.to_string(),
            payload: Value::Object(serde_json::Map::new()),
        }
    }

    /// Creates an application push frame tied to a join epoch.
    #[must_use]
    pub fn push(
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
        join_ref: JoinRef,
        push_ref: PushRef,
    ) -> Self {
        Self {
            join_ref: Some(join_ref),
            push_ref: Some(push_ref),
            topic: topic.into(),
            event: event.into(),
            payload,
        }
    }

    /// Creates the `phx_reply` answering `request` with status `ok`.
    ///
    /// Mirrors the request's refs and topic. Used by servers and test
    /// doubles; clients only ever decode replies.
    #[must_use]
    pub fn reply_ok(request: &Frame, response: Value) -> Self {
        Self::reply(request, "ok", response)
    }

    /// Creates the `phx_reply` answering `request` with status `error`.
    #[must_use]
    pub fn reply_error(request: &Frame, response: Value) -> Self {
        Self::reply(request, "error", response)
    }

    fn reply(request: &Frame, status: &str, response: Value) -> Self {
        Self {
            join_ref: request.join_ref,
            push_ref: request.push_ref,
            topic: request.topic.clone(),
            event: event::PHX_REPLY.to_string(),
            payload: serde_json::json!({ "status": status, "response": response }),
        }
    }
}

// ============================================================================
// Frame - Accessors
// ============================================================================

impl Frame {
    /// Classifies the frame's event field.
    #[inline]
    #[must_use]
    pub fn event_kind(&self) -> ChannelEvent {
        ChannelEvent::from_name(&self.event)
    }

    /// Returns `true` if this frame is a `phx_reply`.
    #[inline]
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.event == event::PHX_REPLY
    }

    /// Returns `true` if this frame is a server broadcast (no push ref).
    #[inline]
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self.push_ref.is_none() && !self.is_reply()
    }

    /// Parses the payload of a `phx_reply` frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] if the payload is not a valid
    /// reply envelope.
    pub fn reply_payload(&self) -> Result<Reply> {
        Reply::from_payload(&self.payload)
    }
}

// ============================================================================
// Frame - Codec
// ============================================================================

impl Frame {
    /// Encodes the frame to its wire form.
    pub fn encode(&self) -> String {
        let parts = Value::Array(vec![
            ref_to_value(self.join_ref.map(|r| r.as_u64())),
            ref_to_value(self.push_ref.map(|r| r.as_u64())),
            Value::String(self.topic.clone()),
            Value::String(self.event.clone()),
            self.payload.clone(),
        ]);
        parts.to_string()
    }

    /// Decodes a frame from its wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] if the text is not a five-element
    /// JSON array, topic or event are not strings, or a ref is not null or
    /// a decimal string.
    pub fn decode(text: &str) -> Result<Frame> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::malformed_frame(format!("invalid JSON: {e}")))?;

        let Value::Array(mut parts) = value else {
            return Err(Error::malformed_frame("expected array envelope"));
        };

        if parts.len() != 5 {
            return Err(Error::malformed_frame(format!(
                "expected 5 elements, got {}",
                parts.len()
            )));
        }

        // Popped in reverse field order.
        let payload = parts.pop().unwrap_or(Value::Null);
        let event = require_string(parts.pop(), "event")?;
        let topic = require_string(parts.pop(), "topic")?;
        let push_ref = decode_ref(parts.pop(), "ref")?.map(PushRef::from_u64);
        let join_ref = decode_ref(parts.pop(), "join_ref")?.map(JoinRef::from_u64);

        Ok(Frame {
            join_ref,
            push_ref,
            topic,
            event,
            payload,
        })
    }
}

// ============================================================================
// Codec Helpers
// ============================================================================

fn ref_to_value(raw: Option<u64>) -> Value {
    match raw {
        Some(n) => Value::String(n.to_string()),
        None => Value::Null,
    }
}

fn require_string(value: Option<Value>, field: &str) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s),
        other => Err(Error::malformed_frame(format!(
            "{field} must be a string, got {other:?}"
        ))),
    }
}

fn decode_ref(value: Option<Value>, field: &str) -> Result<Option<u64>> {
    match value {
        Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => s
            .parse::<u64>()
            .map(Some)
            .map_err(|_| Error::malformed_frame(format!("{field} is not a decimal string: {s:?}"))),
        other => Err(Error::malformed_frame(format!(
            "{field} must be null or a string, got {other:?}"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_encode_join_frame() {
        let frame = Frame::join(
            "room:42",
            json!({"token": "abc"}),
            JoinRef::from_u64(3),
            PushRef::from_u64(7),
        );

        let text = frame.encode();
        assert_eq!(text, r#"["3","7","room:42","phx_join",{"token":"abc"}]"#);
    }

    #[test]
    fn test_encode_broadcast_frame_uses_nulls() {
        let frame = Frame::new("room:42", "new_msg", json!({"body": "hi"}));
        assert_eq!(frame.encode(), r#"[null,null,"room:42","new_msg",{"body":"hi"}]"#);
    }

    #[test]
    fn test_decode_reply_frame() {
        let text = r#"["3","1","room:42","phx_reply",{"status":"ok","response":{}}]"#;
        let frame = Frame::decode(text).expect("decode");

        assert_eq!(frame.join_ref, Some(JoinRef::from_u64(3)));
        assert_eq!(frame.push_ref, Some(PushRef::from_u64(1)));
        assert_eq!(frame.topic, "room:42");
        assert!(frame.is_reply());

        let reply = frame.reply_payload().expect("reply payload");
        assert!(reply.is_ok());
    }

    #[test]
    fn test_round_trip() {
        let frame = Frame::push(
            "room:42",
            "ping",
            json!({"n": 1, "arr": [1, 2]}),
            JoinRef::from_u64(5),
            PushRef::from_u64(9),
        );

        let decoded = Frame::decode(&frame.encode()).expect("decode");
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_decode_rejects_invalid_json() {
        let err = Frame::decode("{not json").unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_decode_rejects_non_array() {
        let err = Frame::decode(r#"{"topic": "room:42"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_decode_rejects_wrong_arity() {
        let err = Frame::decode(r#"[null,"1","room:42","ping"]"#).unwrap_err();
        assert!(err.to_string().contains("5 elements"));
    }

    #[test]
    fn test_decode_rejects_non_string_topic() {
        let err = Frame::decode(r#"[null,null,42,"ping",{}]"#).unwrap_err();
        assert!(err.to_string().contains("topic"));
    }

    #[test]
    fn test_decode_rejects_numeric_ref() {
        let err = Frame::decode(r#"[null,7,"room:42","ping",{}]"#).unwrap_err();
        assert!(err.to_string().contains("ref"));
    }

    #[test]
    fn test_decode_rejects_non_decimal_ref() {
        let err = Frame::decode(r#"[null,"seven","room:42","ping",{}]"#).unwrap_err();
        assert!(matches!(err, Error::MalformedFrame { .. }));
    }

    #[test]
    fn test_is_broadcast() {
        let broadcast = Frame::new("room:42", "new_msg", json!({}));
        assert!(broadcast.is_broadcast());

        let push = Frame::push("room:42", "ping", json!({}), JoinRef::from_u64(1), PushRef::from_u64(2));
        assert!(!push.is_broadcast());
    }

    #[test]
    fn test_reply_mirrors_request_refs() {
        let request = Frame::push(
            "room:42",
            "ping",
            json!({}),
            JoinRef::from_u64(1),
            PushRef::from_u64(2),
        );
        let reply = Frame::reply_ok(&request, json!({"ping": "pong"}));

        assert_eq!(reply.join_ref, request.join_ref);
        assert_eq!(reply.push_ref, request.push_ref);
        assert_eq!(reply.topic, request.topic);
        assert!(reply.is_reply());
    }

    // ------------------------------------------------------------------------
    // Property: decode(encode(f)) == f for well-formed frames
    // ------------------------------------------------------------------------

    fn payload_strategy() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 _:-]{0,24}".prop_map(Value::from),
            proptest::collection::btree_map("[a-z_]{1,8}", "[a-z0-9 ]{0,12}", 0..4).prop_map(|m| {
                Value::Object(m.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }),
        ]
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            join_ref in proptest::option::of(any::<u64>()),
            push_ref in proptest::option::of(any::<u64>()),
            topic in "[a-z0-9:_-]{1,24}",
            event in "[a-z0-9_]{1,16}",
            payload in payload_strategy(),
        ) {
            let frame = Frame {
                join_ref: join_ref.map(JoinRef::from_u64),
                push_ref: push_ref.map(PushRef::from_u64),
                topic,
                event,
                payload,
            };

            let decoded = Frame::decode(&frame.encode()).expect("round trip");
            prop_assert_eq!(decoded, frame);
        }
    }
}
