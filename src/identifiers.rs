//! Type-safe identifiers for reply correlation.
//!
//! Newtype wrappers prevent mixing incompatible refs at compile time:
//! a [`PushRef`] correlates one push with its reply, a [`JoinRef`] marks
//! the join epoch a frame belongs to.
//!
//! Both kinds draw from a single [`RefCounter`] per connection, so a ref
//! is unique across the connection while in flight. On the wire a ref is
//! a decimal string (`"1"`, `"2"`, ...), matching the servers this crate
//! talks to.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

// ============================================================================
// PushRef
// ============================================================================

/// Correlation id for one in-flight push.
///
/// Assigned at send time, echoed back by the server in the matching
/// `phx_reply` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PushRef(u64);

impl PushRef {
    /// Creates a ref from a raw counter value.
    #[inline]
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Parses a ref from its wire form (a decimal string).
    ///
    /// Returns `None` for anything that is not a decimal integer.
    #[inline]
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        text.parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for PushRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for PushRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PushRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(RefVisitor).map(PushRef)
    }
}

// ============================================================================
// JoinRef
// ============================================================================

/// Identifier of a join epoch.
///
/// Every successful or attempted join gets a fresh `JoinRef`; frames
/// carrying a stale one are discarded by the multiplexer so replies from
/// before a reconnect can never reach the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JoinRef(u64);

impl JoinRef {
    /// Creates a join ref from a raw counter value.
    #[inline]
    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw counter value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Parses a join ref from its wire form (a decimal string).
    #[inline]
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        text.parse::<u64>().ok().map(Self)
    }
}

impl fmt::Display for JoinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for JoinRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for JoinRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_str(RefVisitor).map(JoinRef)
    }
}

// ============================================================================
// RefCounter
// ============================================================================

/// Monotonic ref generator shared by one connection.
///
/// Starts at 1; push refs and join refs draw from the same sequence, so
/// no two refs of either kind collide on the wire.
#[derive(Debug)]
pub struct RefCounter(AtomicU64);

impl RefCounter {
    /// Creates a counter starting at 1.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(1))
    }

    /// Returns the next push ref.
    #[inline]
    pub fn next_push(&self) -> PushRef {
        PushRef(self.0.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the next join ref.
    #[inline]
    pub fn next_join(&self) -> JoinRef {
        JoinRef(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for RefCounter {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Wire Visitor
// ============================================================================

/// Deserializes a ref from its decimal-string wire form.
struct RefVisitor;

impl Visitor<'_> for RefVisitor {
    type Value = u64;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("a decimal string ref")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<u64, E> {
        value
            .parse::<u64>()
            .map_err(|_| E::custom(format!("invalid ref: {value:?}")))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_one() {
        let refs = RefCounter::new();
        assert_eq!(refs.next_push(), PushRef::from_u64(1));
        assert_eq!(refs.next_push(), PushRef::from_u64(2));
    }

    #[test]
    fn test_push_and_join_refs_share_sequence() {
        let refs = RefCounter::new();
        let push = refs.next_push();
        let join = refs.next_join();
        assert_ne!(push.as_u64(), join.as_u64());
    }

    #[test]
    fn test_display_is_decimal() {
        assert_eq!(PushRef::from_u64(42).to_string(), "42");
        assert_eq!(JoinRef::from_u64(7).to_string(), "7");
    }

    #[test]
    fn test_parse_round_trip() {
        let push = PushRef::from_u64(123);
        assert_eq!(PushRef::parse(&push.to_string()), Some(push));
        assert_eq!(PushRef::parse("not-a-ref"), None);
        assert_eq!(JoinRef::parse("-1"), None);
    }

    #[test]
    fn test_serde_string_form() {
        let json = serde_json::to_string(&PushRef::from_u64(9)).expect("serialize");
        assert_eq!(json, "\"9\"");

        let back: PushRef = serde_json::from_str("\"9\"").expect("deserialize");
        assert_eq!(back, PushRef::from_u64(9));

        let bad: Result<PushRef, _> = serde_json::from_str("\"x\"");
        assert!(bad.is_err());
    }
}
