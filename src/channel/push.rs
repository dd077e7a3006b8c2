//! In-flight pushes and their outcomes.
//!
//! A [`Push`] is one outstanding request awaiting its correlated reply.
//! It resolves exactly once to a [`PushOutcome`] (ok, error, or timeout)
//! and never leaves the caller waiting indefinitely: the correlator
//! guarantees a terminal outcome on reply, timeout expiry, disconnect,
//! or shutdown.

// ============================================================================
// Imports
// ============================================================================

use serde_json::{Value, json};
use tokio::sync::oneshot;
use tracing::trace;

use crate::identifiers::PushRef;

// ============================================================================
// PushOutcome
// ============================================================================

/// Terminal result of a push. Exactly one of these is delivered per push.
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Server replied `ok`; carries the response payload.
    Ok(Value),

    /// Server replied `error`, or the push was cancelled by disconnect,
    /// leave, or shutdown; carries the reason payload.
    Error(Value),

    /// No reply arrived within the push's deadline.
    Timeout,
}

impl PushOutcome {
    /// Returns `true` for an ok outcome.
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns `true` for an error outcome.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Returns `true` for a timeout outcome.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Returns the ok payload, if any.
    #[inline]
    #[must_use]
    pub fn ok(&self) -> Option<&Value> {
        match self {
            Self::Ok(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the error payload, if any.
    #[inline]
    #[must_use]
    pub fn error(&self) -> Option<&Value> {
        match self {
            Self::Error(value) => Some(value),
            _ => None,
        }
    }
}

// ============================================================================
// Push
// ============================================================================

/// Handle to one in-flight push.
///
/// Obtained from [`Channel::join`](crate::Channel::join),
/// [`Channel::push`](crate::Channel::push), or
/// [`Channel::leave`](crate::Channel::leave). Await [`Push::outcome`] to
/// observe the single terminal result. Dropping the handle is allowed;
/// the push still resolves internally (e.g. a join keeps driving the
/// channel state machine).
#[derive(Debug)]
pub struct Push {
    push_ref: PushRef,
    rx: oneshot::Receiver<PushOutcome>,
}

impl Push {
    /// Wraps a tracked ref and its outcome receiver.
    pub(crate) fn new(push_ref: PushRef, rx: oneshot::Receiver<PushOutcome>) -> Self {
        Self { push_ref, rx }
    }

    /// The correlation ref assigned at send time.
    #[inline]
    #[must_use]
    pub fn push_ref(&self) -> PushRef {
        self.push_ref
    }

    /// Waits for the terminal outcome.
    ///
    /// If the socket is torn down without resolving the ref (the
    /// correlator was dropped whole), this degrades to an error outcome
    /// rather than hanging.
    pub async fn outcome(self) -> PushOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => {
                trace!(push_ref = %self.push_ref, "push resolver dropped");
                PushOutcome::Error(json!({ "reason": "socket shutdown" }))
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_outcome_delivers_ok() {
        let (tx, rx) = oneshot::channel();
        let push = Push::new(PushRef::from_u64(1), rx);

        tx.send(PushOutcome::Ok(json!({"ping": "pong"})))
            .expect("send outcome");

        let outcome = push.outcome().await;
        assert!(outcome.is_ok());
        assert_eq!(outcome.ok(), Some(&json!({"ping": "pong"})));
    }

    #[tokio::test]
    async fn test_dropped_sender_degrades_to_error() {
        let (tx, rx) = oneshot::channel::<PushOutcome>();
        let push = Push::new(PushRef::from_u64(2), rx);
        drop(tx);

        let outcome = push.outcome().await;
        assert!(outcome.is_error());
    }

    #[test]
    fn test_outcome_predicates_are_exclusive() {
        let ok = PushOutcome::Ok(Value::Null);
        let error = PushOutcome::Error(Value::Null);
        let timeout = PushOutcome::Timeout;

        assert!(ok.is_ok() && !ok.is_error() && !ok.is_timeout());
        assert!(error.is_error() && !error.is_ok() && !error.is_timeout());
        assert!(timeout.is_timeout() && !timeout.is_ok() && !timeout.is_error());
        assert!(timeout.ok().is_none() && timeout.error().is_none());
    }
}
