//! Reply correlation table.
//!
//! Matches outgoing pushes to their asynchronous replies or timeouts via
//! unique refs. Exactly-once resolution is the core guarantee: whichever
//! of reply, timeout, or cancellation removes the table entry first
//! delivers the outcome; everything that arrives later for the same ref
//! is a logged no-op.
//!
//! # Resolution Paths
//!
//! | Path | Outcome |
//! |------|---------|
//! | `phx_reply` frame arrives | `Ok(response)` / `Error(response)` |
//! | deadline expires | `Timeout` |
//! | disconnect / shutdown (`cancel_all`) | `Error(reason)` |

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::channel::push::{Push, PushOutcome};
use crate::identifiers::PushRef;

// ============================================================================
// Types
// ============================================================================

/// Callback run when a tracked push resolves, before the outcome is
/// delivered to the awaiting [`Push`].
///
/// Channels use this to run their state transition (joined, errored,
/// closed) inside the same serialized resolution step that completes the
/// push, whatever path resolved it.
pub type ResolveHook = Box<dyn FnOnce(&PushOutcome) + Send>;

/// One tracked push awaiting resolution.
struct PendingEntry {
    tx: oneshot::Sender<PushOutcome>,
    hook: Option<ResolveHook>,
    timer: JoinHandle<()>,
}

/// Map of in-flight refs to their pending entries.
type PendingMap = FxHashMap<PushRef, PendingEntry>;

// ============================================================================
// Correlator
// ============================================================================

/// Ref → pending push table with an autonomous timeout scheduler.
///
/// Shared between the frame-processing task (replies), the timers it
/// spawns (timeouts), and the socket (cancellation); the table mutex
/// serializes them so the first resolver wins.
pub struct Correlator {
    pending: Arc<Mutex<PendingMap>>,
}

impl Clone for Correlator {
    fn clone(&self) -> Self {
        Self {
            pending: Arc::clone(&self.pending),
        }
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(PendingMap::default())),
        }
    }

    /// Tracks `push_ref` and returns the awaitable push.
    ///
    /// A timer is started immediately: if nothing resolves the ref within
    /// `timeout`, the correlator resolves it to [`PushOutcome::Timeout`]
    /// itself, so the caller can never wait forever.
    pub fn track(&self, push_ref: PushRef, timeout: Duration) -> Push {
        self.track_with_hook(push_ref, timeout, None)
    }

    /// Tracks `push_ref` with a resolve hook.
    pub fn track_with_hook(
        &self,
        push_ref: PushRef,
        timeout: Duration,
        hook: Option<ResolveHook>,
    ) -> Push {
        let (tx, rx) = oneshot::channel();

        let table = Arc::clone(&self.pending);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if resolve_entry(&table, push_ref, PushOutcome::Timeout) {
                trace!(push_ref = %push_ref, timeout_ms = timeout.as_millis() as u64, "push timed out");
            }
        });

        self.pending
            .lock()
            .insert(push_ref, PendingEntry { tx, hook, timer });

        Push::new(push_ref, rx)
    }

    /// Completes and removes the entry for `push_ref`.
    ///
    /// Returns `false` if the ref is unknown (already resolved, evicted,
    /// or never tracked). Callers log those as late replies.
    pub fn resolve(&self, push_ref: PushRef, outcome: PushOutcome) -> bool {
        resolve_entry(&self.pending, push_ref, outcome)
    }

    /// Resolves every pending push to `Error(reason)`.
    ///
    /// Invoked on disconnect and shutdown; after this the table is empty.
    pub fn cancel_all(&self, reason: Value) {
        let drained: Vec<(PushRef, PendingEntry)> = self.pending.lock().drain().collect();
        let count = drained.len();

        for (_, entry) in drained {
            deliver(entry, PushOutcome::Error(reason.clone()));
        }

        if count > 0 {
            debug!(count, "cancelled pending pushes");
        }
    }

    /// Returns `true` while `push_ref` awaits resolution.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, push_ref: PushRef) -> bool {
        self.pending.lock().contains_key(&push_ref)
    }

    /// Returns the number of pushes awaiting resolution.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Removes the entry under the table lock, then delivers outside it.
///
/// Removal is the linearization point: reply, timer, and cancellation all
/// race to it, and only the winner delivers.
fn resolve_entry(pending: &Mutex<PendingMap>, push_ref: PushRef, outcome: PushOutcome) -> bool {
    let entry = pending.lock().remove(&push_ref);

    match entry {
        Some(entry) => {
            deliver(entry, outcome);
            true
        }
        None => false,
    }
}

/// Runs the hook, hands the outcome to the awaiting push, stops the timer.
fn deliver(entry: PendingEntry, outcome: PushOutcome) {
    if let Some(hook) = entry.hook {
        hook(&outcome);
    }

    // The receiver may have been dropped; resolution still counts.
    let _ = entry.tx.send(outcome);

    entry.timer.abort();
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicBool, Ordering};

    use serde_json::json;

    #[tokio::test]
    async fn test_reply_resolves_once() {
        let correlator = Correlator::new();
        let push_ref = PushRef::from_u64(1);
        let push = correlator.track(push_ref, Duration::from_secs(5));

        assert!(correlator.resolve(push_ref, PushOutcome::Ok(json!({"n": 1}))));
        assert!(!correlator.resolve(push_ref, PushOutcome::Ok(json!({"n": 2}))));

        let outcome = push.outcome().await;
        assert_eq!(outcome.ok(), Some(&json!({"n": 1})));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fires_autonomously() {
        let correlator = Correlator::new();
        let push_ref = PushRef::from_u64(2);
        let push = correlator.track(push_ref, Duration::from_millis(100));

        let outcome = push.outcome().await;
        assert!(outcome.is_timeout());
        assert!(!correlator.is_pending(push_ref));
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_is_ignored() {
        let correlator = Correlator::new();
        let push_ref = PushRef::from_u64(3);
        let push = correlator.track(push_ref, Duration::from_millis(100));

        assert!(push.outcome().await.is_timeout());

        // Reply lands after the timeout already resolved the ref.
        assert!(!correlator.resolve(push_ref, PushOutcome::Ok(Value::Null)));
    }

    #[tokio::test]
    async fn test_cancel_all_delivers_reason() {
        let correlator = Correlator::new();
        let first = correlator.track(PushRef::from_u64(4), Duration::from_secs(5));
        let second = correlator.track(PushRef::from_u64(5), Duration::from_secs(5));

        correlator.cancel_all(json!({"reason": "disconnected"}));

        for push in [first, second] {
            let outcome = push.outcome().await;
            assert_eq!(outcome.error(), Some(&json!({"reason": "disconnected"})));
        }
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_hook_runs_before_outcome_delivery() {
        let correlator = Correlator::new();
        let push_ref = PushRef::from_u64(6);
        let flag = Arc::new(AtomicBool::new(false));

        let hook_flag = Arc::clone(&flag);
        let push = correlator.track_with_hook(
            push_ref,
            Duration::from_secs(5),
            Some(Box::new(move |outcome| {
                assert!(outcome.is_ok());
                hook_flag.store(true, Ordering::SeqCst);
            })),
        );

        correlator.resolve(push_ref, PushOutcome::Ok(Value::Null));

        push.outcome().await;
        assert!(flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_pending_count_tracks_inflight() {
        let correlator = Correlator::new();
        assert_eq!(correlator.pending_count(), 0);

        let push_ref = PushRef::from_u64(7);
        let _push = correlator.track(push_ref, Duration::from_secs(5));
        assert!(correlator.is_pending(push_ref));
        assert_eq!(correlator.pending_count(), 1);

        correlator.resolve(push_ref, PushOutcome::Timeout);
        assert_eq!(correlator.pending_count(), 0);
    }
}
