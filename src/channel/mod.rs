//! Channel sessions: joined subscriptions to one topic.
//!
//! A [`Channel`] is a cheap cloneable handle to one session owned by its
//! [`Socket`](crate::Socket). The session tracks join state, the current
//! join epoch, registered event listeners, and its in-flight pushes.
//!
//! # State Machine
//!
//! ```text
//! closed ──join──► joining ──ok──► joined ──leave──► leaving ──► closed
//!    ▲                │               │                 │
//!    │            error/timeout   error/disconnect  error/disconnect
//!    │                ▼               ▼                 ▼
//!    └────────────── errored ◄────────┴─────────────────┘
//!                     │
//!                     └──retried join──► joining
//! ```
//!
//! Listeners registered with [`Channel::on`] run synchronously inside the
//! socket's frame-processing task, in registration order.

// ============================================================================
// Submodules
// ============================================================================

/// In-flight pushes and their outcomes.
pub mod push;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::identifiers::{JoinRef, PushRef};
use crate::protocol::event;
use crate::protocol::frame::Frame;
use crate::socket::core::SocketCore;
use crate::transport::correlator::Correlator;

use self::push::{Push, PushOutcome};

// ============================================================================
// ChannelState
// ============================================================================

/// Lifecycle state of a channel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Not subscribed; `join` is valid.
    Closed,
    /// Join push in flight (or parked until the socket opens).
    Joining,
    /// Subscribed; pushes and broadcasts flow.
    Joined,
    /// Leave push in flight.
    Leaving,
    /// Join failed or transport lost; `join` is valid again.
    Errored,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Joining => "joining",
            Self::Joined => "joined",
            Self::Leaving => "leaving",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Bindings
// ============================================================================

/// Handle returned by [`Channel::on`], usable to unsubscribe the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindingHandle {
    id: u64,
}

/// One registered event listener.
struct Binding {
    id: u64,
    event: String,
    callback: Arc<dyn Fn(&Value) + Send + Sync>,
}

// ============================================================================
// ChannelShared
// ============================================================================

/// Session state shared between channel handles and the socket.
pub(crate) struct ChannelShared {
    topic: String,
    params: Mutex<Value>,
    state: Mutex<ChannelState>,
    join_ref: Mutex<Option<JoinRef>>,
    join_timeout: Mutex<Duration>,
    /// Join frame built while the socket was not open, sent on open.
    parked_join: Mutex<Option<Frame>>,
    /// Whether to rejoin automatically after a reconnect.
    rejoin: AtomicBool,
    bindings: Mutex<Vec<Binding>>,
    next_binding_id: AtomicU64,
    /// Refs of this session's in-flight pushes, for targeted cancellation.
    pending_refs: Mutex<Vec<PushRef>>,
}

impl ChannelShared {
    pub(crate) fn new(topic: impl Into<String>, params: Value) -> Self {
        Self {
            topic: topic.into(),
            params: Mutex::new(params),
            state: Mutex::new(ChannelState::Closed),
            join_ref: Mutex::new(None),
            join_timeout: Mutex::new(Duration::from_secs(10)),
            parked_join: Mutex::new(None),
            rejoin: AtomicBool::new(false),
            bindings: Mutex::new(Vec::new()),
            next_binding_id: AtomicU64::new(1),
            pending_refs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn topic(&self) -> &str {
        &self.topic
    }

    pub(crate) fn state(&self) -> ChannelState {
        *self.state.lock()
    }

    pub(crate) fn params(&self) -> Value {
        self.params.lock().clone()
    }

    pub(crate) fn current_join_ref(&self) -> Option<JoinRef> {
        *self.join_ref.lock()
    }

    pub(crate) fn join_timeout(&self) -> Duration {
        *self.join_timeout.lock()
    }

    /// Whether a frame from this join epoch should be processed.
    ///
    /// Frames with no join_ref (broadcasts, heartbeat replies) always
    /// pass; frames from another epoch are stale and get dropped.
    pub(crate) fn accepts(&self, frame_join_ref: Option<JoinRef>) -> bool {
        match frame_join_ref {
            None => true,
            Some(join_ref) => self.current_join_ref() == Some(join_ref),
        }
    }

    pub(crate) fn take_parked_join(&self) -> Option<Frame> {
        self.parked_join.lock().take()
    }

    pub(crate) fn park_join(&self, frame: Frame) {
        *self.parked_join.lock() = Some(frame);
    }

    /// A session that was joined at some point and has since closed is
    /// spent; `Socket::channel` replaces it with a fresh one. A session
    /// that is merely not joined yet is not spent.
    pub(crate) fn is_spent(&self) -> bool {
        self.state() == ChannelState::Closed && self.current_join_ref().is_some()
    }

    pub(crate) fn needs_rejoin(&self) -> bool {
        self.state() == ChannelState::Errored && self.rejoin.load(Ordering::SeqCst)
    }

    /// Opens a fresh join epoch for an automatic rejoin.
    pub(crate) fn begin_rejoin(&self, join_ref: JoinRef) {
        *self.join_ref.lock() = Some(join_ref);
        *self.state.lock() = ChannelState::Joining;
    }

    pub(crate) fn register_pending(&self, push_ref: PushRef) {
        self.pending_refs.lock().push(push_ref);
    }

    pub(crate) fn unregister_pending(&self, push_ref: PushRef) {
        self.pending_refs.lock().retain(|r| *r != push_ref);
    }

    /// Resolves every in-flight push of this session to `Error(reason)`.
    pub(crate) fn cancel_pending(&self, correlator: &Correlator, reason: Value) {
        let refs: Vec<PushRef> = self.pending_refs.lock().clone();
        for push_ref in refs {
            correlator.resolve(push_ref, PushOutcome::Error(reason.clone()));
        }
    }

    /// Invokes listeners bound to `event`, in registration order.
    ///
    /// Callbacks are collected under the lock but invoked outside it, so
    /// a listener may register or remove bindings without deadlocking.
    pub(crate) fn fire(&self, event: &str, payload: &Value) {
        let callbacks: Vec<Arc<dyn Fn(&Value) + Send + Sync>> = self
            .bindings
            .lock()
            .iter()
            .filter(|binding| binding.event == event)
            .map(|binding| Arc::clone(&binding.callback))
            .collect();

        for callback in callbacks {
            callback(payload);
        }
    }

    /// Routes a server broadcast to listeners.
    pub(crate) fn handle_broadcast(&self, event: &str, payload: &Value) {
        trace!(topic = %self.topic, event, "broadcast");
        self.fire(event, payload);
    }

    /// Server closed the channel (`phx_close`).
    pub(crate) fn remote_close(&self, correlator: &Correlator, payload: &Value) {
        {
            let mut state = self.state.lock();
            if *state == ChannelState::Closed {
                return;
            }
            *state = ChannelState::Closed;
        }
        self.rejoin.store(false, Ordering::SeqCst);
        debug!(topic = %self.topic, "channel closed by server");

        self.cancel_pending(correlator, json!({ "reason": "channel closed" }));
        self.fire(event::PHX_CLOSE, payload);
    }

    /// Server errored the channel (`phx_error`).
    pub(crate) fn remote_error(&self, correlator: &Correlator, payload: &Value) {
        {
            let mut state = self.state.lock();
            if matches!(*state, ChannelState::Closed | ChannelState::Errored) {
                return;
            }
            *state = ChannelState::Errored;
        }
        debug!(topic = %self.topic, "channel errored by server");

        self.cancel_pending(correlator, json!({ "reason": "channel error" }));
        self.fire(event::PHX_ERROR, payload);
    }

    /// Transport lost under the session.
    ///
    /// Pending pushes are cancelled socket-wide by the caller; this only
    /// moves the state machine and notifies listeners, exactly once per
    /// transition into errored.
    pub(crate) fn transport_error(&self) {
        {
            let mut state = self.state.lock();
            if matches!(*state, ChannelState::Closed | ChannelState::Errored) {
                return;
            }
            *state = ChannelState::Errored;
        }
        self.fire(event::PHX_ERROR, &json!({ "reason": "disconnected" }));
    }

    /// Socket was closed deliberately; the session ends with it.
    pub(crate) fn local_close(&self) {
        {
            let mut state = self.state.lock();
            if *state == ChannelState::Closed {
                return;
            }
            *state = ChannelState::Closed;
        }
        self.rejoin.store(false, Ordering::SeqCst);
        self.fire(event::PHX_CLOSE, &json!({ "reason": "socket closed" }));
    }
}

// ============================================================================
// Join Outcome
// ============================================================================

/// Applies a join push's outcome to the session state machine.
///
/// Guarded on the join epoch: if the session has since re-joined (fresh
/// join_ref) or moved on, the stale outcome changes nothing.
pub(crate) fn apply_join_outcome(
    shared: &ChannelShared,
    join_ref: JoinRef,
    outcome: &PushOutcome,
) {
    let mut state = shared.state.lock();
    if shared.current_join_ref() != Some(join_ref) || *state != ChannelState::Joining {
        return;
    }

    match outcome {
        PushOutcome::Ok(_) => {
            *state = ChannelState::Joined;
            drop(state);
            shared.rejoin.store(true, Ordering::SeqCst);
            debug!(topic = %shared.topic, join_ref = %join_ref, "joined");
        }
        PushOutcome::Error(reason) => {
            *state = ChannelState::Errored;
            drop(state);
            debug!(topic = %shared.topic, %reason, "join rejected");
        }
        PushOutcome::Timeout => {
            *state = ChannelState::Errored;
            drop(state);
            debug!(topic = %shared.topic, "join timed out");
        }
    }
}

// ============================================================================
// Channel
// ============================================================================

/// Handle to one channel session.
///
/// Obtained from [`Socket::channel`](crate::Socket::channel). Clones share
/// the same session; two handles compare equal when they do.
///
/// # Example
///
/// ```ignore
/// let channel = socket.channel("room:42", json!({}));
/// channel.on("new_msg", |payload| println!("got {payload}"));
///
/// let join = channel.join(Duration::from_secs(10))?;
/// if join.outcome().await.is_ok() {
///     channel.push("ping", json!({}), Duration::from_secs(5))?;
/// }
/// ```
#[derive(Clone)]
pub struct Channel {
    shared: Arc<ChannelShared>,
    core: Arc<SocketCore>,
}

impl PartialEq for Channel {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("topic", &self.shared.topic)
            .field("state", &self.shared.state())
            .finish()
    }
}

impl Channel {
    pub(crate) fn new(shared: Arc<ChannelShared>, core: Arc<SocketCore>) -> Self {
        Self { shared, core }
    }

    /// Topic this session subscribes to.
    #[inline]
    #[must_use]
    pub fn topic(&self) -> &str {
        self.shared.topic()
    }

    /// Current lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ChannelState {
        self.shared.state()
    }

    /// Returns `true` while the session is joined.
    #[inline]
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.state() == ChannelState::Joined
    }

    /// Join epoch of the current or pending join, if any.
    #[inline]
    #[must_use]
    pub fn join_ref(&self) -> Option<JoinRef> {
        self.shared.current_join_ref()
    }
}

// ============================================================================
// Channel - Lifecycle
// ============================================================================

impl Channel {
    /// Subscribes the session to its topic.
    ///
    /// Valid from `closed` or `errored`. Sends a `phx_join` frame with a
    /// fresh join epoch and returns the join [`Push`], which resolves ok
    /// (state → joined), error (state → errored, server-supplied reason),
    /// or timeout (state → errored).
    ///
    /// If the socket is not open yet the join is parked and flushed when
    /// it opens; the timeout clock runs from this call either way.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if called while joining, joined, or leaving
    /// - [`Error::Disconnected`] if the socket was shut down
    pub fn join(&self, timeout: Duration) -> Result<Push> {
        self.core.ensure_active()?;

        {
            let state = self.shared.state();
            if !matches!(state, ChannelState::Closed | ChannelState::Errored) {
                return Err(Error::invalid_state(self.topic(), state));
            }
        }

        let join_ref = self.core.refs.next_join();
        let push_ref = self.core.refs.next_push();

        {
            *self.shared.join_ref.lock() = Some(join_ref);
            *self.shared.join_timeout.lock() = timeout;
            *self.shared.state.lock() = ChannelState::Joining;
            self.shared.rejoin.store(false, Ordering::SeqCst);
        }

        let hook = join_hook(Arc::clone(&self.shared), join_ref);
        let push = self
            .core
            .track_for_channel(&self.shared, push_ref, timeout, Some(hook));

        let frame = Frame::join(self.topic(), self.shared.params(), join_ref, push_ref);
        if self.core.send_frame(frame.clone()).is_err() {
            debug!(topic = %self.topic(), "socket not open; join parked");
            *self.shared.parked_join.lock() = Some(frame);
        }

        Ok(push)
    }

    /// Pushes an application event to the server.
    ///
    /// Valid only while joined; the push is tied to the current join
    /// epoch and resolves ok/error/timeout exactly once.
    ///
    /// # Errors
    ///
    /// - [`Error::NotJoined`] outside the joined state
    /// - [`Error::Disconnected`] if the socket was shut down
    pub fn push(&self, event: impl Into<String>, payload: Value, timeout: Duration) -> Result<Push> {
        self.core.ensure_active()?;

        let join_ref = {
            if self.shared.state() != ChannelState::Joined {
                return Err(Error::not_joined(self.topic()));
            }
            match self.shared.current_join_ref() {
                Some(join_ref) => join_ref,
                None => return Err(Error::not_joined(self.topic())),
            }
        };

        let push_ref = self.core.refs.next_push();
        let push = self
            .core
            .track_for_channel(&self.shared, push_ref, timeout, None);

        let frame = Frame::push(self.topic(), event, payload, join_ref, push_ref);
        if self.core.send_frame(frame).is_err() {
            // Transport dropped between the state check and the send; the
            // push still resolves, as an error.
            self.core.correlator.resolve(
                push_ref,
                PushOutcome::Error(json!({ "reason": "not connected" })),
            );
        }

        Ok(push)
    }

    /// Unsubscribes the session from its topic.
    ///
    /// Valid from joined or joining. Sends a `phx_leave` frame and
    /// transitions to leaving, then closed once the leave resolves (ok,
    /// error, or timeout). Pushes still pending at that point resolve to
    /// error.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] outside joined/joining
    /// - [`Error::Disconnected`] if the socket was shut down
    pub fn leave(&self, timeout: Duration) -> Result<Push> {
        self.core.ensure_active()?;

        let join_ref = {
            let state = self.shared.state();
            if !matches!(state, ChannelState::Joined | ChannelState::Joining) {
                return Err(Error::invalid_state(self.topic(), state));
            }
            match self.shared.current_join_ref() {
                Some(join_ref) => join_ref,
                None => return Err(Error::invalid_state(self.topic(), state)),
            }
        };

        {
            *self.shared.state.lock() = ChannelState::Leaving;
            self.shared.rejoin.store(false, Ordering::SeqCst);
            *self.shared.parked_join.lock() = None;
        }

        let push_ref = self.core.refs.next_push();
        let hook = leave_hook(Arc::clone(&self.shared), self.core.correlator.clone());
        let push = self
            .core
            .track_for_channel(&self.shared, push_ref, timeout, Some(hook));

        let frame = Frame::leave(self.topic(), join_ref, push_ref);
        if self.core.send_frame(frame).is_err() {
            // Can't reach the server; close out locally via the hook.
            self.core.correlator.resolve(
                push_ref,
                PushOutcome::Error(json!({ "reason": "not connected" })),
            );
        }

        Ok(push)
    }
}

// ============================================================================
// Channel - Listeners
// ============================================================================

impl Channel {
    /// Registers a listener for broadcasts of `event` on this topic.
    ///
    /// Multiple listeners per event are allowed and run in registration
    /// order, synchronously inside the frame-processing task; keep them
    /// short. The reserved `phx_error` / `phx_close` events can be
    /// observed too (disconnect and close notifications).
    pub fn on(
        &self,
        event: impl Into<String>,
        listener: impl Fn(&Value) + Send + Sync + 'static,
    ) -> BindingHandle {
        let id = self.shared.next_binding_id.fetch_add(1, Ordering::Relaxed);

        self.shared.bindings.lock().push(Binding {
            id,
            event: event.into(),
            callback: Arc::new(listener),
        });

        BindingHandle { id }
    }

    /// Removes the listener registered under `handle`.
    ///
    /// Unknown handles are ignored.
    pub fn off(&self, handle: BindingHandle) {
        self.shared
            .bindings
            .lock()
            .retain(|binding| binding.id != handle.id);
    }
}

// ============================================================================
// Hooks
// ============================================================================

/// Resolve hook driving the state machine for an explicit join.
fn join_hook(shared: Arc<ChannelShared>, join_ref: JoinRef) -> Box<dyn FnOnce(&PushOutcome) + Send> {
    Box::new(move |outcome| apply_join_outcome(&shared, join_ref, outcome))
}

/// Resolve hook closing the session once its leave resolves.
fn leave_hook(
    shared: Arc<ChannelShared>,
    correlator: Correlator,
) -> Box<dyn FnOnce(&PushOutcome) + Send> {
    Box::new(move |_outcome| {
        {
            let mut state = shared.state.lock();
            if *state != ChannelState::Leaving {
                return;
            }
            *state = ChannelState::Closed;
        }
        debug!(topic = %shared.topic, "left");

        shared.cancel_pending(&correlator, json!({ "reason": "channel left" }));
        shared.fire(event::PHX_CLOSE, &json!({ "reason": "leave" }));
    })
}

// ============================================================================
// Tests
// ============================================================================
