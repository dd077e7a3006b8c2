//! Connection multiplexer internals.
//!
//! [`SocketCore`] owns everything the public [`Socket`](super::Socket)
//! handle and the transport driver share: the sessions-by-topic map, the
//! reply correlator, the ref counter, the outbound queue, the socket
//! state, and the lifecycle observers.
//!
//! Inbound frames are routed here by the transport task; all dispatch
//! runs synchronously inside that single task, in wire arrival order.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc, watch};
use tracing::{debug, trace, warn};
use url::Url;

use crate::channel::push::{Push, PushOutcome};
use crate::channel::{ChannelShared, ChannelState, apply_join_outcome};
use crate::error::Error;
use crate::identifiers::{PushRef, RefCounter};
use crate::protocol::event::ChannelEvent;
use crate::protocol::frame::Frame;
use crate::transport::backoff::ReconnectPolicy;
use crate::transport::correlator::{Correlator, ResolveHook};

use super::SocketState;

// ============================================================================
// Types
// ============================================================================

/// Socket lifecycle observer.
pub(crate) type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

/// Socket error observer.
pub(crate) type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Commands from the API side to the transport task.
pub(crate) enum OutboundCommand {
    /// Serialize and send a frame.
    Frame(Frame),
    /// Close the WebSocket and end the driver.
    Shutdown,
}

// ============================================================================
// SocketConfig
// ============================================================================

/// Immutable per-socket configuration assembled by the builder.
pub(crate) struct SocketConfig {
    /// Endpoint with `vsn` and connect params already encoded.
    pub(crate) endpoint: Url,

    /// Heartbeat probe period.
    pub(crate) heartbeat_interval: Duration,

    /// Reconnect backoff policy.
    pub(crate) reconnect: ReconnectPolicy,
}

// ============================================================================
// SocketCore
// ============================================================================

/// Shared state behind one socket and all its channel sessions.
pub(crate) struct SocketCore {
    pub(crate) config: SocketConfig,
    pub(crate) refs: RefCounter,
    pub(crate) correlator: Correlator,

    /// Sessions by topic; one live session per topic at a time.
    channels: Mutex<FxHashMap<String, Arc<ChannelShared>>>,

    /// Sender into the current transport task; `None` while not open.
    outbound: Mutex<Option<mpsc::UnboundedSender<OutboundCommand>>>,

    state_tx: watch::Sender<SocketState>,

    shutdown: AtomicBool,
    shutdown_notify: Notify,
    driver_started: AtomicBool,

    on_open: Mutex<Vec<LifecycleCallback>>,
    on_close: Mutex<Vec<LifecycleCallback>>,
    on_error: Mutex<Vec<ErrorCallback>>,
}

impl SocketCore {
    pub(crate) fn new(config: SocketConfig) -> Arc<Self> {
        let (state_tx, _state_rx) = watch::channel(SocketState::Closed);

        Arc::new(Self {
            config,
            refs: RefCounter::new(),
            correlator: Correlator::new(),
            channels: Mutex::new(FxHashMap::default()),
            outbound: Mutex::new(None),
            state_tx,
            shutdown: AtomicBool::new(false),
            shutdown_notify: Notify::new(),
            driver_started: AtomicBool::new(false),
            on_open: Mutex::new(Vec::new()),
            on_close: Mutex::new(Vec::new()),
            on_error: Mutex::new(Vec::new()),
        })
    }
}

// ============================================================================
// SocketCore - State
// ============================================================================

impl SocketCore {
    pub(crate) fn state(&self) -> SocketState {
        *self.state_tx.borrow()
    }

    pub(crate) fn set_state(&self, state: SocketState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            debug!(from = %previous, to = %state, "socket state");
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SocketState> {
        self.state_tx.subscribe()
    }

    pub(crate) fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    pub(crate) async fn shutdown_notified(&self) {
        self.shutdown_notify.notified().await;
    }

    /// Marks the driver task as spawned; returns `true` the first time.
    pub(crate) fn mark_driver_started(&self) -> bool {
        !self.driver_started.swap(true, Ordering::SeqCst)
    }

    /// Fails fast once the socket has been shut down for good.
    pub(crate) fn ensure_active(&self) -> crate::error::Result<()> {
        if self.is_shutdown() {
            return Err(Error::Disconnected);
        }
        Ok(())
    }
}

// ============================================================================
// SocketCore - Sending
// ============================================================================

impl SocketCore {
    /// Queues a frame to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] unless the socket is open.
    pub(crate) fn send_frame(&self, frame: Frame) -> crate::error::Result<()> {
        if self.state() != SocketState::Open {
            return Err(Error::NotConnected);
        }

        let guard = self.outbound.lock();
        match guard.as_ref() {
            Some(tx) => tx
                .send(OutboundCommand::Frame(frame))
                .map_err(|_| Error::NotConnected),
            None => Err(Error::NotConnected),
        }
    }

    /// Tracks a push for a session, so the session can cancel it and the
    /// ref is unregistered whenever and however it resolves.
    pub(crate) fn track_for_channel(
        &self,
        shared: &Arc<ChannelShared>,
        push_ref: PushRef,
        timeout: Duration,
        inner: Option<ResolveHook>,
    ) -> Push {
        shared.register_pending(push_ref);

        let session = Arc::clone(shared);
        let hook: ResolveHook = Box::new(move |outcome| {
            session.unregister_pending(push_ref);
            if let Some(inner) = inner {
                inner(outcome);
            }
        });

        self.correlator.track_with_hook(push_ref, timeout, Some(hook))
    }
}

// ============================================================================
// SocketCore - Sessions
// ============================================================================

impl SocketCore {
    /// Returns the live session for `topic`, creating one if absent or if
    /// the previous session is spent (joined once, now closed).
    pub(crate) fn session(&self, topic: &str, params: Value) -> Arc<ChannelShared> {
        let mut channels = self.channels.lock();

        if let Some(existing) = channels.get(topic)
            && !existing.is_spent()
        {
            return Arc::clone(existing);
        }

        let shared = Arc::new(ChannelShared::new(topic, params));
        channels.insert(topic.to_string(), Arc::clone(&shared));
        shared
    }

    fn sessions(&self) -> Vec<Arc<ChannelShared>> {
        self.channels.lock().values().cloned().collect()
    }
}

// ============================================================================
// SocketCore - Transport Lifecycle
// ============================================================================

impl SocketCore {
    /// Transport reached open: install the outbound queue, notify
    /// observers, flush parked joins, rejoin previously-joined sessions.
    pub(crate) fn transport_opened(self: &Arc<Self>, tx: mpsc::UnboundedSender<OutboundCommand>) {
        *self.outbound.lock() = Some(tx);
        self.set_state(SocketState::Open);
        self.notify_open();

        for shared in self.sessions() {
            if let Some(frame) = shared.take_parked_join() {
                // A parked join whose push already timed out is stale;
                // the session is errored and the caller retries.
                if shared.state() != ChannelState::Joining {
                    continue;
                }
                trace!(topic = %shared.topic(), "flushing parked join");
                if self.send_frame(frame.clone()).is_err() {
                    shared.park_join(frame);
                }
                continue;
            }

            if shared.needs_rejoin() {
                self.rejoin_session(shared);
            }
        }
    }

    /// Transport ended. `graceful` distinguishes a deliberate disconnect
    /// from a loss that the driver will retry.
    pub(crate) fn transport_closed(&self, graceful: bool) {
        *self.outbound.lock() = None;
        let sessions = self.sessions();

        if graceful {
            self.set_state(SocketState::Closed);
            for shared in &sessions {
                shared.local_close();
            }
            self.correlator.cancel_all(json!({ "reason": "socket closed" }));
            self.notify_close();
        } else {
            self.set_state(SocketState::Errored);
            for shared in &sessions {
                shared.transport_error();
            }
            self.correlator.cancel_all(json!({ "reason": "disconnected" }));
            self.notify_error(&Error::Disconnected);
        }
    }

    /// Reconnect budget spent: the socket is permanently closed.
    pub(crate) fn fatal(&self, attempts: u32) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.shutdown_notify.notify_waiters();
        self.set_state(SocketState::Closed);

        for shared in self.sessions() {
            shared.transport_error();
        }

        let err = Error::ReconnectExhausted { attempts };
        warn!(%err, "socket permanently closed");
        self.notify_error(&err);
        self.notify_close();
    }

    /// Cleanup for a shutdown that caught the driver between transports
    /// (never connected, or sleeping out a backoff delay).
    pub(crate) fn close_idle(&self) {
        if self.state() == SocketState::Closed {
            return;
        }

        *self.outbound.lock() = None;
        self.set_state(SocketState::Closed);
        for shared in self.sessions() {
            shared.local_close();
        }
        self.correlator.cancel_all(json!({ "reason": "socket closed" }));
        self.notify_close();
    }

    /// Requests shutdown from the API side.
    pub(crate) fn begin_shutdown(&self) {
        if self.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("socket shutdown requested");
        self.shutdown_notify.notify_waiters();

        let outbound = self.outbound.lock().clone();
        match outbound {
            Some(tx) => {
                // The driver owns teardown from here.
                let _ = tx.send(OutboundCommand::Shutdown);
            }
            None => {
                if !self.driver_started.load(Ordering::SeqCst) {
                    self.close_idle();
                }
                // Otherwise the driver notices the flag and cleans up.
            }
        }
    }

    /// Issues a fresh join for a session that was joined before the
    /// transport dropped.
    fn rejoin_session(self: &Arc<Self>, shared: Arc<ChannelShared>) {
        let join_ref = self.refs.next_join();
        let push_ref = self.refs.next_push();
        let timeout = shared.join_timeout();

        shared.begin_rejoin(join_ref);
        debug!(topic = %shared.topic(), join_ref = %join_ref, "rejoining");

        let core = Arc::clone(self);
        let session = Arc::clone(&shared);
        let hook: ResolveHook = Box::new(move |outcome| {
            apply_join_outcome(&session, join_ref, outcome);
            if let PushOutcome::Error(reason) = outcome {
                core.notify_error(&Error::join_rejected(session.topic(), reason.clone()));
            }
        });

        // Nobody awaits an automatic rejoin; the hook drives the session.
        drop(self.track_for_channel(&shared, push_ref, timeout, Some(hook)));

        let frame = Frame::join(shared.topic(), shared.params(), join_ref, push_ref);
        if self.send_frame(frame).is_err() {
            self.correlator.resolve(
                push_ref,
                PushOutcome::Error(json!({ "reason": "not connected" })),
            );
        }
    }
}

// ============================================================================
// SocketCore - Inbound Dispatch
// ============================================================================

impl SocketCore {
    /// Decodes and routes one inbound message.
    ///
    /// A malformed frame is logged and dropped; the connection stays up.
    pub(crate) fn handle_inbound(&self, text: &str) {
        match Frame::decode(text) {
            Ok(frame) => self.dispatch(frame),
            Err(e) => warn!(error = %e, "dropping malformed frame"),
        }
    }

    fn dispatch(&self, frame: Frame) {
        trace!(topic = %frame.topic, event = %frame.event, "frame received");

        let session = self.channels.lock().get(&frame.topic).cloned();

        // Frames from an old join epoch are cross-talk; drop them before
        // they can resolve anything.
        if let Some(shared) = &session
            && !shared.accepts(frame.join_ref)
        {
            trace!(topic = %frame.topic, "dropping stale frame");
            return;
        }

        if frame.is_reply() {
            self.dispatch_reply(&frame);
            return;
        }

        match frame.event_kind() {
            ChannelEvent::Close => {
                if let Some(shared) = session {
                    shared.remote_close(&self.correlator, &frame.payload);
                }
            }
            ChannelEvent::Error => {
                if let Some(shared) = session {
                    shared.remote_error(&self.correlator, &frame.payload);
                }
            }
            _ => match session {
                Some(shared) => shared.handle_broadcast(&frame.event, &frame.payload),
                None => trace!(topic = %frame.topic, "no session for topic"),
            },
        }
    }

    fn dispatch_reply(&self, frame: &Frame) {
        let Some(push_ref) = frame.push_ref else {
            warn!(topic = %frame.topic, "dropping reply without ref");
            return;
        };

        let reply = match frame.reply_payload() {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "dropping malformed reply");
                return;
            }
        };

        let outcome = if reply.is_ok() {
            PushOutcome::Ok(reply.response)
        } else {
            PushOutcome::Error(reply.response)
        };

        if !self.correlator.resolve(push_ref, outcome) {
            debug!(push_ref = %push_ref, "late reply ignored");
        }
    }
}

// ============================================================================
// SocketCore - Observers
// ============================================================================

impl SocketCore {
    pub(crate) fn register_on_open(&self, callback: LifecycleCallback) {
        self.on_open.lock().push(callback);
    }

    pub(crate) fn register_on_close(&self, callback: LifecycleCallback) {
        self.on_close.lock().push(callback);
    }

    pub(crate) fn register_on_error(&self, callback: ErrorCallback) {
        self.on_error.lock().push(callback);
    }

    fn notify_open(&self) {
        let callbacks: Vec<LifecycleCallback> = self.on_open.lock().clone();
        for callback in callbacks {
            callback();
        }
    }

    fn notify_close(&self) {
        let callbacks: Vec<LifecycleCallback> = self.on_close.lock().clone();
        for callback in callbacks {
            callback();
        }
    }

    pub(crate) fn notify_error(&self, err: &Error) {
        let callbacks: Vec<ErrorCallback> = self.on_error.lock().clone();
        for callback in callbacks {
            callback(err);
        }
    }
}
