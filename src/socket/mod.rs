//! Socket: one multiplexed connection and its channel sessions.
//!
//! A [`Socket`] owns one persistent WebSocket connection and every
//! [`Channel`] session sharing it. It is a cheap cloneable handle; all
//! clones drive the same connection.
//!
//! Several independent sockets may coexist (e.g. one anonymous, one
//! authenticated against a different endpoint); each is fully
//! self-contained.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use serde_json::json;
//! use realtime_channels::Socket;
//!
//! # async fn example() -> realtime_channels::Result<()> {
//! let socket = Socket::builder("ws://localhost:4000/socket/websocket")
//!     .token("opaque-credential")
//!     .build()?;
//! socket.connect()?;
//! socket.wait_open(Duration::from_secs(5)).await?;
//!
//! let room = socket.channel("room:42", json!({}));
//! room.on("new_msg", |payload| println!("new_msg: {payload}"));
//! room.join(Duration::from_secs(10))?.outcome().await;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Builder pattern for socket configuration.
pub mod builder;

/// Multiplexer internals shared with the transport driver.
pub(crate) mod core;

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::transport::connection;

use self::builder::SocketBuilder;
use self::core::SocketCore;

// ============================================================================
// SocketState
// ============================================================================

/// Lifecycle state of the underlying connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    /// Not started, deliberately closed, or permanently closed.
    Closed,
    /// Dialing the endpoint.
    Connecting,
    /// Transport up; frames flow.
    Open,
    /// Transport lost; the driver is between reconnect attempts.
    Errored,
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

// ============================================================================
// Socket
// ============================================================================

/// Handle to one multiplexed connection.
///
/// Create with [`Socket::builder`], start with [`Socket::connect`],
/// subscribe topics with [`Socket::channel`].
#[derive(Clone)]
pub struct Socket {
    core: Arc<SocketCore>,
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("endpoint", &self.core.config.endpoint.as_str())
            .field("state", &self.state())
            .finish()
    }
}

impl Socket {
    /// Starts a builder for `endpoint` (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn builder(endpoint: impl Into<String>) -> SocketBuilder {
        SocketBuilder::new(endpoint)
    }

    pub(crate) fn from_core(core: Arc<SocketCore>) -> Self {
        Self { core }
    }
}

// ============================================================================
// Socket - Connection Lifecycle
// ============================================================================

impl Socket {
    /// Begins connecting in the background.
    ///
    /// Spawns the transport driver, which dials, reconnects per the
    /// configured policy, and processes frames until shutdown. Calling
    /// `connect` again on a running socket is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Disconnected`] if the socket was already shut
    /// down; a permanently closed socket cannot be restarted, build a
    /// new one.
    pub fn connect(&self) -> Result<()> {
        self.core.ensure_active()?;

        if self.core.mark_driver_started() {
            tokio::spawn(connection::run(Arc::clone(&self.core)));
        }

        Ok(())
    }

    /// Shuts the socket down.
    ///
    /// Every session closes, every pending push resolves to error, and
    /// the driver exits without reconnecting.
    pub fn disconnect(&self) {
        self.core.begin_shutdown();
    }

    /// Current connection state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> SocketState {
        self.core.state()
    }

    /// Returns `true` while the transport is open.
    #[inline]
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state() == SocketState::Open
    }

    /// Waits until the socket reaches open.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if the socket is not open within `timeout`
    /// - [`Error::Disconnected`] if the socket shuts down while waiting
    pub async fn wait_open(&self, timeout: Duration) -> Result<()> {
        let mut state_rx = self.core.subscribe();

        let wait = async {
            loop {
                if *state_rx.borrow_and_update() == SocketState::Open {
                    return Ok(());
                }
                if state_rx.changed().await.is_err() {
                    return Err(Error::Disconnected);
                }
            }
        };

        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(Error::timeout("socket open", timeout.as_millis() as u64)),
        }
    }

    /// Endpoint this socket dials, with `vsn` and params encoded.
    #[inline]
    #[must_use]
    pub fn endpoint(&self) -> &str {
        self.core.config.endpoint.as_str()
    }

    /// Number of pushes currently awaiting a reply or timeout.
    #[inline]
    #[must_use]
    pub fn pending_pushes(&self) -> usize {
        self.core.correlator.pending_count()
    }
}

// ============================================================================
// Socket - Channels
// ============================================================================

impl Socket {
    /// Returns the channel session for `topic`, creating it if needed.
    ///
    /// Idempotent per topic: while a session exists and has not closed,
    /// the same session is returned and `params` is ignored. A session
    /// that was joined and has since closed is replaced by a fresh one.
    #[must_use]
    pub fn channel(&self, topic: impl Into<String>, params: Value) -> Channel {
        let topic = topic.into();
        let shared = self.core.session(&topic, params);
        Channel::new(shared, Arc::clone(&self.core))
    }
}

// ============================================================================
// Socket - Observers
// ============================================================================

impl Socket {
    /// Registers a callback invoked every time the transport opens,
    /// including after reconnects.
    pub fn on_open(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.core.register_on_open(Arc::new(callback));
    }

    /// Registers a callback invoked when the socket closes for good
    /// (deliberate disconnect or spent reconnect budget).
    pub fn on_close(&self, callback: impl Fn() + Send + Sync + 'static) {
        self.core.register_on_close(Arc::new(callback));
    }

    /// Registers a callback for socket-level errors: connect failures,
    /// transport loss, rejected rejoins, reconnect exhaustion.
    pub fn on_error(&self, callback: impl Fn(&Error) + Send + Sync + 'static) {
        self.core.register_on_error(Arc::new(callback));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn test_socket() -> Socket {
        Socket::builder("ws://localhost:4000/socket")
            .build()
            .expect("build socket")
    }

    #[test]
    fn test_new_socket_starts_closed() {
        let socket = test_socket();
        assert_eq!(socket.state(), SocketState::Closed);
        assert!(!socket.is_open());
        assert_eq!(socket.pending_pushes(), 0);
    }

    #[test]
    fn test_channel_is_idempotent_per_topic() {
        let socket = test_socket();

        let first = socket.channel("room:42", json!({}));
        let second = socket.channel("room:42", json!({"ignored": true}));
        let other = socket.channel("room:43", json!({}));

        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_connect_after_disconnect_fails() {
        let socket = test_socket();
        socket.disconnect();

        let err = socket.connect().unwrap_err();
        assert!(matches!(err, Error::Disconnected));
        assert_eq!(socket.state(), SocketState::Closed);
    }

    #[tokio::test]
    async fn test_join_after_disconnect_fails() {
        let socket = test_socket();
        let channel = socket.channel("room:42", json!({}));
        socket.disconnect();

        let err = channel.join(Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, Error::Disconnected));
    }

    #[tokio::test]
    async fn test_wait_open_times_out_when_never_started() {
        let socket = test_socket();

        let err = socket.wait_open(Duration::from_millis(20)).await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SocketState::Open.to_string(), "open");
        assert_eq!(SocketState::Connecting.to_string(), "connecting");
    }
}
