//! Multiplexed real-time pub/sub channels over a single WebSocket
//! connection.
//!
//! This library is a client for Phoenix-style channel servers: many
//! topic-scoped [`Channel`] sessions share one persistent [`Socket`],
//! every push is correlated to exactly one ok/error/timeout outcome, and
//! the connection heals itself: reconnect with jittered backoff, then
//! automatic rejoin of everything that was joined.
//!
//! # Architecture
//!
//! - Each [`Socket`] owns: one WebSocket connection + one driver task +
//!   the sessions multiplexed over it
//! - Frames are the compact array envelope
//!   `[join_ref, ref, topic, event, payload]`
//! - Inbound frames are processed in arrival order on one task; replies
//!   resolve their [`Push`] through the ref they were sent with
//! - Stale frames from before a reconnect are discarded by join epoch
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use serde_json::json;
//! use realtime_channels::{Result, Socket};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // One socket per endpoint; params carry the opaque credential.
//!     let socket = Socket::builder("ws://localhost:4000/socket/websocket")
//!         .token("opaque-credential")
//!         .build()?;
//!     socket.connect()?;
//!     socket.wait_open(Duration::from_secs(5)).await?;
//!
//!     // Join a topic and listen for broadcasts.
//!     let room = socket.channel("room:42", json!({}));
//!     room.on("new_msg", |payload| println!("new_msg: {payload}"));
//!
//!     let join = room.join(Duration::from_secs(10))?;
//!     if join.outcome().await.is_ok() {
//!         let push = room.push("ping", json!({}), Duration::from_secs(5))?;
//!         println!("ping -> {:?}", push.outcome().await);
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`socket`] | [`Socket`] handle, builder, connection state |
//! | [`channel`] | [`Channel`] sessions, [`Push`] outcomes, listeners |
//! | [`protocol`] | [`Frame`] envelope, codec, reserved events |
//! | [`transport`] | driver task, reply correlator, reconnect policy |
//! | [`identifiers`] | type-safe ref wrappers |
//! | [`error`] | error types and [`Result`] alias |
//!
//! # Guarantees
//!
//! - A [`Push`] resolves exactly once (ok, error, or timeout) and a
//!   late reply for an already-resolved ref is ignored
//! - Per session, replies and broadcasts are delivered in wire order
//! - Transport loss errors every session and resolves every pending
//!   push; previously-joined topics rejoin with fresh join epochs

// ============================================================================
// Modules
// ============================================================================

/// Channel sessions, pushes, and event listeners.
pub mod channel;

/// Error types and result aliases.
pub mod error;

/// Type-safe ref wrappers for reply correlation.
pub mod identifiers;

/// Wire protocol: frame envelope, codec, reserved events.
pub mod protocol;

/// Socket handle and builder.
pub mod socket;

/// Transport layer: driver, correlator, backoff (mostly internal).
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Socket types
pub use socket::{Socket, SocketState};
pub use socket::builder::SocketBuilder;

// Channel types
pub use channel::push::{Push, PushOutcome};
pub use channel::{BindingHandle, Channel, ChannelState};

// Protocol types
pub use protocol::{ChannelEvent, Frame, Reply, ReplyStatus};

// Transport types
pub use transport::backoff::ReconnectPolicy;

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{JoinRef, PushRef};
