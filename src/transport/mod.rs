//! WebSocket transport layer.
//!
//! This module owns the physical connection: dialing, the io loop that
//! is the socket's sequential frame-processing context, reply
//! correlation, and the reconnect schedule.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                             ┌─────────────────┐
//! │  Socket (API)    │  frames / shutdown (mpsc)   │  driver task    │
//! │                  │────────────────────────────►│  connect loop   │
//! │  Correlator      │◄────────────────────────────│  io select!     │
//! │  ref → push      │   replies / timeouts        │  heartbeat      │
//! └──────────────────┘                             └─────────────────┘
//!                                                          │ WebSocket
//!                                                          ▼
//!                                                      server
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `backoff` | reconnect policy and jittered schedule |
//! | `connection` | driver task: dialing, io loop, heartbeat |
//! | `correlator` | ref → pending push table with timeouts |

// ============================================================================
// Submodules
// ============================================================================

/// Reconnect policy and backoff schedule.
pub mod backoff;

/// Transport driver task (internal).
pub(crate) mod connection;

/// Reply correlation table.
pub mod correlator;

// ============================================================================
// Re-exports
// ============================================================================

pub use backoff::{Backoff, ReconnectPolicy};
pub use correlator::Correlator;
