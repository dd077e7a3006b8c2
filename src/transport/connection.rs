//! WebSocket transport driver.
//!
//! One spawned task per socket runs the whole connection lifecycle:
//!
//! 1. Dial the endpoint (`connect_async`).
//! 2. On open, hand the multiplexer an outbound queue and run the io
//!    loop: a `select!` over inbound messages, outbound commands, and
//!    the heartbeat interval. Inbound frames are dispatched synchronously
//!    here, in wire arrival order: this task is the sequential frame
//!    processing context.
//! 3. On loss, cancel in-flight pushes, error the sessions, sleep out
//!    the backoff delay, and redial. A spent attempt budget permanently
//!    closes the socket.
//!
//! A deliberate shutdown (via [`OutboundCommand::Shutdown`] or the
//! shutdown flag) ends the task instead of redialing.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, trace, warn};

use crate::channel::push::PushOutcome;
use crate::error::Error;
use crate::identifiers::PushRef;
use crate::protocol::frame::Frame;
use crate::socket::SocketState;
use crate::socket::core::{OutboundCommand, SocketCore};

use super::backoff::Backoff;

// ============================================================================
// Types
// ============================================================================

/// Why an io loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    /// Deliberate shutdown from the API side.
    Shutdown,
    /// Server closed or the stream ended.
    Remote,
    /// WebSocket error while reading or writing.
    Error,
    /// The previous heartbeat was never answered.
    HeartbeatTimeout,
}

/// The client-side stream `connect_async` yields.
type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Driver
// ============================================================================

/// Runs the connection lifecycle until shutdown or a spent backoff budget.
pub(crate) async fn run(core: Arc<SocketCore>) {
    let mut backoff = Backoff::new(core.config.reconnect.clone());

    loop {
        if core.is_shutdown() {
            core.close_idle();
            break;
        }

        core.set_state(SocketState::Connecting);
        debug!(endpoint = %core.config.endpoint, "connecting");

        match connect_async(core.config.endpoint.as_str()).await {
            Ok((stream, _response)) => {
                // Shutdown may have been requested mid-dial.
                if core.is_shutdown() {
                    drop(stream);
                    core.close_idle();
                    break;
                }

                backoff.reset();
                info!(endpoint = %core.config.endpoint, "socket open");

                let (out_tx, out_rx) = mpsc::unbounded_channel();
                core.transport_opened(out_tx);

                let reason = io_loop(&core, stream, out_rx).await;
                if reason == CloseReason::Shutdown {
                    core.transport_closed(true);
                    break;
                }

                warn!(?reason, "transport lost");
                core.transport_closed(false);
            }
            Err(e) => {
                warn!(error = %e, "connect failed");
                core.set_state(SocketState::Errored);
                core.notify_error(&Error::WebSocket(e));
            }
        }

        match backoff.next_delay() {
            Some(delay) => {
                debug!(
                    attempt = backoff.attempt(),
                    delay_ms = delay.as_millis() as u64,
                    "reconnecting after backoff"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = core.shutdown_notified() => {
                        core.close_idle();
                        break;
                    }
                }
            }
            None => {
                core.fatal(backoff.attempt());
                break;
            }
        }
    }

    debug!("socket driver terminated");
}

// ============================================================================
// IO Loop
// ============================================================================

/// Runs one open transport until it ends, reporting why.
async fn io_loop(
    core: &Arc<SocketCore>,
    stream: WsStream,
    mut out_rx: mpsc::UnboundedReceiver<OutboundCommand>,
) -> CloseReason {
    let (mut ws_write, mut ws_read) = stream.split();

    let heartbeat_period = core.config.heartbeat_interval;
    let mut heartbeat = interval_at(Instant::now() + heartbeat_period, heartbeat_period);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pending_heartbeat: Option<PushRef> = None;

    loop {
        tokio::select! {
            // Inbound messages from the server
            message = ws_read.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => core.handle_inbound(&text),

                    Some(Ok(Message::Close(_))) => {
                        debug!("WebSocket closed by remote");
                        return CloseReason::Remote;
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "WebSocket error");
                        return CloseReason::Error;
                    }

                    None => {
                        debug!("WebSocket stream ended");
                        return CloseReason::Remote;
                    }

                    // Ignore Binary, Ping, Pong
                    _ => {}
                }
            }

            // Commands from the API side
            command = out_rx.recv() => {
                match command {
                    Some(OutboundCommand::Frame(frame)) => {
                        trace!(topic = %frame.topic, event = %frame.event, "frame sent");
                        if let Err(e) = ws_write.send(Message::Text(frame.encode().into())).await {
                            error!(error = %e, "send failed");
                            return CloseReason::Error;
                        }
                    }

                    Some(OutboundCommand::Shutdown) => {
                        debug!("shutdown command received");
                        let _ = ws_write.close().await;
                        return CloseReason::Shutdown;
                    }

                    None => {
                        debug!("command channel closed");
                        return CloseReason::Shutdown;
                    }
                }
            }

            // Liveness probe
            _ = heartbeat.tick() => {
                if let Some(push_ref) = pending_heartbeat.take()
                    && core.correlator.is_pending(push_ref)
                {
                    core.correlator.resolve(push_ref, PushOutcome::Timeout);
                    warn!("heartbeat unanswered; closing transport");
                    let _ = ws_write.close().await;
                    return CloseReason::HeartbeatTimeout;
                }

                let push_ref = core.refs.next_push();
                // Nobody awaits the heartbeat push; the tracked entry is
                // resolved by the reply or checked at the next tick. The
                // doubled timeout keeps the entry alive past that tick.
                drop(core.correlator.track(push_ref, heartbeat_period * 2));
                pending_heartbeat = Some(push_ref);

                trace!(push_ref = %push_ref, "heartbeat sent");
                if let Err(e) = ws_write.send(Message::Text(Frame::heartbeat(push_ref).encode().into())).await {
                    error!(error = %e, "heartbeat send failed");
                    return CloseReason::Error;
                }
            }
        }
    }
}
