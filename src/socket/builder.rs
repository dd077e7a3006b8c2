//! Builder pattern for socket configuration.
//!
//! Provides a fluent API for configuring and creating [`Socket`] values.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use realtime_channels::{ReconnectPolicy, Socket};
//!
//! # fn example() -> realtime_channels::Result<()> {
//! let socket = Socket::builder("ws://localhost:4000/socket/websocket")
//!     .token("opaque-credential")
//!     .param("user_id", "42")
//!     .heartbeat_interval(Duration::from_secs(30))
//!     .reconnect(ReconnectPolicy::default().with_max_attempts(10))
//!     .build()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::transport::backoff::ReconnectPolicy;

use super::Socket;
use super::core::{SocketConfig, SocketCore};

// ============================================================================
// Constants
// ============================================================================

/// Wire protocol version advertised in the connect query string.
pub(crate) const PROTOCOL_VSN: &str = "2.0.0";

/// Default heartbeat probe period.
const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

// ============================================================================
// SocketBuilder
// ============================================================================

/// Builder for configuring a [`Socket`].
///
/// Use [`Socket::builder()`] to create a new builder. Connect params,
/// including the opaque auth credential, become query pairs on the
/// endpoint URL; this crate never inspects them.
#[derive(Debug, Clone)]
pub struct SocketBuilder {
    /// Endpoint URL (`ws://` or `wss://`).
    endpoint: String,
    /// Connect params appended to the query string.
    params: Vec<(String, String)>,
    /// Heartbeat probe period.
    heartbeat_interval: Duration,
    /// Reconnect backoff policy.
    reconnect: ReconnectPolicy,
}

// ============================================================================
// SocketBuilder Implementation
// ============================================================================

impl SocketBuilder {
    /// Creates a builder for `endpoint`.
    #[inline]
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// Adds one connect param.
    ///
    /// Params are sent as query pairs of the connect URL, in insertion
    /// order, after `vsn`.
    #[inline]
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Sets the opaque auth credential, sent as the `token` param.
    ///
    /// The credential comes from an external provider and is never
    /// inspected or validated here; that is the server's concern.
    #[inline]
    #[must_use]
    pub fn token(self, token: impl Into<String>) -> Self {
        self.param("token", token)
    }

    /// Sets the heartbeat probe period (default 30s).
    #[inline]
    #[must_use]
    pub fn heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    /// Sets the reconnect backoff policy.
    #[inline]
    #[must_use]
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Builds the socket with validation.
    ///
    /// The socket is not connected yet; call
    /// [`Socket::connect`](super::Socket::connect) to start it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if the endpoint does not parse or is
    /// not a `ws://` / `wss://` URL.
    pub fn build(self) -> Result<Socket> {
        let mut endpoint = Url::parse(&self.endpoint)?;

        match endpoint.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::invalid_url(format!(
                    "expected ws:// or wss:// scheme, got {other}://"
                )));
            }
        }

        {
            let mut pairs = endpoint.query_pairs_mut();
            pairs.append_pair("vsn", PROTOCOL_VSN);
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }

        let core = SocketCore::new(SocketConfig {
            endpoint,
            heartbeat_interval: self.heartbeat_interval,
            reconnect: self.reconnect,
        });

        Ok(Socket::from_core(core))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_appends_vsn_and_params() {
        let socket = SocketBuilder::new("ws://localhost:4000/socket/websocket")
            .token("secret")
            .param("user_id", "42")
            .build()
            .expect("build");

        let endpoint = socket.endpoint().to_string();
        assert!(endpoint.starts_with("ws://localhost:4000/socket/websocket?"));
        assert!(endpoint.contains("vsn=2.0.0"));
        assert!(endpoint.contains("token=secret"));
        assert!(endpoint.contains("user_id=42"));
    }

    #[test]
    fn test_params_are_percent_encoded() {
        let socket = SocketBuilder::new("ws://localhost:4000/socket")
            .param("name", "a b&c")
            .build()
            .expect("build");

        assert!(socket.endpoint().to_string().contains("name=a+b%26c"));
    }

    #[test]
    fn test_build_rejects_http_scheme() {
        let result = SocketBuilder::new("http://localhost:4000/socket").build();
        let err = result.unwrap_err();

        assert!(matches!(err, Error::InvalidUrl { .. }));
        assert!(err.to_string().contains("http"));
    }

    #[test]
    fn test_build_rejects_garbage() {
        let result = SocketBuilder::new("not a url").build();
        assert!(matches!(result.unwrap_err(), Error::InvalidUrl { .. }));
    }

    #[test]
    fn test_wss_is_accepted() {
        assert!(SocketBuilder::new("wss://example.com/socket").build().is_ok());
    }

    #[test]
    fn test_builder_is_clone() {
        let builder = SocketBuilder::new("ws://localhost/socket").param("a", "1");
        let cloned = builder.clone();
        assert_eq!(builder.params, cloned.params);
    }
}
