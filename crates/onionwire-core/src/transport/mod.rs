//! Framed transport over TCP or Tor.
//!
//! Dialing a `.onion` host goes through Tor's SOCKS5 port; anything else is
//! dialed directly. Either way the result is a [`Connection`] that exchanges
//! frames, sends heartbeats and closes itself when the peer goes quiet.
//!
//! ## Design
//!
//! There is no reconnect logic here. A closed connection stays closed and
//! the caller decides whether to dial again.

mod connection;
mod listener;
mod socks5;

pub use connection::{
    CloseReason, Connection, ConnectionEvent, ConnectionEvents, ConnectionState, WriteOutcome,
};
pub use listener::{Listener, ListenerHandle};
pub use socks5::{connect_request, reply_message, socks5_connect};

use crate::error::{Error, Result};
use crate::logging::RedactedOnion;
use crate::protocol::FrameLimits;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Default SOCKS5 proxy port for Tor.
pub const DEFAULT_SOCKS_PORT: u16 = 9050;

/// Configuration for dialing, accepting and running connections.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Host of the SOCKS5 proxy used for `.onion` targets.
    pub socks_host: String,
    /// Port of the SOCKS5 proxy.
    pub socks_port: u16,
    /// How often to check idleness and send a heartbeat.
    pub heartbeat_interval: Duration,
    /// Close when nothing has been received for this long.
    pub idle_timeout: Duration,
    /// Bound on proxy dial plus SOCKS5 negotiation.
    pub handshake_timeout: Duration,
    /// Bound on a direct TCP dial.
    pub connect_timeout: Duration,
    /// Unflushed bytes above which `send` reports backpressure.
    pub write_high_water_mark: usize,
    /// Decoder limits.
    pub limits: FrameLimits,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            socks_host: "127.0.0.1".to_string(),
            socks_port: DEFAULT_SOCKS_PORT,
            heartbeat_interval: Duration::from_secs(15),
            idle_timeout: Duration::from_secs(60),
            handshake_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(30),
            write_high_water_mark: 16 * 1024,
            limits: FrameLimits::default(),
        }
    }
}

impl TransportConfig {
    /// Check values that would stall or break a connection task.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(Error::InvalidConfig("heartbeat_interval must be non-zero".into()));
        }
        if self.idle_timeout.is_zero() {
            return Err(Error::InvalidConfig("idle_timeout must be non-zero".into()));
        }
        Ok(())
    }
}

/// Whether `host` must be reached through Tor.
pub fn is_onion_host(host: &str) -> bool {
    host.len() > ".onion".len() && host.to_ascii_lowercase().ends_with(".onion")
}

/// Dials and accepts framed connections.
#[derive(Debug, Clone, Default)]
pub struct Transport {
    config: TransportConfig,
}

impl Transport {
    /// Create a transport with the given configuration.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Dial `address:port` and return an open connection.
    ///
    /// `.onion` addresses go through the configured SOCKS5 proxy and the
    /// connection opens only after the proxy confirms the tunnel.
    pub async fn connect(&self, address: &str, port: u16) -> Result<(Connection, ConnectionEvents)> {
        self.config.validate()?;
        let peer = format!("{}:{}", address, port);

        let stream = if is_onion_host(address) {
            debug!(
                target_host = %RedactedOnion(address),
                port,
                proxy = %format!("{}:{}", self.config.socks_host, self.config.socks_port),
                "Dialing onion service through SOCKS5"
            );
            tokio::time::timeout(self.config.handshake_timeout, self.dial_via_socks(address, port))
                .await
                .map_err(|_| Error::Timeout("SOCKS5 handshake".into()))??
        } else {
            debug!(%peer, "Dialing directly");
            tokio::time::timeout(self.config.connect_timeout, TcpStream::connect((address, port)))
                .await
                .map_err(|_| Error::Timeout(format!("connecting to {}", peer)))??
        };

        info!(port, onion = is_onion_host(address), "Dial complete");
        Ok(Connection::open(stream, peer, &self.config))
    }

    async fn dial_via_socks(&self, address: &str, port: u16) -> Result<TcpStream> {
        let mut stream = TcpStream::connect((self.config.socks_host.as_str(), self.config.socks_port))
            .await
            .map_err(|e| Error::Socks(format!("failed to connect to SOCKS proxy: {}", e)))?;
        socks5_connect(&mut stream, address, port).await?;
        Ok(stream)
    }

    /// Bind a listener without starting its accept loop.
    pub async fn bind(&self, host: &str, port: u16) -> Result<Listener> {
        Listener::bind(host, port, self.config.clone()).await
    }

    /// Bind `host:port` and hand every accepted connection to `on_accept`.
    pub async fn listen<F>(&self, port: u16, host: &str, on_accept: F) -> Result<ListenerHandle>
    where
        F: FnMut(Connection, ConnectionEvents) + Send + 'static,
    {
        Ok(self.bind(host, port).await?.serve(on_accept))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TransportConfig::default();
        assert_eq!(config.socks_port, DEFAULT_SOCKS_PORT);
        assert!(config.idle_timeout > config.heartbeat_interval);
    }

    #[test]
    fn test_is_onion_host() {
        assert!(is_onion_host("x.onion"));
        assert!(is_onion_host("ABC.ONION"));
        assert!(!is_onion_host(".onion"));
        assert!(!is_onion_host("example.com"));
        assert!(!is_onion_host("127.0.0.1"));
    }

    #[test]
    fn test_config_validate() {
        assert!(TransportConfig::default().validate().is_ok());

        let zero_heartbeat = TransportConfig {
            heartbeat_interval: Duration::ZERO,
            ..TransportConfig::default()
        };
        assert!(matches!(zero_heartbeat.validate(), Err(Error::InvalidConfig(_))));

        let zero_idle = TransportConfig {
            idle_timeout: Duration::ZERO,
            ..TransportConfig::default()
        };
        assert!(matches!(zero_idle.validate(), Err(Error::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_zero_heartbeat_rejected_before_dial() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();

        let transport = Transport::new(TransportConfig {
            heartbeat_interval: Duration::ZERO,
            ..TransportConfig::default()
        });
        assert!(matches!(
            transport.connect("127.0.0.1", port).await,
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            transport.bind("127.0.0.1", 0).await,
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_direct_dial_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let transport = Transport::default();
        assert!(transport.connect("127.0.0.1", port).await.is_err());
    }
}
