//! Error types for onionwire.
//!
//! Every failure is local to one connection or one control-port session.
//! Variants follow the failure classes callers need to branch on: protocol
//! violations, timeouts, resource limits, search exhaustion and environment
//! problems reported by Tor.

use thiserror::Error;

/// Core error type for onionwire operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Peer sent something the wire protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A buffering or framing limit was exceeded.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// SOCKS5 negotiation with the proxy failed.
    #[error("socks5 error: {0}")]
    Socks(String),

    /// Operation timed out.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// The connection is not in the `Open` state.
    #[error("connection is not open")]
    NotOpen,

    /// Vanity search ran out of attempts without a match.
    #[error("no address matching prefix after {attempts} attempts")]
    VanityExhausted {
        /// Number of keypairs tried.
        attempts: u32,
    },

    /// Tor control port rejected a request or replied unexpectedly.
    #[error("control port error: {0}")]
    Control(String),

    /// Key validation or parsing failed.
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Encoding/decoding error.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Underlying socket or file error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using onionwire's Error.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Whether this error is a violation by the remote side (bad frames,
    /// limits, malformed SOCKS5 replies) rather than a local or timing issue.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::Protocol(_) | Error::LimitExceeded(_) | Error::Socks(_)
        )
    }

    /// Whether this error came from a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Encoding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(Error::Protocol("x".into()).is_protocol_violation());
        assert!(Error::LimitExceeded("x".into()).is_protocol_violation());
        assert!(Error::Socks("x".into()).is_protocol_violation());
        assert!(!Error::Timeout("x".into()).is_protocol_violation());
        assert!(Error::Timeout("x".into()).is_timeout());
        assert!(!Error::NotOpen.is_timeout());
    }

    #[test]
    fn test_invalid_config_is_local() {
        let e = Error::InvalidConfig("heartbeat_interval must be non-zero".into());
        assert!(!e.is_protocol_violation());
        assert!(e.to_string().contains("heartbeat_interval"));
    }

    #[test]
    fn test_exhausted_message_includes_attempts() {
        let e = Error::VanityExhausted { attempts: 100 };
        assert!(e.to_string().contains("100"));
    }
}
