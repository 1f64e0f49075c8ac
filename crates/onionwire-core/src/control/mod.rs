//! Tor control-port client.
//!
//! Used to check that Tor is up and to ask which onion services it is
//! actually publishing. Each call runs on its own short-lived connection:
//! `PROTOCOLINFO 1`, then `AUTHENTICATE` (cookie when advertised and
//! readable, bare otherwise), then the requested commands.

mod client;
mod reply;
mod session;

pub use client::{
    reconcile, ControlPortClient, ControlProbe, InfoMap, LiveOnionReport, Reconciliation,
    ONION_LIST_KEYS,
};
pub use reply::{normalize_onion_list, parse_getinfo_value, ProtocolInfo, Reply, ReplyBuilder};
pub use session::{ControlSession, Stage};

use std::time::Duration;

/// Default Tor control port.
pub const DEFAULT_CONTROL_PORT: u16 = 9051;

/// Where the control port lives and how long a session may take.
#[derive(Debug, Clone)]
pub struct ControlPortConfig {
    /// Control port host.
    pub host: String,
    /// Control port.
    pub port: u16,
    /// Bound on a whole session, connect through last reply.
    pub timeout: Duration,
}

impl Default for ControlPortConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_CONTROL_PORT,
            timeout: Duration::from_secs(5),
        }
    }
}
