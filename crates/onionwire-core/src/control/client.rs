//! Tor ControlPort client.
//!
//! Every call opens a fresh connection, runs its commands and drops the
//! socket. Nothing is held open between calls.

use super::reply::{normalize_onion_list, parse_getinfo_value, ProtocolInfo, Reply};
use super::session::{ControlSession, Stage};
use super::ControlPortConfig;
use crate::error::{Error, Result};
use crate::logging::{sanitize_command, RedactedBytes};
use std::collections::BTreeMap;
use std::future::Future;
use tracing::{debug, info, warn};

/// GETINFO keys that list onion services, in the order they are tried.
/// The key name differs between Tor versions.
pub const ONION_LIST_KEYS: &[&str] = &["onions/detached", "onions/current"];

/// Outcome of a PROTOCOLINFO liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlProbe {
    /// The control port answered.
    Reachable {
        /// Raw PROTOCOLINFO reply text.
        protocolinfo: String,
    },
    /// The control port could not be reached or did not answer in time.
    Unreachable {
        /// What went wrong.
        error: String,
    },
}

impl ControlProbe {
    /// Whether the probe succeeded.
    pub fn is_ok(&self) -> bool {
        matches!(self, ControlProbe::Reachable { .. })
    }
}

/// GETINFO results by key. Keys Tor did not recognize map to `None`.
pub type InfoMap = BTreeMap<String, Option<String>>;

/// Onion services Tor reports as live.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LiveOnionReport {
    /// Whether the control port answered `GETINFO version`.
    pub reachable: bool,
    /// Tor version from that probe.
    pub version: Option<String>,
    /// Lowercase hostnames without `.onion`.
    pub onions: Vec<String>,
    /// The GETINFO key that produced `onions`.
    pub used_key: Option<String>,
    /// Why the listing failed, if it did.
    pub error: Option<String>,
}

impl LiveOnionReport {
    /// Whether the listing succeeded.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Whether `address` (any case, suffix optional) is live.
    pub fn contains(&self, address: &str) -> bool {
        normalize_onion_list(address)
            .first()
            .map(|a| self.onions.contains(a))
            .unwrap_or(false)
    }
}

/// Expected onion services checked against Tor's live list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Expected and live.
    pub active: Vec<String>,
    /// Expected but not live.
    pub missing: Vec<String>,
    /// Live but not expected.
    pub unexpected: Vec<String>,
}

impl Reconciliation {
    /// Whether every expected service is live.
    pub fn all_active(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Compare the services we asked Tor to host with the ones it serves.
pub fn reconcile<S: AsRef<str>>(expected: &[S], live: &[String]) -> Reconciliation {
    let expected: Vec<String> = expected
        .iter()
        .flat_map(|e| normalize_onion_list(e.as_ref()))
        .collect();
    let live = normalize_onion_list(&live.join(" "));

    let mut result = Reconciliation::default();
    for address in &expected {
        if live.contains(address) {
            result.active.push(address.clone());
        } else {
            result.missing.push(address.clone());
        }
    }
    result.unexpected = live.into_iter().filter(|l| !expected.contains(l)).collect();
    result
}

/// Client for Tor's control port.
#[derive(Debug, Clone, Default)]
pub struct ControlPortClient {
    config: ControlPortConfig,
}

impl ControlPortClient {
    /// Create a client for the given control port.
    pub fn new(config: ControlPortConfig) -> Self {
        Self { config }
    }

    /// The active configuration.
    pub fn config(&self) -> &ControlPortConfig {
        &self.config
    }

    /// Probe the control port with `PROTOCOLINFO 1`.
    ///
    /// Never fails: an unreachable or silent control port is reported as
    /// [`ControlProbe::Unreachable`].
    pub async fn protocol_info(&self) -> ControlProbe {
        let result = self
            .with_timeout(async {
                let mut session = ControlSession::connect(&self.config.host, self.config.port).await?;
                let reply = session.request("PROTOCOLINFO 1").await?;
                expect_ok(Stage::Greeting, "PROTOCOLINFO 1", &reply)?;
                Ok(reply.text())
            })
            .await;

        match result {
            Ok(protocolinfo) => ControlProbe::Reachable { protocolinfo },
            Err(e) => {
                debug!(error = %e, "Control port probe failed");
                ControlProbe::Unreachable { error: e.to_string() }
            }
        }
    }

    /// Authenticate and run `commands` in order on one connection.
    ///
    /// Returns each command's reply text. A `552` reply (unrecognized key) is
    /// returned like any other so GETINFO callers can map it to `None`; every
    /// other non-`250` reply, socket error or timeout fails the whole call.
    pub async fn authenticated_request(&self, commands: &[String]) -> Result<Vec<String>> {
        self.with_timeout(self.run_session(commands)).await
    }

    async fn run_session(&self, commands: &[String]) -> Result<Vec<String>> {
        let mut session = ControlSession::connect(&self.config.host, self.config.port).await?;

        let stage = Stage::Greeting;
        let reply = session.request("PROTOCOLINFO 1").await?;
        expect_ok(stage, "PROTOCOLINFO 1", &reply)?;
        let info = ProtocolInfo::parse(&reply.text());
        debug!(
            methods = ?info.auth_methods,
            cookie_file = ?info.cookie_file,
            "Control port auth methods"
        );

        let stage = Stage::Authenticating;
        let auth = authenticate_command(&info).await;
        let reply = session.request(&auth).await?;
        expect_ok(stage, &auth, &reply)?;
        debug!("Authenticated with Tor control port");

        let mut replies = Vec::with_capacity(commands.len());
        for (i, command) in commands.iter().enumerate() {
            let stage = Stage::Commands(i);
            let reply = session.request(command).await?;
            if !reply.is_unrecognized() {
                expect_ok(stage, command, &reply)?;
            }
            replies.push(reply.text());
        }

        Ok(replies)
    }

    /// Run `GETINFO <key>` for each key.
    pub async fn get_info(&self, keys: &[&str]) -> Result<InfoMap> {
        let commands: Vec<String> = keys.iter().map(|k| format!("GETINFO {}", k)).collect();
        let replies = self.authenticated_request(&commands).await?;

        Ok(keys
            .iter()
            .zip(replies.iter())
            .map(|(key, reply)| (key.to_string(), parse_getinfo_value(reply, key)))
            .collect())
    }

    /// Ask Tor which onion services it is serving right now.
    ///
    /// Reachability is checked first with `GETINFO version`; then each of
    /// [`ONION_LIST_KEYS`] is tried until one is supported. When every key
    /// fails, the report carries the last error Tor returned rather than
    /// claiming the keys are unsupported.
    pub async fn get_live_onion_addresses(&self) -> LiveOnionReport {
        let mut report = LiveOnionReport::default();

        match self.get_info(&["version"]).await {
            Ok(info) => {
                report.reachable = true;
                report.version = info.get("version").cloned().flatten();
            }
            Err(e) => {
                warn!(error = %e, "Tor control port not reachable");
                report.error = Some(format!("control port not reachable: {}", e));
                return report;
            }
        }

        let mut last_error = None;
        for key in ONION_LIST_KEYS {
            match self.get_info(&[key]).await {
                Ok(info) => match info.get(*key).cloned().flatten() {
                    Some(value) => {
                        report.onions = normalize_onion_list(&value);
                        report.used_key = Some(key.to_string());
                        info!(key = %key, count = report.onions.len(), "Listed live onion services");
                        return report;
                    }
                    None => debug!(key = %key, "GETINFO key not recognized"),
                },
                Err(e) => {
                    debug!(key = %key, error = %e, "GETINFO key failed");
                    last_error = Some(e);
                }
            }
        }

        report.error = Some(match last_error {
            // e.g. 551 when Tor hosts no services of that kind
            Some(e) => format!("listing onion services failed: {}", e),
            None => format!(
                "Tor supports none of the onion listing keys ({})",
                ONION_LIST_KEYS.join(", ")
            ),
        });
        report
    }

    async fn with_timeout<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.timeout, fut)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "control port {}:{} did not answer within {:?}",
                    self.config.host, self.config.port, self.config.timeout
                ))
            })?
    }
}

/// Pick the AUTHENTICATE command for what PROTOCOLINFO advertised.
async fn authenticate_command(info: &ProtocolInfo) -> String {
    if info.supports("COOKIE") {
        if let Some(path) = &info.cookie_file {
            match tokio::fs::read(path).await {
                Ok(cookie) => {
                    debug!(cookie = %RedactedBytes(&cookie), "Using cookie authentication");
                    return format!("AUTHENTICATE {}", hex::encode(cookie));
                }
                Err(e) => warn!(path = %path, error = %e, "Cookie file not readable, trying bare AUTHENTICATE"),
            }
        }
    }
    "AUTHENTICATE".to_string()
}

fn expect_ok(stage: Stage, command: &str, reply: &Reply) -> Result<()> {
    if reply.is_ok() {
        return Ok(());
    }
    Err(Error::Control(format!(
        "{} failed ({}): {}",
        stage,
        sanitize_command(command),
        reply.last_line()
    )))
}
