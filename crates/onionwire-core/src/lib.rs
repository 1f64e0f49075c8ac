//! # Onionwire Core Library
//!
//! Peer-to-peer plumbing for applications that talk over Tor onion
//! services.
//!
//! ## Layers
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              Application                │
//! ├─────────────────────────────────────────┤
//! │   transport (TCP / SOCKS5)  │  control  │
//! ├─────────────────────────────────────────┤
//! │           protocol (frames)             │
//! ├─────────────────────────────────────────┤
//! │               identity                  │
//! └─────────────────────────────────────────┘
//! ```
//!
//! - [`identity`]: onion v3 addresses, key expansion, vanity search.
//! - [`protocol`]: length-prefixed frame codec and message payloads.
//! - [`transport`]: framed connections with heartbeat, idle timeout and
//!   write backpressure, dialed directly or through Tor's SOCKS5 port.
//! - [`control`]: Tor control-port probing and live onion listing.
//!
//! Tor itself is not managed here. The embedding application starts it
//! and publishes onion services.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod control;
pub mod error;
pub mod identity;
pub mod logging;
pub mod protocol;
pub mod transport;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
