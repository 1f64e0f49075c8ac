//! Brute-force search for onion addresses with a chosen prefix.
//!
//! Each character of prefix multiplies the expected work by 32, so callers
//! always pass an attempt budget and get a distinct error when it runs out.

use super::onion::OnionKeyMaterial;
use crate::error::{Error, Result};
use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tracing::{debug, info};

/// How often to emit a progress line while searching.
const PROGRESS_INTERVAL: u32 = 50_000;

/// Key material found by [`generate_vanity_keypair`].
#[derive(Debug, Clone)]
pub struct VanityMatch {
    /// The matching identity.
    pub key: OnionKeyMaterial,
    /// Number of keypairs generated, including the match.
    pub attempts: u32,
}

/// Generate random keypairs until one's onion address starts with `prefix`.
///
/// The comparison is case-insensitive. An empty or missing prefix accepts the
/// first keypair. Gives up with [`Error::VanityExhausted`] after
/// `max_attempts` keypairs.
pub fn generate_vanity_keypair(prefix: Option<&str>, max_attempts: u32) -> Result<VanityMatch> {
    let prefix = prefix.map(|p| p.trim().to_ascii_lowercase()).unwrap_or_default();

    for attempt in 1..=max_attempts {
        let signing_key = SigningKey::generate(&mut OsRng);
        let key = OnionKeyMaterial::from_signing_key(&signing_key);

        if key.onion_address().as_str().starts_with(&prefix) {
            info!(prefix = %prefix, attempts = attempt, "Found matching onion address");
            return Ok(VanityMatch { key, attempts: attempt });
        }

        if attempt % PROGRESS_INTERVAL == 0 {
            debug!(prefix = %prefix, attempts = attempt, "Vanity search in progress");
        }
    }

    Err(Error::VanityExhausted {
        attempts: max_attempts,
    })
}
