//! Tor v3 onion address derivation and key material.
//!
//! Tor v3 (.onion) addresses are derived from Ed25519 public keys:
//!
//! 1. Compute checksum: SHA3-256(".onion checksum" || pubkey || version)[..2]
//! 2. Encode: base32(pubkey || checksum || version), lowercase, unpadded
//!
//! This produces a 56-character hostname. Tor compares it byte for byte
//! against its own derivation, so nothing here may deviate from that layout.

use crate::error::{Error, Result};
use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};
use sha3::Sha3_256;
use std::fmt;
use zeroize::ZeroizeOnDrop;

/// Tor v3 onion service version byte.
pub const ONION_VERSION: u8 = 0x03;

/// Length of a v3 hostname without the `.onion` suffix.
pub const ONION_ADDRESS_LEN: usize = 56;

/// Checksum prefix from rend-spec-v3.
const CHECKSUM_PREFIX: &[u8] = b".onion checksum";

const ONION_SUFFIX: &str = ".onion";

const ALPHABET: base32::Alphabet = base32::Alphabet::Rfc4648 { padding: false };

/// First two bytes of SHA3-256(".onion checksum" || pubkey || version).
pub fn onion_checksum(public_key: &[u8; 32]) -> [u8; 2] {
    let mut hasher = Sha3_256::new();
    hasher.update(CHECKSUM_PREFIX);
    hasher.update(public_key);
    hasher.update([ONION_VERSION]);
    let hash = hasher.finalize();
    [hash[0], hash[1]]
}

/// Derive the 56-character v3 hostname (no `.onion` suffix) for a raw
/// Ed25519 public key.
pub fn derive_onion_address(public_key: &[u8; 32]) -> String {
    // pubkey (32) || checksum (2) || version (1) = 35 bytes
    let mut addr_bytes = [0u8; 35];
    addr_bytes[..32].copy_from_slice(public_key);
    addr_bytes[32..34].copy_from_slice(&onion_checksum(public_key));
    addr_bytes[34] = ONION_VERSION;

    base32::encode(ALPHABET, &addr_bytes).to_lowercase()
}

/// Expand a 32-byte Ed25519 seed into the 64-byte secret Tor keeps in
/// `hs_ed25519_secret_key` (after its 32-byte file header).
///
/// - First 32 bytes: clamped scalar
/// - Last 32 bytes: prefix for signing
pub fn expand_seed_to_secret(seed: &[u8; 32]) -> [u8; 64] {
    let hash = Sha512::digest(seed);
    let mut expanded = [0u8; 64];
    expanded.copy_from_slice(&hash);

    expanded[0] &= 248;
    expanded[31] &= 127;
    expanded[31] |= 64;

    expanded
}

/// A validated Tor v3 onion address.
///
/// Stored as the bare lowercase hostname; `.onion` is added on demand.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OnionAddress(String);

impl OnionAddress {
    /// Derive an onion address from a raw Ed25519 public key.
    pub fn from_public_key(public_key: &[u8; 32]) -> Self {
        Self(derive_onion_address(public_key))
    }

    /// Parse and validate an onion address string.
    ///
    /// Accepts any case, with or without the `.onion` suffix. Checks the
    /// alphabet, length, version byte and checksum.
    pub fn parse(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        let host = lower.strip_suffix(ONION_SUFFIX).unwrap_or(&lower);

        if host.len() != ONION_ADDRESS_LEN {
            return Err(Error::InvalidKey(format!(
                "v3 address must be {} characters, got {}",
                ONION_ADDRESS_LEN,
                host.len()
            )));
        }

        if !host.bytes().all(|c| matches!(c, b'a'..=b'z' | b'2'..=b'7')) {
            return Err(Error::InvalidKey("invalid base32 character".into()));
        }

        let decoded = base32::decode(ALPHABET, &host.to_ascii_uppercase())
            .ok_or_else(|| Error::InvalidKey("invalid base32 encoding".into()))?;

        if decoded.len() != 35 {
            return Err(Error::InvalidKey("invalid address length".into()));
        }

        if decoded[34] != ONION_VERSION {
            return Err(Error::InvalidKey("unsupported onion version".into()));
        }

        let public_key: [u8; 32] = decoded[..32]
            .try_into()
            .map_err(|_| Error::InvalidKey("invalid key length".into()))?;

        if decoded[32..34] != onion_checksum(&public_key) {
            return Err(Error::InvalidKey("checksum mismatch".into()));
        }

        Ok(Self(host.to_string()))
    }

    /// Bare hostname, 56 characters, no suffix.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Hostname with the `.onion` suffix, as used for SOCKS5 dials.
    pub fn to_hostname(&self) -> String {
        format!("{}{}", self.0, ONION_SUFFIX)
    }

    /// Recover the raw public key bytes embedded in the address.
    pub fn public_key_bytes(&self) -> Result<[u8; 32]> {
        let decoded = base32::decode(ALPHABET, &self.0.to_ascii_uppercase())
            .ok_or_else(|| Error::InvalidKey("invalid base32".into()))?;
        decoded[..32]
            .try_into()
            .map_err(|_| Error::InvalidKey("invalid key length".into()))
    }

    /// Recover the public key and check that it is a valid curve point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let bytes = self.public_key_bytes()?;
        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| Error::InvalidKey(format!("invalid public key: {}", e)))
    }
}

impl TryFrom<String> for OnionAddress {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<OnionAddress> for String {
    fn from(addr: OnionAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for OnionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for OnionAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OnionAddress({})", self.0)
    }
}

/// Complete key material for one onion identity.
///
/// The seed and expanded secret are zeroized on drop and never shown by
/// `Debug`.
#[derive(Clone, ZeroizeOnDrop)]
pub struct OnionKeyMaterial {
    seed: [u8; 32],
    expanded_secret: [u8; 64],
    #[zeroize(skip)]
    public_key: [u8; 32],
    #[zeroize(skip)]
    onion_address: OnionAddress,
}

impl OnionKeyMaterial {
    /// Build key material from a 32-byte Ed25519 seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self::from_signing_key(&signing_key)
    }

    /// Build key material from a hex-encoded 32-byte seed.
    pub fn from_hex_seed(hex_seed: &str) -> Result<Self> {
        let bytes = zeroize::Zeroizing::new(
            hex::decode(hex_seed.trim())
                .map_err(|e| Error::InvalidKey(format!("seed is not hex: {}", e)))?,
        );
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidKey("seed must be 32 bytes".into()))?;
        Ok(Self::from_seed(seed))
    }

    /// Build key material from an existing signing key.
    pub fn from_signing_key(signing_key: &SigningKey) -> Self {
        let seed = signing_key.to_bytes();
        let public_key = signing_key.verifying_key().to_bytes();
        Self {
            expanded_secret: expand_seed_to_secret(&seed),
            seed,
            onion_address: OnionAddress::from_public_key(&public_key),
            public_key,
        }
    }

    /// The 32-byte Ed25519 seed.
    pub fn seed(&self) -> &[u8; 32] {
        &self.seed
    }

    /// The raw 32-byte public key.
    pub fn public_key(&self) -> &[u8; 32] {
        &self.public_key
    }

    /// The 64-byte expanded secret Tor expects on disk.
    pub fn expanded_secret(&self) -> &[u8; 64] {
        &self.expanded_secret
    }

    /// The onion address for this identity.
    pub fn onion_address(&self) -> &OnionAddress {
        &self.onion_address
    }
}

impl fmt::Debug for OnionKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnionKeyMaterial")
            .field("onion_address", &self.onion_address)
            .field("seed", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn test_onion_address_derivation() {
        let signing_key = SigningKey::generate(&mut OsRng);
        let public_key = signing_key.verifying_key().to_bytes();

        let onion = OnionAddress::from_public_key(&public_key);
        assert_eq!(onion.as_str().len(), ONION_ADDRESS_LEN);
        assert!(onion.to_hostname().ends_with(".onion"));

        // Should extract same key back
        let extracted = onion.verifying_key().expect("should extract");
        assert_eq!(extracted, signing_key.verifying_key());
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let public_key = [42u8; 32];
        let a = derive_onion_address(&public_key);
        let b = derive_onion_address(&public_key);
        assert_eq!(a, b);
        assert_eq!(a.len(), 56);
        assert!(a.bytes().all(|c| matches!(c, b'a'..=b'z' | b'2'..=b'7')));
        assert!(a.ends_with('d'), "version byte 0x03 encodes to a trailing 'd'");
    }

    #[test]
    fn test_single_bit_changes_address() {
        let base = [0x5au8; 32];
        let reference = derive_onion_address(&base);
        for byte in 0..32 {
            for bit in 0..8 {
                let mut flipped = base;
                flipped[byte] ^= 1 << bit;
                assert_ne!(derive_onion_address(&flipped), reference);
            }
        }
    }

    #[test]
    fn test_known_vector() {
        // Address of the all-zero seed, as produced by Tor.
        let material = OnionKeyMaterial::from_seed([0u8; 32]);
        let expected_public =
            hex::decode("3b6a27bcceb6a42d62a3a8d02a6f0d73653215771de243a63ac048a18b59da29")
                .expect("hex");
        assert_eq!(material.public_key().as_slice(), expected_public.as_slice());
        assert_eq!(
            material.onion_address().as_str(),
            "hnvcppgow2sc2yvdvdicu3ynonsteflxdxrehjr2ybekdc2z3iu63yid"
        );
        assert_eq!(
            hex::encode(material.expanded_secret()),
            "5046adc1dba838867b2bbbfdd0c3423e58b57970b5267a90f57960924a87f156\
             0a6a85eaa642dac835424b5d7c8d637c00408c7a73da672b7f498521420b6dd3"
        );
        assert!(OnionAddress::parse(material.onion_address().as_str()).is_ok());
    }

    #[test]
    fn test_expand_secret_clamping() {
        for fill in [0u8, 1, 0x7f, 0xff] {
            let expanded = expand_seed_to_secret(&[fill; 32]);
            assert_eq!(expanded[0] & 7, 0);
            assert_eq!(expanded[31] & 128, 0);
            assert_eq!(expanded[31] & 64, 64);
        }
    }

    #[test]
    fn test_expand_matches_sha512_outside_clamped_bits() {
        let seed = [9u8; 32];
        let hash = Sha512::digest(seed);
        let expanded = expand_seed_to_secret(&seed);
        assert_eq!(&expanded[1..31], &hash[1..31]);
        assert_eq!(&expanded[32..], &hash[32..]);
    }

    #[test]
    fn test_onion_address_validation() {
        // Wrong length
        assert!(OnionAddress::parse("abc.onion").is_err());

        // Invalid base32
        assert!(OnionAddress::parse(
            "00000000000000000000000000000000000000000000000000000000.onion"
        )
        .is_err());

        // Broken checksum
        let good = OnionKeyMaterial::from_seed([1u8; 32]).onion_address().to_string();
        let mut bad = good.clone().into_bytes();
        bad[0] = if bad[0] == b'a' { b'b' } else { b'a' };
        let bad = String::from_utf8(bad).expect("ascii");
        assert!(OnionAddress::parse(&bad).is_err());
    }

    #[test]
    fn test_case_insensitive_parsing() {
        let material = OnionKeyMaterial::from_seed([3u8; 32]);
        let onion = material.onion_address();

        let upper = onion.to_hostname().to_uppercase();
        let parsed = OnionAddress::parse(&upper).expect("should parse");
        assert_eq!(&parsed, onion);

        let bare = OnionAddress::parse(onion.as_str()).expect("should parse");
        assert_eq!(&bare, onion);
    }

    #[test]
    fn test_key_material_from_hex_seed() {
        let seed = [0x11u8; 32];
        let from_hex = OnionKeyMaterial::from_hex_seed(&hex::encode(seed)).expect("hex seed");
        let direct = OnionKeyMaterial::from_seed(seed);
        assert_eq!(from_hex.onion_address(), direct.onion_address());
        assert_eq!(from_hex.expanded_secret(), &expand_seed_to_secret(&seed));

        assert!(OnionKeyMaterial::from_hex_seed("abcd").is_err());
        assert!(OnionKeyMaterial::from_hex_seed("zz").is_err());
    }

    #[test]
    fn test_debug_hides_seed() {
        let material = OnionKeyMaterial::from_seed([0xabu8; 32]);
        let debug = format!("{:?}", material);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains(&hex::encode([0xabu8; 32])));
    }
}
