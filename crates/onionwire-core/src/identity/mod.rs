//! Onion identity cryptography.
//!
//! An identity is an Ed25519 keypair; its Tor v3 onion address is a pure
//! function of the public key. Nothing in this module touches the network or
//! the filesystem.
//!
//! ## Key Properties
//!
//! - 32-byte seed, kept private and zeroized on drop
//! - 64-byte expanded secret in the layout Tor keeps on disk
//! - 56-character lowercase base32 address, no `.onion` suffix
//!
//! ```ignore
//! use onionwire_core::identity::generate_key_material;
//! let key = generate_key_material();
//! println!("{}", key.onion_address().to_hostname());
//! ```

mod bootstrap;
mod onion;
mod vanity;

pub use bootstrap::{BootstrapIdentities, StaticBootstrapPool};
pub use onion::{
    derive_onion_address, expand_seed_to_secret, onion_checksum, OnionAddress,
    OnionKeyMaterial, ONION_ADDRESS_LEN, ONION_VERSION,
};
pub use vanity::{generate_vanity_keypair, VanityMatch};

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;

/// Generate a fresh random onion identity.
pub fn generate_key_material() -> OnionKeyMaterial {
    let signing_key = SigningKey::generate(&mut OsRng);
    OnionKeyMaterial::from_signing_key(&signing_key)
}
