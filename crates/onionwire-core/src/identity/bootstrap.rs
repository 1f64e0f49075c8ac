//! Bootstrap identities.
//!
//! Well-known onion identities that new peers dial first. The seed table is a
//! compile-time constant owned by the embedding application and handed to a
//! [`StaticBootstrapPool`]; library code only sees the
//! [`BootstrapIdentities`] trait, so tests substitute a throwaway table.

use super::onion::{OnionAddress, OnionKeyMaterial};
use crate::error::{Error, Result};
use rand::Rng;

/// Source of bootstrap onion identities.
pub trait BootstrapIdentities {
    /// Number of identities in the pool.
    fn len(&self) -> usize;

    /// Key material for the identity at `index`.
    fn key_material(&self, index: usize) -> Result<OnionKeyMaterial>;

    /// Whether the pool is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Public onion addresses of every identity, in table order.
    fn addresses(&self) -> Result<Vec<OnionAddress>> {
        (0..self.len())
            .map(|i| self.key_material(i).map(|k| k.onion_address().clone()))
            .collect()
    }

    /// Pick one identity uniformly at random.
    fn choose<R: Rng>(&self, rng: &mut R) -> Result<OnionKeyMaterial>
    where
        Self: Sized,
    {
        if self.is_empty() {
            return Err(Error::InvalidKey("bootstrap pool is empty".into()));
        }
        self.key_material(rng.gen_range(0..self.len()))
    }
}

/// Bootstrap pool backed by a static table of hex-encoded 32-byte seeds.
#[derive(Debug, Clone, Copy)]
pub struct StaticBootstrapPool {
    seeds: &'static [&'static str],
}

impl StaticBootstrapPool {
    /// Wrap a constant seed table.
    pub const fn new(seeds: &'static [&'static str]) -> Self {
        Self { seeds }
    }
}

impl BootstrapIdentities for StaticBootstrapPool {
    fn len(&self) -> usize {
        self.seeds.len()
    }

    fn key_material(&self, index: usize) -> Result<OnionKeyMaterial> {
        let seed = self
            .seeds
            .get(index)
            .ok_or_else(|| Error::InvalidKey(format!("no bootstrap identity at index {}", index)))?;
        OnionKeyMaterial::from_hex_seed(seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    const TEST_SEEDS: &[&str] = &[
        "0101010101010101010101010101010101010101010101010101010101010101",
        "0202020202020202020202020202020202020202020202020202020202020202",
    ];

    #[test]
    fn test_static_pool_addresses() {
        let pool = StaticBootstrapPool::new(TEST_SEEDS);
        assert_eq!(pool.len(), 2);

        let addresses = pool.addresses().expect("valid table");
        assert_eq!(addresses.len(), 2);
        assert_eq!(
            addresses[0],
            *OnionKeyMaterial::from_seed([1u8; 32]).onion_address()
        );
        assert_ne!(addresses[0], addresses[1]);
    }

    #[test]
    fn test_choose_from_pool() {
        let pool = StaticBootstrapPool::new(TEST_SEEDS);
        let addresses = pool.addresses().expect("valid table");
        let picked = pool.choose(&mut OsRng).expect("non-empty pool");
        assert!(addresses.contains(picked.onion_address()));
    }

    #[test]
    fn test_empty_and_bad_tables() {
        let empty = StaticBootstrapPool::new(&[]);
        assert!(empty.is_empty());
        assert!(empty.choose(&mut OsRng).is_err());
        assert!(empty.key_material(0).is_err());

        let bad = StaticBootstrapPool::new(&["not-hex"]);
        assert!(bad.addresses().is_err());
    }
}
