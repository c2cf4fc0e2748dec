//! Address-keyed map with hash buckets and exact-match lookup.
//!
//! Addresses are bucketed by a 32-bit [`Locator`] (the classic
//! `31 * h + b` polynomial over the bytes, seeded with 1). Distinct
//! addresses can share a locator ("Aa" and "BB" do), so every bucket keeps
//! the full address next to its value and lookups compare bytes exactly.

use std::collections::HashMap;

use fast_proto::Address;

/// 32-bit bucket key for an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Locator(u32);

impl Locator {
    /// Locator for `address`. Bytes are sign-extended before mixing.
    pub fn of(address: &Address) -> Self {
        let hash = address
            .as_bytes()
            .iter()
            .fold(1u32, |hash, &byte| hash.wrapping_mul(31).wrapping_add(byte as i8 as u32));
        Self(hash)
    }

    /// Raw locator value
    pub fn value(self) -> u32 {
        self.0
    }
}

/// Map from [`Address`] to `V`
#[derive(Debug, Clone)]
pub struct AddressMap<V> {
    buckets: HashMap<Locator, Vec<(Address, V)>>,
    len: usize,
}

impl<V> Default for AddressMap<V> {
    fn default() -> Self {
        Self { buckets: HashMap::new(), len: 0 }
    }
}

impl<V> AddressMap<V> {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of addresses stored
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value for exactly `address`
    pub fn get(&self, address: &Address) -> Option<&V> {
        self.buckets
            .get(&Locator::of(address))?
            .iter()
            .find(|(key, _)| key == address)
            .map(|(_, value)| value)
    }

    /// Mutable value for exactly `address`
    pub fn get_mut(&mut self, address: &Address) -> Option<&mut V> {
        self.buckets
            .get_mut(&Locator::of(address))?
            .iter_mut()
            .find(|(key, _)| key == address)
            .map(|(_, value)| value)
    }

    /// Value for `address`, inserting `default()` first if absent
    pub fn get_or_insert_with(&mut self, address: &Address, default: impl FnOnce() -> V) -> &mut V {
        let bucket = self.buckets.entry(Locator::of(address)).or_default();
        let index = match bucket.iter().position(|(key, _)| key == address) {
            Some(index) => index,
            None => {
                bucket.push((address.clone(), default()));
                self.len += 1;
                bucket.len() - 1
            },
        };
        &mut bucket[index].1
    }

    /// Remove and return the value for `address`
    pub fn remove(&mut self, address: &Address) -> Option<V> {
        let locator = Locator::of(address);
        let bucket = self.buckets.get_mut(&locator)?;
        let index = bucket.iter().position(|(key, _)| key == address)?;
        let (_, value) = bucket.swap_remove(index);
        if bucket.is_empty() {
            self.buckets.remove(&locator);
        }
        self.len -= 1;
        Some(value)
    }

    /// Keep only entries for which `keep` returns true
    pub fn retain(&mut self, mut keep: impl FnMut(&Address, &mut V) -> bool) {
        let mut removed = 0;
        self.buckets.retain(|_, bucket| {
            let before = bucket.len();
            bucket.retain_mut(|(address, value)| keep(address, value));
            removed += before - bucket.len();
            !bucket.is_empty()
        });
        self.len -= removed;
    }
}
