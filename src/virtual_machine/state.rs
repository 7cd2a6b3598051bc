//! VM storage management and overlay abstractions.
//!
//! The [`State`] trait is the key/value view the VM reads and writes through
//! `SLOAD`/`SSTORE`. [`OverlayState`] buffers a run's writes so they can be
//! applied to the base storage on success or dropped when the run traps.

use std::collections::BTreeMap;

/// Integer key/value storage visible to contracts.
pub trait State {
    /// Retrieves a value by key, returning `None` if the key does not exist.
    fn get(&self, key: &str) -> Option<i64>;
    /// Stores a value, overwriting any existing one.
    fn set(&mut self, key: &str, value: i64);
}

/// Write buffer on top of a base storage.
///
/// Reads fall through to the base for keys not written yet.
pub struct OverlayState<'a> {
    base: &'a dyn State,
    pub(crate) writes: BTreeMap<String, i64>,
}

impl<'a> OverlayState<'a> {
    /// Creates a new overlay backed by the given base storage.
    pub fn new(base: &'a dyn State) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
        }
    }

    /// Consumes the overlay and returns the pending writes in key order.
    pub fn into_writes(self) -> Vec<(String, i64)> {
        self.writes.into_iter().collect()
    }
}

impl<'a> State for OverlayState<'a> {
    fn get(&self, key: &str) -> Option<i64> {
        if let Some(v) = self.writes.get(key) {
            return Some(*v);
        }
        self.base.get(key)
    }

    fn set(&mut self, key: &str, value: i64) {
        self.writes.insert(key.to_string(), value);
    }
}
