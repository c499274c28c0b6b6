//! Key stores - persisted maps from a comparison value to record slots.
//!
//! - [`KeyStore`] maps each value to an ordered set of slots
//! - [`UniqueKeyStore`] maps each value to exactly one slot and rejects a second
//!
//! Both persist through bincode in the stream's byte order, sorted by value so
//! equal contents always produce equal bytes.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::{Endianness, Error, Result};
use crate::serialization::{decode_with, encode_with};

/// Values a key store can hold: serialized keys or key checksums.
pub trait StoreValue: Clone + Eq + Hash + Ord + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<V> StoreValue for V where V: Clone + Eq + Hash + Ord + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// State an index keeps in a reserved stream.
pub trait PersistedStore: Sized + Send + Sync {
    fn empty(reserved_stream: usize) -> Self;

    fn encode(&self, endianness: Endianness) -> Result<Vec<u8>>;

    fn decode(reserved_stream: usize, endianness: Endianness, bytes: &[u8]) -> Result<Self>;

    /// Every slot above `removed` moves down by one.
    fn renumber_after(&mut self, removed: u64);
}

/// Common surface of both key stores, as the indexes drive them.
pub trait EntryStore<V>: PersistedStore {
    /// Whether a value may map to at most one slot.
    const UNIQUE: bool;

    fn insert(&mut self, value: V, index: u64) -> Result<()>;

    fn delete(&mut self, value: &V, index: u64) -> bool;

    fn indices(&self, value: &V) -> Vec<u64>;

    fn values(&self) -> Vec<V>;
}

fn renumber(index: u64, removed: u64) -> u64 {
    if index > removed {
        index - 1
    } else {
        index
    }
}

// ============================================================================
// KeyStore
// ============================================================================

/// Non-unique key store: each value maps to a set of slots.
#[derive(Debug, Clone)]
pub struct KeyStore<V> {
    entries: HashMap<V, BTreeSet<u64>>,
}

impl<V: StoreValue> Default for KeyStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: StoreValue> KeyStore<V> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Map `value` to `index`. Returns false if the pair was already present.
    pub fn add(&mut self, value: V, index: u64) -> bool {
        self.entries.entry(value).or_default().insert(index)
    }

    /// Remove the pair `(value, index)`, dropping the value when its set empties.
    pub fn remove(&mut self, value: &V, index: u64) -> bool {
        let Some(set) = self.entries.get_mut(value) else {
            return false;
        };
        let removed = set.remove(&index);
        if set.is_empty() {
            self.entries.remove(value);
        }
        removed
    }

    /// Slots mapped to `value`, ascending.
    pub fn get(&self, value: &V) -> Vec<u64> {
        self.entries
            .get(value)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    #[inline]
    pub fn contains(&self, value: &V) -> bool {
        self.entries.contains_key(value)
    }

    pub fn contains_entry(&self, value: &V, index: u64) -> bool {
        self.entries.get(value).is_some_and(|set| set.contains(&index))
    }

    /// Number of distinct values.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct values, sorted.
    pub fn values(&self) -> Vec<V> {
        let mut values: Vec<V> = self.entries.keys().cloned().collect();
        values.sort();
        values
    }

    /// Shift every slot above `removed` down by one.
    pub fn renumber_after(&mut self, removed: u64) {
        for set in self.entries.values_mut() {
            if set.last().is_some_and(|&max| max > removed) {
                *set = set.iter().map(|&i| renumber(i, removed)).collect();
            }
        }
    }

    fn sorted_entries(&self) -> Vec<(V, Vec<u64>)> {
        let mut entries: Vec<(V, Vec<u64>)> = self
            .entries
            .iter()
            .map(|(value, set)| (value.clone(), set.iter().copied().collect()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl<V: StoreValue> PartialEq for KeyStore<V> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<V: StoreValue> Eq for KeyStore<V> {}

impl<V: StoreValue> PersistedStore for KeyStore<V> {
    fn empty(_reserved_stream: usize) -> Self {
        Self::new()
    }

    fn encode(&self, endianness: Endianness) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        encode_with(endianness, &mut bytes, &self.sorted_entries())?;
        Ok(bytes)
    }

    fn decode(_reserved_stream: usize, endianness: Endianness, bytes: &[u8]) -> Result<Self> {
        let entries: Vec<(V, Vec<u64>)> = decode_with(endianness, bytes)?;
        Ok(Self {
            entries: entries
                .into_iter()
                .map(|(value, indices)| (value, indices.into_iter().collect()))
                .collect(),
        })
    }

    fn renumber_after(&mut self, removed: u64) {
        KeyStore::renumber_after(self, removed);
    }
}

impl<V: StoreValue> EntryStore<V> for KeyStore<V> {
    const UNIQUE: bool = false;

    fn insert(&mut self, value: V, index: u64) -> Result<()> {
        self.add(value, index);
        Ok(())
    }

    fn delete(&mut self, value: &V, index: u64) -> bool {
        self.remove(value, index)
    }

    fn indices(&self, value: &V) -> Vec<u64> {
        self.get(value)
    }

    fn values(&self) -> Vec<V> {
        KeyStore::values(self)
    }
}

// ============================================================================
// UniqueKeyStore
// ============================================================================

/// Unique key store: each value maps to exactly one slot.
#[derive(Debug, Clone)]
pub struct UniqueKeyStore<V> {
    /// Reported in conflicts.
    reserved_stream: usize,
    entries: HashMap<V, u64>,
}

impl<V: StoreValue> UniqueKeyStore<V> {
    pub fn new(reserved_stream: usize) -> Self {
        Self {
            reserved_stream,
            entries: HashMap::new(),
        }
    }

    /// Map `value` to `index`.
    ///
    /// # Errors
    /// `Error::UniqueConstraint` if `value` already maps to a different slot.
    pub fn add(&mut self, value: V, index: u64) -> Result<()> {
        self.check(&value, index)?;
        self.entries.insert(value, index);
        Ok(())
    }

    fn check(&self, value: &V, index: u64) -> Result<()> {
        match self.entries.get(value) {
            Some(&existing) if existing != index => Err(Error::UniqueConstraint {
                reserved_stream: self.reserved_stream,
                existing,
            }),
            _ => Ok(()),
        }
    }

    /// Remove `value` if it maps to `index`.
    pub fn remove(&mut self, value: &V, index: u64) -> bool {
        if self.entries.get(value) == Some(&index) {
            self.entries.remove(value);
            return true;
        }
        false
    }

    pub fn get(&self, value: &V) -> Option<u64> {
        self.entries.get(value).copied()
    }

    #[inline]
    pub fn contains(&self, value: &V) -> bool {
        self.entries.contains_key(value)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values, sorted.
    pub fn values(&self) -> Vec<V> {
        let mut values: Vec<V> = self.entries.keys().cloned().collect();
        values.sort();
        values
    }

    pub fn renumber_after(&mut self, removed: u64) {
        for index in self.entries.values_mut() {
            *index = renumber(*index, removed);
        }
    }
}

impl<V: StoreValue> PartialEq for UniqueKeyStore<V> {
    fn eq(&self, other: &Self) -> bool {
        self.reserved_stream == other.reserved_stream && self.entries == other.entries
    }
}

impl<V: StoreValue> Eq for UniqueKeyStore<V> {}

impl<V: StoreValue> PersistedStore for UniqueKeyStore<V> {
    fn empty(reserved_stream: usize) -> Self {
        Self::new(reserved_stream)
    }

    fn encode(&self, endianness: Endianness) -> Result<Vec<u8>> {
        let mut entries: Vec<(&V, u64)> = self.entries.iter().map(|(v, i)| (v, *i)).collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));

        let mut bytes = Vec::new();
        encode_with(endianness, &mut bytes, &entries)?;
        Ok(bytes)
    }

    fn decode(reserved_stream: usize, endianness: Endianness, bytes: &[u8]) -> Result<Self> {
        let entries: Vec<(V, u64)> = decode_with(endianness, bytes)?;
        let mut store = Self::new(reserved_stream);
        for (value, index) in entries {
            if store.entries.insert(value, index).is_some() {
                return Err(Error::Corrupted(format!(
                    "unique key store on reserved stream {} repeats a value",
                    reserved_stream
                )));
            }
        }
        Ok(store)
    }

    fn renumber_after(&mut self, removed: u64) {
        UniqueKeyStore::renumber_after(self, removed);
    }
}

impl<V: StoreValue> EntryStore<V> for UniqueKeyStore<V> {
    const UNIQUE: bool = true;

    fn insert(&mut self, value: V, index: u64) -> Result<()> {
        self.add(value, index)
    }

    fn delete(&mut self, value: &V, index: u64) -> bool {
        self.remove(value, index)
    }

    fn indices(&self, value: &V) -> Vec<u64> {
        self.get(value).into_iter().collect()
    }

    fn values(&self) -> Vec<V> {
        UniqueKeyStore::values(self)
    }
}
