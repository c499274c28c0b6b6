//! Lookup façades over an index and the stream it is attached to.

use crate::common::Result;
use crate::stream::{ObjectStream, RecordStore, StreamId};

/// What a façade needs from an index.
pub(crate) trait LookupSource<T, K> {
    fn check_attached(&self, stream: StreamId) -> Result<()>;

    /// Slots whose key equals `key`, ascending.
    fn matches(&self, stream: StreamId, records: &mut RecordStore<T>, key: &K) -> Result<Vec<u64>>;

    /// Every distinct key, or `Error::Unsupported` when keys are not stored.
    fn keys(&self, stream: StreamId) -> Result<Vec<K>>;
}

/// Key lookups against one index.
///
/// Holds the stream by `&mut` borrow, since resolving a checksum collision
/// may load records.
pub struct Lookup<'a, T, K> {
    source: &'a dyn LookupSource<T, K>,
    stream: &'a mut ObjectStream<T>,
}

impl<'a, T, K> Lookup<'a, T, K> {
    pub(crate) fn new(source: &'a dyn LookupSource<T, K>, stream: &'a mut ObjectStream<T>) -> Result<Self> {
        source.check_attached(stream.id())?;
        Ok(Self { source, stream })
    }

    /// True if some record has key `key`.
    pub fn contains(&mut self, key: &K) -> Result<bool> {
        Ok(!self.get(key)?.is_empty())
    }

    /// Slots of every record with key `key`, ascending.
    pub fn get(&mut self, key: &K) -> Result<Vec<u64>> {
        let id = self.stream.id();
        self.source.matches(id, self.stream.records_mut(), key)
    }

    /// Every distinct key in the index.
    ///
    /// # Errors
    /// `Error::Unsupported` for checksum indexes, which do not store keys.
    pub fn keys(&mut self) -> Result<Vec<K>> {
        self.source.keys(self.stream.id())
    }
}

/// Key lookups against a unique index.
pub struct UniqueLookup<'a, T, K> {
    inner: Lookup<'a, T, K>,
}

impl<'a, T, K> UniqueLookup<'a, T, K> {
    pub(crate) fn new(source: &'a dyn LookupSource<T, K>, stream: &'a mut ObjectStream<T>) -> Result<Self> {
        Ok(Self {
            inner: Lookup::new(source, stream)?,
        })
    }

    pub fn contains(&mut self, key: &K) -> Result<bool> {
        self.inner.contains(key)
    }

    pub fn get(&mut self, key: &K) -> Result<Vec<u64>> {
        self.inner.get(key)
    }

    pub fn keys(&mut self) -> Result<Vec<K>> {
        self.inner.keys()
    }

    /// Slot of the record with key `key`.
    pub fn find(&mut self, key: &K) -> Result<Option<u64>> {
        Ok(self.inner.get(key)?.first().copied())
    }

    /// The record with key `key`.
    pub fn load(&mut self, key: &K) -> Result<Option<T>> {
        match self.find(key)? {
            Some(index) => self.inner.stream.load_item(index).map(Some),
            None => Ok(None),
        }
    }
}
