//! Key-checksum indexes.
//!
//! The persisted value is a 32-bit digest of the key. A digest bucket may
//! hold records with different keys, so every lookup fetches the candidate
//! records and compares their true keys before answering. The key space
//! cannot be enumerated.

use std::sync::Arc;

use crate::common::{Error, Result};
use crate::index::cell::IndexCell;
use crate::index::key_store::KeyStore;
use crate::index::lookup::{Lookup, LookupSource, UniqueLookup};
use crate::index::projection::{IndexKey, ResolvedKeys};
use crate::index::IndexKind;
use crate::stream::{ObjectStream, RecordStore, StreamAttachment, StreamId};

/// Non-unique key-checksum index.
pub type KeyChecksumIndex<T, K> = ChecksumIndex<T, K, false>;

/// Unique key-checksum index; records with equal keys are rejected, records
/// whose keys merely share a digest are not.
pub type UniqueKeyChecksumIndex<T, K> = ChecksumIndex<T, K, true>;

/// Index over key digests.
pub struct ChecksumIndex<T, K, const UNIQUE: bool> {
    shared: Arc<Shared<T, K>>,
}

struct Shared<T, K> {
    keys: ResolvedKeys<T, K>,
    cell: IndexCell<KeyStore<u32>>,
}

impl<T, K, const UNIQUE: bool> Clone for ChecksumIndex<T, K, UNIQUE> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, K: IndexKey, const UNIQUE: bool> ChecksumIndex<T, K, UNIQUE> {
    pub(crate) fn new(reserved_stream: usize, keys: ResolvedKeys<T, K>) -> Self {
        Self {
            shared: Arc::new(Shared {
                keys,
                cell: IndexCell::new(reserved_stream),
            }),
        }
    }

    pub fn reserved_stream(&self) -> usize {
        self.shared.cell.reserved_stream()
    }

    pub fn is_attached(&self) -> bool {
        self.shared.cell.is_attached()
    }

    /// Fail with `Error::Detached` unless attached to `stream`.
    pub fn check_attached(&self, stream: &ObjectStream<T>) -> Result<()> {
        self.shared.cell.check_attached(stream.id())
    }
}

impl<T, K: IndexKey> KeyChecksumIndex<T, K> {
    pub fn lookup<'a>(&'a self, stream: &'a mut ObjectStream<T>) -> Result<Lookup<'a, T, K>> {
        Lookup::new(&*self.shared, stream)
    }
}

impl<T, K: IndexKey> UniqueKeyChecksumIndex<T, K> {
    pub fn lookup<'a>(&'a self, stream: &'a mut ObjectStream<T>) -> Result<UniqueLookup<'a, T, K>> {
        UniqueLookup::new(&*self.shared, stream)
    }
}

impl<T, K> Shared<T, K> {
    /// Candidates whose fetched key equals `key`.
    fn resolve(&self, records: &mut RecordStore<T>, key: &K, candidates: Vec<u64>) -> Result<Vec<u64>> {
        let mut matches = Vec::with_capacity(candidates.len());
        for index in candidates {
            let stored = self.keys.fetch(records, index)?;
            if self.keys.same(&stored, key) {
                matches.push(index);
            }
        }
        Ok(matches)
    }

    /// Fail if a candidate other than `index` already holds `key`.
    fn check_unique(&self, candidates: Vec<u64>, records: &mut RecordStore<T>, index: u64, key: &K) -> Result<()> {
        for existing in candidates {
            if existing == index {
                continue;
            }
            let stored = self.keys.fetch(records, existing)?;
            if self.keys.same(&stored, key) {
                return Err(Error::UniqueConstraint {
                    reserved_stream: self.cell.reserved_stream(),
                    existing,
                });
            }
        }
        Ok(())
    }

    /// Validate `key` for slot `index`; the bucket lock is released before fetching.
    fn validate(&self, records: &mut RecordStore<T>, index: u64, key: &K, unique: bool) -> Result<()> {
        let checksum = self.keys.checksum(key)?;
        if !unique {
            return Ok(());
        }
        let candidates = self.cell.read_unchecked(|store| store.get(&checksum));
        self.check_unique(candidates, records, index, key)
    }

    fn checksum_of(&self, item: &T) -> Result<u32> {
        self.keys.checksum(&self.keys.key_of(item))
    }
}

impl<T, K: IndexKey> LookupSource<T, K> for Shared<T, K> {
    fn check_attached(&self, stream: StreamId) -> Result<()> {
        self.cell.check_attached(stream)
    }

    fn matches(&self, stream: StreamId, records: &mut RecordStore<T>, key: &K) -> Result<Vec<u64>> {
        let checksum = self.keys.checksum(key)?;
        let candidates = self.cell.read(stream, |store| store.get(&checksum))?;
        self.resolve(records, key, candidates)
    }

    fn keys(&self, stream: StreamId) -> Result<Vec<K>> {
        self.cell.check_attached(stream)?;
        Err(Error::Unsupported("checksum indexes cannot enumerate their keys"))
    }
}

impl<T, K, const UNIQUE: bool> StreamAttachment<T> for ChecksumIndex<T, K, UNIQUE>
where
    T: 'static,
    K: IndexKey,
{
    fn reserved_stream(&self) -> usize {
        self.shared.cell.reserved_stream()
    }

    fn kind(&self) -> IndexKind {
        if UNIQUE {
            IndexKind::UniqueKeyChecksum
        } else {
            IndexKind::KeyChecksum
        }
    }

    fn on_attached(&self, stream: StreamId, records: &mut RecordStore<T>, live: &[u64]) -> Result<()> {
        let shared = &self.shared;
        shared.cell.attach(stream, records, live, |store, records, live| {
            for &index in live {
                let key = shared.keys.fetch(records, index)?;
                let checksum = shared.keys.checksum(&key)?;
                if UNIQUE {
                    shared.check_unique(store.get(&checksum), records, index, &key)?;
                }
                store.add(checksum, index);
            }
            Ok(())
        })
    }

    fn on_detached(&self, stream: StreamId) {
        self.shared.cell.detach(stream);
    }

    fn on_adding(&self, records: &mut RecordStore<T>, index: u64, item: &T) -> Result<()> {
        let key = self.shared.keys.key_of(item);
        self.shared.validate(records, index, &key, UNIQUE)
    }

    fn on_added(&self, index: u64, item: &T) -> Result<()> {
        let checksum = self.shared.checksum_of(item)?;
        self.shared.cell.write(|store| {
            store.add(checksum, index);
            Ok(())
        })
    }

    fn on_updating(&self, records: &mut RecordStore<T>, index: u64, _old: &T, new: &T) -> Result<()> {
        let key = self.shared.keys.key_of(new);
        self.shared.validate(records, index, &key, UNIQUE)
    }

    fn on_updated(&self, index: u64, old: &T, new: &T) -> Result<()> {
        let old_checksum = self.shared.checksum_of(old)?;
        let new_checksum = self.shared.checksum_of(new)?;
        if old_checksum == new_checksum {
            return Ok(());
        }
        self.shared.cell.write(|store| {
            store.remove(&old_checksum, index);
            store.add(new_checksum, index);
            Ok(())
        })
    }

    fn on_removed(&self, index: u64, item: &T) -> Result<()> {
        let checksum = self.shared.checksum_of(item)?;
        self.shared.cell.write(|store| {
            store.remove(&checksum, index);
            Ok(())
        })
    }

    fn on_compacted(&self, removed: u64) {
        self.shared.cell.renumber_after(removed);
    }

    fn save(&self, records: &mut RecordStore<T>) -> Result<()> {
        self.shared.cell.save(records)
    }
}
