//! Full-key indexes.
//!
//! The persisted value is the serialized key itself, so lookups compare
//! bytes directly and the key space can be enumerated. A projection with its
//! own comparer is matched against every stored key instead, since keys
//! with different bytes may then be equal.

use std::sync::Arc;

use crate::common::{Error, Result};
use crate::index::cell::IndexCell;
use crate::index::key_store::{EntryStore, KeyStore, UniqueKeyStore};
use crate::index::lookup::{Lookup, LookupSource, UniqueLookup};
use crate::index::projection::{IndexKey, ResolvedKeys};
use crate::index::IndexKind;
use crate::stream::{ObjectStream, RecordStore, StreamAttachment, StreamId};

/// Non-unique full-key index.
pub type KeyIndex<T, K> = FullKeyIndex<T, K, KeyStore<Vec<u8>>>;

/// Unique full-key index; a second record with an equal key is rejected.
pub type UniqueKeyIndex<T, K> = FullKeyIndex<T, K, UniqueKeyStore<Vec<u8>>>;

/// Index over serialized keys, backed by a key store `S`.
///
/// Handles are cheap to clone; every clone shares the same state with the
/// copy held by the stream.
pub struct FullKeyIndex<T, K, S> {
    shared: Arc<Shared<T, K, S>>,
}

struct Shared<T, K, S> {
    keys: ResolvedKeys<T, K>,
    cell: IndexCell<S>,
}

impl<T, K, S> Clone for FullKeyIndex<T, K, S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<T, K, S> FullKeyIndex<T, K, S>
where
    K: IndexKey,
    S: EntryStore<Vec<u8>>,
{
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

impl<T, K: IndexKey> KeyIndex<T, K> {
    pub fn lookup<'a>(&'a self, stream: &'a mut ObjectStream<T>) -> Result<Lookup<'a, T, K>> {
        Lookup::new(&*self.shared, stream)
    }
}

impl<T, K: IndexKey> UniqueKeyIndex<T, K> {
    pub fn lookup<'a>(&'a self, stream: &'a mut ObjectStream<T>) -> Result<UniqueLookup<'a, T, K>> {
        UniqueLookup::new(&*self.shared, stream)
    }
}

impl<T, K, S> Shared<T, K, S>
where
    K: IndexKey,
    S: EntryStore<Vec<u8>>,
{
    /// Stored values equal to `key` under the projection's comparer.
    fn equal_values(&self, store: &S, key: &K) -> Result<Vec<Vec<u8>>> {
        let bytes = self.keys.key_bytes(key)?;
        if !self.keys.has_custom_comparer() {
            return Ok(vec![bytes]);
        }
        let mut equal = Vec::new();
        for value in store.values() {
            if value == bytes || self.keys.same(&self.keys.key_from_bytes(&value)?, key) {
                equal.push(value);
            }
        }
        Ok(equal)
    }

    /// Slots whose key equals `key`, ascending.
    fn slots_of(&self, store: &S, key: &K) -> Result<Vec<u64>> {
        let mut slots = Vec::new();
        for value in self.equal_values(store, key)? {
            slots.extend(store.indices(&value));
        }
        slots.sort_unstable();
        slots.dedup();
        Ok(slots)
    }

    /// Fail if giving slot `index` the key `key` would break uniqueness.
    fn check(&self, store: &S, index: u64, key: &K) -> Result<()> {
        if !S::UNIQUE {
            return Ok(());
        }
        match self.slots_of(store, key)?.into_iter().find(|&existing| existing != index) {
            Some(existing) => Err(Error::UniqueConstraint {
                reserved_stream: self.cell.reserved_stream(),
                existing,
            }),
            None => Ok(()),
        }
    }
}

impl<T, K, S> LookupSource<T, K> for Shared<T, K, S>
where
    K: IndexKey,
    S: EntryStore<Vec<u8>>,
{
    fn check_attached(&self, stream: StreamId) -> Result<()> {
        self.cell.check_attached(stream)
    }

    fn matches(&self, stream: StreamId, _records: &mut RecordStore<T>, key: &K) -> Result<Vec<u64>> {
        self.cell.read(stream, |store| self.slots_of(store, key))?
    }

    fn keys(&self, stream: StreamId) -> Result<Vec<K>> {
        let values = self.cell.read(stream, |store| store.values())?;
        values
            .iter()
            .map(|bytes| self.keys.key_from_bytes(bytes))
            .collect()
    }
}

impl<T, K, S> StreamAttachment<T> for FullKeyIndex<T, K, S>
where
    T: 'static,
    K: IndexKey,
    S: EntryStore<Vec<u8>> + 'static,
{
    fn reserved_stream(&self) -> usize {
        self.shared.cell.reserved_stream()
    }

    fn kind(&self) -> IndexKind {
        if S::UNIQUE {
            IndexKind::UniqueKey
        } else {
            IndexKind::Key
        }
    }

    fn on_attached(&self, stream: StreamId, records: &mut RecordStore<T>, live: &[u64]) -> Result<()> {
        let shared = &self.shared;
        shared.cell.attach(stream, records, live, |store, records, live| {
            for &index in live {
                let key = shared.keys.fetch(records, index)?;
                shared.check(store, index, &key)?;
                store.insert(shared.keys.key_bytes(&key)?, index)?;
            }
            Ok(())
        })
    }

    fn on_detached(&self, stream: StreamId) {
        self.shared.cell.detach(stream);
    }

    fn on_adding(&self, _records: &mut RecordStore<T>, index: u64, item: &T) -> Result<()> {
        let shared = &self.shared;
        let key = shared.keys.key_of(item);
        shared.cell.read_unchecked(|store| shared.check(store, index, &key))
    }

    fn on_added(&self, index: u64, item: &T) -> Result<()> {
        let keys = &self.shared.keys;
        let bytes = keys.key_bytes(&keys.key_of(item))?;
        self.shared.cell.write(|store| store.insert(bytes, index))
    }

    fn on_updating(&self, _records: &mut RecordStore<T>, index: u64, _old: &T, new: &T) -> Result<()> {
        let shared = &self.shared;
        let key = shared.keys.key_of(new);
        shared.cell.read_unchecked(|store| shared.check(store, index, &key))
    }

    fn on_updated(&self, index: u64, old: &T, new: &T) -> Result<()> {
        let keys = &self.shared.keys;
        let old_bytes = keys.key_bytes(&keys.key_of(old))?;
        let new_bytes = keys.key_bytes(&keys.key_of(new))?;
        if old_bytes == new_bytes {
            return Ok(());
        }
        self.shared.cell.write(|store| {
            store.delete(&old_bytes, index);
            store.insert(new_bytes, index)
        })
    }

    fn on_removed(&self, index: u64, item: &T) -> Result<()> {
        let keys = &self.shared.keys;
        let bytes = keys.key_bytes(&keys.key_of(item))?;
        self.shared.cell.write(|store| {
            store.delete(&bytes, index);
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

#[cfg(test)]
mod tests {
    use crate::common::{Error, StoreConfig};
    use crate::index::{IndexFactory, KeyProjection};
    use crate::stream::ObjectStream;
    use serde::{Deserialize, Serialize};
    use tempfile::{tempdir, TempDir};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        email: String,
        team: String,
    }

    fn user(email: &str, team: &str) -> User {
        User {
            email: email.into(),
            team: team.into(),
        }
    }

    fn open(dir: &TempDir) -> ObjectStream<User> {
        let config = StoreConfig::builder()
            .page_size(256)
            .max_memory(1024)
            .reserved_streams(4)
            .build()
            .unwrap();
        ObjectStream::open_default(dir.path().join("users.db"), config).unwrap()
    }

    fn by_team() -> KeyProjection<User, String> {
        KeyProjection::new("team", |u: &User| u.team.clone())
    }

    fn by_email() -> KeyProjection<User, String> {
        KeyProjection::new("email", |u: &User| u.email.clone())
    }

    #[test]
    fn test_key_index_groups_records() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        let index = IndexFactory::key_index(&mut stream, 1, by_team()).unwrap();

        stream.add(&user("a@x", "red")).unwrap();
        stream.add(&user("b@x", "blue")).unwrap();
        stream.add(&user("c@x", "red")).unwrap();

        let mut lookup = index.lookup(&mut stream).unwrap();
        assert_eq!(lookup.get(&"red".to_string()).unwrap(), vec![0, 2]);
        assert!(lookup.contains(&"blue".to_string()).unwrap());
        assert!(!lookup.contains(&"green".to_string()).unwrap());
        assert_eq!(lookup.keys().unwrap().len(), 2);
    }

    #[test]
    fn test_update_moves_entry() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        let index = IndexFactory::key_index(&mut stream, 1, by_team()).unwrap();

        stream.add(&user("a@x", "red")).unwrap();
        stream.update(0, &user("a@x", "blue")).unwrap();

        let mut lookup = index.lookup(&mut stream).unwrap();
        assert!(!lookup.contains(&"red".to_string()).unwrap());
        assert_eq!(lookup.get(&"blue".to_string()).unwrap(), vec![0]);
    }

    #[test]
    fn test_compaction_renumbers() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        let index = IndexFactory::key_index(&mut stream, 1, by_team()).unwrap();

        for (email, team) in [("a@x", "red"), ("b@x", "blue"), ("c@x", "red")] {
            stream.add(&user(email, team)).unwrap();
        }
        stream.remove(0).unwrap();

        let mut lookup = index.lookup(&mut stream).unwrap();
        assert_eq!(lookup.get(&"red".to_string()).unwrap(), vec![1]);
        assert_eq!(lookup.get(&"blue".to_string()).unwrap(), vec![0]);
    }

    #[test]
    fn test_unique_conflict_leaves_one_entry() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        let index = IndexFactory::unique_key_index(&mut stream, 1, by_email()).unwrap();

        stream.add(&user("a@x", "red")).unwrap();
        let result = stream.add(&user("a@x", "blue"));
        assert!(matches!(
            result,
            Err(Error::UniqueConstraint {
                reserved_stream: 1,
                existing: 0
            })
        ));
        assert_eq!(stream.count(), 1);

        let mut lookup = index.lookup(&mut stream).unwrap();
        assert_eq!(lookup.get(&"a@x".to_string()).unwrap(), vec![0]);
        assert_eq!(lookup.find(&"a@x".to_string()).unwrap(), Some(0));
        assert_eq!(lookup.load(&"a@x".to_string()).unwrap(), Some(user("a@x", "red")));
        assert_eq!(lookup.find(&"z@x".to_string()).unwrap(), None);
    }

    #[test]
    fn test_unique_update_to_own_key_is_allowed() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        IndexFactory::unique_key_index(&mut stream, 1, by_email()).unwrap();

        stream.add(&user("a@x", "red")).unwrap();
        stream.add(&user("b@x", "red")).unwrap();
        stream.update(0, &user("a@x", "blue")).unwrap();

        assert!(matches!(
            stream.update(1, &user("a@x", "red")),
            Err(Error::UniqueConstraint { existing: 0, .. })
        ));
        assert_eq!(stream.load_item(1).unwrap(), user("b@x", "red"));
    }

    #[test]
    fn test_unique_index_honors_comparer() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        let by_folded_email = by_email().with_comparer(|a: &String, b: &String| a.eq_ignore_ascii_case(b));
        let index = IndexFactory::unique_key_index(&mut stream, 1, by_folded_email).unwrap();

        stream.add(&user("Bob@x", "red")).unwrap();
        assert!(matches!(
            stream.add(&user("bob@x", "blue")),
            Err(Error::UniqueConstraint { existing: 0, .. })
        ));
        assert_eq!(stream.count(), 1);

        // Renaming within the same equivalence class is not a conflict
        stream.update(0, &user("BOB@x", "red")).unwrap();

        let mut lookup = index.lookup(&mut stream).unwrap();
        assert_eq!(lookup.find(&"bob@X".to_string()).unwrap(), Some(0));
        assert_eq!(lookup.keys().unwrap(), vec!["BOB@x".to_string()]);
        assert_eq!(lookup.find(&"ann@x".to_string()).unwrap(), None);
    }

    #[test]
    fn test_key_index_groups_by_comparer() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        let by_folded_team = by_team().with_comparer(|a: &String, b: &String| a.eq_ignore_ascii_case(b));
        let index = IndexFactory::key_index(&mut stream, 1, by_folded_team).unwrap();

        stream.add(&user("a@x", "Red")).unwrap();
        stream.add(&user("b@x", "blue")).unwrap();
        stream.add(&user("c@x", "RED")).unwrap();

        let mut lookup = index.lookup(&mut stream).unwrap();
        assert_eq!(lookup.get(&"red".to_string()).unwrap(), vec![0, 2]);
        assert!(!lookup.contains(&"green".to_string()).unwrap());
    }

    #[test]
    fn test_rebuild_rejects_comparer_duplicates() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        stream.add(&user("ann@x", "red")).unwrap();
        stream.add(&user("ANN@x", "blue")).unwrap();

        let by_folded_email = by_email().with_comparer(|a: &String, b: &String| a.eq_ignore_ascii_case(b));
        assert!(matches!(
            IndexFactory::unique_key_index(&mut stream, 1, by_folded_email),
            Err(Error::UniqueConstraint { existing: 0, .. })
        ));
        assert!(IndexFactory::unique_key_index(&mut stream, 1, by_email()).is_ok());
    }

    #[test]
    fn test_detached_index_rejects_lookups() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        let index = IndexFactory::key_index(&mut stream, 2, by_team()).unwrap();
        assert!(index.check_attached(&stream).is_ok());

        stream.detach(2).unwrap();
        assert!(!index.is_attached());
        assert!(matches!(index.lookup(&mut stream), Err(Error::Detached(2))));
    }

    #[test]
    fn test_index_from_other_stream_is_detached() {
        let dir = tempdir().unwrap();
        let other_dir = tempdir().unwrap();
        let mut stream = open(&dir);
        let mut other = open(&other_dir);
        let index = IndexFactory::key_index(&mut stream, 1, by_team()).unwrap();

        assert!(matches!(index.lookup(&mut other), Err(Error::Detached(1))));
    }

    #[test]
    fn test_persisted_and_rebuilt() {
        let dir = tempdir().unwrap();
        {
            let mut stream = open(&dir);
            IndexFactory::key_index(&mut stream, 1, by_team()).unwrap();
            stream.add(&user("a@x", "red")).unwrap();
            stream.add(&user("b@x", "blue")).unwrap();
        }

        let mut stream = open(&dir);
        // Stream 1 was persisted; stream 3 is empty and gets rebuilt
        let loaded = IndexFactory::key_index(&mut stream, 1, by_team()).unwrap();
        let rebuilt = IndexFactory::unique_key_index(&mut stream, 3, by_email()).unwrap();

        assert_eq!(loaded.lookup(&mut stream).unwrap().get(&"blue".to_string()).unwrap(), vec![1]);
        assert_eq!(rebuilt.lookup(&mut stream).unwrap().find(&"a@x".to_string()).unwrap(), Some(0));
    }
}
