//! Index construction.
//!
//! [`IndexFactory`] builds an index from a key projection, binds it to a
//! stream and returns the caller's handle. The stream keeps its own clone
//! and drives it on every mutation.

use std::fmt;

use tracing::debug;

use crate::common::{Error, Result};
use crate::index::checksum_index::{KeyChecksumIndex, UniqueKeyChecksumIndex};
use crate::index::key_index::{KeyIndex, UniqueKeyIndex};
use crate::index::projection::{IndexDefinition, IndexKey, KeyProjection, ResolvedKeys};
use crate::index::recyclable::RecyclableSlotIndex;
use crate::stream::ObjectStream;

/// The index kinds a stream can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndexKind {
    /// Serialized keys, many records per key.
    Key,
    /// Serialized keys, one record per key.
    UniqueKey,
    /// Key digests, many records per key.
    KeyChecksum,
    /// Key digests, one record per key.
    UniqueKeyChecksum,
    /// Freed slots awaiting reuse.
    RecyclableSlot,
}

impl IndexKind {
    /// Whether the kind is looked up by key.
    pub fn is_keyed(&self) -> bool {
        !matches!(self, IndexKind::RecyclableSlot)
    }

    pub fn is_unique(&self) -> bool {
        matches!(self, IndexKind::UniqueKey | IndexKind::UniqueKeyChecksum)
    }
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndexKind::Key => "key",
            IndexKind::UniqueKey => "unique key",
            IndexKind::KeyChecksum => "key checksum",
            IndexKind::UniqueKeyChecksum => "unique key checksum",
            IndexKind::RecyclableSlot => "recyclable slot",
        };
        f.write_str(name)
    }
}

/// An index of any kind, as built from an [`IndexDefinition`].
pub enum Index<T, K> {
    Key(KeyIndex<T, K>),
    UniqueKey(UniqueKeyIndex<T, K>),
    KeyChecksum(KeyChecksumIndex<T, K>),
    UniqueKeyChecksum(UniqueKeyChecksumIndex<T, K>),
    RecyclableSlot(RecyclableSlotIndex),
}

impl<T, K: IndexKey> Index<T, K> {
    pub fn kind(&self) -> IndexKind {
        match self {
            Index::Key(_) => IndexKind::Key,
            Index::UniqueKey(_) => IndexKind::UniqueKey,
            Index::KeyChecksum(_) => IndexKind::KeyChecksum,
            Index::UniqueKeyChecksum(_) => IndexKind::UniqueKeyChecksum,
            Index::RecyclableSlot(_) => IndexKind::RecyclableSlot,
        }
    }

    pub fn reserved_stream(&self) -> usize {
        match self {
            Index::Key(index) => index.reserved_stream(),
            Index::UniqueKey(index) => index.reserved_stream(),
            Index::KeyChecksum(index) => index.reserved_stream(),
            Index::UniqueKeyChecksum(index) => index.reserved_stream(),
            Index::RecyclableSlot(index) => index.reserved_stream(),
        }
    }
}

/// Builds indexes and attaches them to a stream.
///
/// # Example
/// ```no_run
/// use pagestore::index::{IndexFactory, KeyProjection};
/// use pagestore::{ObjectStream, StoreConfig};
///
/// # fn main() -> pagestore::Result<()> {
/// let mut words: ObjectStream<String> = ObjectStream::open_default("words.db", StoreConfig::default())?;
/// IndexFactory::recyclable_slot_index(&mut words, 0)?;
/// let by_text = IndexFactory::unique_key_index(&mut words, 1, KeyProjection::new("text", |s: &String| s.clone()))?;
///
/// let slot = words.add(&"hello".to_string())?;
/// assert_eq!(by_text.lookup(&mut words)?.find(&"hello".to_string())?, Some(slot));
/// # Ok(())
/// # }
/// ```
pub struct IndexFactory;

impl IndexFactory {
    pub fn key_index<T: 'static, K: IndexKey>(
        stream: &mut ObjectStream<T>,
        reserved_stream: usize,
        projection: KeyProjection<T, K>,
    ) -> Result<KeyIndex<T, K>> {
        let index = KeyIndex::new(reserved_stream, Self::resolve(stream, projection)?);
        stream.attach(Box::new(index.clone()))?;
        Ok(index)
    }

    pub fn unique_key_index<T: 'static, K: IndexKey>(
        stream: &mut ObjectStream<T>,
        reserved_stream: usize,
        projection: KeyProjection<T, K>,
    ) -> Result<UniqueKeyIndex<T, K>> {
        let index = UniqueKeyIndex::new(reserved_stream, Self::resolve(stream, projection)?);
        stream.attach(Box::new(index.clone()))?;
        Ok(index)
    }

    pub fn key_checksum_index<T: 'static, K: IndexKey>(
        stream: &mut ObjectStream<T>,
        reserved_stream: usize,
        projection: KeyProjection<T, K>,
    ) -> Result<KeyChecksumIndex<T, K>> {
        let index = KeyChecksumIndex::new(reserved_stream, Self::resolve(stream, projection)?);
        stream.attach(Box::new(index.clone()))?;
        Ok(index)
    }

    pub fn unique_key_checksum_index<T: 'static, K: IndexKey>(
        stream: &mut ObjectStream<T>,
        reserved_stream: usize,
        projection: KeyProjection<T, K>,
    ) -> Result<UniqueKeyChecksumIndex<T, K>> {
        let index = UniqueKeyChecksumIndex::new(reserved_stream, Self::resolve(stream, projection)?);
        stream.attach(Box::new(index.clone()))?;
        Ok(index)
    }

    /// Attach a recyclable slot index. Attach it before any keyed index.
    pub fn recyclable_slot_index<T: 'static>(
        stream: &mut ObjectStream<T>,
        reserved_stream: usize,
    ) -> Result<RecyclableSlotIndex> {
        let index = RecyclableSlotIndex::new(reserved_stream);
        stream.attach(Box::new(index.clone()))?;
        Ok(index)
    }

    /// Build and attach the index `definition` describes.
    ///
    /// # Errors
    /// `Error::TypeMismatch` if the definition was declared for another item
    /// type or with a key type other than `K`.
    pub fn create<T: 'static, K: IndexKey>(
        stream: &mut ObjectStream<T>,
        definition: IndexDefinition,
    ) -> Result<Index<T, K>> {
        definition.check_declaring_type(stream.item_type_name())?;
        let kind = definition.kind();
        let reserved = definition.reserved_stream();
        debug!(kind = %kind, reserved, "creating index from definition");

        match kind {
            IndexKind::RecyclableSlot => Self::recyclable_slot_index(stream, reserved).map(Index::RecyclableSlot),
            IndexKind::Key => Self::key_index(stream, reserved, definition.into_projection()?).map(Index::Key),
            IndexKind::UniqueKey => {
                Self::unique_key_index(stream, reserved, definition.into_projection()?).map(Index::UniqueKey)
            }
            IndexKind::KeyChecksum => {
                Self::key_checksum_index(stream, reserved, definition.into_projection()?).map(Index::KeyChecksum)
            }
            IndexKind::UniqueKeyChecksum => {
                Self::unique_key_checksum_index(stream, reserved, definition.into_projection()?)
                    .map(Index::UniqueKeyChecksum)
            }
        }
    }

    fn resolve<T: 'static, K: IndexKey>(
        stream: &ObjectStream<T>,
        projection: KeyProjection<T, K>,
    ) -> Result<ResolvedKeys<T, K>> {
        let expected = stream.item_type_name();
        let found = projection.declaring_type();
        if expected != found {
            return Err(Error::TypeMismatch { expected, found });
        }
        Ok(projection.resolve(stream.endianness()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::StoreConfig;
    use tempfile::{tempdir, TempDir};

    fn open(dir: &TempDir) -> ObjectStream<String> {
        let config = StoreConfig::builder()
            .page_size(256)
            .max_memory(1024)
            .reserved_streams(5)
            .build()
            .unwrap();
        ObjectStream::open_default(dir.path().join("factory.db"), config).unwrap()
    }

    fn text() -> KeyProjection<String, String> {
        KeyProjection::new("text", |s: &String| s.clone())
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(IndexKind::UniqueKeyChecksum.to_string(), "unique key checksum");
        assert!(IndexKind::UniqueKey.is_unique());
        assert!(!IndexKind::RecyclableSlot.is_keyed());
    }

    #[test]
    fn test_create_every_kind() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);

        let definitions = vec![
            IndexDefinition::recyclable(0),
            IndexDefinition::new(IndexKind::Key, 1, text()),
            IndexDefinition::new(IndexKind::UniqueKey, 2, text()),
            IndexDefinition::new(IndexKind::KeyChecksum, 3, text()),
            IndexDefinition::new(IndexKind::UniqueKeyChecksum, 4, text()),
        ];
        let expected: Vec<IndexKind> = definitions.iter().map(|d| d.kind()).collect();

        let mut kinds = Vec::new();
        for definition in definitions {
            let index = IndexFactory::create::<String, String>(&mut stream, definition).unwrap();
            kinds.push(index.kind());
        }
        assert_eq!(kinds, expected);
        assert_eq!(stream.attached_streams(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_projection_for_other_type_is_rejected() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);

        let projection = KeyProjection::new("len", |v: &Vec<u8>| v.len());
        let definition = IndexDefinition::new(IndexKind::Key, 1, projection);
        assert!(matches!(
            IndexFactory::create::<String, usize>(&mut stream, definition),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(stream.attached_streams().is_empty());
    }

    #[test]
    fn test_wrong_key_type_is_rejected() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);

        let definition = IndexDefinition::new(IndexKind::Key, 1, text());
        assert!(matches!(
            IndexFactory::create::<String, u32>(&mut stream, definition),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_index_lookup_through_handle() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        let index = IndexFactory::key_index(&mut stream, 1, text()).unwrap();

        stream.add(&"a".to_string()).unwrap();
        stream.add(&"b".to_string()).unwrap();
        stream.add(&"a".to_string()).unwrap();

        let mut lookup = index.lookup(&mut stream).unwrap();
        assert_eq!(lookup.get(&"a".to_string()).unwrap(), vec![0, 2]);
        assert_eq!(lookup.keys().unwrap().len(), 2);
    }
}
