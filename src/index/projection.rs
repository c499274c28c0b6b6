//! Key projections and index definitions.
//!
//! A [`KeyProjection`] describes how an index derives its key from an item,
//! plus optional overrides for how that key is serialized, checksummed,
//! compared and fetched back from the stream. [`IndexDefinition`] erases the
//! item and key types so definitions for several indexes can live in one list.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::{Endianness, Error, Result};
use crate::index::{Crc32Checksummer, IndexKind, KeyChecksummer};
use crate::serialization::{BincodeSerializer, ItemSerializer};
use crate::stream::RecordStore;

/// Keys an index can be built over.
pub trait IndexKey: Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static {}

impl<K> IndexKey for K where K: Serialize + DeserializeOwned + PartialEq + Send + Sync + 'static {}

/// Projects an item to its key.
pub type Projection<T, K> = Arc<dyn Fn(&T) -> K + Send + Sync>;

/// Key equality.
pub type Comparer<K> = Arc<dyn Fn(&K, &K) -> bool + Send + Sync>;

/// Re-derives the key of the record in a slot.
///
/// Receives the records by `&mut` borrow for the duration of one call, so an
/// index never holds on to the stream.
pub type KeyFetcher<T, K> = Arc<dyn Fn(&mut RecordStore<T>, u64) -> Result<K> + Send + Sync>;

/// How an index derives and handles the key of an item.
///
/// # Example
/// ```
/// use pagestore::index::KeyProjection;
///
/// struct User { email: String }
///
/// let projection = KeyProjection::new("email", |user: &User| user.email.clone());
/// assert_eq!(projection.member(), "email");
/// assert!(projection.declaring_type().ends_with("User"));
/// ```
pub struct KeyProjection<T, K> {
    declaring_type: &'static str,
    key_type: &'static str,
    member: String,
    projection: Projection<T, K>,
    serializer: Option<Arc<dyn ItemSerializer<K>>>,
    checksummer: Option<Arc<dyn KeyChecksummer<K>>>,
    comparer: Option<Comparer<K>>,
    fetcher: Option<KeyFetcher<T, K>>,
}

impl<T, K> Clone for KeyProjection<T, K> {
    fn clone(&self) -> Self {
        Self {
            declaring_type: self.declaring_type,
            key_type: self.key_type,
            member: self.member.clone(),
            projection: self.projection.clone(),
            serializer: self.serializer.clone(),
            checksummer: self.checksummer.clone(),
            comparer: self.comparer.clone(),
            fetcher: self.fetcher.clone(),
        }
    }
}

impl<T, K> fmt::Debug for KeyProjection<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyProjection")
            .field("declaring_type", &self.declaring_type)
            .field("key_type", &self.key_type)
            .field("member", &self.member)
            .finish_non_exhaustive()
    }
}

impl<T: 'static, K: 'static> KeyProjection<T, K> {
    pub fn new<F>(member: impl Into<String>, projection: F) -> Self
    where
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        Self {
            declaring_type: type_name::<T>(),
            key_type: type_name::<K>(),
            member: member.into(),
            projection: Arc::new(projection),
            serializer: None,
            checksummer: None,
            comparer: None,
            fetcher: None,
        }
    }

    /// Serialize keys with `serializer` instead of bincode.
    pub fn with_serializer(mut self, serializer: impl ItemSerializer<K> + 'static) -> Self {
        self.serializer = Some(Arc::new(serializer));
        self
    }

    /// Digest keys with `checksummer` instead of CRC32.
    pub fn with_checksummer(mut self, checksummer: impl KeyChecksummer<K> + 'static) -> Self {
        self.checksummer = Some(Arc::new(checksummer));
        self
    }

    /// Compare keys with `comparer` instead of `PartialEq`.
    pub fn with_comparer<F>(mut self, comparer: F) -> Self
    where
        F: Fn(&K, &K) -> bool + Send + Sync + 'static,
    {
        self.comparer = Some(Arc::new(comparer));
        self
    }

    /// Fetch keys with `fetcher` instead of loading and projecting the item.
    pub fn with_fetcher<F>(mut self, fetcher: F) -> Self
    where
        F: Fn(&mut RecordStore<T>, u64) -> Result<K> + Send + Sync + 'static,
    {
        self.fetcher = Some(Arc::new(fetcher));
        self
    }

    pub fn member(&self) -> &str {
        &self.member
    }

    pub fn declaring_type(&self) -> &'static str {
        self.declaring_type
    }

    pub fn key_type(&self) -> &'static str {
        self.key_type
    }

    pub fn project(&self, item: &T) -> K {
        (self.projection)(item)
    }

    /// Fill in every collaborator that was not overridden.
    pub(crate) fn resolve(self, endianness: Endianness) -> ResolvedKeys<T, K>
    where
        K: IndexKey,
    {
        let serializer: Arc<dyn ItemSerializer<K>> = match self.serializer {
            Some(serializer) => serializer,
            None => Arc::new(BincodeSerializer::<K>::new(endianness)),
        };

        let checksummer: Arc<dyn KeyChecksummer<K>> = match self.checksummer {
            Some(checksummer) => checksummer,
            None => Arc::new(Crc32Checksummer::new(serializer.clone())),
        };

        let custom_comparer = self.comparer.is_some();
        let comparer: Comparer<K> = match self.comparer {
            Some(comparer) => comparer,
            None => Arc::new(|a: &K, b: &K| a == b),
        };

        let fetcher: KeyFetcher<T, K> = match self.fetcher {
            Some(fetcher) => fetcher,
            None => {
                let projection = self.projection.clone();
                Arc::new(move |records: &mut RecordStore<T>, index: u64| -> Result<K> {
                    let item = records.load_item(index)?;
                    Ok(projection(&item))
                })
            }
        };

        ResolvedKeys {
            projection: self.projection,
            serializer,
            checksummer,
            comparer,
            custom_comparer,
            fetcher,
        }
    }
}

/// A projection with every collaborator filled in.
pub(crate) struct ResolvedKeys<T, K> {
    projection: Projection<T, K>,
    serializer: Arc<dyn ItemSerializer<K>>,
    checksummer: Arc<dyn KeyChecksummer<K>>,
    comparer: Comparer<K>,
    custom_comparer: bool,
    fetcher: KeyFetcher<T, K>,
}

impl<T, K> ResolvedKeys<T, K> {
    #[inline]
    pub fn key_of(&self, item: &T) -> K {
        (self.projection)(item)
    }

    pub fn key_bytes(&self, key: &K) -> Result<Vec<u8>> {
        self.serializer.serialize_to_vec(key)
    }

    pub fn key_from_bytes(&self, bytes: &[u8]) -> Result<K> {
        self.serializer.deserialize(bytes)
    }

    pub fn checksum(&self, key: &K) -> Result<u32> {
        self.checksummer.checksum(key)
    }

    pub fn fetch(&self, records: &mut RecordStore<T>, index: u64) -> Result<K> {
        (self.fetcher)(records, index)
    }

    #[inline]
    pub fn same(&self, a: &K, b: &K) -> bool {
        (self.comparer)(a, b)
    }

    /// Whether keys with different bytes may still compare equal.
    #[inline]
    pub fn has_custom_comparer(&self) -> bool {
        self.custom_comparer
    }
}

/// A type-erased description of one index.
///
/// # Example
/// ```
/// use pagestore::index::{IndexDefinition, IndexKind, KeyProjection};
///
/// let definitions = vec![
///     IndexDefinition::recyclable(0),
///     IndexDefinition::new(IndexKind::UniqueKey, 1, KeyProjection::new("len", |s: &String| s.len() as u32)),
///     IndexDefinition::new(IndexKind::KeyChecksum, 2, KeyProjection::new("text", |s: &String| s.clone())),
/// ];
/// assert_eq!(definitions[1].key_type(), Some("u32"));
/// ```
pub struct IndexDefinition {
    kind: IndexKind,
    reserved_stream: usize,
    declaring_type: Option<&'static str>,
    key_type: Option<&'static str>,
    projection: Option<Box<dyn Any + Send + Sync>>,
}

impl IndexDefinition {
    pub fn new<T: 'static, K: 'static>(
        kind: IndexKind,
        reserved_stream: usize,
        projection: KeyProjection<T, K>,
    ) -> Self {
        Self {
            kind,
            reserved_stream,
            declaring_type: Some(projection.declaring_type()),
            key_type: Some(projection.key_type()),
            projection: Some(Box::new(projection)),
        }
    }

    /// A recyclable slot index; it has no key.
    pub fn recyclable(reserved_stream: usize) -> Self {
        Self {
            kind: IndexKind::RecyclableSlot,
            reserved_stream,
            declaring_type: None,
            key_type: None,
            projection: None,
        }
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn reserved_stream(&self) -> usize {
        self.reserved_stream
    }

    pub fn declaring_type(&self) -> Option<&'static str> {
        self.declaring_type
    }

    pub fn key_type(&self) -> Option<&'static str> {
        self.key_type
    }

    /// Check the declared item type against `item_type`.
    pub(crate) fn check_declaring_type(&self, item_type: &'static str) -> Result<()> {
        match self.declaring_type {
            Some(found) if found != item_type => Err(Error::TypeMismatch {
                expected: item_type,
                found,
            }),
            _ => Ok(()),
        }
    }

    /// Recover the typed projection.
    pub(crate) fn into_projection<T: 'static, K: 'static>(self) -> Result<KeyProjection<T, K>> {
        let projection = self.projection.ok_or_else(|| {
            Error::InvalidArgument(format!("{} index needs a key projection", self.kind))
        })?;

        projection
            .downcast::<KeyProjection<T, K>>()
            .map(|projection| *projection)
            .map_err(|_| Error::TypeMismatch {
                expected: type_name::<K>(),
                found: self.key_type.unwrap_or("<none>"),
            })
    }
}

impl fmt::Debug for IndexDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexDefinition")
            .field("kind", &self.kind)
            .field("reserved_stream", &self.reserved_stream)
            .field("declaring_type", &self.declaring_type)
            .field("key_type", &self.key_type)
            .finish()
    }
}
