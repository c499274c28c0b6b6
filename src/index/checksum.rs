//! Key checksummers.

use std::sync::Arc;

use crate::common::Result;
use crate::serialization::ItemSerializer;

/// Compresses a key to a 32-bit digest.
///
/// Distinct keys may share a digest; checksum indexes resolve such
/// collisions by fetching the candidate records and comparing true keys.
pub trait KeyChecksummer<K>: Send + Sync {
    fn checksum(&self, key: &K) -> Result<u32>;
}

impl<K, F> KeyChecksummer<K> for F
where
    F: Fn(&K) -> u32 + Send + Sync,
{
    fn checksum(&self, key: &K) -> Result<u32> {
        Ok(self(key))
    }
}

/// CRC32 over the serialized key.
///
/// The key serializer carries the stream's byte order, so digests agree
/// with the bytes a full-key index would store.
pub struct Crc32Checksummer<K> {
    serializer: Arc<dyn ItemSerializer<K>>,
}

impl<K> Crc32Checksummer<K> {
    pub fn new(serializer: Arc<dyn ItemSerializer<K>>) -> Self {
        Self { serializer }
    }
}

impl<K> KeyChecksummer<K> for Crc32Checksummer<K> {
    fn checksum(&self, key: &K) -> Result<u32> {
        let bytes = self.serializer.serialize_to_vec(key)?;
        Ok(crc32fast::hash(&bytes))
    }
}
