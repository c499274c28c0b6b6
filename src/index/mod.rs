//! Secondary indexes over an [`ObjectStream`](crate::stream::ObjectStream).
//!
//! # Components
//! - [`KeyIndex`] / [`UniqueKeyIndex`] - indexes over serialized keys
//! - [`KeyChecksumIndex`] / [`UniqueKeyChecksumIndex`] - indexes over 32-bit key digests
//! - [`RecyclableSlotIndex`] - freed slots awaiting reuse
//! - [`IndexFactory`] - builds an index and attaches it to a stream
//! - [`KeyProjection`] / [`IndexDefinition`] - how an index derives keys from records
//!
//! Every index persists into one reserved stream of the container it is
//! attached to, and rebuilds itself from the live records when that reserved
//! stream is empty.

mod cell;
mod checksum;
mod checksum_index;
mod factory;
mod key_index;
mod key_store;
mod lookup;
mod projection;
mod recyclable;

pub use checksum::{Crc32Checksummer, KeyChecksummer};
pub use checksum_index::{ChecksumIndex, KeyChecksumIndex, UniqueKeyChecksumIndex};
pub use factory::{Index, IndexFactory, IndexKind};
pub use key_index::{FullKeyIndex, KeyIndex, UniqueKeyIndex};
pub use key_store::{KeyStore, StoreValue, UniqueKeyStore};
pub use lookup::{Lookup, UniqueLookup};
pub use projection::{Comparer, IndexDefinition, IndexKey, KeyFetcher, KeyProjection, Projection};
pub use recyclable::RecyclableSlotIndex;
