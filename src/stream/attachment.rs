//! Stream attachments.
//!
//! An attachment is auxiliary state (an index, the recycled slot stack) that
//! lives alongside an [`ObjectStream`](crate::stream::ObjectStream) and
//! persists into one of its reserved streams. The stream drives attachments
//! through [`StreamAttachment`] hooks on every mutation.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::common::Result;
use crate::index::{IndexKind, RecyclableSlotIndex};
use crate::stream::RecordStore;

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one open [`ObjectStream`](crate::stream::ObjectStream).
///
/// Attachments remember the id of the stream they are bound to and refuse
/// to work against any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StreamId(u64);

impl StreamId {
    pub(crate) fn next() -> Self {
        Self(NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stream({})", self.0)
    }
}

/// Hooks an [`ObjectStream`](crate::stream::ObjectStream) calls on its attachments.
///
/// Mutations run in two phases. The validate hooks (`on_adding`,
/// `on_updating`) run for every attachment before any byte is written and
/// may reject the mutation. The apply hooks run afterwards and must not fail
/// for reasons the validate phase could have caught.
pub trait StreamAttachment<T>: Send + Sync {
    /// The reserved stream this attachment persists into.
    fn reserved_stream(&self) -> usize;

    fn kind(&self) -> IndexKind;

    /// Bind to `stream`, loading persisted state or rebuilding it from `live` slots.
    fn on_attached(&self, stream: StreamId, records: &mut RecordStore<T>, live: &[u64]) -> Result<()>;

    /// Unbind from `stream`. Later operations fail with `Error::Detached`.
    fn on_detached(&self, stream: StreamId);

    fn on_adding(&self, _records: &mut RecordStore<T>, _index: u64, _item: &T) -> Result<()> {
        Ok(())
    }

    fn on_added(&self, index: u64, item: &T) -> Result<()>;

    fn on_updating(&self, _records: &mut RecordStore<T>, _index: u64, _old: &T, _new: &T) -> Result<()> {
        Ok(())
    }

    fn on_updated(&self, index: u64, old: &T, new: &T) -> Result<()>;

    fn on_removed(&self, index: u64, item: &T) -> Result<()>;

    /// Slot `removed` was physically removed; every slot above it moved down by one.
    fn on_compacted(&self, removed: u64);

    /// Write pending state into the reserved stream.
    fn save(&self, records: &mut RecordStore<T>) -> Result<()>;

    fn as_recycler(&self) -> Option<&RecyclableSlotIndex> {
        None
    }
}
