//! pagestore - an embedded object store over a paged file.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                           pagestore                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │                 Indexes (index/)                         │   │
//! │  │   Key | UniqueKey | KeyChecksum | UniqueKeyChecksum      │   │
//! │  │          RecyclableSlot + IndexFactory                   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓ attachment hooks                 │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Object stream (stream/)                    │   │
//! │  │   ObjectStream → RecordStore → ContainerHeader           │   │
//! │  │   slots, size descriptors, reserved streams              │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │            Paged file buffer (buffer/)                   │   │
//! │  │   PagedFileBuffer + Frame + LRU replacer + BufferStats   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                              ↓                                  │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │               Storage (storage/)                         │   │
//! │  │          DiskManager + BoundedStream                     │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, FrameId, Error, config)
//! - [`storage`] - File I/O
//! - [`buffer`] - The paged file buffer and its eviction policy
//! - [`sizing`] - Item sizes and record length prefixes
//! - [`serialization`] - Item serializers
//! - [`stream`] - The container format and [`ObjectStream`]
//! - [`index`] - Secondary indexes and slot recycling
//!
//! # Quick Start
//! ```no_run
//! use pagestore::{ObjectStream, StoreConfig};
//!
//! let mut names: ObjectStream<String> =
//!     ObjectStream::open_default("names.db", StoreConfig::default()).unwrap();
//!
//! let slot = names.add(&"ada".to_string()).unwrap();
//! assert_eq!(names.load_item(slot).unwrap(), "ada");
//! names.flush().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod serialization;
pub mod sizing;
pub mod storage;
pub mod stream;

// Re-export commonly used items at crate root for convenience
pub use common::config::DEFAULT_PAGE_SIZE;
pub use common::{Endianness, Error, FrameId, PageId, Result, StoreConfig};

pub use buffer::{BufferStats, PagedFileBuffer, StatsSnapshot};
pub use index::{
    Index, IndexDefinition, IndexFactory, IndexKind, KeyChecksumIndex, KeyIndex, KeyProjection, RecyclableSlotIndex,
    UniqueKeyChecksumIndex, UniqueKeyIndex,
};
pub use serialization::{BincodeSerializer, FixedWidthSerializer, ItemSerializer};
pub use stream::{ItemSizing, ObjectStream};
