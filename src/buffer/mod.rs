//! Paged file buffer.
//!
//! The paged buffer presents one file as a contiguous byte buffer while
//! keeping only a bounded number of pages in memory.
//!
//! # Components
//! - [`PagedFileBuffer`] - byte-addressable buffer over the file
//! - [`Page`] - descriptor of the byte range a page covers
//! - [`Frame`] - a cache slot holding one resident page
//! - [`BufferStats`] - cache statistics
//! - [`replacer`] - eviction policy

mod frame;
mod page;
mod paged_file_buffer;
pub mod replacer;
mod stats;

pub use frame::Frame;
pub use page::{Page, PageState};
pub use paged_file_buffer::PagedFileBuffer;
pub use stats::{BufferStats, StatsSnapshot};
