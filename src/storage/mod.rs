//! Storage layer - file I/O.
//!
//! This module handles persistent storage:
//! - [`DiskManager`] - page-granular reads, writes and truncation of the backing file
//! - [`BoundedStream`] - a page-sized window onto the file

mod bounded_stream;
mod disk_manager;

pub use bounded_stream::BoundedStream;
pub use disk_manager::DiskManager;
