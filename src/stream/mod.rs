//! Object streams - typed records over a paged file.
//!
//! - [`ContainerHeader`] - the fixed header at the start of every store file
//! - [`RecordStore`] - slot layout, size descriptors and reserved streams
//! - [`ObjectStream`] - logical-index access plus attachment hooks
//! - [`StreamAttachment`] - the hooks indexes implement

mod attachment;
mod header;
mod object_stream;
mod record_store;

pub use attachment::{StreamAttachment, StreamId};
pub use header::{ContainerHeader, FORMAT_VERSION, MAGIC};
pub use object_stream::{ObjectStream, Records};
pub use record_store::{ItemSizing, RecordStore};
