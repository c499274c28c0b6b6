//! Error types for pagestore.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in pagestore.
///
/// Variants fall into a handful of families:
/// - precondition violations, raised before anything is mutated
/// - integrity errors, after which the file (or the slot) must be treated as invalid
/// - uniqueness conflicts from unique indexes
/// - unsupported operations and detached attachments
#[derive(Debug, Error)]
pub enum Error {
    // -------------------------------------------------------------------------
    // I/O and encoding
    // -------------------------------------------------------------------------
    /// I/O error from file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An item or key could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Preconditions
    // -------------------------------------------------------------------------
    /// An argument was empty, zero, or otherwise out of its allowed domain.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A byte or record index lies outside the addressed range.
    #[error("Index {index} out of range (length {len})")]
    IndexOutOfRange { index: u64, len: u64 },

    /// An index projection was declared for a different item type than the stream holds.
    #[error("Type mismatch: stream holds `{expected}` but projection is declared on `{found}`")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Two attachments tried to persist into the same reserved stream.
    #[error("Reserved stream {0} is already in use")]
    ReservedStreamInUse(usize),

    /// The store was opened read-only and a mutation was attempted.
    #[error("Store is read-only")]
    ReadOnly,

    // -------------------------------------------------------------------------
    // Integrity
    // -------------------------------------------------------------------------
    /// The file and the in-memory accounting have diverged.
    #[error("Corrupted store: {0}")]
    Corrupted(String),

    /// The slot was freed and is awaiting reuse.
    #[error("Slot {0} has been recycled")]
    RecycledSlot(u64),

    // -------------------------------------------------------------------------
    // Index semantics
    // -------------------------------------------------------------------------
    /// A unique index already maps an equal key to another record.
    #[error("Unique constraint violated on reserved stream {reserved_stream}: key already held by record {existing}")]
    UniqueConstraint { reserved_stream: usize, existing: u64 },

    /// The operation cannot be performed by this kind of index.
    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    /// The attachment is not bound to the stream it was handed.
    #[error("Attachment on reserved stream {0} is not attached to this stream")]
    Detached(usize),
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(e) => Error::Io(e),
            other => Error::Serialization(other.to_string()),
        }
    }
}
