//! Shared, attach-checked state of one attachment.

use parking_lot::RwLock;
use tracing::debug;

use crate::common::{Error, Result};
use crate::index::key_store::PersistedStore;
use crate::stream::{RecordStore, StreamId};

/// Persisted store plus the binding to the stream it belongs to.
///
/// Every access names the stream it is made on behalf of and fails with
/// `Error::Detached` unless that is the stream the cell is bound to.
pub(crate) struct IndexCell<S> {
    reserved_stream: usize,
    state: RwLock<CellState<S>>,
}

struct CellState<S> {
    attached_to: Option<StreamId>,
    dirty: bool,
    store: S,
}

impl<S: PersistedStore> IndexCell<S> {
    pub fn new(reserved_stream: usize) -> Self {
        Self {
            reserved_stream,
            state: RwLock::new(CellState {
                attached_to: None,
                dirty: false,
                store: S::empty(reserved_stream),
            }),
        }
    }

    #[inline]
    pub fn reserved_stream(&self) -> usize {
        self.reserved_stream
    }

    pub fn is_attached(&self) -> bool {
        self.state.read().attached_to.is_some()
    }

    pub fn check_attached(&self, stream: StreamId) -> Result<()> {
        if self.state.read().attached_to == Some(stream) {
            Ok(())
        } else {
            Err(Error::Detached(self.reserved_stream))
        }
    }

    /// Read the store on behalf of `stream`.
    pub fn read<R>(&self, stream: StreamId, f: impl FnOnce(&S) -> R) -> Result<R> {
        let state = self.state.read();
        if state.attached_to != Some(stream) {
            return Err(Error::Detached(self.reserved_stream));
        }
        Ok(f(&state.store))
    }

    /// Read the store without an attachment check; for the owning stream's own bookkeeping.
    pub fn read_unchecked<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.state.read().store)
    }

    /// Mutate the store on behalf of whichever stream it is attached to.
    pub fn write<R>(&self, f: impl FnOnce(&mut S) -> Result<R>) -> Result<R> {
        let mut state = self.state.write();
        if state.attached_to.is_none() {
            return Err(Error::Detached(self.reserved_stream));
        }
        let result = f(&mut state.store)?;
        state.dirty = true;
        Ok(result)
    }

    /// Bind to `stream`, loading the reserved stream.
    ///
    /// An empty reserved stream over a non-empty record set calls `rebuild`.
    pub fn attach<T>(
        &self,
        stream: StreamId,
        records: &mut RecordStore<T>,
        live: &[u64],
        rebuild: impl FnOnce(&mut S, &mut RecordStore<T>, &[u64]) -> Result<()>,
    ) -> Result<()> {
        if self.is_attached() {
            return Err(Error::InvalidArgument(format!(
                "attachment on reserved stream {} is already attached",
                self.reserved_stream
            )));
        }

        let bytes = records.read_reserved(self.reserved_stream)?;
        let (store, dirty) = if !bytes.is_empty() {
            let store = S::decode(self.reserved_stream, records.endianness(), &bytes)?;
            (store, false)
        } else if !live.is_empty() {
            let mut store = S::empty(self.reserved_stream);
            rebuild(&mut store, records, live)?;
            debug!(reserved = self.reserved_stream, records = live.len(), "rebuilt index");
            (store, true)
        } else {
            (S::empty(self.reserved_stream), false)
        };

        let mut state = self.state.write();
        state.store = store;
        state.dirty = dirty;
        state.attached_to = Some(stream);
        Ok(())
    }

    pub fn detach(&self, stream: StreamId) {
        let mut state = self.state.write();
        if state.attached_to == Some(stream) {
            state.attached_to = None;
        }
    }

    /// Write the store into its reserved stream if it changed.
    pub fn save<T>(&self, records: &mut RecordStore<T>) -> Result<()> {
        if records.is_read_only() {
            return Ok(());
        }

        let mut state = self.state.write();
        if !state.dirty {
            return Ok(());
        }
        let bytes = state.store.encode(records.endianness())?;
        records.write_reserved(self.reserved_stream, &bytes)?;
        state.dirty = false;
        Ok(())
    }

    pub fn renumber_after(&self, removed: u64) {
        let mut state = self.state.write();
        state.store.renumber_after(removed);
        state.dirty = true;
    }
}
