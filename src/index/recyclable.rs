//! Recyclable slot index.
//!
//! Tracks slots whose records were removed so the stream can hand them out
//! again instead of compacting. The most recently freed slot is reused first.

use std::collections::HashSet;
use std::sync::Arc;

use crate::common::{Endianness, Error, Result};
use crate::index::cell::IndexCell;
use crate::index::key_store::PersistedStore;
use crate::index::IndexKind;
use crate::serialization::{decode_with, encode_with};
use crate::stream::{ObjectStream, RecordStore, StreamAttachment, StreamId};

/// Stack of freed slots.
#[derive(Debug, Clone, Default)]
pub(crate) struct SlotStack {
    stack: Vec<u64>,
    members: HashSet<u64>,
}

impl SlotStack {
    fn push(&mut self, index: u64) {
        if self.members.insert(index) {
            self.stack.push(index);
        }
    }

    fn take(&mut self, index: u64) -> bool {
        if !self.members.remove(&index) {
            return false;
        }
        // Reuse almost always takes the top.
        if let Some(position) = self.stack.iter().rposition(|&i| i == index) {
            self.stack.remove(position);
        }
        true
    }

    fn peek(&self) -> Option<u64> {
        self.stack.last().copied()
    }

    fn holds(&self, index: u64) -> bool {
        self.members.contains(&index)
    }
}

impl PersistedStore for SlotStack {
    fn empty(_reserved_stream: usize) -> Self {
        Self::default()
    }

    fn encode(&self, endianness: Endianness) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        encode_with(endianness, &mut bytes, &self.stack)?;
        Ok(bytes)
    }

    fn decode(reserved_stream: usize, endianness: Endianness, bytes: &[u8]) -> Result<Self> {
        let stack: Vec<u64> = decode_with(endianness, bytes)?;
        let mut members = HashSet::with_capacity(stack.len());
        for &index in &stack {
            if !members.insert(index) {
                return Err(Error::Corrupted(format!(
                    "slot {} recycled twice in reserved stream {}",
                    index, reserved_stream
                )));
            }
        }
        Ok(Self { stack, members })
    }

    fn renumber_after(&mut self, removed: u64) {
        self.members.remove(&removed);
        self.stack.retain(|&i| i != removed);
        for index in &mut self.stack {
            if *index > removed {
                *index -= 1;
            }
        }
        self.members = self.stack.iter().copied().collect();
    }
}

/// The set of recycled slots of one stream.
///
/// At most one may be attached to a stream. While attached, removals leave
/// holes that later adds fill, most recent first.
#[derive(Clone)]
pub struct RecyclableSlotIndex {
    cell: Arc<IndexCell<SlotStack>>,
}

impl RecyclableSlotIndex {
    pub(crate) fn new(reserved_stream: usize) -> Self {
        Self {
            cell: Arc::new(IndexCell::new(reserved_stream)),
        }
    }

    pub fn reserved_stream(&self) -> usize {
        self.cell.reserved_stream()
    }

    pub fn is_attached(&self) -> bool {
        self.cell.is_attached()
    }

    pub fn check_attached<T>(&self, stream: &ObjectStream<T>) -> Result<()> {
        self.cell.check_attached(stream.id())
    }

    /// Recycled slots, next to be reused first.
    pub fn free_slots<T>(&self, stream: &ObjectStream<T>) -> Result<Vec<u64>> {
        self.cell
            .read(stream.id(), |slots| slots.stack.iter().rev().copied().collect())
    }

    /// True if slot `index` is waiting to be reused.
    pub fn contains<T>(&self, stream: &ObjectStream<T>, index: u64) -> Result<bool> {
        self.cell.read(stream.id(), |slots| slots.holds(index))
    }

    pub(crate) fn peek_unchecked(&self) -> Option<u64> {
        self.cell.read_unchecked(SlotStack::peek)
    }

    pub(crate) fn holds_unchecked(&self, index: u64) -> bool {
        self.cell.read_unchecked(|slots| slots.holds(index))
    }

    pub(crate) fn len_unchecked(&self) -> usize {
        self.cell.read_unchecked(|slots| slots.stack.len())
    }
}

impl<T> StreamAttachment<T> for RecyclableSlotIndex {
    fn reserved_stream(&self) -> usize {
        self.cell.reserved_stream()
    }

    fn kind(&self) -> IndexKind {
        IndexKind::RecyclableSlot
    }

    fn on_attached(&self, stream: StreamId, records: &mut RecordStore<T>, _live: &[u64]) -> Result<()> {
        // Holes cannot be told apart from records once the stack is lost.
        self.cell.attach(stream, records, &[], |_, _, _| Ok(()))?;
        let count = records.count();
        let (len, beyond) = self.cell.read_unchecked(|slots| {
            (slots.stack.len(), slots.stack.iter().copied().find(|&i| i >= count))
        });
        let problem = match beyond {
            Some(index) => Some(format!("recycled slot {} is beyond the {} stored records", index, count)),
            None if len == 0 && records.has_recycled_slots() => Some(format!(
                "file has recycled slots but reserved stream {} lists none",
                self.cell.reserved_stream()
            )),
            None => None,
        };
        if let Some(problem) = problem {
            self.cell.detach(stream);
            return Err(Error::Corrupted(problem));
        }
        Ok(())
    }

    fn on_detached(&self, stream: StreamId) {
        self.cell.detach(stream);
    }

    fn on_added(&self, index: u64, _item: &T) -> Result<()> {
        if !self.holds_unchecked(index) {
            return Ok(());
        }
        self.cell.write(|slots| {
            slots.take(index);
            Ok(())
        })
    }

    fn on_updated(&self, _index: u64, _old: &T, _new: &T) -> Result<()> {
        Ok(())
    }

    fn on_removed(&self, index: u64, _item: &T) -> Result<()> {
        self.cell.write(|slots| {
            slots.push(index);
            Ok(())
        })
    }

    fn on_compacted(&self, removed: u64) {
        self.cell.renumber_after(removed);
    }

    fn save(&self, records: &mut RecordStore<T>) -> Result<()> {
        self.cell.save(records)?;
        if !records.is_read_only() {
            records.set_recycled_slots(self.len_unchecked() > 0);
        }
        Ok(())
    }

    fn as_recycler(&self) -> Option<&RecyclableSlotIndex> {
        Some(self)
    }
}
