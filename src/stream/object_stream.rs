//! Object Stream - typed records addressed by logical index.

use std::any::type_name;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::buffer::{BufferStats, PagedFileBuffer};
use crate::common::{Endianness, Error, Result, StoreConfig};
use crate::index::RecyclableSlotIndex;
use crate::serialization::{BincodeSerializer, ItemSerializer};
use crate::stream::{ItemSizing, RecordStore, StreamAttachment, StreamId};

/// A file of typed records plus the attachments that index them.
///
/// # Slots
/// `add` returns the logical index of the new record. When a
/// [`RecyclableSlotIndex`] is attached, `remove` leaves a hole that the next
/// `add` reuses (most recently freed first). Without one, `remove` compacts
/// the stream: every later record moves down by one and every attachment
/// renumbers.
///
/// # Attachments
/// Indexes are attached through [`IndexFactory`](crate::index::IndexFactory)
/// and persist into reserved streams on [`flush`](Self::flush). Attach the
/// recycler before any key index so rebuilds skip recycled slots.
///
/// # Example
/// ```
/// use pagestore::{ObjectStream, StoreConfig};
///
/// let dir = tempfile::tempdir().unwrap();
/// let mut stream = ObjectStream::<String>::open_default(dir.path().join("s.db"), StoreConfig::default()).unwrap();
///
/// let index = stream.add(&"hello".to_string()).unwrap();
/// assert_eq!(stream.load_item(index).unwrap(), "hello");
/// ```
pub struct ObjectStream<T> {
    records: RecordStore<T>,
    attachments: Vec<Box<dyn StreamAttachment<T>>>,
    recycler: Option<RecyclableSlotIndex>,
    config: StoreConfig,
    id: StreamId,
}

impl<T: Serialize + DeserializeOwned + 'static> ObjectStream<T> {
    /// Open a stream whose records are encoded with bincode.
    pub fn open_default<P: AsRef<Path>>(path: P, config: StoreConfig) -> Result<Self> {
        let serializer = BincodeSerializer::new(config.endianness);
        Self::open(path, config, serializer)
    }
}

impl<T> ObjectStream<T> {
    /// Open (or create) the stream stored at `path`.
    ///
    /// # Errors
    /// - `Error::InvalidArgument` if `config` is invalid or disagrees with the file
    /// - `Error::Corrupted` if the file cannot be parsed
    pub fn open<P, S>(path: P, config: StoreConfig, serializer: S) -> Result<Self>
    where
        P: AsRef<Path>,
        S: ItemSerializer<T> + 'static,
    {
        config.validate()?;
        let buffer = PagedFileBuffer::open(path, &config)?;
        let records = RecordStore::open(buffer, &config, Box::new(serializer))?;
        let id = StreamId::next();

        debug!(stream = %id, item = type_name::<T>(), records = records.count(), "opened object stream");
        Ok(Self {
            records,
            attachments: Vec::new(),
            recycler: None,
            config,
            id,
        })
    }

    // ========================================================================
    // Public API: Info
    // ========================================================================

    #[inline]
    pub fn id(&self) -> StreamId {
        self.id
    }

    /// Name of the item type this stream holds.
    pub fn item_type_name(&self) -> &'static str {
        type_name::<T>()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Number of slots, recycled ones included.
    #[inline]
    pub fn count(&self) -> u64 {
        self.records.count()
    }

    /// Number of slots holding a record.
    pub fn live_count(&self) -> u64 {
        let recycled = self.recycler.as_ref().map_or(0, |r| r.len_unchecked());
        self.count() - recycled as u64
    }

    pub fn item_sizing(&self) -> ItemSizing {
        self.records.item_sizing()
    }

    pub fn endianness(&self) -> Endianness {
        self.records.endianness()
    }

    pub fn is_read_only(&self) -> bool {
        self.records.is_read_only()
    }

    pub fn stats(&self) -> &BufferStats {
        self.records.buffer().stats()
    }

    /// True if `index` is a slot holding a record.
    pub fn contains_slot(&self, index: u64) -> bool {
        index < self.count() && !self.is_recycled(index)
    }

    /// Reserved streams that currently have an attachment.
    pub fn attached_streams(&self) -> Vec<usize> {
        self.attachments.iter().map(|a| a.reserved_stream()).collect()
    }

    // ========================================================================
    // Public API: Records
    // ========================================================================

    /// Load the record in slot `index`.
    ///
    /// # Errors
    /// - `Error::IndexOutOfRange` if the slot does not exist
    /// - `Error::RecycledSlot` if the slot was freed
    pub fn load_item(&mut self, index: u64) -> Result<T> {
        self.check_live(index)?;
        self.records.load_item(index)
    }

    /// Store a record, returning its slot.
    ///
    /// Reuses the most recently freed slot when a recycler is attached.
    pub fn add(&mut self, item: &T) -> Result<u64> {
        self.records.check_writable()?;

        let reused = self.recycler.as_ref().and_then(|r| r.peek_unchecked());
        let index = reused.unwrap_or_else(|| self.records.count());
        let record = self.records.encode_record(item)?;

        for attachment in &self.attachments {
            attachment.on_adding(&mut self.records, index, item)?;
        }

        match reused {
            Some(slot) => self.records.replace_encoded(slot, &record)?,
            None => {
                self.records.append_encoded(&record)?;
            }
        }

        for attachment in &self.attachments {
            attachment.on_added(index, item)?;
        }

        trace!(stream = %self.id, index, reused = reused.is_some(), "added record");
        Ok(index)
    }

    /// Replace the record in slot `index`.
    pub fn update(&mut self, index: u64, item: &T) -> Result<()> {
        self.records.check_writable()?;
        self.check_live(index)?;

        let record = self.records.encode_record(item)?;
        let old = self.records.load_item(index)?;

        for attachment in &self.attachments {
            attachment.on_updating(&mut self.records, index, &old, item)?;
        }

        self.records.replace_encoded(index, &record)?;

        for attachment in &self.attachments {
            attachment.on_updated(index, &old, item)?;
        }

        trace!(stream = %self.id, index, "updated record");
        Ok(())
    }

    /// Remove the record in slot `index`.
    ///
    /// With a recycler attached the slot becomes a hole; otherwise later
    /// records move down by one.
    ///
    /// # Errors
    /// `Error::InvalidArgument` if the file holds holes but no recycler is
    /// attached, since compacting would shift slots under its saved stack.
    pub fn remove(&mut self, index: u64) -> Result<()> {
        self.records.check_writable()?;
        self.check_live(index)?;
        if self.recycler.is_none() && self.records.has_recycled_slots() {
            return Err(Error::InvalidArgument(
                "stream has recycled slots; attach its recyclable slot index before removing".into(),
            ));
        }

        let item = self.records.load_item(index)?;

        if self.recycler.is_some() {
            self.records.clear_record(index)?;
            for attachment in &self.attachments {
                attachment.on_removed(index, &item)?;
            }
        } else {
            self.records.remove_record(index)?;
            for attachment in &self.attachments {
                attachment.on_removed(index, &item)?;
            }
            for attachment in &self.attachments {
                attachment.on_compacted(index);
            }
        }

        trace!(stream = %self.id, index, recycled = self.recycler.is_some(), "removed record");
        Ok(())
    }

    /// Iterate over `(slot, record)` pairs, skipping recycled slots.
    pub fn iter(&mut self) -> Records<'_, T> {
        Records {
            stream: self,
            next: 0,
        }
    }

    /// Persist every attachment, the header and all dirty pages.
    pub fn flush(&mut self) -> Result<()> {
        for attachment in &self.attachments {
            attachment.save(&mut self.records)?;
        }
        self.records.flush()
    }

    // ========================================================================
    // Public API: Attachments
    // ========================================================================

    /// Bind an attachment to this stream.
    ///
    /// An attachment whose reserved stream is empty while the stream already
    /// holds records rebuilds itself from the live records.
    ///
    /// # Errors
    /// - `Error::InvalidArgument` if the reserved stream does not exist
    /// - `Error::ReservedStreamInUse` if another attachment persists there
    pub fn attach(&mut self, attachment: Box<dyn StreamAttachment<T>>) -> Result<()> {
        let reserved = attachment.reserved_stream();
        if reserved >= self.records.reserved_stream_count() {
            return Err(Error::InvalidArgument(format!(
                "reserved stream {} does not exist (stream has {})",
                reserved,
                self.records.reserved_stream_count()
            )));
        }
        if self.attachments.iter().any(|a| a.reserved_stream() == reserved) {
            return Err(Error::ReservedStreamInUse(reserved));
        }
        if attachment.as_recycler().is_some() && self.recycler.is_some() {
            return Err(Error::InvalidArgument(
                "a recyclable slot index is already attached".into(),
            ));
        }

        let live = self.live_slots();
        attachment.on_attached(self.id, &mut self.records, &live)?;
        if let Some(recycler) = attachment.as_recycler() {
            self.recycler = Some(recycler.clone());
        }

        debug!(stream = %self.id, reserved, kind = %attachment.kind(), "attached");
        self.attachments.push(attachment);
        Ok(())
    }

    /// Persist and unbind the attachment on `reserved`.
    ///
    /// # Errors
    /// - `Error::Detached` if nothing is attached on `reserved`
    /// - `Error::InvalidArgument` for a recycler that still holds freed slots
    pub fn detach(&mut self, reserved: usize) -> Result<()> {
        let position = self
            .attachments
            .iter()
            .position(|a| a.reserved_stream() == reserved)
            .ok_or(Error::Detached(reserved))?;

        if let Some(recycler) = self.attachments[position].as_recycler() {
            let held = recycler.len_unchecked();
            if held > 0 {
                return Err(Error::InvalidArgument(format!(
                    "recyclable slot index on reserved stream {} still holds {} freed slots",
                    reserved, held
                )));
            }
        }

        self.attachments[position].save(&mut self.records)?;
        let attachment = self.attachments.remove(position);
        attachment.on_detached(self.id);
        if attachment.as_recycler().is_some() {
            self.recycler = None;
        }

        debug!(stream = %self.id, reserved, kind = %attachment.kind(), "detached");
        Ok(())
    }

    // ========================================================================
    // Internal
    // ========================================================================

    pub(crate) fn records_mut(&mut self) -> &mut RecordStore<T> {
        &mut self.records
    }

    fn is_recycled(&self, index: u64) -> bool {
        self.recycler
            .as_ref()
            .is_some_and(|r| r.holds_unchecked(index))
    }

    pub(crate) fn check_live(&self, index: u64) -> Result<()> {
        self.records.check_index(index)?;
        if self.is_recycled(index) {
            return Err(Error::RecycledSlot(index));
        }
        Ok(())
    }

    fn live_slots(&self) -> Vec<u64> {
        (0..self.count()).filter(|&i| !self.is_recycled(i)).collect()
    }
}

impl<T> Drop for ObjectStream<T> {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(stream = %self.id, error = %e, "failed to flush object stream on drop");
        }
        for attachment in self.attachments.drain(..) {
            attachment.on_detached(self.id);
        }
    }
}

/// Iterator over the live records of an [`ObjectStream`].
pub struct Records<'a, T> {
    stream: &'a mut ObjectStream<T>,
    next: u64,
}

impl<T> Iterator for Records<'_, T> {
    type Item = Result<(u64, T)>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.next < self.stream.count() {
            let index = self.next;
            self.next += 1;
            if self.stream.is_recycled(index) {
                continue;
            }
            return Some(self.stream.records.load_item(index).map(|item| (index, item)));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexFactory;
    use crate::serialization::FixedWidthSerializer;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn config() -> StoreConfig {
        StoreConfig::builder()
            .page_size(128)
            .max_memory(256)
            .reserved_streams(4)
            .build()
            .unwrap()
    }

    fn open(dir: &tempfile::TempDir) -> ObjectStream<String> {
        ObjectStream::open_default(dir.path().join("stream.db"), config()).unwrap()
    }

    #[test]
    fn test_add_load_update() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);

        let a = stream.add(&"alpha".to_string()).unwrap();
        let b = stream.add(&"beta".to_string()).unwrap();
        assert_eq!((a, b), (0, 1));

        stream.update(a, &"alpha, revised and longer".to_string()).unwrap();
        assert_eq!(stream.load_item(a).unwrap(), "alpha, revised and longer");
        assert_eq!(stream.load_item(b).unwrap(), "beta");
        assert_eq!(stream.count(), 2);
    }

    #[test]
    fn test_remove_without_recycler_compacts() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        for item in ["a", "b", "c"] {
            stream.add(&item.to_string()).unwrap();
        }

        stream.remove(0).unwrap();
        assert_eq!(stream.count(), 2);
        assert_eq!(stream.load_item(0).unwrap(), "b");
        assert!(matches!(
            stream.load_item(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_recycled_slot_is_rejected_then_reused() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        IndexFactory::recyclable_slot_index(&mut stream, 0).unwrap();
        for item in ["a", "b", "c"] {
            stream.add(&item.to_string()).unwrap();
        }

        stream.remove(1).unwrap();
        assert_eq!(stream.count(), 3);
        assert_eq!(stream.live_count(), 2);
        assert!(!stream.contains_slot(1));
        assert!(matches!(stream.load_item(1), Err(Error::RecycledSlot(1))));
        assert!(matches!(
            stream.update(1, &"x".to_string()),
            Err(Error::RecycledSlot(1))
        ));
        assert!(matches!(stream.remove(1), Err(Error::RecycledSlot(1))));

        assert_eq!(stream.add(&"d".to_string()).unwrap(), 1);
        assert_eq!(stream.load_item(1).unwrap(), "d");
        assert_eq!(stream.add(&"e".to_string()).unwrap(), 3);
    }

    #[test]
    fn test_iter_skips_recycled() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        IndexFactory::recyclable_slot_index(&mut stream, 0).unwrap();
        for item in ["a", "b", "c"] {
            stream.add(&item.to_string()).unwrap();
        }
        stream.remove(0).unwrap();

        let live: Vec<(u64, String)> = stream.iter().collect::<Result<_>>().unwrap();
        assert_eq!(live, vec![(1, "b".to_string()), (2, "c".to_string())]);
    }

    #[test]
    fn test_reopen_keeps_records() {
        let dir = tempdir().unwrap();
        {
            let mut stream = open(&dir);
            stream.add(&"persisted".to_string()).unwrap();
        } // dropped: flushed

        let mut stream = open(&dir);
        assert_eq!(stream.count(), 1);
        assert_eq!(stream.load_item(0).unwrap(), "persisted");
    }

    #[test]
    fn test_constant_size_stream() {
        let dir = tempdir().unwrap();
        let mut stream: ObjectStream<u64> = ObjectStream::open(
            dir.path().join("fixed.db"),
            config(),
            FixedWidthSerializer::new(Endianness::Little),
        )
        .unwrap();

        assert_eq!(stream.item_sizing(), ItemSizing::Constant(8));
        for value in 0..50u64 {
            stream.add(&(value * 3)).unwrap();
        }
        assert_eq!(stream.load_item(49).unwrap(), 147);
    }

    #[test]
    fn test_attach_rejects_bad_reserved_stream() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        IndexFactory::recyclable_slot_index(&mut stream, 1).unwrap();

        assert!(matches!(
            IndexFactory::recyclable_slot_index(&mut stream, 9),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            IndexFactory::recyclable_slot_index(&mut stream, 1),
            Err(Error::ReservedStreamInUse(1))
        ));
        assert_eq!(stream.attached_streams(), vec![1]);
    }

    #[test]
    fn test_detach_unknown_stream() {
        let dir = tempdir().unwrap();
        let mut stream = open(&dir);
        assert!(matches!(stream.detach(2), Err(Error::Detached(2))));
    }

    #[test]
    fn test_read_only_stream() {
        let dir = tempdir().unwrap();
        {
            let mut stream = open(&dir);
            stream.add(&"frozen".to_string()).unwrap();
        }

        let read_only = StoreConfig {
            read_only: true,
            ..config()
        };
        let mut stream: ObjectStream<String> =
            ObjectStream::open_default(dir.path().join("stream.db"), read_only).unwrap();

        assert_eq!(stream.load_item(0).unwrap(), "frozen");
        assert!(matches!(stream.add(&"x".to_string()), Err(Error::ReadOnly)));
        assert!(matches!(stream.update(0, &"x".to_string()), Err(Error::ReadOnly)));
        assert!(matches!(stream.remove(0), Err(Error::ReadOnly)));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(String),
        Update(usize, String),
        Remove(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => "[a-z]{0,40}".prop_map(Op::Add),
            1 => (any::<usize>(), "[a-z]{0,90}").prop_map(|(i, s)| Op::Update(i, s)),
            1 => any::<usize>().prop_map(Op::Remove),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_stream_matches_vec_model(ops in prop::collection::vec(op(), 1..60)) {
            let dir = tempdir().unwrap();
            let mut model: Vec<String> = Vec::new();
            {
                let mut stream = open(&dir);
                for op in ops {
                    match op {
                        Op::Add(item) => {
                            prop_assert_eq!(stream.add(&item).unwrap(), model.len() as u64);
                            model.push(item);
                        }
                        Op::Update(i, item) if !model.is_empty() => {
                            let i = i % model.len();
                            stream.update(i as u64, &item).unwrap();
                            model[i] = item;
                        }
                        Op::Remove(i) if !model.is_empty() => {
                            let i = i % model.len();
                            stream.remove(i as u64).unwrap();
                            model.remove(i);
                        }
                        _ => {}
                    }
                }
            }

            let mut stream = open(&dir);
            prop_assert_eq!(stream.count(), model.len() as u64);
            for (i, expected) in model.iter().enumerate() {
                prop_assert_eq!(&stream.load_item(i as u64).unwrap(), expected);
            }
        }
    }
}
