//! Record Store - logical records and reserved streams over a paged buffer.
//!
//! The [`RecordStore`] owns the [`PagedFileBuffer`] and knows the container
//! layout. It has no notion of attachments or recycling; the
//! [`ObjectStream`](crate::stream::ObjectStream) layers those on top.

use tracing::{debug, trace};

use crate::buffer::PagedFileBuffer;
use crate::common::{Endianness, Error, Result, StoreConfig};
use crate::serialization::ItemSerializer;
use crate::sizing::{ActionSizer, ConstantSizer, ItemSizer, SizeDescriptorSerializer};
use crate::stream::ContainerHeader;

/// Width of one reserved stream directory entry.
const DIRECTORY_ENTRY: u64 = 8;

/// How records of a stream are sized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemSizing {
    /// Every record occupies exactly this many bytes; no descriptor is stored.
    Constant(u64),
    /// Records are prefixed with a size descriptor.
    Variable,
}

impl ItemSizing {
    #[inline]
    pub fn is_constant_size(&self) -> bool {
        matches!(self, ItemSizing::Constant(_))
    }

    #[inline]
    pub fn constant_size(&self) -> Option<u64> {
        match self {
            ItemSizing::Constant(size) => Some(*size),
            ItemSizing::Variable => None,
        }
    }
}

/// Typed records laid out in one file.
///
/// # File Layout
/// ```text
/// ┌────────┬────────────┬──────────────────────┬───────────────────────┐
/// │ header │ directory  │ reserved streams     │ records               │
/// │ 32 B   │ n × u64    │ 0 | 1 | ... | n-1    │ 0 | 1 | 2 | ...       │
/// └────────┴────────────┴──────────────────────┴───────────────────────┘
/// ```
///
/// Constant-size record `i` sits at `region + i × size`. Variable-size records
/// are `descriptor(len) ++ payload`; their offsets are rebuilt by scanning the
/// region when the file is opened.
pub struct RecordStore<T> {
    buffer: PagedFileBuffer,
    serializer: Box<dyn ItemSerializer<T>>,
    descriptor: SizeDescriptorSerializer,
    header: ContainerHeader,
    header_dirty: bool,

    /// Byte length of each reserved stream.
    reserved_lens: Vec<u64>,

    /// Start of each variable-size record, relative to the record region.
    offsets: Vec<u64>,
}

impl<T> RecordStore<T> {
    /// Lay a record store over `buffer`, creating the container if the file is empty.
    ///
    /// # Errors
    /// - `Error::InvalidArgument` if the file was written with a different layout
    /// - `Error::Corrupted` if the header or record region cannot be parsed
    pub(crate) fn open(
        mut buffer: PagedFileBuffer,
        config: &StoreConfig,
        serializer: Box<dyn ItemSerializer<T>>,
    ) -> Result<Self> {
        let constant_size = match serializer.constant_size() {
            Some(0) => {
                return Err(Error::InvalidArgument("constant item size must be > 0".into()));
            }
            Some(size) => Some(u32::try_from(size).map_err(|_| {
                Error::InvalidArgument(format!("constant item size {} exceeds u32", size))
            })?),
            None => None,
        };

        let expected = ContainerHeader {
            endianness: config.endianness,
            size_descriptor: config.size_descriptor,
            constant_size,
            reserved_streams: config.reserved_streams as u32,
            record_count: 0,
            recycled_slots: false,
        };
        let descriptor = SizeDescriptorSerializer::new(config.size_descriptor, config.endianness);

        if buffer.is_empty() {
            if buffer.is_read_only() {
                return Err(Error::Corrupted("read-only file has no header".into()));
            }

            let mut init = expected.to_bytes().to_vec();
            init.resize(ContainerHeader::SIZE + config.reserved_streams * DIRECTORY_ENTRY as usize, 0);
            buffer.add_range(&init)?;

            debug!(reserved = config.reserved_streams, ?constant_size, "created container");
            return Ok(Self {
                buffer,
                serializer,
                descriptor,
                header: expected,
                header_dirty: false,
                reserved_lens: vec![0; config.reserved_streams],
                offsets: Vec::new(),
            });
        }

        let head_len = (ContainerHeader::SIZE as u64).min(buffer.len()) as usize;
        let header = ContainerHeader::from_bytes(&buffer.read_span(0, head_len)?)?;
        header.check_layout(&expected)?;

        let directory_len = config.reserved_streams as u64 * DIRECTORY_ENTRY;
        if buffer.len() < ContainerHeader::SIZE as u64 + directory_len {
            return Err(Error::Corrupted("reserved stream directory is truncated".into()));
        }
        let directory = buffer.read_span(ContainerHeader::SIZE as u64, directory_len as usize)?;
        let reserved_lens: Vec<u64> = directory
            .chunks_exact(DIRECTORY_ENTRY as usize)
            .map(|entry| {
                let mut raw = [0u8; 8];
                raw.copy_from_slice(entry);
                u64::from_le_bytes(raw)
            })
            .collect();

        let mut store = Self {
            buffer,
            serializer,
            descriptor,
            header,
            header_dirty: false,
            reserved_lens,
            offsets: Vec::new(),
        };
        if store.region_start() > store.buffer.len() {
            return Err(Error::Corrupted("reserved streams extend past end of file".into()));
        }
        store.scan_records()?;

        debug!(records = store.count(), len = store.buffer.len(), "opened container");
        Ok(store)
    }

    /// Rebuild the offset table of variable-size records.
    fn scan_records(&mut self) -> Result<()> {
        let region_start = self.region_start();
        let region_len = self.buffer.len() - region_start;
        let count = self.header.record_count;

        if let Some(size) = self.header.constant_size {
            if count.checked_mul(size as u64) != Some(region_len) {
                return Err(Error::Corrupted(format!(
                    "record region holds {} bytes, expected {} records of {}",
                    region_len, count, size
                )));
            }
            return Ok(());
        }

        let max_descriptor = self.descriptor.strategy().max_encoded_len() as u64;
        let mut offsets = Vec::with_capacity(count as usize);
        let mut offset = 0u64;
        for index in 0..count {
            if offset >= region_len {
                return Err(Error::Corrupted(format!("record {} is missing", index)));
            }
            let head = self
                .buffer
                .read_span(region_start + offset, max_descriptor.min(region_len - offset) as usize)?;
            let (len, used) = self.descriptor.decode(&head)?;
            offsets.push(offset);
            offset = offset
                .checked_add(used as u64 + len)
                .ok_or_else(|| Error::Corrupted(format!("record {} length overflows", index)))?;
        }
        if offset != region_len {
            return Err(Error::Corrupted(format!(
                "record region is {} bytes but records end at {}",
                region_len, offset
            )));
        }

        self.offsets = offsets;
        Ok(())
    }

    // ========================================================================
    // Public API: Info
    // ========================================================================

    /// Number of record slots.
    #[inline]
    pub fn count(&self) -> u64 {
        self.header.record_count
    }

    pub fn item_sizing(&self) -> ItemSizing {
        match self.header.constant_size {
            Some(size) => ItemSizing::Constant(size as u64),
            None => ItemSizing::Variable,
        }
    }

    #[inline]
    pub fn endianness(&self) -> Endianness {
        self.header.endianness
    }

    #[inline]
    pub fn reserved_stream_count(&self) -> usize {
        self.reserved_lens.len()
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.buffer.is_read_only()
    }

    /// The underlying paged buffer.
    pub fn buffer(&self) -> &PagedFileBuffer {
        &self.buffer
    }

    // ========================================================================
    // Public API: Records
    // ========================================================================

    /// Deserialize the record in slot `index`.
    ///
    /// This is raw slot access; it does not know about recycled slots.
    pub fn load_item(&mut self, index: u64) -> Result<T> {
        let payload = self.read_payload(index)?;
        self.serializer.deserialize(&payload)
    }

    /// Serialized payload of slot `index`, without its size descriptor.
    pub fn read_payload(&mut self, index: u64) -> Result<Vec<u8>> {
        self.check_index(index)?;
        let (start, len) = self.record_span(index);
        let mut bytes = self.buffer.read_span(start, len as usize)?;

        if self.header.constant_size.is_none() {
            let (payload_len, used) = self.descriptor.decode(&bytes)?;
            if used as u64 + payload_len != len {
                return Err(Error::Corrupted(format!(
                    "record {} descriptor says {} bytes but slot holds {}",
                    index,
                    payload_len,
                    len - used as u64
                )));
            }
            bytes.drain(..used);
        }
        Ok(bytes)
    }

    // ========================================================================
    // Crate API: Mutations
    // ========================================================================

    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    pub(crate) fn check_index(&self, index: u64) -> Result<()> {
        if index >= self.count() {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.count(),
            });
        }
        Ok(())
    }

    /// Encode an item the way it is stored in a slot.
    pub(crate) fn encode_record(&self, item: &T) -> Result<Vec<u8>> {
        let payload = self.serializer.serialize_to_vec(item)?;
        let slot_len = self.slot_sizer().calculate_size(&payload);
        match self.header.constant_size {
            Some(_) => {
                if payload.len() as u64 != slot_len {
                    return Err(Error::Serialization(format!(
                        "constant-size serializer produced {} bytes, expected {}",
                        payload.len(),
                        slot_len
                    )));
                }
                Ok(payload)
            }
            None => {
                let mut record = Vec::with_capacity(slot_len as usize);
                self.descriptor.encode(payload.len() as u64, &mut record)?;
                record.extend_from_slice(&payload);
                Ok(record)
            }
        }
    }

    /// Bytes an encoded payload occupies in its slot, descriptor included.
    fn slot_sizer(&self) -> Box<dyn ItemSizer<[u8]> + '_> {
        match self.header.constant_size {
            Some(size) => Box::new(ConstantSizer::new(size as u64)),
            None => Box::new(ActionSizer::new(move |payload: &[u8]| {
                let len = payload.len() as u64;
                self.descriptor.calculate_size(&len) + len
            })),
        }
    }

    /// Append an already-encoded record, returning its slot.
    pub(crate) fn append_encoded(&mut self, record: &[u8]) -> Result<u64> {
        let region_start = self.region_start();
        let start = self.buffer.add_range(record)?;
        if self.header.constant_size.is_none() {
            self.offsets.push(start - region_start);
        }

        let index = self.header.record_count;
        self.header.record_count += 1;
        self.header_dirty = true;

        trace!(index, len = record.len(), "appended record");
        Ok(index)
    }

    /// Replace the bytes of slot `index` with an already-encoded record.
    pub(crate) fn replace_encoded(&mut self, index: u64, record: &[u8]) -> Result<()> {
        self.check_index(index)?;
        let (start, old_len) = self.record_span(index);
        self.splice(start, old_len, record)?;

        let new_len = record.len() as u64;
        if self.header.constant_size.is_none() && new_len != old_len {
            for offset in &mut self.offsets[index as usize + 1..] {
                *offset = *offset + new_len - old_len;
            }
        }

        trace!(index, old_len, new_len, "replaced record");
        Ok(())
    }

    /// True if the file was last saved with holes awaiting reuse.
    pub(crate) fn has_recycled_slots(&self) -> bool {
        self.header.recycled_slots
    }

    /// Record in the header whether any slot is a hole.
    pub(crate) fn set_recycled_slots(&mut self, recycled: bool) {
        if self.header.recycled_slots != recycled {
            self.header.recycled_slots = recycled;
            self.header_dirty = true;
        }
    }

    /// Turn slot `index` into a hole: an empty payload, or zeroes for constant-size records.
    pub(crate) fn clear_record(&mut self, index: u64) -> Result<()> {
        let hole = match self.header.constant_size {
            Some(size) => vec![0u8; size as usize],
            None => {
                let mut hole = Vec::new();
                self.descriptor.encode(0, &mut hole)?;
                hole
            }
        };
        self.replace_encoded(index, &hole)
    }

    /// Physically remove slot `index`; later slots move down by one.
    pub(crate) fn remove_record(&mut self, index: u64) -> Result<()> {
        self.check_index(index)?;
        let (start, len) = self.record_span(index);
        self.buffer.remove_range(start, len)?;

        if self.header.constant_size.is_none() {
            self.offsets.remove(index as usize);
            for offset in &mut self.offsets[index as usize..] {
                *offset -= len;
            }
        }
        self.header.record_count -= 1;
        self.header_dirty = true;

        trace!(index, len, "compacted record");
        Ok(())
    }

    // ========================================================================
    // Crate API: Reserved streams
    // ========================================================================

    /// Contents of reserved stream `n`.
    pub(crate) fn read_reserved(&mut self, n: usize) -> Result<Vec<u8>> {
        self.check_reserved(n)?;
        let start = self.reserved_start(n);
        self.buffer.read_span(start, self.reserved_lens[n] as usize)
    }

    /// Replace the contents of reserved stream `n`, shifting the record region.
    pub(crate) fn write_reserved(&mut self, n: usize, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.check_reserved(n)?;

        let start = self.reserved_start(n);
        self.splice(start, self.reserved_lens[n], bytes)?;
        self.reserved_lens[n] = bytes.len() as u64;

        let entry = ContainerHeader::SIZE as u64 + n as u64 * DIRECTORY_ENTRY;
        self.buffer.update_range(entry, &(bytes.len() as u64).to_le_bytes())?;

        debug!(reserved = n, len = bytes.len(), "wrote reserved stream");
        Ok(())
    }

    fn check_reserved(&self, n: usize) -> Result<()> {
        if n >= self.reserved_lens.len() {
            return Err(Error::InvalidArgument(format!(
                "reserved stream {} does not exist (container has {})",
                n,
                self.reserved_lens.len()
            )));
        }
        Ok(())
    }

    // ========================================================================
    // Crate API: Flush
    // ========================================================================

    /// Write the header if it changed, then flush the paged buffer.
    pub(crate) fn flush(&mut self) -> Result<()> {
        if self.is_read_only() {
            return Ok(());
        }
        if self.header_dirty {
            self.buffer.update_range(0, &self.header.to_bytes())?;
            self.header_dirty = false;
        }
        self.buffer.flush()
    }

    // ========================================================================
    // Internal: Layout
    // ========================================================================

    fn reserved_start(&self, n: usize) -> u64 {
        let directory = self.reserved_lens.len() as u64 * DIRECTORY_ENTRY;
        ContainerHeader::SIZE as u64 + directory + self.reserved_lens[..n].iter().sum::<u64>()
    }

    /// First byte of the record region.
    fn region_start(&self) -> u64 {
        self.reserved_start(self.reserved_lens.len())
    }

    /// Absolute start and length of slot `index`.
    fn record_span(&self, index: u64) -> (u64, u64) {
        let region_start = self.region_start();
        match self.header.constant_size {
            Some(size) => (region_start + index * size as u64, size as u64),
            None => {
                let i = index as usize;
                let end = match self.offsets.get(i + 1) {
                    Some(next) => *next,
                    None => self.buffer.len() - region_start,
                };
                (region_start + self.offsets[i], end - self.offsets[i])
            }
        }
    }

    /// Overwrite `old_len` bytes at `start` with `bytes`, growing or shrinking in place.
    fn splice(&mut self, start: u64, old_len: u64, bytes: &[u8]) -> Result<()> {
        let new_len = bytes.len() as u64;
        let shared = old_len.min(new_len) as usize;
        self.buffer.update_range(start, &bytes[..shared])?;

        if new_len > old_len {
            self.buffer.insert_range(start + old_len, &bytes[shared..])?;
        } else if new_len < old_len {
            self.buffer.remove_range(start + new_len, old_len - new_len)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::{BincodeSerializer, FixedWidthSerializer};
    use std::path::Path;
    use tempfile::tempdir;

    fn small_config() -> StoreConfig {
        StoreConfig::builder()
            .page_size(64)
            .max_memory(128)
            .reserved_streams(2)
            .build()
            .unwrap()
    }

    fn open_strings(path: &Path, config: &StoreConfig) -> RecordStore<String> {
        let buffer = PagedFileBuffer::open(path, config).unwrap();
        RecordStore::open(buffer, config, Box::new(BincodeSerializer::new(config.endianness))).unwrap()
    }

    fn add(store: &mut RecordStore<String>, item: &str) -> u64 {
        let record = store.encode_record(&item.to_string()).unwrap();
        store.append_encoded(&record).unwrap()
    }

    fn replace(store: &mut RecordStore<String>, index: u64, item: &str) {
        let record = store.encode_record(&item.to_string()).unwrap();
        store.replace_encoded(index, &record).unwrap();
    }

    #[test]
    fn test_new_container_layout() {
        let dir = tempdir().unwrap();
        let config = small_config();
        let store = open_strings(&dir.path().join("s.db"), &config);

        assert_eq!(store.count(), 0);
        assert_eq!(store.item_sizing(), ItemSizing::Variable);
        assert_eq!(store.reserved_stream_count(), 2);
        assert_eq!(store.buffer().len(), (ContainerHeader::SIZE + 16) as u64);
    }

    #[test]
    fn test_append_and_load() {
        let dir = tempdir().unwrap();
        let mut store = open_strings(&dir.path().join("s.db"), &small_config());

        assert_eq!(add(&mut store, "alpha"), 0);
        assert_eq!(add(&mut store, "a much longer record that spans pages"), 1);
        assert_eq!(store.load_item(0).unwrap(), "alpha");
        assert_eq!(store.load_item(1).unwrap(), "a much longer record that spans pages");
        assert!(matches!(
            store.load_item(2),
            Err(Error::IndexOutOfRange { index: 2, len: 2 })
        ));
    }

    #[test]
    fn test_replace_grows_and_shrinks() {
        let dir = tempdir().unwrap();
        let mut store = open_strings(&dir.path().join("s.db"), &small_config());
        for item in ["one", "two", "three"] {
            add(&mut store, item);
        }

        replace(&mut store, 0, "one, but considerably longer now");
        assert_eq!(store.load_item(1).unwrap(), "two");
        assert_eq!(store.load_item(2).unwrap(), "three");

        replace(&mut store, 0, "1");
        assert_eq!(store.load_item(0).unwrap(), "1");
        assert_eq!(store.load_item(2).unwrap(), "three");
    }

    #[test]
    fn test_remove_record_compacts() {
        let dir = tempdir().unwrap();
        let mut store = open_strings(&dir.path().join("s.db"), &small_config());
        for item in ["a", "b", "c"] {
            add(&mut store, item);
        }

        store.remove_record(0).unwrap();
        assert_eq!(store.count(), 2);
        assert_eq!(store.load_item(0).unwrap(), "b");
        assert_eq!(store.load_item(1).unwrap(), "c");
    }

    #[test]
    fn test_clear_record_leaves_empty_hole() {
        let dir = tempdir().unwrap();
        let mut store = open_strings(&dir.path().join("s.db"), &small_config());
        add(&mut store, "first");
        add(&mut store, "second");

        store.clear_record(0).unwrap();
        assert_eq!(store.count(), 2);
        assert!(store.read_payload(0).unwrap().is_empty());
        assert_eq!(store.load_item(1).unwrap(), "second");
    }

    #[test]
    fn test_reserved_stream_shifts_records() {
        let dir = tempdir().unwrap();
        let mut store = open_strings(&dir.path().join("s.db"), &small_config());
        add(&mut store, "record");

        store.write_reserved(1, &[7; 100]).unwrap();
        store.write_reserved(0, b"meta").unwrap();
        assert_eq!(store.read_reserved(0).unwrap(), b"meta");
        assert_eq!(store.read_reserved(1).unwrap(), vec![7; 100]);
        assert_eq!(store.load_item(0).unwrap(), "record");

        store.write_reserved(1, &[]).unwrap();
        assert!(store.read_reserved(1).unwrap().is_empty());
        assert_eq!(store.load_item(0).unwrap(), "record");

        assert!(matches!(store.read_reserved(2), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_reopen_scans_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.db");
        let config = small_config();
        {
            let mut store = open_strings(&path, &config);
            add(&mut store, "kept");
            add(&mut store, "also kept");
            store.write_reserved(0, b"index").unwrap();
            store.flush().unwrap();
        }

        let mut store = open_strings(&path, &config);
        assert_eq!(store.count(), 2);
        assert_eq!(store.load_item(1).unwrap(), "also kept");
        assert_eq!(store.read_reserved(0).unwrap(), b"index");
    }

    #[test]
    fn test_constant_size_records() {
        let dir = tempdir().unwrap();
        let config = small_config();
        let buffer = PagedFileBuffer::open(dir.path().join("c.db"), &config).unwrap();
        let mut store: RecordStore<u32> =
            RecordStore::open(buffer, &config, Box::new(FixedWidthSerializer::new(config.endianness)))
                .unwrap();

        assert_eq!(store.item_sizing(), ItemSizing::Constant(4));
        for value in [10u32, 20, 30] {
            let record = store.encode_record(&value).unwrap();
            store.append_encoded(&record).unwrap();
        }
        assert_eq!(store.buffer().len(), (ContainerHeader::SIZE + 16 + 12) as u64);

        store.remove_record(1).unwrap();
        assert_eq!(store.load_item(1).unwrap(), 30);
    }

    #[test]
    fn test_layout_mismatch_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.db");
        {
            let mut store = open_strings(&path, &small_config());
            store.flush().unwrap();
        }

        let other = StoreConfig::builder()
            .page_size(64)
            .max_memory(128)
            .reserved_streams(3)
            .build()
            .unwrap();
        let buffer = PagedFileBuffer::open(&path, &other).unwrap();
        let result = RecordStore::<String>::open(buffer, &other, Box::new(BincodeSerializer::new(other.endianness)));
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_truncated_region_is_corruption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("s.db");
        let config = small_config();
        {
            let mut store = open_strings(&path, &config);
            add(&mut store, "this record will be cut short");
            store.flush().unwrap();
        }

        let len = std::fs::metadata(&path).unwrap().len();
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .unwrap()
            .set_len(len - 5)
            .unwrap();

        let buffer = PagedFileBuffer::open(&path, &config).unwrap();
        let result = RecordStore::<String>::open(buffer, &config, Box::new(BincodeSerializer::new(config.endianness)));
        assert!(matches!(result, Err(Error::Corrupted(_))));
    }
}
