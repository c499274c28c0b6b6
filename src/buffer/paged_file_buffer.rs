//! Paged File Buffer - a byte buffer mapped onto a file through bounded paging.
//!
//! The [`PagedFileBuffer`] provides:
//! - Byte-addressed reads and writes over the whole file
//! - Structural edits (append, insert, remove, expand) that keep the page chain contiguous
//! - LRU eviction of resident pages under a memory budget
//! - Write-back of dirty pages, truncating the file to the content length

use std::path::Path;

use tracing::{debug, trace, warn};

use crate::buffer::replacer::LruReplacer;
use crate::buffer::stats::BufferEvent;
use crate::buffer::{BufferStats, Frame, Page, PageState};
use crate::common::{Error, FrameId, PageId, Result, StoreConfig};
use crate::storage::DiskManager;

/// A contiguous byte buffer backed by one file.
///
/// # Architecture
/// ```text
/// ┌─────────────────────────────────────────────────────────────┐
/// │                      PagedFileBuffer                        │
/// │  ┌──────────────┐  ┌───────────────────────────────────┐   │
/// │  │ pages        │  │        frames: Vec<Frame>         │   │
/// │  │ Vec<Page>    │─▶│  [Frame0] [Frame1] [Frame2] ...   │   │
/// │  │ (by number)  │  │  (at most max_open_pages)         │   │
/// │  └──────────────┘  └───────────────────────────────────┘   │
/// │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐      │
/// │  │ free_frames  │  │   replacer   │  │ disk_manager │      │
/// │  │ Vec<FrameId> │  │ LruReplacer  │  │              │      │
/// │  └──────────────┘  └──────────────┘  └──────────────┘      │
/// └─────────────────────────────────────────────────────────────┘
/// ```
///
/// Every page except the last holds exactly `page_size` bytes, so the page
/// holding byte `i` is always `i / page_size`.
///
/// # Thread Safety
/// Single writer. Every method takes `&mut self`, including reads, because
/// a read may load or evict pages.
///
/// # Usage
/// ```
/// use pagestore::buffer::PagedFileBuffer;
/// use pagestore::storage::DiskManager;
///
/// let dir = tempfile::tempdir().unwrap();
/// let disk = DiskManager::create(dir.path().join("buffer.db")).unwrap();
/// let mut buffer = PagedFileBuffer::new(disk, 16, 2).unwrap();
///
/// buffer.add_range(b"hello world, this spans pages").unwrap();
/// buffer.insert_range(5, b",").unwrap();
/// assert_eq!(buffer.read_span(0, 12).unwrap(), b"hello, world");
/// ```
pub struct PagedFileBuffer {
    /// Handles all disk I/O.
    disk: DiskManager,

    /// Page descriptors, indexed by page number.
    pages: Vec<Page>,

    /// Fixed arena of cache slots allocated at startup.
    frames: Vec<Frame>,

    /// Stack of free frame IDs (LIFO).
    free_frames: Vec<FrameId>,

    /// Eviction policy for selecting victim frames.
    replacer: LruReplacer,

    /// Cache statistics.
    stats: BufferStats,

    page_size: usize,

    /// Logical length of the buffer; always the sum of page lengths.
    len: u64,
}

impl PagedFileBuffer {
    /// Map a buffer onto an opened file.
    ///
    /// Pages are discovered by dividing the file length by `page_size`
    /// (rounding up); the final page holds the remainder.
    ///
    /// # Errors
    /// `Error::InvalidArgument` if `page_size` or `max_open_pages` is 0.
    pub fn new(disk: DiskManager, page_size: usize, max_open_pages: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::InvalidArgument("page_size must be > 0".into()));
        }
        if max_open_pages == 0 {
            return Err(Error::InvalidArgument("max_open_pages must be > 0".into()));
        }

        let len = disk.file_len();
        let page_count = len.div_ceil(page_size as u64);
        let pages: Vec<Page> = (0..page_count)
            .map(|n| {
                let start = n * page_size as u64;
                let page_len = (len - start).min(page_size as u64) as usize;
                Page::new(PageId::new(n as u32), start, page_len)
            })
            .collect();

        // Allocate all frames upfront; pop order hands out Frame 0 first
        let frames: Vec<Frame> = (0..max_open_pages).map(|_| Frame::new()).collect();
        let free_frames: Vec<FrameId> = (0..max_open_pages).rev().map(FrameId::new).collect();

        debug!(len, page_count, page_size, max_open_pages, "mapped paged buffer");

        Ok(Self {
            disk,
            pages,
            frames,
            free_frames,
            replacer: LruReplacer::new(),
            stats: BufferStats::new(),
            page_size,
            len,
        })
    }

    /// Open (or create) the file at `path` with the paging parameters of `config`.
    pub fn open<P: AsRef<Path>>(path: P, config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let disk = if config.read_only {
            DiskManager::open(path, true)?
        } else {
            DiskManager::open_or_create(path, false)?
        };
        Self::new(disk, config.page_size, config.max_open_pages())
    }

    // ========================================================================
    // Public API: Info
    // ========================================================================

    /// Logical length in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    #[inline]
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Descriptors of every page, in page-number order.
    #[inline]
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Number of pages currently held in memory.
    pub fn resident_page_count(&self) -> usize {
        self.frames.len() - self.free_frames.len()
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.disk.is_read_only()
    }

    /// Get cache statistics.
    pub fn stats(&self) -> &BufferStats {
        &self.stats
    }

    /// Length of the backing file right now (may lag behind `len` until flushed).
    pub fn file_len(&self) -> u64 {
        self.disk.file_len()
    }

    // ========================================================================
    // Public API: Reads
    // ========================================================================

    /// Read `count` bytes starting at `index`.
    ///
    /// # Errors
    /// `Error::IndexOutOfRange` if the span extends past the end.
    pub fn read_span(&mut self, index: u64, count: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; count];
        self.read_into(index, &mut buf)?;
        Ok(buf)
    }

    /// Fill `buf` with the bytes starting at `index`.
    pub fn read_into(&mut self, index: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(index, buf.len() as u64)?;

        let mut done = 0;
        while done < buf.len() {
            let position = index + done as u64;
            let (page_id, offset) = self.locate(position);
            let frame_id = self.resident_frame(page_id)?;

            let data = self.frames[frame_id.0].data();
            let n = (data.len() - offset).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&data[offset..offset + n]);
            done += n;
        }
        Ok(())
    }

    // ========================================================================
    // Public API: Mutations
    // ========================================================================

    /// Append bytes, returning the index they start at.
    pub fn add_range(&mut self, bytes: &[u8]) -> Result<u64> {
        self.check_writable()?;
        let index = self.len;
        self.expand_by(bytes.len() as u64)?;
        self.write_at(index, bytes)?;
        Ok(index)
    }

    /// Overwrite bytes in place.
    ///
    /// # Errors
    /// `Error::IndexOutOfRange` if the span extends past the end.
    pub fn update_range(&mut self, index: u64, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        self.check_range(index, bytes.len() as u64)?;
        self.write_at(index, bytes)
    }

    /// Insert bytes at `index`, shifting everything after it towards the end.
    pub fn insert_range(&mut self, index: u64, bytes: &[u8]) -> Result<()> {
        self.check_writable()?;
        if index > self.len {
            return Err(Error::IndexOutOfRange {
                index,
                len: self.len,
            });
        }
        if bytes.is_empty() {
            return Ok(());
        }

        let tail = self.len - index;
        let count = bytes.len() as u64;
        self.expand_by(count)?;
        self.move_bytes(index, index + count, tail)?;
        self.write_at(index, bytes)
    }

    /// Remove `count` bytes at `index`, shifting everything after it towards the start.
    pub fn remove_range(&mut self, index: u64, count: u64) -> Result<()> {
        self.check_writable()?;
        self.check_range(index, count)?;
        if count == 0 {
            return Ok(());
        }

        let tail = self.len - index - count;
        self.move_bytes(index + count, index, tail)?;
        self.shrink_to(self.len - count)
    }

    /// Grow the buffer to `new_len` bytes, zero-filling. Never shrinks.
    pub fn expand_to(&mut self, new_len: u64) -> Result<()> {
        self.check_writable()?;
        if new_len <= self.len {
            return Ok(());
        }

        // Top up the last page first so only it may remain partial
        if let Some(last) = self.pages.last() {
            let (page_id, page_len) = (last.number, last.len);
            if page_len < self.page_size {
                let grow = ((self.page_size - page_len) as u64).min(new_len - self.len) as usize;
                let frame_id = self.resident_frame(page_id)?;
                self.frames[frame_id.0].data_mut().resize(page_len + grow, 0);

                let page = &mut self.pages[page_id.as_index()];
                page.len += grow;
                page.state = PageState::Dirty;
                self.len += grow as u64;
            }
        }

        while self.len < new_len {
            let grow = (new_len - self.len).min(self.page_size as u64) as usize;
            self.push_page(grow)?;
            self.len += grow as u64;
        }
        Ok(())
    }

    /// Grow the buffer by `count` zero bytes.
    pub fn expand_by(&mut self, count: u64) -> Result<()> {
        self.expand_to(self.len + count)
    }

    /// Shrink the buffer to `new_len` bytes, dropping trailing pages and
    /// truncating the file. Never grows.
    pub fn truncate(&mut self, new_len: u64) -> Result<()> {
        self.check_writable()?;
        if new_len >= self.len {
            return Ok(());
        }
        self.shrink_to(new_len)
    }

    // ========================================================================
    // Public API: Flush
    // ========================================================================

    /// Write every dirty page to disk and trim the file to the content length.
    pub fn flush(&mut self) -> Result<()> {
        if self.is_read_only() {
            return Ok(());
        }

        let dirty: Vec<(FrameId, PageId)> = self
            .pages
            .iter()
            .filter(|page| page.state == PageState::Dirty)
            .filter_map(|page| page.frame.map(|frame_id| (frame_id, page.number)))
            .collect();

        for (frame_id, page_id) in &dirty {
            self.save_frame(*frame_id, *page_id)?;
        }

        if self.disk.file_len() != self.len {
            self.disk.set_len(self.len)?;
            self.stats.record(BufferEvent::Truncation);
        }
        self.disk.sync()?;

        debug!(pages = dirty.len(), len = self.len, "flushed paged buffer");
        Ok(())
    }

    // ========================================================================
    // Internal: Page residency
    // ========================================================================

    /// Page number and in-page offset of a byte position.
    #[inline]
    fn locate(&self, position: u64) -> (PageId, usize) {
        let page_id = PageId::containing(position, self.page_size);
        let offset = (position - page_id.start_position(self.page_size)) as usize;
        (page_id, offset)
    }

    /// Make a page resident, returning its frame.
    fn resident_frame(&mut self, page_id: PageId) -> Result<FrameId> {
        let index = page_id.as_index();
        if let Some(frame_id) = self.pages[index].frame {
            self.stats.record(BufferEvent::Hit);
            self.replacer.record_access(frame_id);
            return Ok(frame_id);
        }

        self.stats.record(BufferEvent::Miss);
        let frame_id = self.acquire_frame()?;

        let page_len = self.pages[index].len;
        let buf = self.frames[frame_id.0].load(page_id, page_len);
        if let Err(e) = self.disk.read_page(page_id, self.page_size, buf) {
            self.frames[frame_id.0].reset();
            self.free_frames.push(frame_id);
            return Err(e);
        }
        self.stats.record(BufferEvent::PageRead);

        let page = &mut self.pages[index];
        page.frame = Some(frame_id);
        page.state = PageState::Loaded;
        self.replacer.record_access(frame_id);

        trace!(page = page_id.0, frame = frame_id.0, len = page_len, "loaded page");
        Ok(frame_id)
    }

    /// Append a new resident, zero-filled page of `len` bytes.
    fn push_page(&mut self, len: usize) -> Result<()> {
        self.stats.record(BufferEvent::Miss);
        let frame_id = self.acquire_frame()?;

        let page_id = PageId::new(self.pages.len() as u32);
        let frame = &mut self.frames[frame_id.0];
        frame.load(page_id, len);
        frame.mark_dirty();

        let mut page = Page::new(page_id, page_id.start_position(self.page_size), len);
        page.frame = Some(frame_id);
        page.state = PageState::Dirty;
        self.pages.push(page);
        self.replacer.record_access(frame_id);

        trace!(page = page_id.0, len, "created page");
        Ok(())
    }

    /// Get a free frame, evicting if necessary.
    fn acquire_frame(&mut self) -> Result<FrameId> {
        if let Some(frame_id) = self.free_frames.pop() {
            return Ok(frame_id);
        }
        self.evict_page()
    }

    /// Evict the least recently used page and return its frame.
    fn evict_page(&mut self) -> Result<FrameId> {
        let frame_id = self
            .replacer
            .evict()
            .ok_or_else(|| Error::Corrupted("page cache has no evictable frame".into()))?;

        let page_id = self.frames[frame_id.0]
            .page_id()
            .ok_or_else(|| Error::Corrupted(format!("{} tracked but empty", frame_id)))?;

        if self.frames[frame_id.0].is_dirty() {
            if let Err(e) = self.save_frame(frame_id, page_id) {
                // Keep the page resident so nothing is lost
                self.replacer.record_access(frame_id);
                return Err(e);
            }
        }

        let page = &mut self.pages[page_id.as_index()];
        page.frame = None;
        page.state = PageState::Unloaded;
        self.frames[frame_id.0].reset();
        self.stats.record(BufferEvent::Eviction);

        debug!(page = page_id.0, frame = frame_id.0, "evicted page");
        Ok(frame_id)
    }

    /// Write a frame's page to disk.
    ///
    /// Saving the last page trims the file to exactly `len` bytes.
    fn save_frame(&mut self, frame_id: FrameId, page_id: PageId) -> Result<()> {
        self.disk
            .write_page(page_id, self.page_size, self.frames[frame_id.0].data())?;
        self.frames[frame_id.0].clear_dirty();
        self.pages[page_id.as_index()].state = PageState::Loaded;
        self.stats.record(BufferEvent::PageWritten);

        let is_last = page_id.as_index() + 1 == self.pages.len();
        if is_last && self.disk.file_len() > self.len {
            self.disk.set_len(self.len)?;
            self.stats.record(BufferEvent::Truncation);
            debug!(len = self.len, "truncated file after saving last page");
        }
        Ok(())
    }

    // ========================================================================
    // Internal: Byte movement
    // ========================================================================

    /// Write bytes at an index already known to be in range.
    fn write_at(&mut self, index: u64, bytes: &[u8]) -> Result<()> {
        let mut done = 0;
        while done < bytes.len() {
            let position = index + done as u64;
            let (page_id, offset) = self.locate(position);
            let frame_id = self.resident_frame(page_id)?;

            let data = self.frames[frame_id.0].data_mut();
            let n = (data.len() - offset).min(bytes.len() - done);
            data[offset..offset + n].copy_from_slice(&bytes[done..done + n]);
            self.pages[page_id.as_index()].state = PageState::Dirty;
            done += n;
        }
        Ok(())
    }

    /// Copy `count` bytes from `src` to `dst`; the ranges may overlap.
    fn move_bytes(&mut self, src: u64, dst: u64, count: u64) -> Result<()> {
        if count == 0 || src == dst {
            return Ok(());
        }

        let chunk = self.page_size as u64;
        let mut buf = vec![0u8; chunk.min(count) as usize];

        if dst > src {
            // Moving right: copy from the end so unread source bytes survive
            let mut remaining = count;
            while remaining > 0 {
                let n = chunk.min(remaining);
                let slice = &mut buf[..n as usize];
                self.read_into(src + remaining - n, slice)?;
                self.write_at(dst + remaining - n, slice)?;
                remaining -= n;
            }
        } else {
            let mut moved = 0;
            while moved < count {
                let n = chunk.min(count - moved);
                let slice = &mut buf[..n as usize];
                self.read_into(src + moved, slice)?;
                self.write_at(dst + moved, slice)?;
                moved += n;
            }
        }
        Ok(())
    }

    /// Drop trailing bytes and pages, then truncate the file.
    fn shrink_to(&mut self, new_len: u64) -> Result<()> {
        let keep = new_len.div_ceil(self.page_size as u64) as usize;

        while self.pages.len() > keep {
            if let Some(page) = self.pages.pop() {
                if let Some(frame_id) = page.frame {
                    self.replacer.remove(frame_id);
                    self.frames[frame_id.0].reset();
                    self.free_frames.push(frame_id);
                }
                trace!(page = page.number.0, "dropped page");
            }
        }

        if let Some(last) = self.pages.last_mut() {
            let last_len = (new_len - last.start_position) as usize;
            if last_len < last.len {
                if let Some(frame_id) = last.frame {
                    self.frames[frame_id.0].data_mut().truncate(last_len);
                    last.state = PageState::Dirty;
                }
                last.len = last_len;
            }
        }
        self.len = new_len;

        if self.disk.file_len() > new_len {
            self.disk.set_len(new_len)?;
            self.stats.record(BufferEvent::Truncation);
            debug!(len = new_len, "truncated file after shrinking");
        }
        Ok(())
    }

    // ========================================================================
    // Internal: Guards
    // ========================================================================

    fn check_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    fn check_range(&self, index: u64, count: u64) -> Result<()> {
        match index.checked_add(count) {
            Some(end) if end <= self.len => Ok(()),
            _ => Err(Error::IndexOutOfRange {
                index,
                len: self.len,
            }),
        }
    }
}

impl Drop for PagedFileBuffer {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, "failed to flush paged buffer on drop");
        }
    }
}
