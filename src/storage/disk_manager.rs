//! Disk Manager - low-level file I/O for store pages.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing pages through [`BoundedStream`] windows
//! - Growing and truncating the backing file
//! - Tracking the file length

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::common::{Error, PageId, Result};
use crate::storage::BoundedStream;

/// Manages disk I/O for a single store file.
///
/// # File Layout
/// The store is one file with pages laid out sequentially:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬──────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N   │
/// │ full    │ full    │ full    │         │ remainder│
/// └─────────┴─────────┴─────────┴─────────┴──────────┘
/// Offset:  0     P       2P       ...      N×P
/// ```
///
/// Page N is located at file offset `N × page_size`. Only the last page may
/// be shorter than `page_size`.
///
/// # Thread Safety
/// `DiskManager` is **single-threaded**. The paged buffer owns it outright.
///
/// # Durability
/// Writes go to the OS; [`DiskManager::sync`] forces them to disk.
pub struct DiskManager {
    file: File,
    /// Current length of the file in bytes.
    len: u64,
    read_only: bool,
}

impl DiskManager {
    /// Create a new store file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            len: 0,
            read_only: false,
        })
    }

    /// Open an existing store file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(!read_only)
            .open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            file,
            len,
            read_only,
        })
    }

    /// Open an existing store file, or create if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P, read_only: bool) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path, read_only)
        } else if read_only {
            Err(Error::ReadOnly)
        } else {
            Self::create(path)
        }
    }

    /// Read `buf.len()` bytes of a page from disk.
    ///
    /// # Errors
    /// Returns `Error::Corrupted` if the file holds fewer bytes than requested;
    /// the caller's page accounting no longer matches the file.
    pub fn read_page(&mut self, page_id: PageId, page_size: usize, buf: &mut [u8]) -> Result<()> {
        let mut stream = self.page_stream(page_id, page_size);
        let read = stream.read_fill(buf)?;

        if read < buf.len() {
            return Err(Error::Corrupted(format!(
                "{} expected {} bytes but file yielded {}",
                page_id,
                buf.len(),
                read
            )));
        }
        Ok(())
    }

    /// Write page bytes to disk, growing the file if needed.
    pub fn write_page(&mut self, page_id: PageId, page_size: usize, data: &[u8]) -> Result<()> {
        self.check_writable()?;

        let required = page_id.start_position(page_size) + data.len() as u64;
        if required > self.len {
            self.set_len(required)?;
        }

        let mut stream = self.page_stream(page_id, page_size);
        stream.write_all(data)?;
        Ok(())
    }

    /// Resize the file to exactly `len` bytes.
    pub fn set_len(&mut self, len: u64) -> Result<()> {
        self.check_writable()?;
        self.file.set_len(len)?;
        self.len = len;
        Ok(())
    }

    /// Flush OS buffers to the device.
    pub fn sync(&mut self) -> Result<()> {
        if !self.read_only {
            self.file.sync_all()?;
        }
        Ok(())
    }

    /// A window over one page of the file.
    pub fn page_stream(&mut self, page_id: PageId, page_size: usize) -> BoundedStream<'_> {
        let start = page_id.start_position(page_size);
        BoundedStream::new(&mut self.file, start, start + page_size as u64)
    }

    /// Get the current length of the file in bytes.
    #[inline]
    pub fn file_len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn check_writable(&self) -> Result<()> {
        if self.read_only {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }
}
