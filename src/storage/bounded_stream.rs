//! Bounded sub-view of a file.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

/// A read/write window onto `[start, end)` of a file.
///
/// Positions are relative to `start`. Reads stop at `end` and writes that
/// would cross it are shortened, so `write_all` past the window fails with
/// `WriteZero`. The stream borrows the file; dropping it leaves the file open.
///
/// # Example
/// ```
/// use std::io::{Read, Seek, SeekFrom, Write};
/// use pagestore::storage::BoundedStream;
///
/// let mut file = tempfile::tempfile().unwrap();
/// file.write_all(b"0123456789").unwrap();
///
/// let mut window = BoundedStream::new(&mut file, 4, 8);
/// let mut buf = String::new();
/// window.read_to_string(&mut buf).unwrap();
/// assert_eq!(buf, "4567");
///
/// window.seek(SeekFrom::Start(0)).unwrap();
/// window.write_all(b"ab").unwrap();
/// drop(window);
///
/// file.seek(SeekFrom::Start(0)).unwrap();
/// let mut all = String::new();
/// file.read_to_string(&mut all).unwrap();
/// assert_eq!(all, "0123ab6789");
/// ```
pub struct BoundedStream<'a> {
    file: &'a mut File,
    start: u64,
    end: u64,
    position: u64,
}

impl<'a> BoundedStream<'a> {
    /// Window over `[start, end)`.
    pub fn new(file: &'a mut File, start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "window start past end");
        Self {
            file,
            start,
            end,
            position: 0,
        }
    }

    /// Size of the window in bytes.
    #[inline]
    pub fn window_len(&self) -> u64 {
        self.end - self.start
    }

    #[inline]
    fn remaining(&self) -> u64 {
        self.window_len().saturating_sub(self.position)
    }

    /// Read until `buf` is full or the file ends. Returns the bytes read.
    pub fn read_fill(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl Read for BoundedStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = (buf.len() as u64).min(self.remaining()) as usize;
        if len == 0 {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start(self.start + self.position))?;
        let n = self.file.read(&mut buf[..len])?;
        self.position += n as u64;
        Ok(n)
    }
}

impl Write for BoundedStream<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let len = (buf.len() as u64).min(self.remaining()) as usize;
        if len == 0 {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start(self.start + self.position))?;
        let n = self.file.write(&buf[..len])?;
        self.position += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl Seek for BoundedStream<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(delta) => self.position as i128 + delta as i128,
            SeekFrom::End(delta) => self.window_len() as i128 + delta as i128,
        };
        if target < 0 || target > self.window_len() as i128 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek outside of bounded stream",
            ));
        }
        self.position = target as u64;
        Ok(self.position)
    }
}
