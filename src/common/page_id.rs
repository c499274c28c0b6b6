//! Page number type.

use std::fmt;

/// Identifies a page of the backing file by its position in the page chain.
///
/// Page numbers are dense and monotonically increasing: page `n` starts at
/// byte `n × page_size`.
///
/// # Example
/// ```
/// use pagestore::PageId;
///
/// let page_id = PageId::new(3);
/// assert_eq!(page_id.start_position(4096), 12288);
/// assert_eq!(page_id.next(), PageId::new(4));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Create a new PageId.
    #[inline]
    pub fn new(id: u32) -> Self {
        PageId(id)
    }

    /// The page following this one.
    #[inline]
    pub fn next(&self) -> Self {
        PageId(self.0 + 1)
    }

    /// First byte this page covers for the given page size.
    #[inline]
    pub fn start_position(&self, page_size: usize) -> u64 {
        self.0 as u64 * page_size as u64
    }

    /// Page containing the given byte position.
    #[inline]
    pub fn containing(position: u64, page_size: usize) -> Self {
        PageId((position / page_size as u64) as u32)
    }

    /// Index into a page vector.
    #[inline]
    pub fn as_index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_id_new() {
        let pid = PageId::new(42);
        assert_eq!(pid.0, 42);
        assert_eq!(pid.as_index(), 42);
    }

    #[test]
    fn test_page_id_containing() {
        assert_eq!(PageId::containing(0, 100), PageId::new(0));
        assert_eq!(PageId::containing(99, 100), PageId::new(0));
        assert_eq!(PageId::containing(100, 100), PageId::new(1));
        assert_eq!(PageId::containing(250, 100), PageId::new(2));
    }

    #[test]
    fn test_page_id_ordering() {
        assert!(PageId::new(1) < PageId::new(2));
        assert!(PageId::new(5) > PageId::new(3));
        assert_eq!(PageId::new(5).next(), PageId::new(6));
    }

    #[test]
    fn test_page_id_display() {
        assert_eq!(format!("{}", PageId::new(42)), "Page(42)");
    }
}
