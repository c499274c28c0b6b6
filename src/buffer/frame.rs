//! Frame - a slot in the page cache arena.
//!
//! A [`Frame`] holds the resident bytes of one page plus the metadata
//! needed for write-back:
//! - Which page is loaded (if any)
//! - Dirty flag for write-back tracking

use crate::common::PageId;

/// A frame in the page cache.
///
/// Frames are the "slots" of the cache. Each frame can hold one page.
/// The paged buffer allocates its frames up front and recycles them on
/// eviction; the byte buffer keeps its capacity across reuse.
#[derive(Debug, Default)]
pub struct Frame {
    /// Resident page bytes; `data.len()` equals the page length.
    data: Vec<u8>,

    /// Which page is currently loaded, or None if frame is empty.
    page_id: Option<PageId>,

    /// Whether the bytes have been modified since loading.
    is_dirty: bool,
}

impl Frame {
    /// Create a new empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Page data
    // ========================================================================

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the bytes; marks the frame dirty.
    #[inline]
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        self.is_dirty = true;
        &mut self.data
    }

    /// Load `len` zeroed bytes for `page_id` and hand back the buffer to fill.
    pub(crate) fn load(&mut self, page_id: PageId, len: usize) -> &mut [u8] {
        self.data.clear();
        self.data.resize(len, 0);
        self.page_id = Some(page_id);
        self.is_dirty = false;
        &mut self.data
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Get the page ID of the loaded page.
    #[inline]
    pub fn page_id(&self) -> Option<PageId> {
        self.page_id
    }

    /// Mark the frame as dirty (modified).
    #[inline]
    pub fn mark_dirty(&mut self) {
        self.is_dirty = true;
    }

    /// Clear the dirty flag.
    #[inline]
    pub fn clear_dirty(&mut self) {
        self.is_dirty = false;
    }

    /// Check if the frame is dirty.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty
    }

    /// Check if the frame is empty (no page loaded).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.page_id.is_none()
    }

    /// Reset the frame to empty state.
    ///
    /// Called after eviction to prepare for reuse.
    pub fn reset(&mut self) {
        self.data.clear();
        self.page_id = None;
        self.is_dirty = false;
    }
}
