//! Page descriptors.
//!
//! A [`Page`] records which byte range of the file a page covers and whether
//! its bytes are resident. The bytes themselves live in a [`Frame`](super::Frame).

use std::fmt;

use crate::common::{FrameId, PageId};

/// Residency of a page.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    /// Bytes are only on disk.
    #[default]
    Unloaded,
    /// Bytes are resident and match the file.
    Loaded,
    /// Bytes are resident and differ from the file.
    Dirty,
}

/// A contiguous byte range `[start_position, end_position]` of the file.
///
/// Pages are contiguous and non-overlapping: page `n + 1` starts one byte
/// after page `n` ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub(crate) number: PageId,
    pub(crate) start_position: u64,
    pub(crate) len: usize,
    pub(crate) state: PageState,
    pub(crate) frame: Option<FrameId>,
}

impl Page {
    pub(crate) fn new(number: PageId, start_position: u64, len: usize) -> Self {
        Self {
            number,
            start_position,
            len,
            state: PageState::Unloaded,
            frame: None,
        }
    }

    #[inline]
    pub fn number(&self) -> PageId {
        self.number
    }

    #[inline]
    pub fn start_position(&self) -> u64 {
        self.start_position
    }

    /// Last byte covered by the page (inclusive).
    #[inline]
    pub fn end_position(&self) -> u64 {
        self.start_position + self.len as u64 - 1
    }

    /// Number of bytes the page holds.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn state(&self) -> PageState {
        self.state
    }

    #[inline]
    pub fn is_resident(&self) -> bool {
        self.frame.is_some()
    }
}

impl fmt::Display for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}..={}] {:?}",
            self.number,
            self.start_position,
            self.end_position(),
            self.state
        )
    }
}
