//! LRU (Least Recently Used) replacement policy.

use std::collections::{BTreeMap, HashMap};

use crate::common::FrameId;

/// Evicts the frame whose last access is oldest.
///
/// Each access stamps the frame with a monotonically increasing tick, so
/// eviction order is fully determined by the access sequence.
#[derive(Debug, Default)]
pub struct LruReplacer {
    /// Access tick → frame, oldest first.
    by_tick: BTreeMap<u64, FrameId>,

    /// Frame → its latest tick, for O(log n) re-stamping.
    ticks: HashMap<FrameId, u64>,

    next_tick: u64,
}

impl LruReplacer {
    /// Create a new LRU replacer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that a frame was accessed, making it the most recently used.
    pub fn record_access(&mut self, frame_id: FrameId) {
        if let Some(old) = self.ticks.insert(frame_id, self.next_tick) {
            self.by_tick.remove(&old);
        }
        self.by_tick.insert(self.next_tick, frame_id);
        self.next_tick += 1;
    }

    /// Select a victim frame for eviction.
    ///
    /// Returns the least recently used frame, or None if no frame is tracked.
    pub fn evict(&mut self) -> Option<FrameId> {
        let (_, frame_id) = self.by_tick.pop_first()?;
        self.ticks.remove(&frame_id);
        Some(frame_id)
    }

    /// Remove a frame from the replacer entirely.
    ///
    /// Called when a page is dropped from the buffer without eviction.
    pub fn remove(&mut self, frame_id: FrameId) {
        if let Some(tick) = self.ticks.remove(&frame_id) {
            self.by_tick.remove(&tick);
        }
    }

    /// Number of tracked frames.
    pub fn size(&self) -> usize {
        self.ticks.len()
    }
}
