//! Configuration for pagestore.
//!
//! Constants used across the crate plus [`StoreConfig`], the set of knobs an
//! [`ObjectStream`](crate::stream::ObjectStream) is opened with.

use crate::common::{Error, Result};
use crate::sizing::SizeDescriptorStrategy;

/// Default size of a page in bytes (4KB).
///
/// Matches the OS page size on most systems.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default memory budget for resident pages (1MB, i.e. 256 default pages).
pub const DEFAULT_MAX_MEMORY: usize = 1024 * 1024;

/// Default number of reserved streams at the head of a container.
pub const DEFAULT_RESERVED_STREAMS: usize = 8;

/// Upper bound on reserved streams; keeps the directory inside the first page.
pub const MAX_RESERVED_STREAMS: usize = 256;

/// Byte order used for fixed-width item, key and descriptor encodings.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    #[default]
    Little = 0,
    Big = 1,
}

impl Endianness {
    /// Convert from the on-disk tag.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Endianness::Little),
            1 => Some(Endianness::Big),
            _ => None,
        }
    }
}

/// Configuration for a single store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Size of every page except the last.
    pub page_size: usize,

    /// Memory budget for resident pages, in bytes.
    /// At least one page is always allowed.
    pub max_memory: usize,

    /// Number of logical streams reserved for attachment metadata.
    pub reserved_streams: usize,

    /// Byte order for fixed-width encodings.
    pub endianness: Endianness,

    /// Length prefix encoding for variable-size records.
    pub size_descriptor: SizeDescriptorStrategy,

    /// Reject every mutation and open the file without write access.
    pub read_only: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_memory: DEFAULT_MAX_MEMORY,
            reserved_streams: DEFAULT_RESERVED_STREAMS,
            endianness: Endianness::Little,
            size_descriptor: SizeDescriptorStrategy::CVarInt,
            read_only: false,
        }
    }
}

impl StoreConfig {
    /// Create a new config builder
    pub fn builder() -> StoreConfigBuilder {
        StoreConfigBuilder::default()
    }

    /// Number of pages the memory budget allows to be resident at once.
    pub fn max_open_pages(&self) -> usize {
        (self.max_memory / self.page_size).max(1)
    }

    /// Check the invariants the rest of the crate relies on.
    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(Error::InvalidArgument("page_size must be > 0".into()));
        }
        if self.max_memory < self.page_size {
            return Err(Error::InvalidArgument(format!(
                "max_memory ({}) must hold at least one page ({})",
                self.max_memory, self.page_size
            )));
        }
        if self.reserved_streams > MAX_RESERVED_STREAMS {
            return Err(Error::InvalidArgument(format!(
                "reserved_streams ({}) exceeds {}",
                self.reserved_streams, MAX_RESERVED_STREAMS
            )));
        }
        Ok(())
    }
}

/// Builder for [`StoreConfig`]
#[derive(Default)]
pub struct StoreConfigBuilder {
    config: StoreConfig,
}

impl StoreConfigBuilder {
    /// Set the page size (in bytes)
    pub fn page_size(mut self, size: usize) -> Self {
        self.config.page_size = size;
        self
    }

    /// Set the resident page memory budget (in bytes)
    pub fn max_memory(mut self, bytes: usize) -> Self {
        self.config.max_memory = bytes;
        self
    }

    /// Set the number of reserved streams
    pub fn reserved_streams(mut self, count: usize) -> Self {
        self.config.reserved_streams = count;
        self
    }

    /// Set the byte order for fixed-width encodings
    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.config.endianness = endianness;
        self
    }

    /// Set the size descriptor strategy for variable-size records
    pub fn size_descriptor(mut self, strategy: SizeDescriptorStrategy) -> Self {
        self.config.size_descriptor = strategy;
        self
    }

    /// Open in read-only mode
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.config.read_only = read_only;
        self
    }

    pub fn build(self) -> Result<StoreConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_page_size_is_power_of_two() {
        assert!(DEFAULT_PAGE_SIZE.is_power_of_two());
        assert_eq!(StoreConfig::default().page_size, 4096);
    }

    #[test]
    fn test_max_open_pages() {
        let config = StoreConfig::builder()
            .page_size(100)
            .max_memory(350)
            .build()
            .unwrap();
        assert_eq!(config.max_open_pages(), 3);
    }

    #[test]
    fn test_builder_rejects_zero_page_size() {
        let result = StoreConfig::builder().page_size(0).build();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_builder_rejects_budget_below_one_page() {
        let result = StoreConfig::builder().page_size(4096).max_memory(100).build();
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_builder_rejects_too_many_reserved_streams() {
        let result = StoreConfig::builder().reserved_streams(1000).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_endianness_tag() {
        assert_eq!(Endianness::from_u8(0), Some(Endianness::Little));
        assert_eq!(Endianness::from_u8(1), Some(Endianness::Big));
        assert_eq!(Endianness::from_u8(9), None);
    }
}
