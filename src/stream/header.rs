//! Container header.
//!
//! Every store file starts with a fixed [`ContainerHeader`] describing how
//! the rest of the file is laid out:
//! - byte order and size descriptor strategy for records
//! - constant item size, when the serializer has one
//! - number of reserved streams and number of records
//! - whether some slots are holes left for a recyclable slot index
//! - CRC32 over the header for integrity

use crate::common::{Endianness, Error, Result};
use crate::sizing::SizeDescriptorStrategy;

/// Magic bytes identifying a store file.
pub const MAGIC: [u8; 4] = *b"PGOS";

/// Current on-disk format version.
pub const FORMAT_VERSION: u8 = 1;

const FLAG_CONSTANT_SIZE: u8 = 0b0000_0001;
const FLAG_RECYCLED_SLOTS: u8 = 0b0000_0010;

/// Metadata stored at the beginning of every store file.
///
/// # Layout (32 bytes, little-endian)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       4     magic ("PGOS")
/// 4       1     format version
/// 5       1     endianness (0 = little, 1 = big)
/// 6       1     size descriptor strategy
/// 7       1     flags (bit 0: constant item size, bit 1: recycled slots)
/// 8       4     constant item size
/// 12      4     reserved stream count
/// 16      8     record count
/// 24      4     checksum (CRC32)
/// 28      4     padding
/// ```
///
/// # Checksum
/// Computed over the header with the checksum field itself zeroed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub endianness: Endianness,
    pub size_descriptor: SizeDescriptorStrategy,
    /// Size of every record when the item serializer is constant-size.
    pub constant_size: Option<u32>,
    pub reserved_streams: u32,
    pub record_count: u64,
    /// Some slots are holes that only the recyclable slot index can identify.
    pub recycled_slots: bool,
}

impl ContainerHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 32;

    pub const OFFSET_VERSION: usize = 4;
    pub const OFFSET_ENDIANNESS: usize = 5;
    pub const OFFSET_STRATEGY: usize = 6;
    pub const OFFSET_FLAGS: usize = 7;
    pub const OFFSET_CONSTANT_SIZE: usize = 8;
    pub const OFFSET_RESERVED: usize = 12;
    pub const OFFSET_RECORD_COUNT: usize = 16;
    pub const OFFSET_CHECKSUM: usize = 24;

    /// Encode the header, checksum included.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut data = [0u8; Self::SIZE];
        data[..4].copy_from_slice(&MAGIC);
        data[Self::OFFSET_VERSION] = FORMAT_VERSION;
        data[Self::OFFSET_ENDIANNESS] = self.endianness as u8;
        data[Self::OFFSET_STRATEGY] = self.size_descriptor as u8;

        if let Some(size) = self.constant_size {
            data[Self::OFFSET_FLAGS] |= FLAG_CONSTANT_SIZE;
            data[Self::OFFSET_CONSTANT_SIZE..Self::OFFSET_CONSTANT_SIZE + 4]
                .copy_from_slice(&size.to_le_bytes());
        }

        if self.recycled_slots {
            data[Self::OFFSET_FLAGS] |= FLAG_RECYCLED_SLOTS;
        }

        data[Self::OFFSET_RESERVED..Self::OFFSET_RESERVED + 4]
            .copy_from_slice(&self.reserved_streams.to_le_bytes());
        data[Self::OFFSET_RECORD_COUNT..Self::OFFSET_RECORD_COUNT + 8]
            .copy_from_slice(&self.record_count.to_le_bytes());

        let checksum = Self::compute_checksum(&data);
        data[Self::OFFSET_CHECKSUM..Self::OFFSET_CHECKSUM + 4].copy_from_slice(&checksum.to_le_bytes());
        data
    }

    /// Decode and verify a header.
    ///
    /// # Errors
    /// `Error::Corrupted` on a short buffer, bad magic, unknown version or tag,
    /// or checksum mismatch.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Corrupted(format!(
                "header needs {} bytes, found {}",
                Self::SIZE,
                data.len()
            )));
        }
        let data = &data[..Self::SIZE];

        if data[..4] != MAGIC {
            return Err(Error::Corrupted("bad magic".into()));
        }

        let stored = read_u32(data, Self::OFFSET_CHECKSUM);
        let computed = Self::compute_checksum(data);
        if stored != computed {
            return Err(Error::Corrupted(format!(
                "header checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            )));
        }

        let version = data[Self::OFFSET_VERSION];
        if version != FORMAT_VERSION {
            return Err(Error::Corrupted(format!("unsupported format version {}", version)));
        }

        let endianness = Endianness::from_u8(data[Self::OFFSET_ENDIANNESS])
            .ok_or_else(|| Error::Corrupted("unknown endianness tag".into()))?;
        let size_descriptor = SizeDescriptorStrategy::from_u8(data[Self::OFFSET_STRATEGY])
            .ok_or_else(|| Error::Corrupted("unknown size descriptor tag".into()))?;

        let constant_size = if data[Self::OFFSET_FLAGS] & FLAG_CONSTANT_SIZE != 0 {
            Some(read_u32(data, Self::OFFSET_CONSTANT_SIZE))
        } else {
            None
        };

        let mut count = [0u8; 8];
        count.copy_from_slice(&data[Self::OFFSET_RECORD_COUNT..Self::OFFSET_RECORD_COUNT + 8]);

        Ok(Self {
            endianness,
            size_descriptor,
            constant_size,
            reserved_streams: read_u32(data, Self::OFFSET_RESERVED),
            record_count: u64::from_le_bytes(count),
            recycled_slots: data[Self::OFFSET_FLAGS] & FLAG_RECYCLED_SLOTS != 0,
        })
    }

    /// Check that an opened header describes the same layout as `expected`.
    ///
    /// The record count and the recycled slots flag are not compared.
    pub fn check_layout(&self, expected: &ContainerHeader) -> Result<()> {
        let mismatch = |field: &str, found: String, wanted: String| {
            Err(Error::InvalidArgument(format!(
                "file has {} {}, configuration asks for {}",
                field, found, wanted
            )))
        };

        if self.endianness != expected.endianness {
            return mismatch(
                "endianness",
                format!("{:?}", self.endianness),
                format!("{:?}", expected.endianness),
            );
        }
        if self.size_descriptor != expected.size_descriptor {
            return mismatch(
                "size descriptor",
                format!("{:?}", self.size_descriptor),
                format!("{:?}", expected.size_descriptor),
            );
        }
        if self.constant_size != expected.constant_size {
            return mismatch(
                "constant size",
                format!("{:?}", self.constant_size),
                format!("{:?}", expected.constant_size),
            );
        }
        if self.reserved_streams != expected.reserved_streams {
            return mismatch(
                "reserved stream count",
                self.reserved_streams.to_string(),
                expected.reserved_streams.to_string(),
            );
        }
        Ok(())
    }

    /// CRC32 of the header with the checksum field zeroed.
    pub fn compute_checksum(data: &[u8]) -> u32 {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&data[..Self::OFFSET_CHECKSUM]);
        hasher.update(&[0u8; 4]);
        hasher.update(&data[Self::OFFSET_CHECKSUM + 4..Self::SIZE]);
        hasher.finalize()
    }
}

fn read_u32(data: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> ContainerHeader {
        ContainerHeader {
            endianness: Endianness::Big,
            size_descriptor: SizeDescriptorStrategy::UInt16,
            constant_size: Some(100),
            reserved_streams: 8,
            record_count: 3,
            recycled_slots: false,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let header = sample();
        let bytes = header.to_bytes();
        assert_eq!(ContainerHeader::from_bytes(&bytes).unwrap(), header);
    }

    #[test]
    fn test_header_byte_layout() {
        let bytes = sample().to_bytes();

        assert_eq!(&bytes[..4], b"PGOS");
        assert_eq!(bytes[4], FORMAT_VERSION);
        assert_eq!(bytes[5], 1); // big endian
        assert_eq!(bytes[6], SizeDescriptorStrategy::UInt16 as u8);
        assert_eq!(bytes[7], 1); // constant size flag
        assert_eq!(&bytes[8..12], &100u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &8u32.to_le_bytes());
        assert_eq!(&bytes[16..24], &3u64.to_le_bytes());
    }

    #[test]
    fn test_variable_size_header() {
        let header = ContainerHeader {
            constant_size: None,
            ..sample()
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[7], 0);
        assert_eq!(ContainerHeader::from_bytes(&bytes).unwrap().constant_size, None);
    }

    #[test]
    fn test_recycled_slots_flag() {
        let header = ContainerHeader {
            recycled_slots: true,
            ..sample()
        };
        let bytes = header.to_bytes();
        assert_eq!(bytes[7], 0b11);
        assert!(ContainerHeader::from_bytes(&bytes).unwrap().recycled_slots);
        assert!(header.check_layout(&sample()).is_ok());
    }

    #[test]
    fn test_checksum_detects_bit_flip() {
        let mut bytes = sample().to_bytes();
        bytes[17] ^= 0x01;
        assert!(matches!(
            ContainerHeader::from_bytes(&bytes),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(matches!(
            ContainerHeader::from_bytes(&bytes),
            Err(Error::Corrupted(_))
        ));
    }

    #[test]
    fn test_short_header() {
        assert!(ContainerHeader::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_layout_mismatch() {
        let header = sample();
        let mut other = sample();
        other.record_count = 99;
        assert!(header.check_layout(&other).is_ok());

        other.reserved_streams = 4;
        assert!(matches!(
            header.check_layout(&other),
            Err(Error::InvalidArgument(_))
        ));
    }
}
