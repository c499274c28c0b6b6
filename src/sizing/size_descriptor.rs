//! Size descriptors - length prefixes for variable-size records.
//!
//! Six encodings are supported:
//!
//! ```text
//! Strategy  Bytes   Layout
//! --------  -----   ------
//! VarInt    1,3,5,9 < 0xFD: one byte; else 0xFD|0xFE|0xFF marker + u16|u32|u64
//! CVarInt   1..=10  base-128 groups, most significant first, high bit = more
//! UInt8     1       u8
//! UInt16    2       u16
//! UInt32    4       u32
//! UInt64    8       u64
//! ```
//!
//! Multi-byte integers use the configured [`Endianness`]. `CVarInt` subtracts
//! one from the remaining value before every continuation group, so each value
//! has exactly one encoding.

use crate::common::{Endianness, Error, Result};
use crate::sizing::ItemSizer;

/// Length prefix encoding.
///
/// Uses `#[repr(u8)]` so the strategy can be recorded in a container header.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeDescriptorStrategy {
    VarInt = 0,
    #[default]
    CVarInt = 1,
    UInt8 = 2,
    UInt16 = 3,
    UInt32 = 4,
    UInt64 = 5,
}

impl SizeDescriptorStrategy {
    /// Convert from the on-disk tag.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::VarInt),
            1 => Some(Self::CVarInt),
            2 => Some(Self::UInt8),
            3 => Some(Self::UInt16),
            4 => Some(Self::UInt32),
            5 => Some(Self::UInt64),
            _ => None,
        }
    }

    /// Width of the fixed strategies.
    pub fn fixed_width(&self) -> Option<usize> {
        match self {
            Self::UInt8 => Some(1),
            Self::UInt16 => Some(2),
            Self::UInt32 => Some(4),
            Self::UInt64 => Some(8),
            Self::VarInt | Self::CVarInt => None,
        }
    }

    /// Largest length the strategy can describe.
    pub fn max_value(&self) -> u64 {
        match self {
            Self::UInt8 => u8::MAX as u64,
            Self::UInt16 => u16::MAX as u64,
            Self::UInt32 => u32::MAX as u64,
            Self::UInt64 | Self::VarInt | Self::CVarInt => u64::MAX,
        }
    }

    /// Longest encoding the strategy can produce.
    pub fn max_encoded_len(&self) -> usize {
        match self {
            Self::VarInt => 9,
            Self::CVarInt => 10,
            fixed => fixed.fixed_width().unwrap_or(8),
        }
    }
}

const VARINT_U16: u8 = 0xFD;
const VARINT_U32: u8 = 0xFE;
const VARINT_U64: u8 = 0xFF;

/// Encodes and decodes record length prefixes.
///
/// # Example
/// ```
/// use pagestore::common::Endianness;
/// use pagestore::sizing::{SizeDescriptorSerializer, SizeDescriptorStrategy};
///
/// let descriptor = SizeDescriptorSerializer::new(SizeDescriptorStrategy::CVarInt, Endianness::Little);
/// let mut buf = Vec::new();
/// descriptor.encode(300, &mut buf).unwrap();
/// assert_eq!(descriptor.decode(&buf).unwrap(), (300, buf.len()));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizeDescriptorSerializer {
    strategy: SizeDescriptorStrategy,
    endianness: Endianness,
}

impl SizeDescriptorSerializer {
    pub fn new(strategy: SizeDescriptorStrategy, endianness: Endianness) -> Self {
        Self {
            strategy,
            endianness,
        }
    }

    pub fn strategy(&self) -> SizeDescriptorStrategy {
        self.strategy
    }

    /// Number of bytes `encode` writes for `len`.
    pub fn encoded_len(&self, len: u64) -> usize {
        match self.strategy {
            SizeDescriptorStrategy::VarInt => match len {
                0..=0xFC => 1,
                0xFD..=0xFFFF => 3,
                0x1_0000..=0xFFFF_FFFF => 5,
                _ => 9,
            },
            SizeDescriptorStrategy::CVarInt => {
                let mut n = len;
                let mut count = 1;
                while n > 0x7F {
                    n = (n >> 7) - 1;
                    count += 1;
                }
                count
            }
            fixed => fixed.fixed_width().unwrap_or(8),
        }
    }

    /// Append the descriptor for `len` to `buf`.
    ///
    /// # Errors
    /// `Error::InvalidArgument` if a fixed-width strategy cannot hold `len`.
    pub fn encode(&self, len: u64, buf: &mut Vec<u8>) -> Result<()> {
        if len > self.strategy.max_value() {
            return Err(Error::InvalidArgument(format!(
                "length {} does not fit a {:?} size descriptor",
                len, self.strategy
            )));
        }

        match self.strategy {
            SizeDescriptorStrategy::VarInt => match len {
                0..=0xFC => buf.push(len as u8),
                0xFD..=0xFFFF => {
                    buf.push(VARINT_U16);
                    self.put_fixed(len, 2, buf);
                }
                0x1_0000..=0xFFFF_FFFF => {
                    buf.push(VARINT_U32);
                    self.put_fixed(len, 4, buf);
                }
                _ => {
                    buf.push(VARINT_U64);
                    self.put_fixed(len, 8, buf);
                }
            },
            SizeDescriptorStrategy::CVarInt => {
                let mut tmp = [0u8; 10];
                let mut n = len;
                let mut i = 0;
                loop {
                    tmp[i] = (n & 0x7F) as u8 | if i > 0 { 0x80 } else { 0x00 };
                    if n <= 0x7F {
                        break;
                    }
                    n = (n >> 7) - 1;
                    i += 1;
                }
                buf.extend(tmp[..=i].iter().rev());
            }
            fixed => {
                let width = fixed.fixed_width().unwrap_or(8);
                self.put_fixed(len, width, buf);
            }
        }
        Ok(())
    }

    /// Decode a descriptor from the front of `bytes`.
    ///
    /// Returns `(len, bytes_consumed)`.
    ///
    /// # Errors
    /// `Error::Corrupted` if the descriptor is truncated or overflows.
    pub fn decode(&self, bytes: &[u8]) -> Result<(u64, usize)> {
        let truncated = || Error::Corrupted(format!("truncated {:?} size descriptor", self.strategy));

        match self.strategy {
            SizeDescriptorStrategy::VarInt => {
                let first = *bytes.first().ok_or_else(truncated)?;
                let width = match first {
                    VARINT_U16 => 2,
                    VARINT_U32 => 4,
                    VARINT_U64 => 8,
                    small => return Ok((small as u64, 1)),
                };
                let value = self.get_fixed(bytes.get(1..1 + width).ok_or_else(truncated)?);
                Ok((value, 1 + width))
            }
            SizeDescriptorStrategy::CVarInt => {
                let mut n: u64 = 0;
                for (i, &byte) in bytes.iter().enumerate() {
                    if n > (u64::MAX >> 7) {
                        return Err(Error::Corrupted("CVarInt size descriptor overflows".into()));
                    }
                    n = (n << 7) | (byte & 0x7F) as u64;
                    if byte & 0x80 == 0 {
                        return Ok((n, i + 1));
                    }
                    if n == u64::MAX {
                        return Err(Error::Corrupted("CVarInt size descriptor overflows".into()));
                    }
                    n += 1;
                }
                Err(truncated())
            }
            fixed => {
                let width = fixed.fixed_width().unwrap_or(8);
                let value = self.get_fixed(bytes.get(..width).ok_or_else(truncated)?);
                Ok((value, width))
            }
        }
    }

    fn put_fixed(&self, value: u64, width: usize, buf: &mut Vec<u8>) {
        match self.endianness {
            Endianness::Little => buf.extend_from_slice(&value.to_le_bytes()[..width]),
            Endianness::Big => buf.extend_from_slice(&value.to_be_bytes()[8 - width..]),
        }
    }

    fn get_fixed(&self, bytes: &[u8]) -> u64 {
        let mut raw = [0u8; 8];
        match self.endianness {
            Endianness::Little => {
                raw[..bytes.len()].copy_from_slice(bytes);
                u64::from_le_bytes(raw)
            }
            Endianness::Big => {
                raw[8 - bytes.len()..].copy_from_slice(bytes);
                u64::from_be_bytes(raw)
            }
        }
    }
}

/// The descriptor itself is an item whose size depends on the length it encodes.
impl ItemSizer<u64> for SizeDescriptorSerializer {
    fn constant_size(&self) -> Option<u64> {
        self.strategy.fixed_width().map(|w| w as u64)
    }

    fn calculate_size(&self, len: &u64) -> u64 {
        self.encoded_len(*len) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn encode(strategy: SizeDescriptorStrategy, endianness: Endianness, len: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        SizeDescriptorSerializer::new(strategy, endianness)
            .encode(len, &mut buf)
            .unwrap();
        buf
    }

    #[test]
    fn test_strategy_from_u8() {
        assert_eq!(SizeDescriptorStrategy::from_u8(0), Some(SizeDescriptorStrategy::VarInt));
        assert_eq!(SizeDescriptorStrategy::from_u8(5), Some(SizeDescriptorStrategy::UInt64));
        assert_eq!(SizeDescriptorStrategy::from_u8(6), None);
    }

    #[test]
    fn test_cvarint_known_encodings() {
        let cases: [(u64, &[u8]); 9] = [
            (0, &[0x00]),
            (127, &[0x7F]),
            (128, &[0x80, 0x00]),
            (255, &[0x80, 0x7F]),
            (256, &[0x81, 0x00]),
            (16383, &[0xFE, 0x7F]),
            (16384, &[0xFF, 0x00]),
            (65535, &[0x82, 0xFE, 0x7F]),
            (1 << 32, &[0x8E, 0xFE, 0xFE, 0xFF, 0x00]),
        ];

        for (value, expected) in cases {
            assert_eq!(
                encode(SizeDescriptorStrategy::CVarInt, Endianness::Little, value),
                expected,
                "value {}",
                value
            );
        }
    }

    #[test]
    fn test_varint_markers() {
        let le = Endianness::Little;
        assert_eq!(encode(SizeDescriptorStrategy::VarInt, le, 0xFC), vec![0xFC]);
        assert_eq!(encode(SizeDescriptorStrategy::VarInt, le, 0xFD), vec![0xFD, 0xFD, 0x00]);
        assert_eq!(
            encode(SizeDescriptorStrategy::VarInt, le, 0x1_0000),
            vec![0xFE, 0x00, 0x00, 0x01, 0x00]
        );
        assert_eq!(encode(SizeDescriptorStrategy::VarInt, le, u64::MAX).len(), 9);
    }

    #[test]
    fn test_fixed_width_respects_endianness() {
        assert_eq!(
            encode(SizeDescriptorStrategy::UInt16, Endianness::Little, 0x0102),
            vec![0x02, 0x01]
        );
        assert_eq!(
            encode(SizeDescriptorStrategy::UInt16, Endianness::Big, 0x0102),
            vec![0x01, 0x02]
        );
        assert_eq!(
            encode(SizeDescriptorStrategy::UInt32, Endianness::Big, 7),
            vec![0, 0, 0, 7]
        );
    }

    #[test]
    fn test_fixed_width_overflow_rejected() {
        let descriptor =
            SizeDescriptorSerializer::new(SizeDescriptorStrategy::UInt8, Endianness::Little);
        let mut buf = Vec::new();
        assert!(matches!(
            descriptor.encode(256, &mut buf),
            Err(Error::InvalidArgument(_))
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_truncated_descriptor_is_corruption() {
        let descriptor =
            SizeDescriptorSerializer::new(SizeDescriptorStrategy::CVarInt, Endianness::Little);
        assert!(matches!(descriptor.decode(&[0x80]), Err(Error::Corrupted(_))));

        let descriptor =
            SizeDescriptorSerializer::new(SizeDescriptorStrategy::VarInt, Endianness::Little);
        assert!(matches!(descriptor.decode(&[0xFE, 0x01]), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_only_fixed_strategies_are_constant_size() {
        let le = Endianness::Little;
        for strategy in [SizeDescriptorStrategy::VarInt, SizeDescriptorStrategy::CVarInt] {
            assert!(!SizeDescriptorSerializer::new(strategy, le).is_constant_size());
        }
        let fixed = SizeDescriptorSerializer::new(SizeDescriptorStrategy::UInt32, le);
        assert_eq!(fixed.constant_size(), Some(4));
        assert_eq!(fixed.calculate_size(&1), 4);
    }

    fn any_strategy() -> impl Strategy<Value = SizeDescriptorStrategy> {
        (0u8..6).prop_map(|tag| SizeDescriptorStrategy::from_u8(tag).unwrap())
    }

    proptest! {
        /// Every encodable length decodes back, consuming exactly what was written.
        #[test]
        fn prop_descriptor_decodes_what_it_encodes(
            strategy in any_strategy(),
            big_endian in any::<bool>(),
            len in any::<u64>(),
        ) {
            let endianness = if big_endian { Endianness::Big } else { Endianness::Little };
            let descriptor = SizeDescriptorSerializer::new(strategy, endianness);
            let len = len.min(strategy.max_value());

            let mut buf = Vec::new();
            descriptor.encode(len, &mut buf).unwrap();
            buf.extend_from_slice(&[0xAA, 0xBB]);

            let (decoded, consumed) = descriptor.decode(&buf).unwrap();
            prop_assert_eq!(decoded, len);
            prop_assert_eq!(consumed, descriptor.encoded_len(len));
            prop_assert!(consumed <= strategy.max_encoded_len());
        }
    }
}
