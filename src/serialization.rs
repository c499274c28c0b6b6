//! Item and key serializers.
//!
//! The store never interprets record bytes itself; it hands items to an
//! [`ItemSerializer`]. Two implementations ship with the crate:
//! - [`BincodeSerializer`] - any `serde` type, variable size
//! - [`FixedWidthSerializer`] - primitive integers, constant size

use std::io::Write;
use std::marker::PhantomData;

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::{Endianness, Error, Result};

/// Converts items to and from bytes.
///
/// Constant-size serializers let the store compute record offsets directly;
/// variable-size records are prefixed with a size descriptor.
pub trait ItemSerializer<T>: Send + Sync {
    /// Append the encoding of `item` to `buf`.
    fn serialize(&self, item: &T, buf: &mut Vec<u8>) -> Result<()>;

    /// Decode an item from exactly `bytes`.
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;

    /// Size of every encoding, or `None` when sizes vary.
    fn constant_size(&self) -> Option<u64>;

    #[inline]
    fn is_constant_size(&self) -> bool {
        self.constant_size().is_some()
    }

    fn serialize_to_vec(&self, item: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.serialize(item, &mut buf)?;
        Ok(buf)
    }
}

/// Encode with bincode's fixed-int encoding in the given byte order.
pub(crate) fn encode_with<W, S>(endianness: Endianness, writer: W, value: &S) -> Result<()>
where
    W: Write,
    S: Serialize + ?Sized,
{
    let options = bincode::DefaultOptions::new().with_fixint_encoding();
    match endianness {
        Endianness::Little => options.with_little_endian().serialize_into(writer, value)?,
        Endianness::Big => options.with_big_endian().serialize_into(writer, value)?,
    }
    Ok(())
}

/// Decode with bincode's fixed-int encoding in the given byte order.
pub(crate) fn decode_with<D: DeserializeOwned>(endianness: Endianness, bytes: &[u8]) -> Result<D> {
    let options = bincode::DefaultOptions::new().with_fixint_encoding();
    let value: D = match endianness {
        Endianness::Little => options.with_little_endian().deserialize(bytes)?,
        Endianness::Big => options.with_big_endian().deserialize(bytes)?,
    };
    Ok(value)
}

/// Default serializer for any `serde` type.
///
/// # Example
/// ```
/// use pagestore::common::Endianness;
/// use pagestore::serialization::{BincodeSerializer, ItemSerializer};
///
/// let serializer = BincodeSerializer::<String>::new(Endianness::Little);
/// let bytes = serializer.serialize_to_vec(&"hello".to_string()).unwrap();
/// assert_eq!(serializer.deserialize(&bytes).unwrap(), "hello");
/// ```
pub struct BincodeSerializer<T> {
    endianness: Endianness,
    _item: PhantomData<fn() -> T>,
}

impl<T> BincodeSerializer<T> {
    pub fn new(endianness: Endianness) -> Self {
        Self {
            endianness,
            _item: PhantomData,
        }
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }
}

impl<T> Clone for BincodeSerializer<T> {
    fn clone(&self) -> Self {
        Self::new(self.endianness)
    }
}

impl<T> ItemSerializer<T> for BincodeSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, item: &T, buf: &mut Vec<u8>) -> Result<()> {
        encode_with(self.endianness, buf, item)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        decode_with(self.endianness, bytes)
    }

    fn constant_size(&self) -> Option<u64> {
        None
    }
}

/// Primitive integers with a fixed encoded width.
pub trait FixedWidth: Copy + Send + Sync + 'static {
    const WIDTH: usize;

    fn write_to(self, endianness: Endianness, buf: &mut Vec<u8>);

    fn read_from(endianness: Endianness, bytes: &[u8]) -> Self;
}

macro_rules! impl_fixed_width {
    ($($ty:ty),*) => {
        $(
            impl FixedWidth for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                #[inline]
                fn write_to(self, endianness: Endianness, buf: &mut Vec<u8>) {
                    match endianness {
                        Endianness::Little => buf.extend_from_slice(&self.to_le_bytes()),
                        Endianness::Big => buf.extend_from_slice(&self.to_be_bytes()),
                    }
                }

                #[inline]
                fn read_from(endianness: Endianness, bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(&bytes[..Self::WIDTH]);
                    match endianness {
                        Endianness::Little => <$ty>::from_le_bytes(raw),
                        Endianness::Big => <$ty>::from_be_bytes(raw),
                    }
                }
            }
        )*
    };
}

impl_fixed_width!(u8, u16, u32, u64, i8, i16, i32, i64);

/// Constant-size serializer for primitive integers.
pub struct FixedWidthSerializer<T> {
    endianness: Endianness,
    _item: PhantomData<fn() -> T>,
}

impl<T> FixedWidthSerializer<T> {
    pub fn new(endianness: Endianness) -> Self {
        Self {
            endianness,
            _item: PhantomData,
        }
    }
}

impl<T> Clone for FixedWidthSerializer<T> {
    fn clone(&self) -> Self {
        Self::new(self.endianness)
    }
}

impl<T: FixedWidth> ItemSerializer<T> for FixedWidthSerializer<T> {
    fn serialize(&self, item: &T, buf: &mut Vec<u8>) -> Result<()> {
        item.write_to(self.endianness, buf);
        Ok(())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<T> {
        if bytes.len() != T::WIDTH {
            return Err(Error::Serialization(format!(
                "expected {} bytes, found {}",
                T::WIDTH,
                bytes.len()
            )));
        }
        Ok(T::read_from(self.endianness, bytes))
    }

    fn constant_size(&self) -> Option<u64> {
        Some(T::WIDTH as u64)
    }
}
