//! Item sizing.
//!
//! Serialized lengths drive all offset arithmetic in the store:
//! - [`ItemSizer`] - constant or variable size of an item
//! - [`SizeDescriptorSerializer`] - length prefixes for variable-size records

mod item_sizer;
mod size_descriptor;

pub use item_sizer::{ActionSizer, ConstantSizer, ItemSizer};
pub use size_descriptor::{SizeDescriptorSerializer, SizeDescriptorStrategy};
