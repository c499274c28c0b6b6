//! Constant and variable item sizers.

/// Computes the serialized byte length of an item.
///
/// Constant-size sizers return the same length for every item, which lets
/// callers locate record `i` at `i × size` without reading anything.
pub trait ItemSizer<T: ?Sized> {
    /// The fixed size of every item, or `None` when sizes are data-dependent.
    fn constant_size(&self) -> Option<u64>;

    /// Serialized length of one item.
    fn calculate_size(&self, item: &T) -> u64;

    #[inline]
    fn is_constant_size(&self) -> bool {
        self.constant_size().is_some()
    }

    /// Total length of a batch plus the length of each item.
    fn calculate_total_size(&self, items: &[T]) -> (u64, Vec<u64>)
    where
        T: Sized,
    {
        if let Some(size) = self.constant_size() {
            return (size * items.len() as u64, vec![size; items.len()]);
        }
        let sizes: Vec<u64> = items.iter().map(|item| self.calculate_size(item)).collect();
        (sizes.iter().sum(), sizes)
    }
}

/// Sizer that reports the same length for every item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantSizer {
    size: u64,
}

impl ConstantSizer {
    pub fn new(size: u64) -> Self {
        Self { size }
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

impl<T: ?Sized> ItemSizer<T> for ConstantSizer {
    #[inline]
    fn constant_size(&self) -> Option<u64> {
        Some(self.size)
    }

    #[inline]
    fn calculate_size(&self, _item: &T) -> u64 {
        self.size
    }
}

/// Variable-size sizer backed by a closure.
///
/// # Example
/// ```
/// use pagestore::sizing::{ActionSizer, ItemSizer};
///
/// let sizer = ActionSizer::new(|s: &String| s.len() as u64);
/// assert!(!sizer.is_constant_size());
/// assert_eq!(sizer.calculate_size(&"abc".to_string()), 3);
/// ```
#[derive(Clone)]
pub struct ActionSizer<F> {
    action: F,
}

impl<F> ActionSizer<F> {
    pub fn new(action: F) -> Self {
        Self { action }
    }
}

impl<T: ?Sized, F> ItemSizer<T> for ActionSizer<F>
where
    F: Fn(&T) -> u64,
{
    #[inline]
    fn constant_size(&self) -> Option<u64> {
        None
    }

    #[inline]
    fn calculate_size(&self, item: &T) -> u64 {
        (self.action)(item)
    }
}
