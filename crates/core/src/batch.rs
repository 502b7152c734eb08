use std::num::NonZeroUsize;

/// A contiguous slice of the manifest processed as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Batch<'a, T> {
    /// Zero-based batch number, used for the `batch_{n}` directory.
    pub number: usize,
    /// Manifest position of the first item.
    pub offset: usize,
    pub items: &'a [T],
}

impl<T> Batch<'_, T> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Number of batches for `n` items: ⌈n / size⌉.
pub fn batch_count(n: usize, size: NonZeroUsize) -> usize {
    n.div_ceil(size.get())
}

/// Split `items` into batches of `size`; the last holds the remainder and is
/// never empty. Yields nothing for an empty slice.
pub fn partition<T>(items: &[T], size: NonZeroUsize) -> impl Iterator<Item = Batch<'_, T>> {
    items
        .chunks(size.get())
        .enumerate()
        .map(move |(number, items)| Batch { number, offset: number * size.get(), items })
}
