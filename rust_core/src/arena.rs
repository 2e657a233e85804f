/// Segmented bump storage that owns every record created during one
/// evaluation.
///
/// Elements live in fixed-size blocks that are never reallocated once
/// created, so growth never moves existing records. `reset` rewinds the
/// cursor and keeps the blocks for reuse; because `T: Copy` there is no
/// per-element destructor to run, and the cost is proportional to the
/// number of blocks rather than the number of elements.
#[derive(Debug, Clone)]
pub struct Arena<T: Copy> {
    blocks: Vec<Vec<T>>,
    len: usize,
}

const BLOCK_SHIFT: usize = 12;
/// Elements per block.
pub const BLOCK_LEN: usize = 1 << BLOCK_SHIFT;
const BLOCK_MASK: usize = BLOCK_LEN - 1;

impl<T: Copy> Arena<T> {
    pub fn new() -> Self {
        Self {
            blocks: Vec::new(),
            len: 0,
        }
    }

    /// Create an arena with enough blocks reserved for `capacity` elements.
    pub fn with_capacity(capacity: usize) -> Self {
        let n_blocks = capacity.div_ceil(BLOCK_LEN);
        Self {
            blocks: (0..n_blocks).map(|_| Vec::with_capacity(BLOCK_LEN)).collect(),
            len: 0,
        }
    }

    /// Append one element and return its flat index.
    #[inline]
    pub fn push(&mut self, value: T) -> usize {
        let index = self.len;
        let block = index >> BLOCK_SHIFT;
        if block == self.blocks.len() {
            self.blocks.push(Vec::with_capacity(BLOCK_LEN));
        }
        self.blocks[block].push(value);
        self.len += 1;
        index
    }

    /// Append every element of `values`; returns the flat index of the first.
    pub fn extend_from_slice(&mut self, values: &[T]) -> usize {
        let start = self.len;
        for &v in values {
            self.push(v);
        }
        start
    }

    #[inline]
    pub fn get(&self, index: usize) -> &T {
        debug_assert!(index < self.len, "arena index {index} out of range");
        &self.blocks[index >> BLOCK_SHIFT][index & BLOCK_MASK]
    }

    #[inline]
    pub fn get_mut(&mut self, index: usize) -> &mut T {
        debug_assert!(index < self.len, "arena index {index} out of range");
        &mut self.blocks[index >> BLOCK_SHIFT][index & BLOCK_MASK]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of blocks currently held, in use or not.
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Invalidate every element. Blocks are kept for reuse.
    pub fn reset(&mut self) {
        let in_use = self.len.div_ceil(BLOCK_LEN);
        for block in &mut self.blocks[..in_use] {
            block.clear();
        }
        self.len = 0;
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &T> + '_ {
        self.blocks.iter().flat_map(|b| b.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> + '_ {
        self.blocks.iter_mut().flat_map(|b| b.iter_mut())
    }
}

impl<T: Copy> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_across_blocks() {
        let mut arena = Arena::new();
        for i in 0..(BLOCK_LEN * 2 + 5) {
            assert_eq!(arena.push(i as f64), i);
        }
        assert_eq!(arena.len(), BLOCK_LEN * 2 + 5);
        assert_eq!(arena.block_count(), 3);
        assert_eq!(*arena.get(BLOCK_LEN + 7), (BLOCK_LEN + 7) as f64);
        *arena.get_mut(3) += 0.5;
        assert_eq!(*arena.get(3), 3.5);
    }

    #[test]
    fn test_reset_keeps_blocks() {
        let mut arena = Arena::new();
        for i in 0..(BLOCK_LEN + 1) {
            arena.push(i);
        }
        arena.reset();
        assert!(arena.is_empty());
        assert_eq!(arena.block_count(), 2);

        assert_eq!(arena.push(42usize), 0);
        assert_eq!(*arena.get(0), 42);
        assert_eq!(arena.block_count(), 2);
    }

    #[test]
    fn test_extend_from_slice_returns_start() {
        let mut arena = Arena::with_capacity(10);
        arena.push(1usize);
        let start = arena.extend_from_slice(&[7, 8, 9]);
        assert_eq!(start, 1);
        let collected: Vec<usize> = arena.iter().copied().collect();
        assert_eq!(collected, vec![1, 7, 8, 9]);
    }
}
