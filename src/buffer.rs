//! Chunk buffer.

use rayon::slice::ParallelSliceMut;

/// In-memory chunk limited by record count.
/// Holds at most one memory-sized block of the input stream while it is sorted and written out as a run.
pub struct ChunkBuffer {
    limit: usize,
    inner: Vec<i64>,
}

impl ChunkBuffer {
    /// Creates an empty chunk that allocates lazily.
    pub fn new(limit: usize) -> Self {
        ChunkBuffer {
            limit,
            inner: Vec::new(),
        }
    }

    /// Creates an empty chunk with its whole capacity preallocated.
    pub fn with_capacity(limit: usize) -> Self {
        ChunkBuffer {
            limit,
            inner: Vec::with_capacity(limit),
        }
    }

    /// Adds a new record to the chunk.
    pub fn push(&mut self, item: i64) {
        self.inner.push(item);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the chunk reached the limit.
    pub fn is_full(&self) -> bool {
        self.inner.len() >= self.limit
    }

    /// Sorts the chunk in ascending order.
    /// If a thread pool is provided the sort runs in parallel inside it.
    pub fn sort(&mut self, thread_pool: Option<&rayon::ThreadPool>) {
        match thread_pool {
            Some(thread_pool) => thread_pool.install(|| self.inner.par_sort_unstable()),
            None => self.inner.sort_unstable(),
        }
    }

    /// Drains the chunk keeping its allocation for the next block.
    pub fn drain(&mut self) -> std::vec::Drain<'_, i64> {
        self.inner.drain(..)
    }

    pub fn as_slice(&self) -> &[i64] {
        self.inner.as_slice()
    }
}

impl IntoIterator for ChunkBuffer {
    type Item = i64;
    type IntoIter = <Vec<i64> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::ChunkBuffer;

    #[test]
    fn test_chunk_buffer_limit() {
        let mut buffer = ChunkBuffer::with_capacity(2);

        buffer.push(0);
        assert_eq!(buffer.is_full(), false);
        buffer.push(1);
        assert_eq!(buffer.is_full(), true);

        let data = Vec::from_iter(buffer);
        assert_eq!(data, vec![0, 1]);
    }

    #[rstest]
    #[case(None)]
    #[case(Some(2))]
    fn test_chunk_buffer_sort(#[case] threads: Option<usize>) {
        let thread_pool = threads.map(|n| rayon::ThreadPoolBuilder::new().num_threads(n).build().unwrap());

        let mut buffer = ChunkBuffer::new(8);
        for item in [5, -3, 8, 1, 9, 2, 7, 1] {
            buffer.push(item);
        }
        buffer.sort(thread_pool.as_ref());
        assert_eq!(buffer.as_slice(), &[-3, 1, 1, 2, 5, 7, 8, 9]);

        let drained = Vec::from_iter(buffer.drain());
        assert_eq!(drained.len(), 8);
        assert!(buffer.is_empty());
        assert_eq!(buffer.is_full(), false);
    }
}
