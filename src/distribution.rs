//! Fibonacci run distribution.

use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Distribution table construction error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionError {
    /// Auxiliary file count is too small to form a positive Fibonacci order.
    TooFewFiles(usize),
    /// Table entry does not fit into `u64`.
    Overflow { index: usize },
}

impl Error for DistributionError {}

impl Display for DistributionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            DistributionError::TooFewFiles(files) => {
                write!(f, "at least 3 auxiliary files required, got {}", files)
            }
            DistributionError::Overflow { index } => write!(f, "distribution table overflow at entry {}", index),
        }
    }
}

/// Generates the first `len` members of the generalized Fibonacci sequence of order `order`.
///
/// The sequence starts with `order` zeros followed by a one, every next member is the sum of the `order + 1`
/// preceding ones.
pub fn fibonacci_sequence(order: usize, len: usize) -> Result<Vec<u64>, DistributionError> {
    let mut sequence = Vec::with_capacity(len);
    sequence.extend(std::iter::repeat(0).take(order.min(len)));
    if len > order {
        sequence.push(1);
    }

    for idx in (order + 1)..len {
        let mut sum: u64 = 0;
        for member in &sequence[idx - (order + 1)..idx] {
            sum = sum
                .checked_add(*member)
                .ok_or(DistributionError::Overflow { index: idx })?;
        }
        sequence.push(sum);
    }

    return Ok(sequence);
}

/// Smallest perfect polyphase distribution holding at least `runs` runs on `tapes` input tapes,
/// largest share first.
///
/// Levels start from a single run on one tape, the next level is `next[i] = prev[0] + prev[i + 1]`. A tape
/// holding `next[i]` runs keeps `prev[i + 1]` of them after the merge phase that empties the last tape.
pub fn polyphase_distribution(tapes: usize, runs: u64) -> Result<Vec<u64>, DistributionError> {
    if tapes < 2 {
        return Err(DistributionError::TooFewFiles(tapes + 1));
    }

    let mut level: Vec<u64> = vec![0; tapes];
    level[0] = 1;
    let mut total: u64 = 1;

    while total < runs {
        let head = level[0];
        for idx in 0..tapes {
            let next = level.get(idx + 1).copied().unwrap_or(0);
            level[idx] = head.checked_add(next).ok_or(DistributionError::Overflow { index: idx })?;
        }

        total = 0;
        for (idx, share) in level.iter().enumerate() {
            total = total
                .checked_add(*share)
                .ok_or(DistributionError::Overflow { index: idx })?;
        }
    }

    return Ok(level);
}

/// Run distribution table. Entry `i` is the number of runs assigned to the auxiliary file `i`
/// before the next one is selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionTable {
    entries: Vec<u64>,
}

impl DistributionTable {
    /// Builds the table for `files` auxiliary files: `files - 1` run files and the Fibonacci order of `files - 2`.
    ///
    /// # Arguments
    /// * `files` - Auxiliary file count, must be at least 3.
    pub fn new(files: usize) -> Result<Self, DistributionError> {
        if files < 3 {
            return Err(DistributionError::TooFewFiles(files));
        }

        let entries = fibonacci_sequence(files - 2, files - 1)?;
        log::debug!("run distribution table for {} files: {:?}", files, entries);

        return Ok(DistributionTable { entries });
    }

    /// Number of run files the table distributes over.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, idx: usize) -> u64 {
        self.entries[idx]
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.entries
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::{fibonacci_sequence, polyphase_distribution, DistributionError, DistributionTable};

    #[rstest]
    #[case(3, vec![0, 1])]
    #[case(4, vec![0, 0, 1])]
    #[case(5, vec![0, 0, 0, 1])]
    #[case(8, vec![0, 0, 0, 0, 0, 0, 1])]
    fn test_distribution_table(#[case] files: usize, #[case] expected: Vec<u64>) {
        let table = DistributionTable::new(files).unwrap();
        assert_eq!(table.as_slice(), expected.as_slice());
    }

    #[test]
    fn test_distribution_table_shape() {
        for files in 3..64 {
            let table = DistributionTable::new(files).unwrap();
            assert_eq!(table.len(), files - 1);
            assert_eq!(table.get(files - 2), 1);
        }
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    fn test_distribution_table_too_few_files(#[case] files: usize) {
        assert_eq!(DistributionTable::new(files), Err(DistributionError::TooFewFiles(files)));
    }

    #[rstest]
    #[case(1, 8, vec![0, 1, 1, 2, 3, 5, 8, 13])]
    #[case(2, 8, vec![0, 0, 1, 1, 2, 4, 7, 13])]
    #[case(3, 9, vec![0, 0, 0, 1, 1, 2, 4, 8, 15])]
    #[case(4, 2, vec![0, 0])]
    fn test_fibonacci_sequence(#[case] order: usize, #[case] len: usize, #[case] expected: Vec<u64>) {
        assert_eq!(fibonacci_sequence(order, len).unwrap(), expected);
    }

    #[test]
    fn test_fibonacci_sequence_overflow() {
        assert_eq!(fibonacci_sequence(1, 200), Err(DistributionError::Overflow { index: 94 }));
    }

    #[rstest]
    #[case(3, 0, vec![1, 0, 0])]
    #[case(3, 1, vec![1, 0, 0])]
    #[case(3, 2, vec![1, 1, 1])]
    #[case(3, 4, vec![2, 2, 1])]
    #[case(3, 6, vec![4, 3, 2])]
    #[case(3, 200, vec![149, 125, 81])]
    #[case(2, 4, vec![3, 2])]
    #[case(7, 200, vec![64, 63, 62, 60, 56, 48, 32])]
    fn test_polyphase_distribution(#[case] tapes: usize, #[case] runs: u64, #[case] expected: Vec<u64>) {
        assert_eq!(polyphase_distribution(tapes, runs).unwrap(), expected);
    }

    #[test]
    fn test_polyphase_distribution_too_few_tapes() {
        assert_eq!(polyphase_distribution(1, 5), Err(DistributionError::TooFewFiles(2)));
    }
}
