//! Binary heap merger.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::error::Error;

/// Merge frontier entry: the next unread value of a source.
/// Ordering is by value, then by insertion sequence number, so equal values leave the frontier in arrival order.
type FrontierEntry = (Reverse<i64>, Reverse<u64>, usize);

/// Binary heap merger implementation.
/// Merges multiple sorted inputs into a single sorted output.
/// Time complexity is *m* \* log(*n*) in worst case where *m* is the number of items,
/// *n* is the number of sources.
///
/// Duplicate values offered by several sources at once are emitted in the order they entered the frontier.
/// The first error met on any source is yielded once, after that the merger is exhausted.
pub struct Merger<S, E>
where
    E: Error,
    S: Iterator<Item = Result<i64, E>>,
{
    // binary heap is max-heap by default so we reverse it to convert it to min-heap
    frontier: BinaryHeap<FrontierEntry>,
    sources: Vec<S>,
    sequence: u64,
    initiated: bool,
    pending_error: Option<E>,
    failed: bool,
}

impl<S, E> Merger<S, E>
where
    E: Error,
    S: Iterator<Item = Result<i64, E>>,
{
    /// Creates an instance of a merger using provided sources as inputs.
    /// Source items should be sorted in ascending order otherwise the result is undefined.
    ///
    /// # Arguments
    /// * `sources` - Sources to be merged in a single sorted one
    pub fn new<I, C>(sources: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: IntoIterator<IntoIter = S>,
    {
        let sources = Vec::from_iter(sources.into_iter().map(|c| c.into_iter()));
        let frontier = BinaryHeap::with_capacity(sources.len());

        return Merger {
            sources,
            frontier,
            sequence: 0,
            initiated: false,
            pending_error: None,
            failed: false,
        };
    }

    /// Returns the sources back. Sources that were fully merged are exhausted.
    pub fn into_sources(self) -> Vec<S> {
        self.sources
    }

    fn advance(&mut self, idx: usize) -> Result<(), E> {
        if let Some(item) = self.sources[idx].next() {
            let item = item?;
            self.frontier.push((Reverse(item), Reverse(self.sequence), idx));
            self.sequence += 1;
        }

        return Ok(());
    }

    fn fail(&mut self, err: E) -> Option<Result<i64, E>> {
        self.failed = true;
        self.frontier.clear();
        return Some(Err(err));
    }
}

impl<S, E> Iterator for Merger<S, E>
where
    E: Error,
    S: Iterator<Item = Result<i64, E>>,
{
    type Item = Result<i64, E>;

    /// Returns the next item from the inputs in ascending order.
    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        if let Some(err) = self.pending_error.take() {
            return self.fail(err);
        }

        if !self.initiated {
            self.initiated = true;
            for idx in 0..self.sources.len() {
                if let Err(err) = self.advance(idx) {
                    return self.fail(err);
                }
            }
        }

        let (Reverse(result), _, idx) = self.frontier.pop()?;
        if let Err(err) = self.advance(idx) {
            // the popped value is still valid, the error is reported on the next call
            self.pending_error = Some(err);
        }

        return Some(Ok(result));
    }
}

#[cfg(test)]
mod test {
    use rstest::*;
    use std::cell::RefCell;
    use std::error::Error;
    use std::io::{self, ErrorKind};
    use std::rc::Rc;

    use super::Merger;

    #[rstest]
    #[case(
        vec![],
        vec![],
    )]
    #[case(
        vec![
            vec![],
            vec![]
        ],
        vec![],
    )]
    #[case(
        vec![
            vec![Ok(4), Ok(5), Ok(7)],
            vec![Ok(1), Ok(6)],
            vec![Ok(3)],
            vec![],
        ],
        vec![Ok(1), Ok(3), Ok(4), Ok(5), Ok(6), Ok(7)],
    )]
    #[case(
        vec![
            vec![Ok(2), Ok(2), Ok(5)],
            vec![Ok(2), Ok(5)],
            vec![Ok(-1), Ok(5)],
        ],
        vec![Ok(-1), Ok(2), Ok(2), Ok(2), Ok(5), Ok(5), Ok(5)],
    )]
    #[case(
        vec![
            vec![Result::Err(io::Error::new(ErrorKind::Other, "test error"))]
        ],
        vec![
            Result::Err(io::Error::new(ErrorKind::Other, "test error"))
        ],
    )]
    #[case(
        vec![
            vec![Ok(3), Result::Err(io::Error::new(ErrorKind::Other, "test error"))],
            vec![Ok(1), Ok(2)],
        ],
        vec![
            Ok(1),
            Ok(2),
            Ok(3),
            Result::Err(io::Error::new(ErrorKind::Other, "test error")),
        ],
    )]
    fn test_merger(
        #[case] sources: Vec<Vec<Result<i64, io::Error>>>,
        #[case] expected_result: Vec<Result<i64, io::Error>>,
    ) {
        let merger = Merger::new(sources);
        let actual_result = merger.collect();
        assert!(
            compare_vectors_of_result::<_, io::Error>(&actual_result, &expected_result),
            "actual={:?}, expected={:?}",
            actual_result,
            expected_result
        );
    }

    #[test]
    fn test_merger_stops_after_error() {
        let sources = vec![
            vec![Ok(1), Err(io::Error::new(ErrorKind::Other, "test error")), Ok(9)],
            vec![Ok(2), Ok(3), Ok(4)],
        ];
        let mut merger = Merger::new(sources);

        assert_eq!(merger.next().unwrap().unwrap(), 1);
        assert!(merger.next().unwrap().is_err());
        assert!(merger.next().is_none());
        assert!(merger.next().is_none());
    }

    struct LoggedSource {
        id: usize,
        items: std::vec::IntoIter<i64>,
        pulls: Rc<RefCell<Vec<usize>>>,
    }

    impl Iterator for LoggedSource {
        type Item = Result<i64, io::Error>;

        fn next(&mut self) -> Option<Self::Item> {
            self.pulls.borrow_mut().push(self.id);
            self.items.next().map(Ok)
        }
    }

    #[test]
    fn test_merger_ties_leave_in_arrival_order() {
        let pulls = Rc::new(RefCell::new(Vec::new()));
        let sources = vec![vec![7, 7], vec![7], vec![1, 7]]
            .into_iter()
            .enumerate()
            .map(|(id, items)| LoggedSource {
                id,
                items: items.into_iter(),
                pulls: pulls.clone(),
            });

        let merger = Merger::new(sources);
        let result: Result<Vec<i64>, _> = merger.collect();
        assert_eq!(result.unwrap(), vec![1, 7, 7, 7, 7]);

        // a source is pulled right after its value is emitted, so the pulls after priming
        // give the emission order: 1 from source 2, then the sevens of sources 0, 1, 2, 0
        assert_eq!(*pulls.borrow(), vec![0, 1, 2, 2, 0, 1, 2, 0]);
    }

    fn compare_vectors_of_result<T: PartialEq, E: Error + 'static>(
        actual: &Vec<Result<T, E>>,
        expected: &Vec<Result<T, E>>,
    ) -> bool {
        actual.len() == expected.len()
            && actual
                .into_iter()
                .zip(expected)
                .all(
                    |(actual_result, expected_result)| match (actual_result, expected_result) {
                        (Ok(actual_result), Ok(expected_result)) if actual_result == expected_result => true,
                        (Err(actual_err), Err(expected_err)) => actual_err.to_string() == expected_err.to_string(),
                        _ => false,
                    },
                )
    }
}
