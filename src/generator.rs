//! Run generator.

use std::error::Error;

use crate::buffer::ChunkBuffer;
use crate::codec::RecordCodec;
use crate::distribution::DistributionTable;
use crate::sort::SortError;
use crate::tape::Tape;

/// Run generation statistics.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationSummary {
    /// Number of records read from the input.
    pub records: u64,
    /// Number of runs written.
    pub runs: u64,
    /// Number of runs written to each run file.
    pub runs_per_tape: Vec<u64>,
}

/// Splits the input into memory-sized sorted runs and distributes them over the run files
/// according to a [`DistributionTable`].
pub struct RunGenerator<'a> {
    table: &'a DistributionTable,
    /// Maximum number of records kept in memory.
    chunk_size: usize,
    /// Preallocate the whole chunk buffer up front.
    preallocate: bool,
    /// Chunk sorting thread pool.
    thread_pool: Option<&'a rayon::ThreadPool>,
}

impl<'a> RunGenerator<'a> {
    pub fn new(
        table: &'a DistributionTable,
        chunk_size: usize,
        preallocate: bool,
        thread_pool: Option<&'a rayon::ThreadPool>,
    ) -> Self {
        RunGenerator {
            table,
            chunk_size,
            preallocate,
            thread_pool,
        }
    }

    /// Reads the input stream chunk by chunk, sorts every chunk and appends it as a run to one of the tapes.
    ///
    /// Tape `i` receives `table[i]` runs before the next tape is selected, a zero entry gives the tape exactly
    /// one run. The last tape takes all the runs left once it is reached.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `tapes` - Run files, one per distribution table entry
    pub fn generate<I, E, C>(&self, input: I, tapes: &mut [Tape<C>]) -> Result<GenerationSummary, SortError<E>>
    where
        I: IntoIterator<Item = Result<i64, E>>,
        E: Error,
        C: RecordCodec,
    {
        if tapes.len() != self.table.len() {
            return Err(SortError::InvalidParameter(format!(
                "{} run files provided, distribution table expects {}",
                tapes.len(),
                self.table.len()
            )));
        }
        if self.chunk_size == 0 {
            return Err(SortError::InvalidParameter("chunk size must be positive".into()));
        }

        let last_tape = tapes.len() - 1;
        let mut tape_idx = 0;
        let mut remaining = self.table.get(tape_idx);

        let mut chunk = if self.preallocate {
            ChunkBuffer::with_capacity(self.chunk_size)
        } else {
            ChunkBuffer::new(self.chunk_size)
        };

        let mut summary = GenerationSummary {
            runs_per_tape: vec![0; tapes.len()],
            ..GenerationSummary::default()
        };

        let mut input = input.into_iter();
        loop {
            for item in input.by_ref() {
                chunk.push(item.map_err(SortError::InputError)?);
                if chunk.is_full() {
                    break;
                }
            }

            if chunk.is_empty() {
                break;
            }

            log::debug!("sorting chunk data ...");
            chunk.sort(self.thread_pool);

            log::debug!("saving run to tape {}", tape_idx);
            let run_len = tapes[tape_idx].append_run(chunk.drain().map(Ok))?;

            summary.records += run_len;
            summary.runs += 1;
            summary.runs_per_tape[tape_idx] += 1;

            remaining = remaining.saturating_sub(1);
            if remaining == 0 && tape_idx < last_tape {
                tape_idx += 1;
                remaining = self.table.get(tape_idx);
            }
        }

        log::debug!(
            "run generation done: {} records in {} runs {:?}",
            summary.records,
            summary.runs,
            summary.runs_per_tape
        );

        return Ok(summary);
    }
}
