//! `polyphase-sort` is an external polyphase merge sort for signed integers.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts chunks of data that each fit in RAM, during the second pass it merges the sorted chunks
//! together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! * **Fibonacci run distribution:**
//!   sorted runs are distributed over `m - 1` auxiliary files following a generalized Fibonacci sequence
//!   of order `m - 2`.
//! * **Polyphase merging:**
//!   when a file receives more than one run, runs are merged across the files, using the spare `m`-th file,
//!   until every file holds a single sorted sequence.
//! * **k-way merge:**
//!   the final pass merges all the files with a binary heap, equal values leave in the order they arrived.
//! * **Bounded memory:**
//!   only one chunk is kept in memory during run generation and one value per file during merging.
//! * **Codec agnostic:**
//!   temporary data is stored as decimal text by default or as `MessagePack`, any other encoding can be plugged in
//!   through [`RecordCodec`].
//!
//! # Example
//!
//! ```no_run
//! use std::fs;
//! use std::io;
//! use std::path;
//!
//! use polyphase_sort::{ExternalSorter, ExternalSorterBuilder, RecordReader, RecordWriter};
//!
//! fn main() {
//!     let input: RecordReader<_> = RecordReader::new(io::BufReader::new(fs::File::open("input.txt").unwrap()));
//!     let mut output: RecordWriter<_> = RecordWriter::new(io::BufWriter::new(fs::File::create("output.txt").unwrap()));
//!
//!     let sorter: ExternalSorter<_> = ExternalSorterBuilder::new()
//!         .with_tmp_dir(path::Path::new("./"))
//!         .with_tapes(4)
//!         .with_memory_budget(50 * 1024 * 1024)
//!         .build()
//!         .unwrap();
//!
//!     sorter.sort_into(input, &mut output).unwrap();
//! }
//! ```

pub mod buffer;
pub mod codec;
pub mod distribution;
pub mod generator;
pub mod merger;
pub mod polyphase;
pub mod sort;
pub mod tape;

pub use buffer::ChunkBuffer;
pub use codec::{CodecError, RecordCodec, RecordReader, RecordWriter, RmpCodec, TextCodec};
pub use distribution::{fibonacci_sequence, polyphase_distribution, DistributionError, DistributionTable};
pub use generator::{GenerationSummary, RunGenerator};
pub use merger::Merger;
pub use polyphase::ReductionSummary;
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortedStream};
pub use tape::{RunCursor, Tape};
