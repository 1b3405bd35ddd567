//! External sorter.

use log;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;
use std::marker::PhantomData;
use std::mem;
use std::path::Path;

use crate::codec::{CodecError, RecordCodec, RecordWriter, TextCodec};
use crate::distribution::{DistributionError, DistributionTable};
use crate::generator::RunGenerator;
use crate::merger::Merger;
use crate::polyphase;
use crate::tape::{RunCursor, Tape};

/// Default number of auxiliary files.
pub const DEFAULT_TAPES: usize = 4;
/// Default number of records kept in memory, 8 MiB of `i64`.
pub const DEFAULT_CHUNK_SIZE: u64 = 1 << 20;

/// Sorting error.
#[derive(Debug)]
pub enum SortError<I: Error> {
    /// Sorter configuration is invalid.
    InvalidParameter(String),
    /// Temporary directory or file creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Common I/O error.
    IO(io::Error),
    /// Stored record could not be decoded.
    MalformedInput(String),
    /// Input data stream error
    InputError(I),
}

impl<I> Error for SortError<I>
where
    I: Error + 'static,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::InvalidParameter(_) => None,
            SortError::TempDir(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::MalformedInput(_) => None,
            SortError::InputError(err) => Some(err),
        }
    }
}

impl<I: Error> Display for SortError<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::InvalidParameter(msg) => write!(f, "invalid sorter parameter: {}", msg),
            SortError::TempDir(err) => write!(f, "temporary directory or file not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::MalformedInput(msg) => write!(f, "malformed record: {}", msg),
            SortError::InputError(err) => write!(f, "input data stream error: {}", err),
        }
    }
}

impl<I: Error> From<CodecError> for SortError<I> {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::IO(err) => SortError::IO(err),
            CodecError::Malformed(msg) => SortError::MalformedInput(msg),
        }
    }
}

impl<I: Error> From<DistributionError> for SortError<I> {
    fn from(err: DistributionError) -> Self {
        SortError::InvalidParameter(err.to_string())
    }
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder<E, C = TextCodec>
where
    E: Error,
    C: RecordCodec,
{
    /// Number of auxiliary files.
    tapes: usize,
    /// Number of records sorted in memory at once.
    chunk_size: u64,
    /// Preallocate chunk buffer memory.
    preallocate: bool,
    /// Number of threads to be used to sort chunks in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store temporary data.
    tmp_dir: Option<Box<Path>>,
    /// Tape file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Temporary data codec.
    codec: C,

    /// Input error type.
    input_error_type: PhantomData<E>,
}

impl<E, C> ExternalSorterBuilder<E, C>
where
    E: Error,
    C: RecordCodec,
{
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<E, C>, SortError<E>> {
        ExternalSorter::new(
            self.tapes,
            self.chunk_size,
            self.preallocate,
            self.threads_number,
            self.tmp_dir.as_deref(),
            self.rw_buf_size,
            self.codec,
        )
    }

    /// Sets number of auxiliary files. One of them is kept free for polyphase merging,
    /// runs are distributed over the others.
    pub fn with_tapes(mut self, tapes: usize) -> ExternalSorterBuilder<E, C> {
        self.tapes = tapes;
        return self;
    }

    /// Sets number of records to be sorted in memory at once.
    pub fn with_chunk_size(mut self, chunk_size: u64) -> ExternalSorterBuilder<E, C> {
        self.chunk_size = chunk_size;
        return self;
    }

    /// Derives the chunk size from the memory available for sorting, in bytes.
    pub fn with_memory_budget(mut self, bytes: u64) -> ExternalSorterBuilder<E, C> {
        self.chunk_size = bytes / mem::size_of::<i64>() as u64;
        return self;
    }

    /// Allocates the whole chunk buffer up front.
    pub fn with_preallocation(mut self, preallocate: bool) -> ExternalSorterBuilder<E, C> {
        self.preallocate = preallocate;
        return self;
    }

    /// Sets number of threads to be used to sort chunks in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder<E, C> {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store temporary data.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder<E, C> {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets tape file read/write buffer size.
    pub fn with_rw_buf_size(mut self, buf_size: usize) -> ExternalSorterBuilder<E, C> {
        self.rw_buf_size = Some(buf_size);
        return self;
    }

    /// Sets the codec temporary data is stored with.
    pub fn with_codec(mut self, codec: C) -> ExternalSorterBuilder<E, C> {
        self.codec = codec;
        return self;
    }
}

impl<E, C> Default for ExternalSorterBuilder<E, C>
where
    E: Error,
    C: RecordCodec,
{
    fn default() -> Self {
        ExternalSorterBuilder {
            tapes: DEFAULT_TAPES,
            chunk_size: DEFAULT_CHUNK_SIZE,
            preallocate: false,
            threads_number: None,
            tmp_dir: None,
            rw_buf_size: None,
            codec: C::default(),
            input_error_type: PhantomData,
        }
    }
}

/// External sorter.
pub struct ExternalSorter<E, C = TextCodec>
where
    E: Error,
    C: RecordCodec,
{
    /// Number of auxiliary files.
    tapes: usize,
    /// Number of records sorted in memory at once.
    chunk_size: usize,
    /// Preallocate chunk buffer memory.
    preallocate: bool,
    /// Run distribution table computed for the tapes number.
    table: DistributionTable,
    /// Chunk sorting thread pool.
    thread_pool: Option<rayon::ThreadPool>,
    /// Directory to be used to store temporary data.
    tmp_dir: tempfile::TempDir,
    /// Tape file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Temporary data codec.
    codec: C,

    /// Input error type.
    input_error_type: PhantomData<E>,
}

impl<E, C> ExternalSorter<E, C>
where
    E: Error,
    C: RecordCodec,
{
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `tapes` - Number of auxiliary files, at least 3.
    /// * `chunk_size` - Number of records sorted in memory at once, must be positive.
    /// * `preallocate` - Allocate the chunk buffer up front.
    /// * `threads_number` - Number of threads to be used to sort chunks in parallel. If the parameter is [`None`]
    ///   or 1 chunks are sorted on the calling thread.
    /// * `tmp_path` - Directory to be used to store temporary data. If parameter is [`None`] default OS temporary
    ///   directory will be used.
    /// * `rw_buf_size` - Tape files read/write buffer size.
    /// * `codec` - Temporary data codec.
    pub fn new(
        tapes: usize,
        chunk_size: u64,
        preallocate: bool,
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        rw_buf_size: Option<usize>,
        codec: C,
    ) -> Result<Self, SortError<E>> {
        let table = DistributionTable::new(tapes)?;
        let chunk_size = Self::validate_chunk_size(chunk_size)?;

        log::info!("sorting with {} tapes, {} records per chunk", tapes, chunk_size);

        return Ok(ExternalSorter {
            tapes,
            chunk_size,
            preallocate,
            table,
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
            rw_buf_size,
            codec,
            input_error_type: PhantomData,
        });
    }

    fn validate_chunk_size(chunk_size: u64) -> Result<usize, SortError<E>> {
        if chunk_size == 0 {
            return Err(SortError::InvalidParameter("chunk size must be positive".into()));
        }

        return usize::try_from(chunk_size).map_err(|_| {
            SortError::InvalidParameter(format!("chunk size {} exceeds addressable memory", chunk_size))
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<Option<rayon::ThreadPool>, SortError<E>> {
        let threads_number = match threads_number {
            Some(threads_number) if threads_number > 1 => threads_number,
            _ => {
                log::info!("sorting chunks on the calling thread");
                return Ok(None);
            }
        };

        log::info!("initializing thread-pool (threads: {})", threads_number);
        let thread_pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads_number)
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(Some(thread_pool));
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir, SortError<E>> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Run distribution table used by the sorter.
    pub fn distribution(&self) -> &DistributionTable {
        &self.table
    }

    /// Sorts data from the input.
    /// Returns an iterator that can be used to get sorted data stream.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    pub fn sort<I>(&self, input: I) -> Result<SortedStream<C>, SortError<E>>
    where
        I: IntoIterator<Item = Result<i64, E>>,
    {
        let workdir = tempfile::tempdir_in(self.tmp_dir.path()).map_err(|err| SortError::TempDir(err))?;
        let mut tapes = Vec::with_capacity(self.tapes);
        for idx in 0..self.tapes {
            let tape = Tape::create(workdir.path(), idx, self.codec.clone(), self.rw_buf_size)
                .map_err(|err| SortError::TempDir(err))?;
            tapes.push(tape);
        }

        let generator = RunGenerator::new(&self.table, self.chunk_size, self.preallocate, self.thread_pool.as_ref());
        let generation = generator.generate(input, &mut tapes[..self.tapes - 1])?;
        log::info!("{} records split into {} runs", generation.records, generation.runs);

        let reduction = polyphase::reduce(&mut tapes)?;
        if reduction.phases > 0 {
            log::info!(
                "polyphase reduction done in {} phases ({} runs, {} records merged, {} runs moved)",
                reduction.phases,
                reduction.merged_runs,
                reduction.merged_records,
                reduction.moved_runs
            );
        }

        let mut cursors = Vec::with_capacity(self.tapes);
        for tape in tapes.iter_mut() {
            if let Some(cursor) = tape.next_run()? {
                cursors.push(cursor);
            }
        }

        log::debug!("external sort preparation done, merging {} tapes", cursors.len());

        return Ok(SortedStream {
            merger: Merger::new(cursors),
            records: generation.records,
            _workdir: workdir,
        });
    }

    /// Sorts data from the input and writes the result to the writer.
    /// Returns the number of records written.
    ///
    /// # Arguments
    /// * `input` - Input stream data to be fetched from
    /// * `output` - Sorted data destination
    pub fn sort_into<I, W, D>(&self, input: I, output: &mut RecordWriter<W, D>) -> Result<u64, SortError<E>>
    where
        I: IntoIterator<Item = Result<i64, E>>,
        W: Write,
        D: RecordCodec,
    {
        let mut written = 0;
        for item in self.sort(input)? {
            output.write(item?)?;
            written += 1;
        }
        output.flush()?;

        return Ok(written);
    }
}

/// Sorted data stream.
/// Owns the temporary files of a single sort, they are removed when the stream is dropped.
pub struct SortedStream<C: RecordCodec> {
    merger: Merger<RunCursor<C>, CodecError>,
    records: u64,
    _workdir: tempfile::TempDir,
}

impl<C: RecordCodec> SortedStream<C> {
    /// Total number of records the stream yields.
    pub fn records(&self) -> u64 {
        self.records
    }
}

impl<C: RecordCodec> Iterator for SortedStream<C> {
    type Item = Result<i64, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.merger.next()
    }
}
