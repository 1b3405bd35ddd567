//! Auxiliary run files.
//!
//! A tape is a file on the file system holding a sequence of sorted runs. The runs carry no metadata on disk,
//! their lengths are kept in an in-memory ledger so that a tape can be consumed one run at a time.

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::codec::{CodecError, RecordCodec, RecordReader, RecordWriter};

type TapeReader<C> = RecordReader<io::BufReader<fs::File>, C>;

/// Opens a file for sequential record reading.
pub fn open_records<C: RecordCodec>(
    path: &Path,
    codec: C,
    buf_size: Option<usize>,
) -> io::Result<TapeReader<C>> {
    let file = fs::File::open(path)?;
    let reader = match buf_size {
        Some(buf_size) => io::BufReader::with_capacity(buf_size, file),
        None => io::BufReader::new(file),
    };

    return Ok(RecordReader::with_codec(reader, codec));
}

/// Auxiliary run file.
pub struct Tape<C: RecordCodec> {
    index: usize,
    path: PathBuf,
    codec: C,
    /// Tape file read/write buffer size.
    rw_buf_size: Option<usize>,
    /// Lengths of the runs not yet consumed, in records.
    runs: VecDeque<u64>,
    /// Read position, kept open between runs.
    reader: Option<TapeReader<C>>,
}

impl<C: RecordCodec> Tape<C> {
    /// Creates an empty tape file `tape-<index>.run` in the directory. An existing file is truncated.
    pub fn create(dir: &Path, index: usize, codec: C, rw_buf_size: Option<usize>) -> io::Result<Self> {
        let path = dir.join(format!("tape-{}.run", index));
        fs::File::create(&path)?;

        return Ok(Tape {
            index,
            path,
            codec,
            rw_buf_size,
            runs: VecDeque::new(),
            reader: None,
        });
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of runs not yet consumed.
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Lengths of the runs not yet consumed.
    pub fn run_lengths(&self) -> impl Iterator<Item = u64> + '_ {
        self.runs.iter().copied()
    }

    /// Appends a run to the end of the tape. The file is opened for this run only and flushed before return.
    /// Returns the run length. An empty run is recorded as a dummy run.
    pub fn append_run<I>(&mut self, items: I) -> Result<u64, CodecError>
    where
        I: IntoIterator<Item = Result<i64, CodecError>>,
    {
        let file = fs::OpenOptions::new().append(true).open(&self.path)?;
        let writer = match self.rw_buf_size {
            Some(buf_size) => io::BufWriter::with_capacity(buf_size, file),
            None => io::BufWriter::new(file),
        };

        let mut writer = RecordWriter::with_codec(writer, self.codec.clone());
        for item in items {
            writer.write(item?)?;
        }

        let run_len = writer.written();
        writer.into_inner()?;

        self.runs.push_back(run_len);
        log::trace!("tape {}: run of {} records appended", self.index, run_len);

        return Ok(run_len);
    }

    /// Puts `count` empty runs in front of the tape. Dummy runs take no space in the file.
    pub fn prepend_dummy_runs(&mut self, count: u64) {
        for _ in 0..count {
            self.runs.push_front(0);
        }
    }

    /// Detaches the next run from the tape. The returned cursor owns the tape read position until it is given
    /// back with [`Tape::restore`].
    pub fn next_run(&mut self) -> Result<Option<RunCursor<C>>, CodecError> {
        let remaining = match self.runs.pop_front() {
            Some(remaining) => remaining,
            None => return Ok(None),
        };

        let reader = match self.reader.take() {
            Some(reader) => reader,
            None => open_records(&self.path, self.codec.clone(), self.rw_buf_size)?,
        };

        return Ok(Some(RunCursor { reader, remaining }));
    }

    /// Gives back the read position taken by [`Tape::next_run`]. The reader is closed once the tape is exhausted.
    pub fn restore(&mut self, cursor: RunCursor<C>) {
        if !self.runs.is_empty() {
            self.reader = Some(cursor.reader);
        }
    }

    /// Discards the tape content so that it can be reused as an output tape.
    pub fn truncate(&mut self) -> io::Result<()> {
        self.reader = None;
        self.runs.clear();
        fs::File::create(&self.path)?;

        return Ok(());
    }
}

/// Run-bounded tape cursor. Yields exactly the records of one run.
pub struct RunCursor<C: RecordCodec> {
    reader: TapeReader<C>,
    remaining: u64,
}

impl<C: RecordCodec> RunCursor<C> {
    /// Number of run records not read yet.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }
}

impl<C: RecordCodec> Iterator for RunCursor<C> {
    type Item = Result<i64, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        match self.reader.read() {
            Ok(Some(item)) => {
                self.remaining -= 1;
                Some(Ok(item))
            }
            Ok(None) => {
                let missing = self.remaining;
                self.remaining = 0;
                Some(Err(CodecError::Malformed(format!(
                    "tape ended {} records before the end of the run",
                    missing
                ))))
            }
            Err(err) => {
                self.remaining = 0;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;

    use crate::codec::{CodecError, RmpCodec, TextCodec};

    use super::{open_records, Tape};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    fn ok(items: Vec<i64>) -> impl Iterator<Item = Result<i64, CodecError>> {
        items.into_iter().map(Ok)
    }

    #[rstest]
    fn test_tape_runs(tmp_dir: tempfile::TempDir) {
        let mut tape = Tape::create(tmp_dir.path(), 0, TextCodec, None).unwrap();
        assert!(tape.is_empty());

        assert_eq!(tape.append_run(ok(vec![1, 4, 9])).unwrap(), 3);
        assert_eq!(tape.append_run(ok(vec![])).unwrap(), 0);
        assert_eq!(tape.append_run(ok(vec![-2, 0])).unwrap(), 2);
        assert_eq!(Vec::from_iter(tape.run_lengths()), vec![3, 0, 2]);

        let mut first = tape.next_run().unwrap().unwrap();
        assert_eq!(first.remaining(), 3);
        let items: Result<Vec<i64>, _> = first.by_ref().collect();
        assert_eq!(items.unwrap(), vec![1, 4, 9]);
        tape.restore(first);

        let mut dummy = tape.next_run().unwrap().unwrap();
        assert_eq!(dummy.remaining(), 0);
        assert_eq!(dummy.by_ref().count(), 0);
        tape.restore(dummy);

        let second = tape.next_run().unwrap().unwrap();
        let items: Result<Vec<i64>, _> = second.collect();
        assert_eq!(items.unwrap(), vec![-2, 0]);

        assert!(tape.is_empty());
        assert!(tape.next_run().unwrap().is_none());

        let content = fs::read_to_string(tape.path()).unwrap();
        assert_eq!(content, "1\n4\n9\n-2\n0\n");
    }

    #[rstest]
    fn test_tape_dummy_runs(tmp_dir: tempfile::TempDir) {
        let mut tape = Tape::create(tmp_dir.path(), 5, TextCodec, None).unwrap();
        assert_eq!(tape.index(), 5);
        assert!(tape.path().ends_with("tape-5.run"));

        tape.append_run(ok(vec![2, 3])).unwrap();
        tape.prepend_dummy_runs(2);
        assert_eq!(Vec::from_iter(tape.run_lengths()), vec![0, 0, 2]);

        let mut items = Vec::new();
        while let Some(mut cursor) = tape.next_run().unwrap() {
            items.extend(cursor.by_ref().map(Result::unwrap));
            tape.restore(cursor);
        }
        assert_eq!(items, vec![2, 3]);
        assert_eq!(fs::read_to_string(tape.path()).unwrap(), "2\n3\n");
    }

    #[rstest]
    fn test_tape_truncate(tmp_dir: tempfile::TempDir) {
        let mut tape = Tape::create(tmp_dir.path(), 3, RmpCodec, Some(64)).unwrap();
        tape.append_run(ok(vec![7, 8])).unwrap();
        tape.truncate().unwrap();
        assert!(tape.is_empty());
        assert_eq!(fs::metadata(tape.path()).unwrap().len(), 0);

        tape.append_run(ok(vec![i64::MIN, i64::MAX])).unwrap();
        let restored: Result<Vec<i64>, _> = open_records(tape.path(), RmpCodec, None).unwrap().collect();
        assert_eq!(restored.unwrap(), vec![i64::MIN, i64::MAX]);
    }

    #[rstest]
    fn test_run_cursor_detects_short_tape(tmp_dir: tempfile::TempDir) {
        let mut tape = Tape::create(tmp_dir.path(), 1, TextCodec, None).unwrap();
        tape.append_run(ok(vec![1, 2, 3])).unwrap();
        fs::write(tape.path(), "1\n2\n").unwrap();

        let cursor = tape.next_run().unwrap().unwrap();
        let items = Vec::from_iter(cursor);
        assert_eq!(items.len(), 3);
        assert!(matches!(items[2], Err(CodecError::Malformed(_))));
    }

    #[rstest]
    fn test_append_run_propagates_item_error(tmp_dir: tempfile::TempDir) {
        let mut tape = Tape::create(tmp_dir.path(), 2, TextCodec, None).unwrap();
        let items = vec![Ok(1), Err(CodecError::Malformed("bad".into()))];

        assert!(matches!(tape.append_run(items), Err(CodecError::Malformed(_))));
        assert!(tape.is_empty());
    }
}
