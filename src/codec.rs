//! Record codecs.
//!
//! A codec defines how a single `i64` record is laid out on a byte stream. Tapes, the input reader and the output
//! writer are all parameterized by a codec so the sorting engine never depends on a concrete encoding.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::io::prelude::*;

use serde::Deserialize;

/// Record encoding/decoding error.
#[derive(Debug)]
pub enum CodecError {
    /// Underlying stream I/O error.
    IO(io::Error),
    /// Record could not be decoded as an integer.
    Malformed(String),
}

impl Error for CodecError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            CodecError::IO(err) => Some(err),
            CodecError::Malformed(_) => None,
        }
    }
}

impl Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            CodecError::IO(err) => write!(f, "{}", err),
            CodecError::Malformed(msg) => write!(f, "malformed record: {}", msg),
        }
    }
}

impl From<io::Error> for CodecError {
    fn from(err: io::Error) -> Self {
        CodecError::IO(err)
    }
}

/// Record codec interface.
pub trait RecordCodec: Clone + Default + Send {
    /// Writes a single record.
    fn encode<W: Write>(&self, writer: &mut W, value: i64) -> Result<(), CodecError>;

    /// Reads the next record. Returns [`None`] if the stream is exhausted before a record starts.
    /// `scratch` is a reusable buffer owned by the caller.
    fn decode<R: BufRead>(&self, reader: &mut R, scratch: &mut Vec<u8>) -> Result<Option<i64>, CodecError>;
}

/// Decimal text codec: one integer per line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextCodec;

impl RecordCodec for TextCodec {
    fn encode<W: Write>(&self, writer: &mut W, value: i64) -> Result<(), CodecError> {
        writeln!(writer, "{}", value)?;
        return Ok(());
    }

    fn decode<R: BufRead>(&self, reader: &mut R, scratch: &mut Vec<u8>) -> Result<Option<i64>, CodecError> {
        scratch.clear();
        if reader.read_until(b'\n', scratch)? == 0 {
            return Ok(None);
        }

        let line = std::str::from_utf8(scratch)
            .map_err(|err| CodecError::Malformed(format!("invalid utf-8: {}", err)))?
            .trim();

        return match line.parse::<i64>() {
            Ok(value) => Ok(Some(value)),
            Err(err) => Err(CodecError::Malformed(format!("{:?}: {}", line, err))),
        };
    }
}

/// RMP (Rust MessagePack) codec.
/// It uses MessagePack as a record serialization format.
/// For more information see https://msgpack.org/.
#[derive(Debug, Clone, Copy, Default)]
pub struct RmpCodec;

impl RecordCodec for RmpCodec {
    fn encode<W: Write>(&self, writer: &mut W, value: i64) -> Result<(), CodecError> {
        rmp_serde::encode::write(writer, &value).map_err(|err| match err {
            rmp_serde::encode::Error::InvalidValueWrite(err) => CodecError::IO(io::Error::new(io::ErrorKind::Other, err)),
            err => CodecError::Malformed(err.to_string()),
        })
    }

    fn decode<R: BufRead>(&self, reader: &mut R, _scratch: &mut Vec<u8>) -> Result<Option<i64>, CodecError> {
        if reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let mut deserializer = rmp_serde::Deserializer::new(reader);
        return match i64::deserialize(&mut deserializer) {
            Ok(value) => Ok(Some(value)),
            Err(rmp_serde::decode::Error::InvalidMarkerRead(err) | rmp_serde::decode::Error::InvalidDataRead(err))
                if err.kind() != io::ErrorKind::UnexpectedEof =>
            {
                Err(CodecError::IO(err))
            }
            Err(err) => Err(CodecError::Malformed(err.to_string())),
        };
    }
}

/// Sequential record reader. Yields records decoded from the underlying stream until it is exhausted.
pub struct RecordReader<R, C = TextCodec> {
    reader: R,
    codec: C,
    scratch: Vec<u8>,
}

impl<R: BufRead, C: RecordCodec> RecordReader<R, C> {
    /// Creates a reader decoding records with the default codec instance.
    pub fn new(reader: R) -> Self {
        Self::with_codec(reader, C::default())
    }

    pub fn with_codec(reader: R, codec: C) -> Self {
        RecordReader {
            reader,
            codec,
            scratch: Vec::new(),
        }
    }

    /// Reads the next record.
    pub fn read(&mut self) -> Result<Option<i64>, CodecError> {
        self.codec.decode(&mut self.reader, &mut self.scratch)
    }
}

impl<R: BufRead, C: RecordCodec> Iterator for RecordReader<R, C> {
    type Item = Result<i64, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.read().transpose()
    }
}

/// Append-only record writer.
pub struct RecordWriter<W: Write, C = TextCodec> {
    writer: W,
    codec: C,
    written: u64,
}

impl<W: Write, C: RecordCodec> RecordWriter<W, C> {
    /// Creates a writer encoding records with the default codec instance.
    pub fn new(writer: W) -> Self {
        Self::with_codec(writer, C::default())
    }

    pub fn with_codec(writer: W, codec: C) -> Self {
        RecordWriter {
            writer,
            codec,
            written: 0,
        }
    }

    /// Appends a record.
    pub fn write(&mut self, value: i64) -> Result<(), CodecError> {
        self.codec.encode(&mut self.writer, value)?;
        self.written += 1;
        return Ok(());
    }

    /// Number of records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn flush(&mut self) -> Result<(), CodecError> {
        self.writer.flush()?;
        return Ok(());
    }

    /// Flushes the writer and returns the underlying stream.
    pub fn into_inner(mut self) -> Result<W, CodecError> {
        self.flush()?;
        return Ok(self.writer);
    }
}
