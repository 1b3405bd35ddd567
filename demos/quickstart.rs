use std::fs;
use std::io;
use std::path;

use bytesize::MB;
use env_logger;
use log;

use polyphase_sort::{CodecError, ExternalSorter, ExternalSorterBuilder, RecordReader, RecordWriter, RmpCodec};

fn main() {
    env_logger::Builder::new().filter_level(log::LevelFilter::Debug).init();

    let input_reader: RecordReader<_> = RecordReader::new(io::BufReader::new(fs::File::open("input.txt").unwrap()));
    let mut output_writer: RecordWriter<_> =
        RecordWriter::new(io::BufWriter::new(fs::File::create("output.txt").unwrap()));

    let sorter: ExternalSorter<CodecError, RmpCodec> = ExternalSorterBuilder::new()
        .with_tmp_dir(path::Path::new("./"))
        .with_tapes(5)
        .with_memory_budget(50 * MB)
        .build()
        .unwrap();

    let sorted = sorter.sort(input_reader).unwrap();
    log::info!("merging {} records", sorted.records());

    for item in sorted.map(Result::unwrap) {
        output_writer.write(item).unwrap();
    }
    output_writer.flush().unwrap();
}
