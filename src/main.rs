use std::fs;
use std::io;
use std::path;
use std::process;

use bytesize::ByteSize;
use clap::ArgEnum;
use env_logger;
use log;

use polyphase_sort::{
    CodecError, ExternalSorter, ExternalSorterBuilder, RecordCodec, RecordReader, RecordWriter, RmpCodec, TextCodec,
};

fn main() {
    let arg_parser = build_arg_parser();

    let log_level: LogLevel = arg_parser.value_of_t_or_exit("log_level");
    init_logger(log_level);

    let format: Format = arg_parser.value_of_t_or_exit("format");
    let tapes: usize = arg_parser.value_of_t_or_exit("tapes");
    let tmp_dir: Option<&str> = arg_parser.value_of("tmp_dir");
    let chunk_size = arg_parser.value_of("chunk_size").expect("value is required");
    let threads: Option<usize> = arg_parser
        .is_present("threads")
        .then(|| arg_parser.value_of_t_or_exit("threads"));

    let input = arg_parser.value_of("input").expect("value is required");
    let input_stream: RecordReader<_> = match fs::File::open(input) {
        Ok(file) => RecordReader::new(io::BufReader::new(file)),
        Err(err) => {
            log::error!("input file opening error: {}", err);
            process::exit(1);
        }
    };

    let output = arg_parser.value_of("output").expect("value is required");
    let mut output_stream: RecordWriter<_> = match fs::File::create(output) {
        Ok(file) => RecordWriter::new(io::BufWriter::new(file)),
        Err(err) => {
            log::error!("output file creation error: {}", err);
            process::exit(1);
        }
    };

    let settings = Settings {
        tapes,
        memory_budget: chunk_size.parse::<ByteSize>().expect("value is pre-validated").as_u64(),
        threads,
        tmp_dir,
    };

    let result = match format {
        Format::Text => sort::<TextCodec>(&settings, input_stream, &mut output_stream),
        Format::Rmp => sort::<RmpCodec>(&settings, input_stream, &mut output_stream),
    };

    match result {
        Ok(records) => log::info!("{} records sorted", records),
        Err(err) => {
            log::error!("{}", err);
            process::exit(1);
        }
    }
}

struct Settings<'a> {
    tapes: usize,
    memory_budget: u64,
    threads: Option<usize>,
    tmp_dir: Option<&'a str>,
}

fn sort<C: RecordCodec>(
    settings: &Settings,
    input_stream: RecordReader<io::BufReader<fs::File>>,
    output_stream: &mut RecordWriter<io::BufWriter<fs::File>>,
) -> Result<u64, String> {
    let mut sorter_builder = ExternalSorterBuilder::new()
        .with_tapes(settings.tapes)
        .with_memory_budget(settings.memory_budget);

    if let Some(threads) = settings.threads {
        sorter_builder = sorter_builder.with_threads_number(threads);
    }

    if let Some(tmp_dir) = settings.tmp_dir {
        sorter_builder = sorter_builder.with_tmp_dir(path::Path::new(tmp_dir));
    }

    let sorter: ExternalSorter<CodecError, C> = sorter_builder
        .build()
        .map_err(|err| format!("sorter initialization error: {}", err))?;

    return sorter
        .sort_into(input_stream, output_stream)
        .map_err(|err| format!("data sorting error: {}", err));
}

#[derive(Copy, Clone, clap::ArgEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Self::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <LogLevel as clap::ArgEnum>::from_str(s, false)
    }
}

/// Temporary data format.
#[derive(Copy, Clone, clap::ArgEnum)]
enum Format {
    Text,
    Rmp,
}

impl Format {
    pub fn possible_values() -> impl Iterator<Item = clap::PossibleValue<'static>> {
        Format::value_variants().iter().filter_map(|v| v.to_possible_value())
    }
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <Format as clap::ArgEnum>::from_str(s, false)
    }
}

fn build_arg_parser() -> clap::ArgMatches {
    clap::App::new("polyphase-sort")
        .about("external polyphase sorter for files of integers, one per line")
        .arg(
            clap::Arg::new("input")
                .short('i')
                .long("input")
                .help("file to be sorted")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .help("result file")
                .required(true)
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tapes")
                .short('m')
                .long("tapes")
                .help("number of auxiliary files, at least 3")
                .takes_value(true)
                .default_value("4")
                .validator(|v| match v.parse::<usize>() {
                    Ok(tapes) if tapes >= 3 => Ok(()),
                    Ok(tapes) => Err(format!("at least 3 tapes required, got {}", tapes)),
                    Err(err) => Err(format!("Tapes number format incorrect: {}", err)),
                }),
        )
        .arg(
            clap::Arg::new("format")
                .short('f')
                .long("format")
                .help("temporary data format")
                .takes_value(true)
                .default_value("text")
                .possible_values(Format::possible_values()),
        )
        .arg(
            clap::Arg::new("log_level")
                .short('l')
                .long("loglevel")
                .help("logging level")
                .takes_value(true)
                .default_value("info")
                .possible_values(LogLevel::possible_values()),
        )
        .arg(
            clap::Arg::new("threads")
                .short('t')
                .long("threads")
                .help("number of threads to use for parallel chunk sorting")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("tmp_dir")
                .short('d')
                .long("tmp-dir")
                .help("directory to be used to store temporary data")
                .takes_value(true),
        )
        .arg(
            clap::Arg::new("chunk_size")
                .short('c')
                .long("chunk-size")
                .help("memory available for sorting a chunk")
                .required(true)
                .takes_value(true)
                .validator(|v| match v.parse::<ByteSize>() {
                    Ok(_) => Ok(()),
                    Err(err) => Err(format!("Chunk size format incorrect: {}", err)),
                }),
        )
        .get_matches()
}

fn init_logger(log_level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(match log_level {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        })
        .format_timestamp_millis()
        .init();
}
