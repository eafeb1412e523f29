mod cache;
mod config;
mod trace;

use std::{fs, path::PathBuf, process};

use cache::{Cache, Counts};
use trace::{Record, Trace};

use crate::config::Config;

const USAGE: &str = "\
Usage: csim [-hv] -s <s> -E <E> -b <b> -t <tracefile>
-h: Optional help flag that prints usage info
-v: Optional verbose flag that displays trace info
-s <s>: Number of set index bits (S = 2^s is the number of sets)
-E <E>: Associativity (number of lines per set)
-b <b>: Number of block bits (B = 2^b is the block size)
-t <tracefile>: Name of the valgrind trace to replay
--config <path>: JSON geometry file used instead of -s/-E/-b
--json <path>: Write hit/miss/eviction stats as JSON
";

fn fail(msg: impl std::fmt::Display) -> ! {
    eprintln!("ERROR: {}", msg);
    eprintln!("{}", USAGE);
    process::exit(1);
}

fn main() {
    let mut args = pico_args::Arguments::from_env();
    if args.contains("-h") {
        print!("{}", USAGE);
        return;
    }
    let verbose = args.contains("-v");

    let config = match read_config(&mut args) {
        Ok(config) => config,
        Err(err) => fail(err),
    };
    let mut cache = match config.to_cache() {
        Ok(cache) => cache,
        Err(err) => fail(err),
    };

    let stats_path: Option<String> = args
        .opt_value_from_str("--json")
        .unwrap_or_else(|err| fail(err));

    let trace_path: PathBuf = match args.opt_value_from_str("-t") {
        Ok(Some(path)) => path,
        Ok(None) => fail("Must provide a trace with -t"),
        Err(err) => fail(err),
    };
    let records_per_block: usize = args
        .opt_value_from_str("--buffer-size")
        .unwrap_or_else(|err| fail(err))
        .unwrap_or(1024 * 16);
    let blocks_per_queue: usize = args
        .opt_value_from_str("--queue-size")
        .unwrap_or_else(|err| fail(err))
        .unwrap_or(32);

    let trace = match Trace::read(trace_path, records_per_block, blocks_per_queue) {
        Ok(trace) => trace,
        Err(err) => fail(err),
    };

    let mut counts = Counts::default();
    for block in trace.rec.iter() {
        let block = match block {
            Ok(block) => block,
            Err(err) => fail(err),
        };
        for record in &block {
            replay(&mut cache, &mut counts, record, verbose);
        }
    }

    println!("{}", counts);

    if let Some(stats_path) = stats_path {
        let stats_file = match fs::File::create(stats_path) {
            Ok(file) => file,
            Err(err) => fail(err),
        };
        if let Err(err) = serde_json::to_writer_pretty(stats_file, &counts.summarize()) {
            fail(err);
        }
    }
}

/// Feeds one trace record through the cache: zero accesses for an
/// instruction fetch, one for a load or store, two for a modify.
fn replay(cache: &mut Cache, counts: &mut Counts, record: &Record, verbose: bool) {
    if verbose {
        print!("{} {:x},{}", record.op, record.addr, record.size);
    }
    let addr = cache.split_addr(record.addr);
    for _ in 0..record.op.accesses() {
        let result = cache.access(addr);
        counts.record(result);
        if verbose {
            print!(" {}", result);
        }
    }
    if verbose {
        println!();
    }
}

fn read_config(args: &mut pico_args::Arguments) -> Result<Config, String> {
    let config_path: Option<String> = args
        .opt_value_from_str("--config")
        .map_err(|err| err.to_string())?;
    if let Some(config_path) = config_path {
        let config_str =
            fs::read_to_string(config_path).map_err(|err| format!("Could not read config: {}", err))?;
        return serde_json::from_str(&config_str).map_err(|err| err.to_string());
    }

    let set_bits = require_flag(args, "-s")?;
    let ways = require_flag(args, "-E")?;
    let block_bits = require_flag(args, "-b")?;
    Ok(Config {
        set_bits,
        ways,
        block_bits,
    })
}

fn require_flag<T>(args: &mut pico_args::Arguments, flag: &'static str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    args.opt_value_from_str(flag)
        .map_err(|err| err.to_string())?
        .ok_or_else(|| format!("Missing required flag {}", flag))
}
