// SPDX-License-Identifier: MIT OR Apache-2.0

//! `cfr-tool` - replay completion scripts and inspect record files.

use cfr_correlator::core::capture::record::RecordReader;
use cfr_correlator::core::config::{CorrelatorConfig, FlatConfig};
use cfr_correlator::core::replay;
use cfr_correlator::core::stream::sink::{FileSink, LogSink, Sink};
use cfr_correlator::CfrResult;
use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "cfr-tool",
    version,
    about = "CFR capture correlation tool",
    long_about = "Replay DBR and TX/RX completion scripts through the correlator \
                  and decode the capture records it produces."
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Correlator configuration file (.yaml, .yml or .toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override one correlator property, e.g. `--set pool_size=16`
    #[arg(long = "set", value_name = "KEY=VALUE", global = true)]
    overrides: Vec<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Feed a JSON-lines event script through a correlator and print statistics
    Replay(ReplayArgs),
    /// Print a summary of every record in a record file
    Decode(DecodeArgs),
}

#[derive(Args)]
struct ReplayArgs {
    /// Event script, one JSON event per line
    events: PathBuf,

    /// Write emitted records to this file instead of the log
    #[arg(long, short)]
    output: Option<PathBuf>,
}

#[derive(Args)]
struct DecodeArgs {
    /// Concatenated record stream
    records: PathBuf,
}

fn run_replay(config: CorrelatorConfig, args: ReplayArgs) -> CfrResult<()> {
    let events = replay::parse_script(BufReader::new(File::open(&args.events)?))?;
    let sink: Arc<dyn Sink> = match &args.output {
        Some(path) => Arc::new(FileSink::create(path)?),
        None => Arc::new(LogSink::new()),
    };
    let summary = replay::run(&events, config, sink)?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run_decode(args: DecodeArgs) -> CfrResult<()> {
    let bytes = std::fs::read(&args.records)?;
    let mut count = 0usize;
    for record in RecordReader::new(&bytes) {
        let record = record?;
        let metadata = &record.header.metadata;
        let info = metadata.info();
        println!(
            "#{:<4} v{} peer={} bw={} chan={} ts={} len={}",
            count,
            metadata.version().as_u8(),
            metadata.peer_addr(),
            info.capture_bw,
            info.prim20_chan,
            info.timestamp,
            record.payload.len()
        );
        count += 1;
    }
    println!("{} records", count);
    Ok(())
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Replay(args) => FlatConfig::from_assignments(cli.overrides.iter().map(String::as_str))
            .and_then(|overrides| CorrelatorConfig::load(cli.config.as_deref(), &overrides))
            .and_then(|config| run_replay(config, args)),
        Command::Decode(args) => run_decode(args),
    };

    if let Err(e) = result {
        eprintln!("cfr-tool: {}", e);
        std::process::exit(1);
    }
}
