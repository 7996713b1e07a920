//! Hindsight CLI binary.

use std::io::Write;
use std::process;

use chrono::Local;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;

use hindsight::cli::args::*;
use hindsight::cli::commands::*;

fn main() {
    let args = HindsightArgs::parse();

    let log_level = match args.verbosity() {
        0 => LevelFilter::Error, // Quiet mode
        1 => LevelFilter::Warn,  // Default
        2 => LevelFilter::Info,  // Verbose
        _ => LevelFilter::Debug, // Very verbose (3+)
    };

    // Dependencies stay at warnings unless HINDSIGHT_LOG asks for more.
    Builder::new()
        .filter_level(log_level.min(LevelFilter::Warn))
        .filter_module("hindsight", log_level)
        .parse_env("HINDSIGHT_LOG")
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let store = args.store.clone();
    if let Err(e) = execute_command(args) {
        eprintln!("Error: {e}");
        if let Some(hint) = error_hint(&e, store.as_deref()) {
            eprintln!("{hint}");
        }
        process::exit(1);
    }
}
