mod args;
mod portal;

use clap::Parser;
use log::{debug, LevelFilter};

use crate::args::Args;
use crate::portal::{report_error, run_and_report, RunOptions};

fn main() {
    let args = Args::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();
    debug!("args: {:?}", args);

    let opts = RunOptions {
        config_path: args.config,
        extra_sheets: args.ingest,
        chamber: args.chamber,
        district: args.district,
        detail: args.detail,
        out: args.out,
        reference: args.reference,
    };
    if let Err(e) = run_and_report(&opts) {
        report_error(&e);
        std::process::exit(1);
    }
}
