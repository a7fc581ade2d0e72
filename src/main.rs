use std::process::ExitCode;

use clap::Parser;
use pixelfe::{cli, logger};

fn main() -> ExitCode {
    logger::init();
    let args = cli::CliArgs::parse();
    pixelfe::log_info!("CLI run over {} input pattern(s)", args.input.len());
    cli::run(args)
}
