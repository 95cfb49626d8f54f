use std::process::ExitCode;

use clap::Parser;

use pixelfe::cli::{self, CliArgs};

fn main() -> ExitCode {
    env_logger::init();
    let args = CliArgs::parse();
    cli::run(args)
}
