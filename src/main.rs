use clap::Parser;
use std::process::ExitCode;
use tidywatch::cli::{Cli, run_cli};

fn main() -> ExitCode {
    run_cli(Cli::parse())
}
