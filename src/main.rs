use clap::Parser;
use tradecheck::cli::{Cli, run};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
