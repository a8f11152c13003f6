use std::process::ExitCode;

use clap::Parser;
use forest_stats::cli::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse();
    forest_stats::app::init_logging(cli.verbose);

    match forest_stats::app::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
