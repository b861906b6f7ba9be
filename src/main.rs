mod commands;

use clap::Parser;
use commands::{Cli, Commands};
use dirsync_lib::{config, logging};
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_dir = cli.config_dir.clone().unwrap_or_else(config::config_dir);
    logging::init_logging(&config_dir, cli.verbose);

    let result = match cli.command {
        Commands::Compare(args) => commands::compare::run(args, &config_dir).await,
        Commands::Apply(args) => commands::apply::run(args, &config_dir).await,
        Commands::Ignore(command) => commands::ignore::run(command, &config_dir),
        Commands::Diff(args) => commands::diff::run(args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
