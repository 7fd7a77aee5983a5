//! ModForge CLI entry point.

use clap::Parser;

use modforge::cli::commands;
use modforge::cli::{handle_error, Cli, Commands};
use modforge::infrastructure::{ConfigLoader, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match ConfigLoader::load() {
        Ok(config) => config,
        Err(err) => handle_error(err, json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(err, json),
    };

    let result = match cli.command {
        Commands::Run(args) => commands::run::execute(args, &config, json).await,
        Commands::Project(command) => commands::project::execute(command, &config, json).await,
        Commands::Builds { project, limit } => {
            commands::builds::execute(project, limit, &config, json).await
        }
        Commands::Patterns { kind } => commands::patterns::execute(kind, &config, json).await,
        Commands::Config => commands::config::execute(config.clone(), json),
    };

    if let Err(err) = result {
        handle_error(err, json);
    }
}
