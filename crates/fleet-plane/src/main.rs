mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { plugins_dir } => {
            commands::serve(cli.config_dir, cli.environment, plugins_dir).await
        }
        Command::Run {
            command,
            args,
            plugins_dir,
        } => commands::run(cli.config_dir, cli.environment, command, args, plugins_dir).await,
        Command::ListCommands { plugins_dir } => {
            commands::list_commands(cli.config_dir, cli.environment, plugins_dir).await
        }
        Command::Migrate {
            action,
            migrations_dir,
        } => commands::migrate(cli.config_dir, cli.environment, action, migrations_dir).await,
        Command::Status => commands::status(cli.config_dir, cli.environment).await,
    }
}
