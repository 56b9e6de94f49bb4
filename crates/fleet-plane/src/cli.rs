use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(
    name = "fleetctl",
    about = "Operate a fleet management control plane: migrations, health, and dynamic command modules",
    version
)]
pub struct Cli {
    /// Directory holding configuration layers (default.yaml, <environment>.yaml).
    #[arg(long, env = "FLEET_CONFIG_DIR", default_value = "config")]
    pub config_dir: PathBuf,

    /// Environment overlay to apply on top of default.yaml.
    #[arg(long, env = "FLEET_ENVIRONMENT", default_value = "development")]
    pub environment: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the command plane: connect to storage, load command
    /// modules, and watch for changes until interrupted.
    Serve {
        /// Directory of `cdylib` command modules to load.
        #[arg(long)]
        plugins_dir: Option<PathBuf>,
    },

    /// Load command modules once and invoke a single command.
    Run {
        /// Registered command name.
        command: String,

        /// JSON-encoded arguments passed to the command.
        #[arg(long, default_value = "{}")]
        args: String,

        #[arg(long)]
        plugins_dir: Option<PathBuf>,
    },

    /// List every command exposed by the configured module directory.
    ListCommands {
        #[arg(long)]
        plugins_dir: Option<PathBuf>,
    },

    /// Apply or roll back schema migrations.
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,

        /// Directory of `.up.sql`/`.down.sql` revision files.
        #[arg(long, default_value = "migrations")]
        migrations_dir: PathBuf,
    },

    /// Report storage connection health.
    Status,
}

#[derive(Debug, Subcommand)]
pub enum MigrateAction {
    /// Apply pending revisions up to `target` (or the graph head).
    Up {
        #[arg(long)]
        target: Option<String>,
    },
    /// Roll back applied revisions down to `target`.
    Down {
        #[arg(long)]
        target: Option<String>,
    },
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
