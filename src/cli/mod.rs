pub mod commands;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::error::Result;

#[derive(Parser)]
#[command(name = "devsuite")]
#[command(version)]
#[command(about = "Install a bundle of developer tools")]
#[command(long_about = "Detects which developer tools are already present, downloads and verifies the rest, \
and installs them in dependency order.\n\nVirtualBox, Cygwin, Vagrant, the CDK, OpenJDK and Developer Studio.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Detect installed tools and show what an install would do
    Detect {
        /// Print machine-readable JSON
        #[arg(long)]
        json: bool,
    },

    /// Download, install and configure the suite
    Install {
        /// Override the selected action for an item (e.g. jdk=detected, cygwin=skip)
        #[arg(short, long = "select", value_name = "KEY=ACTION")]
        select: Vec<String>,

        /// Show the install plan without downloading or installing anything
        #[arg(long)]
        dry_run: bool,

        /// Print machine-readable JSON (plan or final report)
        #[arg(long)]
        json: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Print the configuration file location
    Path,
}

impl Cli {
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Detect { json } => {
                let config = AppConfig::load()?;
                commands::detect::execute(&config, json).await
            }
            Commands::Install {
                select,
                dry_run,
                json,
            } => {
                let config = AppConfig::load()?;
                commands::install::execute(&config, &select, dry_run, json).await
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => commands::config::show().await,
                ConfigCommands::Set { key, value } => commands::config::set(key, value).await,
                ConfigCommands::Path => commands::config::path().await,
            },
        }
    }
}
