//! `clinic-records`: maintenance command line for the clinic records store.

mod commands;
mod config;
mod log;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use clinic_records_core::Database;

use crate::commands::Command;
use crate::config::{ClinicConfig, DEFAULT_CONFIG_FILE_PATH};

#[derive(Parser, Debug)]
#[command(name = "clinic-records", version, about)]
pub struct Cli {
    /// Configuration file (TOML)
    #[arg(long, default_value = DEFAULT_CONFIG_FILE_PATH)]
    pub config: PathBuf,

    /// Store file; overrides `database.path`
    #[arg(long)]
    pub database: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ClinicConfig::load(&cli.config)
        .with_context(|| format!("loading config from {}", cli.config.display()))?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }
    log::init(&config.log);

    let db = Database::open(&config.database.path)
        .with_context(|| format!("opening {}", config.database.path.display()))?;

    let stdout = std::io::stdout();
    commands::execute(cli.command, &db, &config, &mut stdout.lock())
}
