use std::io;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bill_cli::commands::{company, compute, configs, import, reconcile, status};
use bill_cli::{Cli, Commands, CompanyAction, Config, ConfigAction};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(bill_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = bill_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // stdout carries reports and JSON; logs go to stderr
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let mut stdout = io::stdout().lock();
    let config_path = cli.config.as_deref();

    match &cli.command {
        Some(Commands::Status) => {
            let (db, config) = open_database(config_path)?;
            status::run(&mut stdout, &db, &config.database_path)?;
        }
        Some(Commands::Import(args)) => {
            let (mut db, _config) = open_database(config_path)?;
            import::run(&mut stdout, args, &mut db)?;
        }
        Some(Commands::Config(action)) => {
            let (mut db, _config) = open_database(config_path)?;
            match action {
                ConfigAction::Set(args) => configs::set(&mut stdout, args, &mut db)?,
                ConfigAction::List { month } => configs::list(&mut stdout, *month, &db)?,
            }
        }
        Some(Commands::Company(CompanyAction::Set(args))) => {
            let (mut db, _config) = open_database(config_path)?;
            company::set(&mut stdout, args, &mut db)?;
        }
        Some(Commands::Run(args)) => {
            let (mut db, _config) = open_database(config_path)?;
            compute::run(&mut stdout, args, &mut db)?;
        }
        Some(Commands::Reconcile(args)) => {
            let (db, config) = open_database(config_path)?;
            let options = config.reconcile_options();
            let clean = reconcile::run(&mut stdout, args, &db, &options, Utc::now())?;
            if !clean {
                return Ok(ExitCode::FAILURE);
            }
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(ExitCode::SUCCESS)
}
