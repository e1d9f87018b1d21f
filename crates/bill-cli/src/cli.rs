//! Command-line argument definitions.

use std::path::PathBuf;

use bill_core::BillingMonth;
use clap::{Parser, Subcommand};

use crate::commands::company::CompanySetArgs;
use crate::commands::compute::RunArgs;
use crate::commands::configs::ConfigSetArgs;
use crate::commands::import::ImportArgs;
use crate::commands::reconcile::ReconcileArgs;

/// Monthly billing from time-tracking exports.
///
/// Imports Clockify and Toggl exports, applies per-project rounding, rates
/// and hour limits, and reconciles persisted figures against fresh exports.
#[derive(Debug, Parser)]
#[command(name = "bill", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show database status and billed months.
    Status,

    /// Import time-tracking export files.
    Import(ImportArgs),

    /// Manage per-project billing configs.
    #[command(subcommand)]
    Config(ConfigAction),

    /// Manage company names.
    #[command(subcommand)]
    Company(CompanyAction),

    /// Compute and persist billing for a month.
    Run(RunArgs),

    /// Check persisted billing against uploaded export files.
    Reconcile(ReconcileArgs),
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Set the billing config for a project and month.
    Set(ConfigSetArgs),

    /// List billing configs.
    List {
        /// Only show configs for this month (YYYY-MM).
        #[arg(long)]
        month: Option<BillingMonth>,
    },
}

#[derive(Debug, Subcommand)]
pub enum CompanyAction {
    /// Set the display name for a client.
    Set(CompanySetArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bill", "status", "-v", "--config", "bill.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("bill.toml")));
        assert!(matches!(cli.command, Some(Commands::Status)));
    }

    #[test]
    fn rejects_malformed_month() {
        let err = Cli::try_parse_from(["bill", "run", "--month", "2025-1"]).unwrap_err();
        assert!(err.to_string().contains("invalid billing month"));
    }
}
