//! Billing CLI library.
//!
//! This crate provides the CLI interface for computing, persisting and
//! reconciling monthly billing.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, CompanyAction, ConfigAction};
pub use config::Config;
