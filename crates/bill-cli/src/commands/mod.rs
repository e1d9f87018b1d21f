//! CLI subcommand implementations.

pub mod company;
pub mod compute;
pub mod configs;
pub mod import;
pub mod reconcile;
pub mod status;
pub mod util;
