//! Configuration loading and management.

use std::path::{Path, PathBuf};

use bill_core::ReconcileOptions;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,
    /// Largest reconciliation difference, in cents or hundredths of an hour,
    /// still treated as a match.
    pub tolerance_hundredths: u64,
    /// Whether zero-value projects found on only one side pass reconciliation.
    pub suppress_zero_value_orphans: bool,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        let options = ReconcileOptions::default();
        Self {
            database_path: data_dir.join("bill.db"),
            tolerance_hundredths: options.tolerance_hundredths,
            suppress_zero_value_orphans: options.suppress_zero_value_orphans,
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // BILL_DATABASE_PATH, BILL_TOLERANCE_HUNDREDTHS, ...
        figment = figment.merge(Env::prefixed("BILL_"));

        figment.extract()
    }

    pub const fn reconcile_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            tolerance_hundredths: self.tolerance_hundredths,
            suppress_zero_value_orphans: self.suppress_zero_value_orphans,
        }
    }
}

/// Returns the platform-specific config directory for bill.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("bill"))
}

/// Returns the platform-specific data directory for bill.
///
/// On Linux: `~/.local/share/bill`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("bill"))
}
