//! Shared utilities for CLI commands.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use bill_core::reconcile::UNKNOWN_COMPANY;
use bill_core::{ClientId, CompanyKey, ExportFile, SourceSystem};
use clap::ValueEnum;

/// Export format selector for commands that read files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ExportFormat {
    /// Detect the format of each file from its content.
    #[default]
    Auto,
    Clockify,
    Toggl,
}

impl ExportFormat {
    pub const fn source_system(self) -> Option<SourceSystem> {
        match self {
            Self::Auto => None,
            Self::Clockify => Some(SourceSystem::Clockify),
            Self::Toggl => Some(SourceSystem::Toggl),
        }
    }
}

/// Reads export files from disk, labelling each with its file name.
pub fn read_exports(paths: &[PathBuf]) -> Result<Vec<ExportFile>> {
    paths
        .iter()
        .map(|path| {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let source_name = path
                .file_name()
                .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned());
            Ok(ExportFile {
                source_name,
                content,
            })
        })
        .collect()
}

/// Display name for a company, falling back to "Unknown".
pub fn company_name(names: &HashMap<ClientId, String>, company: &CompanyKey) -> String {
    company
        .client_id()
        .and_then(|id| names.get(id))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_COMPANY.to_string())
}
