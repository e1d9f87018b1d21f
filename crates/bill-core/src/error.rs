//! Engine error taxonomy.

use thiserror::Error;

use crate::normalize::ParseError;
use crate::types::{BillingMonth, EntryId, ProjectId};

/// Errors surfaced to callers of the billing pipeline.
///
/// Messages are shown to users verbatim, so each variant states which of
/// "no source data", "invalid file format" or "no matching configuration"
/// went wrong.
#[derive(Debug, Error)]
pub enum BillingError {
    /// No entries fall in the requested month.
    #[error("no source data: no time entries found for {month}")]
    NoSourceData { month: BillingMonth },

    /// A source file could not be parsed.
    #[error(transparent)]
    InvalidFormat(#[from] ParseError),

    /// A project has no billing config and strict mode forbids the fallback.
    #[error("no matching configuration for project {project_id} in {month}")]
    NoMatchingConfiguration {
        project_id: ProjectId,
        month: BillingMonth,
    },

    /// An entry broke an engine invariant and was rejected.
    #[error("invalid entry {entry_id}: {reason}")]
    InvariantViolation { entry_id: EntryId, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_distinguish_failure_kinds() {
        let month: BillingMonth = "2025-01".parse().unwrap();
        assert_eq!(
            BillingError::NoSourceData { month }.to_string(),
            "no source data: no time entries found for 2025-01"
        );

        let parse = ParseError {
            source_name: "jan.json".to_string(),
            message: "expected a JSON array".to_string(),
        };
        assert_eq!(
            BillingError::from(parse).to_string(),
            "invalid file format in jan.json: expected a JSON array"
        );

        let missing = BillingError::NoMatchingConfiguration {
            project_id: ProjectId::new("p-9").unwrap(),
            month,
        };
        assert_eq!(
            missing.to_string(),
            "no matching configuration for project p-9 in 2025-01"
        );
    }
}
