//! Core billing logic.
//!
//! This crate contains the domain types and pure computations for:
//! - Normalization: parsing Clockify and Toggl exports into canonical entries
//! - Aggregation: grouping entries by month, company, project and task
//! - Revenue: task-level rounding and project pricing
//! - Limits: minimum/maximum hours and carryover
//! - Reconciliation: recomputing a month and checking it against stored figures
//!
//! Money and hours are fixed-point integers (cents, hundredths of an hour) so
//! the same input always yields the same figures.

pub mod aggregate;
mod amount;
pub mod billing;
pub mod config;
pub mod entry;
mod error;
pub mod limits;
pub mod normalize;
pub mod reconcile;
pub mod revenue;
pub mod types;

pub use aggregate::{CompanyKey, ProjectKey, RejectedEntry, aggregate_entries};
pub use amount::{AmountError, Hours, Money};
pub use billing::{
    BillingOutcome, BillingTotals, CompanyBilling, MonthlyBillingResult, ProjectBilling,
    compute_billing, compute_month, require_configs,
};
pub use config::{BillingConfig, ConfigResolver, ConfigTable};
pub use entry::{CanonicalEntry, SourceSystem};
pub use error::BillingError;
pub use limits::LimitApplied;
pub use normalize::{ExportFile, ParseError, ParsedExport, detect_format, parse_exports};
pub use reconcile::{
    ExpectedProjectFigures, LookupTables, ReconcileLookup, ReconcileOptions, ValidationReport,
    ValidationStatus, reconcile,
};
pub use types::{BillingMonth, ClientId, EntryId, ProjectId, ValidationError};
