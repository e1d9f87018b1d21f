//! Reconcile command: recompute a month from export files and compare it
//! with the persisted billing run.

use std::fmt::Write as _;
use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use bill_core::reconcile::{Presence, ProjectValidationResult};
use bill_core::{
    BillingError, BillingMonth, CanonicalEntry, ReconcileOptions, ValidationReport,
    ValidationStatus, parse_exports, reconcile,
};
use bill_db::Database;
use chrono::{DateTime, SecondsFormat, Utc};
use clap::Args;

use crate::commands::util::{ExportFormat, read_exports};

#[derive(Debug, Args)]
pub struct ReconcileArgs {
    /// Billing month (YYYY-MM).
    #[arg(long)]
    pub month: BillingMonth,

    /// Export format; detected per file by default.
    #[arg(long, value_enum, default_value_t = ExportFormat::Auto)]
    pub format: ExportFormat,

    /// Export files to reconcile against the stored run.
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Runs reconciliation and writes the report. Returns whether every
/// project passed.
pub fn run<W: Write>(
    writer: &mut W,
    args: &ReconcileArgs,
    db: &Database,
    options: &ReconcileOptions,
    now: DateTime<Utc>,
) -> Result<bool> {
    let files = read_exports(&args.files)?;
    let exports = parse_exports(&files, args.format.source_system())?;
    let entries: Vec<CanonicalEntry> = exports
        .into_iter()
        .flat_map(|export| export.entries)
        .collect();
    if !entries.iter().any(|entry| args.month.contains(entry.date)) {
        return Err(BillingError::NoSourceData { month: args.month }.into());
    }

    let lookup = db.lookup_tables(args.month)?;
    let expected = db.expected_figures(args.month)?;
    let report = reconcile(&entries, args.month, &lookup, &expected, options, now);

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&report)?)?;
    } else {
        write!(writer, "{}", format_reconcile_report(&report))?;
    }
    Ok(!report.has_discrepancies())
}

fn write_project(output: &mut String, project: &ProjectValidationResult) {
    let status = match project.status {
        ValidationStatus::Pass => "PASS",
        ValidationStatus::Fail => "FAIL",
        ValidationStatus::Skipped => "SKIP",
    };
    let mut notes = Vec::new();
    if project.status == ValidationStatus::Skipped {
        notes.push("not persisted");
    } else {
        match project.presence {
            Presence::Both => {}
            Presence::SourceOnly => notes.push("not in stored results"),
            Presence::StoredOnly => notes.push("not in exports"),
        }
        if !project.matched_in_system {
            notes.push("not configured");
        }
    }
    let notes = if notes.is_empty() {
        String::new()
    } else {
        format!(" [{}]", notes.join(", "))
    };
    writeln!(
        output,
        "{status} {} ({}){notes}",
        project.project, project.company_name
    )
    .unwrap();

    if project.status == ValidationStatus::Fail {
        for check in project.checks.iter().filter(|c| !c.passed) {
            let difference = i64::try_from(check.difference).unwrap_or(i64::MAX);
            writeln!(
                output,
                "  {}: expected {}, actual {} (off by {})",
                check.field.as_str(),
                check.format_value(check.expected),
                check.format_value(check.actual),
                check.format_value(difference)
            )
            .unwrap();
        }
    }
}

/// Formats a reconciliation report for the terminal.
pub fn format_reconcile_report(report: &ValidationReport) -> String {
    let summary = &report.summary;
    let mut output = String::new();
    writeln!(output, "RECONCILIATION: {}", report.month).unwrap();
    writeln!(
        output,
        "Projects: {} ({} passed, {} failed, {} skipped, {} unmatched)",
        summary.total_projects,
        summary.passed,
        summary.failed,
        summary.skipped,
        summary.unmatched_projects
    )
    .unwrap();

    if !report.projects.is_empty() {
        writeln!(output).unwrap();
    }
    for project in &report.projects {
        write_project(&mut output, project);
    }

    if !report.rejected.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "Rejected entries:").unwrap();
        for entry in &report.rejected {
            writeln!(output, "  {}: {}", entry.entry_id, entry.reason).unwrap();
        }
    }

    writeln!(output).unwrap();
    writeln!(output, "Total billed revenue: {}", summary.total_billed_revenue).unwrap();
    writeln!(
        output,
        "Entries: {} in month, {} outside",
        summary.entries_considered, summary.entries_outside_month
    )
    .unwrap();
    writeln!(
        output,
        "Generated at: {}",
        summary
            .generated_at
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    )
    .unwrap();
    output
}
