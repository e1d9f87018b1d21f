//! Run command: computes a month's billing and persists it.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::io::Write;

use anyhow::Result;
use bill_core::{
    BillingError, BillingMonth, ClientId, LimitApplied, MonthlyBillingResult, ProjectBilling,
    RejectedEntry, compute_month, require_configs,
};
use bill_db::Database;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;

use crate::commands::util::company_name;

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Billing month (YYYY-MM).
    #[arg(long)]
    pub month: BillingMonth,

    /// Fail on unconfigured projects or rejected entries instead of
    /// billing around them.
    #[arg(long)]
    pub strict: bool,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct RunOutput<'a> {
    run_id: &'a str,
    result: &'a MonthlyBillingResult,
    rejected: &'a [RejectedEntry],
}

pub fn run<W: Write>(writer: &mut W, args: &RunArgs, db: &mut Database) -> Result<()> {
    run_at(writer, args, db, Utc::now())
}

fn run_at<W: Write>(
    writer: &mut W,
    args: &RunArgs,
    db: &mut Database,
    now: DateTime<Utc>,
) -> Result<()> {
    let entries = db.entries_in_month(args.month)?;
    let configs = db.config_table(args.month)?;
    let (result, rejected) = compute_month(&entries, args.month, &configs)?;

    if args.strict {
        require_configs(&result)?;
        if let Some(first) = rejected.first() {
            return Err(BillingError::from(first.clone()).into());
        }
    }

    let run_id = db.save_month_result(&result, now)?;
    tracing::debug!(month = %args.month, %run_id, "billing run persisted");

    if args.json {
        let output = RunOutput {
            run_id: &run_id,
            result: &result,
            rejected: &rejected,
        };
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    } else {
        let names = db.company_names()?;
        write!(writer, "{}", format_run_report(&result, &rejected, &names))?;
    }
    Ok(())
}

fn entry_count(count: usize) -> String {
    if count == 1 {
        "1 entry".to_string()
    } else {
        format!("{count} entries")
    }
}

fn write_project(output: &mut String, project: &ProjectBilling) {
    let flag = if project.config_matched {
        ""
    } else {
        " [no config]"
    };
    writeln!(
        output,
        "  {}: {}h rounded, {}h billed, {}{flag}",
        project.project, project.rounded_hours, project.billed_hours, project.billed_revenue
    )
    .unwrap();

    if !project.carryover_in.is_zero() {
        writeln!(output, "    carryover in: {}h", project.carryover_in).unwrap();
    }
    match project.limit_applied {
        LimitApplied::None => {}
        LimitApplied::Minimum => writeln!(
            output,
            "    minimum {}h applied (+{}h)",
            project.billed_hours, project.minimum_padding
        )
        .unwrap(),
        LimitApplied::Maximum if project.carryover_out.is_zero() => writeln!(
            output,
            "    maximum {}h applied ({}h unbillable)",
            project.billed_hours, project.unbillable_hours
        )
        .unwrap(),
        LimitApplied::Maximum => writeln!(
            output,
            "    maximum {}h applied ({}h carried over)",
            project.billed_hours, project.carryover_out
        )
        .unwrap(),
    }

    for task in &project.tasks {
        writeln!(
            output,
            "    {}: {}m -> {}m ({})",
            task.task_name,
            task.actual_minutes,
            task.rounded_minutes,
            entry_count(task.entry_count)
        )
        .unwrap();
    }
}

/// Formats a computed month as a human-readable report.
pub fn format_run_report(
    result: &MonthlyBillingResult,
    rejected: &[RejectedEntry],
    names: &HashMap<ClientId, String>,
) -> String {
    let mut output = String::new();
    writeln!(output, "BILLING REPORT: {}", result.month).unwrap();

    for company in &result.companies {
        writeln!(output).unwrap();
        writeln!(
            output,
            "{} [{}]",
            company_name(names, &company.company),
            company.company
        )
        .unwrap();
        for project in &company.projects {
            write_project(&mut output, project);
        }
        writeln!(
            output,
            "  total: {}h billed, {}",
            company.totals.billed_hours, company.totals.billed_revenue
        )
        .unwrap();
    }

    let totals = &result.totals;
    writeln!(output).unwrap();
    writeln!(
        output,
        "Month total: {}h rounded, {}h billed",
        totals.rounded_hours, totals.billed_hours
    )
    .unwrap();
    writeln!(output, "Base revenue: {}", totals.base_revenue).unwrap();
    writeln!(output, "Billed revenue: {}", totals.billed_revenue).unwrap();

    if !rejected.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "Rejected entries:").unwrap();
        for entry in rejected {
            writeln!(output, "  {}: {}", entry.entry_id, entry.reason).unwrap();
        }
    }

    output
}
