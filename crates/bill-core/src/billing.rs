//! The monthly billing pipeline.
//!
//! Entries are aggregated, each project is rounded and priced with its
//! month's config, limits are applied, and totals are rolled up from projects
//! to companies to months. Every function here is pure: the same entries and
//! configs always produce the same result, field for field.

use std::ops::AddAssign;

use serde::Serialize;

use crate::aggregate::{CompanyKey, ProjectKey, ProjectTotals, RejectedEntry, aggregate_entries};
use crate::amount::{Hours, Money};
use crate::config::{BillingConfig, ConfigResolver};
use crate::entry::CanonicalEntry;
use crate::error::BillingError;
use crate::limits::{LimitApplied, apply_limits};
use crate::revenue::{TaskBilling, price_project};
use crate::types::BillingMonth;

/// Fully computed billing for one project in one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectBilling {
    pub project: ProjectKey,
    /// False when no config was found and the fallback was used.
    pub config_matched: bool,
    pub rate: Money,
    pub rounding_increment_minutes: i64,
    pub tasks: Vec<TaskBilling>,
    pub actual_minutes: i64,
    pub rounded_minutes: i64,
    pub actual_hours: Hours,
    pub rounded_hours: Hours,
    pub base_revenue: Money,
    pub carryover_in: Hours,
    pub adjusted_hours: Hours,
    pub billed_hours: Hours,
    pub minimum_padding: Hours,
    pub carryover_out: Hours,
    pub unbillable_hours: Hours,
    pub billed_revenue: Money,
    pub limit_applied: LimitApplied,
}

/// Rounds, prices and limits one project.
pub fn bill_project(
    project: &ProjectTotals,
    config: &BillingConfig,
    config_matched: bool,
) -> ProjectBilling {
    let priced = price_project(project, config.rounding_increment_minutes, config.rate);
    let limits = apply_limits(priced.rounded_hours, config);

    ProjectBilling {
        project: project.project.clone(),
        config_matched,
        rate: config.rate,
        rounding_increment_minutes: config.rounding_increment_minutes,
        actual_minutes: priced.actual_minutes,
        rounded_minutes: priced.rounded_minutes,
        actual_hours: Hours::from_minutes(priced.actual_minutes),
        rounded_hours: priced.rounded_hours,
        base_revenue: priced.base_revenue,
        carryover_in: limits.carryover_in,
        adjusted_hours: limits.adjusted_hours,
        billed_hours: limits.billed_hours,
        minimum_padding: limits.minimum_padding,
        carryover_out: limits.carryover_out,
        unbillable_hours: limits.unbillable_hours,
        billed_revenue: limits.billed_revenue,
        limit_applied: limits.limit_applied,
        tasks: priced.tasks,
    }
}

/// Summable totals shared by the company and month levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BillingTotals {
    pub actual_minutes: i64,
    pub rounded_minutes: i64,
    pub rounded_hours: Hours,
    pub billed_hours: Hours,
    pub base_revenue: Money,
    pub billed_revenue: Money,
    pub minimum_padding: Hours,
    pub carryover_out: Hours,
    pub unbillable_hours: Hours,
}

impl AddAssign<&ProjectBilling> for BillingTotals {
    fn add_assign(&mut self, project: &ProjectBilling) {
        self.actual_minutes += project.actual_minutes;
        self.rounded_minutes += project.rounded_minutes;
        self.rounded_hours += project.rounded_hours;
        self.billed_hours += project.billed_hours;
        self.base_revenue += project.base_revenue;
        self.billed_revenue += project.billed_revenue;
        self.minimum_padding += project.minimum_padding;
        self.carryover_out += project.carryover_out;
        self.unbillable_hours += project.unbillable_hours;
    }
}

impl AddAssign<&BillingTotals> for BillingTotals {
    fn add_assign(&mut self, other: &BillingTotals) {
        self.actual_minutes += other.actual_minutes;
        self.rounded_minutes += other.rounded_minutes;
        self.rounded_hours += other.rounded_hours;
        self.billed_hours += other.billed_hours;
        self.base_revenue += other.base_revenue;
        self.billed_revenue += other.billed_revenue;
        self.minimum_padding += other.minimum_padding;
        self.carryover_out += other.carryover_out;
        self.unbillable_hours += other.unbillable_hours;
    }
}

/// Projects billed to one company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompanyBilling {
    pub company: CompanyKey,
    pub projects: Vec<ProjectBilling>,
    pub totals: BillingTotals,
}

/// All billing for one month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthlyBillingResult {
    pub month: BillingMonth,
    pub companies: Vec<CompanyBilling>,
    pub totals: BillingTotals,
}

impl MonthlyBillingResult {
    pub fn projects(&self) -> impl Iterator<Item = &ProjectBilling> {
        self.companies.iter().flat_map(|c| &c.projects)
    }

    /// Projects billed with the fallback config.
    pub fn unmatched_projects(&self) -> impl Iterator<Item = &ProjectBilling> {
        self.projects().filter(|p| !p.config_matched)
    }
}

/// Output of [`compute_billing`].
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BillingOutcome {
    /// Months in ascending order.
    pub months: Vec<MonthlyBillingResult>,
    pub rejected: Vec<RejectedEntry>,
}

fn resolve_config<R: ConfigResolver + ?Sized>(
    resolver: &R,
    company: &CompanyKey,
    project: &ProjectKey,
    month: BillingMonth,
) -> (BillingConfig, bool) {
    let resolved = project
        .project_id()
        .and_then(|id| resolver.resolve(id, company.client_id(), month));
    match resolved {
        Some(config) => (config, true),
        None => {
            tracing::warn!(
                project = %project,
                company = %company,
                %month,
                "no billing config found, using fallback"
            );
            (BillingConfig::fallback(), false)
        }
    }
}

/// Computes billing for every month the entries cover.
pub fn compute_billing<R: ConfigResolver + ?Sized>(
    entries: &[CanonicalEntry],
    resolver: &R,
) -> BillingOutcome {
    let aggregation = aggregate_entries(entries);

    let months = aggregation
        .months
        .into_iter()
        .map(|month_totals| {
            let month = month_totals.month;
            let mut month_sum = BillingTotals::default();

            let companies = month_totals
                .companies
                .into_iter()
                .map(|company_totals| {
                    let mut company_sum = BillingTotals::default();
                    let projects: Vec<ProjectBilling> = company_totals
                        .projects
                        .iter()
                        .map(|project| {
                            let (config, matched) = resolve_config(
                                resolver,
                                &company_totals.company,
                                &project.project,
                                month,
                            );
                            let billed = bill_project(project, &config, matched);
                            company_sum += &billed;
                            billed
                        })
                        .collect();
                    month_sum += &company_sum;
                    CompanyBilling {
                        company: company_totals.company,
                        projects,
                        totals: company_sum,
                    }
                })
                .collect();

            tracing::debug!(
                %month,
                billed_revenue = %month_sum.billed_revenue,
                "computed monthly billing"
            );

            MonthlyBillingResult {
                month,
                companies,
                totals: month_sum,
            }
        })
        .collect();

    BillingOutcome {
        months,
        rejected: aggregation.rejected,
    }
}

/// Computes billing for a single month, ignoring entries outside it.
///
/// Fails with [`BillingError::NoSourceData`] when no valid entry falls in the
/// month.
pub fn compute_month<R: ConfigResolver + ?Sized>(
    entries: &[CanonicalEntry],
    month: BillingMonth,
    resolver: &R,
) -> Result<(MonthlyBillingResult, Vec<RejectedEntry>), BillingError> {
    let in_month: Vec<CanonicalEntry> = entries
        .iter()
        .filter(|e| month.contains(e.date))
        .cloned()
        .collect();
    let outcome = compute_billing(&in_month, resolver);
    let result = outcome
        .months
        .into_iter()
        .next()
        .ok_or(BillingError::NoSourceData { month })?;
    Ok((result, outcome.rejected))
}

/// Fails on the first project billed with the fallback config.
pub fn require_configs(result: &MonthlyBillingResult) -> Result<(), BillingError> {
    match result
        .unmatched_projects()
        .find_map(|p| p.project.project_id())
    {
        Some(project_id) => Err(BillingError::NoMatchingConfiguration {
            project_id: project_id.clone(),
            month: result.month,
        }),
        None => Ok(()),
    }
}
