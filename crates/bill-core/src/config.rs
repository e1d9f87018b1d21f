//! Per-project billing configuration and how the engine looks it up.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::amount::{Hours, Money};
use crate::types::{BillingMonth, ClientId, ProjectId};

/// Billing parameters for one project in one billing month.
///
/// Supplied by the configuration store and never mutated by the engine.
/// `carryover_hours_in` is already resolved by the store (expiry and cap
/// applied); the engine only adds it when `carryover_enabled` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Hourly rate.
    pub rate: Money,
    /// Rounding granularity in minutes. Zero disables rounding.
    pub rounding_increment_minutes: i64,
    pub minimum_hours: Option<Hours>,
    pub maximum_hours: Option<Hours>,
    pub is_active: bool,
    pub carryover_enabled: bool,
    #[serde(default)]
    pub carryover_hours_in: Hours,
    pub carryover_max_hours: Option<Hours>,
    pub carryover_expiry_months: Option<u32>,
}

impl BillingConfig {
    pub const DEFAULT_ROUNDING_INCREMENT_MINUTES: i64 = 15;

    /// Config used for projects the store has no entry for: rate 0,
    /// 15-minute rounding, no limits, active, no carryover.
    pub const fn fallback() -> Self {
        Self {
            rate: Money::ZERO,
            rounding_increment_minutes: Self::DEFAULT_ROUNDING_INCREMENT_MINUTES,
            minimum_hours: None,
            maximum_hours: None,
            is_active: true,
            carryover_enabled: false,
            carryover_hours_in: Hours::ZERO,
            carryover_max_hours: None,
            carryover_expiry_months: None,
        }
    }

    /// Carryover hours that count toward this month; zero when disabled.
    pub const fn effective_carryover_in(&self) -> Hours {
        if self.carryover_enabled {
            self.carryover_hours_in
        } else {
            Hours::ZERO
        }
    }
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self::fallback()
    }
}

/// Supplies billing configs to the pipeline.
///
/// Returning `None` sends the project down the missing-config path: it is
/// billed with [`BillingConfig::fallback`] and flagged as unmatched.
pub trait ConfigResolver {
    fn resolve(
        &self,
        project_id: &ProjectId,
        client_id: Option<&ClientId>,
        month: BillingMonth,
    ) -> Option<BillingConfig>;
}

impl<F> ConfigResolver for F
where
    F: Fn(&ProjectId, Option<&ClientId>, BillingMonth) -> Option<BillingConfig>,
{
    fn resolve(
        &self,
        project_id: &ProjectId,
        client_id: Option<&ClientId>,
        month: BillingMonth,
    ) -> Option<BillingConfig> {
        self(project_id, client_id, month)
    }
}

/// An in-memory config table keyed by project and month.
#[derive(Debug, Clone, Default)]
pub struct ConfigTable {
    configs: HashMap<(ProjectId, BillingMonth), BillingConfig>,
}

impl ConfigTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, project_id: ProjectId, month: BillingMonth, config: BillingConfig) {
        self.configs.insert((project_id, month), config);
    }

    pub fn get(&self, project_id: &ProjectId, month: BillingMonth) -> Option<&BillingConfig> {
        self.configs.get(&(project_id.clone(), month))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ProjectId, BillingMonth, &BillingConfig)> {
        self.configs
            .iter()
            .map(|((project_id, month), config)| (project_id, *month, config))
    }

    pub fn len(&self) -> usize {
        self.configs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.configs.is_empty()
    }
}

impl ConfigResolver for ConfigTable {
    fn resolve(
        &self,
        project_id: &ProjectId,
        _client_id: Option<&ClientId>,
        month: BillingMonth,
    ) -> Option<BillingConfig> {
        self.get(project_id, month).cloned()
    }
}

impl FromIterator<(ProjectId, BillingMonth, BillingConfig)> for ConfigTable {
    fn from_iter<I: IntoIterator<Item = (ProjectId, BillingMonth, BillingConfig)>>(
        iter: I,
    ) -> Self {
        let mut table = Self::new();
        for (project_id, month, config) in iter {
            table.insert(project_id, month, config);
        }
        table
    }
}
