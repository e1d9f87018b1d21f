//! Minimum/maximum hour limits and carryover.
//!
//! Evaluated once per project per month, in order:
//!
//! 1. `adjusted = rounded + carryover_in` (carryover only when enabled)
//! 2. active and `adjusted < minimum`: bill the minimum, record the padding
//! 3. `adjusted > maximum`: bill the maximum; the excess is carried over when
//!    carryover is enabled, otherwise it is unbillable
//! 4. otherwise bill `adjusted`
//! 5. `billed_revenue = billed * rate`
//!
//! The engine only emits the raw `carryover_out`. Expiry and caps on what
//! comes back in next month belong to the config store.

use serde::Serialize;

use crate::amount::{Hours, Money};
use crate::config::BillingConfig;

/// Which limit decided the billed hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitApplied {
    None,
    Minimum,
    Maximum,
}

/// Result of applying limits to one project's hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimitOutcome {
    pub carryover_in: Hours,
    pub adjusted_hours: Hours,
    pub billed_hours: Hours,
    pub minimum_padding: Hours,
    pub carryover_out: Hours,
    pub unbillable_hours: Hours,
    pub billed_revenue: Money,
    pub limit_applied: LimitApplied,
}

pub fn apply_limits(rounded_hours: Hours, config: &BillingConfig) -> LimitOutcome {
    let carryover_in = config.effective_carryover_in();
    let adjusted_hours = rounded_hours + carryover_in;

    let mut outcome = LimitOutcome {
        carryover_in,
        adjusted_hours,
        billed_hours: adjusted_hours,
        minimum_padding: Hours::ZERO,
        carryover_out: Hours::ZERO,
        unbillable_hours: Hours::ZERO,
        billed_revenue: Money::ZERO,
        limit_applied: LimitApplied::None,
    };

    match (config.minimum_hours, config.maximum_hours) {
        (Some(minimum), _) if config.is_active && adjusted_hours < minimum => {
            outcome.billed_hours = minimum;
            outcome.minimum_padding = minimum - adjusted_hours;
            outcome.limit_applied = LimitApplied::Minimum;
        }
        (_, Some(maximum)) if adjusted_hours > maximum => {
            let excess = adjusted_hours - maximum;
            outcome.billed_hours = maximum;
            if config.carryover_enabled {
                outcome.carryover_out = excess;
            } else {
                outcome.unbillable_hours = excess;
            }
            outcome.limit_applied = LimitApplied::Maximum;
        }
        _ => {}
    }

    outcome.billed_revenue = Money::for_hours(outcome.billed_hours, config.rate);
    outcome
}
