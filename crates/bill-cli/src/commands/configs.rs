//! Billing config commands.

use std::io::Write;

use anyhow::{Result, bail};
use bill_core::{BillingConfig, BillingMonth, Hours, Money, ProjectId};
use bill_db::Database;
use clap::Args;

#[derive(Debug, Args)]
pub struct ConfigSetArgs {
    /// Project ID as it appears in the exports.
    pub project: ProjectId,

    /// Billing month (YYYY-MM).
    #[arg(long)]
    pub month: BillingMonth,

    /// Hourly rate, e.g. 85.50.
    #[arg(long)]
    pub rate: Money,

    /// Rounding increment in minutes; 0 disables rounding.
    #[arg(long, default_value_t = BillingConfig::DEFAULT_ROUNDING_INCREMENT_MINUTES)]
    pub rounding: i64,

    /// Minimum billed hours for an active project.
    #[arg(long)]
    pub min: Option<Hours>,

    /// Maximum billed hours.
    #[arg(long)]
    pub max: Option<Hours>,

    /// Mark the project inactive; the minimum is not enforced.
    #[arg(long)]
    pub inactive: bool,

    /// Carry hours above the maximum into following months.
    #[arg(long)]
    pub carryover: bool,

    /// Cap on hours carried into a month.
    #[arg(long, requires = "carryover")]
    pub carryover_max: Option<Hours>,

    /// Months after which carried hours expire.
    #[arg(long, requires = "carryover")]
    pub carryover_expiry: Option<u32>,
}

impl ConfigSetArgs {
    fn to_config(&self) -> Result<BillingConfig> {
        if self.rate < Money::ZERO {
            bail!("rate cannot be negative: {}", self.rate);
        }
        if self.rounding < 0 {
            bail!("rounding increment cannot be negative: {}", self.rounding);
        }
        for (name, hours) in [
            ("min", self.min),
            ("max", self.max),
            ("carryover-max", self.carryover_max),
        ] {
            if let Some(hours) = hours.filter(|h| *h < Hours::ZERO) {
                bail!("--{name} cannot be negative: {hours}");
            }
        }
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                bail!("--min {min} is greater than --max {max}");
            }
        }
        Ok(BillingConfig {
            rate: self.rate,
            rounding_increment_minutes: self.rounding,
            minimum_hours: self.min,
            maximum_hours: self.max,
            is_active: !self.inactive,
            carryover_enabled: self.carryover,
            carryover_hours_in: Hours::ZERO,
            carryover_max_hours: self.carryover_max,
            carryover_expiry_months: self.carryover_expiry,
        })
    }
}

pub fn set<W: Write>(writer: &mut W, args: &ConfigSetArgs, db: &mut Database) -> Result<()> {
    let config = args.to_config()?;
    db.set_config(&args.project, args.month, &config)?;
    writeln!(
        writer,
        "Saved {} {}: {}",
        args.month,
        args.project,
        describe(&config)
    )?;
    Ok(())
}

pub fn list<W: Write>(writer: &mut W, month: Option<BillingMonth>, db: &Database) -> Result<()> {
    let configs = db.list_configs(month)?;
    if configs.is_empty() {
        writeln!(writer, "No billing configs.")?;
        return Ok(());
    }
    for stored in configs {
        writeln!(
            writer,
            "{} {}: {}",
            stored.month,
            stored.project_id,
            describe(&stored.config)
        )?;
    }
    Ok(())
}

/// One-line summary of a config.
fn describe(config: &BillingConfig) -> String {
    let mut parts = vec![format!("rate {}/h", config.rate)];
    parts.push(match config.rounding_increment_minutes {
        0 => "no rounding".to_string(),
        minutes => format!("{minutes}m rounding"),
    });
    if let Some(min) = config.minimum_hours {
        parts.push(format!("min {min}h"));
    }
    if let Some(max) = config.maximum_hours {
        parts.push(format!("max {max}h"));
    }
    if !config.is_active {
        parts.push("inactive".to_string());
    }
    if config.carryover_enabled {
        parts.push("carryover".to_string());
        if let Some(cap) = config.carryover_max_hours {
            parts.push(format!("carryover cap {cap}h"));
        }
        if let Some(months) = config.carryover_expiry_months {
            parts.push(format!("carryover expires after {months} months"));
        }
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    fn args(project: &str, month: &str) -> ConfigSetArgs {
        ConfigSetArgs {
            project: ProjectId::new(project).unwrap(),
            month: month.parse().unwrap(),
            rate: "50".parse().unwrap(),
            rounding: 15,
            min: None,
            max: None,
            inactive: false,
            carryover: false,
            carryover_max: None,
            carryover_expiry: None,
        }
    }

    #[test]
    fn set_then_list_configs() {
        let mut db = Database::open_in_memory().unwrap();
        let mut output = Vec::new();

        set(&mut output, &args("web", "2025-01"), &mut db).unwrap();
        let ops = ConfigSetArgs {
            rate: "90.5".parse().unwrap(),
            rounding: 0,
            min: Some("2".parse().unwrap()),
            max: Some("10".parse().unwrap()),
            inactive: true,
            carryover: true,
            carryover_max: Some("4".parse().unwrap()),
            carryover_expiry: Some(3),
            ..args("ops", "2025-02")
        };
        set(&mut output, &ops, &mut db).unwrap();
        writeln!(output, "--").unwrap();
        list(&mut output, None, &db).unwrap();
        writeln!(output, "--").unwrap();
        list(&mut output, Some("2025-03".parse().unwrap()), &db).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Saved 2025-01 web: rate 50.00/h, 15m rounding
        Saved 2025-02 ops: rate 90.50/h, no rounding, min 2.00h, max 10.00h, inactive, carryover, carryover cap 4.00h, carryover expires after 3 months
        --
        2025-01 web: rate 50.00/h, 15m rounding
        2025-02 ops: rate 90.50/h, no rounding, min 2.00h, max 10.00h, inactive, carryover, carryover cap 4.00h, carryover expires after 3 months
        --
        No billing configs.
        ");
    }

    #[test]
    fn rejects_min_above_max() {
        let bad = ConfigSetArgs {
            min: Some("5".parse().unwrap()),
            max: Some("4".parse().unwrap()),
            ..args("web", "2025-01")
        };
        let err = bad.to_config().unwrap_err();
        assert_eq!(err.to_string(), "--min 5.00 is greater than --max 4.00");
    }

    #[test]
    fn rejects_negative_rate() {
        let bad = ConfigSetArgs {
            rate: "-1".parse().unwrap(),
            ..args("web", "2025-01")
        };
        assert!(bad.to_config().is_err());
    }
}
