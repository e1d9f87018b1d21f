//! Storage layer for billing.
//!
//! Persists imported entries, per-month billing configs, company names,
//! computed project results and the carryover state table using `rusqlite`.
//!
//! # Thread Safety
//!
//! [`Database`] wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Move it between threads freely; share it only behind a `Mutex`.
//!
//! # Schema
//!
//! Money is stored as integer cents and hours as integer hundredths, so
//! figures round-trip without loss. Months are `YYYY-MM` text, which sorts
//! chronologically. Timestamps are RFC 3339 UTC text.
//!
//! ## Carryover
//!
//! Every saved month writes one `carryover` row per project, zero included.
//! The hours carried into month M come from the latest row before M, subject
//! to the project's expiry and cap. A zero row therefore resets the balance.

use std::collections::HashMap;
use std::fmt::Display;
use std::path::Path;

use bill_core::reconcile::LookupTables;
use bill_core::{
    BillingConfig, BillingMonth, CanonicalEntry, ClientId, ConfigTable, EntryId,
    ExpectedProjectFigures, Hours, Money, MonthlyBillingResult, ProjectId, SourceSystem,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use uuid::Uuid;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored value could not be decoded into its domain type.
    #[error("invalid value in {column}: {value:?} ({message})")]
    InvalidValue {
        column: &'static str,
        value: String,
        message: String,
    },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// A billing config together with the project and month it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredConfig {
    pub project_id: ProjectId,
    pub month: BillingMonth,
    pub config: BillingConfig,
}

/// A month with persisted billing results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthRecord {
    pub month: BillingMonth,
    pub run_id: String,
    pub created_at: String,
    pub projects: usize,
    pub billed_revenue: Money,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema. Idempotent.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            -- Canonical entries; month is derived from date for indexed lookups
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                source_system TEXT NOT NULL,
                project_id TEXT,
                client_id TEXT,
                task_name TEXT,
                minutes INTEGER NOT NULL,
                date TEXT NOT NULL,
                month TEXT NOT NULL,
                imported_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_entries_month ON entries(month);

            CREATE TABLE IF NOT EXISTS billing_configs (
                project_id TEXT NOT NULL,
                month TEXT NOT NULL,
                rate_cents INTEGER NOT NULL,
                rounding_increment_minutes INTEGER NOT NULL,
                minimum_hundredths INTEGER,
                maximum_hundredths INTEGER,
                is_active INTEGER NOT NULL DEFAULT 1,
                carryover_enabled INTEGER NOT NULL DEFAULT 0,
                carryover_max_hundredths INTEGER,
                carryover_expiry_months INTEGER,
                PRIMARY KEY (project_id, month)
            );

            CREATE TABLE IF NOT EXISTS companies (
                client_id TEXT PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS billing_runs (
                id TEXT PRIMARY KEY,
                month TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS project_results (
                run_id TEXT NOT NULL,
                month TEXT NOT NULL,
                project_id TEXT NOT NULL,
                client_id TEXT,
                config_matched INTEGER NOT NULL,
                actual_minutes INTEGER NOT NULL,
                rounded_minutes INTEGER NOT NULL,
                rounded_hundredths INTEGER NOT NULL,
                base_revenue_cents INTEGER NOT NULL,
                carryover_in_hundredths INTEGER NOT NULL,
                billed_hundredths INTEGER NOT NULL,
                carryover_out_hundredths INTEGER NOT NULL,
                unbillable_hundredths INTEGER NOT NULL,
                billed_revenue_cents INTEGER NOT NULL,
                PRIMARY KEY (month, project_id),
                FOREIGN KEY (run_id) REFERENCES billing_runs(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_project_results_run ON project_results(run_id);

            -- Carryover state, keyed by (project_id, month)
            CREATE TABLE IF NOT EXISTS carryover (
                project_id TEXT NOT NULL,
                month TEXT NOT NULL,
                hours_out_hundredths INTEGER NOT NULL,
                PRIMARY KEY (project_id, month)
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts a batch of entries, ignoring duplicates by ID.
    pub fn insert_entries(
        &mut self,
        entries: &[CanonicalEntry],
        imported_at: DateTime<Utc>,
    ) -> Result<usize, DbError> {
        if entries.is_empty() {
            return Ok(0);
        }
        let imported_at = format_timestamp(imported_at);
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO entries
                (id, source_system, project_id, client_id, task_name, minutes, date, month, imported_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            for entry in entries {
                inserted += stmt.execute(params![
                    entry.entry_id.as_str(),
                    entry.source_system.as_str(),
                    entry.project_id.as_ref().map(ProjectId::as_str),
                    entry.client_id.as_ref().map(ClientId::as_str),
                    entry.task_name,
                    entry.minutes,
                    entry.date.to_string(),
                    entry.billing_month().to_string(),
                    imported_at,
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!(inserted, total = entries.len(), "stored entries");
        Ok(inserted)
    }

    /// Entries dated within `month`, ordered by date then ID.
    pub fn entries_in_month(&self, month: BillingMonth) -> Result<Vec<CanonicalEntry>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, source_system, project_id, client_id, task_name, minutes, date
            FROM entries
            WHERE month = ?
            ORDER BY date ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([month.to_string()], |row| {
            Ok(EntryRow {
                id: row.get(0)?,
                source_system: row.get(1)?,
                project_id: row.get(2)?,
                client_id: row.get(3)?,
                task_name: row.get(4)?,
                minutes: row.get(5)?,
                date: row.get(6)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_entry()?);
        }
        Ok(entries)
    }

    pub fn entry_count(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM entries", [], |row| row.get(0))?;
        decode("entries.count", count.to_string(), |_| usize::try_from(count))
    }

    /// Stores the config for a project and month, replacing any existing one.
    ///
    /// `carryover_hours_in` is not stored; it is derived on read.
    pub fn set_config(
        &mut self,
        project_id: &ProjectId,
        month: BillingMonth,
        config: &BillingConfig,
    ) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT OR REPLACE INTO billing_configs
            (project_id, month, rate_cents, rounding_increment_minutes, minimum_hundredths,
             maximum_hundredths, is_active, carryover_enabled, carryover_max_hundredths,
             carryover_expiry_months)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                project_id.as_str(),
                month.to_string(),
                config.rate.cents(),
                config.rounding_increment_minutes,
                config.minimum_hours.map(Hours::hundredths),
                config.maximum_hours.map(Hours::hundredths),
                config.is_active,
                config.carryover_enabled,
                config.carryover_max_hours.map(Hours::hundredths),
                config.carryover_expiry_months.map(i64::from),
            ],
        )?;
        Ok(())
    }

    /// Lists stored configs ordered by month then project, optionally for
    /// one month only. Carryover-in is left at zero.
    pub fn list_configs(&self, month: Option<BillingMonth>) -> Result<Vec<StoredConfig>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT project_id, month, rate_cents, rounding_increment_minutes, minimum_hundredths,
                   maximum_hundredths, is_active, carryover_enabled, carryover_max_hundredths,
                   carryover_expiry_months
            FROM billing_configs
            WHERE ?1 IS NULL OR month = ?1
            ORDER BY month ASC, project_id ASC
            ",
        )?;
        let rows = stmt.query_map([month.map(|m| m.to_string())], ConfigRow::from_row)?;
        let mut configs = Vec::new();
        for row in rows {
            configs.push(row?.into_stored()?);
        }
        Ok(configs)
    }

    /// All configs for `month`, carryover resolved, ready for the pipeline.
    pub fn config_table(&self, month: BillingMonth) -> Result<ConfigTable, DbError> {
        let mut table = ConfigTable::new();
        for mut stored in self.list_configs(Some(month))? {
            stored.config.carryover_hours_in =
                self.carryover_in(&stored.project_id, month, &stored.config)?;
            table.insert(stored.project_id, stored.month, stored.config);
        }
        Ok(table)
    }

    /// Hours carried into `month`, after expiry and cap.
    fn carryover_in(
        &self,
        project_id: &ProjectId,
        month: BillingMonth,
        config: &BillingConfig,
    ) -> Result<Hours, DbError> {
        if !config.carryover_enabled {
            return Ok(Hours::ZERO);
        }
        let latest: Option<(String, i64)> = self
            .conn
            .query_row(
                "
                SELECT month, hours_out_hundredths
                FROM carryover
                WHERE project_id = ? AND month < ?
                ORDER BY month DESC
                LIMIT 1
                ",
                params![project_id.as_str(), month.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((from_month, hundredths)) = latest else {
            return Ok(Hours::ZERO);
        };
        let from_month = decode("carryover.month", from_month, str::parse::<BillingMonth>)?;
        let hours = Hours::from_hundredths(hundredths);

        let expired = config
            .carryover_expiry_months
            .is_some_and(|expiry| month.months_since(from_month) > i64::from(expiry));
        if expired {
            tracing::debug!(project = %project_id, %from_month, %month, "carryover expired");
            return Ok(Hours::ZERO);
        }
        Ok(match config.carryover_max_hours {
            Some(max) if hours > max => max,
            _ => hours,
        })
    }

    pub fn set_company_name(&mut self, client_id: &ClientId, name: &str) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO companies (client_id, name) VALUES (?, ?)
            ON CONFLICT(client_id) DO UPDATE SET name = excluded.name
            ",
            params![client_id.as_str(), name],
        )?;
        Ok(())
    }

    pub fn company_name(&self, client_id: &ClientId) -> Result<Option<String>, DbError> {
        let name = self
            .conn
            .query_row(
                "SELECT name FROM companies WHERE client_id = ?",
                [client_id.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }

    pub fn company_names(&self) -> Result<HashMap<ClientId, String>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT client_id, name FROM companies ORDER BY client_id ASC")?;
        let rows = stmt.query_map([], |row| {
            let client_id: String = row.get(0)?;
            let name: String = row.get(1)?;
            Ok((client_id, name))
        })?;
        let mut names = HashMap::new();
        for row in rows {
            let (client_id, name) = row?;
            names.insert(decode("companies.client_id", client_id, |v| ClientId::new(v.to_owned()))?, name);
        }
        Ok(names)
    }

    /// Reference data for reconciling `month`.
    pub fn lookup_tables(&self, month: BillingMonth) -> Result<LookupTables, DbError> {
        let configs = self
            .config_table(month)?
            .iter()
            .map(|(project_id, _, config)| (project_id.clone(), config.clone()))
            .collect();
        Ok(LookupTables {
            configs,
            companies: self.company_names()?,
        })
    }

    /// Persists a month's billing, replacing any earlier run for that month.
    ///
    /// Writes one result row and one carryover row per project. The
    /// unassigned project has no id to key on and is not persisted.
    /// Returns the new run ID.
    pub fn save_month_result(
        &mut self,
        result: &MonthlyBillingResult,
        created_at: DateTime<Utc>,
    ) -> Result<String, DbError> {
        let month = result.month.to_string();
        let run_id = Uuid::new_v4().to_string();
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM billing_runs WHERE month = ?", [&month])?;
        tx.execute("DELETE FROM carryover WHERE month = ?", [&month])?;
        tx.execute(
            "INSERT INTO billing_runs (id, month, created_at) VALUES (?, ?, ?)",
            params![run_id, month, format_timestamp(created_at)],
        )?;
        {
            let mut result_stmt = tx.prepare(
                "
                INSERT INTO project_results
                (run_id, month, project_id, client_id, config_matched, actual_minutes,
                 rounded_minutes, rounded_hundredths, base_revenue_cents, carryover_in_hundredths,
                 billed_hundredths, carryover_out_hundredths, unbillable_hundredths,
                 billed_revenue_cents)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ",
            )?;
            let mut carryover_stmt = tx.prepare(
                "INSERT INTO carryover (project_id, month, hours_out_hundredths) VALUES (?, ?, ?)",
            )?;
            for company in &result.companies {
                let client_id = company.company.client_id().map(ClientId::as_str);
                for project in &company.projects {
                    let Some(project_id) = project.project.project_id() else {
                        tracing::debug!(%month, "not persisting unassigned project");
                        continue;
                    };
                    result_stmt.execute(params![
                        run_id,
                        month,
                        project_id.as_str(),
                        client_id,
                        project.config_matched,
                        project.actual_minutes,
                        project.rounded_minutes,
                        project.rounded_hours.hundredths(),
                        project.base_revenue.cents(),
                        project.carryover_in.hundredths(),
                        project.billed_hours.hundredths(),
                        project.carryover_out.hundredths(),
                        project.unbillable_hours.hundredths(),
                        project.billed_revenue.cents(),
                    ])?;
                    carryover_stmt.execute(params![
                        project_id.as_str(),
                        month,
                        project.carryover_out.hundredths(),
                    ])?;
                }
            }
        }
        tx.commit()?;
        tracing::debug!(%month, %run_id, "saved billing run");
        Ok(run_id)
    }

    /// Persisted figures for `month`, ordered by project.
    pub fn expected_figures(
        &self,
        month: BillingMonth,
    ) -> Result<Vec<ExpectedProjectFigures>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT project_id, client_id, rounded_hundredths, base_revenue_cents, billed_revenue_cents
            FROM project_results
            WHERE month = ?
            ORDER BY project_id ASC
            ",
        )?;
        let rows = stmt.query_map([month.to_string()], |row| {
            let project_id: String = row.get(0)?;
            let client_id: Option<String> = row.get(1)?;
            let rounded: i64 = row.get(2)?;
            let base: i64 = row.get(3)?;
            let billed: i64 = row.get(4)?;
            Ok((project_id, client_id, rounded, base, billed))
        })?;
        let mut figures = Vec::new();
        for row in rows {
            let (project_id, client_id, rounded, base, billed) = row?;
            figures.push(ExpectedProjectFigures {
                project_id: decode("project_results.project_id", project_id, |v| {
                    ProjectId::new(v.to_owned())
                })?,
                client_id: client_id
                    .map(|id| decode("project_results.client_id", id, |v| ClientId::new(v.to_owned())))
                    .transpose()?,
                rounded_hours: Hours::from_hundredths(rounded),
                base_revenue: Money::from_cents(base),
                billed_revenue: Money::from_cents(billed),
            });
        }
        Ok(figures)
    }

    /// Months with a persisted run, oldest first.
    pub fn result_months(&self) -> Result<Vec<MonthRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT r.month, r.id, r.created_at, COUNT(p.project_id),
                   COALESCE(SUM(p.billed_revenue_cents), 0)
            FROM billing_runs r
            LEFT JOIN project_results p ON p.run_id = r.id
            GROUP BY r.id
            ORDER BY r.month ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            let month: String = row.get(0)?;
            let run_id: String = row.get(1)?;
            let created_at: String = row.get(2)?;
            let projects: i64 = row.get(3)?;
            let billed: i64 = row.get(4)?;
            Ok((month, run_id, created_at, projects, billed))
        })?;
        let mut months = Vec::new();
        for row in rows {
            let (month, run_id, created_at, projects, billed) = row?;
            months.push(MonthRecord {
                month: decode("billing_runs.month", month, str::parse::<BillingMonth>)?,
                run_id,
                created_at,
                projects: decode("project_results.count", projects.to_string(), |_| {
                    usize::try_from(projects)
                })?,
                billed_revenue: Money::from_cents(billed),
            });
        }
        Ok(months)
    }
}

struct EntryRow {
    id: String,
    source_system: String,
    project_id: Option<String>,
    client_id: Option<String>,
    task_name: Option<String>,
    minutes: i64,
    date: String,
}

impl EntryRow {
    fn into_entry(self) -> Result<CanonicalEntry, DbError> {
        Ok(CanonicalEntry {
            entry_id: decode("entries.id", self.id, |v| EntryId::new(v.to_owned()))?,
            project_id: self
                .project_id
                .map(|id| decode("entries.project_id", id, |v| ProjectId::new(v.to_owned())))
                .transpose()?,
            client_id: self
                .client_id
                .map(|id| decode("entries.client_id", id, |v| ClientId::new(v.to_owned())))
                .transpose()?,
            task_name: self.task_name,
            minutes: self.minutes,
            date: decode("entries.date", self.date, |v| {
                NaiveDate::parse_from_str(v, "%Y-%m-%d")
            })?,
            source_system: decode(
                "entries.source_system",
                self.source_system,
                str::parse::<SourceSystem>,
            )?,
        })
    }
}

struct ConfigRow {
    project_id: String,
    month: String,
    rate_cents: i64,
    rounding_increment_minutes: i64,
    minimum_hundredths: Option<i64>,
    maximum_hundredths: Option<i64>,
    is_active: bool,
    carryover_enabled: bool,
    carryover_max_hundredths: Option<i64>,
    carryover_expiry_months: Option<i64>,
}

impl ConfigRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            project_id: row.get(0)?,
            month: row.get(1)?,
            rate_cents: row.get(2)?,
            rounding_increment_minutes: row.get(3)?,
            minimum_hundredths: row.get(4)?,
            maximum_hundredths: row.get(5)?,
            is_active: row.get(6)?,
            carryover_enabled: row.get(7)?,
            carryover_max_hundredths: row.get(8)?,
            carryover_expiry_months: row.get(9)?,
        })
    }

    fn into_stored(self) -> Result<StoredConfig, DbError> {
        let carryover_expiry_months = self
            .carryover_expiry_months
            .map(|months| {
                decode(
                    "billing_configs.carryover_expiry_months",
                    months.to_string(),
                    |_| u32::try_from(months),
                )
            })
            .transpose()?;
        Ok(StoredConfig {
            project_id: decode("billing_configs.project_id", self.project_id, |v| {
                ProjectId::new(v.to_owned())
            })?,
            month: decode("billing_configs.month", self.month, str::parse::<BillingMonth>)?,
            config: BillingConfig {
                rate: Money::from_cents(self.rate_cents),
                rounding_increment_minutes: self.rounding_increment_minutes,
                minimum_hours: self.minimum_hundredths.map(Hours::from_hundredths),
                maximum_hours: self.maximum_hundredths.map(Hours::from_hundredths),
                is_active: self.is_active,
                carryover_enabled: self.carryover_enabled,
                carryover_hours_in: Hours::ZERO,
                carryover_max_hours: self.carryover_max_hundredths.map(Hours::from_hundredths),
                carryover_expiry_months,
            },
        })
    }
}

/// Decodes a stored value, naming the column on failure.
fn decode<T, E: Display>(
    column: &'static str,
    value: String,
    parse: impl FnOnce(&str) -> Result<T, E>,
) -> Result<T, DbError> {
    parse(&value).map_err(|err| DbError::InvalidValue {
        column,
        message: err.to_string(),
        value,
    })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
