//! Status command for showing stored entries and billing runs.

use std::io::Write;
use std::path::Path;

use anyhow::Result;
use bill_db::Database;

pub fn run<W: Write>(writer: &mut W, db: &Database, database_path: &Path) -> Result<()> {
    let entries = db.entry_count()?;
    let months = db.result_months()?;

    writeln!(writer, "Billing status")?;
    writeln!(writer, "Database: {}", database_path.display())?;
    writeln!(writer, "Entries: {entries}")?;

    if months.is_empty() {
        writeln!(writer, "No billing runs recorded.")?;
        return Ok(());
    }

    writeln!(writer, "Billing runs:")?;
    for record in months {
        writeln!(
            writer,
            "- {}: {} projects, billed {} (run {})",
            record.month, record.projects, record.billed_revenue, record.created_at
        )?;
    }

    Ok(())
}
