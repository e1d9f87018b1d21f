//! Company name commands.

use std::io::Write;

use anyhow::{Result, bail};
use bill_core::ClientId;
use bill_db::Database;
use clap::Args;

#[derive(Debug, Args)]
pub struct CompanySetArgs {
    /// Client ID as it appears in the exports.
    pub client_id: ClientId,

    /// Display name used in reports.
    pub name: String,
}

pub fn set<W: Write>(writer: &mut W, args: &CompanySetArgs, db: &mut Database) -> Result<()> {
    let name = args.name.trim();
    if name.is_empty() {
        bail!("company name cannot be empty");
    }
    db.set_company_name(&args.client_id, name)?;
    writeln!(writer, "Company {} is now \"{name}\".", args.client_id)?;
    Ok(())
}
