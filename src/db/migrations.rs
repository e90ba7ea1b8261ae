use anyhow::{bail, Context, Result};
use log::info;
use rusqlite::Connection;

/// Ordered schema steps. Entry `n` moves the ledger from version `n` to `n + 1`.
const MIGRATIONS: &[&str] = &[include_str!("schemas/schema_v1.sql")];

fn schema_version(conn: &Connection) -> Result<usize> {
    let version: i64 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .context("failed to read user_version pragma")?;
    usize::try_from(version).with_context(|| format!("negative schema version {version}"))
}

/// Bring the ledger up to the newest schema. Each step commits on its own,
/// so a failure leaves the database at the last good version.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let current = schema_version(conn)?;
    if current > MIGRATIONS.len() {
        bail!(
            "session ledger is at schema {current}, this build only knows {}",
            MIGRATIONS.len()
        );
    }

    for (step, sql) in MIGRATIONS.iter().enumerate().skip(current) {
        let target = step + 1;
        let tx = conn.transaction()?;
        tx.execute_batch(sql)
            .with_context(|| format!("schema step {target} failed"))?;
        tx.pragma_update(None, "user_version", target as i64)?;
        tx.commit()
            .with_context(|| format!("failed to commit schema step {target}"))?;
        info!("Session ledger migrated to schema {target}");
    }

    Ok(())
}
