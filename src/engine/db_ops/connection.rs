//! Open store connections.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

use crate::utils::config::DB_BUSY_TIMEOUT_MS;

use super::WAL_PRAGMAS;

/// Enable WAL and writer-friendly pragmas on an open connection (idempotent).
fn apply_wal(conn: &Connection) -> Result<()> {
    // Timeout first: switching to WAL takes a lock other sessions may hold.
    conn.busy_timeout(Duration::from_millis(DB_BUSY_TIMEOUT_MS))
        .context("set busy timeout")?;
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))
        .context("enable WAL")?;
    conn.execute_batch(WAL_PRAGMAS).context("set WAL pragmas")?;
    Ok(())
}

/// Open or create the store DB file with WAL and a busy timeout so concurrent writers wait instead of failing.
pub fn open_db(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("open fingerprint store {}", path.display()))?;
    apply_wal(&conn)?;
    // Batched key lookups bind their key lists through `rarray`.
    rusqlite::vtab::array::load_module(&conn).context("load rarray module")?;
    Ok(conn)
}
