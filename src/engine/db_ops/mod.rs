//! Fingerprint store: one SQLite table per namespace, keyed by raw path bytes.

mod connection;
mod store;

pub use connection::open_db;
pub use store::{FingerprintRecord, FingerprintStore, Namespace, StoreSession};

/// WAL tuning pragmas (synchronous, autocheckpoint, size limit). Use after PRAGMA journal_mode = WAL.
pub(crate) const WAL_PRAGMAS: &str = r#"
        PRAGMA synchronous = NORMAL;
        PRAGMA wal_autocheckpoint = 10000;
        PRAGMA journal_size_limit = 67108864;
        "#;

/// Schema of one namespace table. `data` is NULL for timestamp-only records.
pub(crate) fn namespace_schema(table: &str) -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS "{table}" (
    path BLOB PRIMARY KEY,
    mtime INTEGER NOT NULL,
    last_update INTEGER NOT NULL,
    data TEXT DEFAULT NULL
);
"#
    )
}

/// Upsert replacing token, last_update and payload together.
pub(crate) fn upsert_sql(table: &str) -> String {
    format!(
        r#"INSERT INTO "{table}" (path, mtime, last_update, data) VALUES (?1, ?2, ?3, ?4)
ON CONFLICT(path) DO UPDATE SET
    mtime = excluded.mtime,
    last_update = excluded.last_update,
    data = excluded.data"#
    )
}
