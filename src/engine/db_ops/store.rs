//! Staleness-aware key/value operations over namespace tables.
//!
//! A [`FingerprintStore`] opens a fresh connection per call and is safe to share across threads.
//! Short-lived batch workers instead hold one [`StoreSession`] each for the whole run; a session
//! owns its connection and never leaves the thread that opened it.

use anyhow::{Context, Result};
use rusqlite::types::Value as SqlValue;
use rusqlite::vtab::array::Array;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::{Mutex, PoisonError};

use crate::engine::tools::{key_to_path, path_to_key, unix_now};
use crate::error::ScanError;
use crate::types::LibraryId;
use crate::utils::config::TIMESTAMP_NAMESPACE_PREFIX;

use super::{namespace_schema, open_db, upsert_sql};

/// Logical partition of the store; maps 1:1 to a table.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Namespace(String);

impl Namespace {
    /// Validate a namespace name (`[A-Za-z0-9_]+`).
    pub fn new(name: impl Into<String>) -> Result<Self, ScanError> {
        let name = name.into();
        let valid = !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(Namespace(name))
        } else {
            Err(ScanError::InvalidNamespace(name))
        }
    }

    /// Timestamp-only namespace of one library.
    pub fn timestamps(library_id: LibraryId) -> Self {
        let id = if library_id < 0 {
            format!("n{}", library_id.unsigned_abs())
        } else {
            library_id.to_string()
        };
        Namespace(format!("{TIMESTAMP_NAMESPACE_PREFIX}{id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One stored fingerprint. `payload` is `None` for timestamp tracking and for cached "no data" results.
#[derive(Clone, Debug, PartialEq)]
pub struct FingerprintRecord {
    pub token: i64,
    pub last_update: i64,
    pub payload: Option<Value>,
}

/// File-backed fingerprint store.
pub struct FingerprintStore {
    db_path: PathBuf,
    known: Mutex<HashSet<Namespace>>,
}

impl FingerprintStore {
    /// Point at `db_path` without touching the filesystem; call [`Self::initialize`] before use.
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            known: Mutex::new(HashSet::new()),
        }
    }

    /// Create the DB location and open it with `namespaces` ensured.
    pub fn open<'a, I>(db_path: impl Into<PathBuf>, namespaces: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a Namespace>,
    {
        let store = Self::new(db_path);
        store.initialize(namespaces)?;
        Ok(store)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// Idempotently create the storage location and one table per namespace.
    pub fn initialize<'a, I>(&self, namespaces: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a Namespace>,
    {
        if let Some(dir) = self.db_path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create store directory {}", dir.display()))?;
        }
        let mut session = self.session()?;
        let tx = session.conn.transaction().context("begin transaction")?;
        let mut created = Vec::new();
        for ns in namespaces {
            tx.execute_batch(&namespace_schema(ns.as_str()))
                .with_context(|| format!("create namespace {ns}"))?;
            created.push(ns.clone());
        }
        tx.commit().context("commit transaction")?;
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(created);
        Ok(())
    }

    /// Open a connection for repeated use on the current thread.
    pub fn session(&self) -> Result<StoreSession<'_>> {
        let conn = open_db(&self.db_path)?;
        Ok(StoreSession { store: self, conn })
    }

    fn is_known(&self, ns: &Namespace) -> bool {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(ns)
    }

    fn mark_known(&self, ns: &Namespace) {
        self.known
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ns.clone());
    }

    pub fn get(
        &self,
        ns: &Namespace,
        path: &Path,
        expected_token: Option<i64>,
    ) -> Result<Option<FingerprintRecord>> {
        self.session()?.get(ns, path, expected_token)
    }

    pub fn put(
        &self,
        ns: &Namespace,
        path: &Path,
        token: i64,
        payload: Option<&Value>,
    ) -> Result<()> {
        self.session()?.put(ns, path, token, payload)
    }

    pub fn get_many<P: AsRef<Path>>(
        &self,
        ns: &Namespace,
        paths: &[P],
    ) -> Result<Vec<Option<FingerprintRecord>>> {
        self.session()?.get_many(ns, paths)
    }

    pub fn get_tokens<P: AsRef<Path>>(&self, ns: &Namespace, paths: &[P]) -> Result<Vec<Option<i64>>> {
        self.session()?.get_tokens(ns, paths)
    }

    pub fn put_many<P: AsRef<Path>>(&self, ns: &Namespace, values: &[(P, i64)]) -> Result<()> {
        self.session()?.put_many(ns, values)
    }

    pub fn remove<P: AsRef<Path>>(&self, ns: &Namespace, paths: &[P]) -> Result<usize> {
        self.session()?.remove(ns, paths)
    }

    pub fn all_keys(&self, ns: &Namespace) -> Result<Vec<PathBuf>> {
        self.session()?.all_keys(ns)
    }

    pub fn count(&self, ns: &Namespace) -> Result<usize> {
        self.session()?.count(ns)
    }
}

/// Connection bound to one thread. Not `Sync`; open one per worker.
pub struct StoreSession<'s> {
    store: &'s FingerprintStore,
    conn: Connection,
}

type RawRow = (Vec<u8>, i64, i64, Option<String>);

fn decode_record(ns: &Namespace, token: i64, last_update: i64, data: Option<String>) -> Result<FingerprintRecord> {
    let payload = match data {
        Some(s) => Some(
            serde_json::from_str(&s).with_context(|| format!("decode payload in namespace {ns}"))?,
        ),
        None => None,
    };
    Ok(FingerprintRecord {
        token,
        last_update,
        payload,
    })
}

/// Bind a path list as one `rarray` parameter of blob keys.
fn keys_param<P: AsRef<Path>>(paths: &[P]) -> Array {
    Rc::new(
        paths
            .iter()
            .map(|p| SqlValue::Blob(path_to_key(p.as_ref())))
            .collect(),
    )
}

impl StoreSession<'_> {
    fn ensure(&self, ns: &Namespace) -> Result<()> {
        if self.store.is_known(ns) {
            return Ok(());
        }
        self.conn
            .execute_batch(&namespace_schema(ns.as_str()))
            .with_context(|| format!("create namespace {ns}"))?;
        self.store.mark_known(ns);
        Ok(())
    }

    /// Fetch a record. With `expected_token`, a stored token that differs reads as not-found.
    pub fn get(
        &self,
        ns: &Namespace,
        path: &Path,
        expected_token: Option<i64>,
    ) -> Result<Option<FingerprintRecord>> {
        self.ensure(ns)?;
        let sql = format!(r#"SELECT mtime, last_update, data FROM "{ns}" WHERE path = ?1 LIMIT 1"#);
        let mut stmt = self.conn.prepare_cached(&sql).context("prepare get")?;
        let row = stmt
            .query_row([path_to_key(path)], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .optional()
            .context("query record")?;
        match row {
            Some((token, _, _)) if expected_token.is_some_and(|t| t != token) => Ok(None),
            Some((token, last_update, data)) => decode_record(ns, token, last_update, data).map(Some),
            None => Ok(None),
        }
    }

    /// Upsert: token, last_update and payload are replaced together.
    pub fn put(
        &self,
        ns: &Namespace,
        path: &Path,
        token: i64,
        payload: Option<&Value>,
    ) -> Result<()> {
        self.ensure(ns)?;
        let data = payload
            .map(serde_json::to_string)
            .transpose()
            .context("encode payload")?;
        let mut stmt = self
            .conn
            .prepare_cached(&upsert_sql(ns.as_str()))
            .context("prepare upsert")?;
        stmt.execute(params![path_to_key(path), token, unix_now(), data])
            .context("upsert record")?;
        Ok(())
    }

    /// Batched lookup in a single query; results are index-aligned with `paths`.
    pub fn get_many<P: AsRef<Path>>(
        &self,
        ns: &Namespace,
        paths: &[P],
    ) -> Result<Vec<Option<FingerprintRecord>>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        self.ensure(ns)?;
        let sql = format!(
            r#"SELECT path, mtime, last_update, data FROM "{ns}"
WHERE path IN rarray(?1)"#
        );
        let mut stmt = self.conn.prepare_cached(&sql).context("prepare get_many")?;
        let rows = stmt
            .query_map([keys_param(paths)], |row| {
                Ok::<RawRow, rusqlite::Error>((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .context("query records")?;
        let mut found: HashMap<Vec<u8>, FingerprintRecord> = HashMap::new();
        for row in rows {
            let (key, token, last_update, data) = row.context("read record")?;
            found.insert(key, decode_record(ns, token, last_update, data)?);
        }
        Ok(paths
            .iter()
            .map(|p| found.get(&path_to_key(p.as_ref())).cloned())
            .collect())
    }

    /// Freshness tokens only, index-aligned with `paths`.
    pub fn get_tokens<P: AsRef<Path>>(&self, ns: &Namespace, paths: &[P]) -> Result<Vec<Option<i64>>> {
        Ok(self
            .get_many(ns, paths)?
            .into_iter()
            .map(|r| r.map(|r| r.token))
            .collect())
    }

    /// Bulk upsert of timestamp-only records in one transaction.
    pub fn put_many<P: AsRef<Path>>(&mut self, ns: &Namespace, values: &[(P, i64)]) -> Result<()> {
        if values.is_empty() {
            return Ok(());
        }
        self.ensure(ns)?;
        let now = unix_now();
        let tx = self.conn.transaction().context("begin transaction")?;
        {
            let mut stmt = tx
                .prepare(&upsert_sql(ns.as_str()))
                .context("prepare upsert")?;
            for (path, token) in values {
                stmt.execute(params![
                    path_to_key(path.as_ref()),
                    token,
                    now,
                    None::<String>
                ])
                .context("upsert record")?;
            }
        }
        tx.commit().context("commit transaction")?;
        Ok(())
    }

    /// Delete records for `paths`; returns the number of rows removed.
    pub fn remove<P: AsRef<Path>>(&self, ns: &Namespace, paths: &[P]) -> Result<usize> {
        if paths.is_empty() {
            return Ok(0);
        }
        self.ensure(ns)?;
        let sql = format!(r#"DELETE FROM "{ns}" WHERE path IN rarray(?1)"#);
        self.conn
            .execute(&sql, [keys_param(paths)])
            .context("delete records")
    }

    /// Every key of a namespace, read in one statement (consistent snapshot).
    pub fn all_keys(&self, ns: &Namespace) -> Result<Vec<PathBuf>> {
        self.ensure(ns)?;
        let mut stmt = self
            .conn
            .prepare(&format!(r#"SELECT path FROM "{ns}""#))
            .context("prepare all_keys")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, Vec<u8>>(0))
            .context("query keys")?;
        let mut keys = Vec::new();
        for row in rows {
            keys.push(key_to_path(row.context("read key")?));
        }
        Ok(keys)
    }

    pub fn count(&self, ns: &Namespace) -> Result<usize> {
        self.ensure(ns)?;
        let n: i64 = self
            .conn
            .query_row(&format!(r#"SELECT COUNT(*) FROM "{ns}""#), [], |row| row.get(0))
            .context("count records")?;
        Ok(n.max(0) as usize)
    }
}
