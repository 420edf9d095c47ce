//! Embedded libSQL catalog store.
//!
//! The [`CatalogStore`] wraps a libSQL database holding one row per identity
//! key (see [`CatalogRecord::identity_key`]). Upserts are idempotent: writing
//! the same key twice replaces the row.
//!
//! **Access rules:**
//! - Collection runs: read-write (sole writer) via [`CatalogStore::open`]
//! - Stats/export readers: read-only via [`CatalogStore::open_readonly`]
//!
//! Writes are serialized through an internal write clock that also issues
//! strictly increasing `written_at` timestamps. Maintenance operations
//! ([`CatalogStore::cleanup`], [`CatalogStore::deduplicate_by_url`]) take the
//! run lock, so they never overlap a collection cycle. The run lock is an
//! exclusive file lock on `<db>.lock`, so it holds across processes.

mod migrations;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use apicatalog_dedup::{Reconciliation, fingerprint};
use apicatalog_shared::{CatalogError, CatalogRecord, Metadata, Result, is_valid_layer};
use chrono::{DateTime, Utc};
use fs4::FileExt;
use libsql::{Connection, Database, params};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Columns selected by every record read, in [`row_to_stored`] order.
const RECORD_COLUMNS: &str =
    "id, name, description, url, source, category, auth, region, layer, metadata, written_at";

/// Held for the duration of a collection cycle. See [`CatalogStore::begin_cycle`].
///
/// The lock is released when the guard is dropped.
#[derive(Debug)]
pub struct CycleGuard {
    _file: File,
}

/// Primary storage handle wrapping a libSQL database.
pub struct CatalogStore {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    path: PathBuf,
    readonly: bool,
    /// Last issued `written_at` (µs since epoch). Locked for every write.
    write_clock: Mutex<i64>,
}

/// A persisted record with its store bookkeeping.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    /// Identity key (primary key).
    pub id: String,
    /// The record as stored (fields truncated to their bounds).
    #[serde(flatten)]
    pub record: CatalogRecord,
    /// Last write time; monotonic per key.
    #[serde(rename = "timestamp")]
    pub written_at: DateTime<Utc>,
}

/// Result of a [`CatalogStore::bulk_upsert`] call.
#[derive(Debug, Clone, Default)]
pub struct BulkOutcome {
    /// Records actually persisted.
    pub saved: usize,
    /// Records rejected by validation (empty url/name, bad layer).
    pub invalid: usize,
    /// Records whose write failed.
    pub failed: usize,
    /// Errors encountered (record url, error message).
    pub errors: Vec<(String, String)>,
}

/// Per-cause deletion counts from [`CatalogStore::cleanup`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    /// Rows removed for an empty url.
    pub empty_url: u64,
    /// Rows removed for an empty name.
    pub empty_name: u64,
    /// Rows removed because a more recent row shares their url.
    pub duplicate_urls: u64,
}

impl CleanupReport {
    /// Total rows deleted.
    pub fn total(&self) -> u64 {
        self.empty_url + self.empty_name + self.duplicate_urls
    }
}

/// Rows touched when applying a [`Reconciliation`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileApplied {
    /// Superseded rows deleted.
    pub removed: u64,
    /// Canonical rows whose metadata was rewritten.
    pub updated: u64,
}

/// A category and how many rows carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub category: String,
    pub count: u64,
}

/// Catalog-wide statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CatalogStatistics {
    /// Total rows.
    pub total: u64,
    /// Distinct url values.
    pub unique_urls: u64,
    /// Distinct non-empty categories.
    pub categories: u64,
    /// Distinct non-empty sources.
    pub sources: u64,
    /// Row count per layer.
    pub by_layer: BTreeMap<u8, u64>,
    /// Most frequent categories, descending.
    pub top_categories: Vec<CategoryCount>,
    /// Row count per auth method (empty shown as `"None"`).
    pub auth_types: BTreeMap<String, u64>,
    /// Database file size in bytes.
    pub db_size_bytes: u64,
}

impl CatalogStore {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CatalogError::io(parent, e))?;
        }

        let store = Self::connect(path, false).await?;
        store.run_migrations().await?;
        store.seed_write_clock().await?;
        Ok(store)
    }

    /// Open a database at `path` in read-only mode (stats and export).
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CatalogError::Storage(format!(
                "no catalog database at {}",
                path.display()
            )));
        }
        Self::connect(path, true).await
    }

    async fn connect(path: &Path, readonly: bool) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(storage_err)?;

        let conn = db.connect().map_err(storage_err)?;

        Ok(Self {
            db,
            conn,
            path: path.to_path_buf(),
            readonly,
            write_clock: Mutex::new(0),
        })
    }

    /// Path of the underlying database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        CatalogError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Start the write clock after the newest persisted timestamp.
    async fn seed_write_clock(&self) -> Result<()> {
        let latest = self
            .scalar_i64("SELECT COALESCE(MAX(written_at), 0) FROM apis")
            .await?;
        *self.write_clock.lock().await = latest;
        Ok(())
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(CatalogError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Acquire the run lock for a collection cycle.
    ///
    /// While the guard lives, `cleanup` and `deduplicate_by_url` wait, on
    /// this handle and on any other handle or process using the same
    /// database file. Readers are never blocked.
    pub async fn begin_cycle(&self) -> Result<CycleGuard> {
        let path = self.lock_path();
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| CatalogError::io(&path, e))?;

        // flock blocks the thread, so wait for it off the runtime.
        let locked = tokio::task::spawn_blocking(move || file.lock_exclusive().map(|()| file))
            .await
            .map_err(|e| CatalogError::Storage(format!("run lock task failed: {e}")))?;
        let file = locked.map_err(|e| CatalogError::io(&path, e))?;
        debug!(lock = %path.display(), "run lock acquired");
        Ok(CycleGuard { _file: file })
    }

    /// Lock file guarding collection cycles, next to the database file.
    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    // -----------------------------------------------------------------------
    // Writes
    // -----------------------------------------------------------------------

    /// Insert or replace the row keyed by the record's identity key.
    ///
    /// Text fields are truncated to their bounds before the key is computed.
    /// Records with an empty url or name, or a layer outside 1–12, are
    /// rejected with [`CatalogError::RecordInvalid`]. Returns the identity key.
    pub async fn upsert(&self, record: &CatalogRecord, layer: u8) -> Result<String> {
        self.check_writable()?;

        if !is_valid_layer(layer) {
            return Err(CatalogError::record_invalid(format!(
                "layer {layer} outside 1-12"
            )));
        }
        if !record.has_required_fields() {
            return Err(CatalogError::record_invalid(format!(
                "missing url or name (url={:?}, name={:?})",
                record.url, record.name
            )));
        }

        let mut row = record.clone();
        row.layer = layer;
        row.truncate_fields();

        let id = row.identity_key();
        let metadata = encode_metadata(&row.metadata)?;
        let print = fingerprint(&row);

        let mut clock = self.write_clock.lock().await;
        let written_at = next_tick(&mut clock);

        self.conn
            .execute(
                "INSERT INTO apis (id, name, description, url, source, category, auth, region, layer, metadata, fingerprint, written_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(id) DO UPDATE SET
                   name = excluded.name,
                   description = excluded.description,
                   url = excluded.url,
                   source = excluded.source,
                   category = excluded.category,
                   auth = excluded.auth,
                   region = excluded.region,
                   layer = excluded.layer,
                   metadata = excluded.metadata,
                   fingerprint = excluded.fingerprint,
                   written_at = MAX(excluded.written_at, apis.written_at + 1)",
                params![
                    id.as_str(),
                    row.name.as_str(),
                    row.description.as_str(),
                    row.url.as_str(),
                    row.source.as_str(),
                    row.category.as_str(),
                    row.auth_method.as_str(),
                    row.region.as_str(),
                    i64::from(layer),
                    metadata.as_str(),
                    print.as_str(),
                    written_at,
                ],
            )
            .await
            .map_err(storage_err)?;

        Ok(id)
    }

    /// Upsert every record, isolating per-record failures.
    ///
    /// A rejected or failed record is counted and logged; it never aborts
    /// the batch. `saved` counts only rows actually persisted.
    pub async fn bulk_upsert(&self, records: &[CatalogRecord], layer: u8) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();

        for record in records {
            match self.upsert(record, layer).await {
                Ok(_) => outcome.saved += 1,
                Err(e @ CatalogError::RecordInvalid { .. }) => {
                    debug!(url = %record.url, error = %e, "record rejected");
                    outcome.invalid += 1;
                    outcome.errors.push((record.url.clone(), e.to_string()));
                }
                Err(e) => {
                    warn!(url = %record.url, error = %e, "failed to store record");
                    outcome.failed += 1;
                    outcome.errors.push((record.url.clone(), e.to_string()));
                }
            }
        }

        debug!(
            layer,
            saved = outcome.saved,
            invalid = outcome.invalid,
            failed = outcome.failed,
            "bulk upsert complete"
        );
        outcome
    }

    /// Delete one row by identity key. Returns whether a row was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.check_writable()?;
        let _clock = self.write_clock.lock().await;
        let removed = self
            .conn
            .execute("DELETE FROM apis WHERE id = ?1", params![id])
            .await
            .map_err(storage_err)?;
        Ok(removed > 0)
    }

    /// Persist a reconciliation pass: rewrite the merged metadata of
    /// canonical rows, then delete superseded rows.
    ///
    /// Runs in one transaction. On any failure nothing is applied, so the
    /// superseded rows and their metadata stay in the catalog.
    pub async fn apply_reconciliation(&self, plan: &Reconciliation) -> Result<ReconcileApplied> {
        self.check_writable()?;
        let mut clock = self.write_clock.lock().await;
        let tx = self.conn.transaction().await.map_err(storage_err)?;

        match apply_plan(&tx, plan, &mut clock).await {
            Ok(applied) => {
                tx.commit().await.map_err(storage_err)?;
                debug!(
                    removed = applied.removed,
                    updated = applied.updated,
                    "reconciliation applied"
                );
                Ok(applied)
            }
            Err(e) => {
                if let Err(rollback) = tx.rollback().await {
                    warn!(error = %rollback, "reconciliation rollback failed");
                }
                Err(e)
            }
        }
    }

    /// Among rows sharing a url, keep only the most recently written one.
    /// Returns the number of rows deleted.
    pub async fn deduplicate_by_url(&self) -> Result<u64> {
        self.check_writable()?;
        let _run = self.begin_cycle().await?;
        self.delete_stale_url_duplicates().await
    }

    async fn delete_stale_url_duplicates(&self) -> Result<u64> {
        let _clock = self.write_clock.lock().await;
        let deleted = self
            .conn
            .execute(
                "DELETE FROM apis WHERE EXISTS (
                   SELECT 1 FROM apis AS newer
                   WHERE newer.url = apis.url
                     AND (newer.written_at > apis.written_at
                          OR (newer.written_at = apis.written_at AND newer.rowid > apis.rowid))
                 )",
                params![],
            )
            .await
            .map_err(storage_err)?;
        info!(deleted, "removed stale url duplicates");
        Ok(deleted)
    }

    /// Delete rows with an empty url or name, then deduplicate by url.
    pub async fn cleanup(&self) -> Result<CleanupReport> {
        self.check_writable()?;
        let _run = self.begin_cycle().await?;

        let mut report = CleanupReport::default();
        {
            let _clock = self.write_clock.lock().await;
            report.empty_url = self
                .conn
                .execute("DELETE FROM apis WHERE trim(url) = ''", params![])
                .await
                .map_err(storage_err)?;
            report.empty_name = self
                .conn
                .execute("DELETE FROM apis WHERE trim(name) = ''", params![])
                .await
                .map_err(storage_err)?;
        }
        report.duplicate_urls = self.delete_stale_url_duplicates().await?;

        info!(
            empty_url = report.empty_url,
            empty_name = report.empty_name,
            duplicate_urls = report.duplicate_urls,
            "cleanup complete"
        );
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Get a row by identity key.
    pub async fn get(&self, id: &str) -> Result<Option<StoredRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM apis WHERE id = ?1");
        let mut rows = self
            .conn
            .query(&sql, params![id])
            .await
            .map_err(storage_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_stored(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(storage_err(e)),
        }
    }

    /// All rows of one layer, most recent first.
    pub async fn by_layer(&self, layer: u8) -> Result<Vec<StoredRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM apis WHERE layer = ?1 ORDER BY written_at DESC"
        );
        self.query_records(&sql, params![i64::from(layer)]).await
    }

    /// Rows whose category contains `needle` (case-insensitive), most recent first.
    pub async fn by_category_contains(&self, needle: &str) -> Result<Vec<StoredRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM apis
             WHERE instr(lower(category), lower(?1)) > 0
             ORDER BY written_at DESC"
        );
        self.query_records(&sql, params![needle]).await
    }

    /// Rows whose name or description contains `needle` (case-insensitive).
    pub async fn search(&self, needle: &str, limit: u32) -> Result<Vec<StoredRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM apis
             WHERE instr(lower(name), lower(?1)) > 0 OR instr(lower(description), lower(?1)) > 0
             ORDER BY written_at DESC
             LIMIT ?2"
        );
        self.query_records(&sql, params![needle, i64::from(limit)])
            .await
    }

    /// Every row, most recent first, optionally capped.
    pub async fn all(&self, limit: Option<u32>) -> Result<Vec<StoredRecord>> {
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM apis ORDER BY written_at DESC, rowid DESC LIMIT ?1"
        );
        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, i64::from);
        self.query_records(&sql, params![limit]).await
    }

    /// Every record in discovery (first insertion) order, for reconciliation.
    pub async fn snapshot(&self) -> Result<Vec<CatalogRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM apis ORDER BY rowid ASC");
        let stored = self.query_records(&sql, params![]).await?;
        Ok(stored.into_iter().map(|s| s.record).collect())
    }

    /// Row count.
    pub async fn count(&self) -> Result<u64> {
        self.scalar_u64("SELECT COUNT(*) FROM apis").await
    }

    /// Catalog-wide statistics, ranking the `top_n` most frequent categories.
    pub async fn statistics(&self, top_n: usize) -> Result<CatalogStatistics> {
        let mut stats = CatalogStatistics {
            total: self.count().await?,
            unique_urls: self.scalar_u64("SELECT COUNT(DISTINCT url) FROM apis").await?,
            categories: self
                .scalar_u64("SELECT COUNT(DISTINCT category) FROM apis WHERE category <> ''")
                .await?,
            sources: self
                .scalar_u64("SELECT COUNT(DISTINCT source) FROM apis WHERE source <> ''")
                .await?,
            ..CatalogStatistics::default()
        };

        for (layer, count) in self
            .grouped_counts("SELECT layer, COUNT(*) FROM apis GROUP BY layer ORDER BY layer", params![])
            .await?
        {
            let layer: u8 = layer
                .parse()
                .map_err(|_| CatalogError::Storage(format!("invalid layer value: {layer}")))?;
            stats.by_layer.insert(layer, count);
        }

        stats.top_categories = self
            .grouped_counts(
                "SELECT category, COUNT(*) AS n FROM apis WHERE category <> ''
                 GROUP BY category ORDER BY n DESC, category ASC LIMIT ?1",
                params![top_n as i64],
            )
            .await?
            .into_iter()
            .map(|(category, count)| CategoryCount { category, count })
            .collect();

        stats.auth_types = self
            .grouped_counts(
                "SELECT CASE WHEN auth = '' THEN 'None' ELSE auth END AS a, COUNT(*)
                 FROM apis GROUP BY a",
                params![],
            )
            .await?
            .into_iter()
            .collect();

        stats.db_size_bytes = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(stats)
    }

    // -----------------------------------------------------------------------
    // Query helpers
    // -----------------------------------------------------------------------

    async fn query_records(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<StoredRecord>> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            results.push(row_to_stored(&row)?);
        }
        Ok(results)
    }

    async fn scalar_i64(&self, sql: &str) -> Result<i64> {
        let mut rows = self.conn.query(sql, params![]).await.map_err(storage_err)?;
        match rows.next().await.map_err(storage_err)? {
            Some(row) => row.get::<i64>(0).map_err(storage_err),
            None => Ok(0),
        }
    }

    async fn scalar_u64(&self, sql: &str) -> Result<u64> {
        Ok(self.scalar_i64(sql).await?.max(0) as u64)
    }

    /// Run a two-column `(label, count)` query. Labels are read as text.
    async fn grouped_counts(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<(String, u64)>> {
        let mut rows = self.conn.query(sql, params).await.map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(storage_err)? {
            let label = match row.get_value(0).map_err(storage_err)? {
                libsql::Value::Integer(i) => i.to_string(),
                libsql::Value::Text(s) => s,
                other => format!("{other:?}"),
            };
            let count: i64 = row.get(1).map_err(storage_err)?;
            results.push((label, count.max(0) as u64));
        }
        Ok(results)
    }
}

/// Advance the write clock: wall time in µs, bumped past the last value.
fn next_tick(last: &mut i64) -> i64 {
    let now = Utc::now().timestamp_micros();
    *last = now.max(*last + 1);
    *last
}

fn storage_err(e: libsql::Error) -> CatalogError {
    CatalogError::Storage(e.to_string())
}

fn encode_metadata(metadata: &Metadata) -> Result<String> {
    serde_json::to_string(metadata)
        .map_err(|e| CatalogError::Storage(format!("metadata encode failed: {e}")))
}

/// Convert a database row to a [`StoredRecord`].
fn row_to_stored(row: &libsql::Row) -> Result<StoredRecord> {
    let layer: i64 = row.get(8).map_err(storage_err)?;
    let metadata_json: String = row.get(9).map_err(storage_err)?;
    let metadata: Metadata = serde_json::from_str(&metadata_json)
        .map_err(|e| CatalogError::Storage(format!("invalid metadata: {e}")))?;
    let written_at: i64 = row.get(10).map_err(storage_err)?;

    Ok(StoredRecord {
        id: row.get::<String>(0).map_err(storage_err)?,
        record: CatalogRecord {
            name: row.get::<String>(1).map_err(storage_err)?,
            description: row.get::<String>(2).map_err(storage_err)?,
            url: row.get::<String>(3).map_err(storage_err)?,
            source: row.get::<String>(4).map_err(storage_err)?,
            category: row.get::<String>(5).map_err(storage_err)?,
            auth_method: row.get::<String>(6).map_err(storage_err)?,
            region: row.get::<String>(7).map_err(storage_err)?,
            layer: u8::try_from(layer)
                .map_err(|_| CatalogError::Storage(format!("invalid layer value: {layer}")))?,
            metadata,
        },
        written_at: DateTime::from_timestamp_micros(written_at)
            .ok_or_else(|| CatalogError::Storage(format!("invalid timestamp: {written_at}")))?,
    })
}

/// Apply `plan` on `conn`: metadata rewrites first, deletions last.
async fn apply_plan(
    conn: &Connection,
    plan: &Reconciliation,
    clock: &mut i64,
) -> Result<ReconcileApplied> {
    let mut applied = ReconcileApplied::default();

    for record in &plan.updated {
        let metadata = encode_metadata(&record.metadata)?;
        let written_at = next_tick(clock);
        applied.updated += conn
            .execute(
                "UPDATE apis SET metadata = ?1, written_at = MAX(?2, written_at + 1) WHERE id = ?3",
                params![metadata.as_str(), written_at, record.identity_key()],
            )
            .await
            .map_err(storage_err)?;
    }

    for id in &plan.superseded {
        applied.removed += conn
            .execute("DELETE FROM apis WHERE id = ?1", params![id.as_str()])
            .await
            .map_err(storage_err)?;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apicatalog_dedup::CrossSourceReconciler;
    use uuid::Uuid;

    /// Create a temp file store for testing.
    async fn test_store() -> CatalogStore {
        let tmp = std::env::temp_dir().join(format!("apicatalog_test_{}.db", Uuid::now_v7()));
        CatalogStore::open(&tmp).await.expect("open test db")
    }

    fn api(name: &str, url: &str) -> CatalogRecord {
        let mut r = CatalogRecord::new(name, url);
        r.source = "test".into();
        r.category = "Testing".into();
        r
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let store = test_store().await;
        assert_eq!(store.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("apicatalog_test_{}.db", Uuid::now_v7()));
        let s1 = CatalogStore::open(&tmp).await.expect("first open");
        s1.upsert(&api("A", "https://a.io"), 1).await.unwrap();
        drop(s1);
        let s2 = CatalogStore::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
        assert_eq!(s2.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_same_key_replaces() {
        let store = test_store().await;
        let mut first = api("Weather API", "https://weather.io");
        first.description = "first".into();
        let id = store.upsert(&first, 2).await.expect("upsert");

        let mut second = api("WEATHER api", "https://Weather.io");
        second.description = "second".into();
        let id2 = store.upsert(&second, 3).await.expect("upsert again");
        assert_eq!(id, id2);

        let all = store.all(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].record.description, "second");
        assert_eq!(all[0].record.layer, 3);
    }

    #[tokio::test]
    async fn written_at_is_monotonic_per_key() {
        let store = test_store().await;
        let record = api("A", "https://a.io");
        let id = store.upsert(&record, 1).await.unwrap();
        let t1 = store.get(&id).await.unwrap().unwrap().written_at;
        store.upsert(&record, 1).await.unwrap();
        let t2 = store.get(&id).await.unwrap().unwrap().written_at;
        assert!(t2 > t1);
    }

    #[tokio::test]
    async fn delete_by_identity_key() {
        let store = test_store().await;
        let id = store.upsert(&api("A", "https://a.io"), 1).await.unwrap();
        assert!(store.delete(&id).await.unwrap());
        assert!(!store.delete(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_rejects_missing_fields_and_bad_layer() {
        let store = test_store().await;
        let err = store.upsert(&api("No Url", ""), 1).await.unwrap_err();
        assert!(matches!(err, CatalogError::RecordInvalid { .. }));
        let err = store.upsert(&api("", "https://x.io"), 1).await.unwrap_err();
        assert!(matches!(err, CatalogError::RecordInvalid { .. }));
        let err = store.upsert(&api("X", "https://x.io"), 13).await.unwrap_err();
        assert!(matches!(err, CatalogError::RecordInvalid { .. }));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn upsert_truncates_fields() {
        let store = test_store().await;
        let mut record = api(&"n".repeat(700), "https://long.io");
        record.region = "r".repeat(90);
        let id = store.upsert(&record, 1).await.unwrap();
        let stored = store.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.record.name.chars().count(), 500);
        assert_eq!(stored.record.region.chars().count(), 50);
    }

    #[tokio::test]
    async fn bulk_upsert_counts_only_persisted_records() {
        let store = test_store().await;
        let mut batch: Vec<CatalogRecord> = (0..100)
            .map(|i| api(&format!("API {i}"), &format!("https://api{i}.example.com")))
            .collect();
        batch.extend((0..5).map(|i| api(&format!("Broken {i}"), "")));

        let outcome = store.bulk_upsert(&batch, 1).await;
        assert_eq!(outcome.saved, 100);
        assert_eq!(outcome.invalid, 5);
        assert_eq!(outcome.failed, 0);
        assert_eq!(store.count().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn cleanup_keeps_most_recent_row_per_url() {
        let store = test_store().await;
        let older = store.upsert(&api("Old Name", "https://dup.io"), 1).await.unwrap();
        let newer = store.upsert(&api("New Name", "https://dup.io"), 2).await.unwrap();
        store.upsert(&api("Other", "https://other.io"), 1).await.unwrap();

        let report = store.cleanup().await.unwrap();
        assert_eq!(report.duplicate_urls, 1);
        assert_eq!(report.total(), 1);

        assert!(store.get(&older).await.unwrap().is_none());
        let kept = store.get(&newer).await.unwrap().unwrap();
        assert_eq!(kept.record.name, "New Name");
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cleanup_removes_rows_with_empty_fields() {
        let store = test_store().await;
        store.upsert(&api("Good", "https://good.io"), 1).await.unwrap();
        // Rows written by older tools may violate the upsert validation.
        store
            .conn
            .execute(
                "INSERT INTO apis (id, name, url, layer, written_at) VALUES
                   ('a', 'No Url', '', 1, 1),
                   ('b', '  ', 'https://no-name.io', 1, 2)",
                params![],
            )
            .await
            .unwrap();

        let report = store.cleanup().await.unwrap();
        assert_eq!(report.empty_url, 1);
        assert_eq!(report.empty_name, 1);
        assert_eq!(report.duplicate_urls, 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn deduplicate_by_url_is_idempotent() {
        let store = test_store().await;
        for name in ["A", "B", "C"] {
            store.upsert(&api(name, "https://same.io"), 1).await.unwrap();
        }
        assert_eq!(store.deduplicate_by_url().await.unwrap(), 2);
        assert_eq!(store.deduplicate_by_url().await.unwrap(), 0);
        let all = store.all(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].record.name, "C");
    }

    #[tokio::test]
    async fn read_queries() {
        let store = test_store().await;
        let mut finance = api("Stock Quotes", "https://stocks.io");
        finance.category = "Finance".into();
        finance.description = "Realtime market data".into();
        store.upsert(&finance, 4).await.unwrap();

        let mut weather = api("Forecast", "https://forecast.io");
        weather.category = "Weather & Climate".into();
        store.upsert(&weather, 5).await.unwrap();

        assert_eq!(store.by_layer(4).await.unwrap().len(), 1);
        assert!(store.by_layer(6).await.unwrap().is_empty());

        let climate = store.by_category_contains("climate").await.unwrap();
        assert_eq!(climate.len(), 1);
        assert_eq!(climate[0].record.name, "Forecast");

        let hits = store.search("MARKET", 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].record.name, "Stock Quotes");

        // Most recent first
        let all = store.all(None).await.unwrap();
        assert_eq!(all[0].record.name, "Forecast");
        assert_eq!(store.all(Some(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn statistics_match_contents() {
        let store = test_store().await;
        for (i, (category, auth)) in [("Finance", "apiKey"), ("Finance", ""), ("Weather", "OAuth")]
            .into_iter()
            .enumerate()
        {
            let mut r = api(&format!("API {i}"), &format!("https://{i}.io"));
            r.category = category.into();
            r.auth_method = auth.into();
            store.upsert(&r, (i + 1) as u8).await.unwrap();
        }

        let stats = store.statistics(1).await.unwrap();
        assert_eq!(stats.total, store.all(None).await.unwrap().len() as u64);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.unique_urls, 3);
        assert_eq!(stats.categories, 2);
        assert_eq!(stats.sources, 1);
        assert_eq!(stats.by_layer.get(&2), Some(&1));
        assert_eq!(
            stats.top_categories,
            vec![CategoryCount {
                category: "Finance".into(),
                count: 2
            }]
        );
        assert_eq!(stats.auth_types.get("None"), Some(&1));
        assert!(stats.db_size_bytes > 0);
    }

    #[tokio::test]
    async fn apply_reconciliation_collapses_group() {
        let store = test_store().await;
        let mut guru = api("Example API", "https://api.example.com/v1");
        guru.source = "apis.guru".into();
        guru.description = "x".repeat(120);
        let mut public = api("example api", "https://api.example.com/v1/");
        public.source = "publicapis.org".into();
        public.metadata.insert("cors".into(), "yes".into());

        store.upsert(&guru, 1).await.unwrap();
        store.upsert(&public, 2).await.unwrap();

        let plan = CrossSourceReconciler.reconcile(store.snapshot().await.unwrap());
        let applied = store.apply_reconciliation(&plan).await.unwrap();
        assert_eq!(applied, ReconcileApplied { removed: 1, updated: 1 });

        let all = store.all(None).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].record.source, "apis.guru");
        assert!(all[0].record.metadata.contains_key("cors"));

        let again = CrossSourceReconciler.reconcile(store.snapshot().await.unwrap());
        assert!(again.is_noop());
    }

    #[tokio::test]
    async fn failed_reconciliation_leaves_catalog_untouched() {
        let store = test_store().await;
        let mut guru = api("Example API", "https://api.example.com/v1");
        guru.source = "apis.guru".into();
        guru.metadata.insert("version".into(), "3".into());
        let mut public = api("example api", "https://api.example.com/v1/");
        public.source = "publicapis.org".into();
        public.metadata.insert("cors".into(), "yes".into());
        let guru_id = store.upsert(&guru, 1).await.unwrap();
        let public_id = store.upsert(&public, 2).await.unwrap();

        // Make the delete step fail after the metadata rewrite has run.
        store
            .conn
            .execute(
                "CREATE TRIGGER block_delete BEFORE DELETE ON apis
                 BEGIN SELECT RAISE(ABORT, 'delete blocked'); END",
                params![],
            )
            .await
            .unwrap();

        let plan = CrossSourceReconciler.reconcile(store.snapshot().await.unwrap());
        assert_eq!(plan.superseded, vec![public_id.clone()]);
        assert!(store.apply_reconciliation(&plan).await.is_err());

        let superseded = store.get(&public_id).await.unwrap().unwrap();
        assert!(superseded.record.metadata.contains_key("cors"));
        let canonical = store.get(&guru_id).await.unwrap().unwrap();
        assert!(!canonical.record.metadata.contains_key("cors"));
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn cycle_lock_blocks_cleanup_from_other_handles() {
        let tmp = std::env::temp_dir().join(format!("apicatalog_test_{}.db", Uuid::now_v7()));
        let collector = CatalogStore::open(&tmp).await.unwrap();
        collector.upsert(&api("Old", "https://dup.io"), 1).await.unwrap();
        collector.upsert(&api("New", "https://dup.io"), 1).await.unwrap();

        let cycle = collector.begin_cycle().await.unwrap();
        let maintenance = CatalogStore::open(&tmp).await.unwrap();
        let blocked =
            tokio::time::timeout(std::time::Duration::from_millis(300), maintenance.cleanup()).await;
        assert!(blocked.is_err(), "cleanup ran during an active cycle");
        assert_eq!(collector.count().await.unwrap(), 2);

        drop(cycle);
        let report = maintenance.cleanup().await.unwrap();
        assert_eq!(report.duplicate_urls, 1);
        assert_eq!(maintenance.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("apicatalog_test_{}.db", Uuid::now_v7()));
        let rw = CatalogStore::open(&tmp).await.unwrap();
        rw.upsert(&api("A", "https://a.io"), 1).await.unwrap();
        drop(rw);

        let ro = CatalogStore::open_readonly(&tmp).await.unwrap();
        let result = ro.upsert(&api("B", "https://b.io"), 1).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
        assert_eq!(ro.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn open_readonly_requires_existing_db() {
        let tmp = std::env::temp_dir().join(format!("apicatalog_missing_{}.db", Uuid::now_v7()));
        assert!(CatalogStore::open_readonly(&tmp).await.is_err());
    }
}
