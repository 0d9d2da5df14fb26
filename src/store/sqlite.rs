//! SQLite-backed queue, catalog and translation cache.
//! One database file holds all three tables; the connection is shared
//! behind a mutex and every multi-row write runs in a single transaction.

use std::collections::BTreeMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::{
    now_unix, CacheEntry, CacheStore, CacheTotals, CatalogStore, QueueItem, QueueStore,
    StoreError, WriteBackOperation,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS translation_pending (
        item_id TEXT PRIMARY KEY,
        fields TEXT NOT NULL,
        created_at INTEGER NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_pending_created
        ON translation_pending(created_at);

    CREATE TABLE IF NOT EXISTS catalog_records (
        item_id TEXT PRIMARY KEY,
        document TEXT NOT NULL DEFAULT '{}',
        updated_at INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS translation_cache (
        text_hash TEXT PRIMARY KEY,
        original_text TEXT NOT NULL,
        translated_text TEXT NOT NULL,
        usage_count INTEGER NOT NULL DEFAULT 1,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    );
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `db_path` and ensure the schema.
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::with_connection(conn)?;
        info!(path = %db_path.display(), "SQLite store opened");
        Ok(store)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Add or replace a queue entry. A re-enqueued item keeps its original
    /// position in the FIFO order.
    pub fn enqueue(&self, item: &QueueItem) -> Result<(), StoreError> {
        let fields = serde_json::to_string(&item.fields)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO translation_pending (item_id, fields, created_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(item_id) DO UPDATE SET fields = excluded.fields",
            params![item.id, fields, item.enqueued_at],
        )?;
        Ok(())
    }

    /// Insert or replace a primary record.
    pub fn put_record(
        &self,
        item_id: &str,
        document: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let document = serde_json::to_string(document)?;
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO catalog_records (item_id, document, updated_at)
             VALUES (?1, ?2, ?3)",
            params![item_id, document, now_unix()],
        )?;
        Ok(())
    }

    pub fn record(&self, item_id: &str) -> Result<Option<serde_json::Value>, StoreError> {
        let conn = self.conn.lock();
        let document: Option<String> = conn
            .query_row(
                "SELECT document FROM catalog_records WHERE item_id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .optional()?;
        match document {
            Some(doc) => Ok(Some(serde_json::from_str(&doc)?)),
            None => Ok(None),
        }
    }
}

/// JSON path addressing a top-level key. The label is quoted so dots and
/// spaces are literal; SQLite has no escape for `"` inside it, which config
/// validation rejects in field names.
fn json_path(field: &str) -> String {
    format!("$.\"{field}\"")
}

fn cache_entry_from_row(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
    Ok(CacheEntry {
        text_hash: row.get(0)?,
        source_text: row.get(1)?,
        translated_text: row.get(2)?,
        usage_count: row.get::<_, i64>(3)? as u64,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl QueueStore for SqliteStore {
    fn count_pending(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM translation_pending", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn fetch_oldest(&self, limit: usize) -> Result<Vec<QueueItem>, StoreError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT item_id, fields, created_at FROM translation_pending
             ORDER BY created_at ASC, rowid ASC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, fields, enqueued_at)| {
                let fields: BTreeMap<String, String> = serde_json::from_str(&fields)?;
                Ok(QueueItem {
                    id,
                    fields,
                    enqueued_at,
                })
            })
            .collect()
    }

    fn delete_by_ids(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut deleted = 0;
        {
            let mut stmt = tx.prepare_cached("DELETE FROM translation_pending WHERE item_id = ?1")?;
            for id in ids {
                deleted += stmt.execute(params![id])?;
            }
        }
        tx.commit()?;
        debug!(deleted, "queue entries deleted");
        Ok(deleted)
    }
}

impl CatalogStore for SqliteStore {
    fn bulk_update(&self, ops: &[WriteBackOperation]) -> Result<usize, StoreError> {
        if ops.is_empty() {
            return Ok(0);
        }
        let now = now_unix();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut modified = 0;
        {
            let mut stmt = tx.prepare_cached(
                "UPDATE catalog_records
                 SET document = json_set(document, ?2, ?3), updated_at = ?4
                 WHERE item_id = ?1",
            )?;
            for op in ops {
                let mut touched = false;
                for (field, value) in &op.updates {
                    touched |= stmt.execute(params![op.item_id, json_path(field), value, now])? > 0;
                }
                if touched {
                    modified += 1;
                }
            }
        }
        tx.commit()?;
        Ok(modified)
    }

    fn count_records(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock();
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM catalog_records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_translated(&self, target_fields: &[&str]) -> Result<u64, StoreError> {
        if target_fields.is_empty() {
            return Ok(0);
        }
        let predicate = (1..=target_fields.len())
            .map(|i| format!("json_extract(document, ?{i}) IS NOT NULL"))
            .collect::<Vec<_>>()
            .join(" OR ");
        let paths: Vec<String> = target_fields.iter().map(|f| json_path(f)).collect();

        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM catalog_records WHERE {predicate}"),
            params_from_iter(paths.iter()),
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}

impl CacheStore for SqliteStore {
    fn find_by_hash(&self, text_hash: &str) -> Result<Option<CacheEntry>, StoreError> {
        let conn = self.conn.lock();
        let entry = conn
            .query_row(
                "SELECT text_hash, original_text, translated_text, usage_count, created_at, updated_at
                 FROM translation_cache WHERE text_hash = ?1",
                params![text_hash],
                cache_entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn upsert_increment(
        &self,
        text_hash: &str,
        source_text: &str,
        translated_text: &str,
        uses: u64,
    ) -> Result<CacheEntry, StoreError> {
        // Single statement: a concurrent first insert loses to the unique
        // key and becomes an increment of the winning row.
        let conn = self.conn.lock();
        let entry = conn.query_row(
            "INSERT INTO translation_cache
                 (text_hash, original_text, translated_text, usage_count, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(text_hash) DO UPDATE SET
                 usage_count = usage_count + excluded.usage_count,
                 updated_at = excluded.updated_at
             RETURNING text_hash, original_text, translated_text, usage_count, created_at, updated_at",
            params![text_hash, source_text, translated_text, uses as i64, now_unix()],
            cache_entry_from_row,
        )?;
        Ok(entry)
    }

    fn cache_totals(&self) -> Result<CacheTotals, StoreError> {
        let conn = self.conn.lock();
        let (entries, total_usage): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(usage_count), 0) FROM translation_cache",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(CacheTotals {
            entries: entries as u64,
            total_usage: total_usage as u64,
        })
    }
}
