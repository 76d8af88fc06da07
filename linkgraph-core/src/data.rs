use crate::error::StoreError;
use crate::model::DomainId;
use crate::store::{DomainIdStore, StoreResult};
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite-backed domain identifier store.
///
/// Assignment is `INSERT OR IGNORE` followed by a `SELECT` inside an
/// immediate transaction, so concurrent workers (or processes sharing the
/// file) racing on a new domain all read back the single winning row.
pub struct Database {
    conn: Mutex<Connection>,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(30))?;

        // Many workers and processes may share one store file
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = -64000;  -- 64MB cache
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        Self::with_connection(conn)
    }

    pub fn in_memory() -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StoreResult<Self> {
        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.lock()?.execute_batch(
            "
            -- AUTOINCREMENT: ids are never reused, even after deletes
            CREATE TABLE IF NOT EXISTS domains (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                domain TEXT NOT NULL UNIQUE,
                assigned_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Read an existing assignment without creating one.
    pub fn lookup(&self, domain: &str) -> StoreResult<Option<DomainId>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached("SELECT id FROM domains WHERE domain = ?1")?;

        let result = stmt
            .query_row(params![domain], |row| row.get(0))
            .optional()?;
        Ok(result)
    }

    pub fn domain_count(&self) -> StoreResult<i64> {
        let conn = self.lock()?;
        let count = conn.query_row("SELECT COUNT(*) FROM domains", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl DomainIdStore for Database {
    fn get_domain_id(&self, domain: &str) -> StoreResult<DomainId> {
        let ids = self.get_domain_ids(&[domain])?;
        ids.first().copied().ok_or(StoreError::BatchMismatch {
            requested: 1,
            returned: 0,
        })
    }

    fn get_domain_ids(&self, domains: &[&str]) -> StoreResult<Vec<DomainId>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let timestamp = current_timestamp();

        let ids = {
            let mut insert = tx.prepare_cached(
                "INSERT OR IGNORE INTO domains (domain, assigned_at) VALUES (?1, ?2)",
            )?;
            let mut select = tx.prepare_cached("SELECT id FROM domains WHERE domain = ?1")?;

            let mut ids = Vec::with_capacity(domains.len());
            for domain in domains {
                insert.execute(params![*domain, timestamp])?;
                let id: DomainId = select.query_row(params![*domain], |row| row.get(0))?;
                ids.push(id);
            }
            ids
        };

        tx.commit()?;
        Ok(ids)
    }
}
