//! SQLite storage implementation
//!
//! This module provides the SQLite-backed [`StorageProvider`]. A single
//! connection sits behind a mutex, so concurrent `record` calls from workers
//! are serialized before they reach the database.

use crate::config::WorkerConfig;
use crate::engine::VisitData;
use crate::storage::schema::{initialize_schema, INSTRUMENT_TABLES};
use crate::storage::traits::{StorageError, StorageProvider, StorageResult, VisitRecord};
use crate::storage::{CrawlRecord, CrawlStatus, SiteVisitRow};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

struct Inner {
    /// None once the storage has been closed
    conn: Option<Connection>,
    crawl_id: Option<i64>,
}

/// SQLite storage backend
pub struct SqliteStorage {
    inner: Mutex<Inner>,
}

impl SqliteStorage {
    /// Opens (creating if needed) the database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Database opened and schema initialized
    /// * `Err(StorageError)` - Failed to open the database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Creates an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            inner: Mutex::new(Inner {
                conn: Some(conn),
                crawl_id: None,
            }),
        }
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Inner>> {
        self.inner.lock().map_err(|_| StorageError::Poisoned)
    }

    /// Runs `f` against the open connection
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> StorageResult<T>) -> StorageResult<T> {
        let inner = self.lock()?;
        let conn = inner.conn.as_ref().ok_or(StorageError::Closed)?;
        f(conn)
    }

    /// Starts a crawl run and records the configuration of its workers
    ///
    /// Subsequent records are attached to this crawl.
    pub fn begin_crawl(&self, config_hash: &str, workers: &[WorkerConfig]) -> StorageResult<i64> {
        let mut inner = self.lock()?;
        let conn = inner.conn.as_mut().ok_or(StorageError::Closed)?;

        let tx = conn.transaction()?;
        let crawl_id = insert_crawl(&tx, config_hash)?;
        for worker in workers {
            tx.execute(
                "INSERT INTO workers (crawl_id, worker_id, display_mode, http_instrument,
                 cookie_instrument, navigation_instrument, js_instrument, dns_instrument, user_agent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    crawl_id,
                    worker.worker_id as i64,
                    worker.display_mode.as_str(),
                    worker.instruments.http,
                    worker.instruments.cookie,
                    worker.instruments.navigation,
                    worker.instruments.js,
                    worker.instruments.dns,
                    worker.user_agent,
                ],
            )?;
        }
        tx.commit()?;

        inner.crawl_id = Some(crawl_id);
        tracing::debug!(crawl_id, workers = workers.len(), "crawl started");
        Ok(crawl_id)
    }

    /// Marks the current crawl interrupted
    ///
    /// `close` only completes a crawl that is still running, so the status
    /// survives the final flush.
    pub fn mark_interrupted(&self) -> StorageResult<()> {
        let inner = self.lock()?;
        let conn = inner.conn.as_ref().ok_or(StorageError::Closed)?;
        let Some(crawl_id) = inner.crawl_id else {
            return Ok(());
        };

        conn.execute(
            "UPDATE crawls SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![
                CrawlStatus::Interrupted.to_db_string(),
                Utc::now().to_rfc3339(),
                crawl_id
            ],
        )?;
        tracing::debug!(crawl_id, "crawl marked interrupted");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.lock().map(|inner| inner.conn.is_none()).unwrap_or(true)
    }

    /// Gets a crawl by id
    pub fn get_crawl(&self, crawl_id: i64) -> StorageResult<CrawlRecord> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, started_at, finished_at, config_hash, status FROM crawls WHERE id = ?1",
                params![crawl_id],
                crawl_from_row,
            )
            .optional()?
            .ok_or(StorageError::CrawlNotFound(crawl_id))
        })
    }

    /// Gets the most recent crawl
    pub fn latest_crawl(&self) -> StorageResult<Option<CrawlRecord>> {
        self.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, started_at, finished_at, config_hash, status FROM crawls
                     ORDER BY id DESC LIMIT 1",
                    [],
                    crawl_from_row,
                )
                .optional()?)
        })
    }

    pub fn count_crawls(&self) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM crawls", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }

    /// Counts visits of one crawl, optionally filtered by outcome
    pub fn count_visits(&self, crawl_id: i64, success: Option<bool>) -> StorageResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = match success {
                Some(success) => conn.query_row(
                    "SELECT COUNT(*) FROM site_visits WHERE crawl_id = ?1 AND success = ?2",
                    params![crawl_id, success],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM site_visits WHERE crawl_id = ?1",
                    params![crawl_id],
                    |row| row.get(0),
                )?,
            };
            Ok(count as u64)
        })
    }

    /// Row counts of every instrumentation table for one crawl
    pub fn instrument_counts(&self, crawl_id: i64) -> StorageResult<Vec<(&'static str, u64)>> {
        self.with_conn(|conn| {
            INSTRUMENT_TABLES
                .iter()
                .map(|table| -> StorageResult<(&'static str, u64)> {
                    // Table names come from a fixed list, never from input
                    let count: i64 = conn.query_row(
                        &format!(
                            "SELECT COUNT(*) FROM {} t JOIN site_visits v ON t.visit_id = v.id
                             WHERE v.crawl_id = ?1",
                            table
                        ),
                        params![crawl_id],
                        |row| row.get(0),
                    )?;
                    Ok((*table, count as u64))
                })
                .collect()
        })
    }

    /// Visits of one crawl, ordered by site rank
    pub fn visits(&self, crawl_id: i64) -> StorageResult<Vec<SiteVisitRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, crawl_id, site_rank, site_url, worker_id, success, error,
                 final_url, status_code, title
                 FROM site_visits WHERE crawl_id = ?1 ORDER BY site_rank, id",
            )?;

            let rows = stmt
                .query_map(params![crawl_id], |row| {
                    Ok(SiteVisitRow {
                        id: row.get(0)?,
                        crawl_id: row.get(1)?,
                        site_rank: row.get::<_, i64>(2)? as usize,
                        site_url: row.get(3)?,
                        worker_id: row.get::<_, Option<i64>>(4)?.map(|id| id as usize),
                        success: row.get(5)?,
                        error: row.get(6)?,
                        final_url: row.get(7)?,
                        status_code: row.get(8)?,
                        title: row.get(9)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

impl StorageProvider for SqliteStorage {
    fn record(&self, record: &VisitRecord) -> StorageResult<()> {
        let mut inner = self.lock()?;
        let Inner { conn, crawl_id } = &mut *inner;
        let conn = conn.as_mut().ok_or(StorageError::Closed)?;

        let crawl_id = match *crawl_id {
            Some(id) => id,
            None => {
                let id = insert_crawl(conn, "")?;
                *crawl_id = Some(id);
                id
            }
        };

        let last = record.visits.last();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO site_visits (crawl_id, site_rank, site_url, domain, worker_id, success,
             error, final_url, status_code, title, started_at, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                crawl_id,
                record.site_rank as i64,
                record.site_url,
                record.domain,
                record.worker_id.map(|id| id as i64),
                record.success,
                record.error,
                last.and_then(|v| v.final_url.as_deref()),
                last.and_then(|v| v.status_code),
                last.and_then(|v| v.title.as_deref()),
                record.started_at.to_rfc3339(),
                record.finished_at.to_rfc3339(),
            ],
        )?;
        let visit_id = tx.last_insert_rowid();

        for data in &record.visits {
            insert_instrumentation(&tx, visit_id, data)?;
        }
        tx.commit()?;

        Ok(())
    }

    fn close(&self) -> StorageResult<()> {
        let mut inner = self.lock()?;
        let Some(conn) = inner.conn.take() else {
            return Ok(());
        };

        if let Some(crawl_id) = inner.crawl_id {
            conn.execute(
                "UPDATE crawls SET status = ?1, finished_at = ?2 WHERE id = ?3 AND status = ?4",
                params![
                    CrawlStatus::Completed.to_db_string(),
                    Utc::now().to_rfc3339(),
                    crawl_id,
                    CrawlStatus::Running.to_db_string()
                ],
            )?;
        }

        conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        tracing::debug!("storage closed");
        Ok(())
    }
}

fn insert_crawl(conn: &Connection, config_hash: &str) -> StorageResult<i64> {
    conn.execute(
        "INSERT INTO crawls (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
        params![
            Utc::now().to_rfc3339(),
            config_hash,
            CrawlStatus::Running.to_db_string()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn crawl_from_row(row: &Row<'_>) -> rusqlite::Result<CrawlRecord> {
    Ok(CrawlRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: CrawlStatus::from_db_string(&row.get::<_, String>(4)?)
            .unwrap_or(CrawlStatus::Interrupted),
    })
}

fn insert_instrumentation(conn: &Connection, visit_id: i64, data: &VisitData) -> StorageResult<()> {
    for exchange in &data.http {
        conn.execute(
            "INSERT INTO http_exchanges (visit_id, method, url, status_code, content_type,
             header_count, redirect_to, observed_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                visit_id,
                exchange.method,
                exchange.url,
                exchange.status_code,
                exchange.content_type,
                exchange.header_count as i64,
                exchange.redirect_to,
                exchange.observed_at.to_rfc3339(),
            ],
        )?;
    }

    for cookie in &data.cookies {
        conn.execute(
            "INSERT INTO cookies (visit_id, origin_url, name, value, domain, path, expires,
             max_age, secure, http_only, same_site)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                visit_id,
                cookie.origin_url,
                cookie.name,
                cookie.value,
                cookie.domain,
                cookie.path,
                cookie.expires,
                cookie.max_age,
                cookie.secure,
                cookie.http_only,
                cookie.same_site,
            ],
        )?;
    }

    for (hop, nav) in data.navigations.iter().enumerate() {
        conn.execute(
            "INSERT INTO navigations (visit_id, hop, from_url, to_url, status_code)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![visit_id, hop as i64, nav.from_url, nav.to_url, nav.status_code],
        )?;
    }

    for dns in &data.dns {
        conn.execute(
            "INSERT INTO dns_responses (visit_id, hostname, addresses, error) VALUES (?1, ?2, ?3, ?4)",
            params![visit_id, dns.hostname, dns.addresses.join(","), dns.error],
        )?;
    }

    for script in &data.scripts {
        conn.execute(
            "INSERT INTO scripts (visit_id, page_url, src, inline_length, digest)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                visit_id,
                script.page_url,
                script.src,
                script.inline_length.map(|n| n as i64),
                script.digest,
            ],
        )?;
    }

    Ok(())
}
