use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

use crate::engine::{JobLogEntry, JobRecord, JobStatus, LogLevel, MetricRow};
use crate::error::BenchError;

/// Aggregate fields written once, at finalize.
#[derive(Debug, Clone, Default)]
pub struct JobAggregates {
    pub avg_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub avg_memory_usage: i64,
    pub peak_memory_usage: i64,
    pub avg_db_queries: f64,
    pub total_db_queries: i64,
    pub cache_hits: i64,
    pub cache_misses: i64,
    pub cache_hit_rate: f64,
    pub avg_cpu_usage: f64,
}

pub struct BenchDb {
    conn: Mutex<Connection>,
}

impl BenchDb {
    pub fn new(data_dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let conn = Connection::open(data_dir.join("bench.db"))?;
        Self::from_connection(conn)
    }

    /// Private in-memory database, used by tests.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        db.fail_stale_jobs()?;
        db.seed_options()?;
        Ok(db)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap()
    }

    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                test_type TEXT NOT NULL DEFAULT 'standard',
                status TEXT NOT NULL DEFAULT 'pending',
                current_phase TEXT NOT NULL DEFAULT '',
                current_iteration INTEGER NOT NULL DEFAULT 0,
                total_iterations INTEGER NOT NULL DEFAULT 0,
                stop_requested INTEGER NOT NULL DEFAULT 0,
                config TEXT NOT NULL,
                avg_response_time REAL,
                min_response_time REAL,
                max_response_time REAL,
                avg_memory_usage INTEGER,
                peak_memory_usage INTEGER,
                avg_db_queries REAL,
                total_db_queries INTEGER,
                cache_hits INTEGER,
                cache_misses INTEGER,
                cache_hit_rate REAL,
                avg_cpu_usage REAL,
                raw_data TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS job_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                iteration INTEGER NOT NULL,
                response_time REAL NOT NULL,
                memory_usage INTEGER NOT NULL,
                db_queries INTEGER NOT NULL,
                cpu_usage REAL NOT NULL,
                ram_usage INTEGER NOT NULL,
                disk_read INTEGER NOT NULL,
                disk_write INTEGER NOT NULL,
                cache_hits INTEGER NOT NULL DEFAULT 0,
                cache_misses INTEGER NOT NULL DEFAULT 0,
                timestamp TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS job_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_id TEXT NOT NULL REFERENCES jobs(id) ON DELETE CASCADE,
                level TEXT NOT NULL,
                message TEXT NOT NULL,
                data TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS options (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS post_meta (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
                meta_key TEXT NOT NULL,
                meta_value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_metrics_job ON job_metrics(job_id, iteration);
            CREATE INDEX IF NOT EXISTS idx_logs_job ON job_logs(job_id, id);
            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_post_meta_post ON post_meta(post_id);
        ",
        )?;
        Ok(())
    }

    /// A job left in `running` can never be resumed by a fresh process with
    /// an empty object cache; mark it failed on startup. Pending jobs have
    /// done no work yet and stay pollable.
    fn fail_stale_jobs(&self) -> anyhow::Result<()> {
        let conn = self.conn();
        conn.execute(
            "UPDATE jobs SET status = 'failed', completed_at = ?1 WHERE status = 'running'",
            params![Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ========================================================================
    // Jobs
    // ========================================================================

    pub fn insert_job(&self, job: &JobRecord) -> Result<(), BenchError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO jobs (id, name, test_type, status, current_phase, current_iteration,
                               total_iterations, stop_requested, config, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                job.id,
                job.name,
                job.test_type,
                job.status.as_str(),
                job.current_phase,
                job.current_iteration,
                job.total_iterations,
                job.stop_requested as i64,
                job.config_json,
                job.started_at,
            ],
        )?;
        Ok(())
    }

    pub fn get_job(&self, id: &str) -> Result<Option<JobRecord>, BenchError> {
        let conn = self.conn();
        let result = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![id],
                row_to_job,
            )
            .optional()?;
        Ok(result)
    }

    pub fn list_jobs(&self) -> Result<Vec<JobRecord>, BenchError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs ORDER BY started_at DESC LIMIT 50"
        ))?;
        let rows = stmt.query_map([], row_to_job)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Persist mid-run progress after a chunk. Also flips a pending job to
    /// running on its first chunk.
    pub fn update_progress(
        &self,
        id: &str,
        current_phase: &str,
        current_iteration: i64,
        config_json: &str,
    ) -> Result<(), BenchError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE jobs SET status = 'running', current_phase = ?2, current_iteration = ?3,
                    config = ?4 WHERE id = ?1",
            params![id, current_phase, current_iteration, config_json],
        )?;
        Ok(())
    }

    /// Write terminal status, aggregates and the report blob in one update.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize_job(
        &self,
        id: &str,
        status: JobStatus,
        current_iteration: i64,
        config_json: &str,
        agg: &JobAggregates,
        raw_data: &str,
    ) -> Result<(), BenchError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE jobs SET
                status = ?2, current_iteration = ?3, config = ?4,
                avg_response_time = ?5, min_response_time = ?6, max_response_time = ?7,
                avg_memory_usage = ?8, peak_memory_usage = ?9,
                avg_db_queries = ?10, total_db_queries = ?11,
                cache_hits = ?12, cache_misses = ?13, cache_hit_rate = ?14,
                avg_cpu_usage = ?15, raw_data = ?16, completed_at = ?17
             WHERE id = ?1",
            params![
                id,
                status.as_str(),
                current_iteration,
                config_json,
                agg.avg_response_time,
                agg.min_response_time,
                agg.max_response_time,
                agg.avg_memory_usage,
                agg.peak_memory_usage,
                agg.avg_db_queries,
                agg.total_db_queries,
                agg.cache_hits,
                agg.cache_misses,
                agg.cache_hit_rate,
                agg.avg_cpu_usage,
                raw_data,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Returns false when the job does not exist.
    pub fn request_stop(&self, id: &str) -> Result<bool, BenchError> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE jobs SET stop_requested = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(changed > 0)
    }

    pub fn is_stop_requested(&self, id: &str) -> Result<bool, BenchError> {
        let conn = self.conn();
        let flag: Option<i64> = conn
            .query_row(
                "SELECT stop_requested FROM jobs WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.unwrap_or(0) != 0)
    }

    /// Deletes the job; metrics and logs cascade.
    pub fn delete_job(&self, id: &str) -> Result<bool, BenchError> {
        let conn = self.conn();
        let changed = conn.execute("DELETE FROM jobs WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    // ========================================================================
    // Metrics
    // ========================================================================

    pub fn append_metric(&self, job_id: &str, m: &MetricRow) -> Result<(), BenchError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO job_metrics (job_id, iteration, response_time, memory_usage, db_queries,
                cpu_usage, ram_usage, disk_read, disk_write, cache_hits, cache_misses, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                job_id,
                m.iteration,
                m.response_time,
                m.memory_usage,
                m.db_queries,
                m.cpu_usage,
                m.ram_usage,
                m.disk_read,
                m.disk_write,
                m.cache_hits,
                m.cache_misses,
                m.timestamp,
            ],
        )?;
        Ok(())
    }

    pub fn get_metrics(&self, job_id: &str) -> Result<Vec<MetricRow>, BenchError> {
        self.get_metrics_since(job_id, 0)
    }

    pub fn get_metrics_since(
        &self,
        job_id: &str,
        last_iteration: i64,
    ) -> Result<Vec<MetricRow>, BenchError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT iteration, response_time, memory_usage, db_queries, cpu_usage, ram_usage,
                    disk_read, disk_write, cache_hits, cache_misses, timestamp
             FROM job_metrics WHERE job_id = ?1 AND iteration > ?2 ORDER BY iteration",
        )?;
        let rows = stmt.query_map(params![job_id, last_iteration], |row| {
            Ok(MetricRow {
                iteration: row.get(0)?,
                response_time: row.get(1)?,
                memory_usage: row.get(2)?,
                db_queries: row.get(3)?,
                cpu_usage: row.get(4)?,
                ram_usage: row.get(5)?,
                disk_read: row.get(6)?,
                disk_write: row.get(7)?,
                cache_hits: row.get(8)?,
                cache_misses: row.get(9)?,
                timestamp: row.get(10)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ========================================================================
    // Logs
    // ========================================================================

    pub fn append_log(
        &self,
        job_id: &str,
        level: LogLevel,
        message: &str,
        data: Option<&serde_json::Value>,
    ) -> Result<i64, BenchError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO job_logs (job_id, level, message, data, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                job_id,
                level.as_str(),
                message,
                data.map(|d| d.to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_logs_since(
        &self,
        job_id: &str,
        last_log_id: i64,
    ) -> Result<Vec<JobLogEntry>, BenchError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, level, message, data, created_at
             FROM job_logs WHERE job_id = ?1 AND id > ?2 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![job_id, last_log_id], |row| {
            let level_str: String = row.get(1)?;
            let data_str: Option<String> = row.get(3)?;
            Ok(JobLogEntry {
                id: row.get(0)?,
                level: LogLevel::parse(&level_str).unwrap_or(LogLevel::Info),
                message: row.get(2)?,
                data: data_str.and_then(|d| serde_json::from_str(&d).ok()),
                created_at: row.get(4)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn count_logs(&self, job_id: &str, level: LogLevel) -> Result<usize, BenchError> {
        let conn = self.conn();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM job_logs WHERE job_id = ?1 AND level = ?2",
            params![job_id, level.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ========================================================================
    // Synthetic workload tables
    // ========================================================================

    /// Seed the option set the page-load and options-reload workloads sweep.
    fn seed_options(&self) -> anyhow::Result<()> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("INSERT OR IGNORE INTO options (name, value) VALUES (?1, ?2)")?;
        for name in crate::engine::workload::OPTION_NAMES {
            stmt.execute(params![name, format!("value:{name}")])?;
        }
        Ok(())
    }

    pub fn get_option(&self, name: &str) -> Result<Option<String>, BenchError> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM options WHERE name = ?1",
                params![name],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn list_options(&self, limit: i64) -> Result<Vec<(String, String)>, BenchError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT name, value FROM options LIMIT ?1")?;
        let rows = stmt.query_map(params![limit], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn insert_post(&self, title: &str, content: &str) -> Result<i64, BenchError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO posts (title, content, created_at) VALUES (?1, ?2, ?3)",
            params![title, content, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_post_meta(
        &self,
        post_id: i64,
        meta_key: &str,
        meta_value: &str,
    ) -> Result<(), BenchError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO post_meta (post_id, meta_key, meta_value) VALUES (?1, ?2, ?3)",
            params![post_id, meta_key, meta_value],
        )?;
        Ok(())
    }

    pub fn get_post(&self, id: i64) -> Result<Option<(i64, String, String)>, BenchError> {
        let conn = self.conn();
        let post = conn
            .query_row(
                "SELECT id, title, content FROM posts WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        Ok(post)
    }

    pub fn get_post_meta(&self, post_id: i64) -> Result<Vec<(String, String)>, BenchError> {
        let conn = self.conn();
        let mut stmt =
            conn.prepare("SELECT meta_key, meta_value FROM post_meta WHERE post_id = ?1")?;
        let rows = stmt.query_map(params![post_id], |row| Ok((row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn list_post_ids(&self, limit: i64) -> Result<Vec<i64>, BenchError> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT id FROM posts ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn delete_post(&self, id: i64) -> Result<bool, BenchError> {
        let conn = self.conn();
        let changed = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }
}

const JOB_COLUMNS: &str = "id, name, test_type, status, current_phase, current_iteration,
    total_iterations, stop_requested, config, avg_response_time, min_response_time,
    max_response_time, avg_memory_usage, peak_memory_usage, avg_db_queries, total_db_queries,
    cache_hits, cache_misses, cache_hit_rate, avg_cpu_usage, raw_data, started_at, completed_at";

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<JobRecord> {
    let status_str: String = row.get(3)?;
    Ok(JobRecord {
        id: row.get(0)?,
        name: row.get(1)?,
        test_type: row.get(2)?,
        status: JobStatus::parse(&status_str).unwrap_or(JobStatus::Failed),
        current_phase: row.get(4)?,
        current_iteration: row.get(5)?,
        total_iterations: row.get(6)?,
        stop_requested: row.get::<_, i64>(7)? != 0,
        config_json: row.get(8)?,
        avg_response_time: row.get(9)?,
        min_response_time: row.get(10)?,
        max_response_time: row.get(11)?,
        avg_memory_usage: row.get(12)?,
        peak_memory_usage: row.get(13)?,
        avg_db_queries: row.get(14)?,
        total_db_queries: row.get(15)?,
        cache_hits: row.get(16)?,
        cache_misses: row.get(17)?,
        cache_hit_rate: row.get(18)?,
        avg_cpu_usage: row.get(19)?,
        raw_data: row.get(20)?,
        started_at: row.get(21)?,
        completed_at: row.get(22)?,
    })
}
