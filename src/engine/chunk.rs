//! Chunked execution of benchmark jobs.
//!
//! A job never owns a thread. Each client poll calls [`EngineContext::process_chunk`],
//! which runs work units until either the item budget or the wall-clock
//! budget for one chunk is spent, persists the updated job config, and
//! returns. Progress survives process restarts because everything the next
//! chunk needs lives in the persisted config.

use chrono::Utc;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use super::workload::{self, WorkloadContext};
use super::{
    report, ChunkOutcome, JobConfig, JobRecord, JobStatus, LogLevel, MetricRow, StartRequest,
};
use crate::cache::ObjectCache;
use crate::config::{CHUNK_MAX_ITEMS, CHUNK_MAX_MILLIS, SLOW_RESPONSE_MS, WORK_UNIT_RETRY_CAP};
use crate::db::BenchDb;
use crate::error::BenchError;
use crate::resource::ResourceSensor;

/// Everything a chunk needs, passed explicitly. The chunk budgets live here
/// rather than being read from constants at the call sites, so a deployment
/// (or a test) can shrink them.
pub struct EngineContext {
    pub db: Arc<BenchDb>,
    pub cache: Arc<ObjectCache>,
    pub sensor: Arc<ResourceSensor>,
    pub scratch_dir: PathBuf,
    /// Cache state to restore once a job finishes.
    pub default_cache_enabled: bool,
    pub chunk_max_items: u64,
    pub chunk_max_millis: u64,
}

impl EngineContext {
    pub fn new(
        db: Arc<BenchDb>,
        cache: Arc<ObjectCache>,
        sensor: Arc<ResourceSensor>,
        scratch_dir: PathBuf,
        default_cache_enabled: bool,
    ) -> Self {
        Self {
            db,
            cache,
            sensor,
            scratch_dir,
            default_cache_enabled,
            chunk_max_items: CHUNK_MAX_ITEMS,
            chunk_max_millis: CHUNK_MAX_MILLIS,
        }
    }

    /// Create a job in `pending` state. No work runs until the first poll.
    pub fn start_job(&self, req: &StartRequest) -> Result<JobRecord, BenchError> {
        let profile = super::DurationProfile::resolve(&req.duration)?;
        let options = req.options.clone().unwrap_or_default();
        let now = Utc::now();

        let config = JobConfig::build(profile, options.clone(), now.timestamp());
        self.cache
            .set_enabled(self.default_cache_enabled && options.cache_enabled);

        let name = req.name.clone().unwrap_or_else(|| {
            format!("{} Benchmark - {}", profile.label, now.format("%Y-%m-%d %H:%M"))
        });
        let job = JobRecord {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            test_type: profile.id.to_string(),
            status: JobStatus::Pending,
            current_phase: config
                .current_phase()
                .map(|p| p.label.clone())
                .unwrap_or_default(),
            current_iteration: 0,
            total_iterations: config.total_iterations() as i64,
            stop_requested: false,
            config_json: config.to_json()?,
            avg_response_time: None,
            min_response_time: None,
            max_response_time: None,
            avg_memory_usage: None,
            peak_memory_usage: None,
            avg_db_queries: None,
            total_db_queries: None,
            cache_hits: None,
            cache_misses: None,
            cache_hit_rate: None,
            avg_cpu_usage: None,
            raw_data: None,
            started_at: now.to_rfc3339(),
            completed_at: None,
        };
        self.db.insert_job(&job)?;
        self.db.append_log(
            &job.id,
            LogLevel::Info,
            "Benchmark job created",
            Some(&json!({
                "duration": profile.id,
                "total_iterations": job.total_iterations,
                "cache_enabled": self.cache.is_enabled(),
            })),
        )?;
        debug!(job_id = %job.id, duration = profile.id, "job created");
        Ok(job)
    }

    /// Run one chunk of the job. Safe to call on a finished job: terminal
    /// polls are answered from the stored record without running anything.
    pub fn process_chunk(&self, id: &str) -> Result<ChunkOutcome, BenchError> {
        let job = self
            .db
            .get_job(id)?
            .ok_or_else(|| BenchError::JobNotFound(id.to_string()))?;
        let mut config = JobConfig::from_json(&job.config_json)?;

        if job.status.is_terminal() {
            return Ok(outcome(&config, job.status));
        }

        // The cache flag is shared process state; another job starting or
        // finishing may have flipped it since our last chunk. Re-assert this
        // job's configuration before measuring anything.
        self.cache
            .set_enabled(self.default_cache_enabled && config.options.cache_enabled);

        if self.db.is_stop_requested(id)? {
            return self.finalize(id, &mut config, JobStatus::Stopped);
        }
        if Utc::now().timestamp() >= config.max_end_time {
            self.db.append_log(id, LogLevel::Info, "Time limit reached", None)?;
            return self.finalize(id, &mut config, JobStatus::Completed);
        }
        if config.current_phase_index >= config.phases.len() {
            return self.finalize(id, &mut config, JobStatus::Completed);
        }

        let chunk_start = Instant::now();
        let mut done_this_chunk = 0u64;
        let mut stop_seen = false;
        let wctx = WorkloadContext {
            db: &self.db,
            cache: &self.cache,
            sensor: &self.sensor,
            scratch_dir: &self.scratch_dir,
        };

        while config.current_phase_index < config.phases.len() {
            let phase = &config.phases[config.current_phase_index];
            let kind = phase.kind;
            let label = phase.label.clone();
            let seq = phase.completed;

            match workload::execute(&wctx, kind, seq) {
                Ok(metrics) => {
                    config.retry_count = 0;
                    config.total_completed += 1;
                    let iteration = config.total_completed as i64;

                    self.db.append_metric(
                        id,
                        &MetricRow {
                            iteration,
                            response_time: metrics.response_time_ms,
                            memory_usage: metrics.memory_bytes,
                            db_queries: metrics.db_queries,
                            cpu_usage: metrics.cpu_percent,
                            ram_usage: metrics.ram_bytes,
                            disk_read: metrics.disk_read,
                            disk_write: metrics.disk_write,
                            cache_hits: metrics.cache_hits,
                            cache_misses: metrics.cache_misses,
                            timestamp: Utc::now().to_rfc3339(),
                        },
                    )?;
                    if let Some(post_id) = metrics.created_resource_id {
                        config.created_post_ids.push(post_id);
                    }
                    if metrics.response_time_ms > SLOW_RESPONSE_MS {
                        self.db.append_log(
                            id,
                            LogLevel::Slow,
                            &format!(
                                "Iteration {iteration} took {:.2}ms",
                                metrics.response_time_ms
                            ),
                            None,
                        )?;
                    }
                    config.phases[config.current_phase_index].completed += 1;
                    done_this_chunk += 1;
                }
                Err(err) => {
                    config.retry_count += 1;
                    self.db.append_log(
                        id,
                        LogLevel::Error,
                        &format!(
                            "{label} failed: {err} (attempt {}/{})",
                            config.retry_count, WORK_UNIT_RETRY_CAP
                        ),
                        None,
                    )?;
                    if config.retry_count >= WORK_UNIT_RETRY_CAP {
                        return self.finalize(id, &mut config, JobStatus::Failed);
                    }
                    // Leave the failed unit in place and retry it next poll.
                    break;
                }
            }

            if config.phases[config.current_phase_index].is_done() {
                self.db.append_log(
                    id,
                    LogLevel::Success,
                    &format!("{label} complete"),
                    None,
                )?;
                config.current_phase_index += 1;
                config.retry_count = 0;
            }

            if done_this_chunk >= self.chunk_max_items {
                break;
            }
            if chunk_start.elapsed().as_millis() as u64 >= self.chunk_max_millis {
                break;
            }
            if Utc::now().timestamp() >= config.max_end_time {
                break;
            }
            if self.db.is_stop_requested(id)? {
                stop_seen = true;
                break;
            }
        }

        if stop_seen {
            return self.finalize(id, &mut config, JobStatus::Stopped);
        }
        if config.current_phase_index >= config.phases.len()
            || Utc::now().timestamp() >= config.max_end_time
        {
            return self.finalize(id, &mut config, JobStatus::Completed);
        }

        let phase_label = config
            .current_phase()
            .map(|p| p.label.clone())
            .unwrap_or_default();
        self.db.update_progress(
            id,
            &phase_label,
            config.total_completed as i64,
            &config.to_json()?,
        )?;
        if let Some(phase) = config.current_phase() {
            self.db.append_log(
                id,
                LogLevel::Info,
                &format!("{}: {}/{}", phase.label, phase.completed, phase.total),
                None,
            )?;
        }
        Ok(outcome(&config, JobStatus::Running))
    }

    /// Finish a job: clean up its artifacts, aggregate, grade, persist the
    /// terminal record and restore the cache to its server-default state.
    fn finalize(
        &self,
        id: &str,
        config: &mut JobConfig,
        status: JobStatus,
    ) -> Result<ChunkOutcome, BenchError> {
        // Another poll may have finished the job between our read and now.
        if let Some(job) = self.db.get_job(id)? {
            if job.status.is_terminal() {
                return Ok(outcome(config, job.status));
            }
        }

        let created = std::mem::take(&mut config.created_post_ids);
        let mut removed = 0usize;
        for post_id in created {
            match self.db.delete_post(post_id) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(err) => {
                    warn!(job_id = id, post_id, %err, "failed to remove test post");
                    self.db.append_log(
                        id,
                        LogLevel::Warning,
                        &format!("Could not remove test post {post_id}: {err}"),
                        None,
                    )?;
                }
            }
        }
        if removed > 0 {
            self.db.append_log(
                id,
                LogLevel::Info,
                &format!("Cleaned up {removed} test posts"),
                None,
            )?;
        }
        self.sweep_scratch(id);

        let metrics = self.db.get_metrics(id)?;
        let agg = report::aggregate(&metrics);
        let slow = self.db.count_logs(id, LogLevel::Slow)? as i64;
        let perf = report::generate(&agg, slow);

        let raw = json!({
            "report": &perf,
            "duration": &config.duration,
            "options": &config.options,
        })
        .to_string();
        self.db.finalize_job(
            id,
            status,
            config.total_completed as i64,
            &config.to_json()?,
            &agg,
            &raw,
        )?;
        self.cache.set_enabled(self.default_cache_enabled);

        let (level, message) = match status {
            JobStatus::Completed => (LogLevel::Success, "Benchmark completed"),
            JobStatus::Stopped => (LogLevel::Info, "Benchmark stopped by request"),
            _ => (LogLevel::Error, "Benchmark failed"),
        };
        self.db.append_log(
            id,
            level,
            message,
            Some(&json!({"iterations": config.total_completed, "score": perf.score})),
        )?;
        debug!(job_id = id, status = status.as_str(), "job finalized");

        Ok(outcome(config, status))
    }

    // Best effort: a missing or unreadable scratch dir never blocks finalize.
    fn sweep_scratch(&self, id: &str) {
        let entries = match std::fs::read_dir(&self.scratch_dir) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() != std::io::ErrorKind::NotFound {
                    warn!(job_id = id, %err, "scratch cleanup");
                }
                return;
            }
        };
        for entry in entries.flatten() {
            if let Err(err) = std::fs::remove_file(entry.path()) {
                warn!(job_id = id, path = %entry.path().display(), %err, "scratch cleanup");
            }
        }
    }
}

fn outcome(config: &JobConfig, status: JobStatus) -> ChunkOutcome {
    // Past the last phase, report the final phase as fully done.
    let phase = config
        .current_phase()
        .or_else(|| config.phases.last());
    ChunkOutcome {
        status,
        current_phase: phase.map(|p| p.label.clone()).unwrap_or_default(),
        phase_progress: phase.map(|p| p.completed).unwrap_or(0),
        phase_total: phase.map(|p| p.total).unwrap_or(0),
        total_completed: config.total_completed,
        phases_remaining: config.phases_remaining(),
    }
}
