use axum::extract::{Path, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};

use super::MessageResponse;
use crate::engine::{
    DurationProfile, JobLogEntry, JobRecord, JobStatus, MetricRow, StartRequest,
};
use crate::error::BenchError;
use crate::state::SharedState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Incremental poll cursor: the client sends the highest log id and metric
/// iteration it has seen and receives only what is newer.
#[derive(Debug, Default, Deserialize)]
pub struct PollRequest {
    #[serde(default)]
    pub last_log_id: i64,
    #[serde(default)]
    pub last_iteration: i64,
}

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub status: JobStatus,
    pub current_phase: String,
    pub phase_progress: u64,
    pub phase_total: u64,
    pub phases_remaining: usize,
    pub current_iteration: u64,
    pub total_iterations: i64,
    pub progress_percent: f64,
    pub stop_requested: bool,
    pub logs: Vec<JobLogEntry>,
    pub metrics: Vec<MetricRow>,
    pub last_log_id: i64,
    pub last_iteration: i64,
    /// Present once the job reaches a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<serde_json::Value>,
    /// The finalized record with its aggregates, once terminal.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobRecord>,
}

#[derive(Debug, Serialize)]
pub struct JobDetail {
    #[serde(flatten)]
    pub job: JobRecord,
    pub config: serde_json::Value,
    pub report: Option<serde_json::Value>,
    pub metrics: Vec<MetricRow>,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn start_job(
    State(state): State<SharedState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<JobRecord>, BenchError> {
    let job = state.engine().start_job(&req)?;
    Ok(Json(job))
}

/// The heartbeat of the whole system: each poll runs one chunk of the job
/// and reports progress plus any new logs and metrics.
pub async fn poll_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(req): Json<PollRequest>,
) -> Result<Json<PollResponse>, BenchError> {
    let lock = state.job_lock(&id);
    let _guard = lock.lock().await;

    let outcome = state.engine().process_chunk(&id)?;
    let job = state
        .db
        .get_job(&id)?
        .ok_or_else(|| BenchError::JobNotFound(id.clone()))?;

    let logs = state.db.get_logs_since(&id, req.last_log_id)?;
    let metrics = state.db.get_metrics_since(&id, req.last_iteration)?;
    let last_log_id = logs.last().map(|l| l.id).unwrap_or(req.last_log_id);
    let last_iteration = metrics
        .last()
        .map(|m| m.iteration)
        .unwrap_or(req.last_iteration);

    let progress_percent = if job.total_iterations > 0 {
        (outcome.total_completed as f64 / job.total_iterations as f64 * 100.0).min(100.0)
    } else {
        0.0
    };
    let (report, result) = if outcome.status.is_terminal() {
        (job.report(), Some(job.clone()))
    } else {
        (None, None)
    };

    Ok(Json(PollResponse {
        status: outcome.status,
        current_phase: outcome.current_phase,
        phase_progress: outcome.phase_progress,
        phase_total: outcome.phase_total,
        phases_remaining: outcome.phases_remaining,
        current_iteration: outcome.total_completed,
        total_iterations: job.total_iterations,
        progress_percent,
        stop_requested: job.stop_requested,
        logs,
        metrics,
        last_log_id,
        last_iteration,
        report,
        result,
    }))
}

/// Request a cooperative stop. The job actually stops on its next poll.
pub async fn stop_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, BenchError> {
    if !state.db.request_stop(&id)? {
        return Err(BenchError::JobNotFound(id));
    }
    Ok(Json(MessageResponse {
        ok: true,
        message: "Stop requested; the job will finalize on its next poll".into(),
    }))
}

pub async fn list_jobs(
    State(state): State<SharedState>,
) -> Result<Json<Vec<JobRecord>>, BenchError> {
    Ok(Json(state.db.list_jobs()?))
}

pub async fn get_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<JobDetail>, BenchError> {
    let job = state
        .db
        .get_job(&id)?
        .ok_or_else(|| BenchError::JobNotFound(id.clone()))?;
    let config = serde_json::from_str(&job.config_json)?;
    let report = job.report();
    let metrics = state.db.get_metrics(&id)?;
    Ok(Json(JobDetail {
        job,
        config,
        report,
        metrics,
    }))
}

pub async fn delete_job(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, BenchError> {
    if !state.db.delete_job(&id)? {
        return Err(BenchError::JobNotFound(id));
    }
    state.drop_job_lock(&id);
    Ok(Json(MessageResponse {
        ok: true,
        message: "Job deleted".into(),
    }))
}

pub async fn list_durations() -> Json<&'static [DurationProfile]> {
    Json(DurationProfile::all())
}
