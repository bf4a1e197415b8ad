pub mod chunk;
pub mod report;
pub mod workload;

use serde::{Deserialize, Serialize};

use crate::config::{DEFAULT_API_READS, DEFAULT_CRON_WRITES, DEFAULT_OPTION_RELOADS};
use crate::error::BenchError;

// ============================================================================
// Data model
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Stopped,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Stopped | JobStatus::Failed
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Stopped => "stopped",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "running" => Some(JobStatus::Running),
            "completed" => Some(JobStatus::Completed),
            "stopped" => Some(JobStatus::Stopped),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// Phase kinds in declaration order. Phase 0 of every job is `PageLoad`; the
/// optional phases follow in this order when enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseKind {
    PageLoad,
    CreatePost,
    ReadApi,
    ReloadOptions,
    SimulateCron,
}

impl PhaseKind {
    pub fn label(self) -> &'static str {
        match self {
            PhaseKind::PageLoad => "Benchmark Iterations",
            PhaseKind::CreatePost => "Post Creation Test",
            PhaseKind::ReadApi => "API Read Test",
            PhaseKind::ReloadOptions => "Options Reload Test",
            PhaseKind::SimulateCron => "Cron Simulation Test",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Phase {
    pub kind: PhaseKind,
    pub label: String,
    pub total: u64,
    pub completed: u64,
}

impl Phase {
    pub fn new(kind: PhaseKind, total: u64) -> Self {
        Phase {
            kind,
            label: kind.label().to_string(),
            total,
            completed: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.completed >= self.total
    }
}

fn default_true() -> bool {
    true
}

/// Workload selection for a job. The boolean flags gate the optional phases;
/// the counts override the per-phase defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkloadOptions {
    #[serde(default)]
    pub create_posts: bool,
    #[serde(default)]
    pub read_api: bool,
    #[serde(default)]
    pub reload_options: bool,
    #[serde(default)]
    pub simulate_cron: bool,
    #[serde(default)]
    pub posts: Option<u64>,
    #[serde(default)]
    pub api_reads: Option<u64>,
    #[serde(default)]
    pub option_reloads: Option<u64>,
    #[serde(default)]
    pub cron_writes: Option<u64>,
    /// Whether the in-process object cache is active for this run. This is
    /// the knob the whole benchmark exists to measure.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
}

impl Default for WorkloadOptions {
    fn default() -> Self {
        WorkloadOptions {
            create_posts: false,
            read_api: false,
            reload_options: false,
            simulate_cron: false,
            posts: None,
            api_reads: None,
            option_reloads: None,
            cron_writes: None,
            cache_enabled: true,
        }
    }
}

// ============================================================================
// Duration profiles
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DurationClass {
    #[serde(rename = "quick")]
    Quick,
    #[serde(rename = "2min")]
    TwoMin,
    #[serde(rename = "5min")]
    FiveMin,
    #[serde(rename = "until_stop")]
    UntilStop,
}

#[derive(Debug, Clone, Serialize)]
pub struct DurationProfile {
    pub class: DurationClass,
    pub id: &'static str,
    pub label: &'static str,
    pub iterations: u64,
    pub posts: u64,
    pub max_time_secs: i64,
}

const DURATION_PROFILES: &[DurationProfile] = &[
    DurationProfile {
        class: DurationClass::Quick,
        id: "quick",
        label: "Quick",
        iterations: 10,
        posts: 100,
        max_time_secs: 60,
    },
    DurationProfile {
        class: DurationClass::TwoMin,
        id: "2min",
        label: "2 Minutes",
        iterations: 50,
        posts: 1000,
        max_time_secs: 120,
    },
    DurationProfile {
        class: DurationClass::FiveMin,
        id: "5min",
        label: "5 Minutes",
        iterations: 100,
        posts: 2500,
        max_time_secs: 300,
    },
    DurationProfile {
        class: DurationClass::UntilStop,
        id: "until_stop",
        label: "Until Stopped (max 10 min)",
        iterations: 500,
        posts: 5000,
        max_time_secs: 600,
    },
];

impl DurationProfile {
    pub fn all() -> &'static [DurationProfile] {
        DURATION_PROFILES
    }

    /// Resolve a duration class string. Unknown classes are rejected rather
    /// than silently substituted with the smallest profile.
    pub fn resolve(class: &str) -> Result<&'static DurationProfile, BenchError> {
        DURATION_PROFILES
            .iter()
            .find(|p| p.id == class)
            .ok_or_else(|| BenchError::InvalidDuration(class.to_string()))
    }
}

// ============================================================================
// Job config — the persisted, versioned resumption state
// ============================================================================

pub const JOB_CONFIG_VERSION: u32 = 1;

/// The engine's resumption state, persisted as a versioned JSON document in
/// the job row. Everything `process_chunk` needs to pick up where the last
/// poll left off lives here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub version: u32,
    pub duration: DurationClass,
    pub options: WorkloadOptions,
    pub phases: Vec<Phase>,
    pub current_phase_index: usize,
    pub total_completed: u64,
    pub created_post_ids: Vec<i64>,
    /// Unix seconds; hard wall-clock ceiling for the whole job.
    pub max_end_time: i64,
    /// Consecutive failures of the current work unit.
    pub retry_count: u32,
}

impl JobConfig {
    pub fn build(
        profile: &DurationProfile,
        options: WorkloadOptions,
        now_unix: i64,
    ) -> Self {
        let mut phases = vec![Phase::new(PhaseKind::PageLoad, profile.iterations)];

        let post_count = options.posts.unwrap_or(profile.posts);
        if options.create_posts && post_count > 0 {
            phases.push(Phase::new(PhaseKind::CreatePost, post_count));
        }
        let api_reads = options.api_reads.unwrap_or(DEFAULT_API_READS);
        if options.read_api && api_reads > 0 {
            phases.push(Phase::new(PhaseKind::ReadApi, api_reads));
        }
        let option_reloads = options.option_reloads.unwrap_or(DEFAULT_OPTION_RELOADS);
        if options.reload_options && option_reloads > 0 {
            phases.push(Phase::new(PhaseKind::ReloadOptions, option_reloads));
        }
        let cron_writes = options.cron_writes.unwrap_or(DEFAULT_CRON_WRITES);
        if options.simulate_cron && cron_writes > 0 {
            phases.push(Phase::new(PhaseKind::SimulateCron, cron_writes));
        }

        JobConfig {
            version: JOB_CONFIG_VERSION,
            duration: profile.class,
            options,
            phases,
            current_phase_index: 0,
            total_completed: 0,
            created_post_ids: Vec::new(),
            max_end_time: now_unix + profile.max_time_secs,
            retry_count: 0,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, BenchError> {
        let cfg: JobConfig = serde_json::from_str(json)?;
        if cfg.version != JOB_CONFIG_VERSION {
            return Err(BenchError::Other(format!(
                "Unsupported job config version {}",
                cfg.version
            )));
        }
        Ok(cfg)
    }

    pub fn to_json(&self) -> Result<String, BenchError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn total_iterations(&self) -> u64 {
        self.phases.iter().map(|p| p.total).sum()
    }

    pub fn current_phase(&self) -> Option<&Phase> {
        self.phases.get(self.current_phase_index)
    }

    pub fn phases_remaining(&self) -> usize {
        self.phases.len().saturating_sub(self.current_phase_index)
    }
}

// ============================================================================
// Persisted records
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: String,
    pub name: String,
    pub test_type: String,
    pub status: JobStatus,
    pub current_phase: String,
    pub current_iteration: i64,
    pub total_iterations: i64,
    pub stop_requested: bool,
    #[serde(skip_serializing)]
    pub config_json: String,
    pub avg_response_time: Option<f64>,
    pub min_response_time: Option<f64>,
    pub max_response_time: Option<f64>,
    pub avg_memory_usage: Option<i64>,
    pub peak_memory_usage: Option<i64>,
    pub avg_db_queries: Option<f64>,
    pub total_db_queries: Option<i64>,
    pub cache_hits: Option<i64>,
    pub cache_misses: Option<i64>,
    pub cache_hit_rate: Option<f64>,
    pub avg_cpu_usage: Option<f64>,
    #[serde(skip_serializing)]
    pub raw_data: Option<String>,
    pub started_at: String,
    pub completed_at: Option<String>,
}

impl JobRecord {
    /// Parse the report out of the raw_data blob written at finalize.
    pub fn report(&self) -> Option<serde_json::Value> {
        let raw = self.raw_data.as_deref()?;
        let value: serde_json::Value = serde_json::from_str(raw).ok()?;
        value.get("report").cloned()
    }
}

/// One row per completed work unit, keyed by a global iteration counter that
/// is strictly increasing across all phases of a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRow {
    pub iteration: i64,
    pub response_time: f64,
    pub memory_usage: i64,
    pub db_queries: i64,
    pub cpu_usage: f64,
    pub ram_usage: i64,
    pub disk_read: i64,
    pub disk_write: i64,
    pub cache_hits: i64,
    pub cache_misses: i64,
    pub timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
    Slow,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
            LogLevel::Slow => "slow",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(LogLevel::Info),
            "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            "success" => Some(LogLevel::Success),
            "slow" => Some(LogLevel::Slow),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobLogEntry {
    pub id: i64,
    pub level: LogLevel,
    pub message: String,
    pub data: Option<serde_json::Value>,
    pub created_at: String,
}

// ============================================================================
// Engine call surface
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct StartRequest {
    pub duration: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub options: Option<WorkloadOptions>,
}

/// What one `process_chunk` call reports back — exactly the payload a
/// polling client renders.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkOutcome {
    pub status: JobStatus,
    pub current_phase: String,
    pub phase_progress: u64,
    pub phase_total: u64,
    pub total_completed: u64,
    pub phases_remaining: usize,
}
