use clap::Parser;
use std::path::PathBuf;

/// Cache Bench — benchmarks a site's performance under varying cache
/// configurations via resumable, chunked jobs.
#[derive(Parser, Debug, Clone)]
#[command(name = "cache-bench")]
pub struct CliArgs {
    /// Directory for the benchmark database and scratch files
    #[arg(short = 'd', long = "data-dir", default_value = ".cache-bench")]
    pub data_dir: PathBuf,

    /// HTTP port
    #[arg(long = "port", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Disable the in-process object cache by default (jobs may still
    /// enable it per run)
    #[arg(long = "no-cache")]
    pub no_cache: bool,
}

pub const DEFAULT_PORT: u16 = 9280;

// Chunk budgets. A poll must hand control back to the caller well inside its
// request timeout: the item budget keeps a fast loop from spinning, the
// wall-clock budget keeps one slow work unit from monopolizing the poll.
pub const CHUNK_MAX_ITEMS: u64 = 5;
pub const CHUNK_MAX_MILLIS: u64 = 2_000;

// Consecutive work-unit failures tolerated per phase before the job fails.
pub const WORK_UNIT_RETRY_CAP: u32 = 3;

// Optional phase sizes when the option is enabled without an explicit count.
pub const DEFAULT_API_READS: u64 = 50;
pub const DEFAULT_OPTION_RELOADS: u64 = 20;
pub const DEFAULT_CRON_WRITES: u64 = 5;

// Cron simulation scratch file size.
pub const CRON_FILE_BYTES: usize = 64 * 1024;

// Report policy thresholds. Policy, not physics; each report finding carries
// the threshold it was judged against.
pub const RESPONSE_WARN_MS: f64 = 200.0;
pub const RESPONSE_CRITICAL_MS: f64 = 500.0;
pub const QUERIES_WARN_PER_ITER: f64 = 50.0;
pub const QUERIES_CRITICAL_PER_ITER: f64 = 100.0;
pub const HIT_RATE_WARN_PCT: f64 = 80.0;
pub const HIT_RATE_CRITICAL_PCT: f64 = 50.0;
pub const SLOW_LOGS_WARN: usize = 10;
pub const SLOW_LOGS_CRITICAL: usize = 50;

// Work units slower than this get a `slow` log entry.
pub const SLOW_RESPONSE_MS: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub data_dir: PathBuf,
    pub port: u16,
    pub no_cache: bool,
}

impl BenchConfig {
    pub fn from_args(args: CliArgs) -> Self {
        BenchConfig {
            data_dir: args.data_dir,
            port: args.port,
            no_cache: args.no_cache,
        }
    }

    /// Directory the cron-simulation phase writes its scratch files into.
    pub fn scratch_dir(&self) -> PathBuf {
        self.data_dir.join("cron-scratch")
    }
}
