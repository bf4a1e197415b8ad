//! Side-by-side comparison of finished benchmark results.
//!
//! Works on 2 to 5 completed jobs. One of them is the baseline; every metric
//! of every other job is reported as an absolute and relative difference
//! from the baseline's value, with direction-aware improvement flags.

use serde::Serialize;

use crate::db::BenchDb;
use crate::engine::{JobRecord, JobStatus, MetricRow};
use crate::error::BenchError;

pub const MIN_SELECTION: usize = 2;
pub const MAX_SELECTION: usize = 5;

/// Metric axes the per-iteration series endpoint can chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesMetric {
    ResponseTime,
    MemoryUsage,
    DbQueries,
    CpuUsage,
}

impl SeriesMetric {
    pub fn parse(name: &str) -> Result<Self, BenchError> {
        match name {
            "response_time" => Ok(SeriesMetric::ResponseTime),
            "memory_usage" => Ok(SeriesMetric::MemoryUsage),
            "db_queries" => Ok(SeriesMetric::DbQueries),
            "cpu_usage" => Ok(SeriesMetric::CpuUsage),
            _ => Err(BenchError::UnknownMetric(name.to_string())),
        }
    }

    fn extract(self, row: &MetricRow) -> f64 {
        match self {
            SeriesMetric::ResponseTime => row.response_time,
            SeriesMetric::MemoryUsage => row.memory_usage as f64,
            SeriesMetric::DbQueries => row.db_queries as f64,
            SeriesMetric::CpuUsage => row.cpu_usage,
        }
    }
}

/// One metric value with its deviation from the baseline. Diff fields are
/// `None` on the baseline's own row.
#[derive(Debug, Clone, Serialize)]
pub struct MetricCell {
    pub value: f64,
    pub unit: &'static str,
    pub diff: Option<f64>,
    pub diff_percent: Option<f64>,
    pub is_improvement: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub name: String,
    pub test_type: String,
    pub is_baseline: bool,
    pub iterations: i64,
    pub avg_response_time: MetricCell,
    pub min_response_time: MetricCell,
    pub max_response_time: MetricCell,
    pub avg_memory_usage: MetricCell,
    pub peak_memory_usage: MetricCell,
    pub cache_hit_rate: MetricCell,
    pub avg_db_queries: MetricCell,
    pub avg_cpu_usage: MetricCell,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheTotals {
    pub job_id: String,
    pub name: String,
    pub hits: i64,
    pub misses: i64,
    pub total: i64,
    pub hit_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeriesStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
    pub p95: f64,
    pub p99: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobSeries {
    pub job_id: String,
    pub name: String,
    pub values: Vec<f64>,
    pub stats: SeriesStats,
}

#[derive(Debug)]
struct LoadedResult {
    job: JobRecord,
    metrics: Vec<MetricRow>,
}

#[derive(Debug)]
pub struct ComparisonEngine {
    results: Vec<LoadedResult>,
    baseline: usize,
}

impl ComparisonEngine {
    /// Load the selected jobs in the caller's order. Jobs that are not in a
    /// completed state are dropped; fewer than two survivors is an error.
    pub fn load(db: &BenchDb, ids: &[String]) -> Result<Self, BenchError> {
        if ids.len() < MIN_SELECTION || ids.len() > MAX_SELECTION {
            return Err(BenchError::InvalidSelectionCount(ids.len()));
        }

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(job) = db.get_job(id)? else { continue };
            if job.status != JobStatus::Completed {
                continue;
            }
            let metrics = db.get_metrics(id)?;
            results.push(LoadedResult { job, metrics });
        }

        if results.len() < MIN_SELECTION {
            return Err(BenchError::InsufficientCompletedResults(results.len()));
        }
        Ok(Self {
            results,
            baseline: 0,
        })
    }

    pub fn set_baseline(&mut self, id: &str) -> Result<(), BenchError> {
        match self.results.iter().position(|r| r.job.id == id) {
            Some(index) => {
                self.baseline = index;
                Ok(())
            }
            None => Err(BenchError::JobNotFound(id.to_string())),
        }
    }

    pub fn baseline_id(&self) -> &str {
        &self.results[self.baseline].job.id
    }

    pub fn summary(&self) -> Vec<JobSummary> {
        let base = &self.results[self.baseline].job;
        self.results
            .iter()
            .enumerate()
            .map(|(index, r)| {
                let job = &r.job;
                let is_baseline = index == self.baseline;
                let cell = |value: Option<f64>,
                            base_value: Option<f64>,
                            unit: &'static str,
                            lower_is_better: bool| {
                    metric_cell(
                        value.unwrap_or(0.0),
                        base_value.unwrap_or(0.0),
                        unit,
                        lower_is_better,
                        is_baseline,
                    )
                };
                JobSummary {
                    job_id: job.id.clone(),
                    name: job.name.clone(),
                    test_type: job.test_type.clone(),
                    is_baseline,
                    iterations: job.current_iteration,
                    avg_response_time: cell(
                        job.avg_response_time,
                        base.avg_response_time,
                        "ms",
                        true,
                    ),
                    min_response_time: cell(
                        job.min_response_time,
                        base.min_response_time,
                        "ms",
                        true,
                    ),
                    max_response_time: cell(
                        job.max_response_time,
                        base.max_response_time,
                        "ms",
                        true,
                    ),
                    avg_memory_usage: cell(
                        job.avg_memory_usage.map(|v| v as f64),
                        base.avg_memory_usage.map(|v| v as f64),
                        "bytes",
                        true,
                    ),
                    peak_memory_usage: cell(
                        job.peak_memory_usage.map(|v| v as f64),
                        base.peak_memory_usage.map(|v| v as f64),
                        "bytes",
                        true,
                    ),
                    cache_hit_rate: cell(
                        job.cache_hit_rate,
                        base.cache_hit_rate,
                        "%",
                        false,
                    ),
                    avg_db_queries: cell(
                        job.avg_db_queries,
                        base.avg_db_queries,
                        "queries",
                        true,
                    ),
                    avg_cpu_usage: cell(job.avg_cpu_usage, base.avg_cpu_usage, "%", true),
                }
            })
            .collect()
    }

    pub fn cache_totals(&self) -> Vec<CacheTotals> {
        self.results
            .iter()
            .map(|r| {
                let hits = r.job.cache_hits.unwrap_or(0);
                let misses = r.job.cache_misses.unwrap_or(0);
                let total = hits + misses;
                CacheTotals {
                    job_id: r.job.id.clone(),
                    name: r.job.name.clone(),
                    hits,
                    misses,
                    total,
                    hit_rate: if total > 0 {
                        hits as f64 / total as f64 * 100.0
                    } else {
                        0.0
                    },
                }
            })
            .collect()
    }

    pub fn series(&self, metric: SeriesMetric) -> Vec<JobSeries> {
        self.results
            .iter()
            .map(|r| {
                let values: Vec<f64> = r.metrics.iter().map(|m| metric.extract(m)).collect();
                let stats = series_stats(&values);
                JobSeries {
                    job_id: r.job.id.clone(),
                    name: r.job.name.clone(),
                    values,
                    stats,
                }
            })
            .collect()
    }
}

fn metric_cell(
    value: f64,
    base: f64,
    unit: &'static str,
    lower_is_better: bool,
    is_baseline: bool,
) -> MetricCell {
    if is_baseline {
        return MetricCell {
            value,
            unit,
            diff: None,
            diff_percent: None,
            is_improvement: None,
        };
    }
    let diff = value - base;
    let diff_percent = if base != 0.0 { diff / base * 100.0 } else { 0.0 };
    let is_improvement = if lower_is_better { diff < 0.0 } else { diff > 0.0 };
    MetricCell {
        value,
        unit,
        diff: Some(round2(diff)),
        diff_percent: Some(round1(diff_percent)),
        is_improvement: Some(is_improvement),
    }
}

/// Descriptive stats over one job's series. Percentiles use the nearest-rank
/// index `floor(n * q)` clamped to the last element; the standard deviation
/// is the population form and reads as 0 for fewer than two samples.
pub fn series_stats(values: &[f64]) -> SeriesStats {
    if values.is_empty() {
        return SeriesStats {
            count: 0,
            min: 0.0,
            max: 0.0,
            mean: 0.0,
            median: 0.0,
            p95: 0.0,
            p99: 0.0,
            std_dev: 0.0,
        };
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = sorted.len();
    let mean = sorted.iter().sum::<f64>() / n as f64;

    let std_dev = if n < 2 {
        0.0
    } else {
        let variance = sorted.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        variance.sqrt()
    };

    let rank = |q: f64| sorted[((n as f64 * q) as usize).min(n - 1)];

    SeriesStats {
        count: n,
        min: sorted[0],
        max: sorted[n - 1],
        mean,
        median: sorted[n / 2],
        p95: rank(0.95),
        p99: rank(0.99),
        std_dev,
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
