//! Aggregation of per-iteration metrics and the threshold-driven
//! performance report derived from them.

use serde::Serialize;

use super::MetricRow;
use crate::config::{
    HIT_RATE_CRITICAL_PCT, HIT_RATE_WARN_PCT, QUERIES_CRITICAL_PER_ITER, QUERIES_WARN_PER_ITER,
    RESPONSE_CRITICAL_MS, RESPONSE_WARN_MS, SLOW_LOGS_CRITICAL, SLOW_LOGS_WARN,
};
use crate::db::JobAggregates;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

#[derive(Debug, Clone, Serialize)]
pub struct Bottleneck {
    pub category: String,
    pub severity: Severity,
    pub description: String,
    pub impact: String,
    pub value: f64,
    pub threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Suggestion {
    pub title: String,
    pub priority: &'static str,
    pub actions: Vec<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceReport {
    pub score: u32,
    pub grade: char,
    pub status: &'static str,
    pub message: String,
    pub critical_issues: usize,
    pub warnings: usize,
    pub bottlenecks: Vec<Bottleneck>,
    pub suggestions: Vec<Suggestion>,
}

/// Collapse the per-iteration rows into the aggregate columns stored on the
/// job. Returns zeros when no iteration completed.
pub fn aggregate(metrics: &[MetricRow]) -> JobAggregates {
    if metrics.is_empty() {
        return JobAggregates::default();
    }

    let n = metrics.len() as f64;
    let mut agg = JobAggregates {
        min_response_time: f64::MAX,
        ..JobAggregates::default()
    };
    let mut sum_response = 0.0;
    let mut sum_memory: i64 = 0;
    let mut sum_cpu = 0.0;

    for m in metrics {
        sum_response += m.response_time;
        agg.min_response_time = agg.min_response_time.min(m.response_time);
        agg.max_response_time = agg.max_response_time.max(m.response_time);
        sum_memory += m.memory_usage;
        agg.peak_memory_usage = agg.peak_memory_usage.max(m.memory_usage);
        agg.total_db_queries += m.db_queries;
        agg.cache_hits += m.cache_hits;
        agg.cache_misses += m.cache_misses;
        sum_cpu += m.cpu_usage;
    }

    agg.avg_response_time = sum_response / n;
    agg.avg_memory_usage = (sum_memory as f64 / n) as i64;
    agg.avg_db_queries = agg.total_db_queries as f64 / n;
    agg.avg_cpu_usage = sum_cpu / n;

    let activity = agg.cache_hits + agg.cache_misses;
    if activity > 0 {
        agg.cache_hit_rate = agg.cache_hits as f64 / activity as f64 * 100.0;
    }

    agg
}

/// Apply the threshold policy to a job's aggregates and produce the graded
/// report. `slow_log_count` is how many iterations were flagged slow.
pub fn generate(agg: &JobAggregates, slow_log_count: i64) -> PerformanceReport {
    let mut bottlenecks = Vec::new();

    if agg.avg_response_time > RESPONSE_CRITICAL_MS {
        bottlenecks.push(Bottleneck {
            category: "response_time".into(),
            severity: Severity::Critical,
            description: format!(
                "Average response time is {:.2}ms (critical threshold: {:.0}ms)",
                agg.avg_response_time, RESPONSE_CRITICAL_MS
            ),
            impact: "Visitors experience noticeable delays on every request".into(),
            value: agg.avg_response_time,
            threshold: RESPONSE_CRITICAL_MS,
        });
    } else if agg.avg_response_time > RESPONSE_WARN_MS {
        bottlenecks.push(Bottleneck {
            category: "response_time".into(),
            severity: Severity::Warning,
            description: format!(
                "Average response time is {:.2}ms (warning threshold: {:.0}ms)",
                agg.avg_response_time, RESPONSE_WARN_MS
            ),
            impact: "Response times are higher than a well-cached site should see".into(),
            value: agg.avg_response_time,
            threshold: RESPONSE_WARN_MS,
        });
    }

    if agg.avg_db_queries > QUERIES_CRITICAL_PER_ITER {
        bottlenecks.push(Bottleneck {
            category: "db_queries".into(),
            severity: Severity::Critical,
            description: format!(
                "Averaging {:.1} database queries per iteration (critical threshold: {:.0})",
                agg.avg_db_queries, QUERIES_CRITICAL_PER_ITER
            ),
            impact: "Database load dominates request time".into(),
            value: agg.avg_db_queries,
            threshold: QUERIES_CRITICAL_PER_ITER,
        });
    } else if agg.avg_db_queries > QUERIES_WARN_PER_ITER {
        bottlenecks.push(Bottleneck {
            category: "db_queries".into(),
            severity: Severity::Warning,
            description: format!(
                "Averaging {:.1} database queries per iteration (warning threshold: {:.0})",
                agg.avg_db_queries, QUERIES_WARN_PER_ITER
            ),
            impact: "Query volume is high enough to notice under load".into(),
            value: agg.avg_db_queries,
            threshold: QUERIES_WARN_PER_ITER,
        });
    }

    // Hit-rate thresholds only apply when the cache saw any traffic.
    let cache_activity = agg.cache_hits + agg.cache_misses;
    if cache_activity > 0 {
        if agg.cache_hit_rate < HIT_RATE_CRITICAL_PCT {
            bottlenecks.push(Bottleneck {
                category: "cache_hit_rate".into(),
                severity: Severity::Critical,
                description: format!(
                    "Cache hit rate is {:.1}% (critical threshold: {:.0}%)",
                    agg.cache_hit_rate, HIT_RATE_CRITICAL_PCT
                ),
                impact: "Most lookups fall through to the database".into(),
                value: agg.cache_hit_rate,
                threshold: HIT_RATE_CRITICAL_PCT,
            });
        } else if agg.cache_hit_rate < HIT_RATE_WARN_PCT {
            bottlenecks.push(Bottleneck {
                category: "cache_hit_rate".into(),
                severity: Severity::Warning,
                description: format!(
                    "Cache hit rate is {:.1}% (warning threshold: {:.0}%)",
                    agg.cache_hit_rate, HIT_RATE_WARN_PCT
                ),
                impact: "A meaningful share of lookups miss the cache".into(),
                value: agg.cache_hit_rate,
                threshold: HIT_RATE_WARN_PCT,
            });
        }
    }

    let variance = agg.max_response_time - agg.min_response_time;
    if agg.avg_response_time > 0.0 && variance > agg.avg_response_time * 2.0 {
        bottlenecks.push(Bottleneck {
            category: "response_variance".into(),
            severity: Severity::Warning,
            description: format!(
                "Response times swing {:.2}ms between fastest and slowest iteration",
                variance
            ),
            impact: "Inconsistent performance suggests contention or cold caches".into(),
            value: variance,
            threshold: agg.avg_response_time * 2.0,
        });
    }

    if slow_log_count > SLOW_LOGS_CRITICAL as i64 {
        bottlenecks.push(Bottleneck {
            category: "slow_iterations".into(),
            severity: Severity::Critical,
            description: format!("{slow_log_count} iterations were flagged as slow"),
            impact: "Slowdowns are the norm rather than the exception".into(),
            value: slow_log_count as f64,
            threshold: SLOW_LOGS_CRITICAL as f64,
        });
    } else if slow_log_count > SLOW_LOGS_WARN as i64 {
        bottlenecks.push(Bottleneck {
            category: "slow_iterations".into(),
            severity: Severity::Warning,
            description: format!("{slow_log_count} iterations were flagged as slow"),
            impact: "Occasional slow iterations observed during the run".into(),
            value: slow_log_count as f64,
            threshold: SLOW_LOGS_WARN as f64,
        });
    }

    bottlenecks.sort_by_key(|b| match b.severity {
        Severity::Critical => 0,
        Severity::Warning => 1,
    });

    let critical_issues = bottlenecks
        .iter()
        .filter(|b| b.severity == Severity::Critical)
        .count();
    let warnings = bottlenecks.len() - critical_issues;

    let score = 100i64 - 15 * critical_issues as i64 - 5 * warnings as i64;
    let score = score.max(0) as u32;

    let grade = match score {
        90.. => 'A',
        75..=89 => 'B',
        60..=74 => 'C',
        40..=59 => 'D',
        _ => 'F',
    };
    let status = match score {
        90.. => "Excellent",
        70..=89 => "Good",
        50..=69 => "Needs Improvement",
        _ => "Critical",
    };

    let message = if critical_issues > 0 {
        format!(
            "Found {critical_issues} critical issue(s) and {warnings} warning(s) that need attention"
        )
    } else if warnings > 0 {
        format!("Performance is acceptable with {warnings} warning(s) worth reviewing")
    } else {
        "No performance bottlenecks detected".to_string()
    };

    let suggestions = build_suggestions(&bottlenecks);

    PerformanceReport {
        score,
        grade,
        status,
        message,
        critical_issues,
        warnings,
        bottlenecks,
        suggestions,
    }
}

fn build_suggestions(bottlenecks: &[Bottleneck]) -> Vec<Suggestion> {
    let mut suggestions = Vec::new();

    for b in bottlenecks {
        let priority = match b.severity {
            Severity::Critical => "high",
            Severity::Warning => "medium",
        };
        let (title, actions): (&str, Vec<&'static str>) = match b.category.as_str() {
            "response_time" => (
                "Reduce response times",
                vec![
                    "Enable or tune the object cache so repeated lookups stay in memory",
                    "Add a full-page caching layer in front of the application",
                    "Profile the slowest endpoints and cache their hot data",
                ],
            ),
            "db_queries" => (
                "Cut database query volume",
                vec![
                    "Cache frequently read settings and lookups",
                    "Batch related queries instead of issuing them one by one",
                    "Add indexes for the most common query patterns",
                ],
            ),
            "cache_hit_rate" => (
                "Improve cache effectiveness",
                vec![
                    "Verify the object cache backend is actually reachable",
                    "Lengthen TTLs for values that rarely change",
                    "Warm the cache after deployments and flushes",
                ],
            ),
            "response_variance" => (
                "Stabilize response times",
                vec![
                    "Check for background tasks competing for the same resources",
                    "Pin cache capacity so entries are not evicted mid-run",
                ],
            ),
            "slow_iterations" => (
                "Investigate slow iterations",
                vec![
                    "Correlate slow iterations with resource usage spikes",
                    "Enable slow-query logging on the database",
                ],
            ),
            _ => continue,
        };
        if suggestions.iter().any(|s: &Suggestion| s.title == title) {
            continue;
        }
        suggestions.push(Suggestion {
            title: title.to_string(),
            priority,
            actions,
        });
    }

    let criticals = bottlenecks
        .iter()
        .any(|b| b.severity == Severity::Critical);
    if !criticals && bottlenecks.len() < 3 {
        suggestions.push(Suggestion {
            title: "Keep monitoring".to_string(),
            priority: "low",
            actions: vec![
                "Performance is in good shape; re-run the benchmark after configuration changes",
            ],
        });
    }

    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(iteration: i64, response_time: f64, db_queries: i64, hits: i64, misses: i64) -> MetricRow {
        MetricRow {
            iteration,
            response_time,
            memory_usage: 1024 * 1024,
            db_queries,
            cpu_usage: 10.0,
            ram_usage: 0,
            disk_read: 0,
            disk_write: 0,
            cache_hits: hits,
            cache_misses: misses,
            timestamp: String::new(),
        }
    }

    #[test]
    fn aggregate_empty_is_zeroed() {
        let agg = aggregate(&[]);
        assert_eq!(agg.avg_response_time, 0.0);
        assert_eq!(agg.min_response_time, 0.0);
        assert_eq!(agg.cache_hit_rate, 0.0);
    }

    #[test]
    fn aggregate_basic_stats() {
        let rows = vec![
            row(1, 10.0, 5, 8, 2),
            row(2, 20.0, 7, 6, 4),
            row(3, 30.0, 3, 10, 0),
        ];
        let agg = aggregate(&rows);
        assert!((agg.avg_response_time - 20.0).abs() < 1e-9);
        assert_eq!(agg.min_response_time, 10.0);
        assert_eq!(agg.max_response_time, 30.0);
        assert_eq!(agg.total_db_queries, 15);
        assert!((agg.avg_db_queries - 5.0).abs() < 1e-9);
        assert_eq!(agg.cache_hits, 24);
        assert_eq!(agg.cache_misses, 6);
        assert!((agg.cache_hit_rate - 80.0).abs() < 1e-9);
    }

    #[test]
    fn clean_run_scores_100() {
        let agg = JobAggregates {
            avg_response_time: 50.0,
            min_response_time: 40.0,
            max_response_time: 60.0,
            avg_db_queries: 10.0,
            cache_hits: 90,
            cache_misses: 10,
            cache_hit_rate: 90.0,
            ..JobAggregates::default()
        };
        let report = generate(&agg, 0);
        assert_eq!(report.score, 100);
        assert_eq!(report.grade, 'A');
        assert_eq!(report.status, "Excellent");
        assert!(report.bottlenecks.is_empty());
    }

    #[test]
    fn critical_response_time_drops_score() {
        let agg = JobAggregates {
            avg_response_time: 600.0,
            min_response_time: 550.0,
            max_response_time: 650.0,
            avg_db_queries: 10.0,
            ..JobAggregates::default()
        };
        let report = generate(&agg, 0);
        assert_eq!(report.critical_issues, 1);
        assert_eq!(report.score, 85);
        assert_eq!(report.grade, 'B');
    }

    #[test]
    fn hit_rate_ignored_without_activity() {
        let agg = JobAggregates {
            avg_response_time: 50.0,
            min_response_time: 45.0,
            max_response_time: 55.0,
            cache_hit_rate: 0.0,
            ..JobAggregates::default()
        };
        let report = generate(&agg, 0);
        assert!(report
            .bottlenecks
            .iter()
            .all(|b| b.category != "cache_hit_rate"));
    }

    #[test]
    fn low_hit_rate_with_activity_is_critical() {
        let agg = JobAggregates {
            avg_response_time: 50.0,
            min_response_time: 45.0,
            max_response_time: 55.0,
            cache_hits: 10,
            cache_misses: 90,
            cache_hit_rate: 10.0,
            ..JobAggregates::default()
        };
        let report = generate(&agg, 0);
        assert!(report
            .bottlenecks
            .iter()
            .any(|b| b.category == "cache_hit_rate" && b.severity == Severity::Critical));
    }

    #[test]
    fn variance_warning_fires_on_wide_swing() {
        let agg = JobAggregates {
            avg_response_time: 100.0,
            min_response_time: 10.0,
            max_response_time: 400.0,
            ..JobAggregates::default()
        };
        let report = generate(&agg, 0);
        assert!(report
            .bottlenecks
            .iter()
            .any(|b| b.category == "response_variance"));
    }

    #[test]
    fn heavy_degradation_earns_an_f() {
        let agg = JobAggregates {
            avg_response_time: 900.0,
            min_response_time: 10.0,
            max_response_time: 2000.0,
            avg_db_queries: 150.0,
            cache_hits: 1,
            cache_misses: 99,
            cache_hit_rate: 1.0,
            ..JobAggregates::default()
        };
        let report = generate(&agg, 100);
        // 4 criticals (response, queries, hit rate, slow) + variance warning.
        assert_eq!(report.score, 35);
        assert_eq!(report.grade, 'F');
        assert_eq!(report.status, "Critical");
    }

    #[test]
    fn criticals_sort_first() {
        let agg = JobAggregates {
            avg_response_time: 600.0,
            min_response_time: 10.0,
            max_response_time: 2000.0,
            ..JobAggregates::default()
        };
        let report = generate(&agg, 0);
        assert!(report.bottlenecks.len() >= 2);
        assert_eq!(report.bottlenecks[0].severity, Severity::Critical);
    }
}
