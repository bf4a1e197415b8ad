use chrono::Utc;

use cache_bench::comparison::{ComparisonEngine, SeriesMetric};
use cache_bench::db::{BenchDb, JobAggregates};
use cache_bench::engine::{
    DurationProfile, JobConfig, JobRecord, JobStatus, MetricRow, WorkloadOptions,
};
use cache_bench::error::BenchError;

fn seed_job(db: &BenchDb, id: &str, status: JobStatus, avg_response_time: f64) {
    let profile = DurationProfile::resolve("quick").unwrap();
    let config = JobConfig::build(profile, WorkloadOptions::default(), Utc::now().timestamp());
    let job = JobRecord {
        id: id.to_string(),
        name: format!("run {id}"),
        test_type: "quick".into(),
        status: JobStatus::Pending,
        current_phase: "Benchmark Iterations".into(),
        current_iteration: 0,
        total_iterations: 10,
        stop_requested: false,
        config_json: config.to_json().unwrap(),
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
        started_at: Utc::now().to_rfc3339(),
        completed_at: None,
    };
    db.insert_job(&job).unwrap();

    if status.is_terminal() {
        let agg = JobAggregates {
            avg_response_time,
            min_response_time: avg_response_time * 0.8,
            max_response_time: avg_response_time * 1.2,
            avg_memory_usage: 32 * 1024 * 1024,
            peak_memory_usage: 48 * 1024 * 1024,
            avg_db_queries: 12.0,
            total_db_queries: 120,
            cache_hits: 80,
            cache_misses: 20,
            cache_hit_rate: 80.0,
            avg_cpu_usage: 25.0,
        };
        db.finalize_job(id, status, 10, &config.to_json().unwrap(), &agg, "{}")
            .unwrap();
    }
}

fn seed_metrics(db: &BenchDb, id: &str, response_times: &[f64]) {
    for (i, rt) in response_times.iter().enumerate() {
        db.append_metric(
            id,
            &MetricRow {
                iteration: i as i64 + 1,
                response_time: *rt,
                memory_usage: 1024,
                db_queries: 5,
                cpu_usage: 10.0,
                ram_usage: 0,
                disk_read: 0,
                disk_write: 0,
                cache_hits: 4,
                cache_misses: 1,
                timestamp: Utc::now().to_rfc3339(),
            },
        )
        .unwrap();
    }
}

#[test]
fn baseline_relative_diffs() {
    let db = BenchDb::open_in_memory().unwrap();
    seed_job(&db, "a", JobStatus::Completed, 245.32);
    seed_job(&db, "b", JobStatus::Completed, 89.45);
    seed_job(&db, "c", JobStatus::Completed, 67.89);

    let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
    let engine = ComparisonEngine::load(&db, &ids).unwrap();
    assert_eq!(engine.baseline_id(), "a");

    let summary = engine.summary();
    assert_eq!(summary.len(), 3);

    let base = &summary[0];
    assert!(base.is_baseline);
    assert_eq!(base.avg_response_time.diff, None);
    assert_eq!(base.avg_response_time.diff_percent, None);

    assert_eq!(summary[1].avg_response_time.diff_percent, Some(-63.5));
    assert_eq!(summary[1].avg_response_time.is_improvement, Some(true));
    assert_eq!(summary[2].avg_response_time.diff_percent, Some(-72.3));
}

#[test]
fn baseline_can_be_reassigned() {
    let db = BenchDb::open_in_memory().unwrap();
    seed_job(&db, "a", JobStatus::Completed, 100.0);
    seed_job(&db, "b", JobStatus::Completed, 200.0);

    let ids = vec!["a".to_string(), "b".to_string()];
    let mut engine = ComparisonEngine::load(&db, &ids).unwrap();
    engine.set_baseline("b").unwrap();
    assert_eq!(engine.baseline_id(), "b");

    let summary = engine.summary();
    assert!(summary[1].is_baseline);
    // 100 vs a 200ms baseline is a 50% improvement.
    assert_eq!(summary[0].avg_response_time.diff_percent, Some(-50.0));
    assert_eq!(summary[0].avg_response_time.is_improvement, Some(true));

    assert!(matches!(
        engine.set_baseline("nope"),
        Err(BenchError::JobNotFound(_))
    ));
}

#[test]
fn selection_count_limits() {
    let db = BenchDb::open_in_memory().unwrap();
    seed_job(&db, "a", JobStatus::Completed, 100.0);

    let err = ComparisonEngine::load(&db, &["a".to_string()]).unwrap_err();
    assert!(matches!(err, BenchError::InvalidSelectionCount(1)));

    let six: Vec<String> = (0..6).map(|i| format!("job-{i}")).collect();
    let err = ComparisonEngine::load(&db, &six).unwrap_err();
    assert!(matches!(err, BenchError::InvalidSelectionCount(6)));
}

#[test]
fn unfinished_jobs_are_excluded() {
    let db = BenchDb::open_in_memory().unwrap();
    seed_job(&db, "done", JobStatus::Completed, 100.0);
    seed_job(&db, "running", JobStatus::Pending, 0.0);
    seed_job(&db, "stopped", JobStatus::Stopped, 50.0);

    let ids = vec![
        "done".to_string(),
        "running".to_string(),
        "stopped".to_string(),
        "missing".to_string(),
    ];
    let err = ComparisonEngine::load(&db, &ids).unwrap_err();
    assert!(matches!(err, BenchError::InsufficientCompletedResults(1)));
}

#[test]
fn identical_values_are_not_an_improvement() {
    let db = BenchDb::open_in_memory().unwrap();
    seed_job(&db, "a", JobStatus::Completed, 100.0);
    seed_job(&db, "b", JobStatus::Completed, 100.0);

    let engine =
        ComparisonEngine::load(&db, &["a".to_string(), "b".to_string()]).unwrap();
    let summary = engine.summary();
    // Identical hit rates: zero diff is not an improvement.
    assert_eq!(summary[1].cache_hit_rate.diff, Some(0.0));
    assert_eq!(summary[1].cache_hit_rate.is_improvement, Some(false));
}

#[test]
fn series_carries_per_iteration_values_and_stats() {
    let db = BenchDb::open_in_memory().unwrap();
    seed_job(&db, "a", JobStatus::Completed, 100.0);
    seed_job(&db, "b", JobStatus::Completed, 100.0);
    seed_metrics(&db, "a", &[10.0, 20.0, 30.0, 40.0, 50.0]);
    seed_metrics(&db, "b", &[5.0, 5.0, 5.0]);

    let engine =
        ComparisonEngine::load(&db, &["a".to_string(), "b".to_string()]).unwrap();
    let series = engine.series(SeriesMetric::ResponseTime);
    assert_eq!(series.len(), 2);
    assert_eq!(series[0].values, vec![10.0, 20.0, 30.0, 40.0, 50.0]);
    assert_eq!(series[0].stats.median, 30.0);
    assert_eq!(series[0].stats.max, 50.0);
    assert_eq!(series[1].stats.std_dev, 0.0);

    assert!(matches!(
        SeriesMetric::parse("wallclock"),
        Err(BenchError::UnknownMetric(_))
    ));
}

#[test]
fn cache_totals_come_from_job_aggregates() {
    let db = BenchDb::open_in_memory().unwrap();
    seed_job(&db, "a", JobStatus::Completed, 100.0);
    seed_job(&db, "b", JobStatus::Completed, 100.0);

    let engine =
        ComparisonEngine::load(&db, &["a".to_string(), "b".to_string()]).unwrap();
    let totals = engine.cache_totals();
    assert_eq!(totals[0].hits, 80);
    assert_eq!(totals[0].misses, 20);
    assert_eq!(totals[0].total, 100);
    assert!((totals[0].hit_rate - 80.0).abs() < 1e-9);
}
