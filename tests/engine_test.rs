use std::sync::Arc;

use tempfile::TempDir;

use cache_bench::cache::ObjectCache;
use cache_bench::db::BenchDb;
use cache_bench::engine::chunk::EngineContext;
use cache_bench::engine::{ChunkOutcome, JobConfig, JobStatus, StartRequest, WorkloadOptions};
use cache_bench::error::BenchError;
use cache_bench::resource::ResourceSensor;

fn engine_with(dir: &TempDir, cache_enabled: bool) -> (EngineContext, Arc<BenchDb>) {
    let db = Arc::new(BenchDb::new(dir.path()).unwrap());
    let cache = Arc::new(ObjectCache::new(cache_enabled));
    let sensor = Arc::new(ResourceSensor::new());
    let engine = EngineContext::new(
        db.clone(),
        cache,
        sensor,
        dir.path().join("scratch"),
        cache_enabled,
    );
    (engine, db)
}

fn start(engine: &EngineContext, duration: &str, options: Option<WorkloadOptions>) -> String {
    engine
        .start_job(&StartRequest {
            duration: duration.to_string(),
            name: None,
            options,
        })
        .unwrap()
        .id
}

fn drive_to_terminal(engine: &EngineContext, id: &str) -> ChunkOutcome {
    for _ in 0..200 {
        let outcome = engine.process_chunk(id).unwrap();
        if outcome.status.is_terminal() {
            return outcome;
        }
    }
    panic!("job never reached a terminal state");
}

#[test]
fn quick_job_runs_exactly_its_iterations() {
    let dir = TempDir::new().unwrap();
    let (engine, db) = engine_with(&dir, true);
    let id = start(&engine, "quick", None);

    let outcome = drive_to_terminal(&engine, &id);
    assert_eq!(outcome.status, JobStatus::Completed);
    assert_eq!(outcome.total_completed, 10);

    let metrics = db.get_metrics(&id).unwrap();
    assert_eq!(metrics.len(), 10);
    for (i, m) in metrics.iter().enumerate() {
        assert_eq!(m.iteration, i as i64 + 1, "iterations must be gapless");
    }

    let job = db.get_job(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert!(job.completed_at.is_some());
    assert!(job.avg_response_time.is_some());
    assert!(job.report().is_some());
}

#[test]
fn all_optional_phases_run_in_declared_order() {
    let dir = TempDir::new().unwrap();
    let (engine, db) = engine_with(&dir, true);
    let options = WorkloadOptions {
        create_posts: true,
        read_api: true,
        reload_options: true,
        simulate_cron: true,
        posts: Some(20),
        api_reads: Some(10),
        option_reloads: Some(5),
        cron_writes: Some(2),
        ..Default::default()
    };
    let id = start(&engine, "quick", Some(options));

    let job = db.get_job(&id).unwrap().unwrap();
    assert_eq!(job.total_iterations, 10 + 20 + 10 + 5 + 2);

    let mut last_remaining = usize::MAX;
    let final_outcome = loop {
        let outcome = engine.process_chunk(&id).unwrap();
        assert!(
            outcome.phases_remaining <= last_remaining,
            "phases only ever advance"
        );
        last_remaining = outcome.phases_remaining;
        if outcome.status.is_terminal() {
            break outcome;
        }
    };

    assert_eq!(final_outcome.status, JobStatus::Completed);
    assert_eq!(final_outcome.total_completed, 47);
    assert_eq!(db.get_metrics(&id).unwrap().len(), 47);

    // Post-creation artifacts are cleaned up at finalize.
    assert!(db.list_post_ids(100).unwrap().is_empty());
}

#[test]
fn chunk_budget_bounds_one_poll() {
    let dir = TempDir::new().unwrap();
    let (engine, db) = engine_with(&dir, true);
    let mut engine = engine;
    engine.chunk_max_items = 3;

    let id = start(&engine, "quick", None);
    let outcome = engine.process_chunk(&id).unwrap();
    assert_eq!(outcome.status, JobStatus::Running);
    assert_eq!(outcome.total_completed, 3);
    assert_eq!(db.get_metrics(&id).unwrap().len(), 3);

    // Stop between polls: the next poll finalizes without more work.
    assert!(db.request_stop(&id).unwrap());
    let outcome = engine.process_chunk(&id).unwrap();
    assert_eq!(outcome.status, JobStatus::Stopped);
    assert_eq!(db.get_metrics(&id).unwrap().len(), 3);

    let job = db.get_job(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Stopped);
    assert!(job.report().is_some(), "stopped jobs still get a report");
}

#[test]
fn terminal_polls_are_idempotent() {
    let dir = TempDir::new().unwrap();
    let (engine, db) = engine_with(&dir, true);
    let id = start(&engine, "quick", None);
    drive_to_terminal(&engine, &id);

    let before = db.get_metrics(&id).unwrap().len();
    for _ in 0..3 {
        let outcome = engine.process_chunk(&id).unwrap();
        assert_eq!(outcome.status, JobStatus::Completed);
    }
    assert_eq!(db.get_metrics(&id).unwrap().len(), before);
}

#[test]
fn unknown_duration_is_rejected() {
    let dir = TempDir::new().unwrap();
    let (engine, _db) = engine_with(&dir, true);
    let err = engine
        .start_job(&StartRequest {
            duration: "3min".into(),
            name: None,
            options: None,
        })
        .unwrap_err();
    assert!(matches!(err, BenchError::InvalidDuration(_)));
}

#[test]
fn polling_a_missing_job_is_an_error() {
    let dir = TempDir::new().unwrap();
    let (engine, _db) = engine_with(&dir, true);
    let err = engine.process_chunk("no-such-job").unwrap_err();
    assert!(matches!(err, BenchError::JobNotFound(_)));
}

#[test]
fn stop_before_first_poll_finalizes_empty() {
    let dir = TempDir::new().unwrap();
    let (engine, db) = engine_with(&dir, true);
    let id = start(&engine, "quick", None);

    assert!(db.request_stop(&id).unwrap());
    let outcome = engine.process_chunk(&id).unwrap();
    assert_eq!(outcome.status, JobStatus::Stopped);
    assert_eq!(outcome.total_completed, 0);
    assert!(db.get_metrics(&id).unwrap().is_empty());
    assert!(db.get_job(&id).unwrap().unwrap().report().is_some());
}

#[test]
fn expired_time_ceiling_completes_the_job() {
    let dir = TempDir::new().unwrap();
    let (engine, db) = engine_with(&dir, true);
    let id = start(&engine, "quick", None);

    // Age the job past its wall-clock ceiling.
    let job = db.get_job(&id).unwrap().unwrap();
    let mut config = JobConfig::from_json(&job.config_json).unwrap();
    config.max_end_time = chrono::Utc::now().timestamp() - 1;
    db.update_progress(&id, &job.current_phase, 0, &config.to_json().unwrap())
        .unwrap();

    let outcome = engine.process_chunk(&id).unwrap();
    assert_eq!(outcome.status, JobStatus::Completed);
    assert_eq!(outcome.total_completed, 0);
}

#[test]
fn repeated_work_unit_failures_fail_the_job() {
    let dir = TempDir::new().unwrap();
    let db = Arc::new(BenchDb::new(dir.path()).unwrap());
    let cache = Arc::new(ObjectCache::new(true));
    let sensor = Arc::new(ResourceSensor::new());

    // A plain file where the scratch directory should be makes every cron
    // work unit fail.
    let bogus_scratch = dir.path().join("scratch");
    std::fs::write(&bogus_scratch, b"not a directory").unwrap();
    let mut engine = EngineContext::new(db.clone(), cache, sensor, bogus_scratch, true);
    engine.chunk_max_items = 50;

    let options = WorkloadOptions {
        simulate_cron: true,
        cron_writes: Some(2),
        ..Default::default()
    };
    let id = start(&engine, "quick", Some(options));

    let outcome = drive_to_terminal(&engine, &id);
    assert_eq!(outcome.status, JobStatus::Failed);

    // The page-load phase completed; only cron units failed.
    assert_eq!(db.get_metrics(&id).unwrap().len(), 10);
    let job = db.get_job(&id).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.report().is_some(), "failed jobs still get a report");
}

#[test]
fn interleaved_jobs_keep_their_own_cache_setting() {
    let dir = TempDir::new().unwrap();
    let (engine, db) = engine_with(&dir, true);
    let mut engine = engine;
    engine.chunk_max_items = 3;

    let options = WorkloadOptions {
        cache_enabled: false,
        ..Default::default()
    };
    let off_id = start(&engine, "quick", Some(options));
    engine.process_chunk(&off_id).unwrap();

    // A second, cache-on job flips the shared flag between the first job's
    // chunks.
    let on_id = start(&engine, "quick", None);
    engine.process_chunk(&on_id).unwrap();

    let outcome = drive_to_terminal(&engine, &off_id);
    assert_eq!(outcome.status, JobStatus::Completed);
    let hits: i64 = db
        .get_metrics(&off_id)
        .unwrap()
        .iter()
        .map(|m| m.cache_hits)
        .sum();
    assert_eq!(hits, 0, "a cache-disabled run must miss on every lookup");

    let off_job = db.get_job(&off_id).unwrap().unwrap();
    assert_eq!(off_job.cache_hit_rate.unwrap(), 0.0);

    // The cache-on job still records hits once its own chunks run.
    drive_to_terminal(&engine, &on_id);
    let on_job = db.get_job(&on_id).unwrap().unwrap();
    assert!(on_job.cache_hit_rate.unwrap() > 0.0);
}

#[test]
fn cache_setting_shapes_hit_rate() {
    let dir = TempDir::new().unwrap();
    let (engine, db) = engine_with(&dir, true);
    let id = start(&engine, "quick", None);
    drive_to_terminal(&engine, &id);
    let with_cache = db.get_job(&id).unwrap().unwrap();
    assert!(with_cache.cache_hit_rate.unwrap() > 0.0);

    let dir2 = TempDir::new().unwrap();
    let (engine2, db2) = engine_with(&dir2, false);
    let id2 = start(&engine2, "quick", None);
    drive_to_terminal(&engine2, &id2);
    let without_cache = db2.get_job(&id2).unwrap().unwrap();
    assert_eq!(without_cache.cache_hit_rate.unwrap(), 0.0);
    assert!(without_cache.cache_misses.unwrap() > 0);
}
