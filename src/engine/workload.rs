use rand::Rng;
use std::path::Path;
use std::time::Instant;

use super::PhaseKind;
use crate::cache::ObjectCache;
use crate::config::CRON_FILE_BYTES;
use crate::db::BenchDb;
use crate::error::BenchError;
use crate::resource::ResourceSensor;

/// The option set the page-load and options-reload workloads sweep, modeled
/// on the autoloaded settings a typical CMS front page touches.
pub const OPTION_NAMES: &[&str] = &[
    "siteurl",
    "home",
    "blogname",
    "blogdescription",
    "admin_email",
    "users_can_register",
    "posts_per_page",
    "date_format",
    "time_format",
    "start_of_week",
    "timezone_string",
    "active_plugins",
    "template",
    "stylesheet",
    "sidebars_widgets",
    "widget_text",
    "widget_categories",
];

/// Uniform result shape every executor returns; one of these becomes one
/// metric row.
#[derive(Debug, Clone, Default)]
pub struct WorkMetrics {
    pub response_time_ms: f64,
    pub memory_bytes: i64,
    pub db_queries: i64,
    pub cpu_percent: f64,
    pub ram_bytes: i64,
    pub disk_read: i64,
    pub disk_write: i64,
    pub cache_hits: i64,
    pub cache_misses: i64,
    pub created_resource_id: Option<i64>,
}

/// Explicit per-invocation context: no executor reaches for global state.
pub struct WorkloadContext<'a> {
    pub db: &'a BenchDb,
    pub cache: &'a ObjectCache,
    pub sensor: &'a ResourceSensor,
    pub scratch_dir: &'a Path,
}

/// Dispatch a work unit by phase kind. `seq` is the zero-based sequence
/// number within the phase.
pub fn execute(
    ctx: &WorkloadContext<'_>,
    kind: PhaseKind,
    seq: u64,
) -> Result<WorkMetrics, BenchError> {
    match kind {
        PhaseKind::PageLoad => page_load(ctx, seq),
        PhaseKind::CreatePost => create_post(ctx, seq),
        PhaseKind::ReadApi => read_api(ctx, seq),
        PhaseKind::ReloadOptions => reload_options(ctx, seq),
        PhaseKind::SimulateCron => simulate_cron(ctx, seq),
    }
}

/// Read one option through the cache, falling back to the database on a
/// miss. Returns the number of database queries issued (0 or 1).
fn read_option(ctx: &WorkloadContext<'_>, name: &str) -> Result<i64, BenchError> {
    if ctx.cache.get(name).is_some() {
        return Ok(0);
    }
    if let Some(value) = ctx.db.get_option(name)? {
        ctx.cache.put(name, &value);
    }
    Ok(1)
}

/// Wrap a timed body, attaching a sensor snapshot and the cache activity it
/// produced.
fn measured<F>(ctx: &WorkloadContext<'_>, body: F) -> Result<WorkMetrics, BenchError>
where
    F: FnOnce(&mut WorkMetrics) -> Result<(), BenchError>,
{
    ctx.cache.take_counts();
    let start = Instant::now();

    let mut metrics = WorkMetrics::default();
    body(&mut metrics)?;

    metrics.response_time_ms = start.elapsed().as_secs_f64() * 1000.0;
    let (hits, misses) = ctx.cache.take_counts();
    metrics.cache_hits = hits as i64;
    metrics.cache_misses = misses as i64;

    let snap = ctx.sensor.snapshot();
    metrics.cpu_percent = snap.cpu_percent;
    metrics.ram_bytes = snap.ram_bytes as i64;
    metrics.memory_bytes = snap.process_memory_bytes as i64;
    metrics.disk_read += snap.disk_read_bytes as i64;
    metrics.disk_write += snap.disk_write_bytes as i64;
    Ok(metrics)
}

/// One simulated front-page render: the autoloaded option sweep, a recent
/// posts listing with meta, and a transient lookup that is cold by design.
fn page_load(ctx: &WorkloadContext<'_>, _seq: u64) -> Result<WorkMetrics, BenchError> {
    measured(ctx, |m| {
        for name in OPTION_NAMES {
            m.db_queries += read_option(ctx, name)?;
        }

        let ids = ctx.db.list_post_ids(10)?;
        m.db_queries += 1;
        for id in ids {
            ctx.db.get_post_meta(id)?;
            m.db_queries += 1;
        }

        let transient = format!("transient_{}", rand::thread_rng().gen_range(1..=100));
        let _ = ctx.cache.get(&transient);
        Ok(())
    })
}

fn create_post(ctx: &WorkloadContext<'_>, seq: u64) -> Result<WorkMetrics, BenchError> {
    measured(ctx, |m| {
        let title = format!("Benchmark Test Post {} - {}", seq + 1, uuid::Uuid::new_v4());
        let content = random_content();
        let post_id = ctx.db.insert_post(&title, &content)?;
        m.db_queries += 1;

        for n in 1..=5 {
            ctx.db.insert_post_meta(
                post_id,
                &format!("benchmark_meta_{n}"),
                &uuid::Uuid::new_v4().to_string(),
            )?;
            m.db_queries += 1;
        }

        m.created_resource_id = Some(post_id);
        Ok(())
    })
}

/// Read back one previously created post (round-robin over what exists);
/// falls back to an options scan when the post-creation phase was skipped.
fn read_api(ctx: &WorkloadContext<'_>, seq: u64) -> Result<WorkMetrics, BenchError> {
    measured(ctx, |m| {
        let ids = ctx.db.list_post_ids(50)?;
        m.db_queries += 1;

        if ids.is_empty() {
            ctx.db.list_options(100)?;
            m.db_queries += 1;
            return Ok(());
        }

        let id = ids[(seq as usize) % ids.len()];
        ctx.db.get_post(id)?;
        ctx.db.get_post_meta(id)?;
        m.db_queries += 2;
        Ok(())
    })
}

/// Flush the object cache, then read the option set twice: the first pass
/// misses and repopulates, the second measures what the cache gives back.
fn reload_options(ctx: &WorkloadContext<'_>, _seq: u64) -> Result<WorkMetrics, BenchError> {
    measured(ctx, |m| {
        ctx.cache.flush();
        for name in OPTION_NAMES {
            m.db_queries += read_option(ctx, name)?;
        }
        for name in OPTION_NAMES {
            if ctx.cache.get(name).is_none() {
                if ctx.db.get_option(name)?.is_some() {
                    m.db_queries += 1;
                }
            }
        }
        Ok(())
    })
}

/// One cron-style scratch-file write under the data directory.
fn simulate_cron(ctx: &WorkloadContext<'_>, _seq: u64) -> Result<WorkMetrics, BenchError> {
    measured(ctx, |m| {
        std::fs::create_dir_all(ctx.scratch_dir)?;
        let path = ctx
            .scratch_dir
            .join(format!("cron_{}.tmp", uuid::Uuid::new_v4()));

        let mut rng = rand::thread_rng();
        let byte: u8 = rng.gen_range(b'A'..=b'Z');
        let data = vec![byte; CRON_FILE_BYTES];
        std::fs::write(&path, &data)?;

        m.disk_write += CRON_FILE_BYTES as i64;
        Ok(())
    })
}

const LOREM_WORDS: &[&str] = &[
    "lorem",
    "ipsum",
    "dolor",
    "sit",
    "amet",
    "consectetur",
    "adipiscing",
    "elit",
    "sed",
    "do",
    "eiusmod",
    "tempor",
    "incididunt",
    "ut",
    "labore",
];

fn random_content() -> String {
    let mut rng = rand::thread_rng();
    let paragraphs = rng.gen_range(2..=4);
    let mut content = String::new();

    for _ in 0..paragraphs {
        content.push_str("<p>");
        let sentences = rng.gen_range(3..=5);
        for _ in 0..sentences {
            let words = rng.gen_range(6..=12);
            for w in 0..words {
                let word = LOREM_WORDS[rng.gen_range(0..LOREM_WORDS.len())];
                if w == 0 {
                    let mut chars = word.chars();
                    if let Some(first) = chars.next() {
                        content.push(first.to_ascii_uppercase());
                        content.push_str(chars.as_str());
                    }
                } else {
                    content.push(' ');
                    content.push_str(word);
                }
            }
            content.push_str(". ");
        }
        content.push_str("</p>");
    }

    content
}
