use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::cache::ObjectCache;
use crate::config::BenchConfig;
use crate::db::BenchDb;
use crate::engine::chunk::EngineContext;
use crate::resource::ResourceSensor;

pub type SharedState = Arc<AppState>;

/// Shared application state handed to every route handler.
pub struct AppState {
    pub config: BenchConfig,
    pub db: Arc<BenchDb>,
    pub cache: Arc<ObjectCache>,
    pub sensor: Arc<ResourceSensor>,
    /// One async mutex per job so concurrent polls for the same job
    /// serialize instead of double-running work units.
    poll_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AppState {
    pub fn new(config: BenchConfig) -> anyhow::Result<Self> {
        let db = Arc::new(BenchDb::new(&config.data_dir)?);
        let cache = Arc::new(ObjectCache::new(!config.no_cache));
        let sensor = Arc::new(ResourceSensor::new());
        Ok(Self {
            config,
            db,
            cache,
            sensor,
            poll_locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn engine(&self) -> EngineContext {
        EngineContext::new(
            self.db.clone(),
            self.cache.clone(),
            self.sensor.clone(),
            self.config.scratch_dir(),
            !self.config.no_cache,
        )
    }

    pub fn job_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.poll_locks
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .clone()
    }

    pub fn drop_job_lock(&self, id: &str) {
        self.poll_locks.lock().unwrap().remove(id);
    }
}
