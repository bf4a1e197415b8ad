use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use crate::comparison::{CacheTotals, ComparisonEngine, JobSeries, JobSummary, SeriesMetric};
use crate::error::BenchError;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    /// 2 to 5 job ids; the first completed one is the baseline unless
    /// `baseline` overrides it.
    pub ids: Vec<String>,
    #[serde(default)]
    pub baseline: Option<String>,
    /// Optional metric name to include per-iteration series for.
    #[serde(default)]
    pub series: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    pub baseline: String,
    pub summary: Vec<JobSummary>,
    pub cache_totals: Vec<CacheTotals>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub series: Option<Vec<JobSeries>>,
}

pub async fn compare(
    State(state): State<SharedState>,
    Json(req): Json<CompareRequest>,
) -> Result<Json<CompareResponse>, BenchError> {
    let mut engine = ComparisonEngine::load(&state.db, &req.ids)?;
    if let Some(baseline) = &req.baseline {
        engine.set_baseline(baseline)?;
    }

    let series = match &req.series {
        Some(name) => Some(engine.series(SeriesMetric::parse(name)?)),
        None => None,
    };

    Ok(Json(CompareResponse {
        baseline: engine.baseline_id().to_string(),
        summary: engine.summary(),
        cache_totals: engine.cache_totals(),
        series,
    }))
}
