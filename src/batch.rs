//! Concurrent evaluation of several charts over one aggregation document.

use crate::analysis::ChartEngine;
use crate::error::ChartResult;
use crate::models::{ChartConfig, ChartSeries, RequestContext};
use anyhow::{anyhow, Result};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Outcome of one chart in a batch, in input order.
#[derive(Debug)]
pub struct ChartOutcome {
    pub chart: ChartConfig,
    pub result: ChartResult<ChartSeries>,
}

/// Evaluate `charts` on the blocking pool, at most `concurrency` at a time.
///
/// Results keep the order of `charts`. Only a panicked or cancelled task
/// fails the whole batch; chart errors are reported per outcome.
pub async fn evaluate_all(
    engine: Arc<ChartEngine>,
    request: Arc<RequestContext>,
    aggregations: Arc<Value>,
    charts: Vec<ChartConfig>,
    concurrency: usize,
) -> Result<Vec<ChartOutcome>> {
    debug!("Evaluating {} charts, concurrency {}", charts.len(), concurrency);

    let tasks = charts.into_iter().map(|chart| {
        let engine = Arc::clone(&engine);
        let request = Arc::clone(&request);
        let aggregations = Arc::clone(&aggregations);
        tokio::task::spawn_blocking(move || {
            let result = engine.evaluate(&request, &chart, &aggregations);
            ChartOutcome { chart, result }
        })
    });

    stream::iter(tasks)
        .buffered(concurrency.max(1))
        .map(|joined| joined.map_err(|e| anyhow!("chart evaluation task failed: {}", e)))
        .collect::<Vec<_>>()
        .await
        .into_iter()
        .collect()
}
