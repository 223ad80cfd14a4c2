use axum::extract::State;
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

use crate::error::AppError;
use crate::metrics::RATE_LIMIT_ENTRIES;
use crate::state::AppState;

pub async fn metrics_handler(State(state): State<Arc<AppState>>) -> Result<String, AppError> {
    // gauges that track live state are refreshed on scrape
    RATE_LIMIT_ENTRIES.set(state.rate_limiter.len() as f64);

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer).map_err(AppError::internal)?;
    String::from_utf8(buffer).map_err(AppError::internal)
}
