use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use codec_bus::{ReclamationRecord, ResourceManager};
use serde::Serialize;

pub fn codecs_router(registry: ResourceManager) -> Router {
    Router::new()
        .route("/codecs", get(list_codecs))
        .route("/memory-pressure", post(memory_pressure))
        .with_state(registry)
}

#[derive(Debug, Serialize)]
struct ReclaimResponse {
    reclaimed: Vec<String>,
    remaining: usize,
}

async fn list_codecs(State(registry): State<ResourceManager>) -> Json<Vec<ReclamationRecord>> {
    Json(registry.snapshot())
}

/// The embedding application's memory-pressure signal.
async fn memory_pressure(State(registry): State<ResourceManager>) -> Json<ReclaimResponse> {
    let reclaimed = registry.reclaim_inactive();
    log::info!("memory pressure: reclaimed {} codecs", reclaimed.len());
    Json(ReclaimResponse {
        reclaimed: reclaimed.iter().map(|h| h.to_string()).collect(),
        remaining: registry.len(),
    })
}

#[cfg(test)]
#[path = "codecs_test.rs"]
mod codecs_test;
