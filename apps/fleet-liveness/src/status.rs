//! 只读状态接口（仅查询内存注册表，不访问存储）。

use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
};
use fleet_registry::LivenessRegistry;
use serde::Serialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<LivenessRegistry>,
}

#[derive(Debug, Serialize)]
struct CountResponse {
    count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OnlineResponse {
    hub_id: String,
    online: bool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/hubs/count", get(hub_count))
        .route("/hubs/:hub_id/online", get(hub_online))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

async fn hub_count(State(state): State<AppState>) -> impl IntoResponse {
    Json(CountResponse {
        count: state.registry.count(),
    })
}

async fn hub_online(
    State(state): State<AppState>,
    Path(hub_id): Path<String>,
) -> impl IntoResponse {
    let online = state.registry.is_online(&hub_id);
    Json(OnlineResponse { hub_id, online })
}
