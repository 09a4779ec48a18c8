use axum::{Json, extract::State};

use super::super::AppState;

pub async fn get_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.status.health().await)
}

pub async fn get_cron(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.config.load_cron_jobs())
}

pub async fn get_agents(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.status.agents())
}

pub async fn get_usage(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.status.usage())
}

pub async fn get_subagents(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.status.subagents())
}

pub async fn get_market(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(state.config.load_market())
}
