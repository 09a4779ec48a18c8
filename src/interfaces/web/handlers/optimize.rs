use axum::extract::rejection::JsonRejection;
use axum::{Json, extract::State};

use super::super::AppState;
use super::security::report_json;

pub async fn apply_action(
    State(state): State<AppState>,
    payload: Result<Json<super::ApplyRequest>, JsonRejection>,
) -> Json<serde_json::Value> {
    let Some(action) = super::require_action(payload) else {
        return Json(serde_json::json!({ "ok": false, "error": "action is required" }));
    };
    Json(report_json(state.optimizer.apply(&action)))
}

pub async fn get_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "applied": state.optimizer.applied_actions() }))
}
