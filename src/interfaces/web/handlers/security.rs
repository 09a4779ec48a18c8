use axum::extract::rejection::JsonRejection;
use axum::{Json, extract::State};

use super::super::AppState;
use crate::core::security::ApplyReport;

pub async fn get_security(State(state): State<AppState>) -> Json<serde_json::Value> {
    let checks = state.auditor.checklist().await;
    let ufw_rules = state.auditor.ufw_rules().await;
    Json(serde_json::json!({ "checks": checks, "ufwRules": ufw_rules }))
}

pub async fn apply_action(
    State(state): State<AppState>,
    payload: Result<Json<super::ApplyRequest>, JsonRejection>,
) -> Json<serde_json::Value> {
    let Some(action) = super::require_action(payload) else {
        return Json(serde_json::json!({ "ok": false, "error": "action is required" }));
    };
    Json(report_json(state.auditor.apply(&action).await))
}

pub async fn get_actions(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "actions": state.auditor.applied_actions() }))
}

/// Shared response shape for the apply-endpoints; `manual` appears only
/// for instruction-style actions.
pub(crate) fn report_json(report: ApplyReport) -> serde_json::Value {
    let mut body = serde_json::json!({
        "ok": report.ok,
        "action": report.action,
        "output": report.output,
        "timestamp": report.timestamp,
    });
    if report.manual {
        body["manual"] = serde_json::Value::Bool(true);
    }
    body
}
