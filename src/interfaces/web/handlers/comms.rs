use axum::extract::rejection::JsonRejection;
use axum::{Json, extract::State};

use super::super::AppState;
use crate::core::relay::RelayOutcome;

#[derive(serde::Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    target: Option<String>,
}

/// Operator chat relayed to one agent. Domain failures come back with
/// `ok: false` and HTTP 200; a timed-out relay is a provisional success
/// because the agent may still answer over its notification channel.
pub async fn assistant_chat(
    State(state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Json<serde_json::Value> {
    let Ok(Json(payload)) = payload else {
        return Json(serde_json::json!({
            "ok": false,
            "error": "request body must be a JSON object"
        }));
    };
    let (Some(message), Some(target)) = (payload.message, payload.target) else {
        return Json(serde_json::json!({
            "ok": false,
            "error": "message and target are required"
        }));
    };
    if message.trim().is_empty() || target.trim().is_empty() {
        return Json(serde_json::json!({
            "ok": false,
            "error": "message and target are required"
        }));
    }

    match state.relay.send_to_agent(target.trim(), message.trim()).await {
        RelayOutcome::Confirmed { reply, raw } => Json(serde_json::json!({
            "ok": true,
            "reply": reply,
            "source": "agent",
            "raw": raw,
        })),
        RelayOutcome::Provisional => Json(serde_json::json!({
            "ok": true,
            "reply": "Message accepted; the agent is still processing and will reply over its notification channel.",
            "source": "provisional",
            "raw": "",
        })),
        RelayOutcome::Failed { output } => Json(serde_json::json!({
            "ok": false,
            "reply": output,
            "source": "error",
            "raw": output,
        })),
    }
}

#[derive(serde::Deserialize)]
pub struct SendRequest {
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

pub async fn send_comm(
    State(state): State<AppState>,
    payload: Result<Json<SendRequest>, JsonRejection>,
) -> Json<serde_json::Value> {
    let Ok(Json(payload)) = payload else {
        return Json(serde_json::json!({
            "ok": false,
            "output": "request body must be a JSON object"
        }));
    };
    let (Some(target), Some(message)) = (payload.target, payload.message) else {
        return Json(serde_json::json!({
            "ok": false,
            "output": "target and message are required"
        }));
    };
    if target.trim().is_empty() || message.trim().is_empty() {
        return Json(serde_json::json!({
            "ok": false,
            "output": "target and message are required"
        }));
    }

    let outcome = state.relay.relay(target.trim(), message.trim()).await;
    let output = match &outcome {
        RelayOutcome::Confirmed { reply, .. } => reply.clone(),
        RelayOutcome::Provisional => "Relay dispatched; delivery is still in flight.".to_string(),
        RelayOutcome::Failed { output } => output.clone(),
    };
    Json(serde_json::json!({ "ok": outcome.ok(), "output": output }))
}

pub async fn list_comms(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "comms": state.relay.comms() }))
}
