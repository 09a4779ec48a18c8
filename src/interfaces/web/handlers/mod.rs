use axum::Json;
use axum::extract::rejection::JsonRejection;

pub(crate) mod comms;
pub(crate) mod optimize;
pub(crate) mod security;
pub(crate) mod status;

#[derive(serde::Deserialize)]
pub(crate) struct ApplyRequest {
    #[serde(default)]
    action: Option<String>,
}

/// Pulls a non-empty action name out of an apply-endpoint body. An
/// unparsable body is treated the same as a missing action.
pub(crate) fn require_action(payload: Result<Json<ApplyRequest>, JsonRejection>) -> Option<String> {
    payload
        .ok()
        .and_then(|Json(body)| body.action)
        .map(|action| action.trim().to_string())
        .filter(|action| !action.is_empty())
}
