use axum::{
    Router,
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware,
    middleware::Next,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::handlers::{comms, optimize, security, status};

fn build_localhost_cors(api_port: u16) -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        format!("http://127.0.0.1:{}", api_port),
        format!("http://localhost:{}", api_port),
    ]
    .iter()
    .filter_map(|o| o.parse().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub(crate) fn build_api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(status::get_health))
        .route("/api/cron", get(status::get_cron))
        .route("/api/agents", get(status::get_agents))
        .route("/api/usage", get(status::get_usage))
        .route("/api/subagents", get(status::get_subagents))
        .route("/api/markets/momo", get(status::get_market))
        .route("/api/assistant/chat", post(comms::assistant_chat))
        .route("/api/comms", get(comms::list_comms))
        .route("/api/comms/send", post(comms::send_comm))
        .route("/api/security", get(security::get_security))
        .route("/api/security/apply", post(security::apply_action))
        .route("/api/security/actions", get(security::get_actions))
        .route("/api/optimize/apply", post(optimize::apply_action))
        .route("/api/optimize/status", get(optimize::get_status))
        .layer(middleware::from_fn(security_headers))
        .layer(build_localhost_cors(state.api_port))
        .with_state(state)
}

async fn security_headers(req: Request<Body>, next: Next) -> axum::response::Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Paths;
    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use tempfile::TempDir;
    use tower::util::ServiceExt;

    /// Gateway stub whose broadcast tier fails and direct tier replies.
    const SPLIT_GATEWAY: &str = r#"if [ "$1" = "message" ]; then echo "broadcast down" >&2; exit 1; fi
echo '{"reply":"ack"}'"#;

    fn write_gateway(dir: &TempDir, body: &str) -> String {
        let path = dir.path().join("gateway");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path.to_str().unwrap().to_string()
    }

    fn test_router(dir: &TempDir, gateway_body: &str) -> Router {
        let paths = Paths {
            data_dir: dir.path().join("data"),
            agent_config: dir.path().join("openclaw.json"),
            cron_jobs: dir.path().join("jobs.json"),
            agents_dir: dir.path().join("agents"),
            market_file: dir.path().join("momo.json"),
            gateway_bin: write_gateway(dir, gateway_body),
            home: dir.path().to_path_buf(),
        };
        build_api_router(super::super::build_state(paths, 18790))
    }

    async fn get_json(router: &Router, uri: &str) -> Value {
        let response = router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn post_json(router: &Router, uri: &str, payload: Value) -> Value {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn post_raw(router: &Router, uri: &str, body: &str) -> Value {
        let response = router
            .clone()
            .oneshot(
                Request::builder()
                    .method(Method::POST)
                    .uri(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn malformed_json_body_gets_domain_error_not_rejection() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, "exit 0");

        for uri in [
            "/api/comms/send",
            "/api/assistant/chat",
            "/api/security/apply",
            "/api/optimize/apply",
        ] {
            let body = post_raw(&router, uri, "{not json").await;
            assert_eq!(body["ok"], false, "{uri}");
        }
    }

    #[tokio::test]
    async fn agents_joins_config_with_empty_session_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("openclaw.json"),
            r#"{"agents": [{"id": "atlas", "name": "Atlas"}], "defaultModel": "claude-sonnet"}"#,
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("agents/atlas/sessions")).unwrap();
        let router = test_router(&dir, "exit 0");

        let body = get_json(&router, "/api/agents").await;
        let agents = body["agents"].as_array().unwrap();
        assert_eq!(agents.len(), 1);
        assert_eq!(agents[0]["id"], "atlas");
        assert_eq!(agents[0]["sessionCount"], 0);
        assert_eq!(agents[0]["lastActive"], Value::Null);
        assert_eq!(body["defaultModel"], "claude-sonnet");
    }

    #[tokio::test]
    async fn comms_send_falls_back_and_records_one_command_entry() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, SPLIT_GATEWAY);

        let sent = post_json(
            &router,
            "/api/comms/send",
            json!({ "target": "hvac", "message": "ping" }),
        )
        .await;
        assert_eq!(sent["ok"], true);

        let comms = get_json(&router, "/api/comms").await;
        let command_entries: Vec<&Value> = comms["comms"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|c| c["type"] == "command")
            .collect();
        assert_eq!(command_entries.len(), 1);
        assert_eq!(command_entries[0]["to"], "hvac");
    }

    #[tokio::test]
    async fn assistant_chat_confirms_with_parsed_reply() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, r#"echo '{"reply":"all systems nominal"}'"#);

        let body = post_json(
            &router,
            "/api/assistant/chat",
            json!({ "message": "status?", "target": "atlas" }),
        )
        .await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["reply"], "all systems nominal");
        assert_eq!(body["source"], "agent");
    }

    #[tokio::test]
    async fn assistant_chat_rejects_missing_fields_with_http_200() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, "exit 0");

        let body = post_json(&router, "/api/assistant/chat", json!({ "message": "hi" })).await;
        assert_eq!(body["ok"], false);
        assert!(body["error"].as_str().unwrap().contains("target"));
    }

    #[tokio::test]
    async fn security_apply_unknown_action_fails_and_is_ledgered() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, "exit 0");

        let body = post_json(
            &router,
            "/api/security/apply",
            json!({ "action": "bogus-action" }),
        )
        .await;
        assert_eq!(body["ok"], false);
        assert_eq!(body["action"], "bogus-action");

        let actions = get_json(&router, "/api/security/actions").await;
        let records = actions["actions"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["result"], "failed");
    }

    #[tokio::test]
    async fn security_manual_action_reports_manual_flag() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, "exit 0");

        let body = post_json(
            &router,
            "/api/security/apply",
            json!({ "action": "disable-root" }),
        )
        .await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["manual"], true);
        assert!(body["output"].as_str().unwrap().contains("PermitRootLogin"));
    }

    #[tokio::test]
    async fn cron_missing_file_republishes_empty_jobs() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, "exit 0");
        assert_eq!(get_json(&router, "/api/cron").await, json!({ "jobs": [] }));
    }

    #[tokio::test]
    async fn market_passthrough_defaults_when_absent() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, "exit 0");
        let body = get_json(&router, "/api/markets/momo").await;
        assert_eq!(body["primary"]["price_usd"], "0");
    }

    #[tokio::test]
    async fn optimize_apply_then_status_round_trip() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, "exit 0");

        let body = post_json(&router, "/api/optimize/apply", json!({ "action": "cache-st" })).await;
        assert_eq!(body["ok"], true);
        assert_eq!(body["manual"], true);

        let status = get_json(&router, "/api/optimize/status").await;
        let applied = status["applied"].as_array().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0]["action"], "cache-st");
        assert_eq!(applied[0]["result"], "applied");
    }

    #[tokio::test]
    async fn usage_reports_whole_kilobytes_per_agent() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("openclaw.json"),
            r#"{"agents": [{"id": "atlas"}]}"#,
        )
        .unwrap();
        let sessions = dir.path().join("agents/atlas/sessions");
        std::fs::create_dir_all(&sessions).unwrap();
        std::fs::write(sessions.join("a.jsonl"), vec![b'x'; 2048]).unwrap();
        let router = test_router(&dir, "exit 0");

        let body = get_json(&router, "/api/usage").await;
        let usage = body["usage"].as_array().unwrap();
        assert_eq!(usage[0]["sessions"], 1);
        assert_eq!(usage[0]["totalSizeKB"], 2);
    }

    #[tokio::test]
    async fn health_never_errors_even_without_host_tools() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, "exit 0");
        let body = get_json(&router, "/api/health").await;
        assert!(body["timestamp"].as_str().is_some());
        assert!(body["loadAvg"].as_array().is_some());
    }

    #[tokio::test]
    async fn security_checklist_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir, "exit 0");
        let first = get_json(&router, "/api/security").await;
        let second = get_json(&router, "/api/security").await;
        assert_eq!(first["checks"], second["checks"]);
        assert_eq!(first["checks"].as_array().unwrap().len(), 10);
    }
}
