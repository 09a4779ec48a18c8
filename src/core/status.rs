use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::{Value, json};
use tracing::debug;

use crate::core::command::CommandRunner;
use crate::core::config::{ConfigReader, Paths};

const METRIC_TIMEOUT: Duration = Duration::from_secs(15);

/// Session log files written by the agent runtime.
const SESSION_EXT: &str = "jsonl";

/// How many recent session files per agent the subagent scan inspects.
const SUBAGENT_SCAN_FILES: usize = 3;
const SUBAGENT_SCAN_LINES: usize = 40;

/// Composes ConfigReader, filesystem session scans and CommandRunner into
/// the read models served by the API. Everything here is recomputed per
/// request; nothing is cached, so a request always reflects current disk
/// and host state.
#[derive(Debug, Clone)]
pub struct StatusAggregator {
    runner: CommandRunner,
    config: ConfigReader,
    paths: Paths,
}

impl StatusAggregator {
    pub fn new(runner: CommandRunner, config: ConfigReader, paths: Paths) -> Self {
        Self {
            runner,
            config,
            paths,
        }
    }

    /// Host metrics snapshot. Each probe is an independent external tool
    /// run; malformed or absent output degrades to zeros, never an error.
    pub async fn health(&self) -> Value {
        let load = self.runner.run("uptime", &[], METRIC_TIMEOUT).await;
        let mem = self.runner.run("free", &["-m"], METRIC_TIMEOUT).await;
        let disk = self.runner.run("df", &["-h", "/"], METRIC_TIMEOUT).await;
        let up = self.runner.run("uptime", &["-p"], METRIC_TIMEOUT).await;
        let gateway = self
            .runner
            .run("pgrep", &["-f", &self.paths.gateway_bin], METRIC_TIMEOUT)
            .await;

        json!({
            "loadAvg": parse_load_average(&load.stdout),
            "memory": parse_free_mem(&mem.stdout),
            "disk": parse_disk(&disk.stdout),
            "uptime": up.text(),
            "gatewayRunning": gateway.success(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Configured agents joined with their on-disk session state. A missing
    /// session directory means zero sessions and a null lastActive.
    pub fn agents(&self) -> Value {
        let cfg = self.config.load_agent_config();
        let agents: Vec<Value> = cfg
            .agents
            .iter()
            .map(|agent| {
                let dir = self.paths.session_dir(&agent.id);
                json!({
                    "id": agent.id.clone(),
                    "name": agent.display_name(),
                    "workspace": agent.workspace.clone(),
                    "model": agent.model.clone().or_else(|| cfg.default_model.clone()),
                    "heartbeatModel": agent.heartbeat_model.clone().or_else(|| cfg.heartbeat_model.clone()),
                    "sessionCount": session_files(&dir).len(),
                    "lastActive": last_active(&dir),
                })
            })
            .collect();

        json!({
            "agents": agents,
            "defaultModel": cfg.default_model,
            "models": cfg.models,
            "heartbeatModel": cfg.heartbeat_model,
        })
    }

    /// Per-agent session counts and disk usage in whole kilobytes, plus the
    /// model catalog for cost-estimation display. An approximation, not
    /// billing data.
    pub fn usage(&self) -> Value {
        let cfg = self.config.load_agent_config();
        let usage: Vec<Value> = cfg
            .agents
            .iter()
            .map(|agent| {
                let files = session_files(&self.paths.session_dir(&agent.id));
                let bytes: u64 = files
                    .iter()
                    .filter_map(|f| std::fs::metadata(f).ok())
                    .map(|m| m.len())
                    .sum();
                json!({
                    "name": agent.display_name(),
                    "sessions": files.len(),
                    "totalSizeKB": (bytes as f64 / 1024.0).round() as u64,
                })
            })
            .collect();

        json!({
            "usage": usage,
            "models": cfg.models,
            "defaultModel": cfg.default_model,
            "heartbeatModel": cfg.heartbeat_model,
        })
    }

    /// Best-effort scan of recent session logs for sub-task markers. This
    /// is a heuristic text scan, not a structured protocol; empty or
    /// partial results are normal and never affect other endpoints.
    pub fn subagents(&self) -> Value {
        let cfg = self.config.load_agent_config();
        let mut found = Vec::new();

        for agent in &cfg.agents {
            for file in recent_session_files(&self.paths.session_dir(&agent.id)) {
                let Ok(raw) = std::fs::read_to_string(&file) else {
                    continue;
                };
                let lines: Vec<&str> = raw.lines().collect();
                let tail = lines.len().saturating_sub(SUBAGENT_SCAN_LINES);
                for line in &lines[tail..] {
                    if let Some(detail) = subagent_marker(line) {
                        found.push(json!({
                            "agent": agent.id.clone(),
                            "session": file.file_name().and_then(|n| n.to_str()),
                            "detail": detail,
                        }));
                    }
                }
            }
        }

        debug!("subagent scan found {} marker(s)", found.len());
        json!({ "subagents": found })
    }
}

fn session_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(SESSION_EXT))
        .collect();
    files.sort();
    files
}

/// Newest-first by modification time, capped at the scan window.
fn recent_session_files(dir: &Path) -> Vec<PathBuf> {
    let mut files = session_files(dir);
    files.sort_by_key(|p| {
        std::fs::metadata(p)
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
    });
    files.reverse();
    files.truncate(SUBAGENT_SCAN_FILES);
    files
}

/// Most recently updated session per the `sessions.json` index, if one
/// exists. Equal timestamps resolve to the later array entry.
fn last_active(dir: &Path) -> Value {
    let Ok(raw) = std::fs::read_to_string(dir.join("sessions.json")) else {
        return Value::Null;
    };
    let Ok(index) = serde_json::from_str::<Value>(&raw) else {
        return Value::Null;
    };
    let sessions = match index.as_array() {
        Some(list) => list.as_slice(),
        None => match index.get("sessions").and_then(|s| s.as_array()) {
            Some(list) => list.as_slice(),
            None => return Value::Null,
        },
    };

    let mut latest: Option<&str> = None;
    for session in sessions {
        if let Some(updated) = session.get("updated").and_then(|u| u.as_str())
            && latest.is_none_or(|current| updated >= current)
        {
            latest = Some(updated);
        }
    }
    latest.map_or(Value::Null, |u| Value::String(u.to_string()))
}

fn subagent_marker(line: &str) -> Option<String> {
    let lowered = line.to_lowercase();
    if lowered.contains("subagent") || lowered.contains("spawn_session") {
        let mut detail = line.trim().to_string();
        if detail.len() > 200 {
            let mut end = 200;
            while !detail.is_char_boundary(end) {
                end -= 1;
            }
            detail.truncate(end);
        }
        Some(detail)
    } else {
        None
    }
}

/// "load average: 0.52, 0.58, 0.59" from `uptime`, zeros on anything else.
fn parse_load_average(out: &str) -> [f64; 3] {
    let mut load = [0.0; 3];
    if let Some(idx) = out.find("load average") {
        let tail = out[idx..].trim_start_matches(|c: char| !c.is_ascii_digit());
        for (i, part) in tail.split(',').take(3).enumerate() {
            load[i] = part.trim().parse().unwrap_or(0.0);
        }
    }
    load
}

/// Second line of `free -m`: "Mem: total used free ...".
fn parse_free_mem(out: &str) -> Value {
    let fields: Vec<&str> = out
        .lines()
        .find(|l| l.starts_with("Mem:"))
        .map(|l| l.split_whitespace().collect())
        .unwrap_or_default();
    let field = |i: usize| -> u64 { fields.get(i).and_then(|f| f.parse().ok()).unwrap_or(0) };
    json!({ "totalMb": field(1), "usedMb": field(2) })
}

/// Second line of `df -h /`: "filesystem size used avail use% mount".
fn parse_disk(out: &str) -> Value {
    let fields: Vec<&str> = out
        .lines()
        .nth(1)
        .map(|l| l.split_whitespace().collect())
        .unwrap_or_default();
    json!({
        "size": fields.get(1).copied().unwrap_or(""),
        "used": fields.get(2).copied().unwrap_or(""),
        "percent": fields.get(4).copied().unwrap_or(""),
    })
}
