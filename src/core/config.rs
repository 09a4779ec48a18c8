use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::platform::{NativePlatform, Platform};

/// Resolved locations of every external file and tool the service talks to.
/// Environment overrides exist for each so tests and non-standard installs
/// can point the service anywhere.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Ledger directory (`comms.json`, `security_actions.json`, `optimizations.json`).
    pub data_dir: PathBuf,
    /// External agent configuration file, owned by the OpenClaw install.
    pub agent_config: PathBuf,
    /// External cron job file; republished verbatim, never mutated.
    pub cron_jobs: PathBuf,
    /// Root of per-agent directories holding session logs.
    pub agents_dir: PathBuf,
    /// Market data file written by an external feed.
    pub market_file: PathBuf,
    /// Agent gateway CLI used for relaying operator messages.
    pub gateway_bin: String,
    /// `HOME` injected into spawned tools.
    pub home: PathBuf,
}

fn env_path(var: &str, default: PathBuf) -> PathBuf {
    match std::env::var_os(var) {
        Some(v) if !v.is_empty() => PathBuf::from(v),
        _ => default,
    }
}

impl Paths {
    pub fn resolve() -> Self {
        let home = NativePlatform::home_dir();
        let data_dir = NativePlatform::data_dir();
        let openclaw = home.join(".openclaw");
        Self {
            agent_config: env_path("OPENCLAW_CONFIG", openclaw.join("openclaw.json")),
            cron_jobs: env_path("OPENCLAW_CRON", openclaw.join("cron").join("jobs.json")),
            agents_dir: env_path("OPENCLAW_AGENTS_DIR", openclaw.join("agents")),
            market_file: env_path("CLAWDECK_MARKET_FILE", data_dir.join("markets").join("momo.json")),
            gateway_bin: std::env::var("OPENCLAW_BIN").unwrap_or_else(|_| "openclaw".to_string()),
            data_dir,
            home,
        }
    }

    pub fn comms_ledger(&self) -> PathBuf {
        self.data_dir.join("comms.json")
    }

    pub fn security_actions_ledger(&self) -> PathBuf {
        self.data_dir.join("security_actions.json")
    }

    pub fn optimizations_ledger(&self) -> PathBuf {
        self.data_dir.join("optimizations.json")
    }

    pub fn session_dir(&self, agent_id: &str) -> PathBuf {
        self.agents_dir.join(agent_id).join("sessions")
    }
}

/// One agent as declared in the external configuration file. Read-only
/// from this service's perspective.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentEntry {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "heartbeatModel")]
    pub heartbeat_model: Option<String>,
}

impl AgentEntry {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentConfigFile {
    #[serde(default)]
    pub agents: Vec<AgentEntry>,
    #[serde(default, alias = "defaultModel")]
    pub default_model: Option<String>,
    #[serde(default, alias = "heartbeatModel")]
    pub heartbeat_model: Option<String>,
    /// Model/cost catalog, republished as-is on agents and usage endpoints.
    #[serde(default, alias = "modelCatalog")]
    pub models: Vec<Value>,
}

/// Read-through loader for the external configuration files.
///
/// Always re-reads from disk so the staleness window is zero; the cost is
/// repeated I/O, which is fine at operator-dashboard request rates. Any
/// missing or malformed file degrades to the documented empty default —
/// the API never 5xxes on missing external state.
#[derive(Debug, Clone)]
pub struct ConfigReader {
    paths: Paths,
}

impl ConfigReader {
    pub fn new(paths: Paths) -> Self {
        Self { paths }
    }

    pub fn load_agent_config(&self) -> AgentConfigFile {
        let Ok(raw) = std::fs::read_to_string(&self.paths.agent_config) else {
            return AgentConfigFile::default();
        };
        match serde_json::from_str(&raw) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(
                    "agent config {} is unparsable ({}), using empty config",
                    self.paths.agent_config.display(),
                    e
                );
                AgentConfigFile::default()
            }
        }
    }

    pub fn load_cron_jobs(&self) -> Value {
        let empty = serde_json::json!({ "jobs": [] });
        let Ok(raw) = std::fs::read_to_string(&self.paths.cron_jobs) else {
            return empty;
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(jobs) if jobs.get("jobs").is_some() => jobs,
            Ok(_) | Err(_) => {
                warn!(
                    "cron file {} missing a jobs array, republishing empty set",
                    self.paths.cron_jobs.display()
                );
                empty
            }
        }
    }

    pub fn load_market(&self) -> Value {
        let fallback = serde_json::json!({
            "primary": { "price_usd": "0", "price_change_24h": 0 }
        });
        let Ok(raw) = std::fs::read_to_string(&self.paths.market_file) else {
            return fallback;
        };
        serde_json::from_str(&raw).unwrap_or(fallback)
    }
}
