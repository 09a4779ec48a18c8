use tracing::info;

use crate::core::ledger::{AppliedAction, JsonLedger};
use crate::core::security::ApplyReport;

/// Closed set of cost-optimization actions. All of them reconfigure the
/// external agent runtime, which this service never mutates directly, so
/// each apply records intent and returns operator instructions
/// (`manual=true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizeAction {
    HeartbeatGemini,
    DeepseekParsing,
    BatchBriefing,
    CacheSt,
}

impl OptimizeAction {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "heartbeat-gemini" => Some(Self::HeartbeatGemini),
            "deepseek-parsing" => Some(Self::DeepseekParsing),
            "batch-briefing" => Some(Self::BatchBriefing),
            "cache-st" => Some(Self::CacheSt),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::HeartbeatGemini => "heartbeat-gemini",
            Self::DeepseekParsing => "deepseek-parsing",
            Self::BatchBriefing => "batch-briefing",
            Self::CacheSt => "cache-st",
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            Self::HeartbeatGemini => {
                "Set 'heartbeatModel' to a Gemini Flash tier model in openclaw.json, then restart \
                 the gateway. Heartbeat polls are ~90% of calls and need no frontier model."
            }
            Self::DeepseekParsing => {
                "Route parsing-only sessions to DeepSeek: set 'model' on the parser agents in \
                 openclaw.json. Keeps the default model for reasoning work."
            }
            Self::BatchBriefing => {
                "Merge the per-topic briefing cron jobs into one combined job in the cron file so \
                 a single session covers all topics."
            }
            Self::CacheSt => {
                "Enable short-term session caching in openclaw.json ('cacheShortTerm': true) so \
                 repeated context is not re-sent each heartbeat."
            }
        }
    }
}

/// Applies optimization suggestions against the optimizations ledger,
/// mirroring the security apply contract.
#[derive(Debug, Clone)]
pub struct Optimizer {
    applied: JsonLedger<AppliedAction>,
}

impl Optimizer {
    pub fn new(applied: JsonLedger<AppliedAction>) -> Self {
        Self { applied }
    }

    pub fn apply(&self, name: &str) -> ApplyReport {
        let (ok, action, output, manual) = match OptimizeAction::parse(name) {
            Some(action) => (true, action.name(), action.instructions(), true),
            None => {
                info!("optimize apply rejected unknown action [{}]", name);
                (false, name, "unknown action", false)
            }
        };

        let result = if ok { "applied" } else { "failed" };
        let entry = AppliedAction::now(action, result, manual);
        let timestamp = entry.time.clone();
        if let Err(e) = self.applied.append(entry) {
            tracing::warn!("could not persist optimization [{}]: {}", action, e);
        }

        ApplyReport {
            ok,
            action: action.to_string(),
            output: output.to_string(),
            manual,
            timestamp,
        }
    }

    pub fn applied_actions(&self) -> Vec<AppliedAction> {
        self.applied.read_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn optimizer_in(dir: &TempDir) -> Optimizer {
        Optimizer::new(JsonLedger::new(dir.path().join("optimizations.json")))
    }

    #[test]
    fn known_actions_round_trip_names() {
        for name in ["heartbeat-gemini", "deepseek-parsing", "batch-briefing", "cache-st"] {
            assert_eq!(OptimizeAction::parse(name).unwrap().name(), name);
        }
        assert!(OptimizeAction::parse("turbo-mode").is_none());
    }

    #[test]
    fn apply_persists_manual_record() {
        let dir = TempDir::new().unwrap();
        let optimizer = optimizer_in(&dir);

        let report = optimizer.apply("heartbeat-gemini");
        assert!(report.ok);
        assert!(report.manual);
        assert!(report.output.contains("heartbeatModel"));

        let applied = optimizer.applied_actions();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].action, "heartbeat-gemini");
        assert_eq!(applied[0].result, "applied");
        assert!(applied[0].manual);
    }

    #[test]
    fn unknown_action_logged_as_failed() {
        let dir = TempDir::new().unwrap();
        let optimizer = optimizer_in(&dir);

        let report = optimizer.apply("turbo-mode");
        assert!(!report.ok);

        let applied = optimizer.applied_actions();
        assert_eq!(applied[0].result, "failed");
        assert!(!applied[0].manual);
    }
}
