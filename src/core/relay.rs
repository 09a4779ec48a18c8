use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::core::command::{CapturedOutput, CommandRunner};
use crate::core::ledger::{CommKind, CommMessage, JsonLedger};

/// Wait budget for one gateway invocation. Exceeding it is not failure
/// (see `RelayOutcome::Provisional`).
pub const RELAY_TIMEOUT: Duration = Duration::from_secs(35);

/// Terminal state of one relay attempt. `Provisional` is a first-class
/// success: the command outlived our wait budget but the message may
/// already be queued on the agent side, and the relay is fire-and-forget
/// from the API's perspective.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    Confirmed { reply: String, raw: String },
    Provisional,
    Failed { output: String },
}

impl RelayOutcome {
    pub fn ok(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }
}

/// A delivery path to the agent runtime. Channels only deliver; ledger
/// mirroring stays with the dispatcher so fallback chains record exactly
/// one command entry per operator intent.
#[async_trait]
pub trait RelayChannel: Send + Sync {
    fn label(&self) -> &'static str;
    async fn deliver(&self, target: &str, message: &str, timeout: Duration) -> CapturedOutput;
}

/// Primary path: gateway broadcast-style channel delivery.
pub struct BroadcastChannel {
    runner: CommandRunner,
    bin: String,
}

impl BroadcastChannel {
    pub fn new(runner: CommandRunner, bin: String) -> Self {
        Self { runner, bin }
    }
}

#[async_trait]
impl RelayChannel for BroadcastChannel {
    fn label(&self) -> &'static str {
        "broadcast"
    }

    async fn deliver(&self, target: &str, message: &str, timeout: Duration) -> CapturedOutput {
        // Message text travels as a discrete argv element; no shell line,
        // no escaping concern.
        self.runner
            .run(
                &self.bin,
                &[
                    "message",
                    "send",
                    "--channel",
                    "broadcast",
                    "--target",
                    target,
                    "--text",
                    message,
                ],
                timeout,
            )
            .await
    }
}

/// Secondary path: instruct the agent runtime directly and have it deliver
/// the reply over its notification channel.
pub struct DirectChannel {
    runner: CommandRunner,
    bin: String,
}

impl DirectChannel {
    pub fn new(runner: CommandRunner, bin: String) -> Self {
        Self { runner, bin }
    }
}

#[async_trait]
impl RelayChannel for DirectChannel {
    fn label(&self) -> &'static str {
        "direct"
    }

    async fn deliver(&self, target: &str, message: &str, timeout: Duration) -> CapturedOutput {
        self.runner
            .run(
                &self.bin,
                &[
                    "agent",
                    "run",
                    "--id",
                    target,
                    "--message",
                    message,
                    "--deliver",
                    "notify",
                ],
                timeout,
            )
            .await
    }
}

/// Routes operator-authored messages to agents with a two-tier fallback
/// chain, recording every attempt in the comms ledger.
pub struct RelayDispatcher {
    broadcast: BroadcastChannel,
    direct: DirectChannel,
    comms: JsonLedger<CommMessage>,
    timeout: Duration,
}

impl RelayDispatcher {
    pub fn new(
        runner: CommandRunner,
        gateway_bin: String,
        comms: JsonLedger<CommMessage>,
        timeout: Duration,
    ) -> Self {
        Self {
            broadcast: BroadcastChannel::new(runner.clone(), gateway_bin.clone()),
            direct: DirectChannel::new(runner, gateway_bin),
            comms,
            timeout,
        }
    }

    /// Relay `message` to a single agent and wait for its reply.
    ///
    /// Timeout resolves to `Provisional` — the message may have been queued
    /// beyond our wait budget, and reporting failure would tempt the
    /// operator into duplicate sends. Clean completion tries to parse a
    /// structured reply; an unparsable one still confirms with a generic
    /// acknowledgement.
    pub async fn send_to_agent(&self, agent_id: &str, message: &str) -> RelayOutcome {
        self.log_comm("operator", agent_id, message, CommKind::Command);

        let out = self.direct.deliver(agent_id, message, self.timeout).await;

        if out.timed_out {
            info!("relay to [{}] exceeded wait budget, provisional", agent_id);
            return RelayOutcome::Provisional;
        }
        if !out.success() {
            warn!("relay to [{}] failed: {}", agent_id, out.text());
            return RelayOutcome::Failed { output: out.text() };
        }

        let reply = parse_reply(&out.stdout)
            .unwrap_or_else(|| "Delivered. The agent acknowledged the message.".to_string());
        self.log_comm(agent_id, "operator", &reply, CommKind::Response);
        RelayOutcome::Confirmed {
            reply,
            raw: out.stdout.trim().to_string(),
        }
    }

    /// Two-tier delivery: broadcast channel first, direct agent channel
    /// only if the broadcast invocation itself errors. The reported
    /// outcome reflects whichever tier landed.
    pub async fn relay(&self, target: &str, message: &str) -> RelayOutcome {
        self.log_comm("operator", target, message, CommKind::Command);

        let primary = self.broadcast.deliver(target, message, self.timeout).await;
        if primary.timed_out {
            return RelayOutcome::Provisional;
        }
        if primary.success() {
            return RelayOutcome::Confirmed {
                reply: format!("Relayed to {} via {}.", target, self.broadcast.label()),
                raw: primary.stdout.trim().to_string(),
            };
        }

        info!(
            "broadcast relay to [{}] errored, falling back to {} channel",
            target,
            self.direct.label()
        );
        let secondary = self.direct.deliver(target, message, self.timeout).await;
        if secondary.timed_out {
            return RelayOutcome::Provisional;
        }
        if secondary.success() {
            return RelayOutcome::Confirmed {
                reply: format!("Relayed to {} via {}.", target, self.direct.label()),
                raw: secondary.stdout.trim().to_string(),
            };
        }
        RelayOutcome::Failed {
            output: secondary.text(),
        }
    }

    pub fn comms(&self) -> Vec<CommMessage> {
        self.comms.read_all()
    }

    pub fn comms_path_exists(&self) -> bool {
        self.comms.path().exists()
    }

    /// Out-of-band entry (seeding, system notices) written through the
    /// same capped ledger as relay traffic.
    pub fn log_system_broadcast(&self, entry: CommMessage) {
        if let Err(e) = self.comms.append(entry) {
            warn!("could not persist system broadcast: {}", e);
        }
    }

    fn log_comm(&self, from: &str, to: &str, msg: &str, kind: CommKind) {
        if let Err(e) = self.comms.append(CommMessage::now(from, to, msg, kind)) {
            warn!("could not persist comm entry: {}", e);
        }
    }
}

/// `{"reply": "..."}` from gateway stdout, if it produced one.
fn parse_reply(stdout: &str) -> Option<String> {
    let parsed: Value = serde_json::from_str(stdout.trim()).ok()?;
    parsed
        .get("reply")
        .and_then(|r| r.as_str())
        .map(|r| r.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_stub(dir: &Path, name: &str, body: &str) -> String {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path.to_str().unwrap().to_string()
    }

    fn dispatcher_with_timeout(dir: &TempDir, bin: String, timeout: Duration) -> RelayDispatcher {
        RelayDispatcher::new(
            CommandRunner::new(dir.path().to_path_buf()),
            bin,
            JsonLedger::capped(dir.path().join("comms.json"), crate::core::ledger::COMMS_CAP),
            timeout,
        )
    }

    fn dispatcher(dir: &TempDir, bin: String) -> RelayDispatcher {
        dispatcher_with_timeout(dir, bin, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn confirmed_reply_parsed_from_gateway_json() {
        let dir = TempDir::new().unwrap();
        let bin = write_stub(dir.path(), "gateway", r#"echo '{"reply":"pong"}'"#);
        let relay = dispatcher(&dir, bin);

        let outcome = relay.send_to_agent("atlas", "ping").await;
        assert!(outcome.ok());
        match outcome {
            RelayOutcome::Confirmed { reply, .. } => assert_eq!(reply, "pong"),
            other => panic!("expected Confirmed, got {:?}", other),
        }

        let comms = relay.comms();
        assert_eq!(comms.len(), 2);
        assert_eq!(comms[0].kind, CommKind::Command);
        assert_eq!(comms[1].kind, CommKind::Response);
        assert_eq!(comms[1].msg, "pong");
    }

    #[tokio::test]
    async fn unparsable_output_still_confirms_with_generic_ack() {
        let dir = TempDir::new().unwrap();
        let bin = write_stub(dir.path(), "gateway", "echo done");
        let relay = dispatcher(&dir, bin);

        match relay.send_to_agent("atlas", "ping").await {
            RelayOutcome::Confirmed { reply, raw } => {
                assert!(reply.contains("Delivered"));
                assert_eq!(raw, "done");
            }
            other => panic!("expected Confirmed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_is_provisional_success_with_no_response_entry() {
        let dir = TempDir::new().unwrap();
        let bin = write_stub(dir.path(), "gateway", "sleep 5");
        let relay = dispatcher_with_timeout(&dir, bin, Duration::from_millis(150));

        let outcome = relay.send_to_agent("atlas", "slow task").await;
        assert_eq!(outcome, RelayOutcome::Provisional);
        assert!(outcome.ok());

        let comms = relay.comms();
        assert_eq!(comms.len(), 1);
        assert_eq!(comms[0].kind, CommKind::Command);
    }

    #[tokio::test]
    async fn relay_falls_back_to_direct_on_primary_error() {
        let dir = TempDir::new().unwrap();
        // First argv element distinguishes the tiers: broadcast invocations
        // start with "message", direct ones with "agent".
        let bin = write_stub(
            dir.path(),
            "gateway",
            r#"if [ "$1" = "message" ]; then echo "broadcast down" >&2; exit 1; fi; echo relayed"#,
        );
        let relay = dispatcher(&dir, bin);

        let outcome = relay.relay("hvac", "ping").await;
        assert!(outcome.ok());
        match outcome {
            RelayOutcome::Confirmed { reply, .. } => assert!(reply.contains("direct")),
            other => panic!("expected Confirmed, got {:?}", other),
        }

        let command_entries: Vec<_> = relay
            .comms()
            .into_iter()
            .filter(|c| c.kind == CommKind::Command)
            .collect();
        assert_eq!(command_entries.len(), 1);
    }

    #[tokio::test]
    async fn relay_reports_last_output_when_both_tiers_fail() {
        let dir = TempDir::new().unwrap();
        let bin = write_stub(dir.path(), "gateway", "echo nope >&2; exit 1");
        let relay = dispatcher(&dir, bin);

        match relay.relay("hvac", "ping").await {
            RelayOutcome::Failed { output } => assert_eq!(output, "nope"),
            other => panic!("expected Failed, got {:?}", other),
        }
    }

    #[test]
    fn reply_parser_tolerates_non_json() {
        assert_eq!(parse_reply(r#"{"reply":"hi"}"#).as_deref(), Some("hi"));
        assert!(parse_reply("plain text").is_none());
        assert!(parse_reply(r#"{"status":"ok"}"#).is_none());
    }
}
