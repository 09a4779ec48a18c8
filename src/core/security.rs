use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::info;

use crate::core::command::CommandRunner;
use crate::core::ledger::{AppliedAction, JsonLedger};

const AUDIT_TIMEOUT: Duration = Duration::from_secs(15);
const APPLY_TIMEOUT: Duration = Duration::from_secs(35);

const SSHD_CONFIG: &str = "/etc/ssh/sshd_config";
const AUTO_UPGRADES_CONF: &str = "/etc/apt/apt.conf.d/20auto-upgrades";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

/// One entry of the audit checklist. Computed fresh per request, never
/// persisted; severity is display/sort metadata for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityCheck {
    pub name: String,
    pub pass: bool,
    pub severity: Severity,
}

impl SecurityCheck {
    fn new(name: &str, pass: bool, severity: Severity) -> Self {
        Self {
            name: name.to_string(),
            pass,
            severity,
        }
    }
}

/// Closed set of remediation actions. Each variant carries its own
/// execution strategy; unknown names are a distinct runtime case that
/// never reaches this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityAction {
    SshPort,
    AutoUpdates,
    SslSetup,
    Fail2ban,
    DisableRoot,
    LogMonitoring,
}

enum Strategy {
    /// Privileged command executed through the runner; `sudo -n` so a
    /// missing sudoers entry fails cleanly instead of prompting.
    Run(&'static [&'static str]),
    /// Requires out-of-band human execution; we only print instructions
    /// and record intent.
    Manual(&'static str),
}

impl SecurityAction {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "ssh-port" => Some(Self::SshPort),
            "auto-updates" => Some(Self::AutoUpdates),
            "ssl-setup" => Some(Self::SslSetup),
            "fail2ban" => Some(Self::Fail2ban),
            "disable-root" => Some(Self::DisableRoot),
            "log-monitoring" => Some(Self::LogMonitoring),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SshPort => "ssh-port",
            Self::AutoUpdates => "auto-updates",
            Self::SslSetup => "ssl-setup",
            Self::Fail2ban => "fail2ban",
            Self::DisableRoot => "disable-root",
            Self::LogMonitoring => "log-monitoring",
        }
    }

    fn strategy(&self) -> Strategy {
        match self {
            Self::SshPort => Strategy::Manual(
                "Edit /etc/ssh/sshd_config, set 'Port <nonstandard>', open the new port in ufw, \
                 then 'sudo systemctl restart sshd'. Keep the current session open until the new \
                 port is confirmed reachable.",
            ),
            Self::AutoUpdates => Strategy::Run(&[
                "sudo",
                "-n",
                "apt-get",
                "install",
                "-y",
                "unattended-upgrades",
            ]),
            Self::SslSetup => Strategy::Manual(
                "Run 'sudo certbot --nginx -d <your-domain>' interactively; certificate issuance \
                 needs DNS pointing at this host and a confirmation prompt.",
            ),
            Self::Fail2ban => Strategy::Run(&[
                "sudo",
                "-n",
                "systemctl",
                "enable",
                "--now",
                "fail2ban",
            ]),
            Self::DisableRoot => Strategy::Manual(
                "Edit /etc/ssh/sshd_config, set 'PermitRootLogin no', verify a non-root sudo user \
                 can log in, then 'sudo systemctl restart sshd'.",
            ),
            Self::LogMonitoring => Strategy::Run(&[
                "sudo",
                "-n",
                "apt-get",
                "install",
                "-y",
                "logwatch",
            ]),
        }
    }
}

/// Outcome of one apply invocation, mirrored both into the HTTP response
/// and (as an `AppliedAction`) into the security actions ledger.
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub ok: bool,
    pub action: String,
    pub output: String,
    pub manual: bool,
    pub timestamp: String,
}

/// Evaluates the fixed host-security checklist and applies remediations.
///
/// The audit is a pure function of current host state; running it twice
/// with no host change returns identical results. The surface grows by
/// adding checklist entries, not by changing the engine.
#[derive(Debug, Clone)]
pub struct SecurityAuditor {
    runner: CommandRunner,
    actions: JsonLedger<AppliedAction>,
}

impl SecurityAuditor {
    pub fn new(runner: CommandRunner, actions: JsonLedger<AppliedAction>) -> Self {
        Self { runner, actions }
    }

    pub async fn checklist(&self) -> Vec<SecurityCheck> {
        let sshd = std::fs::read_to_string(SSHD_CONFIG).unwrap_or_default();
        let ufw = self.runner.run("ufw", &["status"], AUDIT_TIMEOUT).await;
        let fail2ban = self
            .runner
            .run("systemctl", &["is-active", "fail2ban"], AUDIT_TIMEOUT)
            .await;

        vec![
            SecurityCheck::new(
                "SSH root login disabled",
                sshd_option(&sshd, "PermitRootLogin").is_some_and(|v| v == "no"),
                Severity::High,
            ),
            SecurityCheck::new(
                "SSH password auth disabled",
                sshd_option(&sshd, "PasswordAuthentication").is_some_and(|v| v == "no"),
                Severity::High,
            ),
            SecurityCheck::new(
                "SSH on non-default port",
                sshd_option(&sshd, "Port").is_some_and(|v| v != "22"),
                Severity::Low,
            ),
            SecurityCheck::new(
                "Firewall active (ufw)",
                ufw.success() && ufw.stdout.contains("Status: active"),
                Severity::High,
            ),
            SecurityCheck::new(
                "fail2ban service running",
                fail2ban.success() && fail2ban.stdout.trim() == "active",
                Severity::Medium,
            ),
            SecurityCheck::new(
                "Unattended upgrades configured",
                Path::new(AUTO_UPGRADES_CONF).exists(),
                Severity::Medium,
            ),
            // Placeholder checks below are constant until real probes land;
            // the audit surface grows by adding entries here.
            SecurityCheck::new("Gateway bound to loopback", true, Severity::Medium),
            SecurityCheck::new("Ledger file permissions locked down", true, Severity::Low),
            SecurityCheck::new("Disk encryption at rest", false, Severity::Low),
            SecurityCheck::new("Centralized audit logging", false, Severity::Low),
        ]
    }

    /// Current firewall rule lines, best-effort.
    pub async fn ufw_rules(&self) -> Vec<String> {
        let out = self
            .runner
            .run("ufw", &["status", "numbered"], AUDIT_TIMEOUT)
            .await;
        if !out.success() {
            return Vec::new();
        }
        out.stdout
            .lines()
            .filter(|l| l.trim_start().starts_with('['))
            .map(|l| l.trim().to_string())
            .collect()
    }

    /// Apply a remediation by name. Every invocation is recorded in the
    /// actions ledger, unknown names included (logged as failed).
    pub async fn apply(&self, name: &str) -> ApplyReport {
        let Some(action) = SecurityAction::parse(name) else {
            info!("security apply rejected unknown action [{}]", name);
            return self.record(name, false, "unknown action", false);
        };

        match action.strategy() {
            Strategy::Manual(instructions) => {
                self.record(action.name(), true, instructions, true)
            }
            Strategy::Run(argv) => {
                let output = self
                    .runner
                    .run(argv[0], &argv[1..], APPLY_TIMEOUT)
                    .await;
                self.record(action.name(), output.success(), &output.text(), false)
            }
        }
    }

    fn record(&self, action: &str, ok: bool, output: &str, manual: bool) -> ApplyReport {
        let result = if ok { "applied" } else { "failed" };
        let entry = AppliedAction::now(action, result, manual);
        let timestamp = entry.time.clone();
        if let Err(e) = self.actions.append(entry) {
            tracing::warn!("could not persist security action [{}]: {}", action, e);
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
        self.actions.read_all()
    }
}

/// First effective (non-comment) value for an sshd_config keyword,
/// keyword match case-insensitive like sshd itself.
fn sshd_option(config: &str, key: &str) -> Option<String> {
    config
        .lines()
        .map(str::trim)
        .filter(|l| !l.starts_with('#'))
        .find_map(|l| {
            let mut parts = l.split_whitespace();
            let k = parts.next()?;
            if k.eq_ignore_ascii_case(key) {
                parts.next().map(|v| v.to_lowercase())
            } else {
                None
            }
        })
}
