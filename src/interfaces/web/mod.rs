mod handlers;
pub(crate) mod router;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::core::command::CommandRunner;
use crate::core::config::{ConfigReader, Paths};
use crate::core::ledger::{AppliedAction, COMMS_CAP, CommKind, CommMessage, JsonLedger};
use crate::core::optimize::Optimizer;
use crate::core::relay::RelayDispatcher;
use crate::core::security::SecurityAuditor;
use crate::core::status::StatusAggregator;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) config: ConfigReader,
    pub(crate) status: StatusAggregator,
    pub(crate) auditor: SecurityAuditor,
    pub(crate) optimizer: Optimizer,
    pub(crate) relay: Arc<RelayDispatcher>,
    pub(crate) api_port: u16,
}

pub struct ApiServer {
    state: AppState,
    paths: Paths,
    api_host: String,
    api_port: u16,
}

impl ApiServer {
    pub fn new(paths: Paths, api_host: String, api_port: u16) -> Self {
        Self {
            state: build_state(paths.clone(), api_port),
            paths,
            api_host,
            api_port,
        }
    }

    /// Bind and serve until the process exits. Request handling is the
    /// only long-lived task; external commands are the only concurrency.
    pub async fn serve(self) -> Result<()> {
        seed_comms(&self.state);

        // Probe the gateway without delaying startup; relays will surface
        // failures per request either way, this just logs early.
        let gateway = self.paths.gateway_bin.clone();
        CommandRunner::new(self.paths.home.clone()).run_background(
            &self.paths.gateway_bin,
            &["--version"],
            std::time::Duration::from_secs(15),
            move |out| {
                if out.success() {
                    info!("agent gateway [{}] available: {}", gateway, out.text());
                } else {
                    warn!("agent gateway [{}] not reachable: {}", gateway, out.text());
                }
            },
        );

        let addr = format!("{}:{}", self.api_host, self.api_port);
        let app = router::build_api_router(self.state);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("API Server running at http://{addr}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

pub(crate) fn build_state(paths: Paths, api_port: u16) -> AppState {
    let runner = CommandRunner::new(paths.home.clone());
    let config = ConfigReader::new(paths.clone());
    let comms: JsonLedger<CommMessage> = JsonLedger::capped(paths.comms_ledger(), COMMS_CAP);
    let security_actions: JsonLedger<AppliedAction> =
        JsonLedger::new(paths.security_actions_ledger());
    let optimizations: JsonLedger<AppliedAction> = JsonLedger::new(paths.optimizations_ledger());

    AppState {
        status: StatusAggregator::new(runner.clone(), config.clone(), paths.clone()),
        auditor: SecurityAuditor::new(runner.clone(), security_actions),
        optimizer: Optimizer::new(optimizations),
        relay: Arc::new(RelayDispatcher::new(
            runner,
            paths.gateway_bin.clone(),
            comms,
            crate::core::relay::RELAY_TIMEOUT,
        )),
        config,
        api_port,
    }
}

/// First-start nicety: an empty comms feed looks broken in the operator
/// UI, so seed one broadcast entry when the ledger file does not exist yet.
fn seed_comms(state: &AppState) {
    if state.relay.comms_path_exists() {
        return;
    }
    info!("seeding comms ledger with bootstrap entry");
    state.relay.log_system_broadcast(CommMessage::now(
        "system",
        "all",
        "Command center online. Agent comms will appear here.",
        CommKind::Broadcast,
    ));
}
