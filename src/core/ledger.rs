use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::platform::{NativePlatform, Platform};

/// The comms ledger keeps only the most recent entries; older traffic is
/// evicted FIFO to bound disk usage. Retention policy, not a bug.
pub const COMMS_CAP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommKind {
    Task,
    Response,
    Command,
    Broadcast,
}

/// One message exchanged between the operator and an agent (or between
/// agents), as published on `GET /api/comms`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommMessage {
    pub id: u64,
    pub from: String,
    pub to: String,
    pub msg: String,
    pub time: String,
    #[serde(rename = "type")]
    pub kind: CommKind,
}

impl CommMessage {
    /// Millisecond-epoch ids, bumped past the last id this process issued
    /// so a command/response pair written in the same millisecond still
    /// gets strictly increasing ids.
    pub fn now(from: &str, to: &str, msg: &str, kind: CommKind) -> Self {
        Self {
            id: next_id(),
            from: from.to_string(),
            to: to.to_string(),
            msg: msg.to_string(),
            time: chrono::Utc::now().to_rfc3339(),
            kind,
        }
    }
}

fn next_id() -> u64 {
    static LAST_ID: AtomicU64 = AtomicU64::new(0);
    let now = chrono::Utc::now().timestamp_millis() as u64;
    let last = LAST_ID
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
            Some(now.max(last + 1))
        })
        .unwrap_or(0);
    now.max(last + 1)
}

/// Durable record that an operator-invoked remediation or optimization was
/// attempted. `manual` marks actions the service only prints instructions
/// for instead of executing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedAction {
    pub action: String,
    pub time: String,
    pub result: String,
    #[serde(default)]
    pub manual: bool,
}

impl AppliedAction {
    pub fn now(action: &str, result: &str, manual: bool) -> Self {
        Self {
            action: action.to_string(),
            time: chrono::Utc::now().to_rfc3339(),
            result: result.to_string(),
            manual,
        }
    }
}

/// Append-only JSON-array ledger file.
///
/// Reads are tolerant: a missing or unparsable file yields an empty
/// sequence. Writes go to a temp file in the same directory and are
/// renamed into place so a crash mid-write never leaves a torn array.
/// No cross-process locking; serialized request handling is the only
/// writer-coordination assumed.
#[derive(Debug, Clone)]
pub struct JsonLedger<T> {
    path: PathBuf,
    cap: Option<usize>,
    _marker: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> JsonLedger<T> {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cap: None,
            _marker: PhantomData,
        }
    }

    pub fn capped(path: PathBuf, cap: usize) -> Self {
        Self {
            path,
            cap: Some(cap),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn read_all(&self) -> Vec<T> {
        let Ok(raw) = std::fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(e) => {
                warn!("ledger {} is unparsable ({}), treating as empty", self.path.display(), e);
                Vec::new()
            }
        }
    }

    /// Read-push-truncate-write. The cap evicts oldest entries only; the
    /// sequence is never edited mid-array.
    pub fn append(&self, record: T) -> Result<()> {
        let mut records = self.read_all();
        records.push(record);
        if let Some(cap) = self.cap
            && records.len() > cap
        {
            records.drain(..records.len() - cap);
        }
        self.write_atomic(&records)
    }

    fn write_atomic(&self, records: &[T]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating ledger dir {}", parent.display()))?;
            NativePlatform::restrict_dir_permissions(parent);
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(records)?;
        std::fs::write(&tmp, body)
            .with_context(|| format!("writing ledger temp {}", tmp.display()))?;
        NativePlatform::restrict_file_permissions(&tmp);
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing ledger {}", self.path.display()))?;
        Ok(())
    }
}
