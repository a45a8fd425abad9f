//! # The file-based control channel.
//!
//! External CLI invocations drive a running supervisor by appending an
//! envelope to the shared IPC file:
//!
//! ```json
//! {"restart": "web", "senderUuid": "6f9d…"}
//! ```
//!
//! where the verb is one of `start` / `stop` / `restart` / `block` /
//! `unblock` (value: a target id, or `true` for every root unit) or
//! `terminate` (value: `true`). The supervisor answers by writing
//! `{"success": bool}` into `<ipcPath>.<senderUuid>`, which the requester
//! polls for up to ten seconds.
//!
//! Delivery inherits the file queue's guarantees: at-least-once,
//! best-effort, staleness-guarded. Verbs are idempotent, so a duplicate
//! delivery is harmless.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::IpcError;
use crate::events::{Bus, Event, EventKind};
use crate::ipc::FileIpc;
use crate::process::ProcessLike;

/// How long the requester polls for a response file.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
/// Poll cadence of the requester.
const RESPONSE_POLL: Duration = Duration::from_millis(250);

/// The control verbs addressing one unit (or all, with `true`).
const UNIT_VERBS: [&str; 5] = ["start", "stop", "restart", "block", "unblock"];

/// Spawns the control responder loop over `ipc`.
pub(crate) fn spawn_control_loop(
    ipc: FileIpc,
    units: Arc<HashMap<String, Arc<dyn ProcessLike>>>,
    roots: Vec<Arc<dyn ProcessLike>>,
    bus: Bus,
    shutdown: CancellationToken,
    token: CancellationToken,
) {
    let mut rx = ipc.receive(token.child_token());

    tokio::spawn(async move {
        while let Some(batch) = rx.recv().await {
            for msg in batch {
                if !msg.is_valid() {
                    warn!(errors = ?msg.errors, pid = ?msg.pid, "ipc message rejected");
                    continue;
                }
                let Some(payload) = msg.payload else { continue };

                let mut ev = Event::now(EventKind::IpcReceived).with_reason(payload.as_str());
                if let Some(pid) = msg.pid {
                    ev = ev.with_pid(pid as u32);
                }
                bus.publish(ev);

                let envelope: Value = match serde_json::from_str(&payload) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        warn!("ipc payload is not a control envelope: {e}");
                        continue;
                    }
                };

                let success = dispatch(&envelope, &units, &roots, &shutdown).await;
                if let Some(sender) = envelope.get("senderUuid").and_then(Value::as_str) {
                    respond(ipc.path(), sender, success).await;
                }
            }
        }
    });
}

/// Applies one envelope; `true` when the verb found its target.
async fn dispatch(
    envelope: &Value,
    units: &HashMap<String, Arc<dyn ProcessLike>>,
    roots: &[Arc<dyn ProcessLike>],
    shutdown: &CancellationToken,
) -> bool {
    if envelope.get("terminate").is_some() {
        info!("terminate requested over ipc");
        shutdown.cancel();
        return true;
    }

    for verb in UNIT_VERBS {
        let Some(target) = envelope.get(verb) else {
            continue;
        };
        let targets: Vec<Arc<dyn ProcessLike>> = match target {
            Value::String(id) => match units.get(id) {
                Some(unit) => vec![Arc::clone(unit)],
                None => {
                    warn!(verb, id = %id, "ipc verb for unknown process");
                    return false;
                }
            },
            Value::Bool(true) => roots.to_vec(),
            _ => return false,
        };

        for unit in targets {
            apply_verb(verb, unit).await;
        }
        return true;
    }
    false
}

async fn apply_verb(verb: &str, unit: Arc<dyn ProcessLike>) {
    match verb {
        "start" => {
            tokio::spawn(unit.start("IPC start", false));
        }
        "stop" => {
            unit.stop("IPC stop").await;
        }
        "restart" => unit.restart("IPC restart").await,
        "block" => unit.block("IPC block"),
        "unblock" => unit.unblock("IPC unblock"),
        _ => {}
    }
}

/// Writes the per-request response file; failures only log.
async fn respond(ipc_path: &Path, sender: &str, success: bool) {
    let path = response_path(ipc_path, sender);
    let body = serde_json::json!({ "success": success }).to_string();
    if let Err(e) = tokio::fs::write(&path, body).await {
        warn!(path = %path.display(), "response write failed: {e}");
    }
}

fn response_path(ipc_path: &Path, sender: &str) -> PathBuf {
    PathBuf::from(format!("{}.{}", ipc_path.display(), sender))
}

/// Client half: sends a verb and waits for the supervisor's response.
///
/// Returns the `success` flag from the response file, or
/// [`IpcError::ResponseTimeout`] when no supervisor answered within ten
/// seconds.
pub async fn send_control(
    ipc_path: impl Into<PathBuf>,
    verb: &str,
    target: Option<&str>,
) -> Result<bool, IpcError> {
    let ipc = FileIpc::new(ipc_path);
    let sender = Uuid::new_v4().to_string();

    let value = match target {
        Some(id) => Value::String(id.to_string()),
        None => Value::Bool(true),
    };
    let envelope = serde_json::json!({ verb: value, "senderUuid": sender });
    ipc.send(&envelope.to_string()).await?;

    let path = response_path(ipc.path(), &sender);
    let deadline = tokio::time::Instant::now() + RESPONSE_TIMEOUT;
    loop {
        if let Ok(text) = tokio::fs::read_to_string(&path).await {
            let _ = tokio::fs::remove_file(&path).await;
            let success = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("success").and_then(Value::as_bool))
                .unwrap_or(false);
            return Ok(success);
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(IpcError::ResponseTimeout {
                timeout: RESPONSE_TIMEOUT,
            });
        }
        tokio::time::sleep(RESPONSE_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_path_appends_sender_uuid() {
        let path = response_path(Path::new("/tmp/pup/control.json"), "abc-123");
        assert_eq!(path, PathBuf::from("/tmp/pup/control.json.abc-123"));
    }
}
