//! # Telemetry client for spawned children.
//!
//! The supervisor injects `PUP_PROCESS_ID` and `PUP_DATA_STORAGE` into
//! every spawned unit; a child that wants to talk back constructs one
//! [`TelemetryClient`] from those variables and threads it through the few
//! call sites that emit. There is no process-wide implicit instance.

use std::path::Path;

use crate::error::IpcError;
use crate::ipc::file_ipc::FileIpc;
use crate::process::{ENV_DATA_STORAGE, ENV_PROCESS_ID};

/// File name of the telemetry channel inside the data storage directory.
const TELEMETRY_FILE: &str = ".pup.telemetry";

/// Client half of the child → supervisor telemetry channel.
#[derive(Clone, Debug)]
pub struct TelemetryClient {
    ipc: FileIpc,
    process_id: String,
}

impl TelemetryClient {
    /// Builds a client over an explicit data directory and process id.
    pub fn new(data_dir: impl AsRef<Path>, process_id: impl Into<String>) -> Self {
        Self {
            ipc: FileIpc::new(data_dir.as_ref().join(TELEMETRY_FILE)),
            process_id: process_id.into(),
        }
    }

    /// Builds a client from the environment the supervisor injected.
    ///
    /// Returns `None` outside a supervised child (either variable absent).
    pub fn from_env() -> Option<Self> {
        let data_dir = std::env::var(ENV_DATA_STORAGE).ok()?;
        let process_id = std::env::var(ENV_PROCESS_ID).ok()?;
        Some(Self::new(data_dir, process_id))
    }

    /// The identity this client reports under.
    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    /// Emits one telemetry payload.
    pub async fn emit(&self, payload: &str) -> Result<(), IpcError> {
        let envelope = serde_json::json!({
            "from": self.process_id,
            "data": payload,
        });
        self.ipc.send(&envelope.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_writes_through_the_shared_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = TelemetryClient::new(dir.path(), "worker-1");
        client.emit("42 items processed").await.expect("emit");
        let text = std::fs::read_to_string(dir.path().join(TELEMETRY_FILE)).expect("read");
        assert!(text.contains("worker-1"));
        assert!(text.contains("42 items processed"));
    }
}
