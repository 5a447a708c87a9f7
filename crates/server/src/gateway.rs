//! Gateway record (§4.6, §6): the on-disk file a CLI client reads to
//! locate a running control-plane daemon. Written atomically on start,
//! removed on clean stop. Extends the teacher's PID-file-only approach
//! (`cmd_status.rs`) with a small JSON record.

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{Config, PROTOCOL_VERSION};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRecord {
    pub pid: u32,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub version: u32,
}

impl GatewayRecord {
    pub fn new(pid: u32, port: u16, auth_token: Option<String>) -> Self {
        Self {
            pid,
            port,
            auth_token,
            started_at: chrono::Utc::now(),
            version: PROTOCOL_VERSION,
        }
    }
}

/// Writes the gateway record atomically: write to a sibling temp file,
/// then rename over the final path so readers never observe a partial
/// write.
pub fn write_record(path: &Path, record: &GatewayRecord) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(record)?;
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Removes the gateway record on clean shutdown. Missing file is not an
/// error — the daemon may never have bound successfully.
pub fn remove_record(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(
                component = "gateway",
                event = "gateway.record.remove_error",
                path = %path.display(),
                error = %e,
                "Failed to remove gateway record"
            );
        }
    }
}

/// Reads a gateway record, tolerant of unknown keys and any key order
/// (§4.6: "readers MUST accept any key order and tolerate unknown keys").
pub fn read_record(path: &Path) -> anyhow::Result<Option<GatewayRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    Ok(Some(serde_json::from_str(&content)?))
}

pub fn default_record_path(config: &Config) -> PathBuf {
    config.gateway_record_path()
}

/// `kill -0` liveness probe, matching the teacher's `cmd_status.rs`.
pub fn process_alive(pid: u32) -> bool {
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

/// `gateway status`: reads the record and checks process liveness.
pub fn status(path: &Path) -> anyhow::Result<GatewayStatus> {
    let Some(record) = read_record(path)? else {
        return Ok(GatewayStatus::Stopped);
    };
    if process_alive(record.pid) {
        Ok(GatewayStatus::Running(record))
    } else {
        Ok(GatewayStatus::Stale(record))
    }
}

pub enum GatewayStatus {
    Running(GatewayRecord),
    /// Record on disk but the process is gone — a crash left it behind.
    Stale(GatewayRecord),
    Stopped,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        let record = GatewayRecord::new(std::process::id(), 4500, Some("tok".into()));
        write_record(&path, &record).unwrap();

        let read = read_record(&path).unwrap().unwrap();
        assert_eq!(read.pid, record.pid);
        assert_eq!(read.port, 4500);
        assert_eq!(read.auth_token.as_deref(), Some("tok"));
    }

    #[test]
    fn tolerates_unknown_keys_and_reordering() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        std::fs::write(
            &path,
            r#"{"version":2,"unknownField":"ignored","pid":123,"port":4500,"startedAt":"2026-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        let record = read_record(&path).unwrap().unwrap();
        assert_eq!(record.pid, 123);
        assert_eq!(record.auth_token, None);
    }

    #[test]
    fn status_reports_stopped_when_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.json");
        assert!(matches!(status(&path).unwrap(), GatewayStatus::Stopped));
    }
}
