//! Central configuration resolution for the control-plane daemon (§10.4).
//!
//! Resolved once at startup from, in priority order: explicit CLI flag >
//! environment variable > default, mirroring the teacher's `paths.rs`
//! `init_data_dir` precedence pattern generalized to every tunable the
//! daemon needs.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Protocol version advertised in `auth.ok` and the gateway record (§12
/// open question 1: this implementation targets full 64-bit cursors).
pub const PROTOCOL_VERSION: u32 = 2;

const DEFAULT_RING_CAPACITY: usize = 2 * 1024 * 1024;
const DEFAULT_QUEUE_DEPTH: usize = 1024;
const DEFAULT_RETENTION_DEPTH: usize = 4096;
const DEFAULT_GRACE_PERIOD_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct Config {
    pub runtime_dir: PathBuf,
    pub port: u16,
    pub auth_token: String,
    pub ring_capacity: usize,
    pub subscription_queue_depth: usize,
    pub retention_depth: usize,
    pub grace_period_secs: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub runtime_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub auth_token: Option<String>,
}

impl Config {
    /// `--runtime-dir` > `$HARNESS_RUNTIME` > `~/.harness`.
    /// `--port` > `$HARNESS_CONTROL_PLANE_PORT` > `0` (OS-assigned).
    /// `--token` > `$HARNESS_CONTROL_PLANE_TOKEN` > a generated UUID.
    pub fn resolve(overrides: ConfigOverrides) -> Self {
        let runtime_dir = overrides
            .runtime_dir
            .or_else(|| std::env::var("HARNESS_RUNTIME").ok().map(PathBuf::from))
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .expect("HOME directory not found")
                    .join(".harness")
            });

        let port = overrides
            .port
            .or_else(|| {
                std::env::var("HARNESS_CONTROL_PLANE_PORT")
                    .ok()
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(0);

        let auth_token = overrides
            .auth_token
            .or_else(|| std::env::var("HARNESS_CONTROL_PLANE_TOKEN").ok())
            .unwrap_or_else(|| harness_protocol::new_id());

        let config = Config {
            runtime_dir,
            port,
            auth_token,
            ring_capacity: DEFAULT_RING_CAPACITY,
            subscription_queue_depth: DEFAULT_QUEUE_DEPTH,
            retention_depth: DEFAULT_RETENTION_DEPTH,
            grace_period_secs: DEFAULT_GRACE_PERIOD_SECS,
        };

        let mut guard = RUNTIME_DIR.write().expect("RUNTIME_DIR lock poisoned");
        *guard = Some(config.runtime_dir.clone());
        config
    }

    pub fn db_path(&self) -> PathBuf {
        self.runtime_dir.join("control-plane.db")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.runtime_dir.join("logs")
    }

    pub fn gateway_record_path(&self) -> PathBuf {
        self.runtime_dir.join("gateway.json")
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        std::fs::create_dir_all(&self.runtime_dir)?;
        std::fs::create_dir_all(self.log_dir())?;
        Ok(())
    }
}

static RUNTIME_DIR: RwLock<Option<PathBuf>> = RwLock::new(None);

/// The resolved runtime directory, for callsites that don't carry a
/// `Config` reference (e.g. the CLI's gateway-record lookup). Panics if
/// `Config::resolve` hasn't run yet.
pub fn runtime_dir() -> PathBuf {
    RUNTIME_DIR
        .read()
        .expect("RUNTIME_DIR lock poisoned")
        .clone()
        .unwrap_or_else(|| {
            dirs::home_dir()
                .expect("HOME directory not found")
                .join(".harness")
        })
}

/// Default gateway record location for a named session, per §6's
/// `$HARNESS_RUNTIME/sessions/<name>/gateway.json` alternative path.
pub fn named_session_gateway_path(runtime_dir: &Path, name: &str) -> PathBuf {
    runtime_dir.join("sessions").join(name).join("gateway.json")
}

#[cfg(test)]
pub fn reset_for_test() {
    let mut guard = RUNTIME_DIR.write().expect("RUNTIME_DIR lock poisoned");
    *guard = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_overridden() {
        std::env::remove_var("HARNESS_RUNTIME");
        std::env::remove_var("HARNESS_CONTROL_PLANE_PORT");
        std::env::remove_var("HARNESS_CONTROL_PLANE_TOKEN");
        let config = Config::resolve(ConfigOverrides::default());
        assert_eq!(config.port, 0);
        assert!(!config.auth_token.is_empty());
        reset_for_test();
    }

    #[test]
    fn explicit_override_wins_over_everything() {
        std::env::set_var("HARNESS_CONTROL_PLANE_PORT", "9999");
        let config = Config::resolve(ConfigOverrides {
            port: Some(4242),
            ..Default::default()
        });
        assert_eq!(config.port, 4242);
        std::env::remove_var("HARNESS_CONTROL_PLANE_PORT");
        reset_for_test();
    }
}
