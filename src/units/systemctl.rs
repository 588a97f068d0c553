//! Production systemd manager: unit files dropped under /run/systemd/system
//! plus `systemctl` invocations, with bounded waits for state transitions.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{SystemdManager, UnitState};
use crate::error::SetupError;

const DEFAULT_UNIT_DIR: &str = "/run/systemd/system";
const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct Systemctl {
    unit_dir: PathBuf,
    start_timeout: Duration,
}

impl Systemctl {
    pub fn new(start_timeout: Duration) -> Self {
        Systemctl {
            unit_dir: PathBuf::from(DEFAULT_UNIT_DIR),
            start_timeout,
        }
    }

    /// Override the unit file directory.
    pub fn with_unit_dir(start_timeout: Duration, unit_dir: PathBuf) -> Self {
        Systemctl {
            unit_dir,
            start_timeout,
        }
    }

    async fn systemctl(&self, args: &[&str]) -> Result<std::process::Output, SetupError> {
        let output = Command::new("systemctl").args(args).output().await?;
        Ok(output)
    }

    /// Poll the unit state until `done` matches or the start timeout elapses.
    async fn wait_for<F>(&self, unit_name: &str, action: &str, done: F) -> Result<(), SetupError>
    where
        F: Fn(&UnitState) -> bool,
    {
        let deadline = tokio::time::Instant::now() + self.start_timeout;
        let mut last_state;
        loop {
            last_state = self.status(unit_name).await?;
            if done(&last_state) {
                return Ok(());
            }
            if last_state == UnitState::Failed && action == "start" {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
        Err(SetupError::Systemd {
            unit: unit_name.to_string(),
            last_state: last_state.as_str().to_string(),
            message: format!(
                "did not acknowledge {} within {:?}",
                action, self.start_timeout
            ),
        })
    }
}

#[async_trait]
impl SystemdManager for Systemctl {
    async fn register(&self, unit_name: &str, unit_text: &str) -> Result<(), SetupError> {
        std::fs::create_dir_all(&self.unit_dir)?;
        let path = self.unit_dir.join(unit_name);
        std::fs::write(&path, unit_text)?;
        tracing::info!("[Systemctl] Registered unit {}", path.display());
        Ok(())
    }

    async fn daemon_reload(&self) -> Result<(), SetupError> {
        let output = self.systemctl(&["daemon-reload"]).await?;
        if !output.status.success() {
            return Err(SetupError::Systemd {
                unit: "-".to_string(),
                last_state: "-".to_string(),
                message: format!(
                    "daemon-reload failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }

    async fn start(&self, unit_name: &str) -> Result<(), SetupError> {
        tracing::info!("[Systemctl] Starting {}", unit_name);
        let output = self.systemctl(&["start", "--no-block", unit_name]).await?;
        if !output.status.success() {
            return Err(SetupError::Systemd {
                unit: unit_name.to_string(),
                last_state: self.status(unit_name).await?.as_str().to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        self.wait_for(unit_name, "start", |s| *s == UnitState::Active)
            .await
    }

    async fn stop(&self, unit_name: &str) -> Result<(), SetupError> {
        tracing::info!("[Systemctl] Stopping {}", unit_name);
        let output = self.systemctl(&["stop", unit_name]).await?;
        if !output.status.success() {
            // Stopping a unit systemd has never heard of is fine
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("not loaded") {
                return Ok(());
            }
            return Err(SetupError::Systemd {
                unit: unit_name.to_string(),
                last_state: self.status(unit_name).await?.as_str().to_string(),
                message: stderr.trim().to_string(),
            });
        }
        self.wait_for(unit_name, "stop", |s| {
            matches!(s, UnitState::Inactive | UnitState::Failed)
        })
        .await
    }

    async fn status(&self, unit_name: &str) -> Result<UnitState, SetupError> {
        // is-active exits non-zero for every state but active; the state
        // name is still on stdout
        let output = self.systemctl(&["is-active", unit_name]).await?;
        Ok(UnitState::parse(&String::from_utf8_lossy(&output.stdout)))
    }

    async fn remove(&self, unit_name: &str) -> Result<(), SetupError> {
        let _ = self.systemctl(&["reset-failed", unit_name]).await;
        let path = self.unit_dir.join(unit_name);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!("[Systemctl] Removed unit {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
