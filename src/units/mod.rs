//! Unit orchestrator: wraps the host init system's unit management.
//!
//! Ordering is expressed declaratively inside each unit's dependency section
//! (Requires/After); the orchestrator only chooses the start sequence and
//! relies on systemd for restart and failure propagation.

mod managed;
mod systemctl;

pub use managed::{build_units, unit_names, ManagedUnit, UnitLayout, UnitRole};
pub use systemctl::Systemctl;

use async_trait::async_trait;

use crate::error::SetupError;

/// Observed unit state, as reported by the init system.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitState {
    Active,
    Activating,
    Deactivating,
    Inactive,
    Failed,
    Unknown(String),
}

impl UnitState {
    pub fn parse(s: &str) -> UnitState {
        match s.trim() {
            "active" => UnitState::Active,
            "activating" => UnitState::Activating,
            "deactivating" => UnitState::Deactivating,
            "inactive" => UnitState::Inactive,
            "failed" => UnitState::Failed,
            other => UnitState::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            UnitState::Active => "active",
            UnitState::Activating => "activating",
            UnitState::Deactivating => "deactivating",
            UnitState::Inactive => "inactive",
            UnitState::Failed => "failed",
            UnitState::Unknown(s) => s,
        }
    }
}

/// Init-system interface held for the duration of a run. Production uses
/// `Systemctl`; tests substitute a recording fake.
#[async_trait]
pub trait SystemdManager: Send + Sync {
    /// Install a unit definition. The manager's view of units is refreshed
    /// by a subsequent `daemon_reload`.
    async fn register(&self, unit_name: &str, unit_text: &str) -> Result<(), SetupError>;

    /// Reload the init system's view of unit files.
    async fn daemon_reload(&self) -> Result<(), SetupError>;

    /// Start a unit and block until it is active or the start timeout
    /// elapses. Timeout failures carry the unit's last observed state.
    async fn start(&self, unit_name: &str) -> Result<(), SetupError>;

    /// Stop a unit and block until it has left the active state.
    async fn stop(&self, unit_name: &str) -> Result<(), SetupError>;

    /// Query a unit's current state.
    async fn status(&self, unit_name: &str) -> Result<UnitState, SetupError>;

    /// Remove a unit definition and clear any failed state.
    async fn remove(&self, unit_name: &str) -> Result<(), SetupError>;
}
