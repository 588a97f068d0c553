//! Host requirement checks, run as the first Setup phase.

use std::path::Path;
use std::process::Command;

/// Individual check outcome.
#[derive(Debug, Clone)]
pub struct CheckItem {
    pub name: String,
    pub passed: bool,
    pub message: String,
}

fn check(name: &str, passed: bool, message: String) -> CheckItem {
    CheckItem {
        name: name.to_string(),
        passed,
        message,
    }
}

fn binary_on_path(binary: &str) -> bool {
    Command::new(binary)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check everything the orchestrator needs from the host. Returns the full
/// check list; callers report the failed items.
pub fn check_host_requirements() -> Vec<CheckItem> {
    let is_root = unsafe { libc::getuid() } == 0;

    vec![
        check(
            "root",
            is_root,
            if is_root {
                "running as root".to_string()
            } else {
                "must run as root to manage systemd units and mounts".to_string()
            },
        ),
        check(
            "systemd",
            Path::new("/run/systemd/system").is_dir(),
            "host init system must be systemd (/run/systemd/system)".to_string(),
        ),
        check(
            "systemctl",
            binary_on_path("systemctl"),
            "systemctl must be on PATH".to_string(),
        ),
        check(
            "iptables",
            binary_on_path("iptables"),
            "iptables must be on PATH for pod network NAT".to_string(),
        ),
        check(
            "proc",
            Path::new("/proc/mounts").exists(),
            "/proc must be mounted".to_string(),
        ),
    ]
}

/// First failing capability, formatted for the requirement error.
pub fn first_failure(checks: &[CheckItem]) -> Option<String> {
    checks
        .iter()
        .find(|c| !c.passed)
        .map(|c| format!("{}: {}", c.name, c.message))
}
