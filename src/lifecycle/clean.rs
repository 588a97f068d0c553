//! Selective cleanup: per-category, independent removal of everything the
//! orchestrator created. A failure in one category never blocks the others;
//! failures are collected and reported together.

use std::fmt;
use std::path::Path;
use std::process::Command;

use super::{Environment, LifecycleState, KUBELET_CRI_LOG_PATH};
use crate::error::SetupError;
use crate::options::CleanCategory;
use crate::units::unit_names;

/// Outcome of a clean run: the categories attempted and any failures.
#[derive(Debug)]
pub struct CleanReport {
    pub attempted: Vec<CleanCategory>,
    pub failures: Vec<(CleanCategory, SetupError)>,
}

impl CleanReport {
    pub fn is_ok(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for CleanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failures.is_empty() {
            write!(f, "cleaned {} categories", self.attempted.len())
        } else {
            write!(
                f,
                "cleaned {} categories, {} failed:",
                self.attempted.len() - self.failures.len(),
                self.failures.len()
            )?;
            for (category, error) in &self.failures {
                write!(f, " [{}: {}]", category, error)?;
            }
            Ok(())
        }
    }
}

impl Environment {
    /// Remove on-disk and init-system artifacts according to the effective
    /// cleanup policy. Categories in the keep set are skipped entirely;
    /// with `keep=all` this is a no-op.
    pub async fn clean(&mut self) -> CleanReport {
        self.state = LifecycleState::Cleaning;
        let mut report = CleanReport {
            attempted: Vec::new(),
            failures: Vec::new(),
        };

        for category in self.clean_options.categories().collect::<Vec<_>>() {
            tracing::info!("[Lifecycle] Cleaning {}", category);
            report.attempted.push(category);
            let result = match category {
                CleanCategory::Binaries => remove_path(&self.bin_path),
                CleanCategory::Etcd => remove_path(&self.etcd_data_path),
                CleanCategory::Iptables => {
                    flush_pod_nat_rules();
                    Ok(())
                }
                CleanCategory::Kubectl => self.clean_kubectl(),
                CleanCategory::Kubelet => self.clean_kubelet(),
                CleanCategory::Logs => remove_path(&self.logs_path),
                CleanCategory::Manifests => self.clean_manifests(),
                CleanCategory::Mounts => self.clean_mounts(),
                CleanCategory::Network => self.clean_network(),
                CleanCategory::Secrets => remove_path(&self.secrets_path),
                CleanCategory::Systemd => self.clean_systemd().await,
            };
            if let Err(e) = result {
                tracing::warn!("[Lifecycle] Cleanup of {} failed: {}", category, e);
                report.failures.push((category, e));
            }
        }

        self.state = LifecycleState::Terminated;
        tracing::info!("[Lifecycle] {}", report);
        report
    }

    fn clean_kubectl(&self) -> Result<(), SetupError> {
        if !self.config.kubectl_link.is_empty() {
            remove_file_if_exists(Path::new(&self.config.kubectl_link))?;
        }
        remove_file_if_exists(&self.kubeconfig_user_path)
    }

    fn clean_kubelet(&self) -> Result<(), SetupError> {
        remove_path(&self.kubelet_root_dir)?;
        remove_path(Path::new(KUBELET_CRI_LOG_PATH))
    }

    fn clean_manifests(&self) -> Result<(), SetupError> {
        remove_path(&self.manifest_api_path)?;
        remove_path(&self.manifest_static_pod_path)?;
        remove_path(&self.manifest_config_path)?;
        remove_path(&self.manifest_systemd_unit_path)?;
        remove_path(&self.source_templates_path)
    }

    fn clean_network(&self) -> Result<(), SetupError> {
        // Delete the pod bridge link if it survived; absence is fine
        let _ = Command::new("ip")
            .args(["link", "delete", "p8s0"])
            .output();
        remove_path(&self.network_config_path)?;
        remove_path(&self.network_state_path)
    }

    fn clean_mounts(&self) -> Result<(), SetupError> {
        let prefix = self.kubelet_root_dir.display().to_string();
        let mounts = match std::fs::read_to_string("/proc/mounts") {
            Ok(mounts) => mounts,
            // No /proc means nothing kubelet-mounted to undo
            Err(e) => {
                tracing::debug!("[Lifecycle] Cannot read /proc/mounts: {}", e);
                return Ok(());
            }
        };
        let mut first_error = None;
        for line in mounts.lines() {
            let Some(mount_point) = line.split_whitespace().nth(1) else {
                continue;
            };
            if !mount_point.starts_with(&prefix) {
                continue;
            }
            tracing::info!("[Lifecycle] Unmounting {}", mount_point);
            let output = Command::new("umount").arg(mount_point).output()?;
            if !output.status.success() && first_error.is_none() {
                first_error = Some(SetupError::Config(format!(
                    "umount {} failed: {}",
                    mount_point,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn clean_systemd(&self) -> Result<(), SetupError> {
        // Unit names are deterministic from the prefix and runtime, so a
        // standalone clean targets an earlier run's units without a render
        let names: Vec<String> = if self.units.is_empty() {
            unit_names(
                &self.config.systemd_unit_prefix,
                self.config.container_runtime,
            )
        } else {
            self.units.iter().map(|u| u.name.clone()).collect()
        };

        let mut first_error = None;
        for name in names.iter().rev() {
            if let Err(e) = self.systemd.stop(name).await {
                tracing::warn!("[Lifecycle] Stop during clean failed for {}: {}", name, e);
            }
            if let Err(e) = self.systemd.remove(name).await {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        if let Err(e) = self.systemd.daemon_reload().await {
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Remove a file or directory tree, treating absence as success.
fn remove_path(path: &Path) -> Result<(), SetupError> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    match result {
        Ok(()) => {
            tracing::debug!("[Lifecycle] Removed {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn remove_file_if_exists(path: &Path) -> Result<(), SetupError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Flush NAT rules installed for the pod network. Rules that no longer
/// exist are not an error.
pub(super) fn flush_pod_nat_rules() {
    let listing = Command::new("iptables").args(["-t", "nat", "-S"]).output();
    let listing = match listing {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).into_owned()
        }
        Ok(output) => {
            tracing::warn!(
                "[Lifecycle] iptables -t nat -S failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return;
        }
        Err(e) => {
            tracing::warn!("[Lifecycle] Cannot run iptables: {}", e);
            return;
        }
    };

    for rule in listing.lines() {
        // CNI host-local rules are tagged with the network name
        if !rule.contains("p8s") {
            continue;
        }
        let Some(spec) = rule.strip_prefix("-A ") else {
            continue;
        };
        let mut args = vec!["-t", "nat", "-D"];
        args.extend(spec.split_whitespace());
        if let Err(e) = Command::new("iptables").args(&args).output() {
            tracing::warn!("[Lifecycle] Failed to delete NAT rule {:?}: {}", spec, e);
        }
    }
}

/// Remove leftover kubelet pod state after the units are down.
pub(super) fn kubelet_gc(kubelet_root_dir: &Path) {
    let pods_dir = kubelet_root_dir.join("pods");
    match std::fs::remove_dir_all(&pods_dir) {
        Ok(()) => tracing::info!("[Lifecycle] Removed {}", pods_dir.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(
            "[Lifecycle] Failed to garbage-collect {}: {}",
            pods_dir.display(),
            e
        ),
    }
}
