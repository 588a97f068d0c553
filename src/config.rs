//! Orchestrator configuration.
//!
//! A single explicit `Config` struct, constructed once and passed by
//! reference into `Environment` construction. Loaded from `p8s.toml` when
//! present, otherwise defaults. No ambient global lookups.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::SetupError;

/// Container runtime selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    /// In-process dockershim; no extra managed unit.
    #[default]
    Docker,
    /// Out-of-process containerd, managed as its own unit.
    Containerd,
}

impl ContainerRuntime {
    /// CRI socket endpoint the kubelet is pointed at.
    pub fn endpoint(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "/var/run/dockershim.sock",
            ContainerRuntime::Containerd => "/run/containerd/containerd.sock",
        }
    }

    /// Value for the kubelet `--container-runtime` flag.
    pub fn kubelet_runtime(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Containerd => "remote",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerRuntime::Docker => "docker",
            ContainerRuntime::Containerd => "containerd",
        }
    }
}

/// Orchestrator configuration, loaded from p8s.toml or defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Kubernetes version to install (hyperkube archive).
    pub hyperkube_version: String,
    /// etcd version to install.
    pub etcd_version: String,
    /// Vault version to install.
    pub vault_version: String,
    /// containerd version, installed only when the runtime is containerd.
    pub containerd_version: String,
    /// runc version, installed only when the runtime is containerd.
    pub runc_version: String,
    /// CNI plugins version (bridge binary).
    pub cni_version: String,

    /// Service cluster IP range.
    pub kubernetes_cluster_ip_range: String,
    /// Pod IP range.
    pub pod_ip_range: String,

    /// Categories removed by the clean phase.
    pub clean: String,
    /// Categories kept by the clean phase; overrides `clean` when non-empty.
    pub keep: String,
    /// Drain behavior before stop.
    pub drain: String,

    /// Per-archive download timeout.
    pub download_timeout_secs: u64,
    /// How long a unit may take to acknowledge a start or stop.
    pub unit_start_timeout_secs: u64,

    /// Prefix for generated unit names.
    pub systemd_unit_prefix: String,
    /// Container runtime selection.
    pub container_runtime: ContainerRuntime,

    /// Kubelet state root.
    pub kubelet_root_dir: String,
    /// User-facing kubeconfig path; empty means `~/.kube/config`.
    pub kubeconfig_path: String,
    /// Optional symlink target for the installed kubectl binary.
    pub kubectl_link: String,

    /// Vault root token; generated when empty.
    pub vault_root_token: String,
    /// Skip the version check after install. The binary still has to exist.
    pub skip_binaries_version: bool,

    /// Hyperkube image reference for the static pod manifest; empty means
    /// the gcr.io default for the configured version.
    pub hyperkube_image: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            hyperkube_version: "1.18.20".to_string(),
            etcd_version: "3.4.13".to_string(),
            vault_version: "1.5.4".to_string(),
            containerd_version: "1.4.3".to_string(),
            runc_version: "1.0.0-rc92".to_string(),
            cni_version: "0.8.7".to_string(),
            kubernetes_cluster_ip_range: "192.168.254.0/24".to_string(),
            pod_ip_range: "192.168.253.0/24".to_string(),
            clean: "etcd,iptables,kubectl,kubelet,logs,manifests,mounts,network,secrets,systemd"
                .to_string(),
            keep: String::new(),
            drain: "all".to_string(),
            download_timeout_secs: 600,
            unit_start_timeout_secs: 90,
            systemd_unit_prefix: "p8s-".to_string(),
            container_runtime: ContainerRuntime::Docker,
            kubelet_root_dir: "/var/lib/p8s".to_string(),
            kubeconfig_path: String::new(),
            kubectl_link: String::new(),
            vault_root_token: String::new(),
            skip_binaries_version: false,
            hyperkube_image: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self, SetupError> {
        let candidate = path.map(Path::to_path_buf).unwrap_or_else(|| "p8s.toml".into());
        if candidate.exists() {
            let content = std::fs::read_to_string(&candidate)?;
            let config: Config = toml::from_str(&content).map_err(|e| {
                SetupError::Config(format!("failed to parse {}: {}", candidate.display(), e))
            })?;
            tracing::info!("[Config] Loaded configuration from {}", candidate.display());
            Ok(config)
        } else if path.is_some() {
            Err(SetupError::Config(format!(
                "configuration file {} does not exist",
                candidate.display()
            )))
        } else {
            tracing::debug!("[Config] No p8s.toml found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    pub fn unit_start_timeout(&self) -> Duration {
        Duration::from_secs(self.unit_start_timeout_secs)
    }

    /// Kubernetes `major.minor` used to key template-layout changes.
    pub fn template_version(&self) -> String {
        let mut parts = self.hyperkube_version.split('.');
        match (parts.next(), parts.next()) {
            (Some(major), Some(minor)) => format!("{}.{}", major, minor),
            _ => self.hyperkube_version.clone(),
        }
    }

    /// Image reference used by the apiserver static pod.
    pub fn hyperkube_image_url(&self) -> String {
        if self.hyperkube_image.is_empty() {
            format!(
                "gcr.io/google_containers/hyperkube:v{}",
                self.hyperkube_version
            )
        } else {
            self.hyperkube_image.clone()
        }
    }

    /// User kubeconfig path, defaulting to `~/.kube/config`.
    pub fn kubeconfig_user_path(&self) -> std::path::PathBuf {
        if self.kubeconfig_path.is_empty() {
            dirs::home_dir()
                .unwrap_or_else(|| "/root".into())
                .join(".kube")
                .join("config")
        } else {
            self.kubeconfig_path.clone().into()
        }
    }
}
