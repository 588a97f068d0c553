//! Dependency descriptors, constructed once at environment build time.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Config, ContainerRuntime};

/// How the downloaded archive is unpacked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// Gzip-compressed tarball; the wanted entry is extracted.
    TarGz,
    /// Zip archive; the wanted entry is extracted.
    Zip,
    /// The download is the executable itself.
    Raw,
}

/// One required executable: where it comes from, where it lands, and how its
/// version is verified. Never mutated after construction.
#[derive(Debug, Clone)]
pub struct BinaryDependency {
    /// Installed binary file name, e.g. "hyperkube".
    pub name: String,
    /// Declared version the binary must report.
    pub version: String,
    /// Source archive URL.
    pub archive_url: String,
    /// Local archive path under the binaries directory.
    pub archive_path: PathBuf,
    /// Installed binary path.
    pub binary_path: PathBuf,
    pub kind: ArchiveKind,
    /// File name of the wanted entry inside the archive; defaults to `name`.
    pub archive_entry: Option<String>,
    /// Arguments passed to the binary to make it print its version.
    /// None disables verification for executables without a version command.
    pub version_command: Option<Vec<String>>,
    /// Skip version verification; the binary still has to exist.
    pub skip_version_verify: bool,
    /// Bounded per-archive download timeout.
    pub download_timeout: Duration,
}

/// Build the descriptor set for a configuration. Hyperkube, etcd, vault and
/// the CNI bridge plugin are always required; containerd and runc only when
/// the runtime is out-of-process.
pub fn build_dependencies(config: &Config, bin_dir: &Path) -> Vec<BinaryDependency> {
    let timeout = config.download_timeout();
    let mut deps = vec![
        BinaryDependency {
            name: "hyperkube".to_string(),
            version: config.hyperkube_version.clone(),
            archive_url: format!(
                "https://dl.k8s.io/v{}/kubernetes-server-linux-amd64.tar.gz",
                config.hyperkube_version
            ),
            archive_path: bin_dir.join(format!("hyperkube-v{}.tar.gz", config.hyperkube_version)),
            binary_path: bin_dir.join("hyperkube"),
            kind: ArchiveKind::TarGz,
            archive_entry: None,
            version_command: Some(vec!["kubelet".to_string(), "--version".to_string()]),
            skip_version_verify: config.skip_binaries_version,
            download_timeout: timeout,
        },
        BinaryDependency {
            name: "etcd".to_string(),
            version: config.etcd_version.clone(),
            archive_url: format!(
                "https://github.com/etcd-io/etcd/releases/download/v{v}/etcd-v{v}-linux-amd64.tar.gz",
                v = config.etcd_version
            ),
            archive_path: bin_dir.join(format!("etcd-v{}.tar.gz", config.etcd_version)),
            binary_path: bin_dir.join("etcd"),
            kind: ArchiveKind::TarGz,
            archive_entry: None,
            version_command: Some(vec!["--version".to_string()]),
            skip_version_verify: config.skip_binaries_version,
            download_timeout: timeout,
        },
        BinaryDependency {
            name: "vault".to_string(),
            version: config.vault_version.clone(),
            archive_url: format!(
                "https://releases.hashicorp.com/vault/{v}/vault_{v}_linux_amd64.zip",
                v = config.vault_version
            ),
            archive_path: bin_dir.join(format!("vault-v{}.zip", config.vault_version)),
            binary_path: bin_dir.join("vault"),
            kind: ArchiveKind::Zip,
            archive_entry: None,
            version_command: Some(vec!["--version".to_string()]),
            skip_version_verify: config.skip_binaries_version,
            download_timeout: timeout,
        },
        BinaryDependency {
            name: "bridge".to_string(),
            version: config.cni_version.clone(),
            archive_url: format!(
                "https://github.com/containernetworking/plugins/releases/download/v{v}/cni-plugins-linux-amd64-v{v}.tgz",
                v = config.cni_version
            ),
            archive_path: bin_dir.join(format!("cni-v{}.tar.gz", config.cni_version)),
            binary_path: bin_dir.join("bridge"),
            kind: ArchiveKind::TarGz,
            archive_entry: None,
            // CNI plugins print no stable version banner
            version_command: None,
            skip_version_verify: true,
            download_timeout: timeout,
        },
    ];

    if config.container_runtime == ContainerRuntime::Containerd {
        deps.push(BinaryDependency {
            name: "containerd".to_string(),
            version: config.containerd_version.clone(),
            archive_url: format!(
                "https://github.com/containerd/containerd/releases/download/v{v}/containerd-{v}-linux-amd64.tar.gz",
                v = config.containerd_version
            ),
            archive_path: bin_dir.join(format!("containerd-v{}.tar.gz", config.containerd_version)),
            binary_path: bin_dir.join("containerd"),
            kind: ArchiveKind::TarGz,
            archive_entry: None,
            version_command: Some(vec!["--version".to_string()]),
            skip_version_verify: config.skip_binaries_version,
            download_timeout: timeout,
        });
        deps.push(BinaryDependency {
            name: "runc".to_string(),
            version: config.runc_version.clone(),
            archive_url: format!(
                "https://github.com/opencontainers/runc/releases/download/v{}/runc.amd64",
                config.runc_version
            ),
            archive_path: bin_dir.join(format!("runc-v{}", config.runc_version)),
            binary_path: bin_dir.join("runc"),
            kind: ArchiveKind::Raw,
            archive_entry: None,
            version_command: Some(vec!["--version".to_string()]),
            skip_version_verify: config.skip_binaries_version,
            download_timeout: timeout,
        });
    }

    deps
}

impl BinaryDependency {
    /// File name looked up inside the archive.
    pub fn wanted_entry(&self) -> &str {
        self.archive_entry.as_deref().unwrap_or(&self.name)
    }
}
