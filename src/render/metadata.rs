//! Template metadata: the flat mapping of symbolic names to values consumed
//! by the renderer.
//!
//! Two-stage builder: static fields are collected at environment build time,
//! hostname and node IP are supplied by `finalize` once the hostname phase
//! has run. Rendering before finalize is impossible by construction.

use std::path::PathBuf;
use std::process::Command;

use crate::config::ContainerRuntime;

/// Static metadata collected at construction time.
#[derive(Debug, Clone)]
pub struct MetadataBuilder {
    pub hyperkube_image_url: String,
    pub root_path: PathBuf,
    pub bin_path: PathBuf,
    pub etcd_data_path: PathBuf,
    pub secrets_path: PathBuf,
    pub network_config_path: PathBuf,
    pub manifest_static_pod_path: PathBuf,
    pub logs_path: PathBuf,
    pub kubelet_root_dir: PathBuf,
    pub service_cluster_ip_range: String,
    pub kubernetes_cluster_ip: String,
    pub dns_cluster_ip: String,
    pub pod_cidr: String,
    pub pod_gateway_ip: String,
    pub cgroup_driver: String,
    pub container_runtime: String,
    pub container_runtime_endpoint: String,
    pub vault_root_token: String,
}

impl MetadataBuilder {
    /// Fill in the fields only known after hostname resolution.
    pub fn finalize(self, hostname: String, node_ip: String) -> TemplateMetadata {
        TemplateMetadata {
            builder: self,
            hostname,
            node_ip,
        }
    }
}

/// Finalized, immutable metadata. The only way to get one is through
/// `MetadataBuilder::finalize`.
#[derive(Debug, Clone)]
pub struct TemplateMetadata {
    builder: MetadataBuilder,
    pub hostname: String,
    pub node_ip: String,
}

impl TemplateMetadata {
    /// Build the Tera context every render starts from.
    pub fn context(&self) -> tera::Context {
        let b = &self.builder;
        let mut context = tera::Context::new();
        context.insert("hyperkube_image_url", &b.hyperkube_image_url);
        context.insert("root_path", &b.root_path.display().to_string());
        context.insert("bin_path", &b.bin_path.display().to_string());
        context.insert("etcd_data_path", &b.etcd_data_path.display().to_string());
        context.insert("secrets_path", &b.secrets_path.display().to_string());
        context.insert(
            "network_config_path",
            &b.network_config_path.display().to_string(),
        );
        context.insert(
            "manifest_static_pod_path",
            &b.manifest_static_pod_path.display().to_string(),
        );
        context.insert("logs_path", &b.logs_path.display().to_string());
        context.insert(
            "kubelet_root_dir",
            &b.kubelet_root_dir.display().to_string(),
        );
        context.insert("service_cluster_ip_range", &b.service_cluster_ip_range);
        context.insert("kubernetes_cluster_ip", &b.kubernetes_cluster_ip);
        context.insert("dns_cluster_ip", &b.dns_cluster_ip);
        context.insert("pod_cidr", &b.pod_cidr);
        context.insert("pod_gateway_ip", &b.pod_gateway_ip);
        context.insert("cgroup_driver", &b.cgroup_driver);
        context.insert("container_runtime", &b.container_runtime);
        context.insert(
            "container_runtime_endpoint",
            &b.container_runtime_endpoint,
        );
        context.insert("vault_root_token", &b.vault_root_token);
        context.insert("hostname", &self.hostname);
        context.insert("node_ip", &self.node_ip);
        context
    }

    pub fn bin_path(&self) -> &PathBuf {
        &self.builder.bin_path
    }
}

/// Cgroup driver for the kubelet config. Only the docker daemon is
/// introspected; other runtimes get the fixed default directly. Probe
/// failure is recoverable: logged, then the default applies.
pub fn detect_cgroup_driver(runtime: ContainerRuntime) -> String {
    const DEFAULT: &str = "cgroupfs";
    if runtime != ContainerRuntime::Docker {
        return DEFAULT.to_string();
    }
    let probe = Command::new("docker")
        .args(["info", "--format", "{{.CgroupDriver}}"])
        .output();
    match probe {
        Ok(output) if output.status.success() => {
            let driver = String::from_utf8_lossy(&output.stdout).trim().to_string();
            if driver.is_empty() {
                tracing::warn!(
                    "[Metadata] Docker reported an empty cgroup driver, falling back to '{}'",
                    DEFAULT
                );
                DEFAULT.to_string()
            } else {
                tracing::debug!("[Metadata] Detected cgroup driver: {}", driver);
                driver
            }
        }
        Ok(output) => {
            tracing::warn!(
                "[Metadata] Failed to guess docker cgroup driver (exit {:?}), falling back to '{}'",
                output.status.code(),
                DEFAULT
            );
            DEFAULT.to_string()
        }
        Err(e) => {
            tracing::warn!(
                "[Metadata] Failed to guess docker cgroup driver, falling back to '{}': {}",
                DEFAULT,
                e
            );
            DEFAULT.to_string()
        }
    }
}
