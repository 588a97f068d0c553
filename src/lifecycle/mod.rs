//! Lifecycle controller: builds the Environment and drives the ordered
//! phase pipeline through Setup / Run / Drain / Clean.
//!
//! The Environment is the aggregate root for one run and is owned
//! exclusively by this controller. Two orchestrators pointed at the same
//! root path is out of contract (single-writer).

mod clean;

pub use clean::CleanReport;

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::deps::{build_dependencies, install_all, BinaryDependency, Installer};
use crate::error::SetupError;
use crate::health::KubeClients;
use crate::network::{outbound_ip, NetworkPlan};
use crate::options::{CleanOptions, DrainCategory, DrainOptions};
use crate::render::{detect_cgroup_driver, MetadataBuilder, TemplateMetadata, TemplateRenderer};
use crate::secrets;
use crate::units::{build_units, ManagedUnit, Systemctl, SystemdManager, UnitLayout};
use crate::{requirements, requirements::first_failure};

/// Directory where the kubelet stores pod and container logs. Not
/// configurable upstream.
pub const KUBELET_CRI_LOG_PATH: &str = "/var/log/pods/";

const BIN_DIR: &str = "bin";
const SOURCE_TEMPLATES_DIR: &str = "source-templates";
const ETCD_DATA_DIR: &str = "etcd-data";
const SECRETS_DIR: &str = "secrets";
const NETWORK_CONFIG_DIR: &str = "net.d";
const NETWORK_STATE_DIR: &str = "networks";
const LOGS_DIR: &str = "logs";
const MANIFEST_API_DIR: &str = "manifest-api";
const MANIFEST_STATIC_POD_DIR: &str = "manifest-static-pod";
const MANIFEST_CONFIG_DIR: &str = "manifest-config";
const MANIFEST_SYSTEMD_UNIT_DIR: &str = "manifest-systemd-unit";

/// Controller state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Uninitialized,
    Setup,
    Running,
    Draining,
    Cleaning,
    Terminated,
}

/// Named Setup phases, executed in strict order. Any failure aborts the
/// pipeline and is surfaced verbatim; no phase is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SetupPhase {
    Requirements,
    Hostname,
    Directories,
    Binaries,
    Network,
    Manifests,
    SystemdUnits,
    Secrets,
    KubeClients,
}

impl SetupPhase {
    const ORDERED: [SetupPhase; 9] = [
        SetupPhase::Requirements,
        SetupPhase::Hostname,
        SetupPhase::Directories,
        SetupPhase::Binaries,
        SetupPhase::Network,
        SetupPhase::Manifests,
        SetupPhase::SystemdUnits,
        SetupPhase::Secrets,
        SetupPhase::KubeClients,
    ];

    fn name(&self) -> &'static str {
        match self {
            SetupPhase::Requirements => "requirements",
            SetupPhase::Hostname => "hostname",
            SetupPhase::Directories => "directories",
            SetupPhase::Binaries => "binaries",
            SetupPhase::Network => "network",
            SetupPhase::Manifests => "manifests",
            SetupPhase::SystemdUnits => "systemd-units",
            SetupPhase::Secrets => "secrets",
            SetupPhase::KubeClients => "kube-clients",
        }
    }
}

/// Aggregate root for one orchestrator run.
pub struct Environment {
    config: Config,
    state: LifecycleState,

    root_path: PathBuf,
    bin_path: PathBuf,
    source_templates_path: PathBuf,
    manifest_api_path: PathBuf,
    manifest_static_pod_path: PathBuf,
    manifest_config_path: PathBuf,
    manifest_systemd_unit_path: PathBuf,
    etcd_data_path: PathBuf,
    secrets_path: PathBuf,
    network_config_path: PathBuf,
    network_state_path: PathBuf,
    logs_path: PathBuf,
    kubelet_root_dir: PathBuf,
    kubeconfig_auth_path: PathBuf,
    kubeconfig_insecure_path: PathBuf,
    kubeconfig_user_path: PathBuf,

    plan: NetworkPlan,
    clean_options: CleanOptions,
    drain_options: DrainOptions,
    deps: Vec<BinaryDependency>,
    units: Vec<ManagedUnit>,
    vault_root_token: String,

    hostname: Option<String>,
    node_ip: Option<Ipv4Addr>,
    metadata: Option<TemplateMetadata>,

    renderer: TemplateRenderer,
    installer: Installer,
    systemd: Arc<dyn SystemdManager>,
    clients: Option<KubeClients>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("state", &self.state)
            .field("root_path", &self.root_path)
            .finish_non_exhaustive()
    }
}

impl Environment {
    /// Build an Environment from configuration and a root path. All
    /// configuration errors (empty root path, bad CIDRs, unknown cleanup
    /// tokens) are fatal here, before anything touches the host.
    pub fn new(config: &Config, root_path: &Path) -> Result<Self, SetupError> {
        let systemd: Arc<dyn SystemdManager> =
            Arc::new(Systemctl::new(config.unit_start_timeout()));
        Self::with_systemd(config, root_path, systemd)
    }

    /// Same as `new` but with an explicit init-system manager. Used by tests
    /// to substitute a recording fake.
    pub fn with_systemd(
        config: &Config,
        root_path: &Path,
        systemd: Arc<dyn SystemdManager>,
    ) -> Result<Self, SetupError> {
        if root_path.as_os_str().is_empty() {
            return Err(SetupError::Config("must provide a root path".to_string()));
        }
        let root_path = std::path::absolute(root_path)?;

        let plan = NetworkPlan::plan(
            &config.kubernetes_cluster_ip_range,
            &config.pod_ip_range,
        )?;
        let clean_options = CleanOptions::parse(&config.clean, &config.keep)?;
        let drain_options = DrainOptions::parse(&config.drain)?;

        let bin_path = root_path.join(BIN_DIR);
        let manifest_config_path = root_path.join(MANIFEST_CONFIG_DIR);
        let secrets_path = root_path.join(SECRETS_DIR);
        let deps = build_dependencies(config, &bin_path);
        let renderer = TemplateRenderer::from_embedded()?;
        let installer = Installer::new()?;
        let vault_root_token = secrets::root_token(&config.vault_root_token, &secrets_path);

        Ok(Environment {
            state: LifecycleState::Uninitialized,
            source_templates_path: root_path.join(SOURCE_TEMPLATES_DIR),
            manifest_api_path: root_path.join(MANIFEST_API_DIR),
            manifest_static_pod_path: root_path.join(MANIFEST_STATIC_POD_DIR),
            manifest_systemd_unit_path: root_path.join(MANIFEST_SYSTEMD_UNIT_DIR),
            etcd_data_path: root_path.join(ETCD_DATA_DIR),
            secrets_path,
            network_config_path: root_path.join(NETWORK_CONFIG_DIR),
            network_state_path: root_path.join(NETWORK_STATE_DIR),
            logs_path: root_path.join(LOGS_DIR),
            kubelet_root_dir: PathBuf::from(&config.kubelet_root_dir),
            kubeconfig_auth_path: manifest_config_path.join("kubeconfig-auth.yaml"),
            kubeconfig_insecure_path: manifest_config_path.join("kubeconfig-insecure.yaml"),
            kubeconfig_user_path: config.kubeconfig_user_path(),
            manifest_config_path,
            bin_path,
            root_path,
            plan,
            clean_options,
            drain_options,
            deps,
            units: Vec::new(),
            vault_root_token,
            hostname: None,
            node_ip: None,
            metadata: None,
            renderer,
            installer,
            systemd,
            clients: None,
            config: config.clone(),
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn plan(&self) -> &NetworkPlan {
        &self.plan
    }

    pub fn root_path(&self) -> &Path {
        &self.root_path
    }

    pub fn units(&self) -> &[ManagedUnit] {
        &self.units
    }

    pub fn dependencies(&self) -> &[BinaryDependency] {
        &self.deps
    }

    /// Finalized template metadata; present once the manifests phase has run.
    pub fn metadata(&self) -> Option<&TemplateMetadata> {
        self.metadata.as_ref()
    }

    /// Execute the Setup pipeline. Re-entrant: anything still valid on disk
    /// is a no-op, anything missing or stale is repaired.
    pub async fn setup(&mut self) -> Result<(), SetupError> {
        self.state = LifecycleState::Setup;
        tracing::info!("[Lifecycle] Setup starting in {}", self.root_path.display());

        for phase in SetupPhase::ORDERED {
            tracing::debug!("[Lifecycle] Entering phase {}", phase.name());
            let result = match phase {
                SetupPhase::Requirements => self.phase_requirements(),
                SetupPhase::Hostname => self.phase_hostname(),
                SetupPhase::Directories => self.phase_directories(),
                SetupPhase::Binaries => self.phase_binaries().await,
                SetupPhase::Network => self.phase_network(),
                SetupPhase::Manifests => self.phase_manifests(),
                SetupPhase::SystemdUnits => self.phase_systemd_units().await,
                SetupPhase::Secrets => self.phase_secrets(),
                SetupPhase::KubeClients => self.phase_kube_clients(),
            };
            if let Err(e) = result {
                tracing::error!("[Lifecycle] Setup phase {} failed: {}", phase.name(), e);
                return Err(e);
            }
        }

        tracing::info!("[Lifecycle] Setup ready in {}", self.root_path.display());
        Ok(())
    }

    fn phase_requirements(&mut self) -> Result<(), SetupError> {
        let checks = requirements::check_host_requirements();
        match first_failure(&checks) {
            Some(missing) => Err(SetupError::Requirement(missing)),
            None => Ok(()),
        }
    }

    fn phase_hostname(&mut self) -> Result<(), SetupError> {
        let hostname = nix::unistd::gethostname()
            .map_err(|e| SetupError::Requirement(format!("cannot resolve hostname: {}", e)))?
            .to_string_lossy()
            .to_lowercase();
        // Outbound route detection can fail on isolated hosts; the loopback
        // fallback still yields a functional single-node cluster
        let node_ip = match outbound_ip() {
            Ok(ip) => ip,
            Err(e) => {
                tracing::warn!(
                    "[Lifecycle] Cannot detect outbound IP, falling back to 127.0.0.1: {}",
                    e
                );
                Ipv4Addr::LOCALHOST
            }
        };
        tracing::info!("[Lifecycle] Node {} at {}", hostname, node_ip);
        self.hostname = Some(hostname);
        self.node_ip = Some(node_ip);
        Ok(())
    }

    fn phase_directories(&mut self) -> Result<(), SetupError> {
        for dir in [
            &self.bin_path,
            &self.source_templates_path,
            &self.manifest_api_path,
            &self.manifest_static_pod_path,
            &self.manifest_config_path,
            &self.manifest_systemd_unit_path,
            &self.etcd_data_path,
            &self.secrets_path,
            &self.network_config_path,
            &self.network_state_path,
            &self.logs_path,
            &self.kubelet_root_dir,
            &PathBuf::from(KUBELET_CRI_LOG_PATH),
        ] {
            std::fs::create_dir_all(dir)?;
            tracing::debug!("[Lifecycle] Directory ready: {}", dir.display());
        }
        Ok(())
    }

    async fn phase_binaries(&mut self) -> Result<(), SetupError> {
        install_all(&self.installer, &self.deps).await
    }

    fn phase_network(&mut self) -> Result<(), SetupError> {
        // The plan itself was fixed at construction; this phase materializes
        // it for the CNI bridge plugin
        let mut context = tera::Context::new();
        context.insert("pod_cidr", &self.plan.pod_cidr.to_string());
        context.insert("pod_gateway_ip", &self.plan.pod_gateway_ip.to_string());
        self.renderer.render_to_file(
            "network/bridge.conf.j2",
            &context,
            &self.network_config_path.join("bridge.conf"),
        )?;
        Ok(())
    }

    fn phase_manifests(&mut self) -> Result<(), SetupError> {
        let hostname = self
            .hostname
            .clone()
            .ok_or_else(|| SetupError::Config("hostname phase has not run".to_string()))?;
        let node_ip = self
            .node_ip
            .ok_or_else(|| SetupError::Config("hostname phase has not run".to_string()))?;

        let builder = MetadataBuilder {
            hyperkube_image_url: self.config.hyperkube_image_url(),
            root_path: self.root_path.clone(),
            bin_path: self.bin_path.clone(),
            etcd_data_path: self.etcd_data_path.clone(),
            secrets_path: self.secrets_path.clone(),
            network_config_path: self.network_config_path.clone(),
            manifest_static_pod_path: self.manifest_static_pod_path.clone(),
            logs_path: self.logs_path.clone(),
            kubelet_root_dir: self.kubelet_root_dir.clone(),
            service_cluster_ip_range: self.plan.cluster_cidr.to_string(),
            kubernetes_cluster_ip: self.plan.cluster_ip.to_string(),
            dns_cluster_ip: self.plan.dns_ip.to_string(),
            pod_cidr: self.plan.pod_cidr.to_string(),
            pod_gateway_ip: self.plan.pod_gateway_ip.to_string(),
            cgroup_driver: detect_cgroup_driver(self.config.container_runtime),
            container_runtime: self.config.container_runtime.as_str().to_string(),
            container_runtime_endpoint: self.config.container_runtime.endpoint().to_string(),
            vault_root_token: self.vault_root_token.clone(),
        };
        let metadata = builder.finalize(hostname.clone(), node_ip.to_string());
        let context = metadata.context();

        self.renderer.mirror_sources(&self.source_templates_path)?;
        self.renderer.render_to_file(
            "manifests/kube-apiserver.yaml.j2",
            &context,
            &self.manifest_api_path.join("kube-apiserver.yaml"),
        )?;
        self.renderer.render_to_file(
            "kubelet/kubelet-config.yaml.j2",
            &context,
            &self.manifest_config_path.join("kubelet-config.yaml"),
        )?;
        self.renderer.render_to_file(
            "kubeconfig/kubeconfig-auth.yaml.j2",
            &context,
            &self.kubeconfig_auth_path,
        )?;
        self.renderer.render_to_file(
            "kubeconfig/kubeconfig-insecure.yaml.j2",
            &context,
            &self.kubeconfig_insecure_path,
        )?;

        let node_ip_string = node_ip.to_string();
        let service_range = self.plan.cluster_cidr.to_string();
        let layout = UnitLayout {
            bin_path: &self.bin_path,
            root_path: &self.root_path,
            etcd_data_path: &self.etcd_data_path,
            secrets_path: &self.secrets_path,
            network_config_path: &self.network_config_path,
            kubelet_config_path: &self.manifest_config_path.join("kubelet-config.yaml"),
            kubeconfig_insecure_path: &self.kubeconfig_insecure_path,
            kubelet_root_dir: &self.kubelet_root_dir,
            service_cluster_ip_range: &service_range,
            hostname: &hostname,
            node_ip: &node_ip_string,
            runtime: self.config.container_runtime,
        };
        let mut units = build_units(&self.config.systemd_unit_prefix, &layout);

        for unit in &mut units {
            let mut unit_context = context.clone();
            unit_context.insert("description", &unit.description);
            unit_context.insert("role", unit.role.as_str());
            unit_context.insert("exec_start", &unit.exec_start);
            unit_context.insert("requires", &unit.requires_line());
            unit_context.insert("after", &unit.after_line());
            let text = self.renderer.render("units/service.j2", &unit_context)?;
            let path = self.manifest_systemd_unit_path.join(&unit.name);
            std::fs::write(&path, &text)?;
            unit.unit_text = Some(text);
        }

        self.metadata = Some(metadata);
        self.units = units;
        Ok(())
    }

    async fn phase_systemd_units(&mut self) -> Result<(), SetupError> {
        for unit in &self.units {
            let text = unit.unit_text.as_deref().ok_or_else(|| {
                SetupError::Config(format!("unit {} was never rendered", unit.name))
            })?;
            self.systemd.register(&unit.name, text).await?;
        }
        self.systemd.daemon_reload().await?;
        Ok(())
    }

    fn phase_secrets(&mut self) -> Result<(), SetupError> {
        secrets::provision(&self.secrets_path, &self.vault_root_token)
    }

    fn phase_kube_clients(&mut self) -> Result<(), SetupError> {
        self.install_kubectl_access()?;
        self.clients = Some(KubeClients::new()?);
        Ok(())
    }

    /// Make the cluster reachable with stock tooling: optional kubectl
    /// symlink (hyperkube is a multi-call binary) plus the user kubeconfig.
    /// An existing user kubeconfig is never overwritten.
    fn install_kubectl_access(&self) -> Result<(), SetupError> {
        if !self.config.kubectl_link.is_empty() {
            let link = Path::new(&self.config.kubectl_link);
            match std::os::unix::fs::symlink(self.bin_path.join("hyperkube"), link) {
                Ok(()) => {
                    tracing::info!("[Lifecycle] Linked kubectl at {}", link.display());
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(e.into()),
            }
        }

        if self.kubeconfig_user_path.exists() {
            tracing::debug!(
                "[Lifecycle] Leaving existing kubeconfig {} alone",
                self.kubeconfig_user_path.display()
            );
            return Ok(());
        }
        if let Some(parent) = self.kubeconfig_user_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&self.kubeconfig_auth_path, &self.kubeconfig_user_path)?;
        tracing::info!(
            "[Lifecycle] Wrote kubeconfig to {}",
            self.kubeconfig_user_path.display()
        );
        Ok(())
    }

    /// Start the managed units in dependency order and block until the
    /// control plane and kubelet report healthy, or the timeout elapses.
    pub async fn run(&mut self, timeout: Duration) -> Result<(), SetupError> {
        for unit in &self.units {
            self.systemd.start(&unit.name).await?;
        }

        let clients = self
            .clients
            .as_ref()
            .ok_or_else(|| SetupError::Config("setup has not run".to_string()))?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if clients.apiserver_healthy().await && clients.kubelet_healthy().await {
                self.state = LifecycleState::Running;
                tracing::info!("[Lifecycle] Cluster is running");
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
        }

        // Report the first unhealthy unit with its last observed state
        for unit in &self.units {
            let state = self.systemd.status(&unit.name).await?;
            if state != crate::units::UnitState::Active {
                return Err(SetupError::Systemd {
                    unit: unit.name.clone(),
                    last_state: state.as_str().to_string(),
                    message: format!("cluster did not become healthy within {:?}", timeout),
                });
            }
        }
        Err(SetupError::Systemd {
            unit: "healthz".to_string(),
            last_state: "active".to_string(),
            message: format!(
                "units are active but health endpoints stayed unready for {:?}",
                timeout
            ),
        })
    }

    /// Drain workloads and stop the managed units, most dependent first.
    pub async fn drain(&mut self) -> Result<(), SetupError> {
        self.state = LifecycleState::Draining;
        tracing::info!("[Lifecycle] Draining node");

        if self.drain_options.contains(DrainCategory::Workloads) {
            if let Some(clients) = &self.clients {
                match clients.list_pods().await {
                    Ok(pods) => {
                        for (namespace, name) in pods {
                            if let Err(e) = clients.delete_pod(&namespace, &name).await {
                                tracing::warn!(
                                    "[Lifecycle] Failed to delete pod {}/{}: {}",
                                    namespace,
                                    name,
                                    e
                                );
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("[Lifecycle] Cannot list pods for drain: {}", e);
                    }
                }
            }
        }

        for unit in self.units.iter().rev() {
            if let Err(e) = self.systemd.stop(&unit.name).await {
                tracing::warn!("[Lifecycle] Failed to stop {}: {}", unit.name, e);
            }
        }

        if self.drain_options.contains(DrainCategory::Iptables) {
            clean::flush_pod_nat_rules();
        }
        if self.drain_options.contains(DrainCategory::KubeletGc) {
            clean::kubelet_gc(&self.kubelet_root_dir);
        }
        Ok(())
    }
}
