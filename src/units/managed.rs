//! Managed unit definitions: one per supervised long-running process.

use std::path::Path;

use crate::config::ContainerRuntime;

/// Role of a managed unit. Also the suffix of the generated unit name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitRole {
    Etcd,
    Containerd,
    KubeApiserver,
    Kubelet,
}

impl UnitRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitRole::Etcd => "etcd",
            UnitRole::Containerd => "containerd",
            UnitRole::KubeApiserver => "kube-apiserver",
            UnitRole::Kubelet => "kubelet",
        }
    }
}

/// One supervised long-running process. Created during the renderer phase,
/// registered and started by the unit orchestrator, stopped and removed
/// during drain or clean.
#[derive(Debug, Clone)]
pub struct ManagedUnit {
    /// Generated unit name: `<prefix><role>.service`.
    pub name: String,
    pub role: UnitRole,
    pub description: String,
    pub exec_start: String,
    /// Hard requirements, rendered into the unit's Requires= line.
    pub requires: Vec<String>,
    /// Ordering, rendered into the unit's After= line.
    pub after: Vec<String>,
    /// Rendered unit definition, filled by the renderer phase.
    pub unit_text: Option<String>,
}

impl ManagedUnit {
    pub fn requires_line(&self) -> String {
        self.requires.join(" ")
    }

    pub fn after_line(&self) -> String {
        if self.after.is_empty() {
            "network.target".to_string()
        } else {
            self.after.join(" ")
        }
    }
}

/// Everything the unit builder needs to know about the environment layout.
pub struct UnitLayout<'a> {
    pub bin_path: &'a Path,
    pub root_path: &'a Path,
    pub etcd_data_path: &'a Path,
    pub secrets_path: &'a Path,
    pub network_config_path: &'a Path,
    pub kubelet_config_path: &'a Path,
    pub kubeconfig_insecure_path: &'a Path,
    pub kubelet_root_dir: &'a Path,
    pub service_cluster_ip_range: &'a str,
    pub hostname: &'a str,
    pub node_ip: &'a str,
    pub runtime: ContainerRuntime,
}

/// Unit names for a prefix and runtime, in start order. Deterministic from
/// configuration alone, so cleanup can target the units of an earlier run
/// without re-rendering anything.
pub fn unit_names(prefix: &str, runtime: ContainerRuntime) -> Vec<String> {
    let mut roles = vec![UnitRole::Etcd];
    if runtime == ContainerRuntime::Containerd {
        roles.push(UnitRole::Containerd);
    }
    roles.push(UnitRole::KubeApiserver);
    roles.push(UnitRole::Kubelet);
    roles
        .into_iter()
        .map(|role| format!("{}{}.service", prefix, role.as_str()))
        .collect()
}

/// Build the managed unit list in start order: etcd, then the container
/// runtime when it is out-of-process, then the API server, then the kubelet.
pub fn build_units(prefix: &str, layout: &UnitLayout<'_>) -> Vec<ManagedUnit> {
    let unit_name = |role: UnitRole| format!("{}{}.service", prefix, role.as_str());
    let bin = layout.bin_path.display();

    let mut units = vec![ManagedUnit {
        name: unit_name(UnitRole::Etcd),
        role: UnitRole::Etcd,
        description: "p8s etcd datastore".to_string(),
        exec_start: format!(
            "{bin}/etcd --data-dir={data} --name={name} \
             --listen-client-urls=http://127.0.0.1:2379 \
             --advertise-client-urls=http://127.0.0.1:2379 \
             --listen-peer-urls=http://127.0.0.1:2380 \
             --initial-advertise-peer-urls=http://127.0.0.1:2380 \
             --initial-cluster={name}=http://127.0.0.1:2380",
            bin = bin,
            data = layout.etcd_data_path.display(),
            name = layout.hostname,
        ),
        requires: vec![],
        after: vec!["network.target".to_string()],
        unit_text: None,
    }];

    if layout.runtime == ContainerRuntime::Containerd {
        units.push(ManagedUnit {
            name: unit_name(UnitRole::Containerd),
            role: UnitRole::Containerd,
            description: "p8s containerd runtime".to_string(),
            exec_start: format!(
                "{bin}/containerd --root {root}/containerd",
                bin = bin,
                root = layout.root_path.display(),
            ),
            requires: vec![],
            after: vec!["network.target".to_string()],
            unit_text: None,
        });
    }

    let etcd_unit = unit_name(UnitRole::Etcd);
    units.push(ManagedUnit {
        name: unit_name(UnitRole::KubeApiserver),
        role: UnitRole::KubeApiserver,
        description: "p8s Kubernetes API server".to_string(),
        exec_start: format!(
            "{bin}/hyperkube apiserver \
             --etcd-servers=http://127.0.0.1:2379 \
             --service-cluster-ip-range={range} \
             --advertise-address={node_ip} \
             --insecure-bind-address=127.0.0.1 --insecure-port=8080 \
             --secure-port=6443 --allow-privileged=true \
             --authorization-mode=AlwaysAllow \
             --token-auth-file={secrets}/tokens.csv",
            bin = bin,
            range = layout.service_cluster_ip_range,
            node_ip = layout.node_ip,
            secrets = layout.secrets_path.display(),
        ),
        requires: vec![etcd_unit.clone()],
        after: vec![etcd_unit],
        unit_text: None,
    });

    let apiserver_unit = unit_name(UnitRole::KubeApiserver);
    let mut kubelet_requires = vec![apiserver_unit.clone()];
    let mut kubelet_after = vec![apiserver_unit];
    if layout.runtime == ContainerRuntime::Containerd {
        // Runtime startup is a precondition for kubelet start; kubelet does
        // not probe the runtime socket beyond its own CRI retries.
        let runtime_unit = unit_name(UnitRole::Containerd);
        kubelet_requires.push(runtime_unit.clone());
        kubelet_after.push(runtime_unit);
    }

    let mut kubelet_exec = format!(
        "{bin}/hyperkube kubelet \
         --config={config} --kubeconfig={kubeconfig} \
         --root-dir={root_dir} \
         --hostname-override={hostname} --node-ip={node_ip} \
         --network-plugin=cni --cni-conf-dir={cni_conf} --cni-bin-dir={bin} \
         --container-runtime={runtime}",
        bin = bin,
        config = layout.kubelet_config_path.display(),
        kubeconfig = layout.kubeconfig_insecure_path.display(),
        root_dir = layout.kubelet_root_dir.display(),
        hostname = layout.hostname,
        node_ip = layout.node_ip,
        cni_conf = layout.network_config_path.display(),
        runtime = layout.runtime.kubelet_runtime(),
    );
    if layout.runtime != ContainerRuntime::Docker {
        kubelet_exec.push_str(&format!(
            " --container-runtime-endpoint=unix://{}",
            layout.runtime.endpoint()
        ));
    }

    units.push(ManagedUnit {
        name: unit_name(UnitRole::Kubelet),
        role: UnitRole::Kubelet,
        description: "p8s kubelet agent".to_string(),
        exec_start: kubelet_exec,
        requires: kubelet_requires,
        after: kubelet_after,
        unit_text: None,
    });

    units
}
