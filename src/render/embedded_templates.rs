//! Embedded templates - compiled into the binary so the orchestrator is
//! self-contained on a host with nothing but the executable.
//!
//! Templates are loaded at compile time via `include_str!` and registered
//! with the renderer's Tera instance.

/// Generic systemd unit template shared by all managed units.
pub static SERVICE_UNIT: &str = include_str!("templates/units/service.j2");

/// Static pod manifest for the control-plane API server.
pub static KUBE_APISERVER_MANIFEST: &str =
    include_str!("templates/manifests/kube-apiserver.yaml.j2");

/// Kubelet configuration.
pub static KUBELET_CONFIG: &str = include_str!("templates/kubelet/kubelet-config.yaml.j2");

/// Client access configuration.
pub static KUBECONFIG_AUTH: &str = include_str!("templates/kubeconfig/kubeconfig-auth.yaml.j2");
pub static KUBECONFIG_INSECURE: &str =
    include_str!("templates/kubeconfig/kubeconfig-insecure.yaml.j2");

/// CNI bridge network configuration.
pub static BRIDGE_CONF: &str = include_str!("templates/network/bridge.conf.j2");

/// All embedded templates as (name, content) pairs for registration with Tera.
pub const ALL_TEMPLATES: &[(&str, &str)] = &[
    ("units/service.j2", SERVICE_UNIT),
    ("manifests/kube-apiserver.yaml.j2", KUBE_APISERVER_MANIFEST),
    ("kubelet/kubelet-config.yaml.j2", KUBELET_CONFIG),
    ("kubeconfig/kubeconfig-auth.yaml.j2", KUBECONFIG_AUTH),
    ("kubeconfig/kubeconfig-insecure.yaml.j2", KUBECONFIG_INSECURE),
    ("network/bridge.conf.j2", BRIDGE_CONF),
];
