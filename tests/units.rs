//! Tests for managed unit construction and unit state parsing.

use std::path::Path;

use p8s::{build_units, unit_names, ContainerRuntime, UnitLayout, UnitRole, UnitState};

fn layout(runtime: ContainerRuntime) -> UnitLayout<'static> {
    UnitLayout {
        bin_path: Path::new("/opt/p8s/bin"),
        root_path: Path::new("/opt/p8s"),
        etcd_data_path: Path::new("/opt/p8s/etcd-data"),
        secrets_path: Path::new("/opt/p8s/secrets"),
        network_config_path: Path::new("/opt/p8s/net.d"),
        kubelet_config_path: Path::new("/opt/p8s/manifest-config/kubelet-config.yaml"),
        kubeconfig_insecure_path: Path::new("/opt/p8s/manifest-config/kubeconfig-insecure.yaml"),
        kubelet_root_dir: Path::new("/var/lib/p8s"),
        service_cluster_ip_range: "192.168.254.0/24",
        hostname: "node-1",
        node_ip: "10.0.0.5",
        runtime,
    }
}

#[test]
fn test_build_units_docker_order_and_names() {
    let units = build_units("p8s-", &layout(ContainerRuntime::Docker));

    let names: Vec<&str> = units.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "p8s-etcd.service",
            "p8s-kube-apiserver.service",
            "p8s-kubelet.service",
        ]
    );
    assert!(units.iter().all(|u| u.unit_text.is_none()));
}

#[test]
fn test_build_units_containerd_inserts_runtime_unit() {
    let units = build_units("p8s-", &layout(ContainerRuntime::Containerd));

    let roles: Vec<UnitRole> = units.iter().map(|u| u.role).collect();
    assert_eq!(
        roles,
        vec![
            UnitRole::Etcd,
            UnitRole::Containerd,
            UnitRole::KubeApiserver,
            UnitRole::Kubelet,
        ]
    );
}

#[test]
fn test_dependency_edges() {
    let units = build_units("p8s-", &layout(ContainerRuntime::Containerd));

    let etcd = &units[0];
    assert!(etcd.requires.is_empty());
    assert_eq!(etcd.after_line(), "network.target");

    let apiserver = units
        .iter()
        .find(|u| u.role == UnitRole::KubeApiserver)
        .unwrap();
    assert_eq!(apiserver.requires_line(), "p8s-etcd.service");

    let kubelet = units.iter().find(|u| u.role == UnitRole::Kubelet).unwrap();
    assert!(kubelet.requires.contains(&"p8s-kube-apiserver.service".to_string()));
    assert!(kubelet.requires.contains(&"p8s-containerd.service".to_string()));
    assert_eq!(
        kubelet.after_line(),
        "p8s-kube-apiserver.service p8s-containerd.service"
    );
}

#[test]
fn test_kubelet_exec_reflects_runtime() {
    let docker = build_units("p8s-", &layout(ContainerRuntime::Docker));
    let kubelet = docker.iter().find(|u| u.role == UnitRole::Kubelet).unwrap();
    assert!(kubelet.exec_start.contains("--container-runtime=docker"));
    assert!(!kubelet.exec_start.contains("--container-runtime-endpoint"));

    let containerd = build_units("p8s-", &layout(ContainerRuntime::Containerd));
    let kubelet = containerd
        .iter()
        .find(|u| u.role == UnitRole::Kubelet)
        .unwrap();
    assert!(kubelet.exec_start.contains("--container-runtime=remote"));
    assert!(kubelet
        .exec_start
        .contains("--container-runtime-endpoint=unix:///run/containerd/containerd.sock"));
}

#[test]
fn test_apiserver_exec_uses_token_auth() {
    let units = build_units("p8s-", &layout(ContainerRuntime::Docker));
    let apiserver = units
        .iter()
        .find(|u| u.role == UnitRole::KubeApiserver)
        .unwrap();

    assert!(apiserver
        .exec_start
        .contains("--token-auth-file=/opt/p8s/secrets/tokens.csv"));
    assert!(apiserver
        .exec_start
        .contains("--service-cluster-ip-range=192.168.254.0/24"));
    assert!(apiserver.exec_start.contains("--advertise-address=10.0.0.5"));
}

#[test]
fn test_unit_names_match_built_units() {
    for runtime in [ContainerRuntime::Docker, ContainerRuntime::Containerd] {
        let names = unit_names("p8s-", runtime);
        let built: Vec<String> = build_units("p8s-", &layout(runtime))
            .into_iter()
            .map(|u| u.name)
            .collect();
        assert_eq!(names, built, "runtime {:?}", runtime);
    }
}

#[test]
fn test_unit_prefix_is_configurable() {
    let units = build_units("lab-", &layout(ContainerRuntime::Docker));
    assert!(units.iter().all(|u| u.name.starts_with("lab-")));
}

#[test]
fn test_unit_state_parse_round_trip() {
    assert_eq!(UnitState::parse("active"), UnitState::Active);
    assert_eq!(UnitState::parse("activating"), UnitState::Activating);
    assert_eq!(UnitState::parse("deactivating"), UnitState::Deactivating);
    assert_eq!(UnitState::parse("inactive"), UnitState::Inactive);
    assert_eq!(UnitState::parse("failed"), UnitState::Failed);

    match UnitState::parse("reloading") {
        UnitState::Unknown(raw) => assert_eq!(raw, "reloading"),
        other => panic!("expected Unknown, got {:?}", other),
    }
    assert_eq!(UnitState::parse("failed").as_str(), "failed");
}
