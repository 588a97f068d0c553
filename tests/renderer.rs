//! Tests for the template renderer and template metadata.

use std::path::PathBuf;

use p8s::render::detect_cgroup_driver;
use p8s::{ContainerRuntime, MetadataBuilder, SetupError, TemplateRenderer};

fn sample_metadata() -> MetadataBuilder {
    MetadataBuilder {
        hyperkube_image_url: "https://dl.k8s.io/v1.18.20/kubernetes-server-linux-amd64.tar.gz"
            .to_string(),
        root_path: PathBuf::from("/opt/p8s"),
        bin_path: PathBuf::from("/opt/p8s/bin"),
        etcd_data_path: PathBuf::from("/opt/p8s/etcd-data"),
        secrets_path: PathBuf::from("/opt/p8s/secrets"),
        network_config_path: PathBuf::from("/opt/p8s/net.d"),
        manifest_static_pod_path: PathBuf::from("/opt/p8s/manifest-static-pod"),
        logs_path: PathBuf::from("/opt/p8s/logs"),
        kubelet_root_dir: PathBuf::from("/var/lib/p8s"),
        service_cluster_ip_range: "192.168.254.0/24".to_string(),
        kubernetes_cluster_ip: "192.168.254.1".to_string(),
        dns_cluster_ip: "192.168.254.2".to_string(),
        pod_cidr: "192.168.253.0/24".to_string(),
        pod_gateway_ip: "192.168.253.1".to_string(),
        cgroup_driver: "cgroupfs".to_string(),
        container_runtime: "docker".to_string(),
        container_runtime_endpoint: String::new(),
        vault_root_token: "test-root-token-0001".to_string(),
    }
}

#[test]
fn test_all_embedded_templates_register() {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    let names = renderer.list_templates();

    assert_eq!(names.len(), 6);
    assert!(names.iter().any(|n| n == "units/service.j2"));
    assert!(names.iter().any(|n| n == "manifests/kube-apiserver.yaml.j2"));
    assert!(names.iter().any(|n| n == "network/bridge.conf.j2"));
}

#[test]
fn test_render_kubelet_config_substitutes_metadata() {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    let metadata = sample_metadata().finalize("node-1".to_string(), "10.0.0.5".to_string());

    let rendered = renderer
        .render("kubelet/kubelet-config.yaml.j2", &metadata.context())
        .unwrap();

    assert!(rendered.contains("192.168.254.2"), "got:\n{}", rendered);
    assert!(rendered.contains("cgroupfs"), "got:\n{}", rendered);
    assert!(
        rendered.contains("/opt/p8s/manifest-static-pod"),
        "got:\n{}",
        rendered
    );
    assert!(!rendered.contains("{{"), "unsubstituted vars in:\n{}", rendered);
}

#[test]
fn test_render_kubeconfig_auth_carries_token() {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    let metadata = sample_metadata().finalize("node-1".to_string(), "10.0.0.5".to_string());

    let rendered = renderer
        .render("kubeconfig/kubeconfig-auth.yaml.j2", &metadata.context())
        .unwrap();

    assert!(rendered.contains("test-root-token-0001"));
    assert!(rendered.contains("https://192.168.254.1:6443"));
}

#[test]
fn test_render_missing_field_is_an_error() {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    let empty = tera::Context::new();

    let err = renderer
        .render("network/bridge.conf.j2", &empty)
        .unwrap_err();
    assert!(matches!(err, SetupError::Template(_)), "got {:?}", err);
    assert!(err.to_string().contains("bridge.conf"), "got {}", err);
}

#[test]
fn test_render_unknown_template_is_an_error() {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    let metadata = sample_metadata().finalize("node-1".to_string(), "10.0.0.5".to_string());

    assert!(renderer.render("no/such.j2", &metadata.context()).is_err());
}

#[test]
fn test_render_to_file_overwrites_prior_artifact() {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("net.d").join("10-p8s.conf");

    let mut metadata = sample_metadata();
    let first = metadata
        .clone()
        .finalize("node-1".to_string(), "10.0.0.5".to_string());
    renderer
        .render_to_file("network/bridge.conf.j2", &first.context(), &target)
        .unwrap();
    let before = std::fs::read_to_string(&target).unwrap();
    assert!(before.contains("192.168.253.0/24"));

    // A second render with different metadata replaces the file in place
    metadata.pod_cidr = "10.244.0.0/16".to_string();
    metadata.pod_gateway_ip = "10.244.0.1".to_string();
    let second = metadata.finalize("node-1".to_string(), "10.0.0.5".to_string());
    renderer
        .render_to_file("network/bridge.conf.j2", &second.context(), &target)
        .unwrap();
    let after = std::fs::read_to_string(&target).unwrap();
    assert!(after.contains("10.244.0.0/16"));
    assert!(!after.contains("192.168.253.0/24"));
}

#[test]
fn test_cgroup_driver_detection_skips_non_docker_runtimes() {
    // Non-docker runtimes never shell out; the fixed default applies
    assert_eq!(detect_cgroup_driver(ContainerRuntime::Containerd), "cgroupfs");
}

#[test]
fn test_mirror_sources_writes_raw_templates() {
    let renderer = TemplateRenderer::from_embedded().unwrap();
    let tmp = tempfile::tempdir().unwrap();

    renderer.mirror_sources(tmp.path()).unwrap();

    let bridge = std::fs::read_to_string(tmp.path().join("network/bridge.conf.j2")).unwrap();
    // Mirrored sources keep their placeholders, they are not rendered
    assert!(bridge.contains("{{"));
    assert!(tmp.path().join("units/service.j2").is_file());
    assert!(tmp.path().join("manifests/kube-apiserver.yaml.j2").is_file());
}
