//! Tests for configuration loading and secret provisioning.

use std::path::Path;

use p8s::{secrets, Config, ContainerRuntime};

#[test]
fn test_defaults_are_complete() {
    let config = Config::default();

    assert_eq!(config.hyperkube_version, "1.18.20");
    assert_eq!(config.kubernetes_cluster_ip_range, "192.168.254.0/24");
    assert_eq!(config.pod_ip_range, "192.168.253.0/24");
    assert_eq!(config.systemd_unit_prefix, "p8s-");
    assert_eq!(config.container_runtime, ContainerRuntime::Docker);
    // Binaries are kept across runs by default
    assert!(!config.clean.contains("binaries"));
}

#[test]
fn test_load_partial_toml_keeps_defaults() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("p8s.toml");
    std::fs::write(
        &path,
        "hyperkube_version = \"1.19.0\"\ncontainer_runtime = \"containerd\"\n",
    )
    .unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.hyperkube_version, "1.19.0");
    assert_eq!(config.container_runtime, ContainerRuntime::Containerd);
    // Untouched fields keep their defaults
    assert_eq!(config.etcd_version, Config::default().etcd_version);
}

#[test]
fn test_load_explicit_missing_file_is_an_error() {
    assert!(Config::load(Some(Path::new("/nonexistent/p8s.toml"))).is_err());
}

#[test]
fn test_load_invalid_toml_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("p8s.toml");
    std::fs::write(&path, "hyperkube_version = [broken").unwrap();
    assert!(Config::load(Some(&path)).is_err());
}

#[test]
fn test_template_version_truncates_to_major_minor() {
    let mut config = Config::default();
    config.hyperkube_version = "1.18.20".to_string();
    assert_eq!(config.template_version(), "1.18");
}

#[test]
fn test_hyperkube_image_url_default_and_override() {
    let mut config = Config::default();
    assert_eq!(
        config.hyperkube_image_url(),
        "gcr.io/google_containers/hyperkube:v1.18.20"
    );

    config.hyperkube_image = "registry.local/hyperkube:test".to_string();
    assert_eq!(config.hyperkube_image_url(), "registry.local/hyperkube:test");
}

#[test]
fn test_root_token_generation_and_passthrough() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("secrets");

    assert_eq!(
        secrets::root_token("configured-token", &dir),
        "configured-token"
    );

    let generated = secrets::root_token("", &dir);
    assert_eq!(generated.len(), 20);
    assert!(generated.chars().all(|c| c.is_ascii_alphanumeric()));
    // Nothing on disk yet, so each resolution generates afresh
    assert_ne!(generated, secrets::root_token("", &dir));
}

#[test]
fn test_provision_writes_token_material() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("secrets");

    secrets::provision(&dir, "first-token").unwrap();

    assert_eq!(
        std::fs::read_to_string(dir.join("root-token")).unwrap(),
        "first-token"
    );
    assert_eq!(
        std::fs::read_to_string(dir.join("tokens.csv")).unwrap(),
        "first-token,p8s,p8s,system:masters\n"
    );
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(dir.join("root-token"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}

#[test]
fn test_reruns_reuse_the_kept_root_token() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("secrets");

    // First run: no configured token, nothing on disk, one is generated
    let first = secrets::root_token("", &dir);
    secrets::provision(&dir, &first).unwrap();

    // Second run resolves the kept credential instead of rotating it
    let second = secrets::root_token("", &dir);
    assert_eq!(second, first);
    secrets::provision(&dir, &second).unwrap();

    // The kept token and the apiserver auth file still agree, so the user
    // kubeconfig written on the first run keeps authenticating
    assert_eq!(
        std::fs::read_to_string(dir.join("root-token")).unwrap(),
        first
    );
    assert!(std::fs::read_to_string(dir.join("tokens.csv"))
        .unwrap()
        .starts_with(&format!("{},", first)));
}

#[test]
fn test_configured_token_replaces_kept_material() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("secrets");

    secrets::provision(&dir, "first-token").unwrap();

    // An operator-supplied token wins over the kept file
    let resolved = secrets::root_token("operator-token", &dir);
    assert_eq!(resolved, "operator-token");
    secrets::provision(&dir, &resolved).unwrap();

    // Both files rotate together
    assert_eq!(
        std::fs::read_to_string(dir.join("root-token")).unwrap(),
        "operator-token"
    );
    assert!(std::fs::read_to_string(dir.join("tokens.csv"))
        .unwrap()
        .starts_with("operator-token,"));
}
