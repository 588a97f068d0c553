//! Tests for the binary dependency installer.
//!
//! Downloads are served from an in-test TCP listener so no external network
//! access happens. Unreachable URLs point at a closed local port.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use p8s::{install_all, ArchiveKind, BinaryDependency, Installer, SetupError};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

const FAKE_TOOL: &str = "#!/bin/sh\necho faketool v3.2.1\n";

fn dep(bin_dir: &Path, kind: ArchiveKind, archive_url: String) -> BinaryDependency {
    BinaryDependency {
        name: "faketool".to_string(),
        version: "3.2.1".to_string(),
        archive_url,
        archive_path: bin_dir.join("faketool-archive"),
        binary_path: bin_dir.join("faketool"),
        kind,
        archive_entry: None,
        version_command: Some(vec!["--version".to_string()]),
        skip_version_verify: false,
        download_timeout: Duration::from_secs(10),
    }
}

fn write_script(path: &Path, content: &str) {
    std::fs::write(path, content).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}

/// Serve one HTTP response with the given body, on an ephemeral local port.
async fn serve_once(body: Vec<u8>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = stream.read(&mut request).await;
        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        stream.write_all(header.as_bytes()).await.unwrap();
        stream.write_all(&body).await.unwrap();
        let _ = stream.shutdown().await;
    });
    format!("http://{}/archive", addr)
}

/// Serve a response header and a few body bytes, then hold the connection
/// open without ever finishing the body.
async fn serve_stalling() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut request = [0u8; 1024];
        let _ = stream.read(&mut request).await;
        let header = "HTTP/1.1 200 OK\r\nContent-Length: 1048576\r\nConnection: close\r\n\r\n";
        stream.write_all(header.as_bytes()).await.unwrap();
        stream.write_all(b"partial").await.unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;
        drop(stream);
    });
    format!("http://{}/archive", addr)
}

fn unreachable_url() -> String {
    // Port 9 (discard) is closed on test hosts; connection is refused fast
    "http://127.0.0.1:9/archive".to_string()
}

fn tar_gz_with_tool() -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let mut header = tar::Header::new_gnu();
    header.set_size(FAKE_TOOL.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(
            &mut header,
            "kubernetes/server/bin/faketool",
            FAKE_TOOL.as_bytes(),
        )
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

fn zip_with_tool() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
    writer
        .start_file("faketool", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(FAKE_TOOL.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_installed_matching_binary_skips_download() {
    let tmp = tempfile::tempdir().unwrap();
    // The URL is unreachable: any network access would fail the call
    let dep = dep(tmp.path(), ArchiveKind::TarGz, unreachable_url());
    write_script(&dep.binary_path, FAKE_TOOL);

    let installer = Installer::new().unwrap();
    installer.ensure(&dep).await.unwrap();
}

#[tokio::test]
async fn test_version_mismatch_forces_reinstall() {
    let tmp = tempfile::tempdir().unwrap();
    let mut dep = dep(tmp.path(), ArchiveKind::TarGz, unreachable_url());
    dep.version = "9.9.9".to_string();
    write_script(&dep.binary_path, FAKE_TOOL);

    let installer = Installer::new().unwrap();
    let err = installer.ensure(&dep).await.unwrap_err();
    // The stale binary does not satisfy 9.9.9, so a download is attempted
    assert!(matches!(err, SetupError::Network { .. }), "got {:?}", err);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_stalled_download_aborts_at_the_configured_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let mut dep = dep(tmp.path(), ArchiveKind::TarGz, serve_stalling().await);
    dep.download_timeout = Duration::from_millis(300);

    let installer = Installer::new().unwrap();
    let err = installer.ensure(&dep).await.unwrap_err();
    // The timeout converts the hanging transfer into a retryable failure
    assert!(matches!(err, SetupError::Network { .. }), "got {:?}", err);
    assert!(err.is_retryable());
    // No binary was installed from the partial body
    assert!(!dep.binary_path.exists());
}

#[tokio::test]
async fn test_missing_binary_with_unreachable_source_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let dep = dep(tmp.path(), ArchiveKind::TarGz, unreachable_url());

    let installer = Installer::new().unwrap();
    let err = installer.ensure(&dep).await.unwrap_err();
    assert!(matches!(err, SetupError::Network { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_install_from_tar_gz() {
    let tmp = tempfile::tempdir().unwrap();
    let url = serve_once(tar_gz_with_tool()).await;
    let dep = dep(tmp.path(), ArchiveKind::TarGz, url);

    let installer = Installer::new().unwrap();
    installer.ensure(&dep).await.unwrap();

    assert!(dep.binary_path.is_file());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&dep.binary_path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "binary is not executable: {:o}", mode);
    }
    assert_eq!(std::fs::read_to_string(&dep.binary_path).unwrap(), FAKE_TOOL);
}

#[tokio::test]
async fn test_install_from_zip() {
    let tmp = tempfile::tempdir().unwrap();
    let url = serve_once(zip_with_tool()).await;
    let dep = dep(tmp.path(), ArchiveKind::Zip, url);

    let installer = Installer::new().unwrap();
    installer.ensure(&dep).await.unwrap();
    assert_eq!(std::fs::read_to_string(&dep.binary_path).unwrap(), FAKE_TOOL);
}

#[tokio::test]
async fn test_install_raw_download() {
    let tmp = tempfile::tempdir().unwrap();
    let url = serve_once(FAKE_TOOL.as_bytes().to_vec()).await;
    let dep = dep(tmp.path(), ArchiveKind::Raw, url);

    let installer = Installer::new().unwrap();
    installer.ensure(&dep).await.unwrap();
    assert_eq!(std::fs::read_to_string(&dep.binary_path).unwrap(), FAKE_TOOL);
}

#[tokio::test]
async fn test_empty_archive_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let url = serve_once(Vec::new()).await;
    let dep = dep(tmp.path(), ArchiveKind::TarGz, url);

    let installer = Installer::new().unwrap();
    let err = installer.ensure(&dep).await.unwrap_err();
    assert!(matches!(err, SetupError::Archive(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_archive_without_wanted_entry_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let url = serve_once(tar_gz_with_tool()).await;
    let mut dep = dep(tmp.path(), ArchiveKind::TarGz, url);
    dep.archive_entry = Some("some-other-tool".to_string());

    let installer = Installer::new().unwrap();
    let err = installer.ensure(&dep).await.unwrap_err();
    assert!(matches!(err, SetupError::Archive(_)), "got {:?}", err);
    assert!(err.to_string().contains("some-other-tool"), "got {}", err);
}

#[tokio::test]
async fn test_install_all_reports_first_failure_in_descriptor_order() {
    let tmp = tempfile::tempdir().unwrap();
    let mut first = dep(tmp.path(), ArchiveKind::TarGz, unreachable_url());
    first.name = "alpha".to_string();
    first.archive_url = "http://127.0.0.1:9/alpha".to_string();
    first.archive_path = tmp.path().join("alpha-archive");
    first.binary_path = tmp.path().join("alpha");
    let mut second = dep(tmp.path(), ArchiveKind::TarGz, unreachable_url());
    second.name = "beta".to_string();
    second.archive_url = "http://127.0.0.1:9/beta".to_string();
    second.archive_path = tmp.path().join("beta-archive");
    second.binary_path = tmp.path().join("beta");

    let installer = Installer::new().unwrap();
    let err = install_all(&installer, &[first, second]).await.unwrap_err();
    match err {
        SetupError::Network { url, .. } => assert!(url.ends_with("/alpha"), "got {}", url),
        other => panic!("expected Network error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_install_all_with_satisfied_deps_touches_nothing() {
    let tmp = tempfile::tempdir().unwrap();
    let dep = dep(tmp.path(), ArchiveKind::TarGz, unreachable_url());
    write_script(&dep.binary_path, FAKE_TOOL);

    let installer = Installer::new().unwrap();
    install_all(&installer, &[dep.clone()]).await.unwrap();
    assert!(!dep.archive_path.exists());
}
