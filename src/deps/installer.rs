//! Download, verify, extract and install executable dependencies.

use std::path::Path;

use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use super::descriptor::{ArchiveKind, BinaryDependency};
use crate::error::SetupError;

/// Installer for binary dependencies. Cheap to clone; shares one HTTP client.
#[derive(Clone)]
pub struct Installer {
    client: reqwest::Client,
}

impl Installer {
    pub fn new() -> Result<Self, SetupError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Installer { client })
    }

    /// Guarantee the dependency's binary is installed and reports its
    /// declared version. Idempotent: an installed, version-matching binary
    /// short-circuits before any network access.
    pub async fn ensure(&self, dep: &BinaryDependency) -> Result<(), SetupError> {
        if dep.binary_path.exists() && self.version_matches(dep)? {
            tracing::info!(
                "[Installer] {} v{} already installed, skipping download",
                dep.name,
                dep.version
            );
            return Ok(());
        }

        self.download(dep).await?;
        self.unpack(dep)?;
        set_executable(&dep.binary_path)?;

        if !self.version_matches(dep)? {
            let actual = self
                .version_output(dep)
                .unwrap_or_else(|e| format!("<{}>", e));
            return Err(SetupError::VersionMismatch {
                binary: dep.name.clone(),
                expected: dep.version.clone(),
                actual: actual.lines().next().unwrap_or("").to_string(),
            });
        }

        tracing::info!("[Installer] Installed {} v{}", dep.name, dep.version);
        Ok(())
    }

    /// Stream the archive to its local path under the per-archive timeout.
    async fn download(&self, dep: &BinaryDependency) -> Result<(), SetupError> {
        tracing::info!(
            "[Installer] Downloading {} from {}",
            dep.name,
            dep.archive_url
        );

        let network_err = |message: String| SetupError::Network {
            url: dep.archive_url.clone(),
            message,
        };

        let response = self
            .client
            .get(&dep.archive_url)
            .timeout(dep.download_timeout)
            .send()
            .await
            .map_err(|e| network_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(network_err(format!("HTTP status {}", response.status())));
        }

        if let Some(parent) = dep.archive_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::File::create(&dep.archive_path).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| network_err(e.to_string()))?;
            written += chunk.len() as u64;
            file.write_all(&chunk).await?;
        }
        file.sync_all().await?;

        if written == 0 {
            return Err(SetupError::Archive(format!(
                "downloaded archive {} is empty",
                dep.archive_path.display()
            )));
        }

        tracing::debug!(
            "[Installer] Downloaded {} ({} bytes) to {}",
            dep.name,
            written,
            dep.archive_path.display()
        );
        Ok(())
    }

    /// Extract the wanted executable out of the archive.
    fn unpack(&self, dep: &BinaryDependency) -> Result<(), SetupError> {
        match dep.kind {
            ArchiveKind::TarGz => self.unpack_tar_gz(dep),
            ArchiveKind::Zip => self.unpack_zip(dep),
            ArchiveKind::Raw => {
                std::fs::copy(&dep.archive_path, &dep.binary_path)?;
                Ok(())
            }
        }
    }

    fn unpack_tar_gz(&self, dep: &BinaryDependency) -> Result<(), SetupError> {
        use flate2::read::GzDecoder;
        use tar::Archive;

        let wanted = dep.wanted_entry();
        let file = std::fs::File::open(&dep.archive_path)?;
        let mut archive = Archive::new(GzDecoder::new(file));
        archive.set_preserve_permissions(false);
        archive.set_preserve_ownerships(false);

        for entry in archive.entries().map_err(|e| {
            SetupError::Archive(format!(
                "{} is not a valid tar.gz archive: {}",
                dep.archive_path.display(),
                e
            ))
        })? {
            let mut entry = entry.map_err(|e| {
                SetupError::Archive(format!(
                    "corrupt entry in {}: {}",
                    dep.archive_path.display(),
                    e
                ))
            })?;
            let path = entry
                .path()
                .map_err(|e| SetupError::Archive(format!("bad entry path: {}", e)))?
                .into_owned();
            let is_wanted = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n == wanted)
                .unwrap_or(false);
            if is_wanted && entry.header().entry_type().is_file() {
                entry.unpack(&dep.binary_path)?;
                return Ok(());
            }
        }

        Err(SetupError::Archive(format!(
            "entry {:?} not found in {}",
            wanted,
            dep.archive_path.display()
        )))
    }

    fn unpack_zip(&self, dep: &BinaryDependency) -> Result<(), SetupError> {
        let wanted = dep.wanted_entry();
        let file = std::fs::File::open(&dep.archive_path)?;
        let mut archive = zip::ZipArchive::new(file).map_err(|e| {
            SetupError::Archive(format!(
                "{} is not a valid zip archive: {}",
                dep.archive_path.display(),
                e
            ))
        })?;

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index).map_err(|e| {
                SetupError::Archive(format!(
                    "corrupt entry in {}: {}",
                    dep.archive_path.display(),
                    e
                ))
            })?;
            let name = entry.name().to_string();
            let is_wanted = Path::new(&name)
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n == wanted)
                .unwrap_or(false);
            if is_wanted && entry.is_file() {
                let mut out = std::fs::File::create(&dep.binary_path)?;
                std::io::copy(&mut entry, &mut out)?;
                return Ok(());
            }
        }

        Err(SetupError::Archive(format!(
            "entry {:?} not found in {}",
            wanted,
            dep.archive_path.display()
        )))
    }

    /// Run the binary's version command. Checked against the declared
    /// version by substring, which holds for every managed binary's banner.
    fn version_output(&self, dep: &BinaryDependency) -> std::io::Result<String> {
        let args = match &dep.version_command {
            Some(args) => args,
            None => return Ok(String::new()),
        };
        let output = std::process::Command::new(&dep.binary_path)
            .args(args)
            .output()?;
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }

    fn version_matches(&self, dep: &BinaryDependency) -> Result<bool, SetupError> {
        if dep.skip_version_verify || dep.version_command.is_none() {
            return Ok(dep.binary_path.exists());
        }
        match self.version_output(dep) {
            Ok(output) => Ok(output.contains(&dep.version)),
            // Unrunnable binary counts as a mismatch so it gets reinstalled
            Err(e) => {
                tracing::debug!(
                    "[Installer] Version probe for {} failed: {}",
                    dep.name,
                    e
                );
                Ok(false)
            }
        }
    }
}

fn set_executable(path: &Path) -> Result<(), SetupError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Resolve all descriptors concurrently, one task per descriptor. Every task
/// runs to completion; the first failure in descriptor order is reported.
pub async fn install_all(
    installer: &Installer,
    deps: &[BinaryDependency],
) -> Result<(), SetupError> {
    let mut handles = Vec::with_capacity(deps.len());
    for dep in deps {
        let installer = installer.clone();
        let dep = dep.clone();
        handles.push(tokio::spawn(async move {
            let name = dep.name.clone();
            (name, installer.ensure(&dep).await)
        }));
    }

    let mut first_error = None;
    for handle in handles {
        let (name, result) = handle.await.map_err(|e| {
            SetupError::Config(format!("installer task panicked: {}", e))
        })?;
        if let Err(e) = result {
            tracing::error!("[Installer] Failed to install {}: {}", name, e);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
