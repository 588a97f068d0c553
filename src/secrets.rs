//! Secret provisioning: the root token and the apiserver token file.
//!
//! The secret daemon's internal protocol is out of scope; what p8s owns is
//! the scoped acquisition of a root token and its placement on disk.

use std::path::Path;

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::error::SetupError;

const ROOT_TOKEN_LEN: usize = 20;

/// Resolve the root token. The configured value wins; otherwise a token kept
/// under the secrets directory from an earlier run is reused, so re-runs keep
/// their credentials. Only when neither exists is a fresh one generated.
pub fn root_token(configured: &str, secrets_dir: &Path) -> String {
    if !configured.is_empty() {
        return configured.to_string();
    }

    let token_path = secrets_dir.join("root-token");
    match std::fs::read_to_string(&token_path) {
        Ok(existing) => {
            let existing = existing.trim().to_string();
            if !existing.is_empty() {
                tracing::debug!(
                    "[Secrets] Reusing root token from {}",
                    token_path.display()
                );
                return existing;
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(
                "[Secrets] Cannot read {}, generating a new token: {}",
                token_path.display(),
                e
            );
        }
    }

    let token: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ROOT_TOKEN_LEN)
        .map(char::from)
        .collect();
    tracing::debug!("[Secrets] Generated a root token of length {}", token.len());
    token
}

/// Write the token material under the secrets directory. The token file and
/// the apiserver auth file always carry the same credential; the token file
/// is rewritten only when its content actually changes.
pub fn provision(secrets_dir: &Path, token: &str) -> Result<(), SetupError> {
    std::fs::create_dir_all(secrets_dir)?;

    let token_path = secrets_dir.join("root-token");
    let existing = std::fs::read_to_string(&token_path).ok();
    if existing.as_deref().map(str::trim) != Some(token) {
        std::fs::write(&token_path, token)?;
        restrict(&token_path)?;
        tracing::info!("[Secrets] Wrote root token to {}", token_path.display());
    }

    // Static token auth file consumed by the apiserver
    let tokens_csv = secrets_dir.join("tokens.csv");
    std::fs::write(
        &tokens_csv,
        format!("{},p8s,p8s,system:masters\n", token),
    )?;
    restrict(&tokens_csv)?;
    Ok(())
}

fn restrict(path: &Path) -> Result<(), SetupError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o600);
        std::fs::set_permissions(path, perms)?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}
