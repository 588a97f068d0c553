//! Error taxonomy for the orchestrator.
//!
//! Every phase returns a single `SetupError`; the lifecycle controller never
//! catches-and-continues across Setup phases. Clean is the exception: its
//! per-category failures are collected into a `CleanReport` instead.

use thiserror::Error;

/// Error type for environment orchestration.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Invalid user input: bad CIDR, unknown cleanup token, empty root path.
    /// Fatal at construction, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A host capability is missing (not root, no systemd, no iptables).
    #[error("Requirement not met: {0}")]
    Requirement(String),

    /// Download failure or timeout. Retryable by the caller; the installer
    /// itself performs no automatic retry.
    #[error("Download failed for {url}: {message}")]
    Network { url: String, message: String },

    /// Corrupt or unexpected archive layout. Indicates a bad version string
    /// or an upstream layout change; not retryable.
    #[error("Archive error: {0}")]
    Archive(String),

    /// Installed binary does not report the declared version.
    #[error("Version mismatch for {binary}: expected {expected}, got {actual}")]
    VersionMismatch {
        binary: String,
        expected: String,
        actual: String,
    },

    /// Template rendering failure, usually a missing required field.
    #[error("Template error: {0}")]
    Template(String),

    /// A unit failed to reach the expected state within its timeout.
    #[error("Systemd unit {unit} (last state: {last_state}): {message}")]
    Systemd {
        unit: String,
        last_state: String,
        message: String,
    },

    /// A derived address does not fit inside its parent CIDR.
    #[error("Addressing error: {0}")]
    Addressing(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SetupError {
    /// Transient I/O errors the caller may retry. Everything else is fatal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SetupError::Network { .. } | SetupError::Http(_))
    }
}
