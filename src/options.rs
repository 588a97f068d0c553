//! Clean and drain option sets.
//!
//! Both are drawn from fixed vocabularies. `keep` overrides `clean`: when any
//! keep token is given, the effective clean set is the full vocabulary minus
//! the keep set. Unknown tokens are a construction-time error.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::SetupError;

/// A class of on-disk or system resource that cleanup can remove or keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CleanCategory {
    Binaries,
    Etcd,
    Iptables,
    Kubectl,
    Kubelet,
    Logs,
    Manifests,
    Mounts,
    Network,
    Secrets,
    Systemd,
}

impl CleanCategory {
    /// The full vocabulary, in removal order. Systemd last so unit files
    /// survive until their processes have been stopped.
    pub const ALL: [CleanCategory; 11] = [
        CleanCategory::Iptables,
        CleanCategory::Kubelet,
        CleanCategory::Mounts,
        CleanCategory::Etcd,
        CleanCategory::Secrets,
        CleanCategory::Network,
        CleanCategory::Manifests,
        CleanCategory::Logs,
        CleanCategory::Kubectl,
        CleanCategory::Binaries,
        CleanCategory::Systemd,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CleanCategory::Binaries => "binaries",
            CleanCategory::Etcd => "etcd",
            CleanCategory::Iptables => "iptables",
            CleanCategory::Kubectl => "kubectl",
            CleanCategory::Kubelet => "kubelet",
            CleanCategory::Logs => "logs",
            CleanCategory::Manifests => "manifests",
            CleanCategory::Mounts => "mounts",
            CleanCategory::Network => "network",
            CleanCategory::Secrets => "secrets",
            CleanCategory::Systemd => "systemd",
        }
    }
}

impl fmt::Display for CleanCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanCategory {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "binaries" => Ok(CleanCategory::Binaries),
            "etcd" => Ok(CleanCategory::Etcd),
            "iptables" => Ok(CleanCategory::Iptables),
            "kubectl" => Ok(CleanCategory::Kubectl),
            "kubelet" => Ok(CleanCategory::Kubelet),
            "logs" => Ok(CleanCategory::Logs),
            "manifests" => Ok(CleanCategory::Manifests),
            "mounts" => Ok(CleanCategory::Mounts),
            "network" => Ok(CleanCategory::Network),
            "secrets" => Ok(CleanCategory::Secrets),
            "systemd" => Ok(CleanCategory::Systemd),
            other => Err(SetupError::Config(format!(
                "unknown clean category {:?}, valid tokens: binaries, etcd, iptables, kubectl, \
                 kubelet, logs, manifests, mounts, network, secrets, systemd, all, none",
                other
            ))),
        }
    }
}

/// Parse a comma-separated token list against the clean vocabulary.
/// `all` expands to the full set, `none` to the empty set.
fn parse_clean_tokens(list: &str) -> Result<BTreeSet<CleanCategory>, SetupError> {
    let mut set = BTreeSet::new();
    for token in list.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        match token {
            "all" => {
                set.extend(CleanCategory::ALL);
            }
            "none" => {
                set.clear();
            }
            other => {
                set.insert(other.parse::<CleanCategory>()?);
            }
        }
    }
    Ok(set)
}

/// Effective cleanup policy, computed once at construction.
#[derive(Debug, Clone)]
pub struct CleanOptions {
    effective: BTreeSet<CleanCategory>,
}

impl CleanOptions {
    pub fn parse(clean: &str, keep: &str) -> Result<Self, SetupError> {
        let clean_set = parse_clean_tokens(clean)?;
        let keep_set = parse_clean_tokens(keep)?;

        let has_keep_tokens = keep.split(',').any(|t| !t.trim().is_empty());
        let effective = if has_keep_tokens {
            CleanCategory::ALL
                .iter()
                .copied()
                .filter(|c| !keep_set.contains(c))
                .collect()
        } else {
            clean_set
        };

        Ok(CleanOptions { effective })
    }

    pub fn contains(&self, category: CleanCategory) -> bool {
        self.effective.contains(&category)
    }

    pub fn is_empty(&self) -> bool {
        self.effective.is_empty()
    }

    /// Categories in removal order.
    pub fn categories(&self) -> impl Iterator<Item = CleanCategory> + '_ {
        CleanCategory::ALL
            .iter()
            .copied()
            .filter(|c| self.effective.contains(c))
    }
}

/// A class of work performed while draining a node before stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DrainCategory {
    /// Delete pods known to the control plane.
    Workloads,
    /// Remove pod-network iptables rules.
    Iptables,
    /// Garbage-collect kubelet pod state on disk.
    KubeletGc,
}

impl DrainCategory {
    pub const ALL: [DrainCategory; 3] = [
        DrainCategory::Workloads,
        DrainCategory::Iptables,
        DrainCategory::KubeletGc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DrainCategory::Workloads => "workloads",
            DrainCategory::Iptables => "iptables",
            DrainCategory::KubeletGc => "kubeletgc",
        }
    }
}

impl FromStr for DrainCategory {
    type Err = SetupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            // "pods" kept as an alias for compatibility with older CLIs
            "workloads" | "pods" => Ok(DrainCategory::Workloads),
            "iptables" => Ok(DrainCategory::Iptables),
            "kubeletgc" => Ok(DrainCategory::KubeletGc),
            other => Err(SetupError::Config(format!(
                "unknown drain category {:?}, valid tokens: workloads, iptables, kubeletgc, all, none",
                other
            ))),
        }
    }
}

/// Drain policy, analogous to `CleanOptions`.
#[derive(Debug, Clone)]
pub struct DrainOptions {
    set: BTreeSet<DrainCategory>,
}

impl DrainOptions {
    pub fn parse(drain: &str) -> Result<Self, SetupError> {
        let mut set = BTreeSet::new();
        for token in drain.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token {
                "all" => {
                    set.extend(DrainCategory::ALL);
                }
                "none" => {
                    set.clear();
                }
                other => {
                    set.insert(other.parse::<DrainCategory>()?);
                }
            }
        }
        Ok(DrainOptions { set })
    }

    pub fn contains(&self, category: DrainCategory) -> bool {
        self.set.contains(&category)
    }
}
