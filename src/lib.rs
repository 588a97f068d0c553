//! p8s: single-node Kubernetes bootstrap orchestrator.
//!
//! Turns a small set of options (version pins, IP ranges, cleanup policy)
//! into a fully wired local control plane and kubelet supervised by
//! systemd, and tears the same state down selectively. The lifecycle
//! controller is the only entry point; everything else is a planning or
//! execution component it drives.

pub mod config;
pub mod deps;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod network;
pub mod options;
pub mod render;
pub mod requirements;
pub mod secrets;
pub mod units;

pub use config::{Config, ContainerRuntime};
pub use deps::{build_dependencies, install_all, ArchiveKind, BinaryDependency, Installer};
pub use error::SetupError;
pub use lifecycle::{CleanReport, Environment, LifecycleState};
pub use network::{nth_ip, NetworkPlan};
pub use options::{CleanCategory, CleanOptions, DrainCategory, DrainOptions};
pub use render::{MetadataBuilder, TemplateMetadata, TemplateRenderer};
pub use units::{
    build_units, unit_names, ManagedUnit, Systemctl, SystemdManager, UnitLayout, UnitRole,
    UnitState,
};
