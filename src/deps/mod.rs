//! Dependency resolver and installer.
//!
//! Each required executable is described by a `BinaryDependency`. The
//! installer guarantees that after a successful `ensure` the binary exists at
//! its installed path, is executable, and reports the declared version.
//! Already-installed binaries that pass the version check are skipped without
//! any network access.

mod descriptor;
mod installer;

pub use descriptor::{build_dependencies, ArchiveKind, BinaryDependency};
pub use installer::{install_all, Installer};
