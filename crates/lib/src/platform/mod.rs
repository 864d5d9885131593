//! Host-specific paths and privileges.

pub mod paths;

/// Whether the current process runs with root privileges.
#[cfg(unix)]
pub fn is_elevated() -> bool {
  rustix::process::geteuid().is_root()
}

/// Whether the current process runs with root privileges.
///
/// Always false on Windows, where the state directory is per-user.
#[cfg(not(unix))]
pub fn is_elevated() -> bool {
  false
}
