use std::path::PathBuf;

use crate::consts::{APP_NAME, LAST_REPORT_FILENAME, STATE_DIR_ENV};

/// Returns the user's home directory, if known.
#[cfg(windows)]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("USERPROFILE").map(PathBuf::from)
}

/// Returns the user's home directory, if known.
#[cfg(not(windows))]
pub fn home_dir() -> Option<PathBuf> {
  std::env::var_os("HOME").map(PathBuf::from)
}

/// Returns the directory holding the run lock and the last run report.
///
/// `CONVERGE_STATE_DIR` wins when set. Otherwise root uses `/var/lib/converge`
/// and other users `$XDG_STATE_HOME/converge` (default `~/.local/state/converge`).
#[cfg(not(windows))]
pub fn state_dir() -> PathBuf {
  if let Some(dir) = std::env::var_os(STATE_DIR_ENV) {
    return PathBuf::from(dir);
  }

  if super::is_elevated() {
    return PathBuf::from("/var/lib").join(APP_NAME);
  }

  let state_home = std::env::var_os("XDG_STATE_HOME")
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|home| home.join(".local").join("state")))
    .unwrap_or_else(std::env::temp_dir);
  state_home.join(APP_NAME)
}

/// Returns the directory holding the run lock and the last run report.
#[cfg(windows)]
pub fn state_dir() -> PathBuf {
  if let Some(dir) = std::env::var_os(STATE_DIR_ENV) {
    return PathBuf::from(dir);
  }

  std::env::var_os("LOCALAPPDATA")
    .map(PathBuf::from)
    .or_else(|| home_dir().map(|home| home.join("AppData").join("Local")))
    .unwrap_or_else(std::env::temp_dir)
    .join(APP_NAME)
    .join("State")
}

/// Path of the persisted report from the most recent run.
pub fn last_report_path() -> PathBuf {
  state_dir().join(LAST_REPORT_FILENAME)
}
