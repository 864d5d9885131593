//! Host-wide exclusion between convergence runs.
//!
//! Two runs converging the same host concurrently would race on package
//! managers and files, so a run holds an exclusive lock on
//! `<state-dir>/.lock` for its whole duration. The lock file records who holds
//! it so contention can be reported usefully.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::platform::paths::state_dir;

const LOCK_FILENAME: &str = ".lock";

#[derive(Debug, Serialize, Deserialize)]
pub struct LockMetadata {
  pub version: u32,
  pub pid: u32,
  pub started_at_unix: u64,
  pub command: String,
  pub state_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum RunLockError {
  #[error(
    "another convergence run holds the lock: {command} (PID {pid}, started at Unix time {started_at_unix})\n\
     If you're sure no converge process is running, remove the lock file:\n  {lock_path}"
  )]
  Contention {
    command: String,
    pid: u32,
    started_at_unix: u64,
    lock_path: PathBuf,
  },

  #[error(
    "another convergence run holds the lock (could not read lock metadata)\n\
     If you're sure no converge process is running, remove the lock file:\n  {lock_path}"
  )]
  ContentionUnknown { lock_path: PathBuf },

  #[error("failed to create state directory {path}: {source}")]
  CreateDir {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to open lock file: {0}")]
  OpenFile(#[source] io::Error),

  #[error("failed to write lock metadata: {0}")]
  WriteMetadata(#[source] io::Error),

  #[error("failed to acquire lock: {0}")]
  LockFailed(#[source] io::Error),
}

/// An exclusive lock held until dropped.
#[derive(Debug)]
pub struct RunLock {
  file: File,
  lock_path: PathBuf,
}

impl RunLock {
  /// Lock the default state directory.
  pub fn acquire(command: &str) -> Result<Self, RunLockError> {
    Self::acquire_in(&state_dir(), command)
  }

  /// Lock `dir`, creating it if needed. Fails immediately if already held.
  pub fn acquire_in(dir: &Path, command: &str) -> Result<Self, RunLockError> {
    let lock_path = dir.join(LOCK_FILENAME);

    std::fs::create_dir_all(dir).map_err(|source| RunLockError::CreateDir {
      path: dir.to_path_buf(),
      source,
    })?;

    let file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(false)
      .open(&lock_path)
      .map_err(RunLockError::OpenFile)?;

    if let Err(err) = try_lock_exclusive(&file) {
      if err.kind() == io::ErrorKind::WouldBlock {
        return Err(Self::read_contention_error(&lock_path));
      }
      return Err(RunLockError::LockFailed(err));
    }

    Self::write_metadata(&file, command, dir)?;
    debug!(lock = %lock_path.display(), "run lock acquired");

    Ok(RunLock { file, lock_path })
  }

  /// Reads the lock metadata through the held handle.
  ///
  /// Opening the file again would fail on Windows, where the lock is mandatory.
  pub fn read_metadata(&self) -> io::Result<LockMetadata> {
    use std::io::{Seek, SeekFrom};

    let mut file = &self.file;
    file.seek(SeekFrom::Start(0))?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;
    serde_json::from_str(&contents).map_err(io::Error::other)
  }

  fn write_metadata(file: &File, command: &str, dir: &Path) -> Result<(), RunLockError> {
    let metadata = LockMetadata {
      version: 1,
      pid: std::process::id(),
      started_at_unix: SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs(),
      command: command.to_string(),
      state_dir: dir.to_path_buf(),
    };

    file.set_len(0).map_err(RunLockError::WriteMetadata)?;
    let mut writer = io::BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &metadata).map_err(|e| RunLockError::WriteMetadata(io::Error::other(e)))?;
    writer.flush().map_err(RunLockError::WriteMetadata)?;

    Ok(())
  }

  fn read_contention_error(lock_path: &Path) -> RunLockError {
    if let Ok(mut file) = File::open(lock_path) {
      let mut contents = String::new();
      if file.read_to_string(&mut contents).is_ok()
        && let Ok(metadata) = serde_json::from_str::<LockMetadata>(&contents)
      {
        return RunLockError::Contention {
          command: metadata.command,
          pid: metadata.pid,
          started_at_unix: metadata.started_at_unix,
          lock_path: lock_path.to_path_buf(),
        };
      }
    }

    RunLockError::ContentionUnknown {
      lock_path: lock_path.to_path_buf(),
    }
  }

  pub fn lock_path(&self) -> &Path {
    &self.lock_path
  }
}

#[cfg(unix)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use rustix::fs::{FlockOperation, flock};
  use std::os::unix::io::AsFd;

  flock(file.as_fd(), FlockOperation::NonBlockingLockExclusive)
    .map_err(|e| io::Error::from_raw_os_error(e.raw_os_error()))
}

#[cfg(windows)]
fn try_lock_exclusive(file: &File) -> io::Result<()> {
  use std::os::windows::io::AsRawHandle;
  use windows_sys::Win32::Foundation::HANDLE;
  use windows_sys::Win32::Storage::FileSystem::{LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY, LockFileEx};

  let handle = file.as_raw_handle() as HANDLE;

  // SAFETY: OVERLAPPED is a plain data struct that is valid when zero-initialized,
  // and `handle` stays valid for the duration of the call.
  let result = unsafe {
    let mut overlapped = std::mem::zeroed();
    LockFileEx(
      handle,
      LOCKFILE_FAIL_IMMEDIATELY | LOCKFILE_EXCLUSIVE_LOCK,
      0,
      1,
      0,
      &mut overlapped,
    )
  };

  if result == 0 {
    Err(io::Error::last_os_error())
  } else {
    Ok(())
  }
}
