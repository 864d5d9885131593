//! Files and directories on the local filesystem.
//!
//! Attributes:
//! - `ensure`: `file` (default), `directory` or `absent`
//! - `path`: absolute path; defaults to the resource title
//! - `content`: exact file content; unset only requires the file to exist
//! - `mode`: octal permission bits such as `"0644"` or `644` (ignored on Windows)
//!
//! Content is compared by SHA-256 digest and written atomically: a temp file
//! in the target directory, renamed over the destination.
//!
//! A symlink at the managed path is followed: its target is read and written,
//! and the link itself stays in place. `ensure: absent` removes the link, not
//! the target.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::{ApplyOutcome, AttributeSchema, Provider, ProviderError, SchemaError, State};
use crate::resource::{Resource, ValueKind};
use crate::util::hash::{hash_bytes, hash_file};

pub struct FileProvider {
  schema: AttributeSchema,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ensure {
  File,
  Directory,
  Absent,
}

impl Ensure {
  fn of(resource: &Resource) -> Self {
    match resource.attr_str("ensure") {
      Some("directory") => Ensure::Directory,
      Some("absent") => Ensure::Absent,
      _ => Ensure::File,
    }
  }
}

impl Default for FileProvider {
  fn default() -> Self {
    Self::new()
  }
}

impl FileProvider {
  pub fn new() -> Self {
    Self {
      schema: AttributeSchema::new()
        .one_of("ensure", &["file", "directory", "absent"])
        .optional("path", ValueKind::String)
        .optional("content", ValueKind::String)
        .optional_numeric_string("mode"),
    }
  }

  fn path(resource: &Resource) -> PathBuf {
    PathBuf::from(resource.attr_str("path").unwrap_or(resource.title()))
  }

  /// `mode` as written, whether quoted or not.
  fn mode(resource: &Resource) -> Option<String> {
    resource.attr("mode").map(ToString::to_string)
  }

  fn io_err(path: &Path) -> impl FnOnce(io::Error) -> ProviderError + '_ {
    move |source| ProviderError::Io {
      path: path.to_path_buf(),
      source,
    }
  }
}

/// Parse an octal mode string, with or without a leading `0`.
fn parse_mode(mode: &str) -> Option<u32> {
  let digits = mode.trim();
  if digits.is_empty() || digits.len() > 4 {
    return None;
  }
  u32::from_str_radix(digits, 8).ok()
}

fn format_mode(mode: u32) -> String {
  format!("{:04o}", mode & 0o7777)
}

#[cfg(unix)]
fn read_mode(metadata: &fs::Metadata) -> Option<u32> {
  use std::os::unix::fs::PermissionsExt;
  Some(metadata.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn read_mode(_metadata: &fs::Metadata) -> Option<u32> {
  None
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> io::Result<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> io::Result<()> {
  Ok(())
}

fn is_symlink(path: &Path) -> bool {
  fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
}

/// The file the managed path refers to: the link target when `path` is a
/// symlink that resolves, otherwise `path` itself.
fn resolve(path: &Path) -> PathBuf {
  if is_symlink(path)
    && let Ok(target) = fs::canonicalize(path)
  {
    return target;
  }
  path.to_path_buf()
}

/// Replace `path` with `content`, created with permission bits `mode`.
fn write_atomic(path: &Path, content: &[u8], mode: u32) -> Result<(), ProviderError> {
  let parent = path
    .parent()
    .ok_or_else(|| ProviderError::Invalid(format!("{} has no parent directory", path.display())))?;

  let mut temp = NamedTempFile::new_in(parent).map_err(FileProvider::io_err(parent))?;
  temp.write_all(content).map_err(FileProvider::io_err(path))?;
  temp.as_file().sync_all().map_err(FileProvider::io_err(path))?;
  set_mode(temp.path(), mode).map_err(FileProvider::io_err(path))?;
  temp
    .persist(path)
    .map_err(|e| FileProvider::io_err(path)(e.error))?;
  Ok(())
}

impl Provider for FileProvider {
  fn schema(&self) -> &AttributeSchema {
    &self.schema
  }

  fn validate(&self, resource: &Resource) -> Result<(), SchemaError> {
    self.schema.validate(resource)?;

    if let Some(mode) = Self::mode(resource)
      && parse_mode(&mode).is_none()
    {
      return Err(SchemaError::Invalid {
        attribute: "mode".to_string(),
        message: format!("'{}' is not an octal permission mode", mode),
      });
    }

    if !Self::path(resource).is_absolute() {
      return Err(SchemaError::Invalid {
        attribute: "path".to_string(),
        message: format!("'{}' is not an absolute path", Self::path(resource).display()),
      });
    }

    if Ensure::of(resource) != Ensure::File && resource.attr("content").is_some() {
      return Err(SchemaError::Invalid {
        attribute: "content".to_string(),
        message: "only allowed with ensure: file".to_string(),
      });
    }

    Ok(())
  }

  fn read_current_state(&self, resource: &Resource) -> Result<State, ProviderError> {
    let path = resolve(&Self::path(resource));

    let metadata = match fs::symlink_metadata(&path) {
      Ok(metadata) => metadata,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(State::absent()),
      Err(e) => return Err(Self::io_err(&path)(e)),
    };

    let mut state = State::present();
    if metadata.is_dir() {
      state = state.with("kind", "directory");
    } else if metadata.is_file() {
      let hash = hash_file(&path).map_err(Self::io_err(&path))?;
      state = state.with("kind", "file").with("sha256", hash.0);
    } else {
      state = state.with("kind", "other");
    }

    if let Some(mode) = read_mode(&metadata) {
      state = state.with("mode", format_mode(mode));
    }

    debug!(path = %path.display(), ?state, "read file state");
    Ok(state)
  }

  fn is_in_sync(&self, resource: &Resource, state: &State) -> bool {
    let ensure = Ensure::of(resource);
    if ensure == Ensure::Absent {
      return !state.exists;
    }

    let kind = if ensure == Ensure::Directory { "directory" } else { "file" };
    if !state.exists || state.get_str("kind") != Some(kind) {
      return false;
    }

    if let Some(content) = resource.attr_str("content")
      && state.get_str("sha256") != Some(hash_bytes(content.as_bytes()).0.as_str())
    {
      return false;
    }

    match (Self::mode(resource).as_deref().and_then(parse_mode), state.get_str("mode")) {
      (Some(wanted), Some(actual)) => format_mode(wanted) == actual,
      // Mode is not observable on this platform
      (Some(_), None) => true,
      (None, _) => true,
    }
  }

  fn apply(&self, resource: &Resource) -> Result<ApplyOutcome, ProviderError> {
    let link = Self::path(resource);
    let path = resolve(&link);
    let current = self.read_current_state(resource)?;
    let current_kind = current.get_str("kind");

    let mut done = Vec::new();
    match Ensure::of(resource) {
      Ensure::Absent => {
        if is_symlink(&link) {
          fs::remove_file(&link).map_err(Self::io_err(&link))?;
          info!(path = %link.display(), "removed symlink");
          return Ok(ApplyOutcome::new("removed"));
        }
        match current_kind {
          Some("directory") => fs::remove_dir(&path).map_err(Self::io_err(&path))?,
          Some(_) => fs::remove_file(&path).map_err(Self::io_err(&path))?,
          None => {}
        }
        info!(path = %path.display(), "removed");
        return Ok(ApplyOutcome::new("removed"));
      }
      Ensure::Directory => {
        if current.exists && current_kind != Some("directory") {
          return Err(ProviderError::Invalid(format!(
            "{} exists and is not a directory",
            path.display()
          )));
        }
        if !current.exists {
          fs::create_dir_all(&path).map_err(Self::io_err(&path))?;
          done.push("directory created".to_string());
        }
      }
      Ensure::File => {
        if current.exists && current_kind != Some("file") {
          return Err(ProviderError::Invalid(format!("{} exists and is not a file", path.display())));
        }
        // Replaced files keep their permissions; new ones start world-readable
        let mode = current.get_str("mode").and_then(parse_mode).unwrap_or(0o644);
        match resource.attr_str("content") {
          Some(content) => {
            let wanted = hash_bytes(content.as_bytes());
            if current.get_str("sha256") != Some(wanted.0.as_str()) {
              write_atomic(&path, content.as_bytes(), mode)?;
              done.push(if current.exists { "content updated" } else { "created" }.to_string());
            }
          }
          None if !current.exists => {
            write_atomic(&path, b"", mode)?;
            done.push("created".to_string());
          }
          None => {}
        }
      }
    }

    if let Some(mode) = Self::mode(resource).as_deref().and_then(parse_mode) {
      let actual = fs::metadata(&path).map_err(Self::io_err(&path))?;
      if read_mode(&actual).is_some_and(|m| m != mode) {
        set_mode(&path, mode).map_err(Self::io_err(&path))?;
        done.push(format!("mode set to {}", format_mode(mode)));
      }
    }

    info!(path = %path.display(), changes = %done.join(", "), "file converged");
    Ok(ApplyOutcome::new(done.join(", ")))
  }
}
