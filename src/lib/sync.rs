//! Environment file synchronization functionality.
//!
//! This module appends entries from a source (template) env file to a
//! destination env file. Existing destination content is never rewritten.
//!
//! # Sync Logic
//!
//! The sync process:
//! 1. Parses the source file; a missing source is reported as
//!    [`EnvSyncError::SourceNotFound`]
//! 2. Opens the destination for appending, creating it if needed, and parses
//!    its current content as a snapshot
//! 3. Reconciles the two mappings (see [`crate::reconcile`])
//! 4. If anything is pending, appends a timestamped header followed by one
//!    `KEY=value` line per pending key in sorted order
//!
//! # Examples
//!
//! ```rust,no_run
//! use envmerge::sync::{EnvSync, EnvSyncOptions};
//! use std::path::PathBuf;
//!
//! let options = EnvSyncOptions {
//!     source_file: PathBuf::from(".env.example"),
//!     destination_file: PathBuf::from(".env"),
//!     force: false,
//!     base_dir: None,
//! };
//!
//! let report = EnvSync::sync_with_options(options).unwrap();
//! println!("appended {} keys", report.appended.len());
//! ```

use std::{
  collections::BTreeMap,
  fs::{File, OpenOptions},
  io::{self, BufReader, Seek, SeekFrom, Write},
  path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use tracing::{debug, info, trace};

use crate::{
  format::{format_line, section_header},
  parse::{EnvMap, ParseError},
  reconcile::{SyncMode, reconcile},
};

const DEFAULT_SOURCE_FILENAME: &str = ".env.example";
const DEFAULT_DESTINATION_FILENAME: &str = ".env";

/// Main synchronization service for environment files.
///
/// Holds the parsed source and the open destination for the duration of a
/// run. The destination `File` is closed when the service is dropped, which
/// [`EnvSync::run`] does on every path.
#[derive(Debug)]
pub struct EnvSync {
  mode: SyncMode,
  source: EnvMap,
  destination: Destination,
}

impl EnvSync {
  /// Opens both files and runs a single sync.
  pub fn sync_with_options(options: EnvSyncOptions) -> Result<SyncReport, EnvSyncError> {
    Self::open(options)?.run()
  }

  /// Loads the source and opens the destination.
  ///
  /// Creates the destination if it doesn't exist. Returns an error if the
  /// source file doesn't exist.
  pub fn open(options: EnvSyncOptions) -> Result<Self, EnvSyncError> {
    info!("Starting env sync");

    let EnvSyncOptions {
      source_file,
      destination_file,
      force,
      base_dir,
    } = options;

    let base_dir = match base_dir {
      Some(dir) => dir,
      None => std::env::current_dir().map_err(EnvSyncError::CurrentDir)?,
    };

    let source_path = resolve_path(&base_dir, &source_file);
    let destination_path = resolve_path(&base_dir, &destination_file);

    debug!(?source_path, ?destination_path, force, "Resolved file paths");

    let source = read_source(&source_path)?;
    let destination = Destination::open(destination_path)?;

    Ok(Self {
      mode: SyncMode::from_force(force),
      source,
      destination,
    })
  }

  pub fn mode(&self) -> SyncMode {
    self.mode
  }

  pub fn source(&self) -> &EnvMap {
    &self.source
  }

  pub fn destination(&self) -> &Destination {
    &self.destination
  }

  /// Entries that [`EnvSync::run`] would append, in write order.
  pub fn pending(&self) -> BTreeMap<&str, &str> {
    reconcile(&self.source, self.destination.snapshot(), self.mode)
  }

  /// Appends pending entries to the destination and closes it.
  ///
  /// When nothing is pending the destination is left byte-identical.
  pub fn run(mut self) -> Result<SyncReport, EnvSyncError> {
    let pending = reconcile(&self.source, &self.destination.snapshot, self.mode);

    if pending.is_empty() {
      debug!("Destination already up to date, nothing to append");
    } else {
      let at = Local::now().naive_local();
      self.destination.append(&pending, self.mode, &at)?;
    }

    let report = SyncReport {
      mode: self.mode,
      destination: self.destination.path.clone(),
      appended: pending.keys().map(|key| key.to_string()).collect(),
    };

    info!(
      appended = report.appended.len(),
      mode = %report.mode,
      "Sync completed successfully"
    );

    Ok(report)
  }
}

/// The destination env file, open for appending for the whole run.
#[derive(Debug)]
pub struct Destination {
  path: PathBuf,
  file: File,
  snapshot: EnvMap,
}

impl Destination {
  /// Opens `path` for reading and appending, creating it if absent.
  ///
  /// The content is parsed before anything is written; the returned handle is
  /// positioned at end of file.
  pub fn open(path: PathBuf) -> Result<Self, EnvSyncError> {
    info!(path = %path.display(), "Reading file");

    let mut file = OpenOptions::new()
      .read(true)
      .append(true)
      .create(true)
      .open(&path)
      .map_err(|source| EnvSyncError::Open {
        path: path.clone(),
        source,
      })?;

    file
      .seek(SeekFrom::Start(0))
      .map_err(|source| EnvSyncError::Seek {
        path: path.clone(),
        source,
      })?;

    let snapshot =
      EnvMap::from_reader(BufReader::new(&file)).map_err(|source| EnvSyncError::Parse {
        path: path.clone(),
        source,
      })?;

    file
      .seek(SeekFrom::End(0))
      .map_err(|source| EnvSyncError::Seek {
        path: path.clone(),
        source,
      })?;

    debug!("Destination holds {} variables", snapshot.len());

    Ok(Self {
      path,
      file,
      snapshot,
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Content of the file as it was when opened.
  pub fn snapshot(&self) -> &EnvMap {
    &self.snapshot
  }

  /// Writes a section header stamped with `at`, then one line per entry.
  ///
  /// The snapshot is not updated.
  pub fn append(
    &mut self,
    entries: &BTreeMap<&str, &str>,
    mode: SyncMode,
    at: &NaiveDateTime,
  ) -> Result<(), EnvSyncError> {
    debug!("Appending {} variables to {:?}", entries.len(), self.path);

    self
      .file
      .write_all(section_header(mode, at).as_bytes())
      .map_err(|source| EnvSyncError::WriteHeader {
        path: self.path.clone(),
        source,
      })?;

    for (key, value) in entries {
      trace!("Appending variable: {}", key);

      self
        .file
        .write_all(format_line(key, value).as_bytes())
        .map_err(|source| EnvSyncError::WriteVar {
          path: self.path.clone(),
          key: key.to_string(),
          source,
        })?;
    }

    Ok(())
  }
}

// Only logs the release; the `File` field closes itself right after.
impl Drop for Destination {
  fn drop(&mut self) {
    debug!("Releasing destination file: {:?}", self.path);
  }
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
  pub mode: SyncMode,
  /// Resolved destination path.
  pub destination: PathBuf,
  /// Appended keys in write order.
  pub appended: Vec<String>,
}

impl SyncReport {
  pub fn is_noop(&self) -> bool {
    self.appended.is_empty()
  }
}

/// Errors that can occur during environment file synchronization.
#[derive(Debug, thiserror::Error)]
pub enum EnvSyncError {
  /// The working directory needed to resolve relative paths is unavailable
  #[error("cannot determine working directory: {0}")]
  CurrentDir(#[source] io::Error),
  /// Source file does not exist
  #[error("source file does not exist: {}", .0.display())]
  SourceNotFound(PathBuf),
  /// Error opening either file
  #[error("open {}: {source}", .path.display())]
  Open { path: PathBuf, source: io::Error },
  /// Error repositioning the destination file
  #[error("seek {}: {source}", .path.display())]
  Seek { path: PathBuf, source: io::Error },
  /// Error parsing either file
  #[error("error reading file {}: {source}", .path.display())]
  Parse { path: PathBuf, source: ParseError },
  /// Error writing the section header
  #[error("error writing header to {}: {source}", .path.display())]
  WriteHeader { path: PathBuf, source: io::Error },
  /// Error writing a variable line
  #[error("error writing var {key:?} to {}: {source}", .path.display())]
  WriteVar {
    path: PathBuf,
    key: String,
    source: io::Error,
  },
}

/// Configuration options for environment file synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvSyncOptions {
  /// Template file whose entries are appended. Defaults to `.env.example`.
  pub source_file: PathBuf,
  /// File that receives the entries. Defaults to `.env`.
  pub destination_file: PathBuf,
  /// Also append keys whose destination value differs.
  pub force: bool,
  /// Directory relative paths are resolved against. If None, the current
  /// working directory.
  pub base_dir: Option<PathBuf>,
}

impl Default for EnvSyncOptions {
  fn default() -> Self {
    Self {
      source_file: PathBuf::from(DEFAULT_SOURCE_FILENAME),
      destination_file: PathBuf::from(DEFAULT_DESTINATION_FILENAME),
      force: false,
      base_dir: None,
    }
  }
}

fn read_source(path: &Path) -> Result<EnvMap, EnvSyncError> {
  info!(path = %path.display(), "Reading file");

  let file = File::open(path).map_err(|source| match source.kind() {
    io::ErrorKind::NotFound => EnvSyncError::SourceNotFound(path.to_path_buf()),
    _ => EnvSyncError::Open {
      path: path.to_path_buf(),
      source,
    },
  })?;

  EnvMap::from_reader(BufReader::new(file)).map_err(|source| EnvSyncError::Parse {
    path: path.to_path_buf(),
    source,
  })
}

fn resolve_path(base_dir: &Path, file: &Path) -> PathBuf {
  if file.is_absolute() {
    file.to_path_buf()
  } else {
    base_dir.join(file)
  }
}
