//! Persisted release progress (`release-status`)
//!
//! One `name=value` line per field that has been set. The file is the only record
//! of how far a release got; its absence means no release is in progress. Fields
//! only ever move forward during a run, and the whole file is removed when the
//! release is published or abandoned.

use crate::core::error::{ShipResult, StateError};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name of the persisted state, relative to the releases directory
pub const STATUS_FILE_NAME: &str = "release-status";

const TRUE: &str = "true";

/// Upload progress of a single artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UploadStatus {
  /// Not uploaded yet (or a previous attempt failed verification)
  NotUploaded,
  /// Included in an upload batch, not yet verified
  Attempted,
  /// Remote size matches the local artifact
  Verified,
}

impl UploadStatus {
  pub fn as_char(self) -> char {
    match self {
      UploadStatus::NotUploaded => 'N',
      UploadStatus::Attempted => 'A',
      UploadStatus::Verified => 'V',
    }
  }

  pub fn from_char(c: char) -> Option<Self> {
    match c {
      'N' => Some(UploadStatus::NotUploaded),
      'A' => Some(UploadStatus::Attempted),
      'V' => Some(UploadStatus::Verified),
      _ => None,
    }
  }
}

/// Positional upload statuses, one per artifact of the current release
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(into = "String")]
pub struct UploadStatuses(pub Vec<UploadStatus>);

impl UploadStatuses {
  /// All artifacts not yet uploaded
  pub fn new(count: usize) -> Self {
    Self(vec![UploadStatus::NotUploaded; count])
  }

  fn parse(s: &str) -> Option<Self> {
    s.chars().map(UploadStatus::from_char).collect::<Option<Vec<_>>>().map(Self)
  }

  pub fn all_verified(&self) -> bool {
    self.0.iter().all(|s| *s == UploadStatus::Verified)
  }
}

impl fmt::Display for UploadStatuses {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for status in &self.0 {
      write!(f, "{}", status.as_char())?;
    }
    Ok(())
  }
}

impl From<UploadStatuses> for String {
  fn from(statuses: UploadStatuses) -> Self {
    statuses.to_string()
  }
}

/// How far the current release has progressed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReleaseState {
  pub old_snapshot_version: Option<String>,
  pub release_version: Option<String>,
  pub head_before_release: Option<String>,
  pub new_snapshot_version: Option<String>,
  pub head_at_release: Option<String>,
  pub created_archive: bool,
  pub src_tests_passed: bool,
  pub tagged: bool,
  pub updated_master_feed: bool,
  pub verified_uploads: Option<UploadStatuses>,

  #[serde(skip)]
  path: PathBuf,
}

impl ReleaseState {
  /// Path of the status file inside a releases directory
  pub fn path_in(dir: &Path) -> PathBuf {
    dir.join(STATUS_FILE_NAME)
  }

  /// Whether a release is in progress at this location
  pub fn exists(path: &Path) -> bool {
    path.is_file()
  }

  /// Load the record at `path`, or an empty one if there is none
  pub fn load(path: &Path) -> ShipResult<Self> {
    let mut state = Self {
      path: path.to_path_buf(),
      ..Default::default()
    };

    if !path.is_file() {
      return Ok(state);
    }

    let content = fs::read_to_string(path)?;
    for line in content.lines() {
      let corrupt = || StateError::Corrupt {
        path: path.to_path_buf(),
        line: line.to_string(),
      };
      let mut fields = line.split('=');
      let (Some(name), Some(value), None) = (fields.next(), fields.next(), fields.next()) else {
        return Err(corrupt().into());
      };
      state.set_field(name, value).ok_or_else(corrupt)?;
      info!("Loaded status {}={}", name, value);
    }

    Ok(state)
  }

  fn set_field(&mut self, name: &str, value: &str) -> Option<()> {
    match name {
      "old_snapshot_version" => self.old_snapshot_version = Some(value.to_string()),
      "release_version" => self.release_version = Some(value.to_string()),
      "head_before_release" => self.head_before_release = Some(value.to_string()),
      "new_snapshot_version" => self.new_snapshot_version = Some(value.to_string()),
      "head_at_release" => self.head_at_release = Some(value.to_string()),
      "created_archive" => self.created_archive = value == TRUE,
      "src_tests_passed" => self.src_tests_passed = value == TRUE,
      "tagged" => self.tagged = value == TRUE,
      "updated_master_feed" => self.updated_master_feed = value == TRUE,
      "verified_uploads" => self.verified_uploads = Some(UploadStatuses::parse(value)?),
      _ => return None,
    }
    Some(())
  }

  /// The `name=value` pairs that are set, in a fixed order
  fn fields(&self) -> Vec<(&'static str, String)> {
    let flag = |set: bool| set.then(|| TRUE.to_string());
    let candidates = [
      ("old_snapshot_version", self.old_snapshot_version.clone()),
      ("release_version", self.release_version.clone()),
      ("head_before_release", self.head_before_release.clone()),
      ("new_snapshot_version", self.new_snapshot_version.clone()),
      ("head_at_release", self.head_at_release.clone()),
      ("created_archive", flag(self.created_archive)),
      ("src_tests_passed", flag(self.src_tests_passed)),
      ("tagged", flag(self.tagged)),
      ("updated_master_feed", flag(self.updated_master_feed)),
      ("verified_uploads", self.verified_uploads.as_ref().map(|v| v.to_string())),
    ];
    candidates
      .into_iter()
      .filter_map(|(name, value)| value.filter(|v| !v.is_empty()).map(|v| (name, v)))
      .collect()
  }

  /// Persist the record atomically (temp file, then rename over the original)
  pub fn save(&self) -> ShipResult<()> {
    let tmp = self.write_temp()?;
    if let Err(err) = fs::rename(&tmp, &self.path) {
      let _ = fs::remove_file(&tmp);
      return Err(err.into());
    }
    info!("Wrote status to {}", self.path.display());
    Ok(())
  }

  /// Write the new content beside the real file without touching it
  fn write_temp(&self) -> ShipResult<PathBuf> {
    let tmp = self.temp_path();
    let result = (|| -> std::io::Result<()> {
      let mut file = fs::File::create(&tmp)?;
      for (name, value) in self.fields() {
        writeln!(file, "{}={}", name, value)?;
      }
      file.sync_all()
    })();

    if let Err(err) = result {
      let _ = fs::remove_file(&tmp);
      return Err(err.into());
    }
    Ok(tmp)
  }

  fn temp_path(&self) -> PathBuf {
    let mut name = self.path.as_os_str().to_owned();
    name.push(".new");
    PathBuf::from(name)
  }

  /// Remove the record; the release is finished or abandoned
  pub fn discard(&mut self) -> ShipResult<()> {
    if self.path.exists() {
      fs::remove_file(&self.path)?;
      info!("Removed {}", self.path.display());
    }
    let path = std::mem::take(&mut self.path);
    *self = Self {
      path,
      ..Default::default()
    };
    Ok(())
  }

  /// Location of the persisted record
  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Whether anything at all has been recorded
  pub fn is_empty(&self) -> bool {
    self.fields().is_empty()
  }
}
