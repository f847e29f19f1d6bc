//! Source control abstraction
//!
//! The release workflow only talks to `SourceControl`; git is the single backend
//! today. Version bumps are committed to a throwaway side branch so the user's
//! branch is untouched until a candidate is accepted.

pub mod git;

pub use git::{GitOptions, GitScm};

use crate::core::error::ShipResult;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Side branch holding the release and snapshot-bump commits
pub const TMP_BRANCH_NAME: &str = "shiprel-tmp";

/// Tag naming convention for releases
pub fn tag_name(version: &str) -> String {
  format!("v{}", version)
}

/// A nested repository pinned at a revision of the parent tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
  /// Path relative to the repository root
  pub path: PathBuf,
  /// Commit the parent tree records for it
  pub revision: String,
}

/// Operations the release workflow needs from a version control system
pub trait SourceControl {
  /// Working tree root
  fn root(&self) -> &Path;

  /// Fail if tracked files (including nested repositories) have uncommitted changes
  fn ensure_committed(&self) -> ShipResult<()>;

  /// Fail if `path` is not under version control
  fn ensure_versioned(&self, path: &Path) -> ShipResult<()>;

  /// Fail if a release tag for `version` already exists
  fn ensure_no_tag(&self, version: &str) -> ShipResult<()>;

  /// Commit the release tag for `version` points at, if the tag exists
  fn tag_revision(&self, version: &str) -> ShipResult<Option<String>>;

  /// Revision id of HEAD
  fn get_head_revision(&self) -> ShipResult<String>;

  /// Name of the checked-out branch
  fn get_current_branch(&self) -> ShipResult<String>;

  /// Revision a branch points at, if the branch exists
  fn branch_revision(&self, branch: &str) -> ShipResult<Option<String>>;

  /// Commit the working copy's tracked changes onto `branch` (parent `parent`)
  /// without checking it out; returns the new revision
  fn commit(&self, message: &str, branch: &str, parent: &str) -> ShipResult<String>;

  /// Create the release tag for `version` at `revision`
  fn tag(&self, version: &str, revision: &str) -> ShipResult<()>;

  /// Reset the current branch, index and working tree to `revision`
  fn reset_hard(&self, revision: &str) -> ShipResult<()>;

  /// Remove a branch
  fn delete_branch(&self, name: &str) -> ShipResult<()>;

  /// Write a `.tar.bz2` of the tree at `revision`, paths prefixed with `prefix/`
  fn export(&self, prefix: &str, archive_path: &Path, revision: &str) -> ShipResult<()>;

  /// Nested repositories recorded in the tree at `revision`
  fn submodules(&self, revision: &str) -> ShipResult<Vec<Submodule>>;

  /// Unpack a nested repository's tree under `dest/prefix/<submodule path>`
  fn export_submodule(&self, submodule: &Submodule, prefix: &str, dest: &Path) -> ShipResult<()>;

  /// Write the log from the `since` release (or the beginning) up to `upto`
  fn export_changelog(&self, since: Option<&str>, upto: &str, sink: &mut dyn Write) -> ShipResult<()>;

  /// Push the current branch and the release tag to the public remote
  fn push_head_and_release(&self, version: &str) -> ShipResult<()>;

  /// Tracked lines matching an extended regular expression, as `path:line:text`
  fn grep(&self, pattern: &str) -> ShipResult<Vec<String>>;
}
