//! Candidate review: diff against the previous release

use crate::archive;
use crate::core::error::ShipResult;
use similar::TextDiff;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Relative paths of all regular files under `root`
fn files_under(root: &Path) -> ShipResult<BTreeSet<PathBuf>> {
  let mut files = BTreeSet::new();
  if !root.is_dir() {
    return Ok(files);
  }
  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry?;
    if entry.file_type().is_file() {
      files.insert(entry.path().strip_prefix(root)?.to_path_buf());
    }
  }
  Ok(files)
}

fn as_text(bytes: &[u8]) -> Option<&str> {
  if bytes.contains(&0) {
    return None;
  }
  std::str::from_utf8(bytes).ok()
}

/// Unified diff of two directory trees (empty when identical)
pub fn diff_trees(old: &Path, new: &Path) -> ShipResult<String> {
  let old_files = files_under(old)?;
  let new_files = files_under(new)?;
  let mut out = String::new();

  for rel in old_files.union(&new_files) {
    let old_label = format!("a/{}", rel.display());
    let new_label = format!("b/{}", rel.display());

    match (old_files.contains(rel), new_files.contains(rel)) {
      (true, false) => out.push_str(&format!("Only in previous release: {}\n", rel.display())),
      (false, true) => out.push_str(&format!("Only in candidate: {}\n", rel.display())),
      _ => {
        let before = fs::read(old.join(rel))?;
        let after = fs::read(new.join(rel))?;
        if before == after {
          continue;
        }
        match (as_text(&before), as_text(&after)) {
          (Some(before), Some(after)) => {
            let diff = TextDiff::from_lines(before, after);
            out.push_str(
              &diff
                .unified_diff()
                .context_radius(3)
                .header(&old_label, &new_label)
                .to_string(),
            );
          }
          _ => out.push_str(&format!("Binary files {} and {} differ\n", old_label, new_label)),
        }
      }
    }
  }
  Ok(out)
}

/// Top directory of an unpacked archive (its only entry), or `dir` itself
fn unpacked_root(dir: &Path) -> ShipResult<PathBuf> {
  let entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
  match entries.as_slice() {
    [only] if only.file_type()?.is_dir() => Ok(only.path()),
    _ => Ok(dir.to_path_buf()),
  }
}

/// Print the changes between a previous release archive and the extracted candidate
pub fn show_diff(previous_archive: &Path, candidate: &Path) -> ShipResult<()> {
  let scratch = tempfile::Builder::new().prefix("shiprel-diff-").tempdir()?;
  archive::unpack(previous_archive, scratch.path())?;
  let previous = unpacked_root(scratch.path())?;

  let diff = diff_trees(&previous, candidate)?;
  if diff.is_empty() {
    println!("No changes since {}", previous_archive.display());
  } else {
    print!("{}", diff);
  }
  Ok(())
}
