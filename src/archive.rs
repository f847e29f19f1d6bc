//! Source archives (`.tar.bz2`)
//!
//! Exports come straight from the SCM. When generate-archive hooks are
//! registered or the tree has nested repositories, the export is unpacked into a
//! staging directory, completed there, and repacked canonically (sorted entries,
//! zero mtime/uid/gid, normalized modes) so the same revision always produces the
//! same bytes.

use crate::core::error::{ShipError, ShipResult};
use crate::core::vcs::SourceControl;
use bzip2::Compression;
use bzip2::read::MultiBzDecoder;
use bzip2::write::BzEncoder;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Component, Path, PathBuf};
use tar::{Archive, Builder, EntryType, Header};
use tracing::info;
use walkdir::WalkDir;

/// Name some archivers give the global pax metadata entry
const PAX_GLOBAL_HEADER: &str = "pax_global_header";

/// Archive file name for a release
pub fn archive_file_name(archive_name: &str) -> String {
  format!("{}.tar.bz2", archive_name)
}

/// Compress a tar stream into `output`
pub fn compress_stream<R: Read>(mut reader: R, output: &Path) -> ShipResult<()> {
  let file = File::create(output)?;
  let mut encoder = BzEncoder::new(BufWriter::new(file), Compression::best());
  io::copy(&mut reader, &mut encoder)?;
  let mut writer = encoder.finish()?;
  io::Write::flush(&mut writer)?;
  Ok(())
}

/// Unpack a `.tar.bz2` into `dest`
pub fn unpack(archive: &Path, dest: &Path) -> ShipResult<()> {
  let file = File::open(archive)
    .map_err(|e| ShipError::message(format!("Failed to open archive {}: {}", archive.display(), e)))?;
  unpack_tar(MultiBzDecoder::new(BufReader::new(file)), dest)
}

/// Unpack an uncompressed tar stream into `dest`
///
/// Global pax headers are skipped. Files and directories end up owner-writable and
/// never group/other-writable, whatever the archive recorded.
pub fn unpack_tar<R: Read>(reader: R, dest: &Path) -> ShipResult<()> {
  let mut archive = Archive::new(reader);
  archive.set_preserve_mtime(true);

  for entry in archive.entries()? {
    let mut entry = entry?;
    let entry_type = entry.header().entry_type();
    let path = entry.path()?.into_owned();

    if entry_type == EntryType::XGlobalHeader || path == Path::new(PAX_GLOBAL_HEADER) {
      continue;
    }

    let mode = entry.header().mode().unwrap_or(0o644);
    if !entry.unpack_in(dest)? {
      return Err(ShipError::message(format!(
        "Archive entry escapes the destination: {}",
        path.display()
      )));
    }

    if entry_type.is_file() {
      set_mode(&dest.join(&path), (mode | 0o600) & 0o755)?;
    } else if entry_type.is_dir() {
      set_mode(&dest.join(&path), (mode | 0o700) & 0o755)?;
    }
  }
  Ok(())
}

/// Pack `parent/top` canonically into a `.tar.bz2` at `output`
pub fn pack_dir(parent: &Path, top: &str, output: &Path) -> ShipResult<()> {
  let result = write_canonical_tar(parent, top, output);
  if result.is_err() {
    let _ = fs::remove_file(output);
  }
  result
}

fn write_canonical_tar(parent: &Path, top: &str, output: &Path) -> ShipResult<()> {
  let file = File::create(output)?;
  let encoder = BzEncoder::new(BufWriter::new(file), Compression::best());
  let mut builder = Builder::new(encoder);

  for entry in WalkDir::new(parent.join(top))
    .follow_links(false)
    .sort_by(|a, b| a.file_name().cmp(b.file_name()))
  {
    let entry = entry?;
    let full_path = entry.path();
    let rel_path = full_path.strip_prefix(parent)?;
    let file_type = entry.file_type();

    let mut header = Header::new_gnu();
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);

    if file_type.is_symlink() {
      let target = fs::read_link(full_path)?;
      header.set_entry_type(EntryType::Symlink);
      header.set_size(0);
      header.set_mode(0o777);
      builder.append_link(&mut header, rel_path, target)?;
    } else if file_type.is_dir() {
      header.set_entry_type(EntryType::Directory);
      header.set_size(0);
      header.set_mode(0o755);
      builder.append_data(&mut header, rel_path, io::empty())?;
    } else {
      let file = File::open(full_path)?;
      let size = file.metadata()?.len();
      header.set_entry_type(EntryType::Regular);
      header.set_size(size);
      header.set_mode(if is_executable(full_path) { 0o755 } else { 0o644 });
      builder.append_data(&mut header, rel_path, BufReader::new(file))?;
    }
  }

  let encoder = builder.into_inner()?;
  let mut writer = encoder.finish()?;
  io::Write::flush(&mut writer)?;
  Ok(())
}

/// Export `revision` as `output`, completing the tree when needed
///
/// Nested repositories are exported into place, then `post_export` runs with the
/// archive's top-level directory as its argument. The archive is only rebuilt if
/// either of those had anything to do.
pub fn export_tree(
  scm: &dyn SourceControl,
  prefix: &str,
  output: &Path,
  revision: &str,
  post_export: Option<&dyn Fn(&Path) -> ShipResult<()>>,
) -> ShipResult<()> {
  scm.export(prefix, output, revision)?;

  let submodules = scm.submodules(revision)?;
  if submodules.is_empty() && post_export.is_none() {
    return Ok(());
  }

  let top = top_level_name(prefix)?;
  let staging_parent = output.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
  let staging = tempfile::Builder::new().prefix("shiprel-").tempdir_in(staging_parent)?;

  unpack(output, staging.path())?;
  for submodule in &submodules {
    info!("Exporting submodule {}", submodule.path.display());
    scm.export_submodule(submodule, prefix, staging.path())?;
  }

  if let Some(hook) = post_export {
    hook(&staging.path().join(&top))?;
  }

  info!("Regenerating archive {}", output.display());
  pack_dir(staging.path(), &top, output)?;
  remove_tree(staging.path())?;
  Ok(())
}

fn top_level_name(prefix: &str) -> ShipResult<String> {
  match Path::new(prefix).components().next() {
    Some(Component::Normal(name)) => Ok(name.to_string_lossy().into_owned()),
    _ => Err(ShipError::message(format!("Invalid archive prefix '{}'", prefix))),
  }
}

/// Strip write permission from everything under `path`
pub fn make_readonly_recursive(path: &Path) -> ShipResult<()> {
  for entry in WalkDir::new(path).follow_links(false) {
    let entry = entry?;
    if entry.file_type().is_symlink() {
      continue;
    }
    let mode = current_mode(entry.path())?;
    set_mode(entry.path(), mode & 0o555)?;
  }
  Ok(())
}

/// Remove a directory tree, restoring write permission first
pub fn remove_tree(path: &Path) -> ShipResult<()> {
  if !path.exists() {
    return Ok(());
  }
  for entry in WalkDir::new(path).follow_links(false) {
    let entry = entry?;
    if entry.file_type().is_dir() {
      let mode = current_mode(entry.path())?;
      set_mode(entry.path(), mode | 0o700)?;
    }
  }
  fs::remove_dir_all(path)?;
  Ok(())
}

/// Rename `path` to `path~`, replacing any older backup
pub fn backup_if_exists(path: &Path) -> ShipResult<Option<PathBuf>> {
  if fs::symlink_metadata(path).is_err() {
    return Ok(None);
  }

  let mut backup = path.as_os_str().to_owned();
  backup.push("~");
  let backup = PathBuf::from(backup);

  if let Ok(meta) = fs::symlink_metadata(&backup) {
    println!("(deleting old backup {})", backup.display());
    if meta.is_dir() {
      remove_tree(&backup)?;
    } else {
      fs::remove_file(&backup)?;
    }
  }

  fs::rename(path, &backup)?;
  println!("(renamed old {} as {}; will delete on next run)", path.display(), backup.display());
  Ok(Some(backup))
}

#[cfg(unix)]
fn current_mode(path: &Path) -> ShipResult<u32> {
  use std::os::unix::fs::PermissionsExt;
  Ok(fs::symlink_metadata(path)?.permissions().mode())
}

#[cfg(not(unix))]
fn current_mode(_path: &Path) -> ShipResult<u32> {
  Ok(0o755)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> ShipResult<()> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
  Ok(())
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: u32) -> ShipResult<()> {
  let mut perms = fs::metadata(path)?.permissions();
  perms.set_readonly(mode & 0o200 == 0);
  fs::set_permissions(path, perms)?;
  Ok(())
}

fn is_executable(path: &Path) -> bool {
  #[cfg(unix)]
  {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(metadata) = fs::metadata(path) {
      return metadata.permissions().mode() & 0o111 != 0;
    }
  }
  let _ = path;
  false
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;
  use tempfile::TempDir;

  fn tar_with(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
    let mut builder = Builder::new(Vec::new());
    for (path, data, mode) in entries {
      let mut header = Header::new_gnu();
      header.set_size(data.len() as u64);
      header.set_mode(*mode);
      builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
  }

  fn mode_of(path: &Path) -> u32 {
    current_mode(path).unwrap() & 0o777
  }

  #[test]
  fn test_unpack_normalizes_modes_and_skips_pax_header() {
    let dir = TempDir::new().unwrap();
    let tar = tar_with(&[
      ("pax_global_header", b"52 comment=abc\n", 0o666),
      ("pkg/run", b"#!/bin/sh\n", 0o777),
      ("pkg/data", b"data", 0o400),
    ]);

    unpack_tar(Cursor::new(tar), dir.path()).unwrap();

    assert!(!dir.path().join("pax_global_header").exists());
    #[cfg(unix)]
    {
      assert_eq!(mode_of(&dir.path().join("pkg/run")), 0o755);
      assert_eq!(mode_of(&dir.path().join("pkg/data")), 0o600);
    }
  }

  #[test]
  fn test_pack_is_deterministic_and_round_trips() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("pkg-1.0");
    fs::create_dir_all(tree.join("sub")).unwrap();
    fs::write(tree.join("b.txt"), "b").unwrap();
    fs::write(tree.join("sub/a.txt"), "a").unwrap();

    let first = dir.path().join("first.tar.bz2");
    let second = dir.path().join("second.tar.bz2");
    pack_dir(dir.path(), "pkg-1.0", &first).unwrap();
    fs::write(tree.join("b.txt"), "b").unwrap();
    pack_dir(dir.path(), "pkg-1.0", &second).unwrap();
    assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());

    let out = TempDir::new().unwrap();
    unpack(&first, out.path()).unwrap();
    assert_eq!(fs::read_to_string(out.path().join("pkg-1.0/sub/a.txt")).unwrap(), "a");
  }

  #[test]
  fn test_readonly_tree_can_still_be_removed() {
    let dir = TempDir::new().unwrap();
    let tree = dir.path().join("extracted");
    fs::create_dir_all(tree.join("inner")).unwrap();
    fs::write(tree.join("inner/file"), "x").unwrap();

    make_readonly_recursive(&tree).unwrap();
    #[cfg(unix)]
    assert_eq!(mode_of(&tree.join("inner/file")) & 0o222, 0);

    remove_tree(&tree).unwrap();
    assert!(!tree.exists());
  }

  #[test]
  fn test_backup_if_exists_replaces_old_backup() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("hello-1.0.tar.bz2");

    assert!(backup_if_exists(&file).unwrap().is_none());

    fs::write(&file, "first").unwrap();
    backup_if_exists(&file).unwrap();
    fs::write(&file, "second").unwrap();
    let backup = backup_if_exists(&file).unwrap().unwrap();

    assert!(!file.exists());
    assert_eq!(fs::read_to_string(backup).unwrap(), "second");
  }

  #[test]
  fn test_top_level_name() {
    assert_eq!(top_level_name("hello-1.0").unwrap(), "hello-1.0");
    assert_eq!(top_level_name("hello-1.0/Hello").unwrap(), "hello-1.0");
    assert!(top_level_name("/abs").is_err());
  }
}
