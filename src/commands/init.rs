//! Initialize a releases directory

use crate::core::config::{CONFIG_FILE_NAME, ReleaseConfig};
use crate::core::error::{ResultExt, ShipError, ShipResult};
use crate::core::version;
use crate::feed::Feed;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Master feed file name for an interface name: `Hello World` -> `Hello-World.xml`
fn master_feed_name(name: &str) -> String {
  format!("{}.xml", name.split_whitespace().collect::<Vec<_>>().join("-"))
}

/// Run the init command
pub fn run_init(local_feed: PathBuf) -> ShipResult<()> {
  let current_dir = env::current_dir()?;
  init_in(&current_dir, &local_feed)
}

fn init_in(dir: &Path, local_feed: &Path) -> ShipResult<()> {
  let feed_path = fs::canonicalize(dir.join(local_feed))
    .with_context(|| format!("Feed {} not found", local_feed.display()))?;
  let feed = Feed::load(&feed_path)?;
  let implementation = feed.singleton_implementation()?;
  // Refuse feeds that could never be released
  version::suggest_release_version(&implementation.version)?;

  if fs::read_dir(dir)?.next().is_some() {
    return Err(ShipError::with_help(
      format!("Directory {} is not empty", dir.display()),
      "Run `shiprel init` in a new, empty directory; it becomes the releases directory.",
    ));
  }

  let master = master_feed_name(&feed.name);
  let content = ReleaseConfig::template(&feed_path, &master)?;
  let config_path = dir.join(CONFIG_FILE_NAME);
  fs::write(&config_path, content)?;

  println!("✅ Created {}", config_path.display());
  println!();
  println!("Next steps:");
  println!("  1. Set archive_dir_public_url (and the upload commands) in {}", CONFIG_FILE_NAME);
  println!("  2. Run `shiprel release` from this directory");
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::feed::tests::LOCAL_FEED;
  use tempfile::TempDir;

  #[test]
  fn test_master_feed_name() {
    assert_eq!(master_feed_name("Hello"), "Hello.xml");
    assert_eq!(master_feed_name("Hello  World"), "Hello-World.xml");
  }

  #[test]
  fn test_init_writes_loadable_template() {
    let root = TempDir::new().unwrap();
    let feed = root.path().join("hello.xml");
    fs::write(&feed, LOCAL_FEED).unwrap();
    let releases = root.path().join("releases");
    fs::create_dir(&releases).unwrap();

    init_in(&releases, &feed).unwrap();

    let content = fs::read_to_string(releases.join(CONFIG_FILE_NAME)).unwrap();
    let config = ReleaseConfig::parse(&content).unwrap();
    assert_eq!(config.local_feed, fs::canonicalize(&feed).unwrap());
    assert_eq!(config.master_feed_file, PathBuf::from("Hello-World.xml"));
    assert!(content.contains("# The path to the main feed."));
  }

  #[test]
  fn test_init_requires_empty_directory() {
    let root = TempDir::new().unwrap();
    let feed = root.path().join("hello.xml");
    fs::write(&feed, LOCAL_FEED).unwrap();

    let err = init_in(root.path(), &feed).unwrap_err();
    assert!(err.to_string().contains("is not empty"));
  }
}
