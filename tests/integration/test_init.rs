//! Tests for the `init` command

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_init_creates_config() -> Result<()> {
  let fixture = ReleaseFixture::new()?;
  let feed = fixture.repo.join("hello.xml");

  run_shiprel(&fixture.releases, &["init", feed.to_str().unwrap()])?;

  let config = std::fs::read_to_string(fixture.releases.join("shiprel.toml"))?;
  assert!(config.contains("local_feed = "));
  assert!(config.contains("hello.xml"));
  assert!(config.contains("master_feed_file = \"Hello.xml\""));
  assert!(config.contains("archive_upload_command"));

  Ok(())
}

#[test]
fn test_init_requires_empty_directory() -> Result<()> {
  let fixture = ReleaseFixture::new()?;
  let feed = fixture.repo.join("hello.xml");

  // The repository itself is not empty
  let result = run_shiprel(&fixture.repo, &["init", feed.to_str().unwrap()]);
  assert!(result.is_err());
  assert!(!fixture.repo.join("shiprel.toml").exists());

  Ok(())
}

#[test]
fn test_init_rejects_released_version() -> Result<()> {
  let fixture = ReleaseFixture::new()?;
  let feed = fixture.repo.join("hello.xml");
  std::fs::write(&feed, FEED.replace("1.0-pre", "1.0"))?;

  let output = run_shiprel_with_input(&fixture.releases, &["init", feed.to_str().unwrap()], "", &[])?;
  assert_eq!(output.status.code(), Some(3));
  assert!(stderr(&output).contains("1.0"));
  assert!(!fixture.releases.join("shiprel.toml").exists());

  Ok(())
}
