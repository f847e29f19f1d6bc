//! Tests for the `status` command

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_status_without_release() -> Result<()> {
  let fixture = ReleaseFixture::new()?;

  let output = run_shiprel(&fixture.releases, &["status"])?;
  assert!(stdout(&output).contains("No release in progress"));

  Ok(())
}

#[test]
fn test_status_json_reports_progress() -> Result<()> {
  let fixture = ReleaseFixture::new()?;
  std::fs::write(
    fixture.releases.join("release-status"),
    "release_version=1.0\nhead_before_release=abc\nnew_snapshot_version=def\ncreated_archive=true\n",
  )?;

  let output = run_shiprel(&fixture.releases, &["status", "--json"])?;
  let status: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  assert_eq!(status["in_progress"], true);
  assert_eq!(status["next_step"], "run_tests");
  assert_eq!(status["state"]["release_version"], "1.0");
  assert_eq!(status["state"]["created_archive"], true);

  Ok(())
}

#[test]
fn test_status_rejects_corrupt_file() -> Result<()> {
  let fixture = ReleaseFixture::new()?;
  std::fs::write(fixture.releases.join("release-status"), "what is this\n")?;

  let output = run_shiprel_with_input(&fixture.releases, &["status"], "", &[])?;
  assert!(!output.status.success());
  assert!(stderr(&output).contains("release-status"));

  Ok(())
}

#[test]
fn test_status_reads_releases_directory_from_flag() -> Result<()> {
  let fixture = ReleaseFixture::new()?;
  std::fs::write(
    fixture.releases.join("release-status"),
    "release_version=1.0\nhead_before_release=abc\n",
  )?;
  let releases = fixture.releases.to_str().unwrap();

  // Run from the repository, not the releases directory
  let output = run_shiprel(&fixture.repo, &["status", "--json", "--config", releases])?;
  let status: serde_json::Value = serde_json::from_slice(&output.stdout)?;
  assert_eq!(status["in_progress"], true);
  assert_eq!(status["next_step"], "commit_snapshot");

  let output = run_shiprel(&fixture.repo, &["status"])?;
  assert!(stdout(&output).contains("No release in progress"));

  Ok(())
}
