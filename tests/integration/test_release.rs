//! Tests for the `release` and `abandon` commands

use crate::helpers::*;
use anyhow::Result;

#[test]
fn test_release_publishes_and_uploads() -> Result<()> {
  let fixture = ReleaseFixture::new()?;
  fixture.write_config()?;

  // Accept the suggested version, then publish the candidate
  let output = fixture.shiprel(&["release"], "\nP\n")?;
  assert!(output.status.success(), "release failed:\n{}", stderr(&output));

  assert_eq!(
    git_out(&fixture.repo, &["log", "-1", "--format=%s", "v1.0"])?,
    "Release 1.0"
  );
  assert_eq!(
    git_out(&fixture.repo, &["log", "-1", "--format=%s", "main"])?,
    "Start development series 1.0-post"
  );

  let archive = fixture.releases.join("hello-1.0.tar.bz2");
  let uploaded = fixture.public.join("1.0/hello-1.0.tar.bz2");
  assert_eq!(std::fs::metadata(&archive)?.len(), std::fs::metadata(&uploaded)?.len());

  let master = std::fs::read_to_string(fixture.releases.join("Hello.xml"))?;
  assert!(master.contains("version=\"1.0\""));
  assert!(master.contains(&format!("size=\"{}\"", std::fs::metadata(&archive)?.len())));
  assert!(!fixture.releases.join("release-status").exists());

  Ok(())
}

#[test]
fn test_release_refuses_dirty_tree() -> Result<()> {
  let fixture = ReleaseFixture::new()?;
  fixture.write_config()?;
  std::fs::write(fixture.repo.join("hello.sh"), "#!/bin/sh\necho uncommitted\n")?;

  let output = fixture.shiprel(&["release"], "")?;
  assert_eq!(output.status.code(), Some(3));
  let err = stderr(&output);
  assert!(err.contains("Uncommitted changes"));
  assert!(err.contains("release-status"));
  assert!(git_out(&fixture.repo, &["tag", "--list"])?.is_empty());

  Ok(())
}

#[test]
fn test_release_without_config() -> Result<()> {
  let fixture = ReleaseFixture::new()?;

  let output = fixture.shiprel(&["release"], "")?;
  assert_eq!(output.status.code(), Some(1));
  assert!(stderr(&output).contains("shiprel init"));

  Ok(())
}

#[test]
fn test_interrupted_release_resumes() -> Result<()> {
  let fixture = ReleaseFixture::new()?;
  fixture.write_config()?;

  // Input runs out at the candidate prompt
  let output = fixture.shiprel(&["release"], "\n")?;
  assert!(!output.status.success());
  assert!(fixture.releases.join("release-status").exists());

  let status = run_shiprel(&fixture.releases, &["status", "--json"])?;
  let status: serde_json::Value = serde_json::from_slice(&status.stdout)?;
  assert_eq!(status["next_step"], "review");

  // No version prompt on resume
  let output = fixture.shiprel(&["release"], "P\n")?;
  assert!(output.status.success(), "resume failed:\n{}", stderr(&output));
  assert!(stdout(&output).contains("RESUMING"));
  assert!(!git_out(&fixture.repo, &["tag", "--list", "v1.0"])?.is_empty());

  Ok(())
}

#[test]
fn test_abandon_restores_repository() -> Result<()> {
  let fixture = ReleaseFixture::new()?;
  fixture.write_config()?;
  let initial = git_out(&fixture.repo, &["rev-parse", "HEAD"])?;

  let output = fixture.shiprel(&["release"], "\n")?;
  assert!(!output.status.success());
  assert!(!git_out(&fixture.repo, &["branch", "--list", "shiprel-tmp"])?.is_empty());

  let output = fixture.shiprel(&["abandon"], "")?;
  assert!(output.status.success(), "abandon failed:\n{}", stderr(&output));

  assert!(!fixture.releases.join("release-status").exists());
  assert!(git_out(&fixture.repo, &["branch", "--list", "shiprel-tmp"])?.is_empty());
  assert_eq!(git_out(&fixture.repo, &["rev-parse", "HEAD"])?, initial);
  assert!(fixture.releases.join("hello-1.0.tar.bz2~").exists());

  Ok(())
}
