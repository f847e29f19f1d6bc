//! The release sequence
//!
//! A release runs through a fixed series of phases. Each phase is gated by a
//! field of [`ReleaseState`] and the state is saved as soon as a phase completes,
//! so a run can be interrupted at any point (including at the operator prompt)
//! and resumed by running again in the same directory.
//!
//! The version bump is committed to a side branch ([`TMP_BRANCH_NAME`]) and the
//! working branch is reset to its original tip while the candidate is evaluated.
//! Accepting the candidate tags the release commit and fast-forwards the working
//! branch onto the side branch; failing it deletes the side branch and the state.

pub mod compile;
pub mod decision;
pub mod review;
pub mod upload;

use crate::archive;
use crate::core::config::{NO_TESTS_EXIT_CODE, ReleaseConfig};
use crate::core::error::{ReleaseError, ResultExt, ShipError, ShipResult, StateError};
use crate::core::process;
use crate::core::state::ReleaseState;
use crate::core::vcs::{self, SourceControl, TMP_BRANCH_NAME};
use crate::core::version::{self, Version};
use crate::feed::publish::{FeedPublisher, PublishOptions};
use crate::feed::{Feed, Implementation, Phase};
use compile::BinaryCompiler;
use decision::{Candidate, CandidateChoice, Decider};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;
use upload::{Artifact, SizeProbe, UploadVerifier};

/// Pattern for outstanding-work markers reported before a release
const TODO_PATTERN: &str = "TODO|FIXME|XXX";

/// File names derived from the feed name and release version
#[derive(Debug, Clone)]
struct Layout {
  version: String,
  archive_name: String,
  /// Path prefix inside the archive
  prefix: String,
  archive_file: PathBuf,
  /// Top-level directory of the unpacked archive
  extracted: PathBuf,
  extracted_feed: PathBuf,
  src_feed: PathBuf,
  changelog: PathBuf,
}

impl Layout {
  fn new(work_dir: &Path, feed: &Feed, version: &str, feed_rel: &Path) -> Self {
    let archive_name = feed.archive_name(version);
    let prefix = if feed.release.add_toplevel_directory {
      format!("{}/{}", archive_name, feed.name)
    } else {
      archive_name.clone()
    };
    Self {
      version: version.to_string(),
      archive_file: work_dir.join(archive::archive_file_name(&archive_name)),
      extracted: work_dir.join(&archive_name),
      extracted_feed: work_dir.join(&prefix).join(feed_rel),
      src_feed: work_dir.join(format!("{}.xml", archive_name)),
      changelog: work_dir.join(format!("changelog-{}", version)),
      archive_name,
      prefix,
    }
  }

  fn archive_basename(&self) -> String {
    archive::archive_file_name(&self.archive_name)
  }
}

/// Directory an implementation lives in, relative to its feed
fn impl_dir(feed_path: &Path, implementation: &Implementation) -> PathBuf {
  let dir = feed_path.parent().unwrap_or(Path::new("."));
  if implementation.id.starts_with('.') {
    dir.join(&implementation.id)
  } else {
    dir.to_path_buf()
  }
}

fn run_hooks(phase: Phase, commands: &[&str], cwd: &Path, version: &str) -> ShipResult<()> {
  info!("Running hooks for phase '{}'", phase);
  for command in commands {
    println!("[{}]: {}", phase, command);
    process::run_shell(command, cwd, &[("RELEASE_VERSION", version)])?;
  }
  Ok(())
}

fn today() -> String {
  chrono::Local::now().format("%Y-%m-%d").to_string()
}

/// One release attempt in a releases directory
pub struct ReleaseSession<'a> {
  config: &'a ReleaseConfig,
  work_dir: PathBuf,
  scm: &'a dyn SourceControl,
  publisher: &'a dyn FeedPublisher,
  probe: &'a dyn SizeProbe,
  decider: &'a mut dyn Decider,
  state: ReleaseState,
}

impl<'a> ReleaseSession<'a> {
  /// Load the persisted state of the releases directory (`config.base_dir`)
  pub fn new(
    config: &'a ReleaseConfig,
    scm: &'a dyn SourceControl,
    publisher: &'a dyn FeedPublisher,
    probe: &'a dyn SizeProbe,
    decider: &'a mut dyn Decider,
  ) -> ShipResult<Self> {
    let work_dir = config.base_dir.clone();
    let state = ReleaseState::load(&ReleaseState::path_in(&work_dir))?;
    Ok(Self {
      config,
      work_dir,
      scm,
      publisher,
      probe,
      decider,
      state,
    })
  }

  #[cfg(test)]
  pub fn state(&self) -> &ReleaseState {
    &self.state
  }

  fn local_feed_path(&self) -> ShipResult<PathBuf> {
    fs::canonicalize(&self.config.local_feed)
      .with_context(|| format!("Local feed {} not found", self.config.local_feed.display()))
  }

  /// Local feed path relative to the repository root
  fn feed_rel(&self, local_feed: &Path) -> ShipResult<PathBuf> {
    let root = fs::canonicalize(self.scm.root())?;
    local_feed.strip_prefix(&root).map(Path::to_path_buf).map_err(|_| {
      ShipError::message(format!(
        "Local feed {} is not inside the repository at {}",
        local_feed.display(),
        root.display()
      ))
    })
  }

  fn inconsistent(&self, message: &str) -> ShipError {
    StateError::Inconsistent {
      path: self.state.path().to_path_buf(),
      message: message.to_string(),
    }
    .into()
  }

  fn head_moved(&self, expected: String, actual: String) -> ShipError {
    ReleaseError::HeadMoved {
      expected,
      actual,
      state_file: self.state.path().to_path_buf(),
    }
    .into()
  }

  fn required(&self, field: &Option<String>, name: &str) -> ShipResult<String> {
    field
      .clone()
      .ok_or_else(|| self.inconsistent(&format!("{} is not set", name)))
  }

  /// Whether the release tag exists and points at the release commit
  fn tag_at_release(&self) -> ShipResult<bool> {
    let (Some(version), Some(head_at_release)) = (&self.state.release_version, &self.state.head_at_release) else {
      return Ok(false);
    };
    Ok(self.scm.tag_revision(version)?.as_deref() == Some(head_at_release.as_str()))
  }

  /// Run (or resume) the release
  pub fn run(&mut self) -> ShipResult<()> {
    let local_feed_path = self.local_feed_path()?;
    let local_feed = Feed::load(&local_feed_path)?;
    let local_impl = local_feed.singleton_implementation()?.clone();
    let feed_rel = self.feed_rel(&local_feed_path)?;

    if self.check_resume(&local_feed)? {
      // Interrupted between the release commit and the snapshot commit
      self.set_to_snapshot(&local_feed_path)?;
    }
    self.preflight(&local_feed_path)?;

    let (version, need_snapshot) = match self.state.release_version.clone() {
      Some(version) => (version, false),
      None => (self.set_to_release(&local_feed_path, &local_feed, &local_impl)?, true),
    };
    let layout = Layout::new(&self.work_dir, &local_feed, &version, &feed_rel);

    if self.state.tagged || self.tag_at_release()? {
      println!("Candidate was already accepted; resuming publication");
      return self.accept_and_publish(&layout);
    }

    self.create_archive(&local_feed, &layout)?;
    if need_snapshot {
      self.set_to_snapshot(&local_feed_path)?;
    }

    self.extract(&layout, &local_impl)?;
    self.run_unit_tests(&layout)?;
    // Unpack again in case the tests changed anything
    archive::remove_tree(&layout.extracted)?;
    archive::unpack(&layout.archive_file, &self.work_dir)?;

    self.create_source_feed(&layout)?;
    BinaryCompiler::new(self.config, &self.work_dir, layout.src_feed.clone())?.build_binaries()?;
    let previous = self.export_changelog(&layout)?;

    let choice = self.review(&local_feed, &layout, previous.as_deref())?;
    info!("Deleting extracted archive {}", layout.extracted.display());
    archive::remove_tree(&layout.extracted)?;

    match choice {
      CandidateChoice::Publish => self.accept_and_publish(&layout),
      _ => self.fail_candidate(Some(&layout.archive_file)),
    }
  }

  /// Check that a previous run can be continued from the current HEAD
  ///
  /// Returns true when the snapshot bump has to be redone before anything else.
  fn check_resume(&self, feed: &Feed) -> ShipResult<bool> {
    let Some(before) = self.state.head_before_release.clone() else {
      println!("🚀 Releasing {}", feed.name);
      return Ok(false);
    };
    let head = self.scm.get_head_revision()?;

    let Some(version) = &self.state.release_version else {
      if head != before {
        return Err(self.head_moved(before, head));
      }
      println!("🔄 Restarting release of {} (HEAD revision has not changed)", feed.name);
      return Ok(false);
    };
    println!("🔄 RESUMING release of {} {}", feed.name, version);

    // Once tagged, the working branch moves onto the snapshot commit
    let snapshot = self.state.new_snapshot_version.clone();
    let on_snapshot = snapshot.as_deref() == Some(head.as_str());
    let expected = match (self.state.tagged, snapshot) {
      (true, Some(snapshot)) => snapshot,
      _ => before.clone(),
    };
    let resumable = if self.state.tagged {
      on_snapshot
    } else {
      head == before || (on_snapshot && self.tag_at_release()?)
    };
    if !resumable {
      return Err(self.head_moved(expected, head));
    }
    Ok(self.state.new_snapshot_version.is_none())
  }

  fn preflight(&self, local_feed: &Path) -> ShipResult<()> {
    self.scm.ensure_committed()?;
    self.scm.ensure_versioned(local_feed)?;
    info!("No uncommitted changes. Good.");

    if self.state.release_version.is_none() {
      match self.scm.grep(TODO_PATTERN) {
        Ok(markers) if !markers.is_empty() => {
          eprintln!("⚠️  Warning: {} TODO/FIXME/XXX marker(s) in tracked files:", markers.len());
          for line in markers.iter().take(10) {
            eprintln!("   {}", line);
          }
          if markers.len() > 10 {
            eprintln!("   ...");
          }
        }
        Ok(_) => {}
        Err(e) => info!("Skipping TODO scan: {}", e),
      }
    }
    Ok(())
  }

  fn ensure_not_in_master(&self, version: &str) -> ShipResult<()> {
    let master = &self.config.master_feed_file;
    if master.exists() && Feed::load(master)?.has_version(version) {
      return Err(
        ReleaseError::DuplicateVersion {
          version: version.to_string(),
          feed: master.clone(),
        }
        .into(),
      );
    }
    Ok(())
  }

  /// Choose the version, update the working copy and commit it to the side branch
  fn set_to_release(&mut self, local_feed_path: &Path, local_feed: &Feed, local_impl: &Implementation) -> ShipResult<String> {
    let snapshot = local_impl.version.clone();
    let suggested = version::suggest_release_version(&snapshot)?;
    let release_version = self.decider.release_version(&snapshot, &suggested)?;
    release_version.parse::<Version>()?;

    self.scm.ensure_no_tag(&release_version)?;
    self.ensure_not_in_master(&release_version)?;

    self.state.head_before_release = Some(self.scm.get_head_revision()?);
    self.state.save()?;

    let working_copy = impl_dir(local_feed_path, local_impl);
    run_hooks(
      Phase::CommitRelease,
      &local_feed.release.actions_for(Phase::CommitRelease),
      &working_copy,
      &release_version,
    )?;

    println!("📦 Releasing version {}", release_version);
    self.publisher.publish(
      local_feed_path,
      &PublishOptions {
        set_released: Some(today()),
        set_version: Some(release_version.clone()),
        ..Default::default()
      },
    )?;

    self.state.old_snapshot_version = Some(snapshot);
    self.state.release_version = Some(release_version.clone());
    self.state.head_at_release = Some(self.scm.commit(
      &format!("Release {}", release_version),
      TMP_BRANCH_NAME,
      "HEAD",
    )?);
    self.state.save()?;
    Ok(release_version)
  }

  /// Commit the next development version to the side branch, then put the
  /// working branch back on its original tip
  fn set_to_snapshot(&mut self, local_feed_path: &Path) -> ShipResult<()> {
    let release_version = self.required(&self.state.release_version, "release_version")?;
    let head_at_release = self.required(&self.state.head_at_release, "head_at_release")?;
    let snapshot = version::post_release_snapshot(&release_version);

    let tip = self
      .scm
      .branch_revision(TMP_BRANCH_NAME)?
      .ok_or_else(|| self.inconsistent(&format!("branch {} is missing", TMP_BRANCH_NAME)))?;

    let revision = if tip != head_at_release {
      info!("{} already has the snapshot commit {}", TMP_BRANCH_NAME, tip);
      tip
    } else {
      self.publisher.publish(
        local_feed_path,
        &PublishOptions {
          set_released: Some(String::new()),
          set_version: Some(snapshot.clone()),
          ..Default::default()
        },
      )?;
      self.scm.commit(
        &format!("Start development series {}", snapshot),
        TMP_BRANCH_NAME,
        TMP_BRANCH_NAME,
      )?
    };
    self.state.new_snapshot_version = Some(revision);
    self.state.save()?;

    // Fixes made during review must land before the tag
    let branch = self.scm.get_current_branch()?;
    self.scm.reset_hard(&branch)
  }

  fn create_archive(&mut self, local_feed: &Feed, layout: &Layout) -> ShipResult<()> {
    if self.state.created_archive && layout.archive_file.is_file() {
      println!("Archive already created");
      return Ok(());
    }
    let revision = self.required(&self.state.head_at_release, "head_at_release")?;

    // A rebuilt archive has not been tested
    if self.state.src_tests_passed {
      self.state.src_tests_passed = false;
      self.state.save()?;
    }
    archive::backup_if_exists(&layout.archive_file)?;
    // Feeds derived from an older archive
    let stale = std::iter::once(layout.src_feed.clone()).chain(
      self
        .config
        .builders
        .targets
        .iter()
        .map(|t| self.work_dir.join(format!("binary-{}.xml", t))),
    );
    for path in stale {
      if path.exists() {
        info!("Removing stale {}", path.display());
        fs::remove_file(&path)?;
      }
    }

    let hooks = local_feed.release.actions_for(Phase::GenerateArchive);
    let result = if hooks.is_empty() {
      archive::export_tree(self.scm, &layout.prefix, &layout.archive_file, &revision, None)
    } else {
      let generate = |dir: &Path| run_hooks(Phase::GenerateArchive, &hooks, dir, &layout.version);
      archive::export_tree(
        self.scm,
        &layout.prefix,
        &layout.archive_file,
        &revision,
        Some(&generate),
      )
    };
    if let Err(e) = result {
      if !hooks.is_empty() {
        self.fail_candidate(Some(&layout.archive_file))?;
      }
      return Err(e);
    }

    println!("🗜️  Created {}", layout.archive_file.display());
    self.state.created_archive = true;
    self.state.save()
  }

  /// Unpack the candidate and check the package is complete
  fn extract(&self, layout: &Layout, local_impl: &Implementation) -> ShipResult<()> {
    archive::remove_tree(&layout.extracted)?;
    archive::unpack(&layout.archive_file, &self.work_dir)?;

    if !layout.extracted_feed.is_file() {
      return Err(
        ReleaseError::FeedNotInArchive {
          path: layout.extracted_feed.clone(),
        }
        .into(),
      );
    }
    if let Some(main) = &local_impl.main {
      let path = impl_dir(&layout.extracted_feed, local_impl).join(main);
      if !path.exists() {
        return Err(ReleaseError::MissingMainExecutable { path }.into());
      }
    }
    Ok(())
  }

  fn run_unit_tests(&mut self, layout: &Layout) -> ShipResult<()> {
    if self.state.src_tests_passed {
      println!("Unit tests already passed; not running them again");
      return Ok(());
    }

    archive::make_readonly_recursive(&layout.extracted)?;
    if let Err(e) = self.self_test(layout) {
      println!("(leaving extracted directory for examination)");
      self.fail_candidate(Some(&layout.archive_file))?;
      return Err(e);
    }

    self.state.src_tests_passed = true;
    self.state.save()
  }

  fn self_test(&self, layout: &Layout) -> ShipResult<()> {
    let feed = Feed::load(&layout.extracted_feed)?;
    let implementation = feed.singleton_implementation()?;

    let mut cmd = if let Some(test_command) = &self.config.test_command {
      let mut cmd = Command::new("sh");
      cmd
        .arg("-c")
        .arg(test_command)
        .arg("-")
        .arg(&layout.extracted_feed)
        .current_dir(&self.work_dir)
        .env("RELEASE_VERSION", &layout.version);
      cmd
    } else if let Some(self_test) = &implementation.self_test {
      let path = impl_dir(&layout.extracted_feed, implementation).join(self_test);
      let mut cmd = Command::new(&path);
      cmd.current_dir(path.parent().unwrap_or(&layout.extracted));
      cmd
    } else {
      println!("SKIPPING unit tests for {} (no self-test set)", feed.name);
      return Ok(());
    };

    println!("🧪 Running self-test: {}", process::describe(&cmd));
    let status = process::call(&mut cmd)?;
    match status.code() {
      Some(0) => {
        println!("✅ Self-test passed");
        Ok(())
      }
      Some(NO_TESTS_EXIT_CODE) => {
        println!("No tests for {}; skipping", feed.name);
        Ok(())
      }
      code => Err(
        ReleaseError::SelfTestFailed {
          command: process::describe(&cmd),
          code,
        }
        .into(),
      ),
    }
  }

  /// Feed for the release archive, handed to build agents and merged into the master feed
  fn create_source_feed(&self, layout: &Layout) -> ShipResult<()> {
    if layout.src_feed.exists() {
      return Ok(());
    }
    let tmp = layout.src_feed.with_extension("xml.new");
    fs::copy(&layout.extracted_feed, &tmp)?;

    self.publisher.publish(
      &tmp,
      &PublishOptions {
        archive_url: Some(self.config.archive_url(&layout.version, &layout.archive_basename())),
        archive_file: Some(layout.archive_file.clone()),
        archive_extract: Some(layout.archive_name.clone()),
        ..Default::default()
      },
    )?;
    fs::rename(&tmp, &layout.src_feed)?;
    info!("Wrote source feed {}", layout.src_feed.display());
    Ok(())
  }

  /// Write the commit log since the previous release; returns that release's version
  fn export_changelog(&self, layout: &Layout) -> ShipResult<Option<String>> {
    let master = &self.config.master_feed_file;
    let previous = if master.exists() {
      Feed::load(master)?.previous_version(&layout.version)
    } else {
      None
    };
    let head_before_release = self.required(&self.state.head_before_release, "head_before_release")?;

    let written = fs::File::create(&layout.changelog).map_err(ShipError::from).and_then(|mut file| {
      self
        .scm
        .export_changelog(previous.as_deref(), &head_before_release, &mut file)
    });
    match written {
      Ok(()) => println!(
        "📝 Wrote changelog from {} to here as {}",
        previous.as_deref().unwrap_or("start"),
        layout.changelog.display()
      ),
      Err(e) => eprintln!("⚠️  Warning: Failed to generate changelog: {}", e),
    }
    Ok(previous)
  }

  fn review(&mut self, local_feed: &Feed, layout: &Layout, previous: Option<&str>) -> ShipResult<CandidateChoice> {
    let previous_archive = previous
      .map(|v| {
        self
          .work_dir
          .join(archive::archive_file_name(&local_feed.archive_name(v)))
      })
      .filter(|p| p.is_file());

    loop {
      let candidate = Candidate {
        version: &layout.version,
        archive: &layout.archive_file,
        extracted: &layout.extracted,
        previous_archive: previous_archive.as_deref(),
      };
      match self.decider.review_candidate(&candidate)? {
        CandidateChoice::Diff => {
          if let Some(previous_archive) = &previous_archive {
            review::show_diff(previous_archive, &layout.extracted)?;
          }
        }
        choice => return Ok(choice),
      }
    }
  }

  fn accept_and_publish(&mut self, layout: &Layout) -> ShipResult<()> {
    let version = layout.version.clone();

    if self.state.tagged {
      println!("Already tagged");
    } else {
      self.tag_and_advance(&version)?;
    }

    let (binary_feeds, binary_artifacts) = {
      let compiler = BinaryCompiler::new(self.config, &self.work_dir, layout.src_feed.clone())?;
      (compiler.binary_feeds(), compiler.binary_artifacts()?)
    };
    if self.state.updated_master_feed {
      println!("Master feed already updated");
    } else {
      self.update_master_feed(layout, &binary_feeds)?;
    }

    let mut artifacts = vec![Artifact::from_file(&layout.archive_file)?];
    artifacts.extend(binary_artifacts);
    let verifier = UploadVerifier {
      probe: self.probe,
      base_url: self.config.archive_dir_url(&version),
      upload_command: self.config.archive_upload(),
      cwd: &self.work_dir,
      release_version: &version,
    };
    verifier.run(&artifacts, &mut self.state, &mut *self.decider)?;

    let master = &self.config.master_feed_file;
    match self.config.master_feed_upload() {
      Some(command) => {
        println!("📤 Upload {}", master.display());
        process::show_and_run(
          command,
          &[master],
          &self.work_dir,
          &[("RELEASE_VERSION", version.as_str())],
        )?;
      }
      None => println!(
        "NOTE: No feed upload command set => you'll have to upload {} yourself!",
        master.display()
      ),
    }

    if self.config.public_remote().is_some() {
      println!("Push changes to public SCM repository...");
      self.scm.push_head_and_release(&version)?;
    } else {
      println!("NOTE: No public repository set => you'll have to push the tag and branch yourself.");
    }

    self.state.discard()?;
    println!("🎉 Released {} {}", layout.archive_name, version);
    Ok(())
  }

  /// Tag the release commit and move the working branch onto the snapshot commit
  ///
  /// Each step checks whether it already happened, so an interrupted accept can
  /// be run again.
  fn tag_and_advance(&mut self, version: &str) -> ShipResult<()> {
    self.scm.ensure_committed()?;
    let before = self.required(&self.state.head_before_release, "head_before_release")?;
    let head_at_release = self.required(&self.state.head_at_release, "head_at_release")?;
    let snapshot = self.required(&self.state.new_snapshot_version, "new_snapshot_version")?;
    let already_tagged = self.tag_at_release()?;

    let head = self.scm.get_head_revision()?;
    if head != before && !(already_tagged && head == snapshot) {
      return Err(self.head_moved(before, head));
    }

    if already_tagged {
      println!("{} already points at the release commit", vcs::tag_name(version));
    } else {
      self.scm.ensure_no_tag(version)?;
      self.ensure_not_in_master(version)?;
      self.scm.tag(version, &head_at_release)?;
    }

    if head != snapshot {
      self.scm.reset_hard(&snapshot)?;
    }
    if self.scm.branch_revision(TMP_BRANCH_NAME)?.is_some() {
      self.scm.delete_branch(TMP_BRANCH_NAME)?;
    }
    self.state.tagged = true;
    self.state.save()
  }

  /// Merge the new feeds into the master feed in one step
  ///
  /// The promotion and merges are applied to a copy that replaces the master
  /// feed only once all of them succeed.
  fn update_master_feed(&mut self, layout: &Layout, binary_feeds: &[PathBuf]) -> ShipResult<()> {
    let master = self.config.master_feed_file.clone();

    // Tagging checked the version was absent, so it can only come from our own rename
    if master.exists() && Feed::load(&master)?.has_version(&layout.version) {
      info!("{} already lists version {}", master.display(), layout.version);
    } else {
      let staged = master.with_extension("xml.new");
      if staged.exists() {
        fs::remove_file(&staged)?;
      }
      if master.exists() {
        fs::copy(&master, &staged)?;
      }

      if let Err(e) = self.merge_feeds(&master, &staged, layout, binary_feeds) {
        if staged.exists() {
          fs::remove_file(&staged)?;
        }
        return Err(e);
      }
      fs::rename(&staged, &master)?;
    }

    self.state.updated_master_feed = true;
    self.state.save()?;
    println!("📚 Added version {} to {}", layout.version, master.display());
    Ok(())
  }

  fn merge_feeds(&mut self, master: &Path, staged: &Path, layout: &Layout, binary_feeds: &[PathBuf]) -> ShipResult<()> {
    if master.exists() {
      let feed = Feed::load(master)?;
      if let Some(previous) = feed.previous_version(&layout.version)
        && let Some(implementation) = feed.implementation_for(&previous)
        && implementation.stability.as_deref() == Some("testing")
        && self.decider.promote_to_stable(&previous)?
      {
        self.publisher.publish(
          staged,
          &PublishOptions {
            select_version: Some(previous),
            set_stability: Some("stable".to_string()),
            ..Default::default()
          },
        )?;
      }
    }

    for local in std::iter::once(&layout.src_feed).chain(binary_feeds) {
      self.publisher.publish(
        staged,
        &PublishOptions {
          local: Some(local.clone()),
          xmlsign: true,
          key: self.config.signing_key.clone(),
          ..Default::default()
        },
      )?;
    }
    Ok(())
  }

  /// Undo the attempt: back up the archive, drop the side branch and the state
  fn fail_candidate(&mut self, archive_file: Option<&Path>) -> ShipResult<()> {
    if let Some(archive_file) = archive_file {
      archive::backup_if_exists(archive_file)?;
    }
    if self.state.release_version.is_some() && self.state.new_snapshot_version.is_none() {
      // The working copy still holds the release edits
      let branch = self.scm.get_current_branch()?;
      self.scm.reset_hard(&branch)?;
    }
    if self.scm.branch_revision(TMP_BRANCH_NAME)?.is_some() {
      self.scm.delete_branch(TMP_BRANCH_NAME)?;
    }
    self.state.discard()?;
    println!("↩️  Restored to state before starting release. Make your fixes and try again...");
    Ok(())
  }

  /// Abandon the release in progress (refused once tagged)
  pub fn abandon(&mut self) -> ShipResult<()> {
    if self.state.is_empty() {
      println!("No release in progress");
      return Ok(());
    }
    if self.state.tagged {
      return Err(ShipError::with_help(
        format!(
          "Release {} is already tagged and cannot be abandoned",
          self.state.release_version.as_deref().unwrap_or("?")
        ),
        format!(
          "Run `shiprel release` to finish publishing it, or delete the tag and '{}' by hand.",
          self.state.path().display()
        ),
      ));
    }

    let archive_file = match &self.state.release_version {
      Some(version) => {
        let feed = Feed::load(&self.local_feed_path()?)?;
        Some(
          self
            .work_dir
            .join(archive::archive_file_name(&feed.archive_name(version))),
        )
      }
      None => None,
    };
    self.fail_candidate(archive_file.as_deref())
  }
}
