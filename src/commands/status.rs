use serde::Serialize;
use std::env;
use std::path::{Path, PathBuf};

use crate::core::error::{ShipError, ShipResult};
use crate::core::state::ReleaseState;

/// Next thing a resumed run will do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextStep {
  /// No release in progress
  Start,
  ChooseVersion,
  CommitSnapshot,
  CreateArchive,
  RunTests,
  Review,
  UpdateMasterFeed,
  Upload,
}

impl NextStep {
  fn of(state: &ReleaseState) -> Self {
    if state.is_empty() {
      NextStep::Start
    } else if state.release_version.is_none() {
      NextStep::ChooseVersion
    } else if state.new_snapshot_version.is_none() && !state.tagged {
      NextStep::CommitSnapshot
    } else if state.tagged && !state.updated_master_feed {
      NextStep::UpdateMasterFeed
    } else if state.tagged {
      NextStep::Upload
    } else if !state.created_archive {
      NextStep::CreateArchive
    } else if !state.src_tests_passed {
      NextStep::RunTests
    } else {
      NextStep::Review
    }
  }

  fn describe(self) -> &'static str {
    match self {
      NextStep::Start => "start a new release",
      NextStep::ChooseVersion => "choose the release version",
      NextStep::CommitSnapshot => "commit the next development version",
      NextStep::CreateArchive => "create the release archive",
      NextStep::RunTests => "run the self-test on the extracted archive",
      NextStep::Review => "review the candidate",
      NextStep::UpdateMasterFeed => "add the release to the master feed",
      NextStep::Upload => "upload and verify the archives",
    }
  }
}

/// Status of the releases directory
#[derive(Debug, Clone, Serialize)]
pub struct ReleaseStatus {
  pub state_file: PathBuf,
  pub in_progress: bool,
  pub next_step: NextStep,
  pub state: ReleaseState,
}

impl ReleaseStatus {
  pub fn read(dir: &Path) -> ShipResult<Self> {
    let state_file = ReleaseState::path_in(dir);
    let state = ReleaseState::load(&state_file)?;
    Ok(Self {
      in_progress: !state.is_empty(),
      next_step: NextStep::of(&state),
      state_file,
      state,
    })
  }
}

/// Run the status command
pub fn run_status(json: bool, dir: Option<PathBuf>) -> ShipResult<()> {
  let dir = match dir {
    Some(dir) => dir,
    None => env::current_dir()?,
  };
  let status = ReleaseStatus::read(&dir)?;

  if json {
    println!(
      "{}",
      serde_json::to_string_pretty(&status).map_err(|e| ShipError::message(format!("Serialization error: {}", e)))?
    );
  } else {
    print_status(&status);
  }
  Ok(())
}

fn print_status(status: &ReleaseStatus) {
  if !status.in_progress {
    println!("No release in progress in this directory");
    return;
  }
  let state = &status.state;
  let or_dash = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
  let yes_no = |b: bool| if b { "yes" } else { "no" };

  println!("\n📊 Release Status ({})\n", status.state_file.display());
  println!("{:<22} {}", "release version", or_dash(&state.release_version));
  println!("{:<22} {}", "previous snapshot", or_dash(&state.old_snapshot_version));
  println!("{:<22} {}", "HEAD before release", or_dash(&state.head_before_release));
  println!("{:<22} {}", "release commit", or_dash(&state.head_at_release));
  println!("{:<22} {}", "snapshot commit", or_dash(&state.new_snapshot_version));
  println!("{:<22} {}", "archive created", yes_no(state.created_archive));
  println!("{:<22} {}", "tests passed", yes_no(state.src_tests_passed));
  println!("{:<22} {}", "tagged", yes_no(state.tagged));
  println!("{:<22} {}", "master feed updated", yes_no(state.updated_master_feed));
  println!(
    "{:<22} {}",
    "uploads",
    state
      .verified_uploads
      .as_ref()
      .map(|v| v.to_string())
      .unwrap_or_else(|| "-".to_string())
  );
  println!("\nNext: {}", status.next_step.describe());
}
