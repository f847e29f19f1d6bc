//! Operator decision points
//!
//! The release sequence pauses for a human at a few fixed places. Those pauses go
//! through [`Decider`], so the sequence can be driven by a terminal or by a script.

use crate::core::error::{ShipError, ShipResult};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

/// What to do with a built and tested candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateChoice {
  /// Accept: tag, merge into the master feed, upload, push
  Publish,
  /// Reject: roll everything back
  Fail,
  /// Show the changes since the previous release, then ask again
  Diff,
}

/// A candidate awaiting review
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
  pub version: &'a str,
  pub archive: &'a Path,
  pub extracted: &'a Path,
  /// Archive of the previous release, when one is available for diffing
  pub previous_archive: Option<&'a Path>,
}

/// Source of operator decisions
pub trait Decider {
  /// Version number for the new release (`suggested` if the operator just confirms)
  fn release_version(&mut self, snapshot: &str, suggested: &str) -> ShipResult<String>;

  /// Accept, reject or diff the candidate
  fn review_candidate(&mut self, candidate: &Candidate<'_>) -> ShipResult<CandidateChoice>;

  /// Whether to mark the previous `testing` release as `stable`
  fn promote_to_stable(&mut self, version: &str) -> ShipResult<bool>;

  /// No upload command: wait until the operator has uploaded `files` by hand
  fn manual_upload(&mut self, files: &[PathBuf], destination: &str) -> ShipResult<()>;

  /// Some uploads are not visible yet; wait before probing again
  fn retry_uploads(&mut self, pending: &[PathBuf]) -> ShipResult<()>;
}

/// Interactive decisions on stdin/stdout
pub struct ConsoleDecider<R: BufRead> {
  input: R,
}

impl ConsoleDecider<io::StdinLock<'static>> {
  pub fn stdin() -> Self {
    Self {
      input: io::stdin().lock(),
    }
  }
}

impl<R: BufRead> ConsoleDecider<R> {
  pub fn new(input: R) -> Self {
    Self { input }
  }

  fn read_line(&mut self, prompt: &str) -> ShipResult<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    if self.input.read_line(&mut line)? == 0 {
      return Err(ShipError::message("Aborted: no more input"));
    }
    Ok(line.trim().to_string())
  }

  /// Ask until the answer is a prefix of one of `options` (case-insensitive)
  fn choose<'o>(&mut self, options: &[&'o str]) -> ShipResult<&'o str> {
    let prompt = format!("{}: ", options.join("/"));
    loop {
      let answer = self.read_line(&prompt)?.to_lowercase();
      if answer.is_empty() {
        continue;
      }
      if let Some(option) = options.iter().find(|o| o.to_lowercase().starts_with(&answer)) {
        return Ok(option);
      }
    }
  }
}

impl<R: BufRead> Decider for ConsoleDecider<R> {
  fn release_version(&mut self, snapshot: &str, suggested: &str) -> ShipResult<String> {
    println!("Snapshot version is {}", snapshot);
    let answer = self.read_line(&format!("Version number for new release [{}]: ", suggested))?;
    Ok(if answer.is_empty() { suggested.to_string() } else { answer })
  }

  fn review_candidate(&mut self, candidate: &Candidate<'_>) -> ShipResult<CandidateChoice> {
    println!(
      "\nCandidate release archive for version {}: {}",
      candidate.version,
      candidate.archive.display()
    );
    println!("(extracted to {} for inspection)", candidate.extracted.display());
    println!("\nPlease check candidate and select an action:");
    println!("P) Publish candidate (accept)");
    println!("F) Fail candidate (delete release-status file)");

    let mut options = vec!["Publish", "Fail"];
    if let Some(previous) = candidate.previous_archive {
      println!("D) Diff against release archive {}", previous.display());
      options.push("Diff");
    }
    println!("(you can also hit CTRL-C and resume this script when done)");

    Ok(match self.choose(&options)? {
      "Publish" => CandidateChoice::Publish,
      "Diff" => CandidateChoice::Diff,
      _ => CandidateChoice::Fail,
    })
  }

  fn promote_to_stable(&mut self, version: &str) -> ShipResult<bool> {
    println!("The previous release, version {}, is still marked as 'testing'.", version);
    Ok(self.choose(&["Yes", "No"])? == "Yes")
  }

  fn manual_upload(&mut self, files: &[PathBuf], destination: &str) -> ShipResult<()> {
    println!("NOTE: No upload command set => you'll have to upload the files yourself!");
    for file in files {
      println!("   {}", file.display());
    }
    println!("   to {}", destination);
    self.read_line("Press Return when done...")?;
    Ok(())
  }

  fn retry_uploads(&mut self, pending: &[PathBuf]) -> ShipResult<()> {
    eprintln!("   ⚠️  Warning: {} upload(s) not yet visible at their public URLs:", pending.len());
    for file in pending {
      eprintln!("      {}", file.display());
    }
    self.read_line("Press Return to try again...")?;
    Ok(())
  }
}

/// Pre-recorded decisions for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedDecider {
  /// `None` accepts the suggestion
  pub version: Option<String>,
  pub choices: std::collections::VecDeque<CandidateChoice>,
  pub promote: bool,
  pub reviews: usize,
  pub retries: usize,
  pub manual_uploads: usize,
  /// Run on every manual upload (e.g. to copy the files somewhere)
  pub on_manual_upload: Option<fn(&[PathBuf])>,
}

#[cfg(test)]
impl ScriptedDecider {
  pub fn choosing(choices: &[CandidateChoice]) -> Self {
    Self {
      choices: choices.iter().copied().collect(),
      ..Default::default()
    }
  }
}

#[cfg(test)]
impl Decider for ScriptedDecider {
  fn release_version(&mut self, _snapshot: &str, suggested: &str) -> ShipResult<String> {
    Ok(self.version.clone().unwrap_or_else(|| suggested.to_string()))
  }

  fn review_candidate(&mut self, _candidate: &Candidate<'_>) -> ShipResult<CandidateChoice> {
    self.reviews += 1;
    self
      .choices
      .pop_front()
      .ok_or_else(|| ShipError::message("Interrupted: no scripted choice left"))
  }

  fn promote_to_stable(&mut self, _version: &str) -> ShipResult<bool> {
    Ok(self.promote)
  }

  fn manual_upload(&mut self, files: &[PathBuf], _destination: &str) -> ShipResult<()> {
    self.manual_uploads += 1;
    if let Some(hook) = self.on_manual_upload {
      hook(files);
    }
    Ok(())
  }

  fn retry_uploads(&mut self, _pending: &[PathBuf]) -> ShipResult<()> {
    self.retries += 1;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Cursor;

  fn console(input: &str) -> ConsoleDecider<Cursor<Vec<u8>>> {
    ConsoleDecider::new(Cursor::new(input.as_bytes().to_vec()))
  }

  #[test]
  fn test_release_version_defaults_to_suggestion() {
    assert_eq!(console("\n").release_version("1.0-pre", "1.0").unwrap(), "1.0");
    assert_eq!(console("1.0.1\n").release_version("1.0-pre", "1.0").unwrap(), "1.0.1");
  }

  #[test]
  fn test_choice_accepts_prefixes_and_reprompts() {
    let candidate = Candidate {
      version: "1.0",
      archive: Path::new("hello-1.0.tar.bz2"),
      extracted: Path::new("hello-1.0"),
      previous_archive: None,
    };
    assert_eq!(
      console("\nx\np\n").review_candidate(&candidate).unwrap(),
      CandidateChoice::Publish
    );
    assert_eq!(console("FAIL\n").review_candidate(&candidate).unwrap(), CandidateChoice::Fail);
    // Diff is only offered when there is something to diff against
    assert!(console("d\n").review_candidate(&candidate).is_err());

    let with_previous = Candidate {
      previous_archive: Some(Path::new("hello-0.9.tar.bz2")),
      ..candidate
    };
    assert_eq!(
      console("d\n").review_candidate(&with_previous).unwrap(),
      CandidateChoice::Diff
    );
  }

  #[test]
  fn test_end_of_input_aborts() {
    assert!(console("").promote_to_stable("0.9").is_err());
    assert!(console("y\n").promote_to_stable("0.9").unwrap());
  }
}
