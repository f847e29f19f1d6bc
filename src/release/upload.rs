//! Upload and verification of release artifacts
//!
//! Each artifact moves through `N -> A -> V` (see [`UploadStatus`]). All `N`
//! artifacts go up in one batch, then every `A` artifact is probed at its public
//! URL. A probe that matches the local size exactly marks it verified; anything
//! else (wrong size, network error, unknown scheme) sends it back to `N` for the
//! next round. Statuses are persisted after every transition, so an interrupted
//! run resumes with only the unverified artifacts.

use crate::core::error::{ShipError, ShipResult, StateError, UploadError};
use crate::core::process;
use crate::core::state::{ReleaseState, UploadStatus, UploadStatuses};
use crate::release::decision::Decider;
use crate::ui::progress::StepProgress;
use reqwest::Url;
use reqwest::blocking::Client;
use reqwest::header::{CONTENT_LENGTH, LOCATION};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Redirect hops followed before giving up
pub const MAX_REDIRECTS: usize = 5;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// A local file to publish, with the size its public copy must have
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
  pub path: PathBuf,
  pub size: u64,
}

impl Artifact {
  pub fn from_file(path: impl Into<PathBuf>) -> ShipResult<Self> {
    let path = path.into();
    let size = fs::metadata(&path)
      .map_err(|e| ShipError::message(format!("Cannot read artifact {}: {}", path.display(), e)))?
      .len();
    Ok(Self { path, size })
  }

  /// Name under which the artifact is published
  pub fn file_name(&self) -> String {
    self
      .path
      .file_name()
      .map(|n| n.to_string_lossy().into_owned())
      .unwrap_or_default()
  }
}

/// Reports the size of a published file
pub trait SizeProbe {
  fn remote_size(&self, url: &str) -> ShipResult<u64>;
}

/// `HEAD` requests over http(s), with redirects followed by hand; `file://` via metadata
pub struct HttpProbe {
  client: Client,
}

impl HttpProbe {
  pub fn new() -> ShipResult<Self> {
    let client = Client::builder()
      .redirect(reqwest::redirect::Policy::none())
      .timeout(PROBE_TIMEOUT)
      .user_agent(concat!("shiprel/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| ShipError::message(format!("Failed to create HTTP client: {}", e)))?;
    Ok(Self { client })
  }
}

fn request_error(url: &Url, err: impl std::fmt::Display) -> ShipError {
  UploadError::Request {
    url: url.to_string(),
    message: err.to_string(),
  }
  .into()
}

impl SizeProbe for HttpProbe {
  fn remote_size(&self, url: &str) -> ShipResult<u64> {
    let mut current = Url::parse(url).map_err(|e| UploadError::Request {
      url: url.to_string(),
      message: e.to_string(),
    })?;

    for _ in 0..=MAX_REDIRECTS {
      match current.scheme() {
        "file" => {
          let path = current
            .to_file_path()
            .map_err(|_| request_error(&current, "not a local path"))?;
          return Ok(fs::metadata(&path).map_err(|e| request_error(&current, e))?.len());
        }
        "http" | "https" => {}
        _ => {
          return Err(
            UploadError::UnsupportedScheme {
              url: current.to_string(),
            }
            .into(),
          );
        }
      }

      debug!("HEAD {}", current);
      let response = self
        .client
        .head(current.clone())
        .send()
        .map_err(|e| request_error(&current, e))?;
      let status = response.status();

      if matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308) {
        let location = response
          .headers()
          .get(LOCATION)
          .and_then(|v| v.to_str().ok())
          .ok_or_else(|| request_error(&current, "redirect without Location"))?;
        let next = current.join(location).map_err(|e| request_error(&current, e))?;
        debug!("{} redirects to {}", current, next);
        current = next;
        continue;
      }

      if !status.is_success() {
        return Err(
          UploadError::Status {
            url: current.to_string(),
            status: status.as_u16(),
          }
          .into(),
        );
      }

      return response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| {
          UploadError::MissingLength {
            url: current.to_string(),
          }
          .into()
        });
    }

    Err(
      UploadError::TooManyRedirects {
        url: url.to_string(),
        limit: MAX_REDIRECTS,
      }
      .into(),
    )
  }
}

/// Uploads artifacts to one public directory and waits until they are visible there
pub struct UploadVerifier<'a> {
  pub probe: &'a dyn SizeProbe,
  /// Public URL of the directory the artifacts end up in (no trailing `/`)
  pub base_url: String,
  /// Shell command receiving the files as `"$@"`; `None` means manual upload
  pub upload_command: Option<&'a str>,
  pub cwd: &'a Path,
  pub release_version: &'a str,
}

impl UploadVerifier<'_> {
  fn url_for(&self, artifact: &Artifact) -> String {
    format!("{}/{}", self.base_url, artifact.file_name())
  }

  fn upload(&self, batch: &[&Artifact], decider: &mut dyn Decider) -> ShipResult<()> {
    let files: Vec<PathBuf> = batch.iter().map(|a| a.path.clone()).collect();
    for artifact in batch {
      println!("📤 Upload {} as {}", artifact.path.display(), self.url_for(artifact));
    }
    match self.upload_command {
      Some(command) => process::show_and_run(
        command,
        &files,
        self.cwd,
        &[("RELEASE_VERSION", self.release_version)],
      ),
      None => decider.manual_upload(&files, &self.base_url),
    }
  }

  /// One probe; any failure just means "not verified yet"
  fn verified(&self, artifact: &Artifact) -> bool {
    let url = self.url_for(artifact);
    match self.probe.remote_size(&url) {
      Ok(size) if size == artifact.size => true,
      Ok(size) => {
        info!("{} has size {} (expected {})", url, size, artifact.size);
        false
      }
      Err(e) => {
        info!("Cannot check {}: {}", url, e);
        false
      }
    }
  }

  /// Upload and verify until every artifact is `V`
  ///
  /// `artifacts` must be the same list, in the same order, on every resume.
  pub fn run(&self, artifacts: &[Artifact], state: &mut ReleaseState, decider: &mut dyn Decider) -> ShipResult<()> {
    let mut statuses = match state.verified_uploads.clone() {
      Some(existing) if existing.0.len() == artifacts.len() => existing,
      Some(existing) => {
        return Err(
          StateError::Inconsistent {
            path: state.path().to_path_buf(),
            message: format!(
              "verified_uploads has {} entries but this release has {} artifacts",
              existing.0.len(),
              artifacts.len()
            ),
          }
          .into(),
        );
      }
      None => {
        let fresh = UploadStatuses::new(artifacts.len());
        state.verified_uploads = Some(fresh.clone());
        state.save()?;
        fresh
      }
    };

    while !statuses.all_verified() {
      let batch: Vec<&Artifact> = artifacts
        .iter()
        .zip(&statuses.0)
        .filter(|(_, s)| **s == UploadStatus::NotUploaded)
        .map(|(a, _)| a)
        .collect();

      if !batch.is_empty() {
        self.upload(&batch, decider)?;
        for status in statuses.0.iter_mut() {
          if *status == UploadStatus::NotUploaded {
            *status = UploadStatus::Attempted;
          }
        }
        state.verified_uploads = Some(statuses.clone());
        state.save()?;
      }

      let attempted = statuses.0.iter().filter(|s| **s == UploadStatus::Attempted).count();
      let mut progress = StepProgress::new(attempted, "Verifying uploads");
      for (artifact, status) in artifacts.iter().zip(statuses.0.iter_mut()) {
        if *status != UploadStatus::Attempted {
          continue;
        }
        *status = if self.verified(artifact) {
          UploadStatus::Verified
        } else {
          UploadStatus::NotUploaded
        };
        progress.inc();
      }
      state.verified_uploads = Some(statuses.clone());
      state.save()?;

      if !statuses.all_verified() {
        let pending: Vec<PathBuf> = artifacts
          .iter()
          .zip(&statuses.0)
          .filter(|(_, s)| **s != UploadStatus::Verified)
          .map(|(a, _)| a.path.clone())
          .collect();
        decider.retry_uploads(&pending)?;
      }
    }

    println!("✅ All {} upload(s) verified", artifacts.len());
    Ok(())
  }
}
