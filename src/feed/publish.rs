//! Typed invocation of the feed publishing tool
//!
//! Each option maps to exactly one flag. Boolean options become bare switches,
//! everything else becomes `--flag VALUE`; an empty value is still passed (it
//! clears the attribute).

use crate::core::error::{ShipError, ShipResult};
use crate::core::process;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

/// Edits to apply to a feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOptions {
  /// `--set-version`
  pub set_version: Option<String>,
  /// `--set-released` (`""` clears it)
  pub set_released: Option<String>,
  /// `--set-stability`
  pub set_stability: Option<String>,
  /// `--select-version`, restricting the other edits to one implementation
  pub select_version: Option<String>,
  /// `--archive-url`
  pub archive_url: Option<String>,
  /// `--archive-file`
  pub archive_file: Option<PathBuf>,
  /// `--archive-extract`
  pub archive_extract: Option<String>,
  /// `--local`, merging another feed's implementations into this one
  pub local: Option<PathBuf>,
  /// `--xmlsign`
  pub xmlsign: bool,
  /// `--key`
  pub key: Option<String>,
}

impl PublishOptions {
  /// Command-line arguments, in a fixed order
  pub fn to_args(&self) -> Vec<OsString> {
    let mut args = Vec::new();
    let mut value = |flag: &str, v: Option<OsString>| {
      if let Some(v) = v {
        args.push(OsString::from(format!("--{}", flag)));
        args.push(v);
      }
    };

    value("set-version", self.set_version.clone().map(Into::into));
    value("set-released", self.set_released.clone().map(Into::into));
    value("set-stability", self.set_stability.clone().map(Into::into));
    value("select-version", self.select_version.clone().map(Into::into));
    value("archive-url", self.archive_url.clone().map(Into::into));
    value("archive-file", self.archive_file.clone().map(Into::into));
    value("archive-extract", self.archive_extract.clone().map(Into::into));
    value("local", self.local.clone().map(Into::into));

    if self.xmlsign {
      args.push(OsString::from("--xmlsign"));
    }
    if let Some(key) = &self.key {
      args.push(OsString::from("--key"));
      args.push(OsString::from(key));
    }
    args
  }
}

/// Something that can apply [`PublishOptions`] to a feed file
pub trait FeedPublisher {
  fn publish(&self, feed: &Path, options: &PublishOptions) -> ShipResult<()>;
}

/// Runs the external publish tool (`0publish` by default)
pub struct CommandPublisher {
  tool: String,
  cwd: PathBuf,
}

impl CommandPublisher {
  /// `tool` may carry leading arguments, e.g. `0launch https://.../0publish`
  pub fn new(tool: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
    Self {
      tool: tool.into(),
      cwd: cwd.into(),
    }
  }
}

impl FeedPublisher for CommandPublisher {
  fn publish(&self, feed: &Path, options: &PublishOptions) -> ShipResult<()> {
    let mut words = self.tool.split_whitespace();
    let program = words
      .next()
      .ok_or_else(|| ShipError::message("No publish tool configured"))?;

    let mut cmd = Command::new(program);
    cmd.args(words).args(options.to_args()).arg(feed).current_dir(&self.cwd);
    info!("Publishing {}", feed.display());
    process::check_call(&mut cmd)
  }
}
