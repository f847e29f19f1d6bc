//! Error types for shiprel with contextual messages and exit codes
//!
//! Every error belongs to a category that decides the process exit code, and most
//! carry a remediation hint. Release-level errors never leave the persisted
//! release state half-written: whatever phase failed simply did not record itself.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Exit codes for shiprel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
  /// User error (config, invalid args, missing files)
  User = 1,
  /// System error (git, external commands, I/O)
  System = 2,
  /// Precondition or validation failure (dirty tree, existing tag, failed tests)
  Validation = 3,
}

impl ExitCode {
  /// Convert to i32 for process exit
  pub fn as_i32(self) -> i32 {
    self as i32
  }
}

/// Main error type for shiprel
#[derive(Debug)]
pub enum ShipError {
  /// Configuration errors
  Config(ConfigError),

  /// Source control errors
  Scm(ScmError),

  /// Persisted release state errors
  State(StateError),

  /// Release workflow errors
  Release(ReleaseError),

  /// Upload verification errors (normally retried, not fatal)
  Upload(UploadError),

  /// An external command exited unsuccessfully
  CommandFailed { command: String, code: Option<i32> },

  /// I/O errors
  Io(io::Error),

  /// Generic error with message and optional context
  Message {
    message: String,
    context: Option<String>,
    help: Option<String>,
  },
}

impl ShipError {
  /// Create a simple error message
  pub fn message(msg: impl Into<String>) -> Self {
    ShipError::Message {
      message: msg.into(),
      context: None,
      help: None,
    }
  }

  /// Create an error with help text
  pub fn with_help(msg: impl Into<String>, help: impl Into<String>) -> Self {
    ShipError::Message {
      message: msg.into(),
      context: None,
      help: Some(help.into()),
    }
  }

  /// Add context to an existing error
  pub fn context(self, ctx: impl Into<String>) -> Self {
    let ctx_str = ctx.into();
    match self {
      ShipError::Message { message, context, help } => ShipError::Message {
        message,
        context: Some(context.map(|c| format!("{}\n{}", ctx_str, c)).unwrap_or(ctx_str)),
        help,
      },
      ShipError::Io(err) => ShipError::Message {
        message: format!("{}: {}", ctx_str, err),
        context: None,
        help: None,
      },
      _ => self,
    }
  }

  /// Get the appropriate exit code for this error
  pub fn exit_code(&self) -> ExitCode {
    match self {
      ShipError::Config(_) => ExitCode::User,
      ShipError::Scm(ScmError::CommandFailed { .. }) | ShipError::Scm(ScmError::RepoNotFound { .. }) => {
        ExitCode::System
      }
      ShipError::Scm(_) => ExitCode::Validation,
      ShipError::State(_) => ExitCode::User,
      ShipError::Release(_) => ExitCode::Validation,
      ShipError::Upload(_) => ExitCode::System,
      ShipError::CommandFailed { .. } => ExitCode::System,
      ShipError::Io(_) => ExitCode::System,
      ShipError::Message { .. } => ExitCode::User,
    }
  }

  /// Get contextual help message for this error
  pub fn help_message(&self) -> Option<String> {
    match self {
      ShipError::Config(e) => e.help_message(),
      ShipError::Scm(e) => e.help_message(),
      ShipError::State(e) => e.help_message(),
      ShipError::Release(e) => e.help_message(),
      ShipError::Message { help, .. } => help.clone(),
      _ => None,
    }
  }
}

impl fmt::Display for ShipError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ShipError::Config(e) => write!(f, "{}", e),
      ShipError::Scm(e) => write!(f, "{}", e),
      ShipError::State(e) => write!(f, "{}", e),
      ShipError::Release(e) => write!(f, "{}", e),
      ShipError::Upload(e) => write!(f, "{}", e),
      ShipError::CommandFailed { command, code } => match code {
        Some(code) => write!(f, "Command failed with exit code {}:\n{}", code, command),
        None => write!(f, "Command was killed by a signal:\n{}", command),
      },
      ShipError::Io(e) => write!(f, "I/O error: {}", e),
      ShipError::Message { message, context, .. } => {
        write!(f, "{}", message)?;
        if let Some(ctx) = context {
          write!(f, "\n{}", ctx)?;
        }
        Ok(())
      }
    }
  }
}

impl std::error::Error for ShipError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      ShipError::Io(e) => Some(e),
      _ => None,
    }
  }
}

impl From<io::Error> for ShipError {
  fn from(err: io::Error) -> Self {
    ShipError::Io(err)
  }
}

impl From<String> for ShipError {
  fn from(msg: String) -> Self {
    ShipError::message(msg)
  }
}

impl From<&str> for ShipError {
  fn from(msg: &str) -> Self {
    ShipError::message(msg)
  }
}

impl From<ConfigError> for ShipError {
  fn from(err: ConfigError) -> Self {
    ShipError::Config(err)
  }
}

impl From<ScmError> for ShipError {
  fn from(err: ScmError) -> Self {
    ShipError::Scm(err)
  }
}

impl From<StateError> for ShipError {
  fn from(err: StateError) -> Self {
    ShipError::State(err)
  }
}

impl From<ReleaseError> for ShipError {
  fn from(err: ReleaseError) -> Self {
    ShipError::Release(err)
  }
}

impl From<UploadError> for ShipError {
  fn from(err: UploadError) -> Self {
    ShipError::Upload(err)
  }
}

impl From<toml_edit::TomlError> for ShipError {
  fn from(err: toml_edit::TomlError) -> Self {
    ShipError::message(format!("TOML parse error: {}", err))
  }
}

impl From<toml_edit::de::Error> for ShipError {
  fn from(err: toml_edit::de::Error) -> Self {
    ShipError::message(format!("TOML deserialization error: {}", err))
  }
}

impl From<serde_json::Error> for ShipError {
  fn from(err: serde_json::Error) -> Self {
    ShipError::message(format!("JSON error: {}", err))
  }
}

impl From<quick_xml::Error> for ShipError {
  fn from(err: quick_xml::Error) -> Self {
    ShipError::message(format!("XML error: {}", err))
  }
}

impl From<quick_xml::events::attributes::AttrError> for ShipError {
  fn from(err: quick_xml::events::attributes::AttrError) -> Self {
    ShipError::message(format!("XML attribute error: {}", err))
  }
}

impl From<std::num::ParseIntError> for ShipError {
  fn from(err: std::num::ParseIntError) -> Self {
    ShipError::message(format!("Parse error: {}", err))
  }
}

impl From<std::string::FromUtf8Error> for ShipError {
  fn from(err: std::string::FromUtf8Error) -> Self {
    ShipError::message(format!("UTF-8 conversion error: {}", err))
  }
}

impl From<std::path::StripPrefixError> for ShipError {
  fn from(err: std::path::StripPrefixError) -> Self {
    ShipError::message(format!("Path strip prefix error: {}", err))
  }
}

impl From<walkdir::Error> for ShipError {
  fn from(err: walkdir::Error) -> Self {
    ShipError::message(format!("Directory walk error: {}", err))
  }
}

/// Configuration-related errors
#[derive(Debug)]
pub enum ConfigError {
  /// shiprel.toml not found
  NotFound { dir: PathBuf },

  /// Missing required field
  MissingField { field: String },
}

impl ConfigError {
  fn help_message(&self) -> Option<String> {
    match self {
      ConfigError::NotFound { .. } => {
        Some("Run `shiprel init <path/to/feed.xml>` in an empty directory to create one.".to_string())
      }
      ConfigError::MissingField { field } => Some(format!("Set `{}` in shiprel.toml.", field)),
    }
  }
}

impl fmt::Display for ConfigError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ConfigError::NotFound { dir } => {
        write!(
          f,
          "No shiprel configuration found.\nExpected file: {}/shiprel.toml",
          dir.display()
        )
      }
      ConfigError::MissingField { field } => {
        write!(f, "Missing required field in config: {}", field)
      }
    }
  }
}

/// Source control errors
#[derive(Debug)]
pub enum ScmError {
  /// SCM command failed
  CommandFailed { command: String, stderr: String },

  /// Repository not found
  RepoNotFound { path: PathBuf },

  /// Tracked files have uncommitted changes
  DirtyWorkingTree { changes: String },

  /// File is not under version control
  UntrackedFile { path: PathBuf },

  /// A release tag already exists for this version
  TagExists { version: String, tag: String },
}

impl ScmError {
  fn help_message(&self) -> Option<String> {
    match self {
      ScmError::DirtyWorkingTree { .. } => Some("Commit them with `git commit -a` (or stash them) and try again.".to_string()),
      ScmError::UntrackedFile { path } => Some(format!("Add it with `git add {}` and commit.", path.display())),
      ScmError::TagExists { tag, .. } => Some(format!("If you want to replace it, run `git tag -d {}`.", tag)),
      ScmError::RepoNotFound { path } => Some(format!(
        "The local feed must live inside a git working copy: {}",
        path.display()
      )),
      ScmError::CommandFailed { .. } => None,
    }
  }
}

impl fmt::Display for ScmError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ScmError::CommandFailed { command, stderr } => {
        write!(f, "Git command failed: {}\n{}", command, stderr)
      }
      ScmError::RepoNotFound { path } => {
        write!(f, "Git repository not found at: {}", path.display())
      }
      ScmError::DirtyWorkingTree { changes } => {
        write!(f, "Uncommitted changes! Changes are:\n{}", changes)
      }
      ScmError::UntrackedFile { path } => {
        write!(f, "File is not under version control: {}", path.display())
      }
      ScmError::TagExists { version, tag } => {
        write!(f, "Release {} is already tagged ({})", version, tag)
      }
    }
  }
}

/// Errors in the persisted release state
#[derive(Debug)]
pub enum StateError {
  /// A line did not parse as a known `name=value` pair
  Corrupt { path: PathBuf, line: String },

  /// The record contradicts itself or the current release
  Inconsistent { path: PathBuf, message: String },
}

impl StateError {
  fn help_message(&self) -> Option<String> {
    match self {
      StateError::Corrupt { path, .. } | StateError::Inconsistent { path, .. } => Some(format!(
        "Inspect {} by hand, or delete it to start the release from scratch.",
        path.display()
      )),
    }
  }
}

impl fmt::Display for StateError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StateError::Corrupt { path, line } => {
        write!(f, "Corrupt release state in {}: cannot parse line '{}'", path.display(), line)
      }
      StateError::Inconsistent { path, message } => {
        write!(f, "Inconsistent release state in {}: {}", path.display(), message)
      }
    }
  }
}

/// Release workflow errors
#[derive(Debug)]
pub enum ReleaseError {
  /// HEAD moved since the release began
  HeadMoved {
    expected: String,
    actual: String,
    state_file: PathBuf,
  },

  /// Version has no -pre/-post modifier to derive a release from
  NotSnapshotVersion { version: String },

  /// A feed needs exactly one implementation
  ImplementationCount { feed: PathBuf, count: usize },

  /// The declared main executable is missing from the archive
  MissingMainExecutable { path: PathBuf },

  /// The local feed did not make it into the exported archive
  FeedNotInArchive { path: PathBuf },

  /// The master feed already lists this version
  DuplicateVersion { version: String, feed: PathBuf },

  /// The self-test entry point failed
  SelfTestFailed { command: String, code: Option<i32> },

  /// A build agent did not produce the artifact its feed declares
  BinaryArtifact { path: PathBuf, reason: String },

  /// A feed document is structurally unusable
  InvalidFeed { path: PathBuf, message: String },
}

impl ReleaseError {
  fn help_message(&self) -> Option<String> {
    match self {
      ReleaseError::HeadMoved { expected, state_file, .. } => Some(format!(
        "Reset your branch to {} and try again, or delete '{}' to release from the current HEAD.",
        expected,
        state_file.display()
      )),
      ReleaseError::NotSnapshotVersion { .. } => {
        Some("Set the feed's version to something like 1.0-pre or 0.9-post before releasing.".to_string())
      }
      ReleaseError::MissingMainExecutable { .. } | ReleaseError::FeedNotInArchive { .. } => {
        Some("Is it committed to version control?".to_string())
      }
      ReleaseError::DuplicateVersion { feed, .. } => Some(format!(
        "Pick another version number, or remove the existing entry from {}.",
        feed.display()
      )),
      ReleaseError::SelfTestFailed { .. } => {
        Some("The extracted candidate was left in place for inspection. Fix the problem and run again.".to_string())
      }
      _ => None,
    }
  }
}

impl fmt::Display for ReleaseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ReleaseError::HeadMoved { expected, actual, .. } => {
        write!(
          f,
          "There are more commits since the release started!\nHEAD was {}\nHEAD now {}",
          expected, actual
        )
      }
      ReleaseError::NotSnapshotVersion { version } => {
        write!(
          f,
          "Version '{}' is not a snapshot version (should end in -pre or -post)",
          version
        )
      }
      ReleaseError::ImplementationCount { feed, count } => {
        write!(
          f,
          "Feed '{}' contains {} versions! I need exactly one!",
          feed.display(),
          count
        )
      }
      ReleaseError::MissingMainExecutable { path } => {
        write!(f, "Main executable '{}' not found after unpacking archive!", path.display())
      }
      ReleaseError::FeedNotInArchive { path } => {
        write!(f, "Local feed not in archive: {}", path.display())
      }
      ReleaseError::DuplicateVersion { version, feed } => {
        write!(f, "Version {} is already published in {}", version, feed.display())
      }
      ReleaseError::SelfTestFailed { command, code } => match code {
        Some(code) => write!(f, "Self-test {} failed with exit status {}", command, code),
        None => write!(f, "Self-test {} was killed by a signal", command),
      },
      ReleaseError::BinaryArtifact { path, reason } => {
        write!(f, "Compiled binary '{}' {}", path.display(), reason)
      }
      ReleaseError::InvalidFeed { path, message } => {
        write!(f, "Invalid feed {}: {}", path.display(), message)
      }
    }
  }
}

/// Upload verification errors
#[derive(Debug)]
pub enum UploadError {
  /// Redirect chain exceeded the hop limit
  TooManyRedirects { url: String, limit: usize },

  /// No probe available for this URL scheme
  UnsupportedScheme { url: String },

  /// Remote answered with a non-success status
  Status { url: String, status: u16 },

  /// Remote did not report a size
  MissingLength { url: String },

  /// Transport-level failure
  Request { url: String, message: String },
}

impl fmt::Display for UploadError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      UploadError::TooManyRedirects { url, limit } => {
        write!(f, "Too many redirects (more than {}) for {}", limit, url)
      }
      UploadError::UnsupportedScheme { url } => write!(f, "Unsupported URL scheme: {}", url),
      UploadError::Status { url, status } => write!(f, "HTTP {} for {}", status, url),
      UploadError::MissingLength { url } => write!(f, "No Content-Length for {}", url),
      UploadError::Request { url, message } => write!(f, "Request for {} failed: {}", url, message),
    }
  }
}

/// Result type alias for shiprel
pub type ShipResult<T> = Result<T, ShipError>;

/// Helper trait to add context to Results
pub trait ResultExt<T> {
  /// Add context to an error result
  fn context(self, ctx: impl Into<String>) -> ShipResult<T>;

  /// Add context using a closure (lazy evaluation)
  fn with_context<F>(self, f: F) -> ShipResult<T>
  where
    F: FnOnce() -> String;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
  E: Into<ShipError>,
{
  fn context(self, ctx: impl Into<String>) -> ShipResult<T> {
    self.map_err(|e| e.into().context(ctx))
  }

  fn with_context<F>(self, f: F) -> ShipResult<T>
  where
    F: FnOnce() -> String,
  {
    self.map_err(|e| e.into().context(f()))
  }
}

/// Pretty-print an error to stderr with help text
pub fn print_error(error: &ShipError) {
  eprintln!("\n❌ {}\n", error);

  if let Some(help) = error.help_message() {
    eprintln!("💡 Help: {}\n", help);
  }
}

impl From<anyhow::Error> for ShipError {
  fn from(err: anyhow::Error) -> Self {
    ShipError::message(err.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_precondition_errors_use_validation_exit_code() {
    let err: ShipError = ScmError::DirtyWorkingTree {
      changes: " M hello.py".to_string(),
    }
    .into();
    assert_eq!(err.exit_code(), ExitCode::Validation);
    assert!(err.to_string().contains("Uncommitted changes!"));
    assert!(err.help_message().unwrap().contains("git commit -a"));
  }

  #[test]
  fn test_command_failure_names_command_and_code() {
    let err = ShipError::CommandFailed {
      command: "sh -c false".to_string(),
      code: Some(1),
    };
    assert_eq!(err.exit_code(), ExitCode::System);
    assert_eq!(err.to_string(), "Command failed with exit code 1:\nsh -c false");
  }

  #[test]
  fn test_head_moved_help_names_state_file() {
    let err: ShipError = ReleaseError::HeadMoved {
      expected: "abc".to_string(),
      actual: "def".to_string(),
      state_file: PathBuf::from("/tmp/releases/release-status"),
    }
    .into();
    let help = err.help_message().unwrap();
    assert!(help.contains("release-status"));
    assert!(help.contains("abc"));
  }

  #[test]
  fn test_context_chains_messages() {
    let result: ShipResult<()> = Err(ShipError::message("inner"));
    let err = result.context("outer").unwrap_err();
    assert_eq!(err.to_string(), "inner\nouter");
  }
}
