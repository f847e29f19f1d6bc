//! System git backend
//!
//! Uses git plumbing for everything. Side-branch commits are built with
//! `write-tree` + `commit-tree` + `update-ref`, so HEAD never moves.

use super::{SourceControl, Submodule, tag_name};
use crate::archive;
use crate::core::error::{ScmError, ShipError, ShipResult, ResultExt};
use std::ffi::OsStr;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tracing::debug;

/// Environment passed through to git (signing and pushing need more than PATH/HOME)
const PASSTHROUGH_ENV: &[&str] = &[
  "PATH",
  "HOME",
  "GNUPGHOME",
  "GPG_TTY",
  "SSH_AUTH_SOCK",
  "GIT_SSH_COMMAND",
  "GIT_AUTHOR_NAME",
  "GIT_AUTHOR_EMAIL",
  "GIT_COMMITTER_NAME",
  "GIT_COMMITTER_EMAIL",
];

/// Tagging and publishing options
#[derive(Debug, Clone, Default)]
pub struct GitOptions {
  /// Key id for `git tag -u`
  pub signing_key: Option<String>,
  /// `git tag -s` when true, `git tag -a` otherwise
  pub sign_tags: bool,
  /// Remote for `push_head_and_release`
  pub remote: Option<String>,
}

/// Git backend using system git
pub struct GitScm {
  /// Working tree root
  root: PathBuf,
  options: GitOptions,
}

impl GitScm {
  /// Open the repository containing `path`
  pub fn open(path: &Path, options: GitOptions) -> ShipResult<Self> {
    let output = Command::new("git")
      .arg("-C")
      .arg(path)
      .args(["rev-parse", "--show-toplevel"])
      .output()
      .context("Failed to execute git rev-parse")?;

    if !output.status.success() {
      return Err(ShipError::Scm(ScmError::RepoNotFound {
        path: path.to_path_buf(),
      }));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    Ok(Self {
      root: PathBuf::from(stdout.trim()),
      options,
    })
  }

  /// Create a git command rooted at the working tree with a minimal environment
  fn git_cmd(&self) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("-C").arg(&self.root);

    cmd.env_clear();
    for key in PASSTHROUGH_ENV {
      if let Ok(val) = std::env::var(key) {
        cmd.env(key, val);
      }
    }

    cmd.arg("-c").arg("advice.detachedHead=false");
    cmd.arg("-c").arg("core.quotePath=false");

    cmd
  }

  fn output<I, S>(&self, args: I) -> ShipResult<Output>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    let mut cmd = self.git_cmd();
    cmd.args(args);
    debug!("git {:?}", cmd.get_args().skip(6).collect::<Vec<_>>());
    cmd
      .stdin(Stdio::null())
      .output()
      .map_err(|e| ShipError::message(format!("Failed to execute git: {}", e)))
  }

  /// Run git and return trimmed stdout, failing on non-zero exit
  fn run<I, S>(&self, args: I) -> ShipResult<String>
  where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
  {
    let args: Vec<S> = args.into_iter().collect();
    let output = self.output(args.iter())?;

    if !output.status.success() {
      return Err(ShipError::Scm(ScmError::CommandFailed {
        command: command_line(&args),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      }));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
  }

  fn verify(&self, reference: &str) -> ShipResult<Option<String>> {
    let output = self.output(["rev-parse", "-q", "--verify", reference])?;
    if output.status.success() {
      Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
    } else {
      Ok(None)
    }
  }

  /// Pipe `git archive` for `revision` (run in `repo`) into `sink`
  fn archive_stream<F>(&self, repo: &Path, prefix: &str, revision: &str, sink: F) -> ShipResult<()>
  where
    F: FnOnce(&mut dyn std::io::Read) -> ShipResult<()>,
  {
    let mut cmd = self.git_cmd();
    // Re-root at the (sub)repository
    cmd.arg("-C").arg(repo);
    cmd.args(["archive", "--format=tar"]);
    cmd.arg(format!("--prefix={}/", prefix.trim_end_matches('/')));
    cmd.arg(revision);
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

    let line = format!("git archive --prefix={}/ {}", prefix, revision);
    let mut child = cmd
      .spawn()
      .map_err(|e| ShipError::message(format!("Failed to execute {}: {}", line, e)))?;

    let streamed = match child.stdout.as_mut() {
      Some(stdout) => sink(stdout),
      None => Err(ShipError::message("git archive produced no output stream")),
    };
    let output = child.wait_with_output()?;

    if !output.status.success() {
      return Err(ShipError::Scm(ScmError::CommandFailed {
        command: line,
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      }));
    }
    streamed
  }

  fn relative<'a>(&self, path: &'a Path) -> &'a Path {
    path.strip_prefix(&self.root).unwrap_or(path)
  }
}

impl SourceControl for GitScm {
  fn root(&self) -> &Path {
    &self.root
  }

  fn ensure_committed(&self) -> ShipResult<()> {
    let changes = self.run([
      "status",
      "--porcelain",
      "--untracked-files=no",
      "--ignore-submodules=none",
    ])?;
    if !changes.is_empty() {
      return Err(ScmError::DirtyWorkingTree { changes }.into());
    }
    Ok(())
  }

  fn ensure_versioned(&self, path: &Path) -> ShipResult<()> {
    let rel = self.relative(path);
    let output = self.output([
      OsStr::new("ls-files"),
      OsStr::new("--error-unmatch"),
      OsStr::new("--"),
      rel.as_os_str(),
    ])?;
    if !output.status.success() {
      return Err(
        ScmError::UntrackedFile {
          path: rel.to_path_buf(),
        }
        .into(),
      );
    }
    Ok(())
  }

  fn ensure_no_tag(&self, version: &str) -> ShipResult<()> {
    let tag = tag_name(version);
    if self.verify(&format!("refs/tags/{}", tag))?.is_some() {
      return Err(
        ScmError::TagExists {
          version: version.to_string(),
          tag,
        }
        .into(),
      );
    }
    Ok(())
  }

  fn tag_revision(&self, version: &str) -> ShipResult<Option<String>> {
    self.verify(&format!("refs/tags/{}^{{commit}}", tag_name(version)))
  }

  fn get_head_revision(&self) -> ShipResult<String> {
    let head = self.run(["rev-parse", "HEAD"])?;
    if head.is_empty() {
      return Err(ShipError::message("git rev-parse HEAD returned nothing"));
    }
    Ok(head)
  }

  fn get_current_branch(&self) -> ShipResult<String> {
    self
      .run(["symbolic-ref", "--short", "HEAD"])
      .map_err(|_| ShipError::with_help("HEAD is detached", "Check out the branch you want to release from."))
  }

  fn branch_revision(&self, branch: &str) -> ShipResult<Option<String>> {
    self.verify(&format!("refs/heads/{}", branch))
  }

  fn commit(&self, message: &str, branch: &str, parent: &str) -> ShipResult<String> {
    let parent_spec = format!("{}^{{commit}}", parent);
    let parent = self.run(["rev-parse", "--verify", parent_spec.as_str()])?;

    self.run(["add", "-u"])?;
    let tree = self.run(["write-tree"])?;
    let commit = self.run(["commit-tree", tree.as_str(), "-p", parent.as_str(), "-m", message])?;
    let branch_ref = format!("refs/heads/{}", branch);
    self.run(["update-ref", "-m", message, branch_ref.as_str(), commit.as_str()])?;

    debug!("Committed {} on {} (parent {})", commit, branch, parent);
    Ok(commit)
  }

  fn tag(&self, version: &str, revision: &str) -> ShipResult<()> {
    let tag = tag_name(version);
    let message = format!("Release {}", version);

    let mut args: Vec<&str> = vec!["tag"];
    if self.options.sign_tags {
      args.push("-s");
      if let Some(key) = &self.options.signing_key {
        args.extend(["-u", key.as_str()]);
      }
    } else {
      args.push("-a");
    }
    args.extend(["-m", message.as_str(), tag.as_str(), revision]);

    self.run(args)?;
    println!("🏷️  Tagged as {}", tag);
    Ok(())
  }

  fn reset_hard(&self, revision: &str) -> ShipResult<()> {
    self.run(["reset", "--hard", "-q", revision])?;
    Ok(())
  }

  fn delete_branch(&self, name: &str) -> ShipResult<()> {
    self.run(["branch", "-D", name])?;
    Ok(())
  }

  fn export(&self, prefix: &str, archive_path: &Path, revision: &str) -> ShipResult<()> {
    let result = self.archive_stream(&self.root, prefix, revision, |stream| {
      archive::compress_stream(stream, archive_path)
    });
    if result.is_err() && archive_path.exists() {
      let _ = std::fs::remove_file(archive_path);
    }
    result
  }

  fn submodules(&self, revision: &str) -> ShipResult<Vec<Submodule>> {
    let listing = self.run(["ls-tree", "-r", revision])?;
    // <mode> SP <type> SP <object> TAB <path>
    let submodules = listing
      .lines()
      .filter_map(|line| {
        let (meta, path) = line.split_once('\t')?;
        let mut fields = meta.split_whitespace();
        let mode = fields.next()?;
        let _kind = fields.next()?;
        let object = fields.next()?;
        (mode == "160000").then(|| Submodule {
          path: PathBuf::from(path),
          revision: object.to_string(),
        })
      })
      .collect();
    Ok(submodules)
  }

  fn export_submodule(&self, submodule: &Submodule, prefix: &str, dest: &Path) -> ShipResult<()> {
    let repo = self.root.join(&submodule.path);
    if !repo.join(".git").exists() {
      return Err(ShipError::with_help(
        format!("Submodule {} is not checked out", submodule.path.display()),
        "Run `git submodule update --init --recursive` and try again.",
      ));
    }

    let sub_prefix = format!("{}/{}", prefix.trim_end_matches('/'), submodule.path.display());
    self.archive_stream(&repo, &sub_prefix, &submodule.revision, |stream| {
      archive::unpack_tar(stream, dest)
    })
  }

  fn export_changelog(&self, since: Option<&str>, upto: &str, sink: &mut dyn Write) -> ShipResult<()> {
    let range = match since {
      Some(version) => format!("{}..{}", tag_name(version), upto),
      None => upto.to_string(),
    };
    let output = self.output(["log", "--no-merges", range.as_str()])?;
    if !output.status.success() {
      return Err(
        ScmError::CommandFailed {
          command: format!("git log {}", range),
          stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into(),
      );
    }
    sink.write_all(&output.stdout)?;
    Ok(())
  }

  fn push_head_and_release(&self, version: &str) -> ShipResult<()> {
    let remote = self
      .options
      .remote
      .as_deref()
      .ok_or_else(|| ShipError::message("No public repository configured"))?;
    let branch = self.get_current_branch()?;
    let tag = tag_name(version);

    println!("   Pushing {} and {} to '{}'...", branch, tag, remote);
    self.run(["push", remote, branch.as_str(), tag.as_str()])?;
    println!("   ✅ Pushed to {}", remote);
    Ok(())
  }

  fn grep(&self, pattern: &str) -> ShipResult<Vec<String>> {
    let output = self.output(["grep", "-n", "-I", "-E", "-e", pattern])?;
    match output.status.code() {
      Some(0) => Ok(
        String::from_utf8_lossy(&output.stdout)
          .lines()
          .map(str::to_string)
          .collect(),
      ),
      // No matches
      Some(1) => Ok(Vec::new()),
      _ => Err(
        ScmError::CommandFailed {
          command: format!("git grep {}", pattern),
          stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into(),
      ),
    }
  }
}

fn command_line<S: AsRef<OsStr>>(args: &[S]) -> String {
  let parts: Vec<String> = args.iter().map(|a| a.as_ref().to_string_lossy().into_owned()).collect();
  format!("git {}", parts.join(" "))
}
