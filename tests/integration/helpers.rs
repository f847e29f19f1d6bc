//! Test helpers for integration tests

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

pub const FEED: &str = r#"<?xml version="1.0" ?>
<interface xmlns="http://zero-install.sourceforge.net/2004/injector/interface">
  <name>Hello</name>
  <implementation id="." version="1.0-pre" main="hello.sh" arch="*-src"/>
</interface>
"#;

/// Stand-in for the publish tool: edits the single-line `<implementation>` with sed
const FAKE_PUBLISH: &str = r#"#!/bin/sh
set -e
for last; do :; done
feed="$last"
while [ $# -gt 1 ]; do
  case "$1" in
    --set-version) sed -i "/<implementation/s/version=\"[^\"]*\"/version=\"$2\"/" "$feed"; shift 2 ;;
    --archive-url) url="$2"; shift 2 ;;
    --archive-file) file="$2"; shift 2 ;;
    --archive-extract) extract="$2"; shift 2 ;;
    --local) local="$2"; shift 2 ;;
    --xmlsign) shift ;;
    *) shift 2 ;;
  esac
done
if [ -n "$url" ]; then
  size=$(wc -c < "$file" | tr -d ' ')
  sed -i "/<implementation/s|/>|><archive href=\"$url\" size=\"$size\" extract=\"$extract\"/></implementation>|" "$feed"
fi
if [ -n "$local" ]; then
  [ -f "$feed" ] || printf '<?xml version="1.0" ?>\n<interface xmlns="http://zero-install.sourceforge.net/2004/injector/interface">\n  <name>Hello</name>\n</interface>\n' > "$feed"
  grep '<implementation' "$local" > "$feed.impl"
  sed -i '/<\/interface>/d' "$feed"
  cat "$feed.impl" >> "$feed"
  echo '</interface>' >> "$feed"
  rm "$feed.impl"
fi
"#;

/// A git repository holding a feed, plus a releases directory beside it
pub struct ReleaseFixture {
  root: TempDir,
  pub repo: PathBuf,
  pub releases: PathBuf,
  pub public: PathBuf,
}

impl ReleaseFixture {
  pub fn new() -> Result<Self> {
    let root = TempDir::new()?;
    let repo = root.path().join("hello");
    let releases = root.path().join("releases");
    let public = root.path().join("public");
    std::fs::create_dir_all(&repo)?;
    std::fs::create_dir_all(&releases)?;

    git(&repo, &["init", "--initial-branch=main"])?;
    git(&repo, &["config", "user.name", "Test User"])?;
    git(&repo, &["config", "user.email", "test@example.com"])?;
    git(&repo, &["config", "commit.gpgsign", "false"])?;

    std::fs::write(repo.join("hello.xml"), FEED)?;
    std::fs::write(repo.join("hello.sh"), "#!/bin/sh\necho hello\n")?;
    git(&repo, &["add", "."])?;
    git(&repo, &["commit", "-m", "Initial commit"])?;

    std::fs::write(root.path().join("fake-publish.sh"), FAKE_PUBLISH)?;

    Ok(Self {
      root,
      repo,
      releases,
      public,
    })
  }

  /// Write `shiprel.toml` for uploads into `public/<version>/`
  pub fn write_config(&self) -> Result<()> {
    let public = self.public.display();
    std::fs::write(
      self.releases.join("shiprel.toml"),
      format!(
        r#"local_feed = "../hello/hello.xml"
master_feed_file = "Hello.xml"
archive_dir_public_url = "file://{public}/$RELEASE_VERSION"
archive_upload_command = "mkdir -p {public}/$RELEASE_VERSION && cp \"$@\" {public}/$RELEASE_VERSION/"
sign_tags = false
"#
      ),
    )?;
    Ok(())
  }

  pub fn publish_tool(&self) -> String {
    format!("sh {}", self.root.path().join("fake-publish.sh").display())
  }

  /// Run shiprel in the releases directory, feeding `input` to the prompts
  pub fn shiprel(&self, args: &[&str], input: &str) -> Result<Output> {
    run_shiprel_with_input(&self.releases, args, input, &[("SHIPREL_PUBLISH", &self.publish_tool())])
  }
}

/// Run git command in a directory
pub fn git(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = Command::new("git")
    .current_dir(cwd)
    .args(args)
    .output()
    .context("Failed to run git command")?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    anyhow::bail!("Git command failed: git {}\n{}", args.join(" "), stderr);
  }

  Ok(output)
}

/// Trimmed stdout of a git command
pub fn git_out(cwd: &Path, args: &[&str]) -> Result<String> {
  let output = git(cwd, args)?;
  Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Run the shiprel CLI, failing unless it succeeds
pub fn run_shiprel(cwd: &Path, args: &[&str]) -> Result<Output> {
  let output = run_shiprel_with_input(cwd, args, "", &[])?;

  if !output.status.success() {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    anyhow::bail!(
      "shiprel command failed: shiprel {}\nstdout: {}\nstderr: {}",
      args.join(" "),
      stdout,
      stderr
    );
  }

  Ok(output)
}

/// Run the shiprel CLI with stdin and extra environment, whatever its exit status
pub fn run_shiprel_with_input(cwd: &Path, args: &[&str], input: &str, envs: &[(&str, &str)]) -> Result<Output> {
  let shiprel_bin = env!("CARGO_BIN_EXE_shiprel");

  let mut child = Command::new(shiprel_bin)
    .current_dir(cwd)
    .args(args)
    .envs(envs.iter().copied())
    .env_remove("RUST_LOG")
    .stdin(Stdio::piped())
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .spawn()
    .context("Failed to run shiprel")?;

  if let Some(mut stdin) = child.stdin.take() {
    stdin.write_all(input.as_bytes())?;
  }
  Ok(child.wait_with_output()?)
}

pub fn stdout(output: &Output) -> String {
  String::from_utf8_lossy(&output.stdout).to_string()
}

pub fn stderr(output: &Output) -> String {
  String::from_utf8_lossy(&output.stderr).to_string()
}
