//! Binary builds for source packages
//!
//! Each configured target gets the source feed and archive and must produce a
//! binary feed plus the archive it references. Targets run one at a time. A
//! target whose `binary-<target>.xml` already exists is skipped, so a resumed
//! release only builds what is missing.

use crate::core::config::ReleaseConfig;
use crate::core::error::{ConfigError, ReleaseError, ShipResult};
use crate::core::process;
use crate::feed::Feed;
use crate::release::upload::Artifact;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct BinaryCompiler<'a> {
  config: &'a ReleaseConfig,
  work_dir: &'a Path,
  src_feed: PathBuf,
  archive_file: String,
  version: String,
  targets: Vec<String>,
}

impl<'a> BinaryCompiler<'a> {
  /// `src_feed` is the published source feed (with its archive attached)
  pub fn new(config: &'a ReleaseConfig, work_dir: &'a Path, src_feed: PathBuf) -> ShipResult<Self> {
    let feed = Feed::load(&src_feed)?;
    let src_impl = feed.singleton_implementation()?;

    let archive_file = src_impl
      .archive()
      .map(|a| a.basename())
      .ok_or_else(|| ReleaseError::InvalidFeed {
        path: src_feed.clone(),
        message: "source implementation has no <archive>".to_string(),
      })?;

    let targets = if src_impl.is_source() {
      config.builders.targets.clone()
    } else {
      Vec::new()
    };
    if targets.is_empty() {
      info!("No build targets; no binaries will be built");
    } else {
      info!("{} build target(s) configured: {:?}", targets.len(), targets);
    }

    Ok(Self {
      config,
      work_dir,
      src_feed,
      archive_file,
      version: src_impl.version.clone(),
      targets,
    })
  }

  #[cfg(test)]
  pub fn targets(&self) -> &[String] {
    &self.targets
  }

  /// Output feed for a target
  pub fn binary_feed(&self, target: &str) -> PathBuf {
    self.work_dir.join(format!("binary-{}.xml", target))
  }

  /// Output feeds of every target, in target order
  pub fn binary_feeds(&self) -> Vec<PathBuf> {
    self.targets.iter().map(|t| self.binary_feed(t)).collect()
  }

  /// Build every target whose feed does not exist yet
  pub fn build_binaries(&self) -> ShipResult<()> {
    if self.targets.is_empty() {
      return Ok(());
    }
    println!("🔨 Source package, so generating binaries...");

    for target in &self.targets {
      let binary_feed = self.binary_feed(target);
      if binary_feed.exists() {
        println!("Feed {} already exists; not rebuilding", binary_feed.display());
        continue;
      }
      self.build_target(target, &binary_feed)?;
    }
    Ok(())
  }

  fn build_target(&self, target: &str, binary_feed: &Path) -> ShipResult<()> {
    let builder = self.config.builders.get(target).ok_or_else(|| {
      ConfigError::MissingField {
        field: format!("builders.target.{}.build", target),
      }
    })?;
    println!("\n🔨 Building binary with builder '{}' ...\n", target);

    let new_feed = binary_feed.with_extension("xml.new");
    let src_feed_name = file_name(&self.src_feed);
    let new_feed_name = file_name(&new_feed);
    let public_url = self.config.archive_dir_url(&self.version);
    let env = [("RELEASE_VERSION", self.version.as_str())];

    if let Some(start) = &builder.start {
      process::show_and_run::<&str>(start, &[], self.work_dir, &env)?;
    }
    let built = process::show_and_run(
      &builder.build,
      &[
        src_feed_name.as_str(),
        self.archive_file.as_str(),
        public_url.as_str(),
        new_feed_name.as_str(),
      ],
      self.work_dir,
      &env,
    );
    let stopped = match &builder.stop {
      Some(stop) => process::show_and_run::<&str>(stop, &[], self.work_dir, &env),
      None => Ok(()),
    };
    built?;
    stopped?;

    self.check_output(&new_feed)?;
    fs::rename(&new_feed, binary_feed)?;
    println!("✅ Built {}", binary_feed.display());
    Ok(())
  }

  /// The new feed must reference an archive that exists with exactly the declared size
  fn check_output(&self, new_feed: &Path) -> ShipResult<()> {
    let feed = Feed::load(new_feed)?;
    let archive = self.binary_archive(&feed, new_feed)?;

    let actual = match fs::metadata(&archive.path) {
      Ok(meta) => meta.len(),
      Err(_) => {
        return Err(
          ReleaseError::BinaryArtifact {
            path: archive.path,
            reason: "not found".to_string(),
          }
          .into(),
        );
      }
    };
    if actual != archive.size {
      return Err(
        ReleaseError::BinaryArtifact {
          path: archive.path,
          reason: format!("has wrong size ({} bytes, feed says {})", actual, archive.size),
        }
        .into(),
      );
    }
    Ok(())
  }

  /// Archive referenced by a binary feed, with its declared size
  fn binary_archive(&self, feed: &Feed, feed_path: &Path) -> ShipResult<Artifact> {
    let invalid = |message: &str| ReleaseError::InvalidFeed {
      path: feed_path.to_path_buf(),
      message: message.to_string(),
    };
    let source = feed
      .singleton_implementation()?
      .archive()
      .ok_or_else(|| invalid("binary implementation has no <archive>"))?;
    let size = source.size.ok_or_else(|| invalid("binary archive has no size"))?;
    Ok(Artifact {
      path: self.work_dir.join(source.basename()),
      size,
    })
  }

  /// Archives produced by all targets, in target order
  pub fn binary_artifacts(&self) -> ShipResult<Vec<Artifact>> {
    self
      .binary_feeds()
      .iter()
      .map(|path| {
        let feed = Feed::load(path)?;
        self.binary_archive(&feed, path)
      })
      .collect()
  }
}

fn file_name(path: &Path) -> String {
  path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::core::config::BuilderConfig;
  use crate::core::error::ShipError;
  use tempfile::TempDir;

  const SRC_FEED: &str = r#"<?xml version="1.0" ?>
<interface xmlns="http://zero-install.sourceforge.net/2004/injector/interface">
  <name>Hello</name>
  <implementation id="sha1=abc" version="1.0" arch="*-src">
    <archive href="http://example.com/releases/1.0/hello-1.0.tar.bz2" size="100" extract="hello-1.0"/>
  </implementation>
</interface>
"#;

  const BINARY_FEED: &str = r#"<?xml version="1.0" ?>
<interface xmlns="http://zero-install.sourceforge.net/2004/injector/interface">
  <name>Hello</name>
  <implementation id="sha1=def" version="1.0" arch="Linux-x86_64">
    <archive href="http://example.com/releases/1.0/hello-linux-1.0.tar.bz2" size="6"/>
  </implementation>
</interface>
"#;

  fn setup(build: &str) -> (TempDir, ReleaseConfig) {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("hello-1.0.xml"), SRC_FEED).unwrap();
    fs::write(dir.path().join("binary-template.xml"), BINARY_FEED).unwrap();

    let mut config = ReleaseConfig::parse(
      r#"
local_feed = "hello/hello.xml"
master_feed_file = "Hello.xml"
archive_dir_public_url = "http://example.com/releases/$RELEASE_VERSION"
"#,
    )
    .unwrap();
    config.builders.targets = vec!["linux".to_string()];
    config.builders.target.insert(
      "linux".to_string(),
      BuilderConfig {
        build: build.to_string(),
        start: Some("touch started".to_string()),
        stop: Some("touch stopped".to_string()),
      },
    );
    (dir, config)
  }

  #[test]
  fn test_build_produces_binary_feed() {
    let (dir, config) = setup(
      "echo \"$1 $2 $3\" > args && cp binary-template.xml \"$4\" && printf binary > hello-linux-1.0.tar.bz2",
    );
    let compiler = BinaryCompiler::new(&config, dir.path(), dir.path().join("hello-1.0.xml")).unwrap();
    compiler.build_binaries().unwrap();

    assert!(dir.path().join("binary-linux.xml").exists());
    assert!(!dir.path().join("binary-linux.xml.new").exists());
    assert!(dir.path().join("started").exists());
    assert!(dir.path().join("stopped").exists());
    assert_eq!(
      fs::read_to_string(dir.path().join("args")).unwrap(),
      "hello-1.0.xml hello-1.0.tar.bz2 http://example.com/releases/1.0\n"
    );

    let artifacts = compiler.binary_artifacts().unwrap();
    assert_eq!(artifacts.len(), 1);
    assert_eq!(artifacts[0].size, 6);
    assert!(artifacts[0].path.ends_with("hello-linux-1.0.tar.bz2"));

    // Already built: the build command must not run again
    fs::remove_file(dir.path().join("args")).unwrap();
    compiler.build_binaries().unwrap();
    assert!(!dir.path().join("args").exists());
  }

  #[test]
  fn test_wrong_size_is_rejected() {
    let (dir, config) = setup("cp binary-template.xml \"$4\" && printf bin > hello-linux-1.0.tar.bz2");
    let compiler = BinaryCompiler::new(&config, dir.path(), dir.path().join("hello-1.0.xml")).unwrap();

    let err = compiler.build_binaries().unwrap_err();
    assert!(matches!(err, ShipError::Release(ReleaseError::BinaryArtifact { .. })));
    assert!(err.to_string().contains("wrong size"));
    assert!(!dir.path().join("binary-linux.xml").exists());
  }

  #[test]
  fn test_stop_runs_after_failed_build() {
    let (dir, config) = setup("exit 1");
    let compiler = BinaryCompiler::new(&config, dir.path(), dir.path().join("hello-1.0.xml")).unwrap();

    assert!(matches!(
      compiler.build_binaries().unwrap_err(),
      ShipError::CommandFailed { .. }
    ));
    assert!(dir.path().join("stopped").exists());
  }

  #[test]
  fn test_binary_package_has_no_targets() {
    let (dir, config) = setup("exit 1");
    fs::write(
      dir.path().join("hello-1.0.xml"),
      SRC_FEED.replace("arch=\"*-src\"", "arch=\"*-*\""),
    )
    .unwrap();
    let compiler = BinaryCompiler::new(&config, dir.path(), dir.path().join("hello-1.0.xml")).unwrap();
    assert!(compiler.targets().is_empty());
    compiler.build_binaries().unwrap();
  }
}
