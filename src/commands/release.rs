//! Release command implementation

use crate::core::config::ReleaseConfig;
use crate::core::error::ShipResult;
use crate::core::vcs::{GitOptions, GitScm};
use crate::feed::publish::CommandPublisher;
use crate::release::ReleaseSession;
use crate::release::decision::ConsoleDecider;
use crate::release::upload::HttpProbe;
use std::env;
use std::path::{Path, PathBuf};

/// Load the configuration with command-line overrides applied
pub(crate) fn load_config(dir: Option<PathBuf>, key: Option<String>, builders: Option<&str>) -> ShipResult<ReleaseConfig> {
  let dir = match dir {
    Some(dir) => dir,
    None => env::current_dir()?,
  };
  let mut config = ReleaseConfig::load(&dir)?;
  config.apply_overrides(key, builders);
  config.validate()?;
  Ok(config)
}

/// Open the repository holding the local feed
pub(crate) fn open_repository(config: &ReleaseConfig) -> ShipResult<GitScm> {
  let feed_dir = config.local_feed.parent().unwrap_or(Path::new("."));
  GitScm::open(
    feed_dir,
    GitOptions {
      signing_key: config.signing_key.clone(),
      sign_tags: config.sign_tags,
      remote: config.public_remote().map(str::to_string),
    },
  )
}

/// Run the release command
pub fn run_release(key: Option<String>, builders: Option<String>, dir: Option<PathBuf>) -> ShipResult<()> {
  let config = load_config(dir, key, builders.as_deref())?;
  let scm = open_repository(&config)?;
  let publisher = CommandPublisher::new(config.publish_tool.clone(), config.base_dir.clone());
  let probe = HttpProbe::new()?;
  let mut decider = ConsoleDecider::stdin();

  let mut session = ReleaseSession::new(&config, &scm, &publisher, &probe, &mut decider)?;
  session.run()
}
