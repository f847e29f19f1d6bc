//! Abandon the release in progress

use crate::commands::release::{load_config, open_repository};
use crate::core::error::ShipResult;
use crate::feed::publish::CommandPublisher;
use crate::release::ReleaseSession;
use crate::release::decision::ConsoleDecider;
use crate::release::upload::HttpProbe;
use std::path::PathBuf;

/// Run the abandon command
pub fn run_abandon(dir: Option<PathBuf>) -> ShipResult<()> {
  let config = load_config(dir, None, None)?;
  let scm = open_repository(&config)?;
  let publisher = CommandPublisher::new(config.publish_tool.clone(), config.base_dir.clone());
  let probe = HttpProbe::new()?;
  let mut decider = ConsoleDecider::stdin();

  let mut session = ReleaseSession::new(&config, &scm, &publisher, &probe, &mut decider)?;
  session.abandon()
}
