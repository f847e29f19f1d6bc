//! Feed version numbers
//!
//! A version is a dotted list optionally followed by `-modifier[dotted-list]`
//! segments, e.g. `1.0`, `1.0-pre`, `2.1-rc3`, `0.9-post`. Modifiers order as
//! `pre < rc < (none) < post`, so a `-post` snapshot sorts after its release and a
//! `-pre` snapshot sorts before it.

use crate::core::error::{ReleaseError, ShipError, ShipResult};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Suffix marking a development snapshot that follows a release
pub const POST_SUFFIX: &str = "-post";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Modifier {
  Pre = -2,
  Rc = -1,
  None = 0,
  Post = 1,
}

impl Modifier {
  fn parse(s: &str) -> Option<Self> {
    match s {
      "pre" => Some(Modifier::Pre),
      "rc" => Some(Modifier::Rc),
      "" => Some(Modifier::None),
      "post" => Some(Modifier::Post),
      _ => None,
    }
  }

  fn as_str(self) -> &'static str {
    match self {
      Modifier::Pre => "pre",
      Modifier::Rc => "rc",
      Modifier::None => "",
      Modifier::Post => "post",
    }
  }
}

/// A parsed version: `dotted (modifier dotted)* modifier`
///
/// The trailing modifier is `None` unless the string ends directly in a modifier
/// (`1.0-pre`), which is what makes it a snapshot version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
  parts: Vec<(Vec<u64>, Modifier)>,
}

impl FromStr for Version {
  type Err = ShipError;

  fn from_str(s: &str) -> ShipResult<Self> {
    let invalid = || ShipError::message(format!("Invalid version number '{}'", s));

    let mut segments = s.split('-');
    let mut dotted = parse_dotted(segments.next().unwrap_or(""), false).ok_or_else(invalid)?;
    let mut parts = Vec::new();

    for segment in segments {
      let split = segment
        .find(|c: char| !c.is_ascii_lowercase())
        .unwrap_or(segment.len());
      let (name, rest) = segment.split_at(split);
      let modifier = Modifier::parse(name).ok_or_else(invalid)?;
      parts.push((dotted, modifier));
      dotted = parse_dotted(rest, true).ok_or_else(invalid)?;
    }

    // A version ending in a bare modifier has no trailing component
    if !(dotted.is_empty() && !parts.is_empty()) {
      parts.push((dotted, Modifier::None));
    }

    Ok(Self { parts })
  }
}

fn parse_dotted(s: &str, allow_empty: bool) -> Option<Vec<u64>> {
  if s.is_empty() {
    return allow_empty.then(Vec::new);
  }
  s.split('.').map(|n| n.parse::<u64>().ok()).collect()
}

impl fmt::Display for Version {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (dotted, modifier) in &self.parts {
      let numbers: Vec<String> = dotted.iter().map(|n| n.to_string()).collect();
      write!(f, "{}", numbers.join("."))?;
      if *modifier != Modifier::None {
        write!(f, "-{}", modifier.as_str())?;
      }
    }
    Ok(())
  }
}

impl Ord for Version {
  fn cmp(&self, other: &Self) -> Ordering {
    // Segment-by-segment, like comparing [[1, 0], -2, [], 0] lists
    for (a, b) in self.parts.iter().zip(other.parts.iter()) {
      let ord = a.0.cmp(&b.0).then(a.1.cmp(&b.1));
      if ord != Ordering::Equal {
        return ord;
      }
    }
    self.parts.len().cmp(&other.parts.len())
  }
}

impl PartialOrd for Version {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

/// Given a snapshot version, suggest a suitable release version
///
/// `1.0-pre` becomes `1.0`; `0.9-post` becomes `0.10`. Versions without a
/// trailing modifier are not snapshots and are rejected.
pub fn suggest_release_version(snapshot_version: &str) -> ShipResult<String> {
  let mut version: Version = snapshot_version.parse()?;

  let Some((dotted, modifier)) = version.parts.last_mut() else {
    return Err(not_snapshot(snapshot_version));
  };
  match *modifier {
    Modifier::None => return Err(not_snapshot(snapshot_version)),
    Modifier::Post => match dotted.last_mut() {
      Some(last) => *last += 1,
      None => return Err(not_snapshot(snapshot_version)),
    },
    Modifier::Pre | Modifier::Rc => {}
  }
  *modifier = Modifier::None;

  Ok(version.to_string())
}

/// The development snapshot that follows a release
pub fn post_release_snapshot(release_version: &str) -> String {
  format!("{}{}", release_version, POST_SUFFIX)
}

fn not_snapshot(version: &str) -> ShipError {
  ReleaseError::NotSnapshotVersion {
    version: version.to_string(),
  }
  .into()
}

#[cfg(test)]
mod tests {
  use super::*;

  fn v(s: &str) -> Version {
    s.parse().unwrap()
  }

  #[test]
  fn test_suggest_strips_pre() {
    assert_eq!(suggest_release_version("1.0-pre").unwrap(), "1.0");
    assert_eq!(suggest_release_version("2.4.1-rc").unwrap(), "2.4.1");
  }

  #[test]
  fn test_suggest_increments_post() {
    assert_eq!(suggest_release_version("0.9-post").unwrap(), "0.10");
    assert_eq!(suggest_release_version("1.0-post").unwrap(), "1.1");
  }

  #[test]
  fn test_suggest_rejects_release_versions() {
    let err = suggest_release_version("3").unwrap_err();
    assert_eq!(
      err.to_string(),
      "Version '3' is not a snapshot version (should end in -pre or -post)"
    );
    assert!(suggest_release_version("1.0-pre2").is_err());
  }

  #[test]
  fn test_parse_rejects_garbage() {
    assert!("1.x".parse::<Version>().is_err());
    assert!("1.0-beta".parse::<Version>().is_err());
    assert!("".parse::<Version>().is_err());
  }

  #[test]
  fn test_display_round_trips() {
    for s in ["1.0", "1.0-pre", "2.1-rc3", "0.9-post", "1.0-pre1-post"] {
      assert_eq!(v(s).to_string(), s);
    }
  }

  #[test]
  fn test_ordering() {
    assert!(v("1.0-pre") < v("1.0"));
    assert!(v("1.0-rc1") < v("1.0"));
    assert!(v("1.0") < v("1.0-post"));
    assert!(v("1.0-post") < v("1.1"));
    assert!(v("0.9") < v("0.10"));
    assert!(v("1.0") < v("1.0.1"));
    assert_eq!(v("1.0").cmp(&v("1.0")), Ordering::Equal);
  }

  #[test]
  fn test_post_release_snapshot() {
    assert_eq!(post_release_snapshot("1.0"), "1.0-post");
  }
}
