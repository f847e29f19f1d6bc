//! Feed documents
//!
//! A read-only model of the parts of a feed the release workflow needs: the
//! interface name, its implementations (with attributes inherited from enclosing
//! groups), their archives, and the `<release:management>` block. Writing feeds
//! is left to the publish tool (see [`publish`]).

pub mod publish;

use crate::core::error::{ReleaseError, ShipError, ShipResult, ResultExt};
use crate::core::version::Version;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Phases at which `<release:action>` commands can run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
  /// Before the release commit, in the working copy
  CommitRelease,
  /// After export, in the unpacked archive
  GenerateArchive,
}

impl Phase {
  const ALL: [Phase; 2] = [Phase::CommitRelease, Phase::GenerateArchive];

  pub fn as_str(self) -> &'static str {
    match self {
      Phase::CommitRelease => "commit-release",
      Phase::GenerateArchive => "generate-archive",
    }
  }

  fn parse(s: &str) -> Option<Self> {
    Self::ALL.into_iter().find(|p| p.as_str() == s)
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A shell command attached to a phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookAction {
  pub phase: Phase,
  pub command: String,
}

/// Contents of `<release:management>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleaseManagement {
  pub actions: Vec<HookAction>,
  /// Export under `<archive>/<feed name>/` instead of `<archive>/`
  pub add_toplevel_directory: bool,
}

impl ReleaseManagement {
  /// Commands registered for a phase, in document order
  pub fn actions_for(&self, phase: Phase) -> Vec<&str> {
    self
      .actions
      .iter()
      .filter(|a| a.phase == phase)
      .map(|a| a.command.as_str())
      .collect()
  }
}

/// A download source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveSource {
  pub href: String,
  pub size: Option<u64>,
  pub extract: Option<String>,
}

impl ArchiveSource {
  /// File name part of the href
  pub fn basename(&self) -> String {
    let path = self.href.split(['?', '#']).next().unwrap_or(&self.href);
    path.rsplit('/').next().unwrap_or(path).to_string()
  }
}

/// One implementation, with group attributes already applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Implementation {
  pub id: String,
  pub version: String,
  pub arch: Option<String>,
  pub main: Option<String>,
  pub self_test: Option<String>,
  pub stability: Option<String>,
  pub released: Option<String>,
  pub archives: Vec<ArchiveSource>,
}

impl Implementation {
  /// Whether this is a source package that build agents can compile
  pub fn is_source(&self) -> bool {
    self.arch.as_deref().is_some_and(|a| a.ends_with("-src"))
  }

  /// The first download source
  pub fn archive(&self) -> Option<&ArchiveSource> {
    self.archives.first()
  }
}

/// A parsed feed
#[derive(Debug, Clone, Default)]
pub struct Feed {
  pub path: PathBuf,
  pub name: String,
  pub feed_for: Vec<String>,
  pub implementations: Vec<Implementation>,
  pub release: ReleaseManagement,
}

impl Feed {
  /// Load a feed from disk
  pub fn load(path: &Path) -> ShipResult<Self> {
    let content =
      fs::read_to_string(path).with_context(|| format!("Failed to read feed {}", path.display()))?;
    Self::parse(&content, path)
  }

  /// Parse feed text; `path` is only used for messages
  pub fn parse(content: &str, path: &Path) -> ShipResult<Self> {
    FeedParser::new(path).parse(content).map_err(|e| match e {
      ShipError::Release(_) => e,
      other => ReleaseError::InvalidFeed {
        path: path.to_path_buf(),
        message: other.to_string(),
      }
      .into(),
    })
  }

  /// The only implementation, failing unless there is exactly one
  pub fn singleton_implementation(&self) -> ShipResult<&Implementation> {
    match self.implementations.as_slice() {
      [only] => Ok(only),
      impls => Err(
        ReleaseError::ImplementationCount {
          feed: self.path.clone(),
          count: impls.len(),
        }
        .into(),
      ),
    }
  }

  /// Release archive base name: lower-cased name, spaces as dashes, then version
  pub fn archive_name(&self, version: &str) -> String {
    format!("{}-{}", self.name.to_lowercase().replace(' ', "-"), version)
  }

  /// Whether any implementation already has `version`
  pub fn has_version(&self, version: &str) -> bool {
    let wanted = version.parse::<Version>().ok();
    self.implementations.iter().any(|i| match (&wanted, i.version.parse::<Version>()) {
      (Some(wanted), Ok(have)) => *wanted == have,
      _ => i.version == version,
    })
  }

  /// Highest version strictly below `version`
  pub fn previous_version(&self, version: &str) -> Option<String> {
    let limit: Version = version.parse().ok()?;
    self
      .implementations
      .iter()
      .filter_map(|i| i.version.parse::<Version>().ok().map(|v| (v, &i.version)))
      .filter(|(v, _)| *v < limit)
      .max_by(|a, b| a.0.cmp(&b.0))
      .map(|(_, s)| s.clone())
  }

  /// Implementation with exactly this version string
  pub fn implementation_for(&self, version: &str) -> Option<&Implementation> {
    self.implementations.iter().find(|i| i.version == version)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
  Group,
  Implementation,
}

/// Open `<group>` or `<implementation>` with its own attributes
#[derive(Debug)]
struct Frame {
  kind: FrameKind,
  attrs: BTreeMap<String, String>,
  archives: Vec<ArchiveSource>,
}

struct FeedParser {
  feed: Feed,
  elements: Vec<String>,
  frames: Vec<Frame>,
  management_blocks: usize,
  pending_action: Option<(Phase, String)>,
}

impl FeedParser {
  fn new(path: &Path) -> Self {
    Self {
      feed: Feed {
        path: path.to_path_buf(),
        ..Default::default()
      },
      elements: Vec::new(),
      frames: Vec::new(),
      management_blocks: 0,
      pending_action: None,
    }
  }

  fn parse(mut self, content: &str) -> ShipResult<Feed> {
    let mut reader = Reader::from_str(content);
    reader.trim_text(true);

    let mut buf = Vec::new();
    loop {
      match reader.read_event_into(&mut buf)? {
        Event::Start(ref e) => {
          let name = local_name(e)?;
          self.open(&name, e)?;
          self.elements.push(name);
        }
        Event::Empty(ref e) => {
          let name = local_name(e)?;
          self.open(&name, e)?;
          self.close(&name)?;
        }
        Event::End(_) => {
          if let Some(name) = self.elements.pop() {
            self.close(&name)?;
          }
        }
        Event::Text(e) => {
          let text = e.unescape()?.into_owned();
          self.text(&text);
        }
        Event::CData(e) => {
          let text = String::from_utf8(e.into_inner().into_owned())?;
          self.text(&text);
        }
        Event::Eof => break,
        _ => {}
      }
      buf.clear();
    }

    if self.feed.name.is_empty() {
      return Err(ShipError::message("Missing <name> element"));
    }
    Ok(self.feed)
  }

  fn in_management(&self) -> bool {
    self.elements.iter().any(|e| e == "management")
  }

  fn open(&mut self, name: &str, e: &BytesStart) -> ShipResult<()> {
    let depth = self.elements.len();
    match name {
      "management" => {
        self.management_blocks += 1;
        if self.management_blocks > 1 {
          return Err(ShipError::message("Multiple <release:management> sections"));
        }
        info!("Found <release:management> element.");
      }
      "action" if self.in_management() => {
        let phase = attributes(e)?.remove("phase").unwrap_or_default();
        let phase = Phase::parse(&phase).ok_or_else(|| {
          let valid: Vec<&str> = Phase::ALL.iter().map(|p| p.as_str()).collect();
          ShipError::message(format!(
            "Invalid action phase '{}'. Valid actions are:\n{}",
            phase,
            valid.join("\n")
          ))
        })?;
        self.pending_action = Some((phase, String::new()));
      }
      "add-toplevel-directory" if self.in_management() => {
        self.feed.release.add_toplevel_directory = true;
      }
      other if self.in_management() => {
        warn!("Unknown <release:management> element: {}", other);
      }
      "feed-for" if depth == 1 => {
        if let Some(uri) = attributes(e)?.remove("interface") {
          self.feed.feed_for.push(uri);
        }
      }
      "group" | "implementation" => {
        let kind = if name == "group" {
          FrameKind::Group
        } else {
          FrameKind::Implementation
        };
        self.frames.push(Frame {
          kind,
          attrs: attributes(e)?,
          archives: Vec::new(),
        });
      }
      "command" => {
        let mut attrs = attributes(e)?;
        let target = match attrs.get("name").map(String::as_str) {
          Some("run") => Some("main"),
          Some("test") => Some("self-test"),
          _ => None,
        };
        if let (Some(target), Some(path), Some(frame)) = (target, attrs.remove("path"), self.frames.last_mut()) {
          frame.attrs.insert(target.to_string(), path);
        }
      }
      "archive" => {
        let mut attrs = attributes(e)?;
        let href = attrs
          .remove("href")
          .ok_or_else(|| ShipError::message("<archive> without href"))?;
        let size = attrs.remove("size").map(|s| s.parse::<u64>()).transpose()?;
        let source = ArchiveSource {
          href,
          size,
          extract: attrs.remove("extract"),
        };
        if let Some(frame) = self.frames.iter_mut().rev().find(|f| f.kind == FrameKind::Implementation) {
          frame.archives.push(source);
        }
      }
      _ => {}
    }
    Ok(())
  }

  fn close(&mut self, name: &str) -> ShipResult<()> {
    match name {
      "action" => {
        if let Some((phase, command)) = self.pending_action.take() {
          self.feed.release.actions.push(HookAction {
            phase,
            command: command.trim().to_string(),
          });
        }
      }
      "group" | "implementation" => {
        let frame = self
          .frames
          .pop()
          .ok_or_else(|| ShipError::message(format!("Unbalanced </{}>", name)))?;
        if frame.kind == FrameKind::Implementation {
          let implementation = self.finish_implementation(frame)?;
          self.feed.implementations.push(implementation);
        }
      }
      _ => {}
    }
    Ok(())
  }

  fn text(&mut self, text: &str) {
    if let Some((_, command)) = self.pending_action.as_mut() {
      command.push_str(text);
    } else if self.elements.len() == 2 && self.elements[1] == "name" {
      self.feed.name = text.trim().to_string();
    }
  }

  /// Combine the implementation's attributes with those of its enclosing groups
  fn finish_implementation(&self, frame: Frame) -> ShipResult<Implementation> {
    let mut attrs = BTreeMap::new();
    for group in &self.frames {
      attrs.extend(group.attrs.clone());
    }
    attrs.remove("id");
    attrs.extend(frame.attrs);

    let version = attrs
      .remove("version")
      .ok_or_else(|| ShipError::message("Implementation has no version"))?;

    Ok(Implementation {
      id: attrs.remove("id").unwrap_or_default(),
      version,
      arch: attrs.remove("arch"),
      main: attrs.remove("main"),
      self_test: attrs.remove("self-test"),
      stability: attrs.remove("stability"),
      released: attrs.remove("released"),
      archives: frame.archives,
    })
  }
}

fn local_name(e: &BytesStart) -> ShipResult<String> {
  let name = e.local_name();
  Ok(std::str::from_utf8(name.as_ref())
    .map_err(|err| ShipError::message(format!("Invalid UTF-8 in element name: {}", err)))?
    .to_string())
}

fn attributes(e: &BytesStart) -> ShipResult<BTreeMap<String, String>> {
  let mut attrs = BTreeMap::new();
  for attr in e.attributes() {
    let attr = attr?;
    let key = std::str::from_utf8(attr.key.local_name().as_ref())
      .map_err(|err| ShipError::message(format!("Invalid UTF-8 in attribute name: {}", err)))?
      .to_string();
    let value = attr.unescape_value()?.into_owned();
    attrs.insert(key, value);
  }
  Ok(attrs)
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;

  pub(crate) const LOCAL_FEED: &str = r#"<?xml version="1.0" ?>
<interface xmlns="http://zero-install.sourceforge.net/2004/injector/interface"
           xmlns:release="http://zero-install.sourceforge.net/2007/namespaces/0release">
  <name>Hello World</name>
  <summary>says hello</summary>
  <feed-for interface="http://example.org/hello.xml"/>
  <release:management>
    <release:action phase="commit-release">echo $RELEASE_VERSION &gt; VERSION</release:action>
    <release:action phase="generate-archive"><![CDATA[touch generated && true]]></release:action>
  </release:management>
  <group main="hello.py" arch="*-src" stability="testing">
    <command name="test" path="tests/run.sh"/>
    <implementation id="." version="1.0-pre"/>
  </group>
</interface>
"#;

  fn parse(xml: &str) -> ShipResult<Feed> {
    Feed::parse(xml, Path::new("hello.xml"))
  }

  #[test]
  fn test_parse_local_feed() {
    let feed = parse(LOCAL_FEED).unwrap();
    assert_eq!(feed.name, "Hello World");
    assert_eq!(feed.feed_for, vec!["http://example.org/hello.xml"]);

    let impl_ = feed.singleton_implementation().unwrap();
    assert_eq!(impl_.version, "1.0-pre");
    assert_eq!(impl_.id, ".");
    assert_eq!(impl_.main.as_deref(), Some("hello.py"));
    assert_eq!(impl_.self_test.as_deref(), Some("tests/run.sh"));
    assert_eq!(impl_.stability.as_deref(), Some("testing"));
    assert!(impl_.is_source());

    assert_eq!(
      feed.release.actions_for(Phase::CommitRelease),
      vec!["echo $RELEASE_VERSION > VERSION"]
    );
    assert_eq!(
      feed.release.actions_for(Phase::GenerateArchive),
      vec!["touch generated && true"]
    );
    assert!(!feed.release.add_toplevel_directory);
    assert_eq!(feed.archive_name("1.0"), "hello-world-1.0");
  }

  #[test]
  fn test_invalid_phase_is_rejected() {
    let xml = LOCAL_FEED.replace("phase=\"commit-release\"", "phase=\"deploy\"");
    let err = parse(&xml).unwrap_err();
    assert!(err.to_string().contains("Invalid action phase 'deploy'"));
    assert!(err.to_string().contains("generate-archive"));
  }

  #[test]
  fn test_multiple_management_blocks_are_rejected() {
    let xml = LOCAL_FEED.replace(
      "<group ",
      "<release:management><release:add-toplevel-directory/></release:management>\n  <group ",
    );
    let err = parse(&xml).unwrap_err();
    assert!(err.to_string().contains("Multiple <release:management>"));
  }

  #[test]
  fn test_master_feed_versions() {
    let feed = parse(
      r#"<interface xmlns="http://zero-install.sourceforge.net/2004/injector/interface">
  <name>Hello</name>
  <group main="hello.py">
    <implementation id="sha1=a" version="0.9" stability="stable">
      <archive href="https://example.org/0.9/hello-0.9.tar.bz2" size="100" extract="hello-0.9"/>
    </implementation>
    <implementation id="sha1=b" version="0.10" stability="testing">
      <archive href="https://example.org/0.10/hello-0.10.tar.bz2?dl=1" size="120"/>
    </implementation>
    <implementation id="sha1=c" version="2.0-pre" stability="developer"/>
  </group>
</interface>"#,
    )
    .unwrap();

    assert!(feed.singleton_implementation().is_err());
    assert!(feed.has_version("0.10"));
    assert!(!feed.has_version("0.1"));
    assert_eq!(feed.previous_version("1.0").as_deref(), Some("0.10"));
    assert_eq!(feed.previous_version("0.9"), None);

    let old = feed.implementation_for("0.10").unwrap();
    assert_eq!(old.archive().unwrap().basename(), "hello-0.10.tar.bz2");
    assert_eq!(old.archive().unwrap().size, Some(120));
    assert_eq!(feed.implementation_for("0.9").unwrap().archive().unwrap().extract.as_deref(), Some("hello-0.9"));
  }

  #[test]
  fn test_singleton_error_names_count() {
    let xml = r#"<interface><name>Empty</name></interface>"#;
    let err = parse(xml).unwrap().singleton_implementation().map(|_| ()).unwrap_err();
    assert_eq!(err.to_string(), "Feed 'hello.xml' contains 0 versions! I need exactly one!");
  }
}
