//! Release configuration (`shiprel.toml`)
//!
//! Searched in the releases directory in order: shiprel.toml, .shiprel.toml,
//! .config/shiprel.toml. Relative paths are resolved against the directory that
//! holds the config file.

use crate::core::error::{ConfigError, ShipError, ShipResult, ResultExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use toml_edit::{DocumentMut, Item, value};

/// Config file name written by `shiprel init`
pub const CONFIG_FILE_NAME: &str = "shiprel.toml";

/// Environment variable overriding the publish tool
pub const PUBLISH_TOOL_ENV: &str = "SHIPREL_PUBLISH";

/// Exit code of `test_command` meaning "no tests for this package"
pub const NO_TESTS_EXIT_CODE: i32 = 3;

/// Configuration for one releases directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseConfig {
  /// Package descriptor inside the git working copy
  pub local_feed: PathBuf,

  /// Catalog that accumulates every published version
  #[serde(default)]
  pub master_feed_file: PathBuf,

  /// Where archives are downloaded from (`$RELEASE_VERSION` is substituted)
  #[serde(default)]
  pub archive_dir_public_url: String,

  /// Shell command uploading archives, run as `sh -c CMD - FILES...`
  #[serde(default)]
  pub archive_upload_command: Option<String>,

  /// Shell command uploading the master feed
  #[serde(default)]
  pub master_feed_upload_command: Option<String>,

  /// Remote that receives the branch and tag after publishing
  #[serde(default)]
  pub public_scm_repository: Option<String>,

  /// GPG key for tags and feed signatures
  #[serde(default)]
  pub signing_key: Option<String>,

  /// Create signed tags (annotated-only when false)
  #[serde(default = "default_sign_tags")]
  pub sign_tags: bool,

  /// Feed publishing tool
  #[serde(default = "default_publish_tool")]
  pub publish_tool: String,

  /// Self-test entry point, given the extracted feed path
  #[serde(default)]
  pub test_command: Option<String>,

  /// Remote build agents for source packages
  #[serde(default)]
  pub builders: BuildersConfig,

  /// Directory containing the loaded config file
  #[serde(skip)]
  pub base_dir: PathBuf,
}

fn default_sign_tags() -> bool {
  true
}

fn default_publish_tool() -> String {
  "0publish".to_string()
}

/// Build agents
///
/// ```toml
/// [builders]
/// targets = ["linux-x86_64"]
///
/// [builders.target.linux-x86_64]
/// start = "vagrant up"
/// build = "ssh builder ./build.sh \"$@\""
/// stop = "vagrant halt"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildersConfig {
  /// Targets to build, in order
  #[serde(default)]
  pub targets: Vec<String>,

  /// Per-target commands
  #[serde(default)]
  pub target: BTreeMap<String, BuilderConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuilderConfig {
  /// Build command: `$1` source feed, `$2` archive, `$3` public URL, `$4` output feed
  pub build: String,
  #[serde(default)]
  pub start: Option<String>,
  #[serde(default)]
  pub stop: Option<String>,
}

impl ReleaseConfig {
  /// Find config file in search order: shiprel.toml, .shiprel.toml, .config/shiprel.toml
  pub fn find_config_path(dir: &Path) -> Option<PathBuf> {
    let candidates = vec![
      dir.join(CONFIG_FILE_NAME),
      dir.join(".shiprel.toml"),
      dir.join(".config").join(CONFIG_FILE_NAME),
    ];

    candidates.into_iter().find(|p| p.exists())
  }

  /// Load and validate config for a releases directory
  pub fn load(dir: &Path) -> ShipResult<Self> {
    let config_path = Self::find_config_path(dir).ok_or_else(|| {
      ShipError::Config(ConfigError::NotFound {
        dir: dir.to_path_buf(),
      })
    })?;

    let content = fs::read_to_string(&config_path)
      .with_context(|| format!("Failed to read config from {}", config_path.display()))?;
    let mut config = Self::parse(&content)
      .with_context(|| format!("Failed to parse config from {}", config_path.display()))?;

    config.base_dir = config_path.parent().unwrap_or(dir).to_path_buf();
    config.resolve_paths();

    if let Ok(tool) = env::var(PUBLISH_TOOL_ENV)
      && !tool.trim().is_empty()
    {
      config.publish_tool = tool;
    }

    config
      .validate()
      .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    Ok(config)
  }

  /// Parse config text without touching the filesystem
  pub fn parse(content: &str) -> ShipResult<Self> {
    Ok(toml_edit::de::from_str(content)?)
  }

  fn resolve_paths(&mut self) {
    if self.local_feed.is_relative() {
      self.local_feed = self.base_dir.join(&self.local_feed);
    }
    if !self.master_feed_file.as_os_str().is_empty() && self.master_feed_file.is_relative() {
      self.master_feed_file = self.base_dir.join(&self.master_feed_file);
    }
  }

  /// Apply command-line overrides
  ///
  /// `builders` is a comma-separated target list; an empty string disables builds.
  pub fn apply_overrides(&mut self, key: Option<String>, builders: Option<&str>) {
    if let Some(key) = key {
      self.signing_key = Some(key);
    }
    if let Some(builders) = builders {
      self.builders.targets = builders
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    }
  }

  /// Validate the configuration
  pub fn validate(&self) -> ShipResult<()> {
    if self.local_feed.as_os_str().is_empty() {
      return Err(ConfigError::MissingField {
        field: "local_feed".to_string(),
      }
      .into());
    }

    if self.master_feed_file.as_os_str().is_empty() {
      return Err(ShipError::with_help(
        "master_feed_file not set! Check your configuration.",
        "Set `master_feed_file` in shiprel.toml to the catalog that lists your releases.",
      ));
    }

    if self.archive_dir_public_url.trim().is_empty() {
      return Err(ConfigError::MissingField {
        field: "archive_dir_public_url".to_string(),
      }
      .into());
    }

    if self.publish_tool.trim().is_empty() {
      return Err(ConfigError::MissingField {
        field: "publish_tool".to_string(),
      }
      .into());
    }

    self.builders.validate()
  }

  /// Public directory URL for a release
  pub fn archive_dir_url(&self, version: &str) -> String {
    self
      .archive_dir_public_url
      .replace("${RELEASE_VERSION}", version)
      .replace("$RELEASE_VERSION", version)
      .trim_end_matches('/')
      .to_string()
  }

  /// Public download URL of an archive
  pub fn archive_url(&self, version: &str, basename: &str) -> String {
    format!("{}/{}", self.archive_dir_url(version), basename)
  }

  /// Non-empty archive upload command, if any
  pub fn archive_upload(&self) -> Option<&str> {
    non_empty(&self.archive_upload_command)
  }

  /// Non-empty master feed upload command, if any
  pub fn master_feed_upload(&self) -> Option<&str> {
    non_empty(&self.master_feed_upload_command)
  }

  /// Non-empty public remote, if any
  pub fn public_remote(&self) -> Option<&str> {
    non_empty(&self.public_scm_repository)
  }

  /// Commented starter config for a new releases directory
  pub fn template(local_feed: &Path, master_feed_name: &str) -> ShipResult<String> {
    let mut doc = DocumentMut::new();

    let entries: [(&str, Item, &str); 6] = [
      (
        "local_feed",
        value(local_feed.display().to_string()),
        "# The feed inside your git working copy.\n",
      ),
      (
        "master_feed_file",
        value(master_feed_name),
        "\n# The path to the main feed.\n# The new version is added here when you publish a release.\n",
      ),
      (
        "archive_dir_public_url",
        value(""),
        "\n# The directory people will download the releases from.\n\
         # This will appear in the remote feed file.\n\
         # archive_dir_public_url = \"https://example.org/releases/$RELEASE_VERSION\"\n",
      ),
      (
        "archive_upload_command",
        value(""),
        "\n# A shell command to upload the generated archive files to the public server\n\
         # (the files are passed as arguments). If unset, you'll have to upload them yourself.\n\
         # archive_upload_command = 'scp \"$@\" me@myhost:/var/www/releases/$RELEASE_VERSION/'\n",
      ),
      (
        "master_feed_upload_command",
        value(""),
        "\n# A shell command to upload the master feed to your web server.\n\
         # If unset, you'll have to upload it yourself.\n\
         # master_feed_upload_command = 'scp \"$@\" me@myhost:/var/www/feeds/'\n",
      ),
      (
        "public_scm_repository",
        value(""),
        "\n# Your public git remote. When publishing, the branch and the release tag\n\
         # are pushed to it. If unset, you'll have to push them yourself.\n\
         # public_scm_repository = \"origin\"\n",
      ),
    ];

    for (key, item, comment) in entries {
      doc[key] = item;
      if let Some(mut key_mut) = doc.as_table_mut().key_mut(key) {
        key_mut.leaf_decor_mut().set_prefix(comment);
      }
    }

    let content = doc.to_string();
    // The template must load back as a config
    Self::parse(&content)?;
    Ok(content)
  }
}

impl BuildersConfig {
  /// Validate that every requested target has a build command
  pub fn validate(&self) -> ShipResult<()> {
    for target in &self.targets {
      match self.target.get(target) {
        Some(builder) if !builder.build.trim().is_empty() => {}
        _ => {
          return Err(ShipError::Config(ConfigError::MissingField {
            field: format!("builders.target.{}.build", target),
          }));
        }
      }
    }
    Ok(())
  }

  /// Commands for one target
  pub fn get(&self, target: &str) -> Option<&BuilderConfig> {
    self.target.get(target)
  }
}

fn non_empty(field: &Option<String>) -> Option<&str> {
  field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}
