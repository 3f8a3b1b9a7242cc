//! `sitedeploy.toml` configuration.
//!
//! ```toml
//! [site]
//! path = "web"
//! build_output = "dist"
//! versioned_subdir = "_app/immutable"
//!
//! [destination]
//! bucket = "site"
//!
//! [[stores]]
//! bucket = "site"
//! backend = { type = "local", path = ".sitedeploy/buckets/site" }
//!
//! [cdn]
//! distribution_id = "E2QWRUHAPOMQZL"
//! endpoint = "https://cdn.internal.example.com"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sitedeploy_store::{BucketConfig, StoreConfig};

use crate::error::{DeployError, Result};
use crate::file_options::{default_rules, FileOptionRule};
use crate::invalidation::{paths, CdnConfig, WaiterConfig};
use crate::package::PackageOptions;
use crate::placeholder::PlaceholderSource;
use crate::replace::ReplaceValue;

pub const CONFIG_FILE_NAME: &str = "sitedeploy.toml";
pub const CONFIG_ENV: &str = "SITEDEPLOY_CONFIG";
pub const DEV_ENV: &str = "SITEDEPLOY_DEV";
pub const STATE_DIR_NAME: &str = ".sitedeploy";

const MB: u64 = 1024 * 1024;

fn default_site_path() -> PathBuf {
    PathBuf::from(".")
}

fn default_build_output() -> PathBuf {
    PathBuf::from("dist")
}

fn default_max_archive_mb() -> u64 {
    200
}

fn default_true() -> bool {
    true
}

fn default_distribution_paths() -> Vec<String> {
    vec![paths::DEFAULT_PATH.to_string()]
}

fn default_assets_bucket() -> String {
    "assets".to_string()
}

fn default_poll_interval_secs() -> u64 {
    20
}

fn default_max_wait_secs() -> u64 {
    600
}

fn default_invocation_budget_secs() -> u64 {
    840
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSection {
    #[serde(default = "default_site_path")]
    pub path: PathBuf,
    /// Build output directory, relative to `path`.
    #[serde(default = "default_build_output")]
    pub build_output: PathBuf,
    /// Content-hashed bundle directory, relative to the build output.
    #[serde(default)]
    pub versioned_subdir: Option<String>,
    #[serde(default = "default_max_archive_mb")]
    pub max_archive_mb: u64,
    #[serde(default = "default_true")]
    pub purge_files: bool,
    #[serde(default = "default_true")]
    pub wait_for_invalidation: bool,
    #[serde(default)]
    pub placeholder: bool,
    #[serde(default)]
    pub placeholder_stub: Option<PathBuf>,
    #[serde(default = "default_distribution_paths")]
    pub distribution_paths: Vec<String>,
    #[serde(default)]
    pub destination_auto_delete: bool,
}

impl Default for SiteSection {
    fn default() -> Self {
        Self {
            path: default_site_path(),
            build_output: default_build_output(),
            versioned_subdir: None,
            max_archive_mb: default_max_archive_mb(),
            purge_files: true,
            wait_for_invalidation: true,
            placeholder: false,
            placeholder_stub: None,
            distribution_paths: default_distribution_paths(),
            destination_auto_delete: false,
        }
    }
}

/// A single pattern or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl Default for Patterns {
    fn default() -> Self {
        Patterns::Many(Vec::new())
    }
}

impl Patterns {
    fn as_slice(&self) -> &[String] {
        match self {
            Patterns::One(p) => std::slice::from_ref(p),
            Patterns::Many(ps) => ps,
        }
    }
}

/// `[[file_options]]`: excludes apply before includes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileOptionConfig {
    #[serde(default)]
    pub exclude: Patterns,
    #[serde(default)]
    pub include: Patterns,
    #[serde(default)]
    pub cache_control: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

impl FileOptionConfig {
    pub fn to_rule(&self) -> Result<FileOptionRule> {
        let mut rule = FileOptionRule::new();
        for p in self.exclude.as_slice() {
            rule = rule.exclude(p)?;
        }
        for p in self.include.as_slice() {
            rule = rule.include(p)?;
        }
        rule.cache_control = self.cache_control.clone();
        rule.content_type = self.content_type.clone();
        Ok(rule)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DestinationSection {
    #[serde(default)]
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetsSection {
    #[serde(default = "default_assets_bucket")]
    pub bucket: String,
}

impl Default for AssetsSection {
    fn default() -> Self {
        Self {
            bucket: default_assets_bucket(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CdnSection {
    #[serde(default)]
    pub distribution_id: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: u64,
    #[serde(default = "default_invocation_budget_secs")]
    pub invocation_budget_secs: u64,
}

impl Default for InvalidationSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: default_max_wait_secs(),
            invocation_budget_secs: default_invocation_budget_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default)]
    pub site: SiteSection,
    #[serde(default)]
    pub file_options: Vec<FileOptionConfig>,
    #[serde(default)]
    pub replace_values: Vec<ReplaceValue>,
    #[serde(default)]
    pub destination: DestinationSection,
    #[serde(default)]
    pub assets: AssetsSection,
    #[serde(default)]
    pub stores: Vec<BucketConfig>,
    #[serde(default)]
    pub cdn: CdnSection,
    #[serde(default)]
    pub invalidation: InvalidationSection,
    /// Directory relative paths resolve against.
    #[serde(skip)]
    pub root: PathBuf,
}

impl SiteConfig {
    pub fn parse(content: &str, root: impl Into<PathBuf>) -> Result<Self> {
        let mut config: SiteConfig =
            toml::from_str(content).map_err(|e| DeployError::Config(e.to_string()))?;
        config.root = root.into();
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| DeployError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        Self::parse(&content, root)
    }

    /// Load `path` if it exists, otherwise defaults rooted at its directory.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let root = path.parent().unwrap_or(Path::new("."));
        Ok(Self {
            root: root.to_path_buf(),
            ..Default::default()
        })
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn source_dir(&self) -> PathBuf {
        self.resolve(&self.site.path.join(&self.site.build_output))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR_NAME)
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.state_dir().join("artifacts")
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir().join("state.json")
    }

    pub fn max_archive_bytes(&self) -> u64 {
        self.site.max_archive_mb.saturating_mul(MB)
    }

    /// Configured rules, or the HTML/bundle defaults when none are set.
    pub fn file_option_rules(&self) -> Result<Vec<FileOptionRule>> {
        if self.file_options.is_empty() {
            return default_rules();
        }
        self.file_options.iter().map(FileOptionConfig::to_rule).collect()
    }

    /// Placeholder source when development mode is on.
    pub fn placeholder_source(&self, dev: bool) -> Option<PlaceholderSource> {
        if !(dev || self.site.placeholder) {
            return None;
        }
        Some(match &self.site.placeholder_stub {
            Some(stub) => PlaceholderSource::Directory(self.resolve(stub)),
            None => PlaceholderSource::BuiltIn,
        })
    }

    pub fn package_options(&self, dev: bool) -> PackageOptions {
        PackageOptions {
            source_dir: self.source_dir(),
            output_dir: self.artifacts_dir(),
            max_archive_bytes: self.max_archive_bytes(),
            versioned_subdirs: self.site.versioned_subdir.iter().cloned().collect(),
            placeholder: self.placeholder_source(dev),
        }
    }

    /// Store configs with local paths resolved against the config root.
    pub fn bucket_configs(&self) -> Vec<BucketConfig> {
        self.stores
            .iter()
            .map(|cfg| match &cfg.backend {
                StoreConfig::Local { path } => BucketConfig {
                    bucket: cfg.bucket.clone(),
                    backend: StoreConfig::Local {
                        path: self.resolve(path),
                    },
                },
                _ => cfg.clone(),
            })
            .collect()
    }

    pub fn waiter_config(&self) -> WaiterConfig {
        WaiterConfig {
            poll_interval: Duration::from_secs(self.invalidation.poll_interval_secs),
            max_wait: Duration::from_secs(self.invalidation.max_wait_secs),
            invocation_budget: Duration::from_secs(self.invalidation.invocation_budget_secs),
        }
    }

    /// CDN endpoint from `[cdn]`, falling back to the environment.
    pub fn cdn_config(&self) -> Option<CdnConfig> {
        let mut config = match &self.cdn.endpoint {
            Some(endpoint) => CdnConfig::new(endpoint),
            None => CdnConfig::from_env()?,
        };
        if let Some(token) = &self.cdn.token {
            config = config.with_token(token);
        }
        Some(config)
    }
}

/// Development mode from the flag or `SITEDEPLOY_DEV`.
pub fn dev_mode(flag: bool) -> bool {
    flag || std::env::var(DEV_ENV)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
