//! Module for application configuration settings.
//!
//! User configurations may be specified in a configuration file. The API key may also come from
//! the `TORBOX_API_KEY` environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bytesize::ByteSize;
use media_fs::cache::{BlockCacheConfig, EvictionOrder};
use media_fs::cache::block::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_BLOCKS_PER_FILE};
use media_fs::cache::link::DEFAULT_LINK_TTL;
use media_fs::namespace::NamespaceMode;
use media_fs::refresh::DEFAULT_REFRESH_INTERVAL;
use secrecy::{ExposeSecret as _, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Environment variable consulted when the config file carries no API key.
pub const API_KEY_ENV: &str = "TORBOX_API_KEY";

fn runtime_dir() -> Option<PathBuf> {
    if let Some(path) = dirs::runtime_dir() {
        return Some(path.join("media-fs"));
    }

    dirs::home_dir().map(|home| home.join(".local").join("share").join("media-fs"))
}

fn default_pid_file() -> PathBuf {
    runtime_dir().map_or_else(
        || PathBuf::from("/var/run/media-fs.pid"),
        |rd| rd.join("media-fs.pid"),
    )
}

fn default_mount_point() -> PathBuf {
    runtime_dir().map_or_else(|| PathBuf::from("/tmp/media-fs/mnt"), |rd| rd.join("mnt"))
}

fn current_uid() -> u32 {
    nix::unistd::Uid::current().as_raw()
}

fn current_gid() -> u32 {
    nix::unistd::Gid::current().as_raw()
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL.as_secs()
}

/// Block and link cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CacheConfig {
    /// Size of one cached block.
    pub block_size: ByteSize,

    /// Blocks budgeted per file with an active link.
    pub max_blocks_per_file: usize,

    /// How long a resolved download link is reused.
    pub link_ttl_secs: u64,

    /// Which block goes first when the cache is over budget.
    pub eviction: EvictionOrder,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            block_size: ByteSize::b(DEFAULT_BLOCK_SIZE),
            max_blocks_per_file: DEFAULT_MAX_BLOCKS_PER_FILE,
            link_ttl_secs: DEFAULT_LINK_TTL.as_secs(),
            eviction: EvictionOrder::default(),
        }
    }
}

impl CacheConfig {
    /// Settings for the block cache.
    #[must_use]
    pub fn block_cache(&self) -> BlockCacheConfig {
        BlockCacheConfig {
            block_size: self.block_size.as_u64(),
            max_blocks_per_file: self.max_blocks_per_file,
            eviction: self.eviction,
        }
    }

    /// Link time-to-live.
    #[must_use]
    pub fn link_ttl(&self) -> Duration {
        Duration::from_secs(self.link_ttl_secs)
    }
}

/// Remote account settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RemoteConfig {
    /// The account API key.
    pub api_key: Option<SecretString>,

    /// API root.
    pub api_base_url: String,

    /// Per-request timeout.
    pub timeout_secs: u64,

    /// Attempts per request, first one included.
    pub max_attempts: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_base_url: torbox_api::DEFAULT_BASE_URL.to_owned(),
            timeout_secs: 60,
            max_attempts: torbox_api::RetryPolicy::default().max_attempts,
        }
    }
}

impl RemoteConfig {
    /// The configured key, falling back to [`API_KEY_ENV`]. Empty keys count as absent.
    #[must_use]
    pub fn resolved_api_key(&self) -> Option<SecretString> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(API_KEY_ENV).ok().map(SecretString::from))
            .filter(|k| !k.expose_secret().trim().is_empty())
    }

    /// Request timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DaemonConfig {
    /// The path to the PID file for the daemon.
    #[serde(default = "default_pid_file")]
    pub pid_file: PathBuf,

    /// Where a daemonized process writes its logs. Discarded if unset.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            pid_file: default_pid_file(),
            log_file: None,
        }
    }
}

/// Application configuration structure.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// The mount point for the filesystem.
    #[serde(default = "default_mount_point")]
    pub mount_point: PathBuf,

    /// How files are laid out in the mount.
    #[serde(default)]
    pub namespace_mode: NamespaceMode,

    /// Seconds between namespace refreshes.
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// The user owning every node. If not specified, the current user.
    #[serde(default = "current_uid")]
    pub uid: u32,

    /// The group owning every node. If not specified, the current group.
    #[serde(default = "current_gid")]
    pub gid: u32,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mount_point: default_mount_point(),
            namespace_mode: NamespaceMode::default(),
            refresh_interval_secs: default_refresh_interval_secs(),
            uid: current_uid(),
            gid: current_gid(),
            cache: CacheConfig::default(),
            remote: RemoteConfig::default(),
            daemon: DaemonConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation errors: {0:?}")]
    ValidationErrors(Vec<String>),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Config {
    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing every validation error message otherwise.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.remote.resolved_api_key().is_none() {
            errors.push(format!(
                "No API key configured. Set remote.api-key or the {API_KEY_ENV} environment \
                 variable."
            ));
        }

        if self.refresh_interval_secs == 0 {
            errors.push("refresh-interval-secs must be greater than zero.".to_owned());
        }

        if self.cache.block_size.as_u64() == 0 {
            errors.push("cache.block-size must be greater than zero.".to_owned());
        }

        if self.cache.max_blocks_per_file == 0 {
            errors.push("cache.max-blocks-per-file must be greater than zero.".to_owned());
        }

        if self.cache.link_ttl_secs == 0 {
            errors.push("cache.link-ttl-secs must be greater than zero.".to_owned());
        }

        if self.remote.timeout_secs == 0 {
            errors.push("remote.timeout-secs must be greater than zero.".to_owned());
        }

        if self.daemon.pid_file.parent().is_none() {
            errors.push(format!(
                "PID file path '{}' has no parent directory.",
                self.daemon.pid_file.display()
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Time between namespace refreshes.
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    /// Returns config file paths in descending priority order.
    /// On macOS, skips `dirs::config_dir()` (resolves to ~/Library/Application Support/).
    fn config_search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        #[cfg(not(target_os = "macos"))]
        if let Some(xdg) = dirs::config_dir() {
            paths.push(xdg.join("media-fs").join("config.toml"));
        }

        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("media-fs").join("config.toml"));
        }

        paths.push(PathBuf::from("/etc/media-fs/config.toml"));

        paths
    }

    /// Finds the first existing config file from search paths.
    fn find_config_file() -> Option<PathBuf> {
        Self::config_search_paths().into_iter().find(|p| p.exists())
    }

    /// Loads config from a single TOML file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        debug!(path = ?path, "Loading configuration file.");
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads configuration from the external path if given, else the first config file found,
    /// else defaults.
    pub fn load(external_config_path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = external_config_path {
            return Self::load_from_file(path);
        }

        match Self::find_config_file() {
            Some(path) => Self::load_from_file(&path),
            None => {
                debug!("No configuration file found, using defaults.");
                Ok(Self::default())
            }
        }
    }
}
