//! Configuration management for Tidings.
//!
//! Configuration is read from `~/.config/tidings/config.toml` at startup.
//! If the file doesn't exist, a default configuration with comments is created.

use crate::blob::DEFAULT_PREFETCH_CONCURRENCY;
use crate::cache::DEFAULT_EVICTION_DAYS;
use crate::connectivity::ProbeConfig;
use crate::feed::FeedConfig;
use serde::Deserialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Main configuration struct.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub feed: FeedConfig,
    pub images: ImageConfig,
    pub connectivity: ProbeConfig,
}

/// Where the cache lives and how long unbookmarked articles are kept.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding `tidings.db` and `images/` (default: platform data dir)
    pub data_dir: Option<PathBuf>,

    /// Articles cached longer ago than this are evicted (default: 30)
    pub eviction_days: i64,

    /// Run eviction once at startup (default: true)
    pub cleanup_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            eviction_days: DEFAULT_EVICTION_DAYS,
            cleanup_on_start: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Download article images after each fresh load (default: true)
    pub prefetch: bool,

    /// Maximum concurrent image downloads (default: 4)
    pub max_concurrency: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            prefetch: true,
            max_concurrency: DEFAULT_PREFETCH_CONCURRENCY,
        }
    }
}

impl Config {
    /// Load configuration from the default path.
    ///
    /// A missing file is created with commented defaults. Missing fields in
    /// an existing file use default values; an unparsable file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::default_config_path()?;
        Self::load_from(&config_path)
    }

    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            Self::create_default_config(config_path)?;
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::Io {
            path: config_path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: config_path.to_path_buf(),
            source: e,
        })
    }

    /// Get the default config file path: `~/.config/tidings/config.toml`
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(config_dir.join("tidings").join("config.toml"))
    }

    fn create_default_config(path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let mut file = fs::File::create(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        file.write_all(Self::default_config_content().as_bytes())
            .map_err(|e| ConfigError::Io {
                path: path.to_path_buf(),
                source: e,
            })?;

        Ok(())
    }

    fn default_config_content() -> &'static str {
        r##"# Tidings Configuration

[storage]
# Directory for the article database and image cache.
# Defaults to the platform data directory (e.g. ~/.local/share/tidings).
# data_dir = "/path/to/tidings"

# Unbookmarked articles cached more than this many days ago are evicted
eviction_days = 30

# Evict old articles every time tidings starts
cleanup_on_start = true

[feed]
# NewsAPI-compatible top-headlines endpoint
endpoint = "https://newsapi.org/v2/top-headlines"
country = "us"
category = "technology"

# Get a key at https://newsapi.org
# api_key = "your-key-here"

# Request timeout in seconds
timeout_secs = 10

[images]
# Download article images for offline viewing
prefetch = true

# Maximum concurrent image downloads
max_concurrency = 4

[connectivity]
# A TCP connect to this address counts as online
target = "1.1.1.1:443"

# Seconds between reachability probes
interval_secs = 30

# Connect timeout in milliseconds
timeout_ms = 1500
"##
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to read/write config file at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}
