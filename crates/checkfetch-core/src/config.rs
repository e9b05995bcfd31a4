use crate::cache::{DiskCacheFactory, DEFAULT_DISK_CACHE_SIZE};
use crate::locator::{memo, DEFAULT_CHECKSUM_PARAM};
use crate::options::{self, RequestOptions};
use crate::strategy::DiskCacheStrategy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Disk cache section (optional `[cache]` table in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Total bytes kept on disk before least recently used entries go.
    pub max_size_bytes: u64,
    /// Cache directory; defaults to `~/.cache/checkfetch`.
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_DISK_CACHE_SIZE,
            directory: None,
        }
    }
}

/// Global configuration loaded from `~/.config/checkfetch/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckfetchConfig {
    /// Query parameter carrying the expected checksum.
    pub checksum_param: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// Redirect hops allowed per fetch.
    pub max_redirects: u32,
    /// Parsed locators kept for reuse.
    pub locator_cache_capacity: usize,
    /// "automatic", "all", "data", "resource" or "none".
    #[serde(default)]
    pub disk_cache_strategy: DiskCacheStrategy,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

impl Default for CheckfetchConfig {
    fn default() -> Self {
        Self {
            checksum_param: DEFAULT_CHECKSUM_PARAM.to_string(),
            connect_timeout_ms: 2500,
            read_timeout_ms: 2500,
            max_redirects: 5,
            locator_cache_capacity: memo::DEFAULT_CAPACITY,
            disk_cache_strategy: DiskCacheStrategy::Automatic,
            cache: None,
        }
    }
}

impl CheckfetchConfig {
    /// Request options carrying this config's network limits and strategy.
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions::new()
            .set(
                &options::CONNECT_TIMEOUT,
                Duration::from_millis(self.connect_timeout_ms),
            )
            .set(
                &options::READ_TIMEOUT,
                Duration::from_millis(self.read_timeout_ms),
            )
            .set(&options::MAX_REDIRECTS, self.max_redirects)
            .disk_cache_strategy(self.disk_cache_strategy)
    }

    pub fn cache_config(&self) -> CacheConfig {
        self.cache.clone().unwrap_or_default()
    }

    /// Configured cache directory, or the XDG cache home default.
    pub fn cache_directory(&self) -> Result<PathBuf> {
        if let Some(dir) = self.cache.as_ref().and_then(|c| c.directory.clone()) {
            return Ok(dir);
        }
        let xdg_dirs = xdg::BaseDirectories::new()?;
        Ok(xdg_dirs.get_cache_home().join("checkfetch"))
    }

    pub fn cache_factory(&self) -> Result<DiskCacheFactory> {
        let dir = self.cache_directory()?;
        Ok(DiskCacheFactory::in_directory(
            dir,
            self.cache_config().max_size_bytes,
        ))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("checkfetch")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<CheckfetchConfig> {
    let path = config_path()?;
    load_or_init_at(&path)
}

pub fn load_or_init_at(path: &Path) -> Result<CheckfetchConfig> {
    if !path.exists() {
        let default_cfg = CheckfetchConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml).with_context(|| format!("write {}", path.display()))?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: CheckfetchConfig =
        toml::from_str(&data).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
