//! Updater settings.
//! Fixed protocol constants live here as `const`s; anything a host application may want to
//! override is carried by [`UpdaterConfig`], which can be persisted as JSON.

use crate::game::download::DownloadPool;
use anyhow::{Context, Result};
use reqwest::{Client, Proxy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::Handle;

// URL Constants
pub const VERSION_BASE_URL: &str = "https://s3.amazonaws.com/Minecraft.Download/";
pub const RESOURCE_BASE_URL: &str = "http://resources.download.minecraft.net/";
pub const LIBRARY_BASE_URL: &str = "https://libraries.minecraft.net/";

/// Manifest format understood by this updater. Versions asking for more need a newer launcher.
pub const LAUNCHER_FORMAT_VERSION: u32 = 17;

/// A file is given up on once its attempt count exceeds this.
pub const MAX_ATTEMPTS_PER_FILE: u32 = 5;

/// Stand-in size for progress reporting when the server never told us.
pub const ASSUMED_AVERAGE_FILE_SIZE: u64 = 5 * 1024 * 1024;

pub const DOWNLOAD_CONNECT_TIMEOUT_SECS: u64 = 5;
pub const REQUEST_TIMEOUT_SECS: u64 = 120;
pub const CATALOG_CONNECT_TIMEOUT_SECS: u64 = 15;
pub const CATALOG_READ_TIMEOUT_SECS: u64 = 60;

// Progress callbacks are throttled to this interval
pub const PROGRESS_INTERVAL_MS: u64 = 250;

// Cleanup thresholds
pub const NATIVES_MAX_AGE: Duration = Duration::from_secs(60 * 60);
pub const VIRTUAL_ASSETS_MAX_AGE_DAYS: i64 = 5;
pub const SKIN_MAX_AGE_DAYS: i64 = 7;
pub const ORPHANED_SNAPSHOT_MAX_AGE_DAYS: i64 = 7;

/// Asset index used by versions that do not name one.
pub const DEFAULT_ASSET_INDEX: &str = "legacy";

/// Name of the marker written into reconstructed virtual asset trees.
pub const LAST_USED_MARKER: &str = ".lastused";

pub const DEFAULT_MAX_DOWNLOAD_WORKERS: usize = 16;

/// User-tunable updater settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdaterConfig {
    /// Game directory holding `versions/`, `libraries/` and `assets/`
    pub game_dir: PathBuf,
    pub version_base_url: String,
    pub resource_base_url: String,
    pub library_base_url: String,
    /// Size of the download worker pool
    pub max_download_workers: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,
    pub launcher_format_version: u32,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            game_dir: PathBuf::from(".minecraft"),
            version_base_url: VERSION_BASE_URL.to_string(),
            resource_base_url: RESOURCE_BASE_URL.to_string(),
            library_base_url: LIBRARY_BASE_URL.to_string(),
            max_download_workers: DEFAULT_MAX_DOWNLOAD_WORKERS,
            proxy: None,
            launcher_format_version: LAUNCHER_FORMAT_VERSION,
        }
    }
}

impl UpdaterConfig {
    pub fn new(game_dir: impl Into<PathBuf>) -> Self {
        Self {
            game_dir: game_dir.into(),
            ..Self::default()
        }
    }

    /// Load settings from a JSON file, falling back to defaults for missing keys.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read updater config {:?}", path))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse updater config {:?}", path))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory {:?}", parent))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write updater config {:?}", path))
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.game_dir.join("versions")
    }

    pub fn libraries_dir(&self) -> PathBuf {
        self.game_dir.join("libraries")
    }

    pub fn assets_dir(&self) -> PathBuf {
        self.game_dir.join("assets")
    }

    /// Worker pool of `max_download_workers` tasks on `handle`.
    pub fn download_pool(&self, handle: Handle) -> DownloadPool {
        DownloadPool::new(handle, self.max_download_workers)
    }

    /// Client used for artifact downloads.
    pub fn download_client(&self) -> Result<Client> {
        self.build_client(
            Duration::from_secs(DOWNLOAD_CONNECT_TIMEOUT_SECS),
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        )
    }

    /// Client used for catalog listings and manifests.
    pub fn catalog_client(&self) -> Result<Client> {
        self.build_client(
            Duration::from_secs(CATALOG_CONNECT_TIMEOUT_SECS),
            Duration::from_secs(CATALOG_READ_TIMEOUT_SECS),
        )
    }

    fn build_client(&self, connect_timeout: Duration, timeout: Duration) -> Result<Client> {
        let mut builder = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .pool_max_idle_per_host(self.max_download_workers.max(1));

        if let Some(proxy) = &self.proxy {
            let proxy =
                Proxy::all(proxy).with_context(|| format!("Invalid proxy url {}", proxy))?;
            builder = builder.proxy(proxy);
        }

        builder.build().context("Failed to create HTTP client")
    }
}
