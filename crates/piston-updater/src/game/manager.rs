//! The version manager ties the catalogs, the resolver and the download machinery together.

use crate::config::UpdaterConfig;
use crate::error::UpdaterError;
use crate::game::assets::AssetIndex;
use crate::game::catalog::{LocalCatalog, RemoteCatalog, VersionCatalog};
use crate::game::download::downloadable::lock;
use crate::game::download::{DownloadJob, DownloadPool, Downloadable};
use crate::game::platform::Environment;
use crate::game::version::{
    resolve, CompleteVersion, InheritanceSource, LaunchCompatibility, ReleaseType, Version,
    VersionFilter, VersionSource, VersionSyncInfo,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use reqwest::Client;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::runtime::Handle;

/// Notified after every successful catalog refresh
pub trait RefreshedVersionsListener: Send + Sync {
    fn on_versions_refreshed(&self, manager: &VersionManager);
}

pub struct VersionManager {
    config: UpdaterConfig,
    environment: Environment,
    local: LocalCatalog,
    remote: RemoteCatalog,
    pool: DownloadPool,
    download_client: Client,
    refreshing: AtomicBool,
    refresh_listeners: Mutex<Vec<Arc<dyn RefreshedVersionsListener>>>,
}

impl VersionManager {
    /// Manager for `config.game_dir`, which is created if missing. Jobs run on `handle` with
    /// `config.max_download_workers` workers.
    pub fn new(config: UpdaterConfig, handle: Handle) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&config.game_dir)
            .with_context(|| format!("Failed to create game directory {:?}", config.game_dir))?;

        let local = LocalCatalog::new(&config.game_dir)?;
        let remote = RemoteCatalog::new(&config.version_base_url, config.catalog_client()?)?;
        let download_client = config.download_client()?;
        let pool = config.download_pool(handle);

        Ok(Self::from_parts(config, local, remote, pool, download_client))
    }

    pub fn from_parts(
        config: UpdaterConfig,
        local: LocalCatalog,
        remote: RemoteCatalog,
        pool: DownloadPool,
        download_client: Client,
    ) -> Self {
        Self {
            config,
            environment: Environment::current(),
            local,
            remote,
            pool,
            download_client,
            refreshing: AtomicBool::new(false),
            refresh_listeners: Mutex::new(Vec::new()),
        }
    }

    /// Evaluate rules against `environment` instead of the host.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    pub fn config(&self) -> &UpdaterConfig {
        &self.config
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn local(&self) -> &LocalCatalog {
        &self.local
    }

    pub fn remote(&self) -> &RemoteCatalog {
        &self.remote
    }

    pub fn pool(&self) -> &DownloadPool {
        &self.pool
    }

    /// Start `job` on this manager's worker pool.
    pub fn start_job(&self, job: &DownloadJob) -> Result<(), UpdaterError> {
        job.start(&self.pool)
    }

    pub fn is_refreshing(&self) -> bool {
        self.refreshing.load(Ordering::Acquire)
    }

    pub fn add_refresh_listener(&self, listener: Arc<dyn RefreshedVersionsListener>) {
        lock(&self.refresh_listeners).push(listener);
    }

    pub fn remove_refresh_listener(&self, listener: &Arc<dyn RefreshedVersionsListener>) {
        lock(&self.refresh_listeners).retain(|existing| !Arc::ptr_eq(existing, listener));
    }

    /// Reload both catalogs, local first. Listeners only hear about complete refreshes.
    pub async fn refresh_versions(&self) -> Result<(), UpdaterError> {
        self.refreshing.store(true, Ordering::Release);

        let result = async {
            log::info!("Refreshing local version list...");
            self.local.refresh().await?;
            log::info!("Refreshing remote version list...");
            self.remote.refresh().await
        }
        .await;

        self.refreshing.store(false, Ordering::Release);
        result?;
        log::info!("Refresh complete.");

        let listeners = lock(&self.refresh_listeners).clone();
        for listener in listeners {
            listener.on_versions_refreshed(self);
        }
        Ok(())
    }

    /// Versions to offer, newest first.
    ///
    /// Local entries come before remote ones and each release type is capped at the filter's
    /// maximum. While a refresh is running the list is empty.
    pub async fn versions(&self, filter: Option<&VersionFilter>) -> Vec<VersionSyncInfo> {
        if self.is_refreshing() {
            return Vec::new();
        }

        let mut result = Vec::new();
        let mut seen = HashSet::new();
        let mut counts: HashMap<ReleaseType, usize> = HashMap::new();

        let mut admit = |release_type: ReleaseType| match filter {
            None => true,
            Some(filter) => {
                let count = counts.entry(release_type).or_default();
                if filter.allows(release_type) && *count < filter.max_count() {
                    *count += 1;
                    true
                } else {
                    false
                }
            }
        };

        let local_versions = self.local.versions();
        for version in &local_versions {
            let Some(release_type) = version.release_type().filter(|_| version.is_listable()) else {
                continue;
            };
            if admit(release_type) {
                seen.insert(version.id().to_string());
                let remote = self.remote.version(version.id());
                result.push(self.version_sync_info_for(Some(version.clone()), remote).await);
            }
        }

        for version in self.remote.versions() {
            let Some(release_type) = version.release_type().filter(|_| version.is_listable()) else {
                continue;
            };
            if seen.contains(version.id()) {
                continue;
            }
            if admit(release_type) {
                seen.insert(version.id().to_string());
                let local = self.local.version(version.id());
                result.push(self.version_sync_info_for(local, Some(version)).await);
            }
        }

        if result.is_empty() {
            if let Some(version) = local_versions.into_iter().find(Version::is_listable) {
                let remote = self.remote.version(version.id());
                result.push(self.version_sync_info_for(Some(version), remote).await);
            }
        }

        result.sort_by(newest_first);
        result
    }

    pub async fn version_sync_info(&self, id: &str) -> VersionSyncInfo {
        self.version_sync_info_for(self.local.version(id), self.remote.version(id))
            .await
    }

    /// Reconcile a local and a remote entry. A complete local manifest is resolved, and only
    /// counts as up to date when all its files are on disk.
    pub async fn version_sync_info_for(
        &self,
        local: Option<Version>,
        remote: Option<Version>,
    ) -> VersionSyncInfo {
        let version = match local {
            Some(Version::Complete(version)) => version,
            other => return VersionSyncInfo::from_entries(other, remote),
        };

        let resolved = match resolve(&version, self).await {
            Ok(resolved) => resolved,
            Err(e) => {
                log::error!("Couldn't resolve version {}: {}", version.id, e);
                version
            }
        };

        let files_present = self.local.has_all_files(&resolved, &self.environment);
        VersionSyncInfo::from_entries(Some(Version::Complete(resolved)), remote)
            .with_files_present(files_present)
    }

    /// Every listable local version, reconciled
    pub async fn installed_versions(&self) -> Vec<VersionSyncInfo> {
        let mut installed = Vec::new();
        for version in self.local.versions() {
            if !version.is_listable() {
                continue;
            }
            let remote = self.remote.version(version.id());
            installed.push(self.version_sync_info_for(Some(version), remote).await);
        }
        installed
    }

    /// Full manifest of the newest copy. A remote copy that can't be fetched falls back
    /// to the local one.
    pub async fn latest_complete_version(
        &self,
        sync: &VersionSyncInfo,
    ) -> Result<CompleteVersion, UpdaterError> {
        let Some(id) = sync.id() else {
            return Err(UpdaterError::UnknownVersion(String::new()));
        };

        if sync.latest_source() == VersionSource::Local {
            return self.local.complete_version(id).await;
        }

        match self.remote.complete_version(id).await {
            Ok(version) => Ok(version),
            Err(e) => {
                log::warn!("Couldn't fetch remote version {}: {}", id, e);
                self.local.complete_version(id).await.map_err(|_| e)
            }
        }
    }

    pub async fn resolve(&self, version: &CompleteVersion) -> Result<CompleteVersion, UpdaterError> {
        resolve(version, self).await
    }

    /// Replace the local copy with the remote manifest.
    pub async fn sync_version(&self, sync: &VersionSyncInfo) -> Result<VersionSyncInfo, UpdaterError> {
        let id = sync
            .remote_version()
            .map(Version::id)
            .ok_or_else(|| UpdaterError::UnknownVersion(sync.id().unwrap_or_default().to_string()))?;

        let remote = self.remote.complete_version(id).await?;
        if let Some(local) = sync.local_version() {
            self.local.store().remove(local.id());
        }
        self.local.add_version(remote.savable_version().clone())?;
        self.local.save_version(&remote).await?;

        Ok(self.version_sync_info(&remote.id).await)
    }

    /// Track and persist the unresolved form of `version`, replacing any existing copy.
    pub async fn install_version(&self, version: &CompleteVersion) -> Result<(), UpdaterError> {
        let savable = version.savable_version().clone();
        self.local.store().remove(&savable.id);
        self.local.save_version(&savable).await?;
        log::info!("Installed {}", savable.id);
        self.local.add_version(savable)
    }

    pub async fn uninstall_version(&self, id: &str) -> Result<(), UpdaterError> {
        self.local.uninstall_version(id).await?;
        log::info!("Uninstalled {}", id);
        Ok(())
    }

    pub fn launch_compatibility(&self, version: &CompleteVersion) -> LaunchCompatibility {
        version.launch_compatibility(&self.environment, self.config.launcher_format_version)
    }

    /// Queue the libraries and client jar of the newest copy of `sync` on `job`.
    pub async fn download_version(
        &self,
        sync: &VersionSyncInfo,
        job: &DownloadJob,
    ) -> Result<CompleteVersion, UpdaterError> {
        let version = self.latest_complete_version(sync).await?;
        let version = self.resolve(&version).await?;

        let libraries = version.required_downloadables(
            &self.environment,
            &self.download_client,
            &self.config.game_dir,
            &self.config.library_base_url,
            false,
        )?;
        job.add_downloadables(libraries)?;

        let jar_path = version.jar_path();
        let jar_url = self.remote.url_for(&jar_path)?;
        job.add_downloadable(Downloadable::etag(
            self.download_client.clone(),
            jar_url,
            self.config.game_dir.join(&jar_path),
            false,
        ))?;

        Ok(version)
    }

    /// Queue every asset object of `version` that is missing or the wrong size.
    /// Trouble fetching the index is logged and queues nothing.
    pub async fn download_resources(
        &self,
        job: &DownloadJob,
        version: &CompleteVersion,
    ) -> Result<(), UpdaterError> {
        let downloads = match self.resource_downloads(version).await {
            Ok(downloads) => downloads,
            Err(e) => {
                log::error!("Couldn't download resources: {}", e);
                Vec::new()
            }
        };
        job.add_downloadables(downloads)
    }

    async fn resource_downloads(&self, version: &CompleteVersion) -> Result<Vec<Downloadable>, UpdaterError> {
        let start = Instant::now();
        let index_name = version.asset_index_name();
        let assets_dir = self.config.assets_dir();
        let objects_dir = assets_dir.join("objects");
        let index_file = assets_dir.join("indexes").join(format!("{}.json", index_name));

        let json = match self.remote.content(&format!("indexes/{}.json", index_name)).await {
            Ok(json) => {
                if let Some(parent) = index_file.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&index_file, &json).await?;
                json
            }
            Err(e) if index_file.is_file() => {
                log::warn!("Couldn't fetch asset index {}, using local copy: {}", index_name, e);
                tokio::fs::read_to_string(&index_file).await?
            }
            Err(e) => return Err(e),
        };

        let index = AssetIndex::from_json(&json)?;
        let mut downloads = Vec::new();
        for (object, name) in index.unique_objects() {
            let file = objects_dir.join(object.hash_path());
            let present = std::fs::metadata(&file)
                .map(|metadata| metadata.is_file() && metadata.len() == object.size)
                .unwrap_or(false);

            if !present {
                downloads.push(Downloadable::asset(
                    self.download_client.clone(),
                    name,
                    object,
                    &self.config.resource_base_url,
                    &objects_dir,
                ));
            }
        }

        log::debug!("Delta time to compare resources: {} ms", start.elapsed().as_millis());
        Ok(downloads)
    }

    pub fn versions_dir(&self) -> PathBuf {
        self.config.versions_dir()
    }
}

/// Newest first by release time, or update time for entries without one. Undated entries go last.
fn newest_first(a: &VersionSyncInfo, b: &VersionSyncInfo) -> CmpOrdering {
    listing_time(b).cmp(&listing_time(a))
}

fn listing_time(sync: &VersionSyncInfo) -> Option<DateTime<Utc>> {
    let version = sync.latest_version()?;
    version.release_time().or_else(|| version.updated_time())
}

impl InheritanceSource for VersionManager {
    fn parent_sync_info<'a>(&'a self, id: &'a str) -> BoxFuture<'a, VersionSyncInfo> {
        Box::pin(async move {
            VersionSyncInfo::from_entries(self.local.version(id), self.remote.version(id))
        })
    }

    fn latest_complete_version<'a>(
        &'a self,
        sync: &'a VersionSyncInfo,
    ) -> BoxFuture<'a, Result<CompleteVersion, UpdaterError>> {
        Box::pin(VersionManager::latest_complete_version(self, sync))
    }

    fn install_version<'a>(
        &'a self,
        version: &'a CompleteVersion,
    ) -> BoxFuture<'a, Result<(), UpdaterError>> {
        Box::pin(VersionManager::install_version(self, version))
    }
}
