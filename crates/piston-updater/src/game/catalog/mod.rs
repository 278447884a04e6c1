//! Version catalogs.
//!
//! A catalog is an ordered list of [`Version`]s plus the latest id per release type. The
//! local catalog reads the game directory, the remote one reads the version origin; both
//! share [`CatalogStore`] for their cached state and [`VersionCatalog`] for behaviour.

pub mod local;
pub mod remote;

pub use local::LocalCatalog;
pub use remote::RemoteCatalog;

use crate::error::UpdaterError;
use crate::game::platform::Environment;
use crate::game::version::{CompleteVersion, RawVersionList, ReleaseType, Version};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use url::Url;

/// Cached catalog state
#[derive(Debug, Default)]
pub struct CatalogStore {
    state: RwLock<StoreState>,
}

#[derive(Debug, Default)]
struct StoreState {
    order: Vec<String>,
    versions: HashMap<String, Version>,
    latest: HashMap<ReleaseType, String>,
}

impl CatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Swap in a freshly loaded listing. Later duplicates of an id are dropped.
    pub fn replace_all(&self, versions: Vec<Version>, latest: HashMap<ReleaseType, String>) {
        let mut state = StoreState::default();
        for version in versions {
            let id = version.id().to_string();
            if state.versions.contains_key(&id) {
                log::warn!("Ignoring duplicate version entry {}", id);
                continue;
            }
            state.order.push(id.clone());
            state.versions.insert(id, version);
        }
        state.latest = latest
            .into_iter()
            .filter(|(_, id)| state.versions.contains_key(id))
            .collect();

        *self.write() = state;
    }

    pub fn clear(&self) {
        *self.write() = StoreState::default();
    }

    /// Every entry in catalog order
    pub fn versions(&self) -> Vec<Version> {
        let state = self.read();
        state
            .order
            .iter()
            .filter_map(|id| state.versions.get(id).cloned())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Version> {
        self.read().versions.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().versions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn add(&self, version: Version) -> Result<(), UpdaterError> {
        let mut state = self.write();
        let id = version.id().to_string();
        if state.versions.contains_key(&id) {
            return Err(UpdaterError::AlreadyTracked(id));
        }
        state.order.push(id.clone());
        state.versions.insert(id, version);
        Ok(())
    }

    /// Update an entry in place, keeping its position. Unknown ids are appended.
    pub fn replace(&self, version: Version) {
        let mut state = self.write();
        let id = version.id().to_string();
        if state.versions.insert(id.clone(), version).is_none() {
            state.order.push(id);
        }
    }

    /// Drop an entry, along with any latest marker pointing at it
    pub fn remove(&self, id: &str) -> Option<Version> {
        let mut state = self.write();
        let removed = state.versions.remove(id)?;
        state.order.retain(|entry| entry != id);
        state.latest.retain(|_, latest| latest != id);
        Some(removed)
    }

    pub fn latest(&self, release_type: ReleaseType) -> Option<Version> {
        let state = self.read();
        state
            .latest
            .get(&release_type)
            .and_then(|id| state.versions.get(id))
            .cloned()
    }

    /// Mark a tracked version as the latest of its release type.
    pub fn set_latest(&self, id: &str) -> Result<(), UpdaterError> {
        let mut state = self.write();
        let release_type = state
            .versions
            .get(id)
            .and_then(Version::release_type)
            .ok_or_else(|| UpdaterError::UnknownVersion(id.to_string()))?;
        state.latest.insert(release_type, id.to_string());
        Ok(())
    }

    /// The listing document for this catalog
    pub fn to_raw_list(&self) -> RawVersionList {
        let state = self.read();
        RawVersionList {
            latest: state
                .latest
                .iter()
                .map(|(release_type, id)| (release_type.name().to_string(), id.clone()))
                .collect(),
            versions: state
                .order
                .iter()
                .filter_map(|id| state.versions.get(id))
                .map(Version::to_partial)
                .collect(),
        }
    }
}

/// Behaviour shared by the local and remote catalogs.
///
/// Implementors provide storage access; listing, lookup and manifest completion come for free.
pub trait VersionCatalog: Send + Sync {
    fn store(&self) -> &CatalogStore;

    /// Reload the listing from the backing store
    fn refresh(&self) -> BoxFuture<'_, Result<(), UpdaterError>>;

    /// Text of a document below the catalog root
    fn content<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<String, UpdaterError>>;

    fn url_for(&self, path: &str) -> Result<Url, UpdaterError>;

    /// Whether every file `version` needs on `env` is already in place
    fn has_all_files(&self, version: &CompleteVersion, env: &Environment) -> bool;

    fn versions(&self) -> Vec<Version> {
        self.store().versions()
    }

    fn version(&self, id: &str) -> Option<Version> {
        self.store().get(id)
    }

    fn latest_version(&self, release_type: ReleaseType) -> Option<Version> {
        self.store().latest(release_type)
    }

    /// Full manifest for `id`. A listing-only entry is fetched from
    /// `versions/<id>/<id>.json` and replaced in the cache by the result.
    fn complete_version<'a>(&'a self, id: &'a str) -> BoxFuture<'a, Result<CompleteVersion, UpdaterError>> {
        Box::pin(async move {
            match self.version(id) {
                None => Err(UpdaterError::UnknownVersion(id.to_string())),
                Some(Version::Complete(version)) => Ok(version),
                Some(Version::Partial(_)) => {
                    let path = format!("versions/{0}/{0}.json", id);
                    let content = self.content(&path).await?;
                    let complete = CompleteVersion::from_json(&content, &path)?;
                    self.store().replace(Version::Complete(complete.clone()));
                    Ok(complete)
                }
            }
        })
    }

    fn add_version(&self, version: CompleteVersion) -> Result<(), UpdaterError> {
        self.store().add(Version::Complete(version))
    }

    fn remove_version(&self, id: &str) -> Result<Version, UpdaterError> {
        self.store()
            .remove(id)
            .ok_or_else(|| UpdaterError::UnknownVersion(id.to_string()))
    }

    fn serialize_version_list(&self) -> Result<String, UpdaterError> {
        Ok(serde_json::to_string_pretty(&self.store().to_raw_list())?)
    }
}
