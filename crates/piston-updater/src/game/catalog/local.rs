use crate::error::UpdaterError;
use crate::game::catalog::{CatalogStore, VersionCatalog};
use crate::game::platform::Environment;
use crate::game::version::{CompleteVersion, ReleaseType, Version};
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

/// Versions installed in a game directory, read from `versions/<id>/<id>.json`
#[derive(Debug)]
pub struct LocalCatalog {
    base_dir: PathBuf,
    versions_dir: PathBuf,
    store: CatalogStore,
}

impl LocalCatalog {
    /// `base_dir` must already exist; its `versions/` folder is created on demand.
    pub fn new(base_dir: impl Into<PathBuf>) -> Result<Self, UpdaterError> {
        let base_dir = base_dir.into();
        if !base_dir.is_dir() {
            return Err(UpdaterError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("Base directory {:?} is not a folder", base_dir),
            )));
        }

        let versions_dir = base_dir.join("versions");
        std::fs::create_dir_all(&versions_dir)?;

        Ok(Self {
            base_dir,
            versions_dir,
            store: CatalogStore::new(),
        })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn versions_dir(&self) -> &Path {
        &self.versions_dir
    }

    /// Write the savable (unresolved) form of `version` to its manifest file.
    pub async fn save_version(&self, version: &CompleteVersion) -> Result<(), UpdaterError> {
        let savable = version.savable_version();
        let target = self
            .versions_dir
            .join(&savable.id)
            .join(format!("{}.json", savable.id));

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, savable.to_json_pretty()?).await?;
        log::debug!("Saved version {} to {:?}", savable.id, target);
        Ok(())
    }

    /// Write `versions/versions.json`
    pub async fn save_version_list(&self) -> Result<(), UpdaterError> {
        let text = self.serialize_version_list()?;
        tokio::fs::write(self.versions_dir.join("versions.json"), text).await?;
        Ok(())
    }

    /// Forget a version and delete its directory.
    pub async fn uninstall_version(&self, id: &str) -> Result<(), UpdaterError> {
        self.store.remove(id);

        let dir = self.versions_dir.join(id);
        if dir.is_dir() {
            log::info!("Uninstalling version {} from {:?}", id, dir);
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }

    async fn load_entries(&self) -> Result<Vec<Version>, UpdaterError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.versions_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        ids.sort();

        let mut versions = Vec::new();
        for id in ids {
            let path = format!("versions/{0}/{0}.json", id);
            if !self.base_dir.join(&path).is_file() {
                continue;
            }

            let version = match self.content(&path).await {
                Ok(content) => CompleteVersion::from_json(&content, &path),
                Err(e) => Err(e),
            };

            match version {
                Ok(version) if version.id == id => versions.push(Version::Complete(version)),
                Ok(version) => log::warn!(
                    "Ignoring: {}; it contains id: '{}' expected '{}'",
                    path,
                    version.id,
                    id
                ),
                Err(e) => log::warn!("Ignoring: {}; {}", path, e),
            }
        }

        Ok(versions)
    }
}

/// Newest entry per release type, by update time
fn latest_by_type(versions: &[Version]) -> HashMap<ReleaseType, String> {
    let mut latest: HashMap<ReleaseType, &Version> = HashMap::new();

    for version in versions {
        let Some(release_type) = version.release_type() else {
            continue;
        };
        let newer = latest
            .get(&release_type)
            .map_or(true, |current| current.updated_time() < version.updated_time());
        if newer {
            latest.insert(release_type, version);
        }
    }

    latest
        .into_iter()
        .map(|(release_type, version)| (release_type, version.id().to_string()))
        .collect()
}

impl VersionCatalog for LocalCatalog {
    fn store(&self) -> &CatalogStore {
        &self.store
    }

    fn refresh(&self) -> BoxFuture<'_, Result<(), UpdaterError>> {
        Box::pin(async move {
            self.store.clear();
            let versions = self.load_entries().await?;
            let latest = latest_by_type(&versions);
            log::info!("Found {} local versions in {:?}", versions.len(), self.versions_dir);
            self.store.replace_all(versions, latest);
            Ok(())
        })
    }

    fn content<'a>(&'a self, path: &'a str) -> BoxFuture<'a, Result<String, UpdaterError>> {
        Box::pin(async move {
            let text = tokio::fs::read_to_string(self.base_dir.join(path)).await?;
            Ok(text.replace("\r\n", "\n").replace('\r', "\n"))
        })
    }

    fn url_for(&self, path: &str) -> Result<Url, UpdaterError> {
        let file = self.base_dir.join(path);
        Url::from_file_path(&file)
            .map_err(|_| UpdaterError::malformed(file.display().to_string(), "not an absolute path"))
    }

    fn has_all_files(&self, version: &CompleteVersion, env: &Environment) -> bool {
        match version.required_files(env) {
            Ok(files) => files.iter().all(|file| self.base_dir.join(file).is_file()),
            Err(e) => {
                log::warn!("Couldn't list files of {}: {}", version.id, e);
                false
            }
        }
    }
}
