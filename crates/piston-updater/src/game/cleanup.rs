//! Garbage collection for the game directory.
//!
//! Orphan passes delete artifacts no installed version references; age passes expire skins,
//! natives folders and virtual asset trees. Every pass sweeps the empty directories it leaves.

use crate::config::{
    LAST_USED_MARKER, NATIVES_MAX_AGE, ORPHANED_SNAPSHOT_MAX_AGE_DAYS, SKIN_MAX_AGE_DAYS,
    VIRTUAL_ASSETS_MAX_AGE_DAYS,
};
use crate::game::assets::AssetIndex;
use crate::game::manager::VersionManager;
use crate::game::version::{ReleaseType, Version, VersionFilter, VersionSyncInfo};
use crate::utils::fs::{delete_empty_directories, is_older_than, remove_file_quietly};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

/// The version choice of one launcher profile
#[derive(Debug, Clone, Default)]
pub struct ProfileSelection {
    pub name: String,
    pub last_version_id: Option<String>,
    pub version_filter: VersionFilter,
}

impl ProfileSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_last_version(mut self, id: impl Into<String>) -> Self {
        self.last_version_id = Some(id.into());
        self
    }
}

fn days(count: i64) -> Duration {
    Duration::from_secs(count.max(0) as u64 * 24 * 60 * 60)
}

/// Run every pass. A failing pass is logged and the rest still run.
pub async fn perform_cleanups(manager: &VersionManager, profiles: &[ProfileSelection]) {
    let game_dir = manager.config().game_dir.clone();
    let assets_dir = manager.config().assets_dir();

    report("orphaned versions", cleanup_orphaned_versions(manager, profiles).await);
    report("orphaned assets", cleanup_orphaned_assets(manager).await);
    report("orphaned libraries", cleanup_orphaned_libraries(manager).await);
    report("old skins", cleanup_old_skins(&assets_dir));
    report("old natives", cleanup_old_natives(&game_dir.join("versions")));
    report("old virtual assets", cleanup_old_virtuals(&assets_dir));
}

fn report(pass: &str, result: Result<usize>) {
    match result {
        Ok(0) => log::debug!("Cleanup of {} found nothing to delete", pass),
        Ok(deleted) => log::info!("Cleanup of {} deleted {} entries", pass, deleted),
        Err(e) => log::error!("Cleanup of {} failed: {:#}", pass, e),
    }
}

/// Ids a profile keeps alive: its selected version, that version's parent and jar.
async fn referenced_versions(manager: &VersionManager, profiles: &[ProfileSelection]) -> HashSet<String> {
    let mut referenced = HashSet::new();

    for profile in profiles {
        let mut selection: Option<VersionSyncInfo> = None;
        if let Some(id) = &profile.last_version_id {
            let sync = manager.version_sync_info(id).await;
            if sync.latest_version().is_some() {
                selection = Some(sync);
            }
        }
        if selection.is_none() {
            selection = manager
                .versions(Some(&profile.version_filter))
                .await
                .into_iter()
                .next();
        }

        let Some(version) = selection.as_ref().and_then(VersionSyncInfo::latest_version) else {
            log::debug!("Profile {} selects no version", profile.name);
            continue;
        };

        referenced.insert(version.id().to_string());
        if let Some(complete) = version.as_complete() {
            if let Some(parent) = &complete.savable_version().inherits_from {
                referenced.insert(parent.clone());
            }
            referenced.insert(complete.jar().to_string());
        }
    }

    referenced
}

/// Uninstall snapshots no profile uses that are either still on the remote or old.
pub async fn cleanup_orphaned_versions(
    manager: &VersionManager,
    profiles: &[ProfileSelection],
) -> Result<usize> {
    log::info!("Looking for orphaned versions to clean up...");
    let referenced = referenced_versions(manager, profiles).await;
    let cutoff = Utc::now() - chrono::Duration::days(ORPHANED_SNAPSHOT_MAX_AGE_DAYS);
    let mut removed = 0;

    for sync in manager.installed_versions().await {
        let Some(Version::Complete(version)) = sync.local_version() else {
            continue;
        };
        if referenced.contains(&version.id) || version.release_type != Some(ReleaseType::Snapshot) {
            continue;
        }

        if sync.is_on_remote() {
            log::info!("Deleting orphaned version {} because it's a snapshot available on remote", version.id);
        } else if version.updated_time.is_some_and(|time| time < cutoff) {
            log::info!("Deleting orphaned version {} because it's an unsupported old snapshot", version.id);
        } else {
            continue;
        }

        match manager.uninstall_version(&version.id).await {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("Couldn't uninstall version {}: {}", version.id, e),
        }
    }

    Ok(removed)
}

/// Delete objects no installed version's asset index references. Nothing is deleted when
/// any installed index can't be read.
pub async fn cleanup_orphaned_assets(manager: &VersionManager) -> Result<usize> {
    let assets_dir = manager.config().assets_dir();
    let objects_dir = assets_dir.join("objects");
    if !objects_dir.is_dir() {
        return Ok(0);
    }

    let mut referenced = HashSet::new();
    for sync in manager.installed_versions().await {
        let Some(version) = sync.local_version().and_then(Version::as_complete) else {
            continue;
        };
        let index_file = assets_dir
            .join("indexes")
            .join(format!("{}.json", version.asset_index_name()));
        let index = AssetIndex::load(&index_file)
            .await
            .with_context(|| format!("Failed to read asset index {:?} of {}", index_file, version.id))?;
        referenced.extend(index.referenced_hashes());
    }

    let mut deleted = 0;
    for entry in WalkDir::new(&objects_dir).min_depth(2).max_depth(2) {
        let entry = entry.context("Failed to walk asset objects")?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_lowercase();
        if !referenced.contains(&name) {
            log::info!("Cleaning up orphaned object {}", name);
            remove_file_quietly(entry.path());
            deleted += 1;
        }
    }

    delete_empty_directories(&objects_dir)?;
    Ok(deleted)
}

/// Delete library files (and checksum sidecars) no installed version uses on this host.
pub async fn cleanup_orphaned_libraries(manager: &VersionManager) -> Result<usize> {
    let libraries_dir = manager.config().libraries_dir();
    if !libraries_dir.is_dir() {
        return Ok(0);
    }

    let mut referenced: HashSet<PathBuf> = HashSet::new();
    for sync in manager.installed_versions().await {
        let Some(version) = sync.local_version().and_then(Version::as_complete) else {
            continue;
        };
        for library in version.relevant_libraries(manager.environment()) {
            let Some(path) = library.relevant_path(manager.environment())? else {
                continue;
            };
            referenced.insert(libraries_dir.join(&path));
            referenced.insert(libraries_dir.join(format!("{}.sha", path)));
        }
    }

    let mut deleted = 0;
    for entry in WalkDir::new(&libraries_dir) {
        let entry = entry.context("Failed to walk libraries")?;
        if entry.file_type().is_file() && !referenced.contains(entry.path()) {
            log::info!("Cleaning up orphaned library {:?}", entry.path());
            remove_file_quietly(entry.path());
            deleted += 1;
        }
    }

    delete_empty_directories(&libraries_dir)?;
    Ok(deleted)
}

/// Delete cached skins older than a week.
pub fn cleanup_old_skins(assets_dir: &Path) -> Result<usize> {
    let skins_dir = assets_dir.join("skins");
    if !skins_dir.is_dir() {
        return Ok(0);
    }

    let mut deleted = 0;
    for entry in WalkDir::new(&skins_dir) {
        let entry = entry.context("Failed to walk skins")?;
        if entry.file_type().is_file() && is_older_than(entry.path(), days(SKIN_MAX_AGE_DAYS)) {
            log::info!("Cleaning up old skin {:?}", entry.file_name());
            remove_file_quietly(entry.path());
            deleted += 1;
        }
    }

    delete_empty_directories(&skins_dir)?;
    Ok(deleted)
}

/// Delete `versions/<id>/<id>-natives-*` extraction folders older than an hour.
pub fn cleanup_old_natives(versions_dir: &Path) -> Result<usize> {
    log::info!("Looking for old natives to clean up...");
    if !versions_dir.is_dir() {
        return Ok(0);
    }

    let mut deleted = 0;
    for version in std::fs::read_dir(versions_dir).context("Failed to list versions")? {
        let version = version?;
        if !version.file_type()?.is_dir() {
            continue;
        }

        let prefix = format!("{}-natives-", version.file_name().to_string_lossy());
        for entry in std::fs::read_dir(version.path())? {
            let entry = entry?;
            let path = entry.path();
            if !entry.file_name().to_string_lossy().starts_with(&prefix)
                || !is_older_than(&path, NATIVES_MAX_AGE)
            {
                continue;
            }

            log::debug!("Deleting {:?}", path);
            let removed = if entry.file_type()?.is_dir() {
                std::fs::remove_dir_all(&path)
            } else {
                std::fs::remove_file(&path)
            };
            match removed {
                Ok(()) => deleted += 1,
                Err(e) => log::warn!("Couldn't delete {:?}: {}", path, e),
            }
        }
    }

    Ok(deleted)
}

/// Delete virtual asset trees unused for five days, and any tree without a marker.
pub fn cleanup_old_virtuals(assets_dir: &Path) -> Result<usize> {
    let virtual_dir = assets_dir.join("virtual");
    if !virtual_dir.is_dir() {
        return Ok(0);
    }

    let cutoff = Utc::now() - chrono::Duration::days(VIRTUAL_ASSETS_MAX_AGE_DAYS);
    let mut deleted = 0;

    for entry in std::fs::read_dir(&virtual_dir).context("Failed to list virtual assets")? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        let directory = entry.path();
        let marker = directory.join(LAST_USED_MARKER);
        if marker.is_file() {
            let stale = match last_used(&marker) {
                Some(last_used) => last_used < cutoff,
                None => is_older_than(&marker, days(VIRTUAL_ASSETS_MAX_AGE_DAYS)),
            };
            if !stale {
                continue;
            }
            log::info!("Cleaning up old virtual directory {:?}", directory);
        } else {
            log::info!("Cleaning up strange virtual directory {:?}", directory);
        }

        match std::fs::remove_dir_all(&directory) {
            Ok(()) => deleted += 1,
            Err(e) => log::warn!("Couldn't delete {:?}: {}", directory, e),
        }
    }

    delete_empty_directories(&virtual_dir)?;
    Ok(deleted)
}

/// Timestamp recorded in a last-used marker, if it parses
fn last_used(marker: &Path) -> Option<DateTime<Utc>> {
    let text = std::fs::read_to_string(marker).ok()?;
    DateTime::parse_from_rfc3339(text.trim())
        .map(|time| time.with_timezone(&Utc))
        .ok()
}
