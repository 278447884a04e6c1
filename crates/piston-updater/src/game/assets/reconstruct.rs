//! Materializes the legacy `assets/virtual/<index>` layout from the object store.

use crate::config::LAST_USED_MARKER;
use crate::error::UpdaterError;
use crate::game::assets::index::AssetIndex;
use chrono::{SecondsFormat, Utc};
use std::path::{Component, Path, PathBuf};

/// Copy every object of `index` to its logical path below `virtual_root`, then stamp the
/// last-used marker. Paths that already exist are left alone. Returns how many files were copied.
pub async fn reconstruct_virtual_tree(
    index: &AssetIndex,
    objects_dir: &Path,
    virtual_root: &Path,
) -> Result<usize, UpdaterError> {
    log::info!("Reconstructing virtual assets folder at {:?}", virtual_root);
    tokio::fs::create_dir_all(virtual_root).await?;

    let mut copied = 0;
    for (logical, object) in index.valid_objects() {
        let Some(relative) = safe_relative_path(logical) else {
            log::warn!("Skipping asset with unsafe path {:?}", logical);
            continue;
        };

        let target = virtual_root.join(relative);
        if tokio::fs::metadata(&target).await.is_ok_and(|m| m.is_file()) {
            continue;
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let source = objects_dir.join(object.hash_path());
        tokio::fs::copy(&source, &target).await.map_err(|e| {
            log::error!("Couldn't copy asset {:?} to {:?}: {}", source, target, e);
            e
        })?;
        copied += 1;
    }

    let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, false);
    tokio::fs::write(virtual_root.join(LAST_USED_MARKER), stamp).await?;

    log::debug!("Copied {} assets into {:?}", copied, virtual_root);
    Ok(copied)
}

/// Prepare the asset directory the game should be pointed at for `index_name`.
///
/// Virtual indexes get their tree rebuilt and its root returned; anything else uses the
/// object store layout directly, so `assets_dir` comes back.
pub async fn reconstruct_assets(assets_dir: &Path, index_name: &str) -> Result<PathBuf, UpdaterError> {
    let index_file = assets_dir.join("indexes").join(format!("{}.json", index_name));
    let virtual_root = assets_dir.join("virtual").join(index_name);

    if !index_file.is_file() {
        log::warn!("No assets index file {:?}; can't reconstruct assets", index_file);
        return Ok(virtual_root);
    }

    let index = AssetIndex::load(&index_file).await?;
    if !index.is_virtual {
        return Ok(assets_dir.to_path_buf());
    }

    reconstruct_virtual_tree(&index, &assets_dir.join("objects"), &virtual_root).await?;
    Ok(virtual_root)
}

/// Logical paths are relative and may not climb out of the tree
fn safe_relative_path(logical: &str) -> Option<&Path> {
    let path = Path::new(logical);
    let safe = path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    (safe && !logical.is_empty()).then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::assets::index::{hash_path, AssetObject};
    use tempfile::tempdir;

    const HASH: &str = "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed";

    fn index_json(is_virtual: bool) -> String {
        format!(
            r#"{{
                "virtual": {},
                "objects": {{
                    "sounds/step/grass1.ogg": {{"hash": "{hash}", "size": 11}},
                    "music/menu.ogg": {{"hash": "{hash}", "size": 11}},
                    "../escape.txt": {{"hash": "{hash}", "size": 11}}
                }}
            }}"#,
            is_virtual,
            hash = HASH
        )
    }

    fn seed_store(assets: &Path, is_virtual: bool) {
        let object = assets.join("objects").join(hash_path(HASH));
        std::fs::create_dir_all(object.parent().unwrap()).unwrap();
        std::fs::write(&object, b"hello world").unwrap();

        std::fs::create_dir_all(assets.join("indexes")).unwrap();
        std::fs::write(assets.join("indexes/legacy.json"), index_json(is_virtual)).unwrap();
    }

    #[tokio::test]
    async fn shared_object_fills_both_paths() {
        let dir = tempdir().unwrap();
        let assets = dir.path().join("assets");
        seed_store(&assets, true);

        let root = reconstruct_assets(&assets, "legacy").await.unwrap();

        assert_eq!(root, assets.join("virtual/legacy"));
        assert_eq!(std::fs::read(root.join("sounds/step/grass1.ogg")).unwrap(), b"hello world");
        assert_eq!(std::fs::read(root.join("music/menu.ogg")).unwrap(), b"hello world");
        assert!(root.join(LAST_USED_MARKER).is_file());
        assert!(!assets.join("virtual/escape.txt").exists());

        let objects: Vec<_> = walkdir::WalkDir::new(assets.join("objects"))
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .collect();
        assert_eq!(objects.len(), 1);
    }

    #[tokio::test]
    async fn rerun_only_fills_missing_paths() {
        let dir = tempdir().unwrap();
        let assets = dir.path().join("assets");
        seed_store(&assets, true);
        let root = reconstruct_assets(&assets, "legacy").await.unwrap();

        std::fs::write(root.join("music/menu.ogg"), b"edited").unwrap();
        std::fs::remove_file(root.join("sounds/step/grass1.ogg")).unwrap();

        let index = AssetIndex::load(&assets.join("indexes/legacy.json")).await.unwrap();
        let copied = reconstruct_virtual_tree(&index, &assets.join("objects"), &root)
            .await
            .unwrap();

        assert_eq!(copied, 1);
        assert_eq!(std::fs::read(root.join("music/menu.ogg")).unwrap(), b"edited");
    }

    #[tokio::test]
    async fn object_outside_store_is_never_copied() {
        let dir = tempdir().unwrap();
        let assets = dir.path().join("assets");
        std::fs::create_dir_all(assets.join("objects")).unwrap();
        std::fs::write(dir.path().join("secret"), b"private").unwrap();

        let mut index = AssetIndex {
            is_virtual: true,
            ..AssetIndex::default()
        };
        index.objects.insert(
            "leak.txt".to_string(),
            AssetObject {
                hash: "../../secret".to_string(),
                size: 7,
                ..AssetObject::default()
            },
        );

        let root = assets.join("virtual/legacy");
        let copied = reconstruct_virtual_tree(&index, &assets.join("objects"), &root)
            .await
            .unwrap();

        assert_eq!(copied, 0);
        assert!(!root.join("leak.txt").exists());
    }

    #[tokio::test]
    async fn non_virtual_index_uses_store() {
        let dir = tempdir().unwrap();
        let assets = dir.path().join("assets");
        seed_store(&assets, false);

        assert_eq!(reconstruct_assets(&assets, "legacy").await.unwrap(), assets);
        assert!(!assets.join("virtual").exists());
    }

    #[tokio::test]
    async fn missing_index_is_not_an_error() {
        let dir = tempdir().unwrap();
        let root = reconstruct_assets(dir.path(), "1.7.10").await.unwrap();
        assert_eq!(root, dir.path().join("virtual/1.7.10"));
    }
}
