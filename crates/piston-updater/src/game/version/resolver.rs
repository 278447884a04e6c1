//! Inheritance resolution.
//!
//! A manifest with `inheritsFrom` is merged onto its resolved parent. Parents are looked up
//! through an [`InheritanceSource`] so the resolver can run against the real catalogs or an
//! in-memory stand-in.

use crate::error::UpdaterError;
use crate::game::version::manifest::CompleteVersion;
use crate::game::version::sync::{VersionSource, VersionSyncInfo};
use futures::future::BoxFuture;
use std::collections::HashSet;

/// Where the resolver finds and installs parent versions
pub trait InheritanceSource: Send + Sync {
    /// Sync state of a parent id, reconciled without resolving it
    fn parent_sync_info<'a>(&'a self, id: &'a str) -> BoxFuture<'a, VersionSyncInfo>;

    /// The full manifest of the newest copy of a version
    fn latest_complete_version<'a>(
        &'a self,
        sync: &'a VersionSyncInfo,
    ) -> BoxFuture<'a, Result<CompleteVersion, UpdaterError>>;

    /// Persist a resolved parent locally
    fn install_version<'a>(
        &'a self,
        version: &'a CompleteVersion,
    ) -> BoxFuture<'a, Result<(), UpdaterError>>;
}

/// Expand the inheritance chain of `version` into one self-contained manifest.
///
/// Parents that are missing locally, stale, or newer on the remote are installed once their
/// own chain has resolved, so a failing chain leaves the local catalog untouched.
pub fn resolve<'a>(
    version: &'a CompleteVersion,
    source: &'a dyn InheritanceSource,
) -> BoxFuture<'a, Result<CompleteVersion, UpdaterError>> {
    Box::pin(async move {
        let mut visited = HashSet::new();
        resolve_chain(version, source, &mut visited).await
    })
}

fn resolve_chain<'a>(
    version: &'a CompleteVersion,
    source: &'a dyn InheritanceSource,
    visited: &'a mut HashSet<String>,
) -> BoxFuture<'a, Result<CompleteVersion, UpdaterError>> {
    Box::pin(async move {
        let Some(parent_id) = version.inherits_from.as_deref() else {
            return Ok(version.clone());
        };

        if !visited.insert(version.id.clone()) {
            return Err(UpdaterError::CircularInheritance {
                id: version.id.clone(),
            });
        }

        log::debug!("Resolving {} (inherits from {})", version.id, parent_id);

        let parent_sync = source.parent_sync_info(parent_id).await;
        if parent_sync.latest_version().is_none() {
            return Err(UpdaterError::UnknownVersion(parent_id.to_string()));
        }

        let parent = source.latest_complete_version(&parent_sync).await?;
        let resolved_parent = resolve_chain(&parent, source, visited).await?;

        if !parent_sync.is_installed()
            || !parent_sync.is_up_to_date()
            || parent_sync.latest_source() != VersionSource::Local
        {
            source.install_version(&resolved_parent).await?;
        }

        Ok(merge(&resolved_parent, version))
    })
}

/// Merge a child manifest onto its resolved parent.
///
/// Identity and timestamps always come from the child; optional fields only when the child
/// sets them. Libraries and compatibility rules are concatenated parent first.
pub fn merge(parent: &CompleteVersion, child: &CompleteVersion) -> CompleteVersion {
    let mut libraries = parent.libraries.clone();
    libraries.extend(child.libraries.iter().cloned());

    let compatibility_rules = match (&parent.compatibility_rules, &child.compatibility_rules) {
        (Some(parent_rules), Some(child_rules)) => {
            let mut rules = parent_rules.clone();
            rules.extend(child_rules.iter().cloned());
            Some(rules)
        }
        (parent_rules, child_rules) => child_rules.clone().or_else(|| parent_rules.clone()),
    };

    CompleteVersion {
        id: child.id.clone(),
        inherits_from: None,
        release_type: child.release_type,
        updated_time: child.updated_time,
        release_time: child.release_time,
        minecraft_arguments: child
            .minecraft_arguments
            .clone()
            .or_else(|| parent.minecraft_arguments.clone()),
        libraries,
        main_class: child.main_class.clone().or_else(|| parent.main_class.clone()),
        minimum_launcher_version: parent
            .minimum_launcher_version
            .max(child.minimum_launcher_version),
        incompatibility_reason: child
            .incompatibility_reason
            .clone()
            .or_else(|| parent.incompatibility_reason.clone()),
        assets: child.assets.clone().or_else(|| parent.assets.clone()),
        compatibility_rules,
        jar: child.jar.clone().or_else(|| parent.jar.clone()),
        savable: Some(Box::new(child.savable_version().clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::version::library::Library;
    use crate::game::version::manifest::Version;
    use crate::game::version::release_type::ReleaseType;
    use crate::game::version::rules::{CompatibilityRule, RuleAction};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Versions only known remotely; installs are recorded.
    #[derive(Default)]
    struct MemorySource {
        remote: HashMap<String, CompleteVersion>,
        installed: Mutex<Vec<String>>,
    }

    impl MemorySource {
        fn with(versions: Vec<CompleteVersion>) -> Self {
            Self {
                remote: versions.into_iter().map(|v| (v.id.clone(), v)).collect(),
                ..Self::default()
            }
        }

        fn installed(&self) -> Vec<String> {
            self.installed.lock().unwrap().clone()
        }
    }

    impl InheritanceSource for MemorySource {
        fn parent_sync_info<'a>(&'a self, id: &'a str) -> BoxFuture<'a, VersionSyncInfo> {
            Box::pin(async move {
                let remote = self.remote.get(id).cloned().map(Version::Complete);
                VersionSyncInfo::from_entries(None, remote)
            })
        }

        fn latest_complete_version<'a>(
            &'a self,
            sync: &'a VersionSyncInfo,
        ) -> BoxFuture<'a, Result<CompleteVersion, UpdaterError>> {
            Box::pin(async move {
                let id = sync.id().unwrap_or_default();
                self.remote
                    .get(id)
                    .cloned()
                    .ok_or_else(|| UpdaterError::UnknownVersion(id.to_string()))
            })
        }

        fn install_version<'a>(
            &'a self,
            version: &'a CompleteVersion,
        ) -> BoxFuture<'a, Result<(), UpdaterError>> {
            Box::pin(async move {
                self.installed.lock().unwrap().push(version.id.clone());
                Ok(())
            })
        }
    }

    fn version(id: &str, parent: Option<&str>, libraries: &[&str]) -> CompleteVersion {
        let mut version = CompleteVersion::new(id, ReleaseType::Release);
        version.inherits_from = parent.map(str::to_string);
        version.libraries = libraries.iter().map(|name| Library::new(*name)).collect();
        version
    }

    #[tokio::test]
    async fn resolved_version_is_returned_unchanged() {
        let source = MemorySource::default();
        let a = version("A", None, &["g:a:1"]);

        assert_eq!(resolve(&a, &source).await.unwrap(), a);
        assert!(source.installed().is_empty());
    }

    #[tokio::test]
    async fn chain_concatenates_libraries_ancestor_first() {
        let source = MemorySource::with(vec![
            version("A", None, &["g:a:1", "g:a2:1"]),
            version("B", Some("A"), &["g:b:1"]),
        ]);
        let c = version("C", Some("B"), &["g:c:1"]);

        let resolved = resolve(&c, &source).await.unwrap();

        let names: Vec<_> = resolved.libraries.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["g:a:1", "g:a2:1", "g:b:1", "g:c:1"]);
        assert_eq!(resolved.id, "C");
        assert!(resolved.inherits_from.is_none());
        assert_eq!(resolved.savable_version(), &c);
        // Parents are installed deepest first
        assert_eq!(source.installed(), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn child_overrides_only_what_it_sets() {
        let mut a = version("A", None, &["g:a:1"]);
        a.main_class = Some("net.minecraft.client.Minecraft".to_string());
        a.minecraft_arguments = Some("${auth_player_name}".to_string());
        a.assets = Some("pre-1.6".to_string());
        let source = MemorySource::with(vec![a.clone()]);

        let mut b = version("B", Some("A"), &[]);
        b.main_class = Some("net.minecraft.launchwrapper.Launch".to_string());
        b.release_type = Some(ReleaseType::Snapshot);

        let resolved = resolve(&b, &source).await.unwrap();
        assert_eq!(resolved.libraries, a.libraries);
        assert_eq!(resolved.main_class, b.main_class);
        assert_eq!(resolved.minecraft_arguments, a.minecraft_arguments);
        assert_eq!(resolved.assets.as_deref(), Some("pre-1.6"));
        assert_eq!(resolved.release_type, Some(ReleaseType::Snapshot));
    }

    #[tokio::test]
    async fn cycles_fail_without_installing() {
        let source = MemorySource::with(vec![
            version("A", Some("B"), &[]),
            version("B", Some("A"), &[]),
        ]);
        let a = version("A", Some("B"), &[]);

        let err = resolve(&a, &source).await.unwrap_err();
        assert!(matches!(err, UpdaterError::CircularInheritance { .. }));
        assert!(source.installed().is_empty());
    }

    #[tokio::test]
    async fn self_inheritance_is_circular() {
        let source = MemorySource::with(vec![version("A", Some("A"), &[])]);
        let a = version("A", Some("A"), &[]);

        assert!(matches!(
            resolve(&a, &source).await,
            Err(UpdaterError::CircularInheritance { .. })
        ));
        assert!(source.installed().is_empty());
    }

    #[tokio::test]
    async fn missing_parent_is_unknown() {
        let source = MemorySource::default();
        let b = version("B", Some("nowhere"), &[]);

        assert!(matches!(
            resolve(&b, &source).await,
            Err(UpdaterError::UnknownVersion(id)) if id == "nowhere"
        ));
    }

    #[test]
    fn merge_appends_rules_and_keeps_stricter_launcher_version() {
        let mut parent = version("A", None, &[]);
        parent.compatibility_rules = Some(vec![CompatibilityRule::default()]);
        parent.minimum_launcher_version = 13;

        let mut child = version("B", Some("A"), &[]);
        child.compatibility_rules = Some(vec![CompatibilityRule {
            action: RuleAction::Disallow,
            os: None,
        }]);
        child.minimum_launcher_version = 9;

        let merged = merge(&parent, &child);
        let rules = merged.compatibility_rules.as_ref().unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[1].action, RuleAction::Disallow);
        assert_eq!(merged.minimum_launcher_version, 13);
        assert_eq!(merged.jar(), "B");
    }
}
