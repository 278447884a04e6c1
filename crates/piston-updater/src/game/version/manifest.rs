//! Version manifests.
//!
//! A catalog lists [`Version`]s. Listings from `versions.json` are [`PartialVersion`]s; the
//! per-version document `versions/<id>/<id>.json` is a [`CompleteVersion`].

use crate::config::DEFAULT_ASSET_INDEX;
use crate::error::UpdaterError;
use crate::game::download::Downloadable;
use crate::game::platform::Environment;
use crate::game::version::library::Library;
use crate::game::version::release_type::{deserialize_lenient, ReleaseType};
use crate::game::version::rules::{rules_allow, CompatibilityRule};
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const DEFAULT_INCOMPATIBILITY_REASON: &str =
    "This version is incompatible with your computer. Please pick another one for this profile.";

/// Entry of the remote `versions.json` listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialVersion {
    pub id: String,

    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub release_type: Option<ReleaseType>,

    #[serde(rename = "time", skip_serializing_if = "Option::is_none")]
    pub updated_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_time: Option<DateTime<Utc>>,
}

/// `versions/versions.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawVersionList {
    /// Latest id per release type name
    #[serde(default)]
    pub latest: HashMap<String, String>,

    #[serde(default)]
    pub versions: Vec<PartialVersion>,
}

/// Full version manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteVersion {
    pub id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inherits_from: Option<String>,

    #[serde(
        rename = "type",
        default,
        deserialize_with = "deserialize_lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub release_type: Option<ReleaseType>,

    #[serde(rename = "time", skip_serializing_if = "Option::is_none")]
    pub updated_time: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_time: Option<DateTime<Utc>>,

    /// Launch argument template with `${token}` placeholders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minecraft_arguments: Option<String>,

    #[serde(default)]
    pub libraries: Vec<Library>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub main_class: Option<String>,

    #[serde(default)]
    pub minimum_launcher_version: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub incompatibility_reason: Option<String>,

    /// Asset index name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub compatibility_rules: Option<Vec<CompatibilityRule>>,

    /// Id of the version whose client jar this version launches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jar: Option<String>,

    /// Unresolved manifest this one was merged from
    #[serde(skip)]
    pub(crate) savable: Option<Box<CompleteVersion>>,
}

/// Whether a manifest can be launched here
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchCompatibility {
    Compatible,
    /// The manifest needs a newer launcher format
    LauncherOutdated { required: u32 },
    Incompatible { reason: String },
}

impl CompleteVersion {
    pub fn new(id: impl Into<String>, release_type: ReleaseType) -> Self {
        Self {
            id: id.into(),
            release_type: Some(release_type),
            ..Self::default()
        }
    }

    /// Parse a manifest, rejecting documents without a known release classification.
    pub fn from_json(content: &str, location: &str) -> Result<Self, UpdaterError> {
        let version: CompleteVersion = serde_json::from_str(content)
            .map_err(|e| UpdaterError::malformed(location, e.to_string()))?;

        if version.release_type.is_none() {
            return Err(UpdaterError::malformed(
                location,
                format!("{} has an invalid release type", version.id),
            ));
        }

        Ok(version)
    }

    pub fn jar(&self) -> &str {
        self.jar.as_deref().unwrap_or(&self.id)
    }

    pub fn asset_index_name(&self) -> &str {
        self.assets.as_deref().unwrap_or(DEFAULT_ASSET_INDEX)
    }

    /// The form persisted to the local catalog
    pub fn savable_version(&self) -> &CompleteVersion {
        self.savable.as_deref().unwrap_or(self)
    }

    pub fn is_resolved(&self) -> bool {
        self.inherits_from.is_none()
    }

    pub fn applies_to(&self, env: &Environment) -> bool {
        rules_allow(self.compatibility_rules.as_deref(), env)
    }

    pub fn relevant_libraries(&self, env: &Environment) -> Vec<&Library> {
        self.libraries
            .iter()
            .filter(|library| library.applies_to(env))
            .collect()
    }

    /// `versions/<jar>/<jar>.jar`
    pub fn jar_path(&self) -> String {
        format!("versions/{0}/{0}.jar", self.jar())
    }

    /// Non-native libraries in declaration order, then the client jar
    pub fn class_path(&self, env: &Environment, game_dir: &Path) -> Result<Vec<PathBuf>, UpdaterError> {
        let libraries_dir = game_dir.join("libraries");
        let mut entries = Vec::new();

        for library in self.relevant_libraries(env) {
            if library.is_native() {
                continue;
            }
            entries.push(libraries_dir.join(library.artifact_path(None, env)?));
        }

        entries.push(game_dir.join(self.jar_path()));
        Ok(entries)
    }

    /// Relative paths of every library file this version needs on `env`
    pub fn required_files(&self, env: &Environment) -> Result<HashSet<String>, UpdaterError> {
        let mut files = HashSet::new();
        for library in self.relevant_libraries(env) {
            if let Some(path) = library.relevant_path(env)? {
                files.insert(format!("libraries/{}", path));
            }
        }
        Ok(files)
    }

    /// Checksum-verified downloads for every relevant library.
    /// A library from a custom repository is trusted once it exists locally.
    pub fn required_downloadables(
        &self,
        env: &Environment,
        client: &Client,
        game_dir: &Path,
        library_base_url: &str,
        force: bool,
    ) -> Result<Vec<Downloadable>, UpdaterError> {
        let mut seen = HashSet::new();
        let mut downloads = Vec::new();

        for library in self.relevant_libraries(env) {
            let Some(path) = library.relevant_path(env)? else {
                continue;
            };

            let target = game_dir.join("libraries").join(&path);
            if target.is_file() && library.has_custom_url() {
                continue;
            }

            // Avoid two workers writing the same file
            if !seen.insert(path.clone()) {
                continue;
            }

            let url = format!("{}{}", library.download_base(library_base_url), path);
            downloads.push(Downloadable::checksummed(client.clone(), url, target, force));
        }

        Ok(downloads)
    }

    pub fn launch_compatibility(&self, env: &Environment, launcher_format: u32) -> LaunchCompatibility {
        if self.minimum_launcher_version > launcher_format {
            return LaunchCompatibility::LauncherOutdated {
                required: self.minimum_launcher_version,
            };
        }

        if !self.applies_to(env) {
            return LaunchCompatibility::Incompatible {
                reason: self
                    .incompatibility_reason
                    .clone()
                    .unwrap_or_else(|| DEFAULT_INCOMPATIBILITY_REASON.to_string()),
            };
        }

        LaunchCompatibility::Compatible
    }

    pub fn to_json_pretty(&self) -> Result<String, UpdaterError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A catalog entry: either just the listing or the full manifest
#[derive(Debug, Clone, PartialEq)]
pub enum Version {
    Partial(PartialVersion),
    Complete(CompleteVersion),
}

impl Version {
    pub fn id(&self) -> &str {
        match self {
            Version::Partial(v) => &v.id,
            Version::Complete(v) => &v.id,
        }
    }

    pub fn release_type(&self) -> Option<ReleaseType> {
        match self {
            Version::Partial(v) => v.release_type,
            Version::Complete(v) => v.release_type,
        }
    }

    pub fn updated_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Version::Partial(v) => v.updated_time,
            Version::Complete(v) => v.updated_time,
        }
    }

    pub fn release_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Version::Partial(v) => v.release_time,
            Version::Complete(v) => v.release_time,
        }
    }

    pub fn as_complete(&self) -> Option<&CompleteVersion> {
        match self {
            Version::Complete(v) => Some(v),
            Version::Partial(_) => None,
        }
    }

    /// Listable entries carry both a release type and an update time
    pub fn is_listable(&self) -> bool {
        self.release_type().is_some() && self.updated_time().is_some()
    }

    /// The listing form of this entry
    pub fn to_partial(&self) -> PartialVersion {
        match self {
            Version::Partial(v) => v.clone(),
            Version::Complete(v) => PartialVersion {
                id: v.id.clone(),
                release_type: v.release_type,
                updated_time: v.updated_time,
                release_time: v.release_time,
            },
        }
    }
}

impl From<PartialVersion> for Version {
    fn from(version: PartialVersion) -> Self {
        Version::Partial(version)
    }
}

impl From<CompleteVersion> for Version {
    fn from(version: CompleteVersion) -> Self {
        Version::Complete(version)
    }
}
