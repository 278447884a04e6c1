//! Release classifications.
//!
//! The set of classifications is closed: a variant plus one row in [`REGISTRY`] is all a new
//! one needs. Everything else (manifest parsing, filters, cleanup) goes through the registry.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ReleaseType {
    Snapshot,
    Release,
    OldBeta,
    OldAlpha,
}

/// One registry row
pub struct ReleaseTypeInfo {
    pub release_type: ReleaseType,
    /// Name used in manifests and version lists
    pub name: &'static str,
}

pub const REGISTRY: &[ReleaseTypeInfo] = &[
    ReleaseTypeInfo {
        release_type: ReleaseType::Snapshot,
        name: "snapshot",
    },
    ReleaseTypeInfo {
        release_type: ReleaseType::Release,
        name: "release",
    },
    ReleaseTypeInfo {
        release_type: ReleaseType::OldBeta,
        name: "old_beta",
    },
    ReleaseTypeInfo {
        release_type: ReleaseType::OldAlpha,
        name: "old_alpha",
    },
];

impl ReleaseType {
    pub fn info(&self) -> &'static ReleaseTypeInfo {
        // Every variant has a registry row
        REGISTRY
            .iter()
            .find(|info| info.release_type == *self)
            .unwrap_or(&REGISTRY[1])
    }

    pub fn name(&self) -> &'static str {
        self.info().name
    }

    pub fn by_name(name: &str) -> Option<ReleaseType> {
        REGISTRY
            .iter()
            .find(|info| info.name == name)
            .map(|info| info.release_type)
    }

    /// All registered classifications, in registry order
    pub fn all() -> impl Iterator<Item = ReleaseType> {
        REGISTRY.iter().map(|info| info.release_type)
    }
}

impl fmt::Display for ReleaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for ReleaseType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for ReleaseType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        ReleaseType::by_name(&name)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown release type '{}'", name)))
    }
}

/// Field deserializer that maps unknown classifications to `None` instead of failing
/// the whole document, so the caller can skip just that entry.
pub fn deserialize_lenient<'de, D>(deserializer: D) -> Result<Option<ReleaseType>, D::Error>
where
    D: Deserializer<'de>,
{
    let name = Option::<String>::deserialize(deserializer)?;
    Ok(name.as_deref().and_then(ReleaseType::by_name))
}
