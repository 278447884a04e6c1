//! Asset indexes map logical asset paths to content-addressed objects.

use crate::error::UpdaterError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// `<first two hex chars>/<hash>`, the object's location below `objects/`
pub fn hash_path(hash: &str) -> String {
    let prefix = hash.get(..2).unwrap_or(hash);
    format!("{}/{}", prefix, hash)
}

/// Object hashes are 40 hex characters; anything else can't name a file in the store
pub fn is_object_hash(hash: &str) -> bool {
    hash.len() == 40 && hash.bytes().all(|b| b.is_ascii_hexdigit())
}

/// `assets/indexes/<name>.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetIndex {
    #[serde(default)]
    pub objects: BTreeMap<String, AssetObject>,

    /// Whether the game expects the assets laid out by logical path
    #[serde(default, rename = "virtual")]
    pub is_virtual: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetObject {
    pub hash: String,
    pub size: u64,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reconstruct: bool,

    /// Gzip transport variant
    #[serde(alias = "compressHash", skip_serializing_if = "Option::is_none")]
    pub compressed_hash: Option<String>,

    #[serde(default, alias = "compressSize", skip_serializing_if = "is_zero")]
    pub compressed_size: u64,
}

fn is_zero(value: &u64) -> bool {
    *value == 0
}

impl AssetObject {
    /// Both the hash and any compressed hash are well formed
    pub fn is_valid(&self) -> bool {
        is_object_hash(&self.hash) && self.compressed_hash.as_deref().map_or(true, is_object_hash)
    }

    pub fn hash_path(&self) -> String {
        hash_path(&self.hash)
    }

    pub fn has_compressed_alternative(&self) -> bool {
        self.compressed_hash.is_some()
    }

    pub fn compressed_hash_path(&self) -> Option<String> {
        self.compressed_hash.as_deref().map(hash_path)
    }
}

impl AssetIndex {
    /// Parse an index. Objects with a malformed hash are dropped with a warning.
    pub fn from_json(content: &str) -> Result<Self, UpdaterError> {
        let mut index: AssetIndex = serde_json::from_str(content)?;
        index.objects.retain(|path, object| {
            let valid = object.is_valid();
            if !valid {
                log::warn!("Skipping asset {} with malformed hash {:?}", path, object.hash);
            }
            valid
        });
        Ok(index)
    }

    pub async fn load(path: &Path) -> Result<Self, UpdaterError> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }

    /// Entries whose object hashes are well formed
    pub fn valid_objects(&self) -> impl Iterator<Item = (&String, &AssetObject)> {
        self.objects.iter().filter(|(_, object)| object.is_valid())
    }

    /// Each distinct object once, with one logical path that names it
    pub fn unique_objects(&self) -> HashMap<&AssetObject, &str> {
        let mut unique = HashMap::new();
        for (path, object) in self.valid_objects() {
            unique.entry(object).or_insert(path.as_str());
        }
        unique
    }

    /// Lowercased hashes of every object the index needs. Compressed transport copies
    /// are not included.
    pub fn referenced_hashes(&self) -> HashSet<String> {
        self.valid_objects()
            .map(|(_, object)| object.hash.to_lowercase())
            .collect()
    }
}
