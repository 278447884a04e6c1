use crate::game::version::release_type::ReleaseType;
use std::collections::HashSet;

pub const DEFAULT_MAX_COUNT: usize = 5;

/// Which release types a version listing includes, and how many of each
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionFilter {
    types: HashSet<ReleaseType>,
    max_count: usize,
}

impl Default for VersionFilter {
    fn default() -> Self {
        Self {
            types: ReleaseType::all().collect(),
            max_count: DEFAULT_MAX_COUNT,
        }
    }
}

impl VersionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn types(&self) -> &HashSet<ReleaseType> {
        &self.types
    }

    pub fn max_count(&self) -> usize {
        self.max_count
    }

    pub fn with_max_count(mut self, max_count: usize) -> Self {
        self.max_count = max_count;
        self
    }

    pub fn only_for(mut self, types: &[ReleaseType]) -> Self {
        self.types = types.iter().copied().collect();
        self
    }

    pub fn include(mut self, types: &[ReleaseType]) -> Self {
        self.types.extend(types.iter().copied());
        self
    }

    pub fn exclude(mut self, types: &[ReleaseType]) -> Self {
        for release_type in types {
            self.types.remove(release_type);
        }
        self
    }

    pub fn allows(&self, release_type: ReleaseType) -> bool {
        self.types.contains(&release_type)
    }
}
