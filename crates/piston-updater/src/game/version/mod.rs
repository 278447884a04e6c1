pub mod filter;
pub mod library;
pub mod manifest;
pub mod release_type;
pub mod resolver;
pub mod rules;
pub mod sync;

pub use filter::VersionFilter;
pub use library::{ExtractRules, Library};
pub use manifest::{CompleteVersion, LaunchCompatibility, PartialVersion, RawVersionList, Version};
pub use release_type::ReleaseType;
pub use resolver::{merge, resolve, InheritanceSource};
pub use rules::{CompatibilityRule, OsRestriction, RuleAction};
pub use sync::{VersionSource, VersionSyncInfo};
