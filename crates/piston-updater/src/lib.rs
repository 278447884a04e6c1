//! Version resolution and artifact synchronization for Minecraft game directories.
//!
//! The crate keeps a game directory in step with a remote version origin: it resolves
//! inheriting version manifests, reconciles the local and remote catalogs, downloads
//! libraries, client jars and asset objects with integrity checks, and sweeps
//! artifacts that no installed version references any more.

pub mod config;
pub mod error;
pub mod game;
pub mod utils;

pub use config::UpdaterConfig;
pub use error::UpdaterError;
pub use game::manager::VersionManager;
