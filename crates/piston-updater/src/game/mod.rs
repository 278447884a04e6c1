pub mod assets;
pub mod catalog;
pub mod cleanup;
pub mod download;
pub mod manager;
pub mod platform;
pub mod version;
