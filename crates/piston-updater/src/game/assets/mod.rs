pub mod index;
pub mod reconstruct;

pub use index::{hash_path, is_object_hash, AssetIndex, AssetObject};
pub use reconstruct::{reconstruct_assets, reconstruct_virtual_tree};
