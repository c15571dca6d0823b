pub mod asset;
pub mod disk;
pub mod manifest;

pub use asset::{Asset, Assets, Module, Tokenizer, Tokenizers, DEFAULT_TOKENIZER};
pub use manifest::{FileManifestStore, Manifest, ManifestStore};
