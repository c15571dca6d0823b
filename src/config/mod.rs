//! Configuration module for modelsync
//!
//! Loads config from `<project>/modelsync.toml`.
//! Falls back to embedded defaults if the file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//!
//! # Example
//!
//! ```no_run
//! use modelsync::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Path::new(".")).expect("Failed to load config");
//! println!("Download dir: {}", config.paths.download_dir.display());
//! println!("Script: {}", config.python.script.display());
//! ```

pub mod schema;

pub use schema::Config;
