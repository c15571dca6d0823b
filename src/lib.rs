#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod engine;
pub mod error;
pub mod fetch;
pub mod models;
pub mod ui;

pub use engine::Engine;
pub use error::{ModelSyncError, Result};
