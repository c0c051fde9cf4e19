// src/config/mod.rs

//! Pipeline configuration: TOML model, loading, and validation.
//!
//! - [`model`] mirrors the `Pipedag.toml` structure.
//! - [`loader`] reads and deserializes the file.
//! - [`validate`] turns a `RawConfigFile` into a validated [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate};
pub use model::{ConfigFile, ConfigSection, DefaultSection, ExpandMode, RawConfigFile, TaskConfig};
