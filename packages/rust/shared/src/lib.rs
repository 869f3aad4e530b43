//! Shared types, error model, and configuration for DocSmith.
//!
//! This crate is the foundation depended on by all other DocSmith crates.
//! It provides:
//! - [`DocsetError`], the unified error type
//! - Domain types ([`PackageIdentity`], [`DocType`], [`DocsetStatus`], [`BuildStatus`])
//! - Configuration ([`AppConfig`], option structs, config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BuildToolsConfig, DefaultsConfig, FetchConfig, RemoteDocsConfig, config_dir,
    config_file_path, expand_home, init_config, load_config, load_config_from,
};
pub use error::{DocsetError, Result};
pub use types::{BuildStatus, DocType, DocsetStatus, PackageIdentity, sanitize_path_component};
