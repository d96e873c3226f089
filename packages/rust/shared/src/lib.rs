//! Shared types, error model, and configuration for EverythingPDF.
//!
//! This crate is the foundation depended on by all other EverythingPDF crates.
//! It provides:
//! - [`EverythingPdfError`]: the unified error type
//! - Domain types ([`Tier`], [`InputKind`], [`ImageSubkind`])
//! - Capability traits ([`KeyValueStore`], [`Publisher`])
//! - Configuration ([`AppConfig`], config loading)

pub mod capability;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use capability::{KeyValueStore, MemoryStore, Publisher};
pub use config::{
    AppConfig, DefaultsConfig, PublishConfig, config_dir, config_file_path, init_config,
    load_config, load_config_from,
};
pub use error::{EverythingPdfError, Result};
pub use types::{
    DEFAULT_OUTPUT_NAME, FREE_LIMIT, ImageSubkind, InputKind, PDF_MEDIA_TYPE, TIER_STORAGE_KEY,
    Tier,
};
