//! Conversion engine for gemnix.
//!
//! This crate ties the schema layer and the external collaborators together:
//! the resolution cache merge (`merge`), which decides per locked gem whether a
//! previous gemset entry can be reused or must be resolved again, the
//! `Converter` driver that loads, parses, merges, and writes, and the optional
//! `gemnix.toml` project configuration.

pub mod config;
pub mod convert;
pub mod merge;

pub use config::{ConfigError, ConvertSection, FetchSection, ProjectConfig, CONFIG_FILE};
pub use convert::{write_manifest, Conversion, ConvertOptions, Converter, PlannedPackage};
pub use merge::{classify, merge, plan, CacheDecision, MergeOptions, PlanEntry, StaleReason};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("lockfile error: {0}")]
    Lockfile(#[from] gemnix_schema::LockfileError),
    #[error("gemset error: {0}")]
    Manifest(#[from] gemnix_schema::ManifestError),
    #[error("fetch error: {0}")]
    Fetch(#[from] gemnix_fetch::FetchError),
    #[error("failed to resolve {name} ({version}): {source}")]
    Resolve {
        name: String,
        version: String,
        #[source]
        source: gemnix_fetch::FetchError,
    },
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to start resolver pool: {0}")]
    ThreadPool(String),
}
