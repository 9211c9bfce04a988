//! Configuration Graph Engine.
//!
//! Stores hierarchical project configurations (section trees, processes,
//! compounds and managed files) in SQLite, serves them through a cache, and
//! mirrors them to a version-controlled nested document tree.

pub mod cache;
pub mod db;
pub mod graph;
pub mod loader;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod settings;
pub mod sync;
pub mod tree;

pub use cache::{CacheKey, CacheStats, ConfigCache, ConfigurationCacheEntry, InMemoryConfigCache};
pub use graph::{ConfigGraph, GraphError, GraphResult};
pub use loader::LazyLoader;
pub use logging::{default_log_level, init_logging, init_stderr_logging, logging_status, LogSink};
pub use model::project::ProjectConfiguration;
pub use model::reference::Reference;
pub use model::{NodeId, ProjectId};
pub use repo::{RefScope, SqliteGraphStore, StoreError, StoreResult};
pub use settings::{EngineSettings, SettingsError};
pub use sync::{MirrorRender, SyncError, SyncOutcome, Synchronizer};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
