//! Distributed-cache seam for configuration graphs.
//!
//! # Responsibility
//! - Define the byte-oriented cache contract the loader depends on.
//! - Provide an in-process implementation safe for concurrent callers.
//!
//! # Invariants
//! - The cache is never a source of truth: losing or corrupting an entry only
//!   costs a reload from the graph store.
//! - Entries are evicted explicitly; nothing expires by time.

use crate::model::{NodeId, ProjectId};
use crate::repo::RefScope;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod entry;

pub use entry::{
    restore_back_references, ConfigurationCacheEntry, DirectorySkeleton, FileSkeleton,
    SectionSkeleton,
};

/// Cache key; every key belongs to exactly one project.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// Whole-graph skeleton entry.
    Configuration(ProjectId),
    /// Full process list of a project.
    Processes(ProjectId),
    /// Full compound list of a project.
    Compounds(ProjectId),
    /// One process looked up by name.
    ProcessByName { project_id: ProjectId, name: String },
    /// One process looked up by id.
    ProcessById { project_id: ProjectId, id: NodeId },
    /// `(id, name)` projection of processes in a scope.
    ProcessRefs { project_id: ProjectId, scope: RefScope },
    /// `(id, name)` projection of compounds in a scope.
    CompoundRefs { project_id: ProjectId, scope: RefScope },
    /// Id-only projection of processes in a scope.
    ProcessIds { project_id: ProjectId, scope: RefScope },
}

impl CacheKey {
    pub fn project_id(&self) -> ProjectId {
        match self {
            Self::Configuration(project_id)
            | Self::Processes(project_id)
            | Self::Compounds(project_id) => *project_id,
            Self::ProcessByName { project_id, .. }
            | Self::ProcessById { project_id, .. }
            | Self::ProcessRefs { project_id, .. }
            | Self::CompoundRefs { project_id, .. }
            | Self::ProcessIds { project_id, .. } => *project_id,
        }
    }
}

/// Byte-oriented cache shared by every caller of one deployment.
///
/// Values are opaque serialized payloads so that an out-of-process cache can
/// implement the same trait.
pub trait ConfigCache: Send + Sync {
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>>;
    fn put(&self, key: CacheKey, value: Vec<u8>);
    fn evict(&self, key: &CacheKey);
    /// Evicts every entry belonging to `project_id`.
    fn evict_project(&self, project_id: ProjectId);
}

/// Hit/miss/eviction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: u64,
}

/// In-process `ConfigCache` backed by a concurrent map.
#[derive(Default)]
pub struct InMemoryConfigCache {
    entries: DashMap<CacheKey, Arc<Vec<u8>>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl InMemoryConfigCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.len() as u64,
        }
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl ConfigCache for InMemoryConfigCache {
    fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        match self.entries.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.as_ref().clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    fn put(&self, key: CacheKey, value: Vec<u8>) {
        self.entries.insert(key, Arc::new(value));
    }

    fn evict(&self, key: &CacheKey) {
        if self.entries.remove(key).is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn evict_project(&self, project_id: ProjectId) {
        let before = self.entries.len();
        self.entries.retain(|key, _| key.project_id() != project_id);
        let removed = before.saturating_sub(self.entries.len()) as u64;
        self.evictions.fetch_add(removed, Ordering::Relaxed);
    }
}
