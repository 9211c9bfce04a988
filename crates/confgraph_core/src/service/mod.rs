//! Mutation and use-case services.
//!
//! # Responsibility
//! - Enforce structural invariants (duplicates, existence, cycles, ordering)
//!   before anything is written.
//! - Funnel every successful mutation through the synchronizer.
//!
//! # Invariants
//! - A rejected mutation leaves the store, the cache and the mirror untouched.
//! - Metadata edits publish with `MirrorRender::DocumentOnly`; file and
//!   directory edits and imports publish with `MirrorRender::Full`.

use crate::cache::ConfigCache;
use crate::loader::LazyLoader;
use crate::model::filesystem::ProjectDirectory;
use crate::model::project::ProjectConfiguration;
use crate::model::section::SectionConfiguration;
use crate::model::NodeId;
use crate::repo::{DirectoryRow, SectionRow, SqliteGraphStore};
use crate::sync::{MirrorRepository, NamedLocks, ObjectStore, SyncError, SyncOutcome, Synchronizer};
use crate::tree::MirrorLayout;
use std::path::PathBuf;
use std::sync::Arc;

pub mod compound_service;
pub mod directory_service;
pub mod file_service;
pub mod import_service;
pub mod process_service;
pub mod project_service;
pub mod section_service;

/// Shared collaborators of one deployment; cheap to clone.
#[derive(Clone)]
pub struct Collaborators {
    pub cache: Arc<dyn ConfigCache>,
    pub object_store: Arc<dyn ObjectStore>,
    pub mirror: Arc<dyn MirrorRepository>,
    pub locks: Arc<NamedLocks>,
}

/// Mirror publishing knobs.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    pub layout: MirrorLayout,
    pub commit_message: Option<String>,
    /// Parent directory for scratch checkouts; system temp dir when unset.
    pub scratch_root: Option<PathBuf>,
}

/// Everything a service needs, bound to one store connection.
#[derive(Clone)]
pub struct EngineContext<'conn> {
    store: SqliteGraphStore<'conn>,
    collaborators: Collaborators,
    publish: PublishOptions,
}

impl<'conn> EngineContext<'conn> {
    pub fn new(
        store: SqliteGraphStore<'conn>,
        collaborators: Collaborators,
        publish: PublishOptions,
    ) -> Self {
        Self {
            store,
            collaborators,
            publish,
        }
    }

    pub fn store(&self) -> SqliteGraphStore<'conn> {
        self.store
    }

    pub fn loader(&self) -> LazyLoader<'conn> {
        LazyLoader::new(self.store, Arc::clone(&self.collaborators.cache))
    }

    pub fn synchronizer(&self) -> Synchronizer<'conn> {
        let synchronizer = Synchronizer::new(
            self.store,
            Arc::clone(&self.collaborators.cache),
            Arc::clone(&self.collaborators.mirror),
            Arc::clone(&self.collaborators.object_store),
            self.publish.layout.clone(),
        )
        .with_scratch_root(self.publish.scratch_root.clone());
        match &self.publish.commit_message {
            Some(message) => synchronizer.with_commit_message(message.clone()),
            None => synchronizer,
        }
    }

    pub fn object_store(&self) -> &dyn ObjectStore {
        self.collaborators.object_store.as_ref()
    }

    pub fn locks(&self) -> &NamedLocks {
        self.collaborators.locks.as_ref()
    }

    pub fn layout(&self) -> &MirrorLayout {
        &self.publish.layout
    }
}

/// Trims `raw`; `None` when nothing is left.
pub(crate) fn normalize_name(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Like [`normalize_name`] but also rejects names that are not a single path
/// segment.
pub(crate) fn normalize_segment(raw: &str) -> Option<String> {
    let name = normalize_name(raw)?;
    if name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        return None;
    }
    Some(name)
}

/// Returns whether a directory or file other than `exclude` inside `parent`
/// is called `name`.
pub(crate) fn entry_name_taken(
    config: &ProjectConfiguration,
    parent: Option<NodeId>,
    name: &str,
    exclude: Option<NodeId>,
) -> bool {
    let directory_taken = config.sibling_directories(parent).is_some_and(|directories| {
        directories
            .iter()
            .any(|directory| Some(directory.id) != exclude && directory.name == name)
    });
    let file_taken = config.sibling_files(parent).is_some_and(|files| {
        files
            .iter()
            .any(|file| Some(file.id) != exclude && file.name == name)
    });
    directory_taken || file_taken
}

/// Runs `follow_up` whenever the rows of a sync are durable.
///
/// A committed sync whose publish failed still gets its object-store step;
/// the sync error is returned after it.
pub(crate) fn after_commit<E>(
    synced: Result<SyncOutcome, SyncError>,
    follow_up: impl FnOnce() -> Result<(), E>,
) -> Result<(), E>
where
    E: From<SyncError>,
{
    match synced {
        Ok(_) => follow_up(),
        Err(err) if err.is_committed() => {
            follow_up()?;
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}

pub(crate) fn section_row(section: &SectionConfiguration) -> SectionRow {
    SectionRow {
        id: section.id,
        source_id: section.source_id,
        name: section.name.clone(),
        parent_id: section.parent_section,
        place: section.place,
    }
}

pub(crate) fn directory_row(directory: &ProjectDirectory) -> DirectoryRow {
    DirectoryRow {
        id: directory.id,
        name: directory.name.clone(),
        parent_id: directory.parent,
    }
}

#[cfg(test)]
mod tests {
    use super::{normalize_name, normalize_segment};

    #[test]
    fn normalize_segment_rejects_separators() {
        assert_eq!(normalize_name("  CM ").as_deref(), Some("CM"));
        assert_eq!(normalize_name("   "), None);
        assert_eq!(normalize_segment("data/x"), None);
        assert_eq!(normalize_segment(".."), None);
        assert_eq!(normalize_segment(" etalon.json ").as_deref(), Some("etalon.json"));
    }
}
