//! Synchronizer: the single choke point for graph mutations.
//!
//! # Responsibility
//! - Run one persist step inside one immediate transaction.
//! - Re-render and publish the mirror for projects that have one.
//! - Evict every cache entry of the project.
//!
//! # Invariants
//! - A committed persist is never rolled back because publishing failed; the
//!   failure is returned as `SyncError::Publish`.
//! - Cache eviction runs last, after the publish attempt, on both outcomes.
//! - The scratch checkout is deleted on every path.

use crate::cache::ConfigCache;
use crate::loader::LazyLoader;
use crate::model::ProjectId;
use crate::repo::{GraphTransaction, SqliteGraphStore, StoreError, StoreResult};
use crate::sync::mirror::{MirrorError, MirrorRepository, PublishOutcome};
use crate::sync::object_store::ObjectStore;
use crate::tree::exporter::{AssetMode, ExportError, MirrorLayout, TreeExporter};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

pub const DEFAULT_COMMIT_MESSAGE: &str = "Update configuration";

/// How much of the mirror a mutation re-renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorRender {
    /// Documents, process files and binary assets.
    Full,
    /// Documents and process files; the checkout's asset subtree is kept.
    DocumentOnly,
}

impl MirrorRender {
    pub fn asset_mode(self) -> AssetMode {
        match self {
            Self::Full => AssetMode::Render,
            Self::DocumentOnly => AssetMode::Keep,
        }
    }
}

#[derive(Debug)]
pub enum PublishError {
    Load(StoreError),
    Scratch(std::io::Error),
    Checkout(MirrorError),
    Export(ExportError),
    Push(MirrorError),
}

impl Display for PublishError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Load(err) => write!(f, "cannot load graph for publishing: {err}"),
            Self::Scratch(err) => write!(f, "cannot create scratch checkout: {err}"),
            Self::Checkout(err) => write!(f, "checkout failed: {err}"),
            Self::Export(err) => write!(f, "render failed: {err}"),
            Self::Push(err) => write!(f, "push failed: {err}"),
        }
    }
}

impl Error for PublishError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Load(err) => Some(err),
            Self::Scratch(err) => Some(err),
            Self::Checkout(err) | Self::Push(err) => Some(err),
            Self::Export(err) => Some(err),
        }
    }
}

#[derive(Debug)]
pub enum SyncError {
    /// The transaction failed and was rolled back.
    Persist(StoreError),
    /// The transaction committed but the mirror was not published.
    Publish {
        project_id: ProjectId,
        source: PublishError,
    },
}

impl Display for SyncError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Persist(err) => write!(f, "persist failed: {err}"),
            Self::Publish { project_id, source } => write!(
                f,
                "project {project_id} was saved but its mirror diverged: {source}"
            ),
        }
    }
}

impl Error for SyncError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Persist(err) => Some(err),
            Self::Publish { source, .. } => Some(source),
        }
    }
}

impl From<StoreError> for SyncError {
    fn from(value: StoreError) -> Self {
        Self::Persist(value)
    }
}

impl SyncError {
    /// Returns whether the database write committed.
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Publish { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishState {
    /// The project has no mirror repository (or no longer exists).
    Skipped,
    Published(PublishOutcome),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub project_id: ProjectId,
    pub publish: PublishState,
}

pub struct Synchronizer<'conn> {
    store: SqliteGraphStore<'conn>,
    cache: Arc<dyn ConfigCache>,
    mirror: Arc<dyn MirrorRepository>,
    object_store: Arc<dyn ObjectStore>,
    layout: MirrorLayout,
    commit_message: String,
    scratch_root: Option<PathBuf>,
}

impl<'conn> Synchronizer<'conn> {
    pub fn new(
        store: SqliteGraphStore<'conn>,
        cache: Arc<dyn ConfigCache>,
        mirror: Arc<dyn MirrorRepository>,
        object_store: Arc<dyn ObjectStore>,
        layout: MirrorLayout,
    ) -> Self {
        Self {
            store,
            cache,
            mirror,
            object_store,
            layout,
            commit_message: DEFAULT_COMMIT_MESSAGE.to_string(),
            scratch_root: None,
        }
    }

    pub fn with_commit_message(mut self, message: impl Into<String>) -> Self {
        self.commit_message = message.into();
        self
    }

    /// Creates scratch checkouts below `root` instead of the system temp dir.
    pub fn with_scratch_root(mut self, root: Option<PathBuf>) -> Self {
        self.scratch_root = root;
        self
    }

    /// Persists, publishes, then evicts.
    pub fn synchronize<F>(
        &self,
        project_id: ProjectId,
        persist: F,
        render: MirrorRender,
    ) -> Result<SyncOutcome, SyncError>
    where
        F: FnOnce(&GraphTransaction<'conn>) -> StoreResult<()>,
    {
        let started_at = Instant::now();
        let tx = self.store.begin()?;
        if let Err(err) = persist(&tx) {
            error!(
                "event=synchronize module=sync status=error stage=persist project={project_id} error={err}"
            );
            return Err(SyncError::Persist(err));
        }
        tx.commit()?;

        let published = self.publish(project_id, render);
        self.cache.evict_project(project_id);

        match published {
            Ok(publish) => {
                info!(
                    "event=synchronize module=sync status=ok project={project_id} render={render:?} published={} duration_ms={}",
                    matches!(publish, PublishState::Published(_)),
                    started_at.elapsed().as_millis()
                );
                Ok(SyncOutcome {
                    project_id,
                    publish,
                })
            }
            Err(source) => {
                warn!(
                    "event=synchronize module=sync status=error stage=publish project={project_id} duration_ms={} error={source}",
                    started_at.elapsed().as_millis()
                );
                Err(SyncError::Publish { project_id, source })
            }
        }
    }

    fn publish(&self, project_id: ProjectId, render: MirrorRender) -> Result<PublishState, PublishError> {
        let loader = LazyLoader::new(self.store, Arc::clone(&self.cache));
        let Some(config) = loader.load_uncached(project_id).map_err(PublishError::Load)? else {
            return Ok(PublishState::Skipped);
        };
        if !config.has_mirror() {
            return Ok(PublishState::Skipped);
        }
        let url = config.repository_url.clone().unwrap_or_default();

        let builder = {
            let mut builder = tempfile::Builder::new();
            builder.prefix("confgraph-mirror-");
            builder
        };
        let scratch = match &self.scratch_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(PublishError::Scratch)?;
        let workdir = scratch.path().join("checkout");

        self.mirror
            .checkout(url.trim(), &workdir)
            .map_err(PublishError::Checkout)?;
        TreeExporter::new(self.layout.clone())
            .export(&config, &workdir, render.asset_mode(), self.object_store.as_ref())
            .map_err(PublishError::Export)?;
        let message = format!("{} (project {project_id})", self.commit_message);
        let outcome = self
            .mirror
            .publish(&workdir, &message)
            .map_err(PublishError::Push)?;
        Ok(PublishState::Published(outcome))
    }
}
