//! Import use case: a mirror tree on disk becomes the project's next
//! generation.
//!
//! # Invariants
//! - Imports of one document into one project never overlap.
//! - The new generation replaces the old one in a single transaction.
//! - Objects stored for a generation that failed to persist are deleted;
//!   objects of files dropped by a committed generation are deleted too.

use super::EngineContext;
use crate::model::project::ProjectConfiguration;
use crate::model::ProjectId;
use crate::repo::StoreError;
use crate::sync::{import_lock_key, MirrorRender, PublishState, SyncError};
use crate::tree::{ImportError, ImportOptions, TreeImporter};
use log::{info, warn};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Instant;

#[derive(Debug)]
pub enum ImportServiceError {
    Import(ImportError),
    Store(StoreError),
    Sync(SyncError),
}

impl Display for ImportServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Import(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ImportServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Import(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Sync(err) => Some(err),
        }
    }
}

impl From<ImportError> for ImportServiceError {
    fn from(value: ImportError) -> Self {
        Self::Import(value)
    }
}

impl From<StoreError> for ImportServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SyncError> for ImportServiceError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

pub type ImportResult<T> = Result<T, ImportServiceError>;

/// What an import produced. Callers must inspect `diagnostics`: a
/// successful import can still have skipped nodes.
#[derive(Debug)]
pub struct ImportReport {
    pub configuration: ProjectConfiguration,
    pub diagnostics: Vec<String>,
    /// Objects of prior files that the new generation dropped.
    pub removed_objects: usize,
    pub publish: PublishState,
}

impl ImportReport {
    pub fn validation_report(&self) -> Option<&str> {
        self.configuration.validation_report.as_deref()
    }
}

pub struct ImportService<'conn> {
    ctx: EngineContext<'conn>,
}

impl<'conn> ImportService<'conn> {
    pub fn new(ctx: EngineContext<'conn>) -> Self {
        Self { ctx }
    }

    /// Importer options matching the configured mirror layout.
    pub fn options(&self, migration: bool) -> ImportOptions {
        ImportOptions {
            migration,
            assets_dir: self.ctx.layout().assets_dir.clone(),
            ..ImportOptions::default()
        }
    }

    pub fn import_document(
        &self,
        project_id: ProjectId,
        root_document: &Path,
        mut options: ImportOptions,
    ) -> ImportResult<ImportReport> {
        let started_at = Instant::now();
        let _guard = self
            .ctx
            .locks()
            .acquire(import_lock_key(root_document, project_id));

        let prior = self.ctx.loader().load_uncached(project_id)?;
        options
            .reserved_ids
            .extend(self.ctx.store().foreign_node_ids(project_id)?);
        let outcome = TreeImporter::new(self.ctx.object_store(), &options).import(
            project_id,
            root_document,
            prior.as_ref(),
        )?;

        let prior_objects: HashSet<&str> = prior
            .as_ref()
            .map(|prior| {
                prior
                    .all_files()
                    .into_iter()
                    .map(|file| file.object_id.as_str())
                    .collect()
            })
            .unwrap_or_default();
        let new_objects: Vec<String> = outcome
            .configuration
            .all_files()
            .into_iter()
            .filter(|file| !prior_objects.contains(file.object_id.as_str()))
            .map(|file| file.object_id.clone())
            .collect();

        let generation = outcome.configuration.clone();
        let synced = self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.replace_project_graph(&generation),
            MirrorRender::Full,
        );
        let publish = match synced {
            Ok(synced) => synced.publish,
            Err(err) => {
                if err.is_committed() {
                    self.delete_objects(project_id, &outcome.orphaned_objects);
                } else {
                    self.delete_objects(project_id, &new_objects);
                }
                warn!(
                    "event=import module=service status=error project={project_id} committed={} error={err}",
                    err.is_committed()
                );
                return Err(err.into());
            }
        };
        let removed_objects = self.delete_objects(project_id, &outcome.orphaned_objects);

        info!(
            "event=import module=service status=ok project={project_id} migration={} diagnostics={} removed_objects={removed_objects} duration_ms={}",
            options.migration,
            outcome.diagnostics.len(),
            started_at.elapsed().as_millis()
        );
        Ok(ImportReport {
            configuration: outcome.configuration,
            diagnostics: outcome.diagnostics,
            removed_objects,
            publish,
        })
    }

    fn delete_objects(&self, project_id: ProjectId, object_ids: &[String]) -> usize {
        let mut removed = 0usize;
        for object_id in object_ids {
            match self.ctx.object_store().delete(object_id) {
                Ok(()) => removed += 1,
                Err(err) => warn!(
                    "event=import module=service status=error stage=object_cleanup project={project_id} object={object_id} error={err}"
                ),
            }
        }
        removed
    }
}
