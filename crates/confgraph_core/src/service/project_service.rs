//! Project-level use cases: singleton settings, mirror url, removal and
//! local export.

use super::{after_commit, normalize_name, EngineContext};
use crate::model::project::{
    CommonConfiguration, HeaderConfiguration, PotHeaderConfiguration, ProjectConfiguration,
};
use crate::model::ProjectId;
use crate::repo::{ProjectRecord, StoreError};
use crate::sync::{checked_url, MirrorRender, ObjectStoreError, SyncError};
use crate::tree::{AssetMode, ExportError, ExportSummary, TreeExporter};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;

#[derive(Debug)]
pub enum ProjectServiceError {
    ProjectNotFound(ProjectId),
    /// The repository url would be read as a git option.
    InvalidRepositoryUrl(String),
    Store(StoreError),
    Sync(SyncError),
    Export(ExportError),
    Object(ObjectStoreError),
}

impl Display for ProjectServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProjectNotFound(id) => write!(f, "project not found: {id}"),
            Self::InvalidRepositoryUrl(url) => write!(f, "invalid repository url: {url}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
            Self::Export(err) => write!(f, "{err}"),
            Self::Object(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProjectServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::ProjectNotFound(_) | Self::InvalidRepositoryUrl(_) => None,
            Self::Store(err) => Some(err),
            Self::Sync(err) => Some(err),
            Self::Export(err) => Some(err),
            Self::Object(err) => Some(err),
        }
    }
}

impl From<StoreError> for ProjectServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SyncError> for ProjectServiceError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

impl From<ExportError> for ProjectServiceError {
    fn from(value: ExportError) -> Self {
        Self::Export(value)
    }
}

impl From<ObjectStoreError> for ProjectServiceError {
    fn from(value: ObjectStoreError) -> Self {
        Self::Object(value)
    }
}

pub type ProjectResult<T> = Result<T, ProjectServiceError>;

pub struct ProjectService<'conn> {
    ctx: EngineContext<'conn>,
}

impl<'conn> ProjectService<'conn> {
    pub fn new(ctx: EngineContext<'conn>) -> Self {
        Self { ctx }
    }

    /// Materialized configuration; a project seen for the first time gets
    /// its default configuration created.
    pub fn configuration(&self, project_id: ProjectId) -> ProjectResult<ProjectConfiguration> {
        Ok(self.ctx.loader().materialized_configuration(project_id)?)
    }

    pub fn validation_report(&self, project_id: ProjectId) -> ProjectResult<Option<String>> {
        Ok(self.ctx.loader().validation_report(project_id)?)
    }

    /// Sets or clears the mirror repository url; a set url publishes the
    /// whole tree right away.
    pub fn set_repository_url(&self, project_id: ProjectId, url: Option<&str>) -> ProjectResult<ProjectConfiguration> {
        let url = url.and_then(normalize_name);
        if let Some(raw) = url.as_deref() {
            if checked_url(raw).is_err() {
                return Err(ProjectServiceError::InvalidRepositoryUrl(raw.to_string()));
            }
        }
        self.update_record(project_id, MirrorRender::Full, |config| {
            config.repository_url = url;
        })
    }

    pub fn set_default_target(
        &self,
        project_id: ProjectId,
        target: Option<&str>,
    ) -> ProjectResult<ProjectConfiguration> {
        let target = target.and_then(normalize_name);
        self.update_record(project_id, MirrorRender::DocumentOnly, |config| {
            config.default_target = target;
        })
    }

    pub fn update_common(
        &self,
        project_id: ProjectId,
        common: CommonConfiguration,
    ) -> ProjectResult<ProjectConfiguration> {
        self.update_record(project_id, MirrorRender::DocumentOnly, |config| {
            config.common = common;
        })
    }

    pub fn update_header(
        &self,
        project_id: ProjectId,
        header: HeaderConfiguration,
    ) -> ProjectResult<ProjectConfiguration> {
        self.update_record(project_id, MirrorRender::DocumentOnly, |config| {
            config.header = header;
        })
    }

    pub fn update_pot_header(
        &self,
        project_id: ProjectId,
        pot_header: PotHeaderConfiguration,
    ) -> ProjectResult<ProjectConfiguration> {
        self.update_record(project_id, MirrorRender::DocumentOnly, |config| {
            config.pot_header = pot_header;
        })
    }

    /// Deletes every row, cache entry and stored object of the project.
    ///
    /// The mirror repository is left as it is.
    pub fn remove_project(&self, project_id: ProjectId) -> ProjectResult<usize> {
        let config = self
            .ctx
            .loader()
            .load_uncached(project_id)?
            .ok_or(ProjectServiceError::ProjectNotFound(project_id))?;
        let object_ids: Vec<String> = config
            .all_files()
            .into_iter()
            .map(|file| file.object_id.clone())
            .collect();

        let synced = self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.delete_project(project_id),
            MirrorRender::DocumentOnly,
        );
        let mut removed = 0usize;
        after_commit(synced, || -> ProjectResult<()> {
            for object_id in &object_ids {
                match self.ctx.object_store().delete(object_id) {
                    Ok(()) => removed += 1,
                    Err(ObjectStoreError::NotFound(_)) => {}
                    Err(err) => {
                        warn!(
                            "event=project_remove module=service status=error project={project_id} object={object_id} error={err}"
                        );
                        return Err(err.into());
                    }
                }
            }
            Ok(())
        })?;
        info!("event=project_remove module=service status=ok project={project_id} objects={removed}");
        Ok(removed)
    }

    /// Renders the mirror layout of a project into `target_root`.
    pub fn export_to(
        &self,
        project_id: ProjectId,
        target_root: &Path,
        assets: AssetMode,
    ) -> ProjectResult<ExportSummary> {
        let config = self
            .ctx
            .loader()
            .load_uncached(project_id)?
            .ok_or(ProjectServiceError::ProjectNotFound(project_id))?;
        let exporter = TreeExporter::new(self.ctx.layout().clone());
        Ok(exporter.export(&config, target_root, assets, self.ctx.object_store())?)
    }

    fn update_record<F>(&self, project_id: ProjectId, render: MirrorRender, apply: F) -> ProjectResult<ProjectConfiguration>
    where
        F: FnOnce(&mut ProjectConfiguration),
    {
        let mut config = self.ctx.loader().configuration(project_id)?;
        apply(&mut config);
        let record = ProjectRecord::from_configuration(&config);
        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.update_project(&record),
            render,
        )?;
        self.configuration(project_id)
    }
}
