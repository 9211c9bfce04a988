//! Managed file service: binary content lives in the object store, the
//! graph keeps the file node and its object id.
//!
//! # Invariants
//! - A new object is stored before the row is written and removed again when
//!   the write rolls back.
//! - Objects of deleted files are removed only after the delete committed,
//!   also when the mirror publish that followed it failed.

use super::{after_commit, entry_name_taken, normalize_segment, EngineContext};
use crate::model::filesystem::{content_type_for, ProjectFile};
use crate::model::project::{join_relative, ProjectConfiguration};
use crate::model::{NodeId, ProjectId};
use crate::repo::graph_tx::file_row;
use crate::repo::StoreError;
use crate::sync::{MirrorRender, ObjectStoreError, SyncError};
use log::{info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum FileServiceError {
    InvalidName(String),
    DuplicateEntry {
        directory: Option<NodeId>,
        name: String,
    },
    FileNotFound(NodeId),
    DirectoryNotFound(NodeId),
    Store(StoreError),
    Sync(SyncError),
    Object(ObjectStoreError),
}

impl Display for FileServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid file name: `{name}`"),
            Self::DuplicateEntry { directory, name } => match directory {
                Some(directory) => write!(f, "`{name}` already exists in directory {directory}"),
                None => write!(f, "`{name}` already exists at the asset root"),
            },
            Self::FileNotFound(id) => write!(f, "file not found: {id}"),
            Self::DirectoryNotFound(id) => write!(f, "directory not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
            Self::Object(err) => write!(f, "{err}"),
        }
    }
}

impl Error for FileServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Sync(err) => Some(err),
            Self::Object(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for FileServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SyncError> for FileServiceError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

impl From<ObjectStoreError> for FileServiceError {
    fn from(value: ObjectStoreError) -> Self {
        Self::Object(value)
    }
}

pub type FileResult<T> = Result<T, FileServiceError>;

pub struct FileService<'conn> {
    ctx: EngineContext<'conn>,
}

impl<'conn> FileService<'conn> {
    pub fn new(ctx: EngineContext<'conn>) -> Self {
        Self { ctx }
    }

    pub fn get_file(&self, project_id: ProjectId, file_id: NodeId) -> FileResult<ProjectFile> {
        let config = self.ctx.loader().configuration(project_id)?;
        config
            .file(file_id)
            .cloned()
            .ok_or(FileServiceError::FileNotFound(file_id))
    }

    /// Files directly inside `directory` (`None` = asset root).
    pub fn list_files(&self, project_id: ProjectId, directory: Option<NodeId>) -> FileResult<Vec<ProjectFile>> {
        let config = self.ctx.loader().configuration(project_id)?;
        ensure_directory(&config, directory)?;
        Ok(config.sibling_files(directory).cloned().unwrap_or_default())
    }

    pub fn read_file_content(&self, project_id: ProjectId, file_id: NodeId) -> FileResult<Vec<u8>> {
        let file = self.get_file(project_id, file_id)?;
        Ok(self.ctx.object_store().get(&file.object_id)?)
    }

    pub fn add_file(
        &self,
        project_id: ProjectId,
        directory: Option<NodeId>,
        name: &str,
        content: &[u8],
    ) -> FileResult<ProjectFile> {
        let name = normalize_segment(name).ok_or_else(|| FileServiceError::InvalidName(name.to_string()))?;
        let config = self.ctx.loader().configuration(project_id)?;
        ensure_directory(&config, directory)?;
        ensure_name_free(&config, directory, &name, None)?;

        let relative_path = join_relative(
            config.directory_path(directory).unwrap_or_default().as_str(),
            &name,
        );
        let content_type = content_type_for(&name);
        let object_id = self
            .ctx
            .object_store()
            .put(project_id, &relative_path, content_type, content)?;

        let mut file = ProjectFile::new(Uuid::new_v4(), name, object_id.clone());
        file.directory = directory;
        file.project = Some(project_id);
        let row = file_row(&file);
        let synced = self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.upsert_file(project_id, &row),
            MirrorRender::Full,
        );
        if let Err(err) = synced {
            if !err.is_committed() {
                self.discard_object(project_id, &object_id);
            }
            return Err(err.into());
        }
        info!(
            "event=file_add module=service status=ok project={project_id} bytes={}",
            content.len()
        );
        Ok(file)
    }

    /// Replaces the file's stored object in place and republishes.
    pub fn update_content(&self, project_id: ProjectId, file_id: NodeId, content: &[u8]) -> FileResult<ProjectFile> {
        let file = self.get_file(project_id, file_id)?;
        self.ctx.object_store().replace(&file.object_id, content)?;
        self.ctx
            .synchronizer()
            .synchronize(project_id, |_| Ok(()), MirrorRender::Full)?;
        Ok(file)
    }

    pub fn rename_file(&self, project_id: ProjectId, file_id: NodeId, name: &str) -> FileResult<ProjectFile> {
        let name = normalize_segment(name).ok_or_else(|| FileServiceError::InvalidName(name.to_string()))?;
        let config = self.ctx.loader().configuration(project_id)?;
        let mut file = config
            .file(file_id)
            .cloned()
            .ok_or(FileServiceError::FileNotFound(file_id))?;
        ensure_name_free(&config, file.directory, &name, Some(file_id))?;
        file.content_type = content_type_for(&name).to_string();
        file.name = name;
        self.relocate(project_id, &config, file)
    }

    pub fn move_file(
        &self,
        project_id: ProjectId,
        file_id: NodeId,
        directory: Option<NodeId>,
    ) -> FileResult<ProjectFile> {
        let config = self.ctx.loader().configuration(project_id)?;
        let mut file = config
            .file(file_id)
            .cloned()
            .ok_or(FileServiceError::FileNotFound(file_id))?;
        ensure_directory(&config, directory)?;
        ensure_name_free(&config, directory, &file.name, Some(file_id))?;
        file.directory = directory;
        self.relocate(project_id, &config, file)
    }

    /// Deletes the file node, then its stored object.
    pub fn delete_file(&self, project_id: ProjectId, file_id: NodeId) -> FileResult<ProjectFile> {
        let file = self.get_file(project_id, file_id)?;
        let synced = self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.delete_file(file_id),
            MirrorRender::Full,
        );
        after_commit(synced, || -> FileResult<()> {
            self.ctx.object_store().delete(&file.object_id)?;
            Ok(())
        })?;
        Ok(file)
    }

    fn relocate(
        &self,
        project_id: ProjectId,
        config: &ProjectConfiguration,
        file: ProjectFile,
    ) -> FileResult<ProjectFile> {
        let relative_path = join_relative(
            config.directory_path(file.directory).unwrap_or_default().as_str(),
            &file.name,
        );
        let row = file_row(&file);
        let synced = self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.upsert_file(project_id, &row),
            MirrorRender::Full,
        );
        after_commit(synced, || -> FileResult<()> {
            self.ctx.object_store().rename(&file.object_id, &relative_path)?;
            Ok(())
        })?;
        Ok(file)
    }

    fn discard_object(&self, project_id: ProjectId, object_id: &str) {
        if let Err(err) = self.ctx.object_store().delete(object_id) {
            warn!(
                "event=file_add module=service status=error stage=discard project={project_id} object={object_id} error={err}"
            );
        }
    }
}

fn ensure_directory(config: &ProjectConfiguration, directory: Option<NodeId>) -> FileResult<()> {
    match directory {
        Some(directory_id) if config.directory(directory_id).is_none() => {
            Err(FileServiceError::DirectoryNotFound(directory_id))
        }
        _ => Ok(()),
    }
}

fn ensure_name_free(
    config: &ProjectConfiguration,
    directory: Option<NodeId>,
    name: &str,
    exclude: Option<NodeId>,
) -> FileResult<()> {
    if entry_name_taken(config, directory, name, exclude) {
        return Err(FileServiceError::DuplicateEntry {
            directory,
            name: name.to_string(),
        });
    }
    Ok(())
}
