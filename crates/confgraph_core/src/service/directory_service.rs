//! Managed directory tree service.
//!
//! # Invariants
//! - A directory and a file never share a name inside one container.
//! - A directory is never moved below itself.
//! - Stored objects follow their file: after a rename or move every object
//!   under the touched subtree is renamed to its new relative path.

use super::{after_commit, directory_row, entry_name_taken, normalize_segment, EngineContext};
use crate::model::filesystem::{collect_files, ProjectDirectory};
use crate::model::project::ProjectConfiguration;
use crate::model::{NodeId, ProjectId};
use crate::repo::StoreError;
use crate::sync::{MirrorRender, ObjectStoreError, SyncError};
use log::warn;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum DirectoryServiceError {
    InvalidName(String),
    /// `parent` already holds a directory or file called `name`.
    DuplicateEntry {
        parent: Option<NodeId>,
        name: String,
    },
    DirectoryNotFound(NodeId),
    ParentNotFound(NodeId),
    CycleDetected { node: NodeId, parent: NodeId },
    Store(StoreError),
    Sync(SyncError),
    /// The graph committed but a stored object could not follow it.
    Object(ObjectStoreError),
}

impl Display for DirectoryServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid directory name: `{name}`"),
            Self::DuplicateEntry { parent, name } => match parent {
                Some(parent) => write!(f, "`{name}` already exists in directory {parent}"),
                None => write!(f, "`{name}` already exists at the asset root"),
            },
            Self::DirectoryNotFound(id) => write!(f, "directory not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent directory not found: {id}"),
            Self::CycleDetected { node, parent } => {
                write!(f, "move would create cycle: directory {node} under {parent}")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
            Self::Object(err) => write!(f, "{err}"),
        }
    }
}

impl Error for DirectoryServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Sync(err) => Some(err),
            Self::Object(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for DirectoryServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SyncError> for DirectoryServiceError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

impl From<ObjectStoreError> for DirectoryServiceError {
    fn from(value: ObjectStoreError) -> Self {
        Self::Object(value)
    }
}

pub type DirectoryResult<T> = Result<T, DirectoryServiceError>;

pub struct DirectoryService<'conn> {
    ctx: EngineContext<'conn>,
}

impl<'conn> DirectoryService<'conn> {
    pub fn new(ctx: EngineContext<'conn>) -> Self {
        Self { ctx }
    }

    pub fn get_directory(&self, project_id: ProjectId, directory_id: NodeId) -> DirectoryResult<ProjectDirectory> {
        let config = self.ctx.loader().configuration(project_id)?;
        config
            .directory(directory_id)
            .cloned()
            .ok_or(DirectoryServiceError::DirectoryNotFound(directory_id))
    }

    /// Directories directly inside `parent` (`None` = asset root).
    pub fn list_directories(
        &self,
        project_id: ProjectId,
        parent: Option<NodeId>,
    ) -> DirectoryResult<Vec<ProjectDirectory>> {
        let config = self.ctx.loader().configuration(project_id)?;
        siblings(&config, parent).cloned()
    }

    pub fn add_directory(
        &self,
        project_id: ProjectId,
        parent: Option<NodeId>,
        name: &str,
    ) -> DirectoryResult<ProjectDirectory> {
        let name = normalize_segment(name).ok_or_else(|| DirectoryServiceError::InvalidName(name.to_string()))?;
        let config = self.ctx.loader().configuration(project_id)?;
        siblings(&config, parent)?;
        ensure_name_free(&config, parent, &name, None)?;

        let mut directory = ProjectDirectory::new(Uuid::new_v4(), name);
        directory.parent = parent;
        directory.project = Some(project_id);
        let row = directory_row(&directory);
        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.upsert_directory(project_id, &row),
            MirrorRender::Full,
        )?;
        Ok(directory)
    }

    pub fn rename_directory(
        &self,
        project_id: ProjectId,
        directory_id: NodeId,
        name: &str,
    ) -> DirectoryResult<ProjectDirectory> {
        let name = normalize_segment(name).ok_or_else(|| DirectoryServiceError::InvalidName(name.to_string()))?;
        let mut config = self.ctx.loader().configuration(project_id)?;
        let parent = config
            .directory(directory_id)
            .ok_or(DirectoryServiceError::DirectoryNotFound(directory_id))?
            .parent;
        ensure_name_free(&config, parent, &name, Some(directory_id))?;

        let directory = config
            .directory_mut(directory_id)
            .ok_or(DirectoryServiceError::DirectoryNotFound(directory_id))?;
        directory.name = name;
        let row = directory_row(directory);
        let renamed = directory.clone();

        let synced = self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.upsert_directory(project_id, &row),
            MirrorRender::Full,
        );
        after_commit(synced, || self.rename_objects(&config, directory_id))?;
        Ok(renamed)
    }

    pub fn move_directory(
        &self,
        project_id: ProjectId,
        directory_id: NodeId,
        new_parent: Option<NodeId>,
    ) -> DirectoryResult<ProjectDirectory> {
        let mut config = self.ctx.loader().configuration(project_id)?;
        let directory = config
            .directory(directory_id)
            .ok_or(DirectoryServiceError::DirectoryNotFound(directory_id))?;
        let old_parent = directory.parent;
        let name = directory.name.clone();
        if let Some(parent_id) = new_parent {
            if directory.contains(parent_id) {
                return Err(DirectoryServiceError::CycleDetected {
                    node: directory_id,
                    parent: parent_id,
                });
            }
        }
        siblings(&config, new_parent)?;
        ensure_name_free(&config, new_parent, &name, Some(directory_id))?;

        let old_siblings = siblings_mut(&mut config, old_parent)?;
        let index = old_siblings
            .iter()
            .position(|sibling| sibling.id == directory_id)
            .ok_or(DirectoryServiceError::DirectoryNotFound(directory_id))?;
        let mut moved = old_siblings.remove(index);
        moved.parent = new_parent;
        let row = directory_row(&moved);
        let result = moved.clone();
        siblings_mut(&mut config, new_parent)?.push(moved);

        let synced = self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.upsert_directory(project_id, &row),
            MirrorRender::Full,
        );
        after_commit(synced, || self.rename_objects(&config, directory_id))?;
        Ok(result)
    }

    /// Deletes a directory with everything below it, including stored objects.
    ///
    /// Returns the object ids that were removed.
    pub fn delete_directory(&self, project_id: ProjectId, directory_id: NodeId) -> DirectoryResult<Vec<String>> {
        let config = self.ctx.loader().configuration(project_id)?;
        let directory = config
            .directory(directory_id)
            .ok_or(DirectoryServiceError::DirectoryNotFound(directory_id))?;
        let mut files = Vec::new();
        collect_files(directory, &mut files);
        let object_ids: Vec<String> = files.iter().map(|file| file.object_id.clone()).collect();

        let synced = self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.delete_directory(directory_id),
            MirrorRender::Full,
        );
        after_commit(synced, || -> DirectoryResult<()> {
            for object_id in &object_ids {
                if let Err(err) = self.ctx.object_store().delete(object_id) {
                    warn!(
                        "event=directory_delete module=service status=error project={project_id} object={object_id} error={err}"
                    );
                    return Err(err.into());
                }
            }
            Ok(())
        })?;
        Ok(object_ids)
    }

    /// Points every object below `directory_id` at its current relative path.
    fn rename_objects(&self, config: &ProjectConfiguration, directory_id: NodeId) -> DirectoryResult<()> {
        let Some(directory) = config.directory(directory_id) else {
            return Ok(());
        };
        let mut files = Vec::new();
        collect_files(directory, &mut files);
        for file in files {
            let relative_path = config.file_relative_path(file);
            self.ctx.object_store().rename(&file.object_id, &relative_path)?;
        }
        Ok(())
    }
}

fn siblings(config: &ProjectConfiguration, parent: Option<NodeId>) -> DirectoryResult<&Vec<ProjectDirectory>> {
    match parent {
        None => Ok(&config.directories),
        Some(parent_id) => config
            .directory(parent_id)
            .map(|directory| &directory.directories)
            .ok_or(DirectoryServiceError::ParentNotFound(parent_id)),
    }
}

fn siblings_mut(
    config: &mut ProjectConfiguration,
    parent: Option<NodeId>,
) -> DirectoryResult<&mut Vec<ProjectDirectory>> {
    match parent {
        None => Ok(&mut config.directories),
        Some(parent_id) => config
            .directory_mut(parent_id)
            .map(|directory| &mut directory.directories)
            .ok_or(DirectoryServiceError::ParentNotFound(parent_id)),
    }
}

/// Rejects `name` when another directory or a file in `parent` uses it.
fn ensure_name_free(
    config: &ProjectConfiguration,
    parent: Option<NodeId>,
    name: &str,
    exclude: Option<NodeId>,
) -> DirectoryResult<()> {
    if entry_name_taken(config, parent, name, exclude) {
        return Err(DirectoryServiceError::DuplicateEntry {
            parent,
            name: name.to_string(),
        });
    }
    Ok(())
}
