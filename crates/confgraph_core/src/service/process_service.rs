//! Process use-case service.
//!
//! # Invariants
//! - Process names are unique project-wide.
//! - Two processes never share a mirror file path.
//! - Deleting a process detaches it from every section and compound first.

use super::{normalize_name, EngineContext};
use crate::model::process::{default_process_path, ProcessConfiguration, ProcessSettings};
use crate::model::project::Detached;
use crate::model::reference::{self, Reference};
use crate::model::{NodeId, ProjectId};
use crate::repo::{RefScope, StoreError};
use crate::sync::{MirrorRender, SyncError};
use crate::tree::parse::normalize_relative_path;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum ProcessServiceError {
    InvalidName(String),
    /// Path is absolute, escapes the flow directory or is empty.
    InvalidPath(String),
    DuplicateProcess(String),
    DuplicatePath(String),
    ProcessNotFound(NodeId),
    SectionNotFound(NodeId),
    Store(StoreError),
    Sync(SyncError),
}

impl Display for ProcessServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "process name must not be blank: `{name}`"),
            Self::InvalidPath(path) => write!(f, "invalid process file path: `{path}`"),
            Self::DuplicateProcess(name) => write!(f, "process `{name}` already exists"),
            Self::DuplicatePath(path) => write!(f, "process file `{path}` is already used"),
            Self::ProcessNotFound(id) => write!(f, "process not found: {id}"),
            Self::SectionNotFound(id) => write!(f, "section not found: {id}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ProcessServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Sync(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for ProcessServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SyncError> for ProcessServiceError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

pub type ProcessResult<T> = Result<T, ProcessServiceError>;

/// Input for [`ProcessService::add_process`].
#[derive(Debug, Clone, Default)]
pub struct ProcessDraft {
    pub name: String,
    /// Defaults to `<name>.json`.
    pub path_to_file: Option<String>,
    pub execution_target: Option<String>,
    pub settings: ProcessSettings,
    /// Section to link the new process into.
    pub section: Option<NodeId>,
}

/// Partial update; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default)]
pub struct ProcessUpdate {
    pub name: Option<String>,
    pub path_to_file: Option<String>,
    /// `Some(None)` clears the target.
    pub execution_target: Option<Option<String>>,
    pub settings: Option<ProcessSettings>,
}

pub struct ProcessService<'conn> {
    ctx: EngineContext<'conn>,
}

impl<'conn> ProcessService<'conn> {
    pub fn new(ctx: EngineContext<'conn>) -> Self {
        Self { ctx }
    }

    pub fn get_process(&self, project_id: ProjectId, process_id: NodeId) -> ProcessResult<ProcessConfiguration> {
        self.ctx
            .loader()
            .process_by_id(project_id, process_id)?
            .ok_or(ProcessServiceError::ProcessNotFound(process_id))
    }

    pub fn process_by_name(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> ProcessResult<Option<ProcessConfiguration>> {
        Ok(self.ctx.loader().process_by_name(project_id, name.trim())?)
    }

    pub fn list_processes(&self, project_id: ProjectId) -> ProcessResult<Vec<ProcessConfiguration>> {
        Ok(self.ctx.loader().processes(project_id)?)
    }

    pub fn process_refs(&self, project_id: ProjectId, scope: RefScope) -> ProcessResult<Vec<Reference>> {
        Ok(self.ctx.loader().process_refs(project_id, scope)?)
    }

    pub fn add_process(&self, project_id: ProjectId, draft: ProcessDraft) -> ProcessResult<ProcessConfiguration> {
        let name = normalize_name(&draft.name)
            .ok_or_else(|| ProcessServiceError::InvalidName(draft.name.clone()))?;
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        if config.process_by_name(&name).is_some() {
            return Err(ProcessServiceError::DuplicateProcess(name));
        }
        let path_to_file = match draft.path_to_file.as_deref() {
            Some(raw) => normalize_relative_path(raw)
                .ok_or_else(|| ProcessServiceError::InvalidPath(raw.to_string()))?,
            None => default_process_path(&name),
        };
        ensure_path_free(&config.processes, &path_to_file, None)?;
        if let Some(section_id) = draft.section {
            if config.section(section_id).is_none() {
                return Err(ProcessServiceError::SectionNotFound(section_id));
            }
        }

        let mut process = ProcessConfiguration::new(Uuid::new_v4(), name);
        process.path_to_file = path_to_file;
        process.execution_target = draft.execution_target.and_then(|target| normalize_name(&target));
        process.settings = draft.settings;
        process.project = Some(project_id);
        let process_id = process.id;
        config.process_refs.push(process.reference());
        config.processes.push(process);

        let section_link = match draft.section {
            Some(section_id) => {
                config.link_section_process(section_id, process_id);
                config.section(section_id).map(|section| {
                    let ids: Vec<NodeId> = section.process_refs.iter().map(|r| r.id).collect();
                    (section_id, ids)
                })
            }
            None => None,
        };
        let created = config
            .process(process_id)
            .cloned()
            .ok_or(ProcessServiceError::ProcessNotFound(process_id))?;

        let row = created.clone();
        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| {
                tx.upsert_process(project_id, &row)?;
                if let Some((section_id, ids)) = &section_link {
                    tx.replace_section_processes(*section_id, ids)?;
                }
                Ok(())
            },
            MirrorRender::DocumentOnly,
        )?;
        Ok(created)
    }

    /// Applies `update`. A rename also moves a process file that still has
    /// its default `<name>.json` path.
    pub fn update_process(
        &self,
        project_id: ProjectId,
        process_id: NodeId,
        update: ProcessUpdate,
    ) -> ProcessResult<ProcessConfiguration> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        let mut process = config
            .process(process_id)
            .cloned()
            .ok_or(ProcessServiceError::ProcessNotFound(process_id))?;

        if let Some(raw) = update.name.as_deref() {
            let name = normalize_name(raw).ok_or_else(|| ProcessServiceError::InvalidName(raw.to_string()))?;
            if config
                .process_by_name(&name)
                .is_some_and(|other| other.id != process_id)
            {
                return Err(ProcessServiceError::DuplicateProcess(name));
            }
            if update.path_to_file.is_none() && process.path_to_file == default_process_path(&process.name) {
                process.path_to_file = default_process_path(&name);
            }
            process.name = name;
        }
        if let Some(raw) = update.path_to_file.as_deref() {
            process.path_to_file =
                normalize_relative_path(raw).ok_or_else(|| ProcessServiceError::InvalidPath(raw.to_string()))?;
        }
        ensure_path_free(&config.processes, &process.path_to_file, Some(process_id))?;
        if let Some(target) = update.execution_target {
            process.execution_target = target.and_then(|target| normalize_name(&target));
        }
        if let Some(settings) = update.settings {
            process.settings = settings;
        }

        reference::rename_id(&mut config.process_refs, process_id, &process.name);
        let row = process.clone();
        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.upsert_process(project_id, &row),
            MirrorRender::DocumentOnly,
        )?;
        Ok(process)
    }

    /// Deletes a process; returns the owners it was detached from.
    pub fn delete_process(&self, project_id: ProjectId, process_id: NodeId) -> ProcessResult<Detached> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        if config.process(process_id).is_none() {
            return Err(ProcessServiceError::ProcessNotFound(process_id));
        }
        let detached = config.detach_process(process_id);

        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.delete_process(process_id),
            MirrorRender::DocumentOnly,
        )?;
        Ok(detached)
    }
}

fn ensure_path_free(
    processes: &[ProcessConfiguration],
    path_to_file: &str,
    exclude: Option<NodeId>,
) -> ProcessResult<()> {
    let taken = processes
        .iter()
        .filter(|process| Some(process.id) != exclude)
        .any(|process| process.path_to_file.eq_ignore_ascii_case(path_to_file));
    if taken {
        return Err(ProcessServiceError::DuplicatePath(path_to_file.to_string()));
    }
    Ok(())
}
