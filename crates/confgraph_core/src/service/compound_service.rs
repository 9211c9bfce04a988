//! Compound use-case service: compound CRUD and its ordered process list.

use super::{normalize_name, EngineContext};
use crate::model::process::CompoundConfiguration;
use crate::model::project::{Detached, ProjectConfiguration};
use crate::model::reference::{self, Reference};
use crate::model::{NodeId, ProjectId};
use crate::repo::StoreError;
use crate::sync::{MirrorRender, SyncError};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum CompoundServiceError {
    InvalidName(String),
    DuplicateCompound(String),
    CompoundNotFound(NodeId),
    ProcessNotFound(NodeId),
    SectionNotFound(NodeId),
    AlreadyMember { compound: NodeId, process: NodeId },
    NotMember { compound: NodeId, process: NodeId },
    Store(StoreError),
    Sync(SyncError),
}

impl Display for CompoundServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "compound name must not be blank: `{name}`"),
            Self::DuplicateCompound(name) => write!(f, "compound `{name}` already exists"),
            Self::CompoundNotFound(id) => write!(f, "compound not found: {id}"),
            Self::ProcessNotFound(id) => write!(f, "process not found: {id}"),
            Self::SectionNotFound(id) => write!(f, "section not found: {id}"),
            Self::AlreadyMember { compound, process } => {
                write!(f, "process {process} is already in compound {compound}")
            }
            Self::NotMember { compound, process } => {
                write!(f, "process {process} is not in compound {compound}")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
        }
    }
}

impl Error for CompoundServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Sync(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for CompoundServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SyncError> for CompoundServiceError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

pub type CompoundResult<T> = Result<T, CompoundServiceError>;

#[derive(Debug, Clone, Default)]
pub struct CompoundDraft {
    pub name: String,
    pub refer_to_input: Option<String>,
    /// Section to link the new compound into.
    pub section: Option<NodeId>,
}

#[derive(Debug, Clone, Default)]
pub struct CompoundUpdate {
    pub name: Option<String>,
    /// `Some(None)` clears the gate.
    pub refer_to_input: Option<Option<String>>,
}

pub struct CompoundService<'conn> {
    ctx: EngineContext<'conn>,
}

impl<'conn> CompoundService<'conn> {
    pub fn new(ctx: EngineContext<'conn>) -> Self {
        Self { ctx }
    }

    pub fn get_compound(&self, project_id: ProjectId, compound_id: NodeId) -> CompoundResult<CompoundConfiguration> {
        self.ctx
            .loader()
            .compound_by_id(project_id, compound_id)?
            .ok_or(CompoundServiceError::CompoundNotFound(compound_id))
    }

    pub fn compound_by_name(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> CompoundResult<Option<CompoundConfiguration>> {
        Ok(self.ctx.loader().compound_by_name(project_id, name.trim())?)
    }

    pub fn list_compounds(&self, project_id: ProjectId) -> CompoundResult<Vec<CompoundConfiguration>> {
        Ok(self.ctx.loader().compounds(project_id)?)
    }

    pub fn add_compound(&self, project_id: ProjectId, draft: CompoundDraft) -> CompoundResult<CompoundConfiguration> {
        let name = normalize_name(&draft.name)
            .ok_or_else(|| CompoundServiceError::InvalidName(draft.name.clone()))?;
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        if config.compound_by_name(&name).is_some() {
            return Err(CompoundServiceError::DuplicateCompound(name));
        }
        if let Some(section_id) = draft.section {
            if config.section(section_id).is_none() {
                return Err(CompoundServiceError::SectionNotFound(section_id));
            }
        }

        let mut compound = CompoundConfiguration::new(Uuid::new_v4(), name);
        compound.refer_to_input = draft.refer_to_input.and_then(|input| normalize_name(&input));
        compound.project = Some(project_id);
        let compound_id = compound.id;
        config.compound_refs.push(compound.reference());
        config.compounds.push(compound);

        let section_link = match draft.section {
            Some(section_id) => {
                config.link_section_compound(section_id, compound_id);
                config.section(section_id).map(|section| {
                    let ids: Vec<NodeId> = section.compound_refs.iter().map(|r| r.id).collect();
                    (section_id, ids)
                })
            }
            None => None,
        };
        let created = find_compound(&config, compound_id)?;

        let row = created.clone();
        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| {
                tx.upsert_compound(project_id, &row)?;
                if let Some((section_id, ids)) = &section_link {
                    tx.replace_section_compounds(*section_id, ids)?;
                }
                Ok(())
            },
            MirrorRender::DocumentOnly,
        )?;
        Ok(created)
    }

    pub fn update_compound(
        &self,
        project_id: ProjectId,
        compound_id: NodeId,
        update: CompoundUpdate,
    ) -> CompoundResult<CompoundConfiguration> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        let mut compound = find_compound(&config, compound_id)?;
        if let Some(raw) = update.name.as_deref() {
            let name = normalize_name(raw).ok_or_else(|| CompoundServiceError::InvalidName(raw.to_string()))?;
            if config
                .compound_by_name(&name)
                .is_some_and(|other| other.id != compound_id)
            {
                return Err(CompoundServiceError::DuplicateCompound(name));
            }
            compound.name = name;
        }
        if let Some(input) = update.refer_to_input {
            compound.refer_to_input = input.and_then(|input| normalize_name(&input));
        }
        reference::rename_id(&mut config.compound_refs, compound_id, &compound.name);

        let row = compound.clone();
        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.upsert_compound(project_id, &row),
            MirrorRender::DocumentOnly,
        )?;
        Ok(compound)
    }

    /// Deletes a compound; its processes stay in the project.
    pub fn delete_compound(&self, project_id: ProjectId, compound_id: NodeId) -> CompoundResult<Detached> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        find_compound(&config, compound_id)?;
        let detached = config.detach_compound(compound_id);

        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.delete_compound(compound_id),
            MirrorRender::DocumentOnly,
        )?;
        Ok(detached)
    }

    /// Inserts a process into the compound at `position` (appended when `None`).
    pub fn add_process(
        &self,
        project_id: ProjectId,
        compound_id: NodeId,
        process_id: NodeId,
        position: Option<usize>,
    ) -> CompoundResult<Vec<Reference>> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        find_compound(&config, compound_id)?;
        if config.process(process_id).is_none() {
            return Err(CompoundServiceError::ProcessNotFound(process_id));
        }
        if !config.link_compound_process(compound_id, process_id, position) {
            return Err(CompoundServiceError::AlreadyMember {
                compound: compound_id,
                process: process_id,
            });
        }
        self.persist_members(project_id, &config, compound_id)
    }

    pub fn remove_process(
        &self,
        project_id: ProjectId,
        compound_id: NodeId,
        process_id: NodeId,
    ) -> CompoundResult<Vec<Reference>> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        find_compound(&config, compound_id)?;
        if !config.unlink_compound_process(compound_id, process_id) {
            return Err(CompoundServiceError::NotMember {
                compound: compound_id,
                process: process_id,
            });
        }
        self.persist_members(project_id, &config, compound_id)
    }

    /// Moves a member to `position` (clamped) within the ordered list.
    pub fn move_process(
        &self,
        project_id: ProjectId,
        compound_id: NodeId,
        process_id: NodeId,
        position: usize,
    ) -> CompoundResult<Vec<Reference>> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        let compound = config
            .compound_mut(compound_id)
            .ok_or(CompoundServiceError::CompoundNotFound(compound_id))?;
        let index = compound
            .process_refs
            .iter()
            .position(|member| member.id == process_id)
            .ok_or(CompoundServiceError::NotMember {
                compound: compound_id,
                process: process_id,
            })?;
        let member = compound.process_refs.remove(index);
        let target = position.min(compound.process_refs.len());
        compound.process_refs.insert(target, member);
        self.persist_members(project_id, &config, compound_id)
    }

    fn persist_members(
        &self,
        project_id: ProjectId,
        config: &ProjectConfiguration,
        compound_id: NodeId,
    ) -> CompoundResult<Vec<Reference>> {
        let members = find_compound(config, compound_id)?.process_refs;
        let ids: Vec<NodeId> = members.iter().map(|member| member.id).collect();
        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.replace_compound_processes(compound_id, &ids),
            MirrorRender::DocumentOnly,
        )?;
        Ok(members)
    }
}

fn find_compound(config: &ProjectConfiguration, compound_id: NodeId) -> CompoundResult<CompoundConfiguration> {
    config
        .compound(compound_id)
        .cloned()
        .ok_or(CompoundServiceError::CompoundNotFound(compound_id))
}
