//! Section tree use-case service.
//!
//! # Responsibility
//! - Add, rename, move and delete sections of a project's forest.
//! - Link and unlink processes and compounds on a section.
//!
//! # Invariants
//! - Sibling names are unique per parent.
//! - A section is never moved below itself or one of its descendants.
//! - Every touched sibling list is renumbered to `[0, n)` and persisted.

use super::{normalize_name, section_row, EngineContext};
use crate::model::project::ProjectConfiguration;
use crate::model::reference::Reference;
use crate::model::section::{renumber, SectionConfiguration};
use crate::model::{NodeId, ProjectId};
use crate::repo::{SectionRow, StoreError};
use crate::sync::{MirrorRender, SyncError};
use std::collections::HashSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

#[derive(Debug)]
pub enum SectionServiceError {
    /// Name is blank after trim.
    InvalidName(String),
    SectionNotFound(NodeId),
    ParentNotFound(NodeId),
    ProcessNotFound(NodeId),
    CompoundNotFound(NodeId),
    /// A sibling under `parent` already carries `name`.
    DuplicateSection {
        parent: Option<NodeId>,
        name: String,
    },
    /// Re-parenting would make `node` its own ancestor.
    CycleDetected { node: NodeId, parent: NodeId },
    AlreadyLinked { section: NodeId, member: NodeId },
    NotLinked { section: NodeId, member: NodeId },
    Store(StoreError),
    Sync(SyncError),
}

impl Display for SectionServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "section name must not be blank: `{name}`"),
            Self::SectionNotFound(id) => write!(f, "section not found: {id}"),
            Self::ParentNotFound(id) => write!(f, "parent section not found: {id}"),
            Self::ProcessNotFound(id) => write!(f, "process not found: {id}"),
            Self::CompoundNotFound(id) => write!(f, "compound not found: {id}"),
            Self::DuplicateSection { parent, name } => match parent {
                Some(parent) => write!(f, "section `{name}` already exists under {parent}"),
                None => write!(f, "root section `{name}` already exists"),
            },
            Self::CycleDetected { node, parent } => {
                write!(f, "move would create cycle: section {node} under {parent}")
            }
            Self::AlreadyLinked { section, member } => {
                write!(f, "{member} is already linked to section {section}")
            }
            Self::NotLinked { section, member } => {
                write!(f, "{member} is not linked to section {section}")
            }
            Self::Store(err) => write!(f, "{err}"),
            Self::Sync(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SectionServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Sync(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StoreError> for SectionServiceError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<SyncError> for SectionServiceError {
    fn from(value: SyncError) -> Self {
        Self::Sync(value)
    }
}

pub type SectionResult<T> = Result<T, SectionServiceError>;

pub struct SectionService<'conn> {
    ctx: EngineContext<'conn>,
}

impl<'conn> SectionService<'conn> {
    pub fn new(ctx: EngineContext<'conn>) -> Self {
        Self { ctx }
    }

    pub fn root_sections(&self, project_id: ProjectId) -> SectionResult<Vec<SectionConfiguration>> {
        Ok(self.ctx.loader().root_sections(project_id)?)
    }

    pub fn get_section(
        &self,
        project_id: ProjectId,
        section_id: NodeId,
    ) -> SectionResult<SectionConfiguration> {
        self.ctx
            .loader()
            .section_by_id(project_id, section_id)?
            .ok_or(SectionServiceError::SectionNotFound(section_id))
    }

    /// Children of `parent` in `place` order (`None` = root sections).
    pub fn list_children(
        &self,
        project_id: ProjectId,
        parent: Option<NodeId>,
    ) -> SectionResult<Vec<SectionConfiguration>> {
        let config = self.ctx.loader().configuration(project_id)?;
        match parent {
            None => Ok(config.sections),
            Some(parent_id) => config
                .section(parent_id)
                .map(|section| section.sections.clone())
                .ok_or(SectionServiceError::ParentNotFound(parent_id)),
        }
    }

    /// Creates a section under `parent` at `position` (appended when `None`).
    pub fn add_section(
        &self,
        project_id: ProjectId,
        parent: Option<NodeId>,
        name: &str,
        position: Option<usize>,
    ) -> SectionResult<SectionConfiguration> {
        let name = normalize_name(name).ok_or_else(|| SectionServiceError::InvalidName(name.to_string()))?;
        let mut config = self.ctx.loader().configuration(project_id)?;
        let siblings = siblings_mut(&mut config, parent)?;
        if siblings.iter().any(|sibling| sibling.name == name) {
            return Err(SectionServiceError::DuplicateSection { parent, name });
        }

        let mut section = SectionConfiguration::new(Uuid::new_v4(), name);
        section.parent_section = parent;
        section.project = Some(project_id);
        let index = position.unwrap_or(siblings.len()).min(siblings.len());
        siblings.insert(index, section);
        renumber(siblings);
        let created = siblings[index].clone();
        let rows: Vec<SectionRow> = siblings.iter().map(section_row).collect();

        self.persist_rows(project_id, rows)?;
        Ok(created)
    }

    pub fn rename_section(
        &self,
        project_id: ProjectId,
        section_id: NodeId,
        name: &str,
    ) -> SectionResult<SectionConfiguration> {
        let name = normalize_name(name).ok_or_else(|| SectionServiceError::InvalidName(name.to_string()))?;
        let mut config = self.ctx.loader().configuration(project_id)?;
        let parent = config
            .section(section_id)
            .ok_or(SectionServiceError::SectionNotFound(section_id))?
            .parent_section;
        let siblings = siblings_mut(&mut config, parent)?;
        if siblings
            .iter()
            .any(|sibling| sibling.id != section_id && sibling.name == name)
        {
            return Err(SectionServiceError::DuplicateSection { parent, name });
        }
        let section = siblings
            .iter_mut()
            .find(|sibling| sibling.id == section_id)
            .ok_or(SectionServiceError::SectionNotFound(section_id))?;
        section.name = name;
        let renamed = section.clone();

        self.persist_rows(project_id, vec![section_row(&renamed)])?;
        Ok(renamed)
    }

    /// Re-parents a section (and its subtree) under `new_parent`.
    ///
    /// Both the old and the new sibling lists are renumbered.
    pub fn move_section(
        &self,
        project_id: ProjectId,
        section_id: NodeId,
        new_parent: Option<NodeId>,
        position: Option<usize>,
    ) -> SectionResult<SectionConfiguration> {
        let mut config = self.ctx.loader().configuration(project_id)?;
        let section = config
            .section(section_id)
            .ok_or(SectionServiceError::SectionNotFound(section_id))?;
        let old_parent = section.parent_section;
        let name = section.name.clone();

        if let Some(parent_id) = new_parent {
            if config.section(parent_id).is_none() {
                return Err(SectionServiceError::ParentNotFound(parent_id));
            }
            if would_create_cycle(&config, section_id, parent_id) {
                return Err(SectionServiceError::CycleDetected {
                    node: section_id,
                    parent: parent_id,
                });
            }
        }
        let target = siblings_mut(&mut config, new_parent)?;
        if target
            .iter()
            .any(|sibling| sibling.id != section_id && sibling.name == name)
        {
            return Err(SectionServiceError::DuplicateSection {
                parent: new_parent,
                name,
            });
        }

        let old_siblings = siblings_mut(&mut config, old_parent)?;
        let index = old_siblings
            .iter()
            .position(|sibling| sibling.id == section_id)
            .ok_or(SectionServiceError::SectionNotFound(section_id))?;
        let mut moved = old_siblings.remove(index);
        renumber(old_siblings);
        let mut rows: Vec<SectionRow> = if old_parent == new_parent {
            Vec::new()
        } else {
            old_siblings.iter().map(section_row).collect()
        };

        moved.parent_section = new_parent;
        let new_siblings = siblings_mut(&mut config, new_parent)?;
        let insert_at = position.unwrap_or(new_siblings.len()).min(new_siblings.len());
        new_siblings.insert(insert_at, moved);
        renumber(new_siblings);
        let result = new_siblings[insert_at].clone();
        rows.extend(new_siblings.iter().map(section_row));

        self.persist_rows(project_id, rows)?;
        Ok(result)
    }

    /// Deletes a section with its subtree; returns every removed section id.
    pub fn delete_section(&self, project_id: ProjectId, section_id: NodeId) -> SectionResult<Vec<NodeId>> {
        let mut config = self.ctx.loader().configuration(project_id)?;
        let parent = config
            .section(section_id)
            .ok_or(SectionServiceError::SectionNotFound(section_id))?
            .parent_section;
        let siblings = siblings_mut(&mut config, parent)?;
        let index = siblings
            .iter()
            .position(|sibling| sibling.id == section_id)
            .ok_or(SectionServiceError::SectionNotFound(section_id))?;
        let removed = siblings.remove(index);
        renumber(siblings);
        let rows: Vec<SectionRow> = siblings.iter().map(section_row).collect();

        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| {
                tx.delete_section(section_id)?;
                for row in &rows {
                    tx.upsert_section(project_id, row)?;
                }
                Ok(())
            },
            MirrorRender::DocumentOnly,
        )?;
        Ok(removed.subtree_ids())
    }

    pub fn link_process(
        &self,
        project_id: ProjectId,
        section_id: NodeId,
        process_id: NodeId,
    ) -> SectionResult<Vec<Reference>> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        ensure_section(&config, section_id)?;
        if config.process(process_id).is_none() {
            return Err(SectionServiceError::ProcessNotFound(process_id));
        }
        if !config.link_section_process(section_id, process_id) {
            return Err(SectionServiceError::AlreadyLinked {
                section: section_id,
                member: process_id,
            });
        }
        self.persist_section_processes(project_id, &config, section_id)
    }

    pub fn unlink_process(
        &self,
        project_id: ProjectId,
        section_id: NodeId,
        process_id: NodeId,
    ) -> SectionResult<Vec<Reference>> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        ensure_section(&config, section_id)?;
        if !config.unlink_section_process(section_id, process_id) {
            return Err(SectionServiceError::NotLinked {
                section: section_id,
                member: process_id,
            });
        }
        self.persist_section_processes(project_id, &config, section_id)
    }

    pub fn link_compound(
        &self,
        project_id: ProjectId,
        section_id: NodeId,
        compound_id: NodeId,
    ) -> SectionResult<Vec<Reference>> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        ensure_section(&config, section_id)?;
        if config.compound(compound_id).is_none() {
            return Err(SectionServiceError::CompoundNotFound(compound_id));
        }
        if !config.link_section_compound(section_id, compound_id) {
            return Err(SectionServiceError::AlreadyLinked {
                section: section_id,
                member: compound_id,
            });
        }
        self.persist_section_compounds(project_id, &config, section_id)
    }

    pub fn unlink_compound(
        &self,
        project_id: ProjectId,
        section_id: NodeId,
        compound_id: NodeId,
    ) -> SectionResult<Vec<Reference>> {
        let mut config = self.ctx.loader().materialized_configuration(project_id)?;
        ensure_section(&config, section_id)?;
        if !config.unlink_section_compound(section_id, compound_id) {
            return Err(SectionServiceError::NotLinked {
                section: section_id,
                member: compound_id,
            });
        }
        self.persist_section_compounds(project_id, &config, section_id)
    }

    fn persist_rows(&self, project_id: ProjectId, rows: Vec<SectionRow>) -> SectionResult<()> {
        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| {
                for row in &rows {
                    tx.upsert_section(project_id, row)?;
                }
                Ok(())
            },
            MirrorRender::DocumentOnly,
        )?;
        Ok(())
    }

    fn persist_section_processes(
        &self,
        project_id: ProjectId,
        config: &ProjectConfiguration,
        section_id: NodeId,
    ) -> SectionResult<Vec<Reference>> {
        let refs = config
            .section(section_id)
            .map(|section| section.process_refs.clone())
            .unwrap_or_default();
        let ids: Vec<NodeId> = refs.iter().map(|reference| reference.id).collect();
        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.replace_section_processes(section_id, &ids),
            MirrorRender::DocumentOnly,
        )?;
        Ok(refs)
    }

    fn persist_section_compounds(
        &self,
        project_id: ProjectId,
        config: &ProjectConfiguration,
        section_id: NodeId,
    ) -> SectionResult<Vec<Reference>> {
        let refs = config
            .section(section_id)
            .map(|section| section.compound_refs.clone())
            .unwrap_or_default();
        let ids: Vec<NodeId> = refs.iter().map(|reference| reference.id).collect();
        self.ctx.synchronizer().synchronize(
            project_id,
            move |tx| tx.replace_section_compounds(section_id, &ids),
            MirrorRender::DocumentOnly,
        )?;
        Ok(refs)
    }
}

fn ensure_section(config: &ProjectConfiguration, section_id: NodeId) -> SectionResult<()> {
    if config.section(section_id).is_none() {
        return Err(SectionServiceError::SectionNotFound(section_id));
    }
    Ok(())
}

fn siblings_mut(
    config: &mut ProjectConfiguration,
    parent: Option<NodeId>,
) -> SectionResult<&mut Vec<SectionConfiguration>> {
    match parent {
        None => Ok(&mut config.sections),
        Some(parent_id) => config
            .section_mut(parent_id)
            .map(|section| &mut section.sections)
            .ok_or(SectionServiceError::ParentNotFound(parent_id)),
    }
}

/// Walks the parent chain of `candidate_parent` looking for `node`.
fn would_create_cycle(config: &ProjectConfiguration, node: NodeId, candidate_parent: NodeId) -> bool {
    let mut visited = HashSet::new();
    let mut cursor = Some(candidate_parent);
    while let Some(current) = cursor {
        if current == node || !visited.insert(current) {
            return true;
        }
        cursor = config.section(current).and_then(|section| section.parent_section);
    }
    false
}
