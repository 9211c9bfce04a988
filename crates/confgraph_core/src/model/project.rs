//! Project configuration root and its singleton sub-configurations.

use super::filesystem::{
    collect_files, find_directory, find_directory_mut, ProjectDirectory, ProjectFile,
};
use super::process::{push_name, remove_name, CompoundConfiguration, ProcessConfiguration};
use super::reference::{self, Reference};
use super::section::{find_section, find_section_mut, walk_sections, SectionConfiguration};
use super::{NodeId, ProjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Project-wide execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommonConfiguration {
    pub stop_on_failure: bool,
    pub retries: u32,
    pub variables: BTreeMap<String, String>,
}

/// Report header settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HeaderConfiguration {
    pub title: Option<String>,
    pub fields: BTreeMap<String, String>,
}

/// Proof-of-testing report header settings.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PotHeaderConfiguration {
    pub enabled: bool,
    pub columns: Vec<String>,
}

/// Root of one project's configuration graph.
///
/// `process_refs`/`compound_refs` list every process/compound in the project
/// regardless of nesting. `processes`/`compounds` are the materialized full
/// entities; they are empty until the loader fills them and are never cached
/// as part of the graph entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectConfiguration {
    pub project_id: ProjectId,
    pub repository_url: Option<String>,
    pub default_target: Option<String>,
    pub common: CommonConfiguration,
    pub header: HeaderConfiguration,
    pub pot_header: PotHeaderConfiguration,
    pub sections: Vec<SectionConfiguration>,
    pub process_refs: Vec<Reference>,
    pub compound_refs: Vec<Reference>,
    pub directories: Vec<ProjectDirectory>,
    /// Files stored at the asset root, outside any directory.
    pub files: Vec<ProjectFile>,
    pub processes: Vec<ProcessConfiguration>,
    pub compounds: Vec<CompoundConfiguration>,
    /// Newline-joined import diagnostics of the last import, if any.
    pub validation_report: Option<String>,
}

/// Ids of owners a member was detached from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Detached {
    pub sections: Vec<NodeId>,
    pub compounds: Vec<NodeId>,
}

impl ProjectConfiguration {
    /// Creates the default (empty template) configuration for a project.
    pub fn new(project_id: ProjectId) -> Self {
        Self {
            project_id,
            repository_url: None,
            default_target: None,
            common: CommonConfiguration::default(),
            header: HeaderConfiguration::default(),
            pot_header: PotHeaderConfiguration::default(),
            sections: Vec::new(),
            process_refs: Vec::new(),
            compound_refs: Vec::new(),
            directories: Vec::new(),
            files: Vec::new(),
            processes: Vec::new(),
            compounds: Vec::new(),
            validation_report: None,
        }
    }

    /// Returns whether a non-empty mirror repository URL is configured.
    pub fn has_mirror(&self) -> bool {
        self.repository_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }

    pub fn root_sections(&self) -> &[SectionConfiguration] {
        &self.sections
    }

    pub fn section(&self, id: NodeId) -> Option<&SectionConfiguration> {
        find_section(&self.sections, id)
    }

    pub fn section_mut(&mut self, id: NodeId) -> Option<&mut SectionConfiguration> {
        find_section_mut(&mut self.sections, id)
    }

    /// Every section in pre-order (parents before children).
    pub fn all_sections(&self) -> Vec<&SectionConfiguration> {
        let mut out = Vec::new();
        walk_sections(&self.sections, &mut out);
        out
    }

    /// Sibling list under `parent` (`None` = project root).
    pub fn sibling_sections(&self, parent: Option<NodeId>) -> Option<&Vec<SectionConfiguration>> {
        match parent {
            None => Some(&self.sections),
            Some(parent_id) => self.section(parent_id).map(|section| &section.sections),
        }
    }

    pub fn sibling_sections_mut(
        &mut self,
        parent: Option<NodeId>,
    ) -> Option<&mut Vec<SectionConfiguration>> {
        match parent {
            None => Some(&mut self.sections),
            Some(parent_id) => self.section_mut(parent_id).map(|section| &mut section.sections),
        }
    }

    pub fn process(&self, id: NodeId) -> Option<&ProcessConfiguration> {
        self.processes.iter().find(|process| process.id == id)
    }

    pub fn process_mut(&mut self, id: NodeId) -> Option<&mut ProcessConfiguration> {
        self.processes.iter_mut().find(|process| process.id == id)
    }

    pub fn process_by_name(&self, name: &str) -> Option<&ProcessConfiguration> {
        self.processes.iter().find(|process| process.name == name)
    }

    pub fn compound(&self, id: NodeId) -> Option<&CompoundConfiguration> {
        self.compounds.iter().find(|compound| compound.id == id)
    }

    pub fn compound_mut(&mut self, id: NodeId) -> Option<&mut CompoundConfiguration> {
        self.compounds.iter_mut().find(|compound| compound.id == id)
    }

    pub fn compound_by_name(&self, name: &str) -> Option<&CompoundConfiguration> {
        self.compounds.iter().find(|compound| compound.name == name)
    }

    pub fn directory(&self, id: NodeId) -> Option<&ProjectDirectory> {
        find_directory(&self.directories, id)
    }

    pub fn directory_mut(&mut self, id: NodeId) -> Option<&mut ProjectDirectory> {
        find_directory_mut(&mut self.directories, id)
    }

    pub fn sibling_directories(&self, parent: Option<NodeId>) -> Option<&Vec<ProjectDirectory>> {
        match parent {
            None => Some(&self.directories),
            Some(parent_id) => self.directory(parent_id).map(|dir| &dir.directories),
        }
    }

    pub fn sibling_directories_mut(
        &mut self,
        parent: Option<NodeId>,
    ) -> Option<&mut Vec<ProjectDirectory>> {
        match parent {
            None => Some(&mut self.directories),
            Some(parent_id) => self.directory_mut(parent_id).map(|dir| &mut dir.directories),
        }
    }

    /// Files held directly in `directory` (`None` = asset root).
    pub fn sibling_files(&self, directory: Option<NodeId>) -> Option<&Vec<ProjectFile>> {
        match directory {
            None => Some(&self.files),
            Some(directory_id) => self.directory(directory_id).map(|dir| &dir.files),
        }
    }

    pub fn sibling_files_mut(&mut self, directory: Option<NodeId>) -> Option<&mut Vec<ProjectFile>> {
        match directory {
            None => Some(&mut self.files),
            Some(directory_id) => self.directory_mut(directory_id).map(|dir| &mut dir.files),
        }
    }

    /// Every managed file, root files first, then directories in pre-order.
    pub fn all_files(&self) -> Vec<&ProjectFile> {
        let mut out: Vec<&ProjectFile> = self.files.iter().collect();
        for directory in &self.directories {
            collect_files(directory, &mut out);
        }
        out
    }

    pub fn file(&self, id: NodeId) -> Option<&ProjectFile> {
        self.all_files().into_iter().find(|file| file.id == id)
    }

    /// Returns whether the project manages any binary asset.
    pub fn has_managed_files(&self) -> bool {
        !self.all_files().is_empty()
    }

    /// Slash-joined directory names from the asset root down to `directory`.
    ///
    /// Returns an empty string for the root and `None` for unknown ids.
    pub fn directory_path(&self, directory: Option<NodeId>) -> Option<String> {
        let Some(directory_id) = directory else {
            return Some(String::new());
        };
        let mut names = Vec::new();
        let mut cursor = Some(directory_id);
        while let Some(current) = cursor {
            let node = self.directory(current)?;
            names.push(node.name.clone());
            cursor = node.parent;
            if names.len() > 4096 {
                return None;
            }
        }
        names.reverse();
        Some(names.join("/"))
    }

    /// Relative path of `file` below the asset root.
    pub fn file_relative_path(&self, file: &ProjectFile) -> String {
        join_relative(
            self.directory_path(file.directory).unwrap_or_default().as_str(),
            &file.name,
        )
    }

    /// Links a process into a section. Both must exist.
    ///
    /// Returns `false` when either side is unknown or the link existed.
    pub fn link_section_process(&mut self, section_id: NodeId, process_id: NodeId) -> bool {
        let Some(process_ref) = self.process(process_id).map(ProcessConfiguration::reference) else {
            return false;
        };
        let Some(section) = self.section_mut(section_id) else {
            return false;
        };
        if !reference::insert_unique(&mut section.process_refs, process_ref, None) {
            return false;
        }
        let section_name = section.name.clone();
        if let Some(process) = self.process_mut(process_id) {
            push_name(&mut process.sections, &section_name);
        }
        true
    }

    pub fn unlink_section_process(&mut self, section_id: NodeId, process_id: NodeId) -> bool {
        let Some(section) = self.section_mut(section_id) else {
            return false;
        };
        if !reference::remove_id(&mut section.process_refs, process_id) {
            return false;
        }
        let section_name = section.name.clone();
        let still_listed = self.all_sections().into_iter().any(|other| {
            other.name == section_name && reference::contains_id(&other.process_refs, process_id)
        });
        if !still_listed {
            if let Some(process) = self.process_mut(process_id) {
                remove_name(&mut process.sections, &section_name);
            }
        }
        true
    }

    pub fn link_section_compound(&mut self, section_id: NodeId, compound_id: NodeId) -> bool {
        let Some(compound_ref) = self.compound(compound_id).map(CompoundConfiguration::reference)
        else {
            return false;
        };
        let Some(section) = self.section_mut(section_id) else {
            return false;
        };
        if !reference::insert_unique(&mut section.compound_refs, compound_ref, None) {
            return false;
        }
        let section_name = section.name.clone();
        if let Some(compound) = self.compound_mut(compound_id) {
            push_name(&mut compound.sections, &section_name);
        }
        true
    }

    pub fn unlink_section_compound(&mut self, section_id: NodeId, compound_id: NodeId) -> bool {
        let Some(section) = self.section_mut(section_id) else {
            return false;
        };
        if !reference::remove_id(&mut section.compound_refs, compound_id) {
            return false;
        }
        let section_name = section.name.clone();
        let still_listed = self.all_sections().into_iter().any(|other| {
            other.name == section_name && reference::contains_id(&other.compound_refs, compound_id)
        });
        if !still_listed {
            if let Some(compound) = self.compound_mut(compound_id) {
                remove_name(&mut compound.sections, &section_name);
            }
        }
        true
    }

    /// Inserts a process into a compound's ordered list at `position`.
    pub fn link_compound_process(
        &mut self,
        compound_id: NodeId,
        process_id: NodeId,
        position: Option<usize>,
    ) -> bool {
        let Some(process_ref) = self.process(process_id).map(ProcessConfiguration::reference) else {
            return false;
        };
        let Some(compound) = self.compound_mut(compound_id) else {
            return false;
        };
        if !reference::insert_unique(&mut compound.process_refs, process_ref, position) {
            return false;
        }
        let compound_name = compound.name.clone();
        if let Some(process) = self.process_mut(process_id) {
            push_name(&mut process.compounds, &compound_name);
        }
        true
    }

    pub fn unlink_compound_process(&mut self, compound_id: NodeId, process_id: NodeId) -> bool {
        let Some(compound) = self.compound_mut(compound_id) else {
            return false;
        };
        if !reference::remove_id(&mut compound.process_refs, process_id) {
            return false;
        }
        let compound_name = compound.name.clone();
        let still_listed = self.compounds.iter().any(|other| {
            other.name == compound_name && reference::contains_id(&other.process_refs, process_id)
        });
        if !still_listed {
            if let Some(process) = self.process_mut(process_id) {
                remove_name(&mut process.compounds, &compound_name);
            }
        }
        true
    }

    /// Removes a process from every section and compound listing it.
    pub fn detach_process(&mut self, process_id: NodeId) -> Detached {
        let mut detached = Detached::default();
        let section_ids: Vec<NodeId> = self
            .all_sections()
            .into_iter()
            .filter(|section| reference::contains_id(&section.process_refs, process_id))
            .map(|section| section.id)
            .collect();
        for section_id in section_ids {
            self.unlink_section_process(section_id, process_id);
            detached.sections.push(section_id);
        }
        let compound_ids: Vec<NodeId> = self
            .compounds
            .iter()
            .filter(|compound| reference::contains_id(&compound.process_refs, process_id))
            .map(|compound| compound.id)
            .collect();
        for compound_id in compound_ids {
            self.unlink_compound_process(compound_id, process_id);
            detached.compounds.push(compound_id);
        }
        detached
    }

    /// Removes a compound from every section listing it.
    pub fn detach_compound(&mut self, compound_id: NodeId) -> Detached {
        let mut detached = Detached::default();
        let section_ids: Vec<NodeId> = self
            .all_sections()
            .into_iter()
            .filter(|section| reference::contains_id(&section.compound_refs, compound_id))
            .map(|section| section.id)
            .collect();
        for section_id in section_ids {
            self.unlink_section_compound(section_id, compound_id);
            detached.sections.push(section_id);
        }
        detached
    }
}

/// Joins a directory path and a file name with `/`.
pub fn join_relative(directory_path: &str, name: &str) -> String {
    if directory_path.is_empty() {
        name.to_string()
    } else {
        format!("{directory_path}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::ProjectConfiguration;
    use crate::model::process::{CompoundConfiguration, ProcessConfiguration};
    use crate::model::section::SectionConfiguration;
    use uuid::Uuid;

    fn sample() -> (ProjectConfiguration, Uuid, Uuid, Uuid) {
        let mut config = ProjectConfiguration::new(Uuid::new_v4());
        let section = SectionConfiguration::new(Uuid::new_v4(), "CM");
        let process = ProcessConfiguration::new(Uuid::new_v4(), "SSH_BG");
        let compound = CompoundConfiguration::new(Uuid::new_v4(), "Prepare");
        let ids = (section.id, process.id, compound.id);
        config.sections.push(section);
        config.process_refs.push(process.reference());
        config.processes.push(process);
        config.compound_refs.push(compound.reference());
        config.compounds.push(compound);
        (config, ids.0, ids.1, ids.2)
    }

    #[test]
    fn linking_updates_both_sides() {
        let (mut config, section_id, process_id, compound_id) = sample();

        assert!(config.link_section_process(section_id, process_id));
        assert!(!config.link_section_process(section_id, process_id));
        assert!(config.link_compound_process(compound_id, process_id, None));

        let process = config.process(process_id).unwrap();
        assert_eq!(process.sections, vec!["CM".to_string()]);
        assert_eq!(process.compounds, vec!["Prepare".to_string()]);
        assert_eq!(config.section(section_id).unwrap().process_refs.len(), 1);

        let detached = config.detach_process(process_id);
        assert_eq!(detached.sections, vec![section_id]);
        assert_eq!(detached.compounds, vec![compound_id]);
        assert!(config.section(section_id).unwrap().process_refs.is_empty());
        assert!(config.process(process_id).unwrap().sections.is_empty());
    }

    #[test]
    fn unlinking_keeps_a_name_another_owner_still_uses() {
        let (mut config, _, process_id, _) = sample();
        let mut first = SectionConfiguration::new(Uuid::new_v4(), "A");
        let mut second = SectionConfiguration::new(Uuid::new_v4(), "B");
        let first_jobs = SectionConfiguration::new(Uuid::new_v4(), "Jobs");
        let second_jobs = SectionConfiguration::new(Uuid::new_v4(), "Jobs");
        let (first_jobs_id, second_jobs_id) = (first_jobs.id, second_jobs.id);
        first.sections.push(first_jobs);
        second.sections.push(second_jobs);
        config.sections.extend([first, second]);

        assert!(config.link_section_process(first_jobs_id, process_id));
        assert!(config.link_section_process(second_jobs_id, process_id));
        assert!(config.unlink_section_process(first_jobs_id, process_id));
        assert_eq!(config.process(process_id).unwrap().sections, vec!["Jobs".to_string()]);

        assert!(config.unlink_section_process(second_jobs_id, process_id));
        assert!(config.process(process_id).unwrap().sections.is_empty());
    }

    #[test]
    fn has_mirror_ignores_blank_url() {
        let mut config = ProjectConfiguration::new(Uuid::new_v4());
        assert!(!config.has_mirror());
        config.repository_url = Some("   ".to_string());
        assert!(!config.has_mirror());
        config.repository_url = Some("https://git.example/flows.git".to_string());
        assert!(config.has_mirror());
    }
}
