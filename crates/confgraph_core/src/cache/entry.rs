//! Configuration Cache Entry: the wire shape of a graph held in the cache.
//!
//! # Invariants
//! - Holds the tree skeleton and `Reference` lists only: no full process or
//!   compound entities and no back-pointer of any kind.
//! - `restore` is the only way back to a `ProjectConfiguration`, and it always
//!   re-establishes every back-pointer against the restored root.

use crate::model::filesystem::{ProjectDirectory, ProjectFile};
use crate::model::project::{
    CommonConfiguration, HeaderConfiguration, PotHeaderConfiguration, ProjectConfiguration,
};
use crate::model::reference::Reference;
use crate::model::section::SectionConfiguration;
use crate::model::{NodeId, ProjectId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigurationCacheEntry {
    pub project_id: ProjectId,
    pub repository_url: Option<String>,
    pub default_target: Option<String>,
    pub common: CommonConfiguration,
    pub header: HeaderConfiguration,
    pub pot_header: PotHeaderConfiguration,
    pub sections: Vec<SectionSkeleton>,
    pub process_refs: Vec<Reference>,
    pub compound_refs: Vec<Reference>,
    pub directories: Vec<DirectorySkeleton>,
    pub files: Vec<FileSkeleton>,
    pub validation_report: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionSkeleton {
    pub id: NodeId,
    pub source_id: Option<NodeId>,
    pub name: String,
    pub place: usize,
    pub sections: Vec<SectionSkeleton>,
    pub process_refs: Vec<Reference>,
    pub compound_refs: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectorySkeleton {
    pub id: NodeId,
    pub name: String,
    pub directories: Vec<DirectorySkeleton>,
    pub files: Vec<FileSkeleton>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSkeleton {
    pub id: NodeId,
    pub name: String,
    pub object_id: String,
    pub content_type: String,
}

impl ConfigurationCacheEntry {
    /// Projects a configuration onto its cacheable skeleton.
    pub fn from_configuration(config: &ProjectConfiguration) -> Self {
        Self {
            project_id: config.project_id,
            repository_url: config.repository_url.clone(),
            default_target: config.default_target.clone(),
            common: config.common.clone(),
            header: config.header.clone(),
            pot_header: config.pot_header.clone(),
            sections: config.sections.iter().map(SectionSkeleton::from_section).collect(),
            process_refs: config.process_refs.clone(),
            compound_refs: config.compound_refs.clone(),
            directories: config
                .directories
                .iter()
                .map(DirectorySkeleton::from_directory)
                .collect(),
            files: config.files.iter().map(FileSkeleton::from_file).collect(),
            validation_report: config.validation_report.clone(),
        }
    }

    pub fn to_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Rebuilds the in-memory graph and restores every back-pointer.
    ///
    /// The returned configuration has empty `processes`/`compounds` lists;
    /// the loader materializes them separately.
    pub fn restore(self) -> ProjectConfiguration {
        let mut config = ProjectConfiguration::new(self.project_id);
        config.repository_url = self.repository_url;
        config.default_target = self.default_target;
        config.common = self.common;
        config.header = self.header;
        config.pot_header = self.pot_header;
        config.sections = self.sections.into_iter().map(SectionSkeleton::into_section).collect();
        config.process_refs = self.process_refs;
        config.compound_refs = self.compound_refs;
        config.directories = self
            .directories
            .into_iter()
            .map(DirectorySkeleton::into_directory)
            .collect();
        config.files = self.files.into_iter().map(FileSkeleton::into_file).collect();
        config.validation_report = self.validation_report;
        restore_back_references(&mut config);
        config
    }
}

impl SectionSkeleton {
    fn from_section(section: &SectionConfiguration) -> Self {
        Self {
            id: section.id,
            source_id: section.source_id,
            name: section.name.clone(),
            place: section.place,
            sections: section.sections.iter().map(Self::from_section).collect(),
            process_refs: section.process_refs.clone(),
            compound_refs: section.compound_refs.clone(),
        }
    }

    fn into_section(self) -> SectionConfiguration {
        let mut section = SectionConfiguration::new(self.id, self.name);
        section.source_id = self.source_id;
        section.place = self.place;
        section.sections = self.sections.into_iter().map(Self::into_section).collect();
        section.process_refs = self.process_refs;
        section.compound_refs = self.compound_refs;
        section
    }
}

impl DirectorySkeleton {
    fn from_directory(directory: &ProjectDirectory) -> Self {
        Self {
            id: directory.id,
            name: directory.name.clone(),
            directories: directory.directories.iter().map(Self::from_directory).collect(),
            files: directory.files.iter().map(FileSkeleton::from_file).collect(),
        }
    }

    fn into_directory(self) -> ProjectDirectory {
        let mut directory = ProjectDirectory::new(self.id, self.name);
        directory.directories = self.directories.into_iter().map(Self::into_directory).collect();
        directory.files = self.files.into_iter().map(FileSkeleton::into_file).collect();
        directory
    }
}

impl FileSkeleton {
    fn from_file(file: &ProjectFile) -> Self {
        Self {
            id: file.id,
            name: file.name.clone(),
            object_id: file.object_id.clone(),
            content_type: file.content_type.clone(),
        }
    }

    fn into_file(self) -> ProjectFile {
        let mut file = ProjectFile::new(self.id, self.name, self.object_id);
        file.content_type = self.content_type;
        file
    }
}

/// Resets every back-pointer reachable from `config` to the real parent and
/// to `config` itself.
pub fn restore_back_references(config: &mut ProjectConfiguration) {
    let project_id = config.project_id;
    restore_sections(&mut config.sections, None, project_id);
    for process in &mut config.processes {
        process.project = Some(project_id);
    }
    for compound in &mut config.compounds {
        compound.project = Some(project_id);
    }
    restore_files(&mut config.files, None, project_id);
    restore_directories(&mut config.directories, None, project_id);
}

fn restore_sections(
    sections: &mut [SectionConfiguration],
    parent: Option<NodeId>,
    project_id: ProjectId,
) {
    for section in sections.iter_mut() {
        section.parent_section = parent;
        section.project = Some(project_id);
        let id = section.id;
        restore_sections(&mut section.sections, Some(id), project_id);
    }
}

fn restore_directories(
    directories: &mut [ProjectDirectory],
    parent: Option<NodeId>,
    project_id: ProjectId,
) {
    for directory in directories.iter_mut() {
        directory.parent = parent;
        directory.project = Some(project_id);
        let id = directory.id;
        restore_files(&mut directory.files, Some(id), project_id);
        restore_directories(&mut directory.directories, Some(id), project_id);
    }
}

fn restore_files(files: &mut [ProjectFile], directory: Option<NodeId>, project_id: ProjectId) {
    for file in files.iter_mut() {
        file.directory = directory;
        file.project = Some(project_id);
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigurationCacheEntry;
    use crate::model::filesystem::{ProjectDirectory, ProjectFile};
    use crate::model::project::ProjectConfiguration;
    use crate::model::section::SectionConfiguration;
    use uuid::Uuid;

    #[test]
    fn restore_resets_back_pointers() {
        let mut config = ProjectConfiguration::new(Uuid::new_v4());
        let mut parent = SectionConfiguration::new(Uuid::new_v4(), "CM");
        let child = SectionConfiguration::new(Uuid::new_v4(), "Billing System");
        let child_id = child.id;
        parent.sections.push(child);
        let parent_id = parent.id;
        config.sections.push(parent);

        let mut directory = ProjectDirectory::new(Uuid::new_v4(), "data");
        directory
            .files
            .push(ProjectFile::new(Uuid::new_v4(), "etalon.json", "obj-1"));
        let directory_id = directory.id;
        config.directories.push(directory);

        let bytes = ConfigurationCacheEntry::from_configuration(&config)
            .to_bytes()
            .unwrap();
        let restored = ConfigurationCacheEntry::from_bytes(&bytes).unwrap().restore();

        let child = restored.section(child_id).unwrap();
        assert_eq!(child.parent_section, Some(parent_id));
        assert_eq!(child.project, Some(config.project_id));
        assert_eq!(restored.section(parent_id).unwrap().parent_section, None);
        let file = &restored.directory(directory_id).unwrap().files[0];
        assert_eq!(file.directory, Some(directory_id));
        assert_eq!(file.content_type, "application/json");
    }

    #[test]
    fn payload_carries_no_back_pointer_fields() {
        let mut config = ProjectConfiguration::new(Uuid::new_v4());
        let mut section = SectionConfiguration::new(Uuid::new_v4(), "CM");
        section.project = Some(config.project_id);
        config.sections.push(section);

        let bytes = ConfigurationCacheEntry::from_configuration(&config)
            .to_bytes()
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();

        assert!(!text.contains("parentSection"));
        assert!(!text.contains("\"project\""));
        assert!(!text.contains("\"processes\""));
    }
}
