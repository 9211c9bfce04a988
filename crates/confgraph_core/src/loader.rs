//! Lazy Loader: cache-backed read paths over the graph store.
//!
//! # Responsibility
//! - Serve the whole-graph skeleton, full entity lists and singletons per
//!   project, each cached under its own key.
//! - Serve lightweight `Reference` and id projections per scope without
//!   loading payloads.
//!
//! # Invariants
//! - Every value handed out from a cache read has its back-pointers restored.
//! - A payload that fails to decode is evicted and treated as a miss.
//! - The first access to an unknown project creates its default configuration.

use crate::cache::{restore_back_references, CacheKey, ConfigCache, ConfigurationCacheEntry};
use crate::model::filesystem::{ProjectDirectory, ProjectFile};
use crate::model::process::{push_name, CompoundConfiguration, ProcessConfiguration};
use crate::model::project::{
    CommonConfiguration, HeaderConfiguration, PotHeaderConfiguration, ProjectConfiguration,
};
use crate::model::reference::Reference;
use crate::model::section::SectionConfiguration;
use crate::model::{NodeId, ProjectId};
use crate::repo::{
    DirectoryRow, FileRow, LinkRow, ProjectRecord, RefScope, SectionRow, SqliteGraphStore,
    StoreResult,
};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Cache-backed accessor bound to one store connection.
pub struct LazyLoader<'conn> {
    store: SqliteGraphStore<'conn>,
    cache: Arc<dyn ConfigCache>,
}

impl<'conn> LazyLoader<'conn> {
    pub fn new(store: SqliteGraphStore<'conn>, cache: Arc<dyn ConfigCache>) -> Self {
        Self { store, cache }
    }

    pub fn store(&self) -> SqliteGraphStore<'conn> {
        self.store
    }

    /// Returns the project's graph skeleton with back-pointers restored.
    ///
    /// `processes`/`compounds` stay empty; use
    /// [`LazyLoader::materialized_configuration`] for the full view.
    pub fn configuration(&self, project_id: ProjectId) -> StoreResult<ProjectConfiguration> {
        let key = CacheKey::Configuration(project_id);
        if let Some(entry) = self.read_cached::<ConfigurationCacheEntry>(&key) {
            return Ok(entry.restore());
        }

        self.ensure_project(project_id)?;
        let entry = self.build_entry(project_id)?;
        self.write_cached(key, &entry);
        Ok(entry.restore())
    }

    /// Returns the skeleton plus full process and compound entities.
    pub fn materialized_configuration(
        &self,
        project_id: ProjectId,
    ) -> StoreResult<ProjectConfiguration> {
        let mut config = self.configuration(project_id)?;
        config.processes = self.processes(project_id)?;
        config.compounds = self.compounds(project_id)?;
        restore_back_references(&mut config);
        Ok(config)
    }

    /// Reads the whole materialized graph straight from the store.
    ///
    /// Used by writers that need the current generation regardless of what
    /// the cache holds. Does not create missing projects.
    pub fn load_uncached(&self, project_id: ProjectId) -> StoreResult<Option<ProjectConfiguration>> {
        if !self.store.project_exists(project_id)? {
            return Ok(None);
        }
        let mut config = self.build_entry(project_id)?.restore();
        config.processes = self.build_processes(project_id)?;
        config.compounds = self.build_compounds(project_id)?;
        restore_back_references(&mut config);
        Ok(Some(config))
    }

    /// Full process list with denormalized section/compound names.
    pub fn processes(&self, project_id: ProjectId) -> StoreResult<Vec<ProcessConfiguration>> {
        let mut processes = self.cached(CacheKey::Processes(project_id), || {
            self.build_processes(project_id)
        })?;
        for process in &mut processes {
            process.project = Some(project_id);
        }
        Ok(processes)
    }

    pub fn compounds(&self, project_id: ProjectId) -> StoreResult<Vec<CompoundConfiguration>> {
        let mut compounds = self.cached(CacheKey::Compounds(project_id), || {
            self.build_compounds(project_id)
        })?;
        for compound in &mut compounds {
            compound.project = Some(project_id);
        }
        Ok(compounds)
    }

    pub fn process_by_id(
        &self,
        project_id: ProjectId,
        process_id: NodeId,
    ) -> StoreResult<Option<ProcessConfiguration>> {
        let key = CacheKey::ProcessById {
            project_id,
            id: process_id,
        };
        let process = self.cached(key, || {
            Ok(self
                .processes(project_id)?
                .into_iter()
                .find(|process| process.id == process_id))
        })?;
        Ok(process.map(|mut process| {
            process.project = Some(project_id);
            process
        }))
    }

    pub fn process_by_name(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> StoreResult<Option<ProcessConfiguration>> {
        let key = CacheKey::ProcessByName {
            project_id,
            name: name.to_string(),
        };
        let process = self.cached(key, || {
            Ok(self
                .processes(project_id)?
                .into_iter()
                .find(|process| process.name == name))
        })?;
        Ok(process.map(|mut process| {
            process.project = Some(project_id);
            process
        }))
    }

    pub fn compound_by_id(
        &self,
        project_id: ProjectId,
        compound_id: NodeId,
    ) -> StoreResult<Option<CompoundConfiguration>> {
        Ok(self
            .compounds(project_id)?
            .into_iter()
            .find(|compound| compound.id == compound_id))
    }

    pub fn compound_by_name(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> StoreResult<Option<CompoundConfiguration>> {
        Ok(self
            .compounds(project_id)?
            .into_iter()
            .find(|compound| compound.name == name))
    }

    pub fn root_sections(&self, project_id: ProjectId) -> StoreResult<Vec<SectionConfiguration>> {
        Ok(self.configuration(project_id)?.sections)
    }

    pub fn section_by_id(
        &self,
        project_id: ProjectId,
        section_id: NodeId,
    ) -> StoreResult<Option<SectionConfiguration>> {
        Ok(self.configuration(project_id)?.section(section_id).cloned())
    }

    /// `(id, name)` projection of processes in `scope`.
    pub fn process_refs(&self, project_id: ProjectId, scope: RefScope) -> StoreResult<Vec<Reference>> {
        self.cached(CacheKey::ProcessRefs { project_id, scope }, || {
            self.store.process_refs(project_id, scope)
        })
    }

    /// `(id, name)` projection of compounds in `scope`.
    pub fn compound_refs(
        &self,
        project_id: ProjectId,
        scope: RefScope,
    ) -> StoreResult<Vec<Reference>> {
        self.cached(CacheKey::CompoundRefs { project_id, scope }, || {
            self.store.compound_refs(project_id, scope)
        })
    }

    pub fn process_ids(&self, project_id: ProjectId, scope: RefScope) -> StoreResult<Vec<NodeId>> {
        self.cached(CacheKey::ProcessIds { project_id, scope }, || {
            self.store.process_ids(project_id, scope)
        })
    }

    pub fn common_configuration(&self, project_id: ProjectId) -> StoreResult<CommonConfiguration> {
        Ok(self.configuration(project_id)?.common)
    }

    pub fn header_configuration(&self, project_id: ProjectId) -> StoreResult<HeaderConfiguration> {
        Ok(self.configuration(project_id)?.header)
    }

    pub fn pot_header_configuration(
        &self,
        project_id: ProjectId,
    ) -> StoreResult<PotHeaderConfiguration> {
        Ok(self.configuration(project_id)?.pot_header)
    }

    /// Newline-joined diagnostics of the last import, if any.
    pub fn validation_report(&self, project_id: ProjectId) -> StoreResult<Option<String>> {
        Ok(self.configuration(project_id)?.validation_report)
    }

    fn ensure_project(&self, project_id: ProjectId) -> StoreResult<()> {
        if self.store.project_exists(project_id)? {
            return Ok(());
        }
        let tx = self.store.begin()?;
        let record = ProjectRecord::from_configuration(&ProjectConfiguration::new(project_id));
        let created = tx.insert_project_if_missing(&record)?;
        tx.commit()?;
        if created {
            debug!("event=project_create module=loader status=ok project={project_id}");
        }
        Ok(())
    }

    fn build_entry(&self, project_id: ProjectId) -> StoreResult<ConfigurationCacheEntry> {
        let record = self
            .store
            .project_record(project_id)?
            .ok_or(crate::repo::StoreError::ProjectNotFound(project_id))?;

        let mut config = ProjectConfiguration::new(project_id);
        config.repository_url = record.repository_url;
        config.default_target = record.default_target;
        config.common = record.common;
        config.header = record.header;
        config.pot_header = record.pot_header;
        config.validation_report = record.validation_report;
        config.sections = build_section_forest(
            self.store.section_rows(project_id)?,
            self.store.section_process_links(project_id)?,
            self.store.section_compound_links(project_id)?,
        );
        config.process_refs = self.store.process_refs(project_id, RefScope::Project)?;
        config.compound_refs = self.store.compound_refs(project_id, RefScope::Project)?;
        let (directories, files) = build_directory_forest(
            self.store.directory_rows(project_id)?,
            self.store.file_rows(project_id)?,
        );
        config.directories = directories;
        config.files = files;
        Ok(ConfigurationCacheEntry::from_configuration(&config))
    }

    fn build_processes(&self, project_id: ProjectId) -> StoreResult<Vec<ProcessConfiguration>> {
        let mut processes = self.store.process_rows(project_id)?;
        let section_names: HashMap<NodeId, String> = self
            .store
            .section_rows(project_id)?
            .into_iter()
            .map(|row| (row.id, row.name))
            .collect();
        let compound_names: HashMap<NodeId, String> = self
            .store
            .compound_rows(project_id)?
            .into_iter()
            .map(|compound| (compound.id, compound.name))
            .collect();
        let section_links = self.store.section_process_links(project_id)?;
        let compound_links = self.store.compound_process_links(project_id)?;

        for process in &mut processes {
            for link in section_links.iter().filter(|link| link.member.id == process.id) {
                if let Some(name) = section_names.get(&link.owner_id) {
                    push_name(&mut process.sections, name);
                }
            }
            for link in compound_links.iter().filter(|link| link.member.id == process.id) {
                if let Some(name) = compound_names.get(&link.owner_id) {
                    push_name(&mut process.compounds, name);
                }
            }
            process.project = Some(project_id);
        }
        Ok(processes)
    }

    fn build_compounds(&self, project_id: ProjectId) -> StoreResult<Vec<CompoundConfiguration>> {
        let mut compounds = self.store.compound_rows(project_id)?;
        let section_names: HashMap<NodeId, String> = self
            .store
            .section_rows(project_id)?
            .into_iter()
            .map(|row| (row.id, row.name))
            .collect();
        let member_links = group_links(self.store.compound_process_links(project_id)?);
        let section_links = self.store.section_compound_links(project_id)?;

        for compound in &mut compounds {
            compound.process_refs = member_links.get(&compound.id).cloned().unwrap_or_default();
            for link in section_links.iter().filter(|link| link.member.id == compound.id) {
                if let Some(name) = section_names.get(&link.owner_id) {
                    push_name(&mut compound.sections, name);
                }
            }
            compound.project = Some(project_id);
        }
        Ok(compounds)
    }

    fn cached<T, F>(&self, key: CacheKey, load: F) -> StoreResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> StoreResult<T>,
    {
        if let Some(value) = self.read_cached(&key) {
            return Ok(value);
        }
        let value = load()?;
        self.write_cached(key, &value);
        Ok(value)
    }

    fn read_cached<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let bytes = self.cache.get(key)?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                debug!(
                    "event=cache_read module=loader status=hit project={}",
                    key.project_id()
                );
                Some(value)
            }
            Err(err) => {
                warn!(
                    "event=cache_read module=loader status=error project={} error={err}",
                    key.project_id()
                );
                self.cache.evict(key);
                None
            }
        }
    }

    fn write_cached<T: Serialize>(&self, key: CacheKey, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.cache.put(key, bytes),
            Err(err) => warn!(
                "event=cache_write module=loader status=error project={} error={err}",
                key.project_id()
            ),
        }
    }
}

fn group_links(links: Vec<LinkRow>) -> HashMap<NodeId, Vec<Reference>> {
    let mut grouped: HashMap<NodeId, Vec<LinkRow>> = HashMap::new();
    for link in links {
        grouped.entry(link.owner_id).or_default().push(link);
    }
    grouped
        .into_iter()
        .map(|(owner, mut rows)| {
            rows.sort_by_key(|row| row.position);
            (owner, rows.into_iter().map(|row| row.member).collect())
        })
        .collect()
}

/// Assembles rows into the ordered forest; rows unreachable from the root are
/// dropped with a warning.
fn build_section_forest(
    rows: Vec<SectionRow>,
    process_links: Vec<LinkRow>,
    compound_links: Vec<LinkRow>,
) -> Vec<SectionConfiguration> {
    let total = rows.len();
    let mut by_parent: HashMap<Option<NodeId>, Vec<SectionRow>> = HashMap::new();
    for row in rows {
        by_parent.entry(row.parent_id).or_default().push(row);
    }
    for siblings in by_parent.values_mut() {
        siblings.sort_by_key(|row| row.place);
    }
    let mut process_links = group_links(process_links);
    let mut compound_links = group_links(compound_links);
    let mut built = 0usize;
    let forest = attach_sections(
        None,
        &mut by_parent,
        &mut process_links,
        &mut compound_links,
        &mut built,
    );
    if built != total {
        warn!(
            "event=section_forest module=loader status=error error=unreachable_rows count={}",
            total - built
        );
    }
    forest
}

fn attach_sections(
    parent: Option<NodeId>,
    by_parent: &mut HashMap<Option<NodeId>, Vec<SectionRow>>,
    process_links: &mut HashMap<NodeId, Vec<Reference>>,
    compound_links: &mut HashMap<NodeId, Vec<Reference>>,
    built: &mut usize,
) -> Vec<SectionConfiguration> {
    let Some(rows) = by_parent.remove(&parent) else {
        return Vec::new();
    };
    rows.into_iter()
        .map(|row| {
            *built += 1;
            let mut section = SectionConfiguration::new(row.id, row.name);
            section.source_id = row.source_id;
            section.place = row.place;
            section.process_refs = process_links.remove(&row.id).unwrap_or_default();
            section.compound_refs = compound_links.remove(&row.id).unwrap_or_default();
            section.sections =
                attach_sections(Some(row.id), by_parent, process_links, compound_links, built);
            section
        })
        .collect()
}

fn build_directory_forest(
    rows: Vec<DirectoryRow>,
    files: Vec<FileRow>,
) -> (Vec<ProjectDirectory>, Vec<ProjectFile>) {
    let mut by_parent: HashMap<Option<NodeId>, Vec<DirectoryRow>> = HashMap::new();
    for row in rows {
        by_parent.entry(row.parent_id).or_default().push(row);
    }
    let mut files_by_directory: HashMap<Option<NodeId>, Vec<ProjectFile>> = HashMap::new();
    for row in files {
        let mut file = ProjectFile::new(row.id, row.name, row.object_id);
        file.content_type = row.content_type;
        files_by_directory.entry(row.directory_id).or_default().push(file);
    }
    let root_files = files_by_directory.remove(&None).unwrap_or_default();
    let directories = attach_directories(None, &mut by_parent, &mut files_by_directory);
    (directories, root_files)
}

fn attach_directories(
    parent: Option<NodeId>,
    by_parent: &mut HashMap<Option<NodeId>, Vec<DirectoryRow>>,
    files: &mut HashMap<Option<NodeId>, Vec<ProjectFile>>,
) -> Vec<ProjectDirectory> {
    let Some(rows) = by_parent.remove(&parent) else {
        return Vec::new();
    };
    rows.into_iter()
        .map(|row| {
            let mut directory = ProjectDirectory::new(row.id, row.name);
            directory.files = files.remove(&Some(row.id)).unwrap_or_default();
            directory.directories = attach_directories(Some(row.id), by_parent, files);
            directory
        })
        .collect()
}
