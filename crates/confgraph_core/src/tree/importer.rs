//! Tree Importer: nested document plus companion files into a new generation.
//!
//! # Responsibility
//! - Parse the root document, the process files it references, unreferenced
//!   process files beside it, and the asset tree.
//! - Reconcile every node against the prior generation so identifiers
//!   survive re-imports.
//!
//! # Invariants
//! - Only an unreadable root document is fatal; every other problem becomes
//!   one diagnostic line and the node is skipped.
//! - No identifier is handed out twice within one run, and identifiers owned
//!   by other projects are never reused.

use super::document::{
    CompoundNode, ExecNode, FlowDocument, ProcessDocument, ProcessNode, SectionNode,
};
use super::parse::{normalize_relative_path, parse_with_fallback};
use crate::cache::restore_back_references;
use crate::model::filesystem::{content_type_for, ProjectDirectory, ProjectFile};
use crate::model::process::{CompoundConfiguration, ProcessConfiguration};
use crate::model::project::ProjectConfiguration;
use crate::model::section::SectionConfiguration;
use crate::model::{NodeId, ProjectId};
use crate::sync::object_store::{ObjectStore, ObjectStoreError};
use log::info;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;
use walkdir::WalkDir;

pub const DEFAULT_ASSETS_DIR: &str = "etalon_files";

/// Per-call importer settings.
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Assign fresh identifiers everywhere; document ids become `source_id`.
    pub migration: bool,
    /// Asset subtree name below the document directory.
    pub assets_dir: String,
    /// Identifiers owned by other projects.
    pub reserved_ids: HashSet<NodeId>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            migration: false,
            assets_dir: DEFAULT_ASSETS_DIR.to_string(),
            reserved_ids: HashSet::new(),
        }
    }
}

/// Result of one import run.
#[derive(Debug)]
pub struct ImportOutcome {
    /// New generation; its `validation_report` joins `diagnostics`.
    pub configuration: ProjectConfiguration,
    pub diagnostics: Vec<String>,
    /// Object ids of prior files that no longer exist in the new generation.
    pub orphaned_objects: Vec<String>,
}

#[derive(Debug)]
pub enum ImportError {
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    InvalidJson {
        path: PathBuf,
        source: serde_json::Error,
    },
    NotAnObject(PathBuf),
}

impl Display for ImportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreadable { path, source } => {
                write!(f, "cannot read root document `{}`: {source}", path.display())
            }
            Self::InvalidJson { path, source } => {
                write!(f, "root document `{}` is not valid JSON: {source}", path.display())
            }
            Self::NotAnObject(path) => {
                write!(f, "root document `{}` must be a JSON object", path.display())
            }
        }
    }
}

impl Error for ImportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Unreadable { source, .. } => Some(source),
            Self::InvalidJson { source, .. } => Some(source),
            Self::NotAnObject(_) => None,
        }
    }
}

pub struct TreeImporter<'a> {
    object_store: &'a dyn ObjectStore,
    options: &'a ImportOptions,
}

impl<'a> TreeImporter<'a> {
    pub fn new(object_store: &'a dyn ObjectStore, options: &'a ImportOptions) -> Self {
        Self {
            object_store,
            options,
        }
    }

    /// Imports `root_document` as the next generation of `project_id`.
    pub fn import(
        &self,
        project_id: ProjectId,
        root_document: &Path,
        prior: Option<&ProjectConfiguration>,
    ) -> Result<ImportOutcome, ImportError> {
        let started_at = Instant::now();
        let bytes = fs::read(root_document).map_err(|source| ImportError::Unreadable {
            path: root_document.to_path_buf(),
            source,
        })?;
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|source| ImportError::InvalidJson {
                path: root_document.to_path_buf(),
                source,
            })?;

        let mut diagnostics = Vec::new();
        let document = FlowDocument::from_value(&value, &mut diagnostics)
            .ok_or_else(|| ImportError::NotAnObject(root_document.to_path_buf()))?;

        let doc_dir = root_document
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let mut config = ProjectConfiguration::new(project_id);
        if let Some(prior) = prior {
            config.repository_url = prior.repository_url.clone();
        }
        config.common = document.common_configuration.clone();
        config.header = document.header_configuration.clone();
        config.pot_header = document.pot_header_configuration.clone();
        config.default_target = document
            .default_target
            .clone()
            .or_else(|| prior.and_then(|prior| prior.default_target.clone()));

        let mut context = ImportContext {
            options: self.options,
            object_store: self.object_store,
            doc_dir,
            prior: prior.map(PriorGeneration::snapshot).unwrap_or_default(),
            claimed: HashSet::new(),
            loaded_by_path: HashMap::new(),
            failed_paths: HashSet::new(),
            compounds_by_name: HashMap::new(),
            reused_objects: HashSet::new(),
            config,
            diagnostics,
        };

        context.import_sections(&document.sections, None, "");
        let root_name = root_document.file_name().map(|name| name.to_string_lossy().into_owned());
        context.import_unreferenced_processes(root_name.as_deref());
        context.import_assets();
        context.inherit_default_target();

        let outcome = context.finish();
        info!(
            "event=tree_import module=tree status=ok project={} sections={} processes={} diagnostics={} duration_ms={}",
            project_id,
            outcome.configuration.all_sections().len(),
            outcome.configuration.processes.len(),
            outcome.diagnostics.len(),
            started_at.elapsed().as_millis()
        );
        Ok(outcome)
    }
}

#[derive(Debug, Clone)]
struct PriorSection {
    id: NodeId,
    source_id: Option<NodeId>,
    name: String,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
struct PriorProcess {
    id: NodeId,
    source_id: Option<NodeId>,
    name: String,
    path: Option<String>,
}

#[derive(Debug, Clone)]
struct PriorCompound {
    id: NodeId,
    source_id: Option<NodeId>,
    name: String,
}

#[derive(Debug, Clone)]
struct PriorDirectory {
    id: NodeId,
    name: String,
    parent: Option<NodeId>,
}

#[derive(Debug, Clone)]
struct PriorFile {
    id: NodeId,
    name: String,
    directory: Option<NodeId>,
    object_id: String,
}

/// Flat per-run lookup lists taken from the prior generation.
#[derive(Debug, Default)]
struct PriorGeneration {
    sections: Vec<PriorSection>,
    processes: Vec<PriorProcess>,
    compounds: Vec<PriorCompound>,
    directories: Vec<PriorDirectory>,
    files: Vec<PriorFile>,
}

impl PriorGeneration {
    fn snapshot(config: &ProjectConfiguration) -> Self {
        let sections = config
            .all_sections()
            .into_iter()
            .map(|section| PriorSection {
                id: section.id,
                source_id: section.source_id,
                name: section.name.clone(),
                parent: section.parent_section,
            })
            .collect();
        let processes = config
            .processes
            .iter()
            .map(|process| PriorProcess {
                id: process.id,
                source_id: process.source_id,
                name: process.name.clone(),
                path: normalize_relative_path(&process.path_to_file),
            })
            .collect();
        let compounds = config
            .compounds
            .iter()
            .map(|compound| PriorCompound {
                id: compound.id,
                source_id: compound.source_id,
                name: compound.name.clone(),
            })
            .collect();
        let mut directories = Vec::new();
        flatten_directories(&config.directories, &mut directories);
        let files = config
            .all_files()
            .into_iter()
            .map(|file| PriorFile {
                id: file.id,
                name: file.name.clone(),
                directory: file.directory,
                object_id: file.object_id.clone(),
            })
            .collect();
        Self {
            sections,
            processes,
            compounds,
            directories,
            files,
        }
    }
}

fn flatten_directories(directories: &[ProjectDirectory], out: &mut Vec<PriorDirectory>) {
    for directory in directories {
        out.push(PriorDirectory {
            id: directory.id,
            name: directory.name.clone(),
            parent: directory.parent,
        });
        flatten_directories(&directory.directories, out);
    }
}

/// Identity chosen for one imported node.
struct Identity {
    id: NodeId,
    source_id: Option<NodeId>,
}

/// Matched prior node: `(id, source_id)`.
type PriorMatch = (NodeId, Option<NodeId>);

/// Mutable state threaded through one import run.
struct ImportContext<'a> {
    options: &'a ImportOptions,
    object_store: &'a dyn ObjectStore,
    doc_dir: PathBuf,
    prior: PriorGeneration,
    claimed: HashSet<NodeId>,
    loaded_by_path: HashMap<String, NodeId>,
    failed_paths: HashSet<String>,
    compounds_by_name: HashMap<String, NodeId>,
    reused_objects: HashSet<String>,
    config: ProjectConfiguration,
    diagnostics: Vec<String>,
}

impl ImportContext<'_> {
    fn is_free(&self, id: NodeId) -> bool {
        !self.claimed.contains(&id) && !self.options.reserved_ids.contains(&id)
    }

    fn reconcile(&mut self, doc_id: Option<NodeId>, matched: Option<PriorMatch>) -> Identity {
        let identity = if self.options.migration {
            Identity {
                id: self.fresh_id(),
                source_id: doc_id,
            }
        } else if let Some((id, source_id)) = matched {
            Identity {
                id,
                source_id: source_id.or(doc_id),
            }
        } else {
            let id = match doc_id {
                Some(candidate) if self.is_free(candidate) => candidate,
                _ => self.fresh_id(),
            };
            Identity {
                id,
                source_id: doc_id,
            }
        };
        self.claimed.insert(identity.id);
        identity
    }

    fn fresh_id(&self) -> NodeId {
        loop {
            let candidate = Uuid::new_v4();
            if self.is_free(candidate) {
                return candidate;
            }
        }
    }

    fn import_sections(&mut self, nodes: &[SectionNode], parent: Option<NodeId>, trail: &str) {
        let mut seen = HashSet::new();
        for node in nodes {
            let here = if trail.is_empty() {
                format!("section `{}`", node.name)
            } else {
                format!("{trail}/section `{}`", node.name)
            };
            if !seen.insert(node.name.clone()) {
                self.diagnostics
                    .push(format!("{here}: duplicate section name among siblings, skipped"));
                continue;
            }

            let matched = self.match_section(node, parent);
            let identity = self.reconcile(node.id, matched);
            let project_id = self.config.project_id;
            let Some(siblings) = self.config.sibling_sections_mut(parent) else {
                self.diagnostics.push(format!("{here}: parent section is missing"));
                continue;
            };
            let mut section = SectionConfiguration::new(identity.id, node.name.as_str());
            section.source_id = identity.source_id;
            section.parent_section = parent;
            section.project = Some(project_id);
            section.place = siblings.len();
            siblings.push(section);

            for exec in &node.processes {
                match exec {
                    ExecNode::Process(process_node) => {
                        if let Some(process_id) = self.import_process(process_node, &here) {
                            if !self.config.link_section_process(identity.id, process_id) {
                                self.diagnostics.push(format!(
                                    "{here}: process `{}` listed twice",
                                    process_node.path_to_file
                                ));
                            }
                        }
                    }
                    ExecNode::Compound(compound_node) => {
                        if let Some(compound_id) = self.import_compound(compound_node, &here) {
                            if !self.config.link_section_compound(identity.id, compound_id) {
                                self.diagnostics.push(format!(
                                    "{here}: compound `{}` listed twice",
                                    compound_node.name
                                ));
                            }
                        }
                    }
                }
            }

            self.import_sections(&node.sections, Some(identity.id), &here);
        }
    }

    fn match_section(&self, node: &SectionNode, parent: Option<NodeId>) -> Option<PriorMatch> {
        let free = |candidate: &&PriorSection| self.is_free(candidate.id);
        node.id
            .and_then(|doc_id| {
                self.prior
                    .sections
                    .iter()
                    .filter(free)
                    .find(|prior| prior.id == doc_id || prior.source_id == Some(doc_id))
            })
            .or_else(|| {
                self.prior
                    .sections
                    .iter()
                    .filter(free)
                    .find(|prior| prior.name == node.name && prior.parent == parent)
            })
            .map(|prior| (prior.id, prior.source_id))
    }

    /// Loads (or reuses within this run) the process a node points at.
    fn import_process(&mut self, node: &ProcessNode, trail: &str) -> Option<NodeId> {
        let path = node.path_to_file.as_str();
        if let Some(id) = self.loaded_by_path.get(path) {
            return Some(*id);
        }
        if self.failed_paths.contains(path) {
            return None;
        }
        let label = if trail.is_empty() {
            format!("process file `{path}`")
        } else {
            format!("{trail}: process file `{path}`")
        };
        let Some(document) = self.read_process_document(path, &label) else {
            self.failed_paths.insert(path.to_string());
            return None;
        };
        let name = document.name.trim().to_string();
        if name.is_empty() {
            self.diagnostics.push(format!("{label}: process without name"));
            self.failed_paths.insert(path.to_string());
            return None;
        }

        let doc_id = node.id.or(document.id);
        let matched = self.match_process(doc_id, path, &name);
        let identity = self.reconcile(doc_id, matched);
        let unique_name = self.unique_process_name(&name, &label);

        let mut process = ProcessConfiguration::new(identity.id, unique_name);
        process.source_id = identity.source_id;
        process.path_to_file = path.to_string();
        process.execution_target = document
            .execution_target
            .as_deref()
            .map(str::trim)
            .filter(|target| !target.is_empty())
            .map(str::to_string);
        process.settings = document.settings();
        process.project = Some(self.config.project_id);

        self.config.process_refs.push(process.reference());
        self.config.processes.push(process);
        self.loaded_by_path.insert(path.to_string(), identity.id);
        Some(identity.id)
    }

    fn read_process_document(&mut self, path: &str, label: &str) -> Option<ProcessDocument> {
        let full_path = self.doc_dir.join(path);
        let bytes = match fs::read(&full_path) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.diagnostics.push(format!("{label}: unreadable: {err}"));
                return None;
            }
        };
        let value: serde_json::Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(err) => {
                self.diagnostics.push(format!("{label}: invalid JSON: {err}"));
                return None;
            }
        };
        parse_with_fallback(&value, label, &mut self.diagnostics)
    }

    fn match_process(&self, doc_id: Option<NodeId>, path: &str, name: &str) -> Option<PriorMatch> {
        let free = |candidate: &&PriorProcess| self.is_free(candidate.id);
        doc_id
            .and_then(|doc_id| {
                self.prior
                    .processes
                    .iter()
                    .filter(free)
                    .find(|prior| prior.id == doc_id || prior.source_id == Some(doc_id))
            })
            .or_else(|| {
                self.prior
                    .processes
                    .iter()
                    .filter(free)
                    .find(|prior| prior.path.as_deref() == Some(path))
            })
            .or_else(|| {
                self.prior
                    .processes
                    .iter()
                    .filter(free)
                    .find(|prior| prior.name == name)
            })
            .map(|prior| (prior.id, prior.source_id))
    }

    fn unique_process_name(&mut self, name: &str, label: &str) -> String {
        if self.config.process_by_name(name).is_none() {
            return name.to_string();
        }
        let renamed = duplicate_name(name, |candidate| self.config.process_by_name(candidate).is_some());
        self.diagnostics.push(format!(
            "{label}: process name `{name}` already exists, renamed to `{renamed}`"
        ));
        renamed
    }

    fn import_compound(&mut self, node: &CompoundNode, trail: &str) -> Option<NodeId> {
        if let Some(id) = self.compounds_by_name.get(&node.name) {
            return Some(*id);
        }
        let here = format!("{trail}/compound `{}`", node.name);
        let matched = {
            let free = |candidate: &&PriorCompound| self.is_free(candidate.id);
            node.id
                .and_then(|doc_id| {
                    self.prior
                        .compounds
                        .iter()
                        .filter(free)
                        .find(|prior| prior.id == doc_id || prior.source_id == Some(doc_id))
                })
                .or_else(|| {
                    self.prior
                        .compounds
                        .iter()
                        .filter(free)
                        .find(|prior| prior.name == node.name)
                })
                .map(|prior| (prior.id, prior.source_id))
        };
        let identity = self.reconcile(node.id, matched);

        let mut compound = CompoundConfiguration::new(identity.id, node.name.as_str());
        compound.source_id = identity.source_id;
        compound.refer_to_input = node.refer_to_input.clone();
        compound.project = Some(self.config.project_id);
        self.config.compound_refs.push(compound.reference());
        self.config.compounds.push(compound);
        self.compounds_by_name.insert(node.name.clone(), identity.id);

        for member in &node.process_list {
            if let Some(process_id) = self.import_process(member, &here) {
                if !self.config.link_compound_process(identity.id, process_id, None) {
                    self.diagnostics.push(format!(
                        "{here}: process `{}` listed twice",
                        member.path_to_file
                    ));
                }
            }
        }
        Some(identity.id)
    }

    /// Loads top-level `*.json` files no section or compound referenced.
    fn import_unreferenced_processes(&mut self, root_name: Option<&str>) {
        let entries = match fs::read_dir(&self.doc_dir) {
            Ok(entries) => entries,
            Err(err) => {
                self.diagnostics.push(format!(
                    "document directory `{}`: unreadable: {err}",
                    self.doc_dir.display()
                ));
                return;
            }
        };
        let mut names: Vec<String> = entries
            .filter_map(Result::ok)
            .filter(|entry| entry.path().is_file())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| {
                Path::new(name)
                    .extension()
                    .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
            })
            .filter(|name| Some(name.as_str()) != root_name)
            .collect();
        names.sort();

        for name in names {
            if self.loaded_by_path.contains_key(&name) || self.failed_paths.contains(&name) {
                continue;
            }
            self.import_process(
                &ProcessNode {
                    id: None,
                    path_to_file: name,
                },
                "",
            );
        }
    }

    fn import_assets(&mut self) {
        let assets_root = self.doc_dir.join(&self.options.assets_dir);
        if !assets_root.is_dir() {
            return;
        }
        let mut directory_ids: HashMap<PathBuf, NodeId> = HashMap::new();
        let walker = WalkDir::new(&assets_root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    self.diagnostics.push(format!("asset tree: {err}"));
                    continue;
                }
            };
            let Ok(relative) = entry.path().strip_prefix(&assets_root) else {
                continue;
            };
            let relative = relative.to_path_buf();
            let name = entry.file_name().to_string_lossy().into_owned();
            let parent = relative
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf);
            let parent_id = match &parent {
                None => None,
                Some(parent_path) => match directory_ids.get(parent_path) {
                    Some(id) => Some(*id),
                    // Parent directory was skipped; its subtree goes with it.
                    None => continue,
                },
            };

            if entry.file_type().is_dir() {
                if let Some(id) = self.import_directory(&name, parent_id) {
                    directory_ids.insert(relative, id);
                }
            } else if entry.file_type().is_file() {
                self.import_file(entry.path(), &relative, &name, parent_id);
            }
        }
    }

    fn import_directory(&mut self, name: &str, parent: Option<NodeId>) -> Option<NodeId> {
        let matched = self
            .prior
            .directories
            .iter()
            .find(|prior| prior.name == name && prior.parent == parent && self.is_free(prior.id))
            .map(|prior| (prior.id, None));
        let identity = self.reconcile(None, matched);
        let project_id = self.config.project_id;
        let siblings = self.config.sibling_directories_mut(parent)?;
        let mut directory = ProjectDirectory::new(identity.id, name);
        directory.parent = parent;
        directory.project = Some(project_id);
        siblings.push(directory);
        Some(identity.id)
    }

    fn import_file(&mut self, path: &Path, relative: &Path, name: &str, directory: Option<NodeId>) {
        let relative_path = relative.to_string_lossy().replace('\\', "/");
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(err) => {
                self.diagnostics
                    .push(format!("asset `{relative_path}`: unreadable: {err}"));
                return;
            }
        };
        let prior = self
            .prior
            .files
            .iter()
            .find(|prior| prior.name == name && prior.directory == directory && self.is_free(prior.id))
            .cloned();
        let identity = self.reconcile(None, prior.as_ref().map(|prior| (prior.id, None)));
        let content_type = content_type_for(name);

        let object_id = match self.store_asset(prior.as_ref(), &relative_path, content_type, &content) {
            Ok(object_id) => object_id,
            Err(err) => {
                self.diagnostics
                    .push(format!("asset `{relative_path}`: object store failed: {err}"));
                return;
            }
        };
        self.reused_objects.insert(object_id.clone());

        let project_id = self.config.project_id;
        let Some(files) = self.config.sibling_files_mut(directory) else {
            return;
        };
        let mut file = ProjectFile::new(identity.id, name, object_id);
        file.directory = directory;
        file.project = Some(project_id);
        files.push(file);
    }

    fn store_asset(
        &self,
        prior: Option<&PriorFile>,
        relative_path: &str,
        content_type: &str,
        content: &[u8],
    ) -> Result<String, ObjectStoreError> {
        if let Some(prior) = prior {
            match self.object_store.replace(&prior.object_id, content) {
                Ok(()) => {
                    self.object_store.rename(&prior.object_id, relative_path)?;
                    return Ok(prior.object_id.clone());
                }
                Err(ObjectStoreError::NotFound(_)) => {}
                Err(err) => return Err(err),
            }
        }
        self.object_store
            .put(self.config.project_id, relative_path, content_type, content)
    }

    fn inherit_default_target(&mut self) {
        let Some(target) = self.config.default_target.clone() else {
            return;
        };
        for process in &mut self.config.processes {
            if process.execution_target.is_none() {
                process.execution_target = Some(target.clone());
            }
        }
    }

    fn finish(mut self) -> ImportOutcome {
        restore_back_references(&mut self.config);
        self.config.validation_report = if self.diagnostics.is_empty() {
            None
        } else {
            Some(self.diagnostics.join("\n"))
        };
        let orphaned_objects = self
            .prior
            .files
            .iter()
            .filter(|prior| !self.reused_objects.contains(&prior.object_id))
            .map(|prior| prior.object_id.clone())
            .collect();
        ImportOutcome {
            configuration: self.config,
            diagnostics: self.diagnostics,
            orphaned_objects,
        }
    }
}

/// Smallest `<name>_duplicateN` (N >= 1) for which `taken` is false.
pub fn duplicate_name(name: &str, taken: impl Fn(&str) -> bool) -> String {
    let mut suffix = 1usize;
    loop {
        let candidate = format!("{name}_duplicate{suffix}");
        if !taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::duplicate_name;

    #[test]
    fn duplicate_name_picks_smallest_free_suffix() {
        let taken = ["SSH_BG", "SSH_BG_duplicate1", "SSH_BG_duplicate3"];
        let renamed = duplicate_name("SSH_BG", |candidate| taken.contains(&candidate));
        assert_eq!(renamed, "SSH_BG_duplicate2");
    }
}
