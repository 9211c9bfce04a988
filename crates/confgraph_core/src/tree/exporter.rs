//! Tree Exporter: projection of a graph onto the mirror layout.
//!
//! # Invariants
//! - The source graph is only read.
//! - Rendering is deterministic: the same graph always yields the same bytes.
//! - An export either replaces the whole flow directory or leaves the target
//!   untouched.

use super::document::{
    CompoundNode, ExecNode, FlowDocument, ProcessDocument, ProcessNode, SectionNode,
};
use super::importer::DEFAULT_ASSETS_DIR;
use crate::model::filesystem::ProjectDirectory;
use crate::model::project::{join_relative, ProjectConfiguration};
use crate::model::section::SectionConfiguration;
use crate::model::NodeId;
use crate::sync::object_store::{ObjectStore, ObjectStoreError};
use log::{error, info};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

/// Names of the mirror's fixed locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLayout {
    pub flow_dir: String,
    pub root_document: String,
    pub assets_dir: String,
}

impl Default for MirrorLayout {
    fn default() -> Self {
        Self {
            flow_dir: "flow".to_string(),
            root_document: "Flow.json".to_string(),
            assets_dir: DEFAULT_ASSETS_DIR.to_string(),
        }
    }
}

impl MirrorLayout {
    pub fn root_document_path(&self, target_root: &Path) -> PathBuf {
        target_root.join(&self.flow_dir).join(&self.root_document)
    }
}

/// What happens to the asset subtree during an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetMode {
    /// Write every managed file from the object store.
    Render,
    /// Keep whatever asset subtree the target already holds.
    Keep,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub process_files: usize,
    pub asset_files: usize,
    pub kept_assets: bool,
}

#[derive(Debug)]
pub enum ExportError {
    /// A membership list references a process or compound that is not loaded.
    DanglingReference { owner: NodeId, member: NodeId },
    UnsafePath(String),
    PathCollision(String),
    Encode(serde_json::Error),
    Object {
        path: String,
        source: ObjectStoreError,
    },
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl Display for ExportError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingReference { owner, member } => {
                write!(f, "node {owner} references unknown member {member}")
            }
            Self::UnsafePath(path) => write!(f, "refusing to write outside the mirror: `{path}`"),
            Self::PathCollision(path) => write!(f, "two mirror files share the path `{path}`"),
            Self::Encode(err) => write!(f, "cannot encode export document: {err}"),
            Self::Object { path, source } => {
                write!(f, "cannot read stored object for `{path}`: {source}")
            }
            Self::Io { path, source } => {
                write!(f, "export io failed at `{}`: {source}", path.display())
            }
        }
    }
}

impl Error for ExportError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Encode(err) => Some(err),
            Self::Object { source, .. } => Some(source),
            Self::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}

pub struct TreeExporter {
    layout: MirrorLayout,
}

impl TreeExporter {
    pub fn new(layout: MirrorLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &MirrorLayout {
        &self.layout
    }

    /// Renders the root document of a materialized graph.
    pub fn render_document(&self, config: &ProjectConfiguration) -> Result<FlowDocument, ExportError> {
        let mut sections = Vec::with_capacity(config.sections.len());
        for section in ordered(&config.sections) {
            sections.push(render_section(config, section)?);
        }
        Ok(FlowDocument {
            common_configuration: config.common.clone(),
            header_configuration: config.header.clone(),
            pot_header_configuration: config.pot_header.clone(),
            default_target: config.default_target.clone(),
            sections,
        })
    }

    /// Every text file of the flow directory, keyed by relative path.
    pub fn render_files(
        &self,
        config: &ProjectConfiguration,
    ) -> Result<BTreeMap<String, Vec<u8>>, ExportError> {
        let mut files = BTreeMap::new();
        files.insert(
            self.layout.root_document.clone(),
            self.render_document(config)?.to_pretty_json()?,
        );
        for process in &config.processes {
            let path = safe_relative(&process.path_to_file)?;
            if files.contains_key(&path) {
                return Err(ExportError::PathCollision(path));
            }
            let bytes = ProcessDocument::from_process(process).to_pretty_json()?;
            files.insert(path, bytes);
        }
        Ok(files)
    }

    /// Writes the flow directory under `target_root`.
    ///
    /// Everything is staged beside the target first; the old flow directory
    /// is replaced only after every write succeeded.
    pub fn export(
        &self,
        config: &ProjectConfiguration,
        target_root: &Path,
        assets: AssetMode,
        object_store: &dyn ObjectStore,
    ) -> Result<ExportSummary, ExportError> {
        let started_at = Instant::now();
        let result = self.export_inner(config, target_root, assets, object_store);
        match &result {
            Ok(summary) => info!(
                "event=tree_export module=tree status=ok project={} process_files={} asset_files={} kept_assets={} duration_ms={}",
                config.project_id,
                summary.process_files,
                summary.asset_files,
                summary.kept_assets,
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=tree_export module=tree status=error project={} duration_ms={} error={err}",
                config.project_id,
                started_at.elapsed().as_millis()
            ),
        }
        result
    }

    fn export_inner(
        &self,
        config: &ProjectConfiguration,
        target_root: &Path,
        assets: AssetMode,
        object_store: &dyn ObjectStore,
    ) -> Result<ExportSummary, ExportError> {
        fs::create_dir_all(target_root).map_err(|source| io_error(target_root, source))?;
        let files = self.render_files(config)?;
        let assets_prefix = safe_relative(&self.layout.assets_dir)?;

        let staging = tempfile::Builder::new()
            .prefix(".confgraph-export-")
            .tempdir_in(target_root)
            .map_err(|source| io_error(target_root, source))?;
        let staged_flow = staging.path().join(&self.layout.flow_dir);
        fs::create_dir_all(&staged_flow).map_err(|source| io_error(&staged_flow, source))?;

        let mut summary = ExportSummary {
            process_files: files.len().saturating_sub(1),
            ..ExportSummary::default()
        };
        for (relative, bytes) in &files {
            write_file(&staged_flow.join(relative), bytes)?;
        }

        let target_flow = target_root.join(&self.layout.flow_dir);
        match assets {
            AssetMode::Render => {
                for file in config.all_files() {
                    let relative = safe_relative(&join_relative(
                        &assets_prefix,
                        &config.file_relative_path(file),
                    ))?;
                    if files.contains_key(&relative) {
                        return Err(ExportError::PathCollision(relative));
                    }
                    let content = object_store.get(&file.object_id).map_err(|source| {
                        ExportError::Object {
                            path: relative.clone(),
                            source,
                        }
                    })?;
                    write_file(&staged_flow.join(&relative), &content)?;
                    summary.asset_files += 1;
                }
                // Empty directories are part of the tree too.
                for path in directory_paths(config) {
                    let directory = staged_flow.join(join_relative(&assets_prefix, &path));
                    fs::create_dir_all(&directory).map_err(|source| io_error(&directory, source))?;
                }
            }
            AssetMode::Keep => {
                let existing = target_flow.join(&assets_prefix);
                if existing.is_dir() {
                    let staged_assets = staged_flow.join(&assets_prefix);
                    if let Some(parent) = staged_assets.parent() {
                        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
                    }
                    if staged_assets.exists() {
                        fs::remove_dir_all(&staged_assets)
                            .map_err(|source| io_error(&staged_assets, source))?;
                    }
                    fs::rename(&existing, &staged_assets)
                        .map_err(|source| io_error(&existing, source))?;
                    summary.kept_assets = true;
                }
            }
        }

        if target_flow.exists() {
            fs::remove_dir_all(&target_flow).map_err(|source| io_error(&target_flow, source))?;
        }
        fs::rename(&staged_flow, &target_flow).map_err(|source| io_error(&target_flow, source))?;
        Ok(summary)
    }
}

impl Default for TreeExporter {
    fn default() -> Self {
        Self::new(MirrorLayout::default())
    }
}

fn ordered(sections: &[SectionConfiguration]) -> Vec<&SectionConfiguration> {
    let mut sorted: Vec<&SectionConfiguration> = sections.iter().collect();
    sorted.sort_by_key(|section| section.place);
    sorted
}

fn render_section(
    config: &ProjectConfiguration,
    section: &SectionConfiguration,
) -> Result<SectionNode, ExportError> {
    let mut processes = Vec::new();
    for reference in &section.process_refs {
        processes.push(ExecNode::Process(process_node(config, section.id, reference.id)?));
    }
    for reference in &section.compound_refs {
        let compound = config
            .compound(reference.id)
            .ok_or(ExportError::DanglingReference {
                owner: section.id,
                member: reference.id,
            })?;
        let mut process_list = Vec::with_capacity(compound.process_refs.len());
        for member in &compound.process_refs {
            process_list.push(process_node(config, compound.id, member.id)?);
        }
        processes.push(ExecNode::Compound(CompoundNode {
            id: Some(compound.id),
            name: compound.name.clone(),
            refer_to_input: compound.refer_to_input.clone(),
            process_list,
        }));
    }

    let mut children = Vec::with_capacity(section.sections.len());
    for child in ordered(&section.sections) {
        children.push(render_section(config, child)?);
    }
    Ok(SectionNode {
        id: Some(section.id),
        name: section.name.clone(),
        place: Some(section.place),
        processes,
        sections: children,
    })
}

fn process_node(
    config: &ProjectConfiguration,
    owner: NodeId,
    process_id: NodeId,
) -> Result<ProcessNode, ExportError> {
    let process = config
        .process(process_id)
        .ok_or(ExportError::DanglingReference {
            owner,
            member: process_id,
        })?;
    Ok(ProcessNode {
        id: Some(process.id),
        path_to_file: process.path_to_file.clone(),
    })
}

fn directory_paths(config: &ProjectConfiguration) -> Vec<String> {
    let mut paths = Vec::new();
    let mut stack: Vec<(String, &ProjectDirectory)> = config
        .directories
        .iter()
        .map(|directory| (directory.name.clone(), directory))
        .collect();
    while let Some((path, directory)) = stack.pop() {
        for child in &directory.directories {
            stack.push((join_relative(&path, &child.name), child));
        }
        paths.push(path);
    }
    paths.sort();
    paths
}

/// Rejects absolute paths and parent traversals.
fn safe_relative(raw: &str) -> Result<String, ExportError> {
    let normalized = raw.replace('\\', "/");
    let path = Path::new(&normalized);
    let clean = path
        .components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
    if normalized.trim().is_empty() || !clean {
        return Err(ExportError::UnsafePath(raw.to_string()));
    }
    Ok(normalized.trim_start_matches("./").to_string())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| io_error(parent, source))?;
    }
    fs::write(path, bytes).map_err(|source| io_error(path, source))
}

fn io_error(path: &Path, source: std::io::Error) -> ExportError {
    ExportError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::{safe_relative, TreeExporter};
    use crate::model::process::ProcessConfiguration;
    use crate::model::project::ProjectConfiguration;
    use crate::model::section::SectionConfiguration;
    use uuid::Uuid;

    #[test]
    fn safe_relative_rejects_traversal() {
        assert!(safe_relative("../escape.json").is_err());
        assert!(safe_relative("/abs.json").is_err());
        assert_eq!(safe_relative("./sql/A.json").unwrap(), "sql/A.json");
    }

    #[test]
    fn render_document_orders_by_place_and_processes_first() {
        let mut config = ProjectConfiguration::new(Uuid::new_v4());
        let mut second = SectionConfiguration::new(Uuid::new_v4(), "Billing System");
        second.place = 1;
        let first = SectionConfiguration::new(Uuid::new_v4(), "CM");
        let first_id = first.id;
        config.sections.push(second);
        config.sections.push(first);
        let process = ProcessConfiguration::new(Uuid::new_v4(), "SSH_BG");
        let process_id = process.id;
        config.process_refs.push(process.reference());
        config.processes.push(process);
        assert!(config.link_section_process(first_id, process_id));

        let document = TreeExporter::default().render_document(&config).unwrap();

        assert_eq!(document.sections[0].name, "CM");
        assert_eq!(document.sections[1].name, "Billing System");
        assert_eq!(document.sections[0].processes.len(), 1);
    }
}
