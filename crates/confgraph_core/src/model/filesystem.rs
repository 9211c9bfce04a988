//! Filesystem-shaped tree of managed project files.

use super::{NodeId, ProjectId};

/// Directory node; owns its sub-directories and files.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectDirectory {
    pub id: NodeId,
    pub name: String,
    /// Non-owning parent pointer; `None` for root directories.
    pub parent: Option<NodeId>,
    pub project: Option<ProjectId>,
    pub directories: Vec<ProjectDirectory>,
    pub files: Vec<ProjectFile>,
}

impl ProjectDirectory {
    pub fn new(id: NodeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            parent: None,
            project: None,
            directories: Vec::new(),
            files: Vec::new(),
        }
    }

    /// Returns whether `id` is this directory or one of its descendants.
    pub fn contains(&self, id: NodeId) -> bool {
        self.id == id || self.directories.iter().any(|child| child.contains(id))
    }
}

/// Managed file whose binary content lives in the object store.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectFile {
    pub id: NodeId,
    pub name: String,
    /// Non-owning pointer to the containing directory; `None` at root.
    pub directory: Option<NodeId>,
    pub project: Option<ProjectId>,
    /// Opaque identifier returned by the object store.
    pub object_id: String,
    pub content_type: String,
}

impl ProjectFile {
    pub fn new(id: NodeId, name: impl Into<String>, object_id: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id,
            content_type: content_type_for(&name).to_string(),
            name,
            directory: None,
            project: None,
            object_id: object_id.into(),
        }
    }
}

/// Guesses a content type from the file extension.
pub fn content_type_for(name: &str) -> &'static str {
    let extension = name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase());
    match extension.as_deref() {
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("txt") | Some("log") => "text/plain",
        Some("csv") => "text/csv",
        Some("sql") => "application/sql",
        Some("zip") => "application/zip",
        _ => "application/octet-stream",
    }
}

pub(crate) fn find_directory(
    directories: &[ProjectDirectory],
    id: NodeId,
) -> Option<&ProjectDirectory> {
    for directory in directories {
        if directory.id == id {
            return Some(directory);
        }
        if let Some(found) = find_directory(&directory.directories, id) {
            return Some(found);
        }
    }
    None
}

pub(crate) fn find_directory_mut(
    directories: &mut [ProjectDirectory],
    id: NodeId,
) -> Option<&mut ProjectDirectory> {
    for directory in directories.iter_mut() {
        if directory.id == id {
            return Some(directory);
        }
        if let Some(found) = find_directory_mut(&mut directory.directories, id) {
            return Some(found);
        }
    }
    None
}

pub(crate) fn collect_files<'a>(directory: &'a ProjectDirectory, out: &mut Vec<&'a ProjectFile>) {
    out.extend(directory.files.iter());
    for child in &directory.directories {
        collect_files(child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::content_type_for;

    #[test]
    fn content_type_uses_extension_case_insensitively() {
        assert_eq!(content_type_for("etalon.JSON"), "application/json");
        assert_eq!(content_type_for("dump.bin"), "application/octet-stream");
        assert_eq!(content_type_for("README"), "application/octet-stream");
    }
}
