//! Binary object store for managed project files.
//!
//! # Invariants
//! - Object ids are opaque and stable; renaming changes only the recorded
//!   relative path.
//! - `replace` keeps the object id.

use crate::model::ProjectId;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub type ObjectResult<T> = Result<T, ObjectStoreError>;

#[derive(Debug)]
pub enum ObjectStoreError {
    NotFound(String),
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Metadata {
        object_id: String,
        source: serde_json::Error,
    },
}

impl Display for ObjectStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(object_id) => write!(f, "stored object not found: {object_id}"),
            Self::Io { path, source } => {
                write!(f, "object store io failed at `{}`: {source}", path.display())
            }
            Self::Metadata { object_id, source } => {
                write!(f, "invalid metadata for object {object_id}: {source}")
            }
        }
    }
}

impl Error for ObjectStoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::NotFound(_) => None,
            Self::Io { source, .. } => Some(source),
            Self::Metadata { source, .. } => Some(source),
        }
    }
}

/// Descriptive metadata recorded with every object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMetadata {
    pub project_id: ProjectId,
    pub relative_path: String,
    pub content_type: String,
}

/// External binary storage keyed by `(project, relative path, type)`.
pub trait ObjectStore: Send + Sync {
    /// Stores a new object and returns its identifier.
    fn put(
        &self,
        project_id: ProjectId,
        relative_path: &str,
        content_type: &str,
        content: &[u8],
    ) -> ObjectResult<String>;
    fn get(&self, object_id: &str) -> ObjectResult<Vec<u8>>;
    fn metadata(&self, object_id: &str) -> ObjectResult<ObjectMetadata>;
    /// Overwrites the content of an existing object in place.
    fn replace(&self, object_id: &str, content: &[u8]) -> ObjectResult<()>;
    /// Records a new relative path for an existing object.
    fn rename(&self, object_id: &str, relative_path: &str) -> ObjectResult<()>;
    fn delete(&self, object_id: &str) -> ObjectResult<()>;
}

#[derive(Debug, Clone)]
struct StoredObject {
    metadata: ObjectMetadata,
    content: Vec<u8>,
}

/// In-process object store.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, StoredObject>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for MemoryObjectStore {
    fn put(
        &self,
        project_id: ProjectId,
        relative_path: &str,
        content_type: &str,
        content: &[u8],
    ) -> ObjectResult<String> {
        let object_id = Uuid::new_v4().to_string();
        self.objects.insert(
            object_id.clone(),
            StoredObject {
                metadata: ObjectMetadata {
                    project_id,
                    relative_path: relative_path.to_string(),
                    content_type: content_type.to_string(),
                },
                content: content.to_vec(),
            },
        );
        Ok(object_id)
    }

    fn get(&self, object_id: &str) -> ObjectResult<Vec<u8>> {
        self.objects
            .get(object_id)
            .map(|object| object.content.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(object_id.to_string()))
    }

    fn metadata(&self, object_id: &str) -> ObjectResult<ObjectMetadata> {
        self.objects
            .get(object_id)
            .map(|object| object.metadata.clone())
            .ok_or_else(|| ObjectStoreError::NotFound(object_id.to_string()))
    }

    fn replace(&self, object_id: &str, content: &[u8]) -> ObjectResult<()> {
        let mut object = self
            .objects
            .get_mut(object_id)
            .ok_or_else(|| ObjectStoreError::NotFound(object_id.to_string()))?;
        object.content = content.to_vec();
        Ok(())
    }

    fn rename(&self, object_id: &str, relative_path: &str) -> ObjectResult<()> {
        let mut object = self
            .objects
            .get_mut(object_id)
            .ok_or_else(|| ObjectStoreError::NotFound(object_id.to_string()))?;
        object.metadata.relative_path = relative_path.to_string();
        Ok(())
    }

    fn delete(&self, object_id: &str) -> ObjectResult<()> {
        self.objects
            .remove(object_id)
            .map(|_| ())
            .ok_or_else(|| ObjectStoreError::NotFound(object_id.to_string()))
    }
}

/// Directory-backed object store: `<root>/<id>.bin` plus `<root>/<id>.json`
/// metadata sidecar.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn open(root: impl Into<PathBuf>) -> ObjectResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|source| ObjectStoreError::Io {
            path: root.clone(),
            source,
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn content_path(&self, object_id: &str) -> ObjectResult<PathBuf> {
        self.object_path(object_id, "bin")
    }

    fn metadata_path(&self, object_id: &str) -> ObjectResult<PathBuf> {
        self.object_path(object_id, "json")
    }

    fn object_path(&self, object_id: &str, extension: &str) -> ObjectResult<PathBuf> {
        // Ids are generated here; anything else cannot name a stored object.
        if Uuid::parse_str(object_id).is_err() {
            return Err(ObjectStoreError::NotFound(object_id.to_string()));
        }
        Ok(self.root.join(format!("{object_id}.{extension}")))
    }

    fn write_metadata(&self, object_id: &str, metadata: &ObjectMetadata) -> ObjectResult<()> {
        let path = self.metadata_path(object_id)?;
        let bytes = serde_json::to_vec(metadata).map_err(|source| ObjectStoreError::Metadata {
            object_id: object_id.to_string(),
            source,
        })?;
        fs::write(&path, bytes).map_err(|source| ObjectStoreError::Io { path, source })
    }

    fn ensure_exists(&self, object_id: &str) -> ObjectResult<PathBuf> {
        let path = self.content_path(object_id)?;
        if !path.is_file() {
            return Err(ObjectStoreError::NotFound(object_id.to_string()));
        }
        Ok(path)
    }
}

impl ObjectStore for FsObjectStore {
    fn put(
        &self,
        project_id: ProjectId,
        relative_path: &str,
        content_type: &str,
        content: &[u8],
    ) -> ObjectResult<String> {
        let object_id = Uuid::new_v4().to_string();
        let path = self.content_path(&object_id)?;
        fs::write(&path, content).map_err(|source| ObjectStoreError::Io { path, source })?;
        self.write_metadata(
            &object_id,
            &ObjectMetadata {
                project_id,
                relative_path: relative_path.to_string(),
                content_type: content_type.to_string(),
            },
        )?;
        Ok(object_id)
    }

    fn get(&self, object_id: &str) -> ObjectResult<Vec<u8>> {
        let path = self.ensure_exists(object_id)?;
        fs::read(&path).map_err(|source| ObjectStoreError::Io { path, source })
    }

    fn metadata(&self, object_id: &str) -> ObjectResult<ObjectMetadata> {
        self.ensure_exists(object_id)?;
        let path = self.metadata_path(object_id)?;
        let bytes = fs::read(&path).map_err(|source| ObjectStoreError::Io { path, source })?;
        serde_json::from_slice(&bytes).map_err(|source| ObjectStoreError::Metadata {
            object_id: object_id.to_string(),
            source,
        })
    }

    fn replace(&self, object_id: &str, content: &[u8]) -> ObjectResult<()> {
        let path = self.ensure_exists(object_id)?;
        fs::write(&path, content).map_err(|source| ObjectStoreError::Io { path, source })
    }

    fn rename(&self, object_id: &str, relative_path: &str) -> ObjectResult<()> {
        let mut metadata = self.metadata(object_id)?;
        metadata.relative_path = relative_path.to_string();
        self.write_metadata(object_id, &metadata)
    }

    fn delete(&self, object_id: &str) -> ObjectResult<()> {
        let content = self.ensure_exists(object_id)?;
        fs::remove_file(&content).map_err(|source| ObjectStoreError::Io {
            path: content,
            source,
        })?;
        let metadata = self.metadata_path(object_id)?;
        match fs::remove_file(&metadata) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(ObjectStoreError::Io {
                path: metadata,
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FsObjectStore, MemoryObjectStore, ObjectStore};
    use uuid::Uuid;

    fn exercise(store: &dyn ObjectStore) {
        let project_id = Uuid::new_v4();
        let object_id = store
            .put(project_id, "data/etalon.json", "application/json", b"{}")
            .unwrap();

        store.replace(&object_id, b"[1]").unwrap();
        store.rename(&object_id, "moved/etalon.json").unwrap();

        assert_eq!(store.get(&object_id).unwrap(), b"[1]".to_vec());
        let metadata = store.metadata(&object_id).unwrap();
        assert_eq!(metadata.relative_path, "moved/etalon.json");
        assert_eq!(metadata.project_id, project_id);

        store.delete(&object_id).unwrap();
        assert!(store.get(&object_id).is_err());
    }

    #[test]
    fn memory_store_keeps_ids_across_replace_and_rename() {
        exercise(&MemoryObjectStore::new());
    }

    #[test]
    fn fs_store_keeps_ids_across_replace_and_rename() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&FsObjectStore::open(dir.path().join("objects")).unwrap());
    }
}
