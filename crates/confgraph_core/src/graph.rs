//! `ConfigGraph`: one graph store connection wired to its collaborators.
//!
//! Services borrow the connection, so they are created per call site and
//! dropped before the graph.

use crate::cache::{ConfigCache, InMemoryConfigCache};
use crate::db::{open_db, open_db_in_memory, DbError};
use crate::loader::LazyLoader;
use crate::repo::{SqliteGraphStore, StoreError};
use crate::service::compound_service::CompoundService;
use crate::service::directory_service::DirectoryService;
use crate::service::file_service::FileService;
use crate::service::import_service::ImportService;
use crate::service::process_service::ProcessService;
use crate::service::project_service::ProjectService;
use crate::service::section_service::SectionService;
use crate::service::{Collaborators, EngineContext, PublishOptions};
use crate::settings::EngineSettings;
use crate::sync::{FsObjectStore, GitMirror, MemoryObjectStore, NamedLocks, ObjectStoreError};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

#[derive(Debug)]
pub enum GraphError {
    Db(DbError),
    Store(StoreError),
    Object(ObjectStoreError),
}

impl Display for GraphError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Object(err) => write!(f, "{err}"),
        }
    }
}

impl Error for GraphError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Object(err) => Some(err),
        }
    }
}

impl From<DbError> for GraphError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<StoreError> for GraphError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

impl From<ObjectStoreError> for GraphError {
    fn from(value: ObjectStoreError) -> Self {
        Self::Object(value)
    }
}

pub type GraphResult<T> = Result<T, GraphError>;

pub struct ConfigGraph {
    conn: Connection,
    collaborators: Collaborators,
    publish: PublishOptions,
}

impl ConfigGraph {
    /// Opens the database and object store named by `settings`, publishing
    /// through the git client.
    pub fn open(settings: &EngineSettings) -> GraphResult<Self> {
        let conn = open_db(&settings.database_path)?;
        let collaborators = Collaborators {
            cache: Arc::new(InMemoryConfigCache::new()),
            object_store: Arc::new(FsObjectStore::open(&settings.object_store_dir)?),
            mirror: Arc::new(GitMirror::new(settings.mirror.identity())),
            locks: Arc::new(NamedLocks::new()),
        };
        Self::with_connection(conn, collaborators, settings.mirror.publish_options())
    }

    /// Fully in-process graph: in-memory database, cache and object store.
    pub fn in_memory() -> GraphResult<Self> {
        let collaborators = Collaborators {
            cache: Arc::new(InMemoryConfigCache::new()),
            object_store: Arc::new(MemoryObjectStore::new()),
            mirror: Arc::new(GitMirror::default()),
            locks: Arc::new(NamedLocks::new()),
        };
        Self::with_connection(open_db_in_memory()?, collaborators, PublishOptions::default())
    }

    /// Wires an already migrated connection; fails when its schema is stale.
    pub fn with_connection(
        conn: Connection,
        collaborators: Collaborators,
        publish: PublishOptions,
    ) -> GraphResult<Self> {
        SqliteGraphStore::try_new(&conn)?;
        Ok(Self {
            conn,
            collaborators,
            publish,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn cache(&self) -> &dyn ConfigCache {
        self.collaborators.cache.as_ref()
    }

    pub fn context(&self) -> GraphResult<EngineContext<'_>> {
        let store = SqliteGraphStore::try_new(&self.conn)?;
        Ok(EngineContext::new(
            store,
            self.collaborators.clone(),
            self.publish.clone(),
        ))
    }

    pub fn loader(&self) -> GraphResult<LazyLoader<'_>> {
        Ok(self.context()?.loader())
    }

    pub fn projects(&self) -> GraphResult<ProjectService<'_>> {
        Ok(ProjectService::new(self.context()?))
    }

    pub fn sections(&self) -> GraphResult<SectionService<'_>> {
        Ok(SectionService::new(self.context()?))
    }

    pub fn processes(&self) -> GraphResult<ProcessService<'_>> {
        Ok(ProcessService::new(self.context()?))
    }

    pub fn compounds(&self) -> GraphResult<CompoundService<'_>> {
        Ok(CompoundService::new(self.context()?))
    }

    pub fn directories(&self) -> GraphResult<DirectoryService<'_>> {
        Ok(DirectoryService::new(self.context()?))
    }

    pub fn files(&self) -> GraphResult<FileService<'_>> {
        Ok(FileService::new(self.context()?))
    }

    pub fn imports(&self) -> GraphResult<ImportService<'_>> {
        Ok(ImportService::new(self.context()?))
    }
}
