//! Graph Store: relational system of record for every node type.
//!
//! # Responsibility
//! - Read rows and lightweight projections for one project's graph.
//! - Apply writes through `GraphTransaction`, one ACID transaction per
//!   synchronization.
//!
//! # Invariants
//! - Reads are deterministic: sections by `place`, links by `position`,
//!   processes/compounds/directories/files by name.
//! - Every write path runs inside a transaction; nothing writes through the
//!   bare connection.

use crate::db::DbError;
use crate::model::{NodeId, ProjectId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod graph_repo;
pub mod graph_tx;

pub use graph_repo::{
    DirectoryRow, FileRow, LinkRow, ProjectRecord, RefScope, SectionRow, SqliteGraphStore,
};
pub use graph_tx::GraphTransaction;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from graph store operations.
#[derive(Debug)]
pub enum StoreError {
    /// Underlying SQLite/bootstrap error.
    Db(DbError),
    /// Project configuration row does not exist.
    ProjectNotFound(ProjectId),
    /// A row targeted by an update/delete does not exist.
    RowNotFound { table: &'static str, id: NodeId },
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
    /// Persisted data cannot be converted into the model.
    InvalidData(String),
    /// A JSON payload column could not be encoded.
    Encode(serde_json::Error),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::ProjectNotFound(id) => write!(f, "project configuration not found: {id}"),
            Self::RowNotFound { table, id } => write!(f, "row not found in `{table}`: {id}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "graph store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "graph store requires table `{table}`")
            }
            Self::InvalidData(message) => write!(f, "invalid graph data: {message}"),
            Self::Encode(err) => write!(f, "failed to encode graph payload: {err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Encode(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encode(value)
    }
}
