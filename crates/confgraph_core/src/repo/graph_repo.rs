//! Read side of the graph store and its row models.

use super::graph_tx::GraphTransaction;
use super::{StoreError, StoreResult};
use crate::db::migrations::latest_version;
use crate::model::process::{CompoundConfiguration, ProcessConfiguration, ProcessSettings};
use crate::model::project::{
    CommonConfiguration, HeaderConfiguration, PotHeaderConfiguration, ProjectConfiguration,
};
use crate::model::reference::Reference;
use crate::model::{NodeId, ProjectId};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use uuid::Uuid;

const REQUIRED_TABLES: &[&str] = &[
    "project_configurations",
    "sections",
    "processes",
    "compounds",
    "section_processes",
    "section_compounds",
    "compound_processes",
    "project_directories",
    "project_files",
];

const PROCESS_SELECT_SQL: &str = "SELECT
    id,
    source_id,
    name,
    path_to_file,
    execution_target,
    settings_json
FROM processes";

/// Project-level row: mirror settings, singletons and the last import report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectRecord {
    pub project_id: ProjectId,
    pub repository_url: Option<String>,
    pub default_target: Option<String>,
    pub common: CommonConfiguration,
    pub header: HeaderConfiguration,
    pub pot_header: PotHeaderConfiguration,
    pub validation_report: Option<String>,
}

impl ProjectRecord {
    pub fn from_configuration(config: &ProjectConfiguration) -> Self {
        Self {
            project_id: config.project_id,
            repository_url: config.repository_url.clone(),
            default_target: config.default_target.clone(),
            common: config.common.clone(),
            header: config.header.clone(),
            pot_header: config.pot_header.clone(),
            validation_report: config.validation_report.clone(),
        }
    }
}

/// Section row without children or memberships.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionRow {
    pub id: NodeId,
    pub source_id: Option<NodeId>,
    pub name: String,
    pub parent_id: Option<NodeId>,
    pub place: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRow {
    pub id: NodeId,
    pub name: String,
    pub parent_id: Option<NodeId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRow {
    pub id: NodeId,
    pub name: String,
    pub directory_id: Option<NodeId>,
    pub object_id: String,
    pub content_type: String,
}

/// One ordered membership row; `member` carries the member's current name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRow {
    pub owner_id: NodeId,
    pub member: Reference,
    pub position: usize,
}

/// Scope of an id/name projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefScope {
    /// Every member of the project regardless of nesting.
    Project,
    /// Members linked to one section.
    Section(NodeId),
    /// Members linked to one compound (processes only).
    Compound(NodeId),
}

/// SQLite-backed graph store.
#[derive(Clone, Copy)]
pub struct SqliteGraphStore<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteGraphStore<'conn> {
    /// Creates the store from a migrated connection.
    pub fn try_new(conn: &'conn Connection) -> StoreResult<Self> {
        ensure_graph_connection_ready(conn)?;
        Ok(Self { conn })
    }

    /// Starts one immediate write transaction.
    pub fn begin(&self) -> StoreResult<GraphTransaction<'conn>> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        Ok(GraphTransaction::new(tx))
    }

    pub fn project_record(&self, project_id: ProjectId) -> StoreResult<Option<ProjectRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                project_id,
                repository_url,
                default_target,
                common_json,
                header_json,
                pot_header_json,
                validation_report
             FROM project_configurations
             WHERE project_id = ?1;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_project_row(row)?));
        }
        Ok(None)
    }

    pub fn project_exists(&self, project_id: ProjectId) -> StoreResult<bool> {
        let exists: i64 = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM project_configurations WHERE project_id = ?1);",
            [project_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(exists == 1)
    }

    /// All section rows of a project ordered by parent then `place`.
    pub fn section_rows(&self, project_id: ProjectId) -> StoreResult<Vec<SectionRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_id, name, parent_id, place
             FROM sections
             WHERE project_id = ?1
             ORDER BY parent_id ASC, place ASC, id ASC;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(SectionRow {
                id: parse_uuid_column(row, "id", "sections.id")?,
                source_id: parse_optional_uuid_column(row, "source_id", "sections.source_id")?,
                name: row.get("name")?,
                parent_id: parse_optional_uuid_column(row, "parent_id", "sections.parent_id")?,
                place: parse_position(row.get("place")?, "sections.place")?,
            });
        }
        Ok(items)
    }

    /// Full process entities without denormalized membership names.
    pub fn process_rows(&self, project_id: ProjectId) -> StoreResult<Vec<ProcessConfiguration>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROCESS_SELECT_SQL}
             WHERE project_id = ?1
             ORDER BY name ASC, id ASC;"
        ))?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(parse_process_row(row)?);
        }
        Ok(items)
    }

    pub fn process_by_id(
        &self,
        project_id: ProjectId,
        process_id: NodeId,
    ) -> StoreResult<Option<ProcessConfiguration>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROCESS_SELECT_SQL}
             WHERE project_id = ?1 AND id = ?2;"
        ))?;
        let mut rows = stmt.query(params![project_id.to_string(), process_id.to_string()])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_process_row(row)?));
        }
        Ok(None)
    }

    pub fn process_by_name(
        &self,
        project_id: ProjectId,
        name: &str,
    ) -> StoreResult<Option<ProcessConfiguration>> {
        let mut stmt = self.conn.prepare(&format!(
            "{PROCESS_SELECT_SQL}
             WHERE project_id = ?1 AND name = ?2;"
        ))?;
        let mut rows = stmt.query(params![project_id.to_string(), name])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_process_row(row)?));
        }
        Ok(None)
    }

    /// Compound entities without process lists.
    pub fn compound_rows(&self, project_id: ProjectId) -> StoreResult<Vec<CompoundConfiguration>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, source_id, name, refer_to_input
             FROM compounds
             WHERE project_id = ?1
             ORDER BY name ASC, id ASC;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            let mut compound = CompoundConfiguration::new(
                parse_uuid_column(row, "id", "compounds.id")?,
                row.get::<_, String>("name")?,
            );
            compound.source_id =
                parse_optional_uuid_column(row, "source_id", "compounds.source_id")?;
            compound.refer_to_input = row.get("refer_to_input")?;
            items.push(compound);
        }
        Ok(items)
    }

    pub fn section_process_links(&self, project_id: ProjectId) -> StoreResult<Vec<LinkRow>> {
        self.links(
            "SELECT l.section_id AS owner_id, p.id AS member_id, p.name AS member_name, l.position AS position
             FROM section_processes l
             INNER JOIN processes p ON p.id = l.process_id
             WHERE p.project_id = ?1
             ORDER BY l.section_id ASC, l.position ASC;",
            project_id,
        )
    }

    pub fn section_compound_links(&self, project_id: ProjectId) -> StoreResult<Vec<LinkRow>> {
        self.links(
            "SELECT l.section_id AS owner_id, c.id AS member_id, c.name AS member_name, l.position AS position
             FROM section_compounds l
             INNER JOIN compounds c ON c.id = l.compound_id
             WHERE c.project_id = ?1
             ORDER BY l.section_id ASC, l.position ASC;",
            project_id,
        )
    }

    pub fn compound_process_links(&self, project_id: ProjectId) -> StoreResult<Vec<LinkRow>> {
        self.links(
            "SELECT l.compound_id AS owner_id, p.id AS member_id, p.name AS member_name, l.position AS position
             FROM compound_processes l
             INNER JOIN processes p ON p.id = l.process_id
             WHERE p.project_id = ?1
             ORDER BY l.compound_id ASC, l.position ASC;",
            project_id,
        )
    }

    /// `(id, name)` projection of processes in `scope`, without payloads.
    pub fn process_refs(&self, project_id: ProjectId, scope: RefScope) -> StoreResult<Vec<Reference>> {
        let (sql, owner) = match scope {
            RefScope::Project => (
                "SELECT id, name FROM processes
                 WHERE project_id = ?1
                 ORDER BY name ASC, id ASC;",
                None,
            ),
            RefScope::Section(section_id) => (
                "SELECT p.id AS id, p.name AS name
                 FROM section_processes l
                 INNER JOIN processes p ON p.id = l.process_id
                 WHERE p.project_id = ?1 AND l.section_id = ?2
                 ORDER BY l.position ASC;",
                Some(section_id),
            ),
            RefScope::Compound(compound_id) => (
                "SELECT p.id AS id, p.name AS name
                 FROM compound_processes l
                 INNER JOIN processes p ON p.id = l.process_id
                 WHERE p.project_id = ?1 AND l.compound_id = ?2
                 ORDER BY l.position ASC;",
                Some(compound_id),
            ),
        };
        self.references(sql, project_id, owner)
    }

    /// `(id, name)` projection of compounds in `scope`.
    ///
    /// `RefScope::Compound` has no compound members and yields an empty list.
    pub fn compound_refs(
        &self,
        project_id: ProjectId,
        scope: RefScope,
    ) -> StoreResult<Vec<Reference>> {
        match scope {
            RefScope::Project => self.references(
                "SELECT id, name FROM compounds
                 WHERE project_id = ?1
                 ORDER BY name ASC, id ASC;",
                project_id,
                None,
            ),
            RefScope::Section(section_id) => self.references(
                "SELECT c.id AS id, c.name AS name
                 FROM section_compounds l
                 INNER JOIN compounds c ON c.id = l.compound_id
                 WHERE c.project_id = ?1 AND l.section_id = ?2
                 ORDER BY l.position ASC;",
                project_id,
                Some(section_id),
            ),
            RefScope::Compound(_) => Ok(Vec::new()),
        }
    }

    /// Id-only projection of processes in `scope`.
    pub fn process_ids(&self, project_id: ProjectId, scope: RefScope) -> StoreResult<Vec<NodeId>> {
        Ok(self
            .process_refs(project_id, scope)?
            .into_iter()
            .map(|reference| reference.id)
            .collect())
    }

    pub fn directory_rows(&self, project_id: ProjectId) -> StoreResult<Vec<DirectoryRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, parent_id
             FROM project_directories
             WHERE project_id = ?1
             ORDER BY name ASC, id ASC;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(DirectoryRow {
                id: parse_uuid_column(row, "id", "project_directories.id")?,
                name: row.get("name")?,
                parent_id: parse_optional_uuid_column(
                    row,
                    "parent_id",
                    "project_directories.parent_id",
                )?,
            });
        }
        Ok(items)
    }

    pub fn file_rows(&self, project_id: ProjectId) -> StoreResult<Vec<FileRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, directory_id, object_id, content_type
             FROM project_files
             WHERE project_id = ?1
             ORDER BY name ASC, id ASC;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(FileRow {
                id: parse_uuid_column(row, "id", "project_files.id")?,
                name: row.get("name")?,
                directory_id: parse_optional_uuid_column(
                    row,
                    "directory_id",
                    "project_files.directory_id",
                )?,
                object_id: row.get("object_id")?,
                content_type: row.get("content_type")?,
            });
        }
        Ok(items)
    }

    /// Ids of every graph node owned by another project.
    ///
    /// Node ids are global keys, so an import must not hand these out again.
    pub fn foreign_node_ids(&self, project_id: ProjectId) -> StoreResult<HashSet<NodeId>> {
        let mut stmt = self.conn.prepare(
            "SELECT id FROM sections WHERE project_id <> ?1
             UNION SELECT id FROM processes WHERE project_id <> ?1
             UNION SELECT id FROM compounds WHERE project_id <> ?1
             UNION SELECT id FROM project_directories WHERE project_id <> ?1
             UNION SELECT id FROM project_files WHERE project_id <> ?1;",
        )?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut ids = HashSet::new();
        while let Some(row) = rows.next()? {
            ids.insert(parse_uuid_column(row, "id", "node.id")?);
        }
        Ok(ids)
    }

    /// Number of rows in `table` owned by the project; used by diagnostics
    /// and tests.
    pub fn count_rows(&self, table: &'static str, project_id: ProjectId) -> StoreResult<u64> {
        if !REQUIRED_TABLES.contains(&table) || !has_project_column(table) {
            return Err(StoreError::InvalidData(format!(
                "table `{table}` is not project scoped"
            )));
        }
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {table} WHERE project_id = ?1;"),
            [project_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn links(&self, sql: &str, project_id: ProjectId) -> StoreResult<Vec<LinkRow>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query([project_id.to_string()])?;
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(LinkRow {
                owner_id: parse_uuid_column(row, "owner_id", "link.owner_id")?,
                member: Reference::new(
                    parse_uuid_column(row, "member_id", "link.member_id")?,
                    row.get::<_, String>("member_name")?,
                ),
                position: parse_position(row.get("position")?, "link.position")?,
            });
        }
        Ok(items)
    }

    fn references(
        &self,
        sql: &str,
        project_id: ProjectId,
        owner: Option<NodeId>,
    ) -> StoreResult<Vec<Reference>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = match owner {
            Some(owner_id) => stmt.query(params![project_id.to_string(), owner_id.to_string()])?,
            None => stmt.query([project_id.to_string()])?,
        };
        let mut items = Vec::new();
        while let Some(row) = rows.next()? {
            items.push(Reference::new(
                parse_uuid_column(row, "id", "reference.id")?,
                row.get::<_, String>("name")?,
            ));
        }
        Ok(items)
    }
}

fn has_project_column(table: &str) -> bool {
    !matches!(
        table,
        "section_processes" | "section_compounds" | "compound_processes"
    )
}

fn parse_project_row(row: &Row<'_>) -> StoreResult<ProjectRecord> {
    Ok(ProjectRecord {
        project_id: parse_uuid_column(row, "project_id", "project_configurations.project_id")?,
        repository_url: row.get("repository_url")?,
        default_target: row.get("default_target")?,
        common: parse_json_column(row, "common_json")?,
        header: parse_json_column(row, "header_json")?,
        pot_header: parse_json_column(row, "pot_header_json")?,
        validation_report: row.get("validation_report")?,
    })
}

fn parse_process_row(row: &Row<'_>) -> StoreResult<ProcessConfiguration> {
    let mut process = ProcessConfiguration::new(
        parse_uuid_column(row, "id", "processes.id")?,
        row.get::<_, String>("name")?,
    );
    process.source_id = parse_optional_uuid_column(row, "source_id", "processes.source_id")?;
    process.path_to_file = row.get("path_to_file")?;
    process.execution_target = row.get("execution_target")?;
    process.settings = parse_json_column::<ProcessSettings>(row, "settings_json")?;
    Ok(process)
}

fn parse_json_column<T: DeserializeOwned>(row: &Row<'_>, column: &'static str) -> StoreResult<T> {
    let text: String = row.get(column)?;
    serde_json::from_str(&text)
        .map_err(|err| StoreError::InvalidData(format!("invalid json in {column}: {err}")))
}

fn parse_position(value: i64, column: &'static str) -> StoreResult<usize> {
    usize::try_from(value)
        .map_err(|_| StoreError::InvalidData(format!("negative value `{value}` in {column}")))
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> StoreResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| StoreError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

fn parse_uuid_column(row: &Row<'_>, name: &str, column: &'static str) -> StoreResult<Uuid> {
    let text: String = row.get(name)?;
    parse_uuid(&text, column)
}

fn parse_optional_uuid_column(
    row: &Row<'_>,
    name: &str,
    column: &'static str,
) -> StoreResult<Option<Uuid>> {
    row.get::<_, Option<String>>(name)?
        .map(|value| parse_uuid(&value, column))
        .transpose()
}

fn ensure_graph_connection_ready(conn: &Connection) -> StoreResult<()> {
    let expected_version = latest_version();
    let actual_version: u32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    if actual_version != expected_version {
        return Err(StoreError::UninitializedConnection {
            expected_version,
            actual_version,
        });
    }

    for &table in REQUIRED_TABLES {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1;",
                [table],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Err(StoreError::MissingRequiredTable(table));
        }
    }

    Ok(())
}
