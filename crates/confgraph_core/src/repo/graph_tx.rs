//! Write side of the graph store.
//!
//! # Invariants
//! - Every method runs inside the wrapped immediate transaction.
//! - Dropping a `GraphTransaction` without `commit` rolls back every write.
//! - Link rows are always replaced as a whole ordered list per owner.

use super::graph_repo::{DirectoryRow, FileRow, ProjectRecord, SectionRow};
use super::{StoreError, StoreResult};
use crate::model::filesystem::ProjectDirectory;
use crate::model::process::{CompoundConfiguration, ProcessConfiguration};
use crate::model::project::ProjectConfiguration;
use crate::model::{NodeId, ProjectId};
use rusqlite::{params, Transaction};

const PROJECT_SCOPED_TABLES: &[&str] = &[
    "project_files",
    "project_directories",
    "compounds",
    "processes",
    "sections",
];

/// One open write transaction against the graph store.
pub struct GraphTransaction<'conn> {
    tx: Transaction<'conn>,
}

impl<'conn> GraphTransaction<'conn> {
    pub(crate) fn new(tx: Transaction<'conn>) -> Self {
        Self { tx }
    }

    pub fn commit(self) -> StoreResult<()> {
        self.tx.commit()?;
        Ok(())
    }

    /// Inserts the project row unless it already exists.
    ///
    /// Returns `true` when a row was created.
    pub fn insert_project_if_missing(&self, record: &ProjectRecord) -> StoreResult<bool> {
        let changed = self.tx.execute(
            "INSERT INTO project_configurations (
                project_id,
                repository_url,
                default_target,
                common_json,
                header_json,
                pot_header_json,
                validation_report
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(project_id) DO NOTHING;",
            params![
                record.project_id.to_string(),
                record.repository_url.as_deref(),
                record.default_target.as_deref(),
                serde_json::to_string(&record.common)?,
                serde_json::to_string(&record.header)?,
                serde_json::to_string(&record.pot_header)?,
                record.validation_report.as_deref(),
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn update_project(&self, record: &ProjectRecord) -> StoreResult<()> {
        let changed = self.tx.execute(
            "UPDATE project_configurations
             SET repository_url = ?2,
                 default_target = ?3,
                 common_json = ?4,
                 header_json = ?5,
                 pot_header_json = ?6,
                 validation_report = ?7,
                 updated_at = (strftime('%s', 'now') * 1000)
             WHERE project_id = ?1;",
            params![
                record.project_id.to_string(),
                record.repository_url.as_deref(),
                record.default_target.as_deref(),
                serde_json::to_string(&record.common)?,
                serde_json::to_string(&record.header)?,
                serde_json::to_string(&record.pot_header)?,
                record.validation_report.as_deref(),
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::ProjectNotFound(record.project_id));
        }
        Ok(())
    }

    /// Deletes the project row; every owned row cascades.
    pub fn delete_project(&self, project_id: ProjectId) -> StoreResult<()> {
        let changed = self.tx.execute(
            "DELETE FROM project_configurations WHERE project_id = ?1;",
            [project_id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::ProjectNotFound(project_id));
        }
        Ok(())
    }

    pub fn upsert_section(&self, project_id: ProjectId, row: &SectionRow) -> StoreResult<()> {
        self.tx.execute(
            "INSERT INTO sections (id, project_id, source_id, name, parent_id, place)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                source_id = excluded.source_id,
                name = excluded.name,
                parent_id = excluded.parent_id,
                place = excluded.place;",
            params![
                row.id.to_string(),
                project_id.to_string(),
                row.source_id.map(|value| value.to_string()),
                row.name.as_str(),
                row.parent_id.map(|value| value.to_string()),
                row.place as i64,
            ],
        )?;
        Ok(())
    }

    /// Deletes a section; descendants and membership rows cascade.
    pub fn delete_section(&self, section_id: NodeId) -> StoreResult<()> {
        self.delete_by_id("sections", section_id)
    }

    pub fn upsert_process(
        &self,
        project_id: ProjectId,
        process: &ProcessConfiguration,
    ) -> StoreResult<()> {
        self.tx.execute(
            "INSERT INTO processes (
                id,
                project_id,
                source_id,
                name,
                path_to_file,
                execution_target,
                settings_json
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                source_id = excluded.source_id,
                name = excluded.name,
                path_to_file = excluded.path_to_file,
                execution_target = excluded.execution_target,
                settings_json = excluded.settings_json;",
            params![
                process.id.to_string(),
                project_id.to_string(),
                process.source_id.map(|value| value.to_string()),
                process.name.as_str(),
                process.path_to_file.as_str(),
                process.execution_target.as_deref(),
                serde_json::to_string(&process.settings)?,
            ],
        )?;
        Ok(())
    }

    pub fn delete_process(&self, process_id: NodeId) -> StoreResult<()> {
        self.delete_by_id("processes", process_id)
    }

    pub fn upsert_compound(
        &self,
        project_id: ProjectId,
        compound: &CompoundConfiguration,
    ) -> StoreResult<()> {
        self.tx.execute(
            "INSERT INTO compounds (id, project_id, source_id, name, refer_to_input)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(id) DO UPDATE SET
                source_id = excluded.source_id,
                name = excluded.name,
                refer_to_input = excluded.refer_to_input;",
            params![
                compound.id.to_string(),
                project_id.to_string(),
                compound.source_id.map(|value| value.to_string()),
                compound.name.as_str(),
                compound.refer_to_input.as_deref(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_compound(&self, compound_id: NodeId) -> StoreResult<()> {
        self.delete_by_id("compounds", compound_id)
    }

    pub fn replace_section_processes(
        &self,
        section_id: NodeId,
        process_ids: &[NodeId],
    ) -> StoreResult<()> {
        self.replace_links(
            "section_processes",
            "section_id",
            "process_id",
            section_id,
            process_ids,
        )
    }

    pub fn replace_section_compounds(
        &self,
        section_id: NodeId,
        compound_ids: &[NodeId],
    ) -> StoreResult<()> {
        self.replace_links(
            "section_compounds",
            "section_id",
            "compound_id",
            section_id,
            compound_ids,
        )
    }

    pub fn replace_compound_processes(
        &self,
        compound_id: NodeId,
        process_ids: &[NodeId],
    ) -> StoreResult<()> {
        self.replace_links(
            "compound_processes",
            "compound_id",
            "process_id",
            compound_id,
            process_ids,
        )
    }

    pub fn upsert_directory(&self, project_id: ProjectId, row: &DirectoryRow) -> StoreResult<()> {
        self.tx.execute(
            "INSERT INTO project_directories (id, project_id, name, parent_id)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                parent_id = excluded.parent_id;",
            params![
                row.id.to_string(),
                project_id.to_string(),
                row.name.as_str(),
                row.parent_id.map(|value| value.to_string()),
            ],
        )?;
        Ok(())
    }

    /// Deletes a directory; sub-directories and files cascade.
    pub fn delete_directory(&self, directory_id: NodeId) -> StoreResult<()> {
        self.delete_by_id("project_directories", directory_id)
    }

    pub fn upsert_file(&self, project_id: ProjectId, row: &FileRow) -> StoreResult<()> {
        self.tx.execute(
            "INSERT INTO project_files (id, project_id, name, directory_id, object_id, content_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                directory_id = excluded.directory_id,
                object_id = excluded.object_id,
                content_type = excluded.content_type;",
            params![
                row.id.to_string(),
                project_id.to_string(),
                row.name.as_str(),
                row.directory_id.map(|value| value.to_string()),
                row.object_id.as_str(),
                row.content_type.as_str(),
            ],
        )?;
        Ok(())
    }

    pub fn delete_file(&self, file_id: NodeId) -> StoreResult<()> {
        self.delete_by_id("project_files", file_id)
    }

    /// Replaces the whole graph of a project with `config`.
    ///
    /// `config` must be materialized: its `processes`/`compounds` lists are
    /// the rows written.
    pub fn replace_project_graph(&self, config: &ProjectConfiguration) -> StoreResult<()> {
        let project_id = config.project_id;
        let record = ProjectRecord::from_configuration(config);
        self.insert_project_if_missing(&record)?;
        self.update_project(&record)?;

        for table in PROJECT_SCOPED_TABLES {
            self.tx.execute(
                &format!("DELETE FROM {table} WHERE project_id = ?1;"),
                [project_id.to_string()],
            )?;
        }

        for process in &config.processes {
            self.upsert_process(project_id, process)?;
        }
        for compound in &config.compounds {
            self.upsert_compound(project_id, compound)?;
            let members: Vec<NodeId> = compound.process_refs.iter().map(|r| r.id).collect();
            self.replace_compound_processes(compound.id, &members)?;
        }
        for section in config.all_sections() {
            self.upsert_section(
                project_id,
                &SectionRow {
                    id: section.id,
                    source_id: section.source_id,
                    name: section.name.clone(),
                    parent_id: section.parent_section,
                    place: section.place,
                },
            )?;
            let processes: Vec<NodeId> = section.process_refs.iter().map(|r| r.id).collect();
            self.replace_section_processes(section.id, &processes)?;
            let compounds: Vec<NodeId> = section.compound_refs.iter().map(|r| r.id).collect();
            self.replace_section_compounds(section.id, &compounds)?;
        }

        for file in &config.files {
            self.upsert_file(project_id, &file_row(file))?;
        }
        for directory in &config.directories {
            self.write_directory_tree(project_id, directory)?;
        }
        Ok(())
    }

    fn write_directory_tree(
        &self,
        project_id: ProjectId,
        directory: &ProjectDirectory,
    ) -> StoreResult<()> {
        self.upsert_directory(
            project_id,
            &DirectoryRow {
                id: directory.id,
                name: directory.name.clone(),
                parent_id: directory.parent,
            },
        )?;
        for file in &directory.files {
            self.upsert_file(project_id, &file_row(file))?;
        }
        for child in &directory.directories {
            self.write_directory_tree(project_id, child)?;
        }
        Ok(())
    }

    fn replace_links(
        &self,
        table: &'static str,
        owner_column: &'static str,
        member_column: &'static str,
        owner_id: NodeId,
        member_ids: &[NodeId],
    ) -> StoreResult<()> {
        self.tx.execute(
            &format!("DELETE FROM {table} WHERE {owner_column} = ?1;"),
            [owner_id.to_string()],
        )?;
        let mut stmt = self.tx.prepare(&format!(
            "INSERT INTO {table} ({owner_column}, {member_column}, position) VALUES (?1, ?2, ?3);"
        ))?;
        for (position, member_id) in member_ids.iter().enumerate() {
            stmt.execute(params![
                owner_id.to_string(),
                member_id.to_string(),
                position as i64
            ])?;
        }
        Ok(())
    }

    fn delete_by_id(&self, table: &'static str, id: NodeId) -> StoreResult<()> {
        let changed = self
            .tx
            .execute(&format!("DELETE FROM {table} WHERE id = ?1;"), [id.to_string()])?;
        if changed == 0 {
            return Err(StoreError::RowNotFound { table, id });
        }
        Ok(())
    }
}

pub(crate) fn file_row(file: &crate::model::filesystem::ProjectFile) -> FileRow {
    FileRow {
        id: file.id,
        name: file.name.clone(),
        directory_id: file.directory,
        object_id: file.object_id.clone(),
        content_type: file.content_type.clone(),
    }
}
