use confgraph_core::db::migrations::latest_version;
use confgraph_core::db::{open_db, open_db_in_memory, DbError};
use confgraph_core::SqliteGraphStore;
use rusqlite::Connection;

const GRAPH_TABLES: &[&str] = &[
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

#[test]
fn open_db_in_memory_applies_all_migrations() {
    let conn = open_db_in_memory().unwrap();

    assert_eq!(schema_version(&conn), latest_version());
    for table in GRAPH_TABLES {
        assert_table_exists(&conn, table);
    }
    assert!(SqliteGraphStore::try_new(&conn).is_ok());
}

#[test]
fn opening_same_database_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("confgraph.db");

    let conn_first = open_db(&path).unwrap();
    conn_first
        .execute(
            "INSERT INTO project_configurations (project_id) VALUES (?1);",
            ["7b0c6f1e-3f51-4c36-9a51-0d3c2f1b9a10"],
        )
        .unwrap();
    drop(conn_first);

    let conn_second = open_db(&path).unwrap();
    assert_eq!(schema_version(&conn_second), latest_version());
    let projects: i64 = conn_second
        .query_row("SELECT COUNT(*) FROM project_configurations;", [], |row| row.get(0))
        .unwrap();
    assert_eq!(projects, 1);
}

#[test]
fn opening_database_with_newer_schema_version_returns_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    match err {
        DbError::UnsupportedSchemaVersion {
            db_version,
            latest_supported,
        } => {
            assert_eq!(db_version, 999);
            assert_eq!(latest_supported, latest_version());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn failing_migration_names_its_step_and_keeps_the_old_version() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clash.db");

    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE project_directories (legacy TEXT);
         PRAGMA user_version = 1;",
    )
    .unwrap();
    drop(conn);

    let err = open_db(&path).unwrap_err();
    assert!(matches!(err, DbError::Migration { version: 2, name: "project_files", .. }));
    assert!(err.to_string().contains("project_files"));

    let conn = Connection::open(&path).unwrap();
    assert_eq!(schema_version(&conn), 1);
}

#[test]
fn store_rejects_unmigrated_connection() {
    let conn = Connection::open_in_memory().unwrap();
    assert!(SqliteGraphStore::try_new(&conn).is_err());
}

#[test]
fn sibling_section_names_are_unique_at_the_root() {
    let conn = open_db_in_memory().unwrap();
    let project = "7b0c6f1e-3f51-4c36-9a51-0d3c2f1b9a10";
    conn.execute(
        "INSERT INTO project_configurations (project_id) VALUES (?1);",
        [project],
    )
    .unwrap();
    let insert = "INSERT INTO sections (id, project_id, name, parent_id, place)
                  VALUES (?1, ?2, 'CM', NULL, ?3);";
    conn.execute(insert, rusqlite::params!["a0000000-0000-4000-8000-000000000001", project, 0])
        .unwrap();
    let duplicate = conn.execute(
        insert,
        rusqlite::params!["a0000000-0000-4000-8000-000000000002", project, 1],
    );
    assert!(duplicate.is_err());
}

fn schema_version(conn: &Connection) -> u32 {
    conn.query_row("PRAGMA user_version;", [], |row| row.get(0))
        .unwrap()
}

fn assert_table_exists(conn: &Connection, table_name: &str) {
    let exists: i64 = conn
        .query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = 'table' AND name = ?1
            );",
            [table_name],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(exists, 1, "table {table_name} does not exist");
}
