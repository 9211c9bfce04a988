mod support;

use confgraph_core::repo::RefScope;
use confgraph_core::tree::AssetMode;
use std::collections::HashSet;
use support::{read_tree, write_billing_flow, write_file, Harness};
use uuid::Uuid;

#[test]
fn import_builds_section_tree_and_resolves_aliases() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let document = write_billing_flow(dir.path());
    let project = Uuid::new_v4();

    let imports = harness.graph.imports().unwrap();
    let report = imports
        .import_document(project, &document, imports.options(false))
        .unwrap();
    assert!(report.diagnostics.is_empty(), "{:?}", report.diagnostics);
    assert_eq!(report.validation_report(), None);

    let sections = harness.graph.sections().unwrap();
    let roots = sections.root_sections(project).unwrap();
    let names: Vec<&str> = roots.iter().map(|section| section.name.as_str()).collect();
    assert_eq!(names, vec!["CM", "Billing System"]);
    assert_eq!(roots[0].place, 0);
    assert_eq!(roots[1].place, 1);

    let sql = &roots[1].sections[0];
    assert_eq!(sql.name, "SQL");
    assert_eq!(sql.place, 0);
    assert_eq!(sql.parent_section, Some(roots[1].id));

    let processes = harness.graph.processes().unwrap();
    let gparams = processes.process_by_name(project, "SQL_GPARAMS").unwrap().unwrap();
    let sql_refs = processes.process_refs(project, RefScope::Section(sql.id)).unwrap();
    assert_eq!(sql_refs.len(), 1);
    assert_eq!(sql_refs[0].id, gparams.id);
    assert_eq!(gparams.path_to_file, "SQL_GPARAMS.json");
    assert_eq!(gparams.sections, vec!["SQL".to_string()]);
}

#[test]
fn processes_without_target_inherit_the_default() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let document = write_billing_flow(dir.path());
    let project = Uuid::new_v4();

    let imports = harness.graph.imports().unwrap();
    imports
        .import_document(project, &document, imports.options(false))
        .unwrap();

    let processes = harness.graph.processes().unwrap();
    let gparams = processes.process_by_name(project, "SQL_GPARAMS").unwrap().unwrap();
    let ssh = processes.process_by_name(project, "SSH_BG").unwrap().unwrap();
    assert_eq!(gparams.execution_target.as_deref(), Some("billing-host"));
    assert_eq!(ssh.execution_target.as_deref(), Some("ssh-gateway"));
}

#[test]
fn reimport_keeps_identifiers_and_migration_replaces_them() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let document = write_billing_flow(dir.path());
    let project = Uuid::new_v4();
    let imports = harness.graph.imports().unwrap();

    let first = imports
        .import_document(project, &document, imports.options(false))
        .unwrap()
        .configuration;
    let second = imports
        .import_document(project, &document, imports.options(false))
        .unwrap()
        .configuration;
    let first_ids = node_ids(&first);
    assert_eq!(first_ids, node_ids(&second));

    let migrated = imports
        .import_document(project, &document, imports.options(true))
        .unwrap()
        .configuration;
    let migrated_ids = node_ids(&migrated);
    assert_eq!(migrated_ids.len(), first_ids.len());
    assert!(migrated_ids.is_disjoint(&first_ids));
}

#[test]
fn exported_tree_reimports_with_same_identity_and_order() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let document = write_billing_flow(dir.path());
    write_file(&dir.path().join("flow/etalon_files/data/rates.csv"), "code,rate\nA,1\n");
    let project = Uuid::new_v4();
    let imports = harness.graph.imports().unwrap();
    let original = imports
        .import_document(project, &document, imports.options(false))
        .unwrap()
        .configuration;

    let out = tempfile::tempdir().unwrap();
    let summary = harness
        .graph
        .projects()
        .unwrap()
        .export_to(project, out.path(), AssetMode::Render)
        .unwrap();
    assert_eq!(summary.process_files, 2);
    assert_eq!(summary.asset_files, 1);
    assert!(out.path().join("flow/etalon_files/data/rates.csv").is_file());

    let reimported = imports
        .import_document(project, &out.path().join("flow/Flow.json"), imports.options(false))
        .unwrap();
    assert!(reimported.diagnostics.is_empty(), "{:?}", reimported.diagnostics);
    let reimported = reimported.configuration;

    assert_eq!(node_ids(&original), node_ids(&reimported));
    for section in original.all_sections() {
        let twin = reimported.section(section.id).unwrap();
        assert_eq!(twin.name, section.name);
        assert_eq!(twin.place, section.place);
        assert_eq!(twin.parent_section, section.parent_section);
    }
    let original_file = original.all_files()[0].clone();
    let reimported_file = reimported.file(original_file.id).unwrap();
    assert_eq!(reimported_file.object_id, original_file.object_id);
    assert_eq!(harness.objects.len(), 1);
}

#[test]
fn export_is_byte_identical_across_runs() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let document = write_billing_flow(dir.path());
    let project = Uuid::new_v4();
    let imports = harness.graph.imports().unwrap();
    imports
        .import_document(project, &document, imports.options(false))
        .unwrap();

    let projects = harness.graph.projects().unwrap();
    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    projects.export_to(project, first.path(), AssetMode::Render).unwrap();
    projects.export_to(project, second.path(), AssetMode::Render).unwrap();

    let first_tree = read_tree(first.path());
    assert!(first_tree.contains_key("flow/Flow.json"));
    assert_eq!(first_tree, read_tree(second.path()));
}

#[test]
fn singleton_with_unknown_field_keeps_known_values() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    write_file(
        &dir.path().join("Flow.json"),
        r#"{ "commonConfiguration": { "retries": 3, "legacyFlag": true }, "sections": [] }"#,
    );
    let project = Uuid::new_v4();
    let imports = harness.graph.imports().unwrap();
    let report = imports
        .import_document(project, &dir.path().join("Flow.json"), imports.options(false))
        .unwrap();

    assert_eq!(report.configuration.common.retries, 3);
    assert!(report
        .diagnostics
        .iter()
        .any(|line| line.starts_with("commonConfiguration")));

    let stored = harness.graph.projects().unwrap().validation_report(project).unwrap();
    assert_eq!(stored.as_deref(), report.validation_report());
}

#[test]
fn colliding_process_names_are_renamed() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    write_file(
        &dir.path().join("Flow.json"),
        r#"{ "sections": [ { "name": "CM", "processes": [
            { "execType": "process", "pathToFile": "a/SSH_BG.json" },
            { "execType": "process", "pathToFile": "b/SSH_BG" }
        ] } ] }"#,
    );
    write_file(&dir.path().join("a/SSH_BG.json"), r#"{ "name": "SSH_BG" }"#);
    write_file(&dir.path().join("b/SSH_BG.json"), r#"{ "name": "SSH_BG" }"#);
    let project = Uuid::new_v4();
    let imports = harness.graph.imports().unwrap();
    let report = imports
        .import_document(project, &dir.path().join("Flow.json"), imports.options(false))
        .unwrap();

    let mut names: Vec<&str> = report
        .configuration
        .processes
        .iter()
        .map(|process| process.name.as_str())
        .collect();
    names.sort_unstable();
    assert_eq!(names, vec!["SSH_BG", "SSH_BG_duplicate1"]);
    assert_eq!(report.diagnostics.len(), 1);
    assert!(report.diagnostics[0].contains("SSH_BG_duplicate1"));
}

#[test]
fn duplicate_sibling_sections_keep_the_first() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    write_file(
        &dir.path().join("Flow.json"),
        r#"{ "sections": [ { "name": "CM" }, { "name": "CM" }, { "name": "Ops" } ] }"#,
    );
    let project = Uuid::new_v4();
    let imports = harness.graph.imports().unwrap();
    let report = imports
        .import_document(project, &dir.path().join("Flow.json"), imports.options(false))
        .unwrap();

    let names: Vec<&str> = report
        .configuration
        .sections
        .iter()
        .map(|section| section.name.as_str())
        .collect();
    assert_eq!(names, vec!["CM", "Ops"]);
    assert_eq!(report.configuration.sections[1].place, 1);
    assert_eq!(report.diagnostics.len(), 1);
}

#[test]
fn unreferenced_process_files_are_imported() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let document = write_billing_flow(dir.path());
    write_file(&dir.path().join("flow/ORPHAN.json"), r#"{ "name": "ORPHAN" }"#);
    let project = Uuid::new_v4();
    let imports = harness.graph.imports().unwrap();
    imports
        .import_document(project, &document, imports.options(false))
        .unwrap();

    let orphan = harness
        .graph
        .processes()
        .unwrap()
        .process_by_name(project, "ORPHAN")
        .unwrap()
        .unwrap();
    assert!(orphan.sections.is_empty());
    assert_eq!(orphan.execution_target.as_deref(), Some("billing-host"));
}

#[test]
fn same_document_in_two_projects_gets_distinct_identifiers() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let document = write_billing_flow(dir.path());
    let first = Uuid::new_v4();
    let imports = harness.graph.imports().unwrap();
    let original = imports
        .import_document(first, &document, imports.options(false))
        .unwrap()
        .configuration;

    let out = tempfile::tempdir().unwrap();
    harness
        .graph
        .projects()
        .unwrap()
        .export_to(first, out.path(), AssetMode::Render)
        .unwrap();

    let second = Uuid::new_v4();
    let copy = imports
        .import_document(second, &out.path().join("flow/Flow.json"), imports.options(false))
        .unwrap()
        .configuration;
    assert_eq!(copy.all_sections().len(), original.all_sections().len());
    assert!(node_ids(&copy).is_disjoint(&node_ids(&original)));
}

#[test]
fn dropped_assets_release_their_objects() {
    let harness = Harness::new();
    let dir = tempfile::tempdir().unwrap();
    let document = write_billing_flow(dir.path());
    let asset = dir.path().join("flow/etalon_files/rates.csv");
    write_file(&asset, "code,rate\n");
    let project = Uuid::new_v4();
    let imports = harness.graph.imports().unwrap();
    imports
        .import_document(project, &document, imports.options(false))
        .unwrap();
    assert_eq!(harness.objects.len(), 1);

    std::fs::remove_file(&asset).unwrap();
    let report = imports
        .import_document(project, &document, imports.options(false))
        .unwrap();
    assert_eq!(report.removed_objects, 1);
    assert!(harness.objects.is_empty());
}

fn node_ids(config: &confgraph_core::ProjectConfiguration) -> HashSet<Uuid> {
    let mut ids: HashSet<Uuid> = config.all_sections().iter().map(|section| section.id).collect();
    ids.extend(config.processes.iter().map(|process| process.id));
    ids.extend(config.compounds.iter().map(|compound| compound.id));
    ids.extend(config.all_files().iter().map(|file| file.id));
    ids
}
