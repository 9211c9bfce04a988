mod support;

use confgraph_core::repo::RefScope;
use confgraph_core::service::compound_service::{CompoundDraft, CompoundServiceError, CompoundUpdate};
use confgraph_core::service::process_service::{ProcessDraft, ProcessServiceError, ProcessUpdate};
use confgraph_core::service::section_service::SectionServiceError;
use serde_json::json;
use support::Harness;
use uuid::Uuid;

fn draft(name: &str) -> ProcessDraft {
    ProcessDraft {
        name: name.to_string(),
        ..ProcessDraft::default()
    }
}

#[test]
fn duplicate_process_name_is_rejected_without_writing() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let processes = harness.graph.processes().unwrap();

    let created = processes.add_process(project, draft("SSH_BG")).unwrap();
    assert_eq!(created.path_to_file, "SSH_BG.json");

    let err = processes.add_process(project, draft(" SSH_BG ")).unwrap_err();
    assert!(matches!(err, ProcessServiceError::DuplicateProcess(ref name) if name == "SSH_BG"));

    let store = harness.graph.context().unwrap().store();
    assert_eq!(store.count_rows("processes", project).unwrap(), 1);
}

#[test]
fn process_paths_are_normalized_and_unique_ignoring_case() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let processes = harness.graph.processes().unwrap();

    let created = processes
        .add_process(
            project,
            ProcessDraft {
                name: "Loader".to_string(),
                path_to_file: Some("./jobs\\loader".to_string()),
                ..ProcessDraft::default()
            },
        )
        .unwrap();
    assert_eq!(created.path_to_file, "jobs/loader.json");

    let err = processes
        .add_process(
            project,
            ProcessDraft {
                name: "Other".to_string(),
                path_to_file: Some("JOBS/Loader.json".to_string()),
                ..ProcessDraft::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ProcessServiceError::DuplicatePath(_)));

    let err = processes
        .add_process(
            project,
            ProcessDraft {
                name: "Escaping".to_string(),
                path_to_file: Some("../outside.json".to_string()),
                ..ProcessDraft::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, ProcessServiceError::InvalidPath(_)));
}

#[test]
fn renaming_a_process_follows_its_default_path_and_refs() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let section = harness
        .graph
        .sections()
        .unwrap()
        .add_section(project, None, "CM", None)
        .unwrap();
    let processes = harness.graph.processes().unwrap();
    let created = processes
        .add_process(
            project,
            ProcessDraft {
                name: "SSH_BG".to_string(),
                execution_target: Some("ssh-gateway".to_string()),
                section: Some(section.id),
                ..ProcessDraft::default()
            },
        )
        .unwrap();

    let updated = processes
        .update_process(
            project,
            created.id,
            ProcessUpdate {
                name: Some("SSH_FG".to_string()),
                execution_target: Some(None),
                settings: Some(confgraph_core::model::process::ProcessSettings {
                    command: json!({ "ssh": "hostname" }),
                    ..Default::default()
                }),
                ..ProcessUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(updated.path_to_file, "SSH_FG.json");
    assert_eq!(updated.execution_target, None);

    let refs = processes.process_refs(project, RefScope::Section(section.id)).unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].name, "SSH_FG");
    let stored = processes.get_process(project, created.id).unwrap();
    assert_eq!(stored.settings.command, json!({ "ssh": "hostname" }));
    assert_eq!(stored.sections, vec!["CM".to_string()]);
}

#[test]
fn compound_members_keep_their_order() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let processes = harness.graph.processes().unwrap();
    let compounds = harness.graph.compounds().unwrap();
    let first = processes.add_process(project, draft("First")).unwrap();
    let second = processes.add_process(project, draft("Second")).unwrap();
    let third = processes.add_process(project, draft("Third")).unwrap();

    let compound = compounds
        .add_compound(
            project,
            CompoundDraft {
                name: "Nightly".to_string(),
                refer_to_input: Some("input.csv".to_string()),
                section: None,
            },
        )
        .unwrap();
    let err = compounds
        .add_compound(
            project,
            CompoundDraft {
                name: "Nightly".to_string(),
                ..CompoundDraft::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, CompoundServiceError::DuplicateCompound(ref name) if name == "Nightly"));
    assert_eq!(compounds.list_compounds(project).unwrap().len(), 1);

    compounds.add_process(project, compound.id, first.id, None).unwrap();
    compounds.add_process(project, compound.id, third.id, None).unwrap();
    let members = compounds.add_process(project, compound.id, second.id, Some(1)).unwrap();
    let order: Vec<&str> = members.iter().map(|member| member.name.as_str()).collect();
    assert_eq!(order, vec!["First", "Second", "Third"]);

    let err = compounds.add_process(project, compound.id, first.id, None).unwrap_err();
    assert!(matches!(err, CompoundServiceError::AlreadyMember { .. }));

    let members = compounds.move_process(project, compound.id, third.id, 0).unwrap();
    let order: Vec<&str> = members.iter().map(|member| member.name.as_str()).collect();
    assert_eq!(order, vec!["Third", "First", "Second"]);

    let stored = compounds.get_compound(project, compound.id).unwrap();
    assert_eq!(stored.process_refs, members);
    let scoped = processes.process_refs(project, RefScope::Compound(compound.id)).unwrap();
    assert_eq!(scoped, members);

    let members = compounds.remove_process(project, compound.id, first.id).unwrap();
    assert_eq!(members.len(), 2);
    let err = compounds.remove_process(project, compound.id, first.id).unwrap_err();
    assert!(matches!(err, CompoundServiceError::NotMember { .. }));
}

#[test]
fn deleting_a_process_detaches_it_from_owners() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();
    let processes = harness.graph.processes().unwrap();
    let compounds = harness.graph.compounds().unwrap();

    let cm = sections.add_section(project, None, "CM", None).unwrap();
    let ssh = processes.add_process(project, draft("SSH_BG")).unwrap();
    let keep = processes.add_process(project, draft("KEEP")).unwrap();
    sections.link_process(project, cm.id, ssh.id).unwrap();
    sections.link_process(project, cm.id, keep.id).unwrap();
    let err = sections.link_process(project, cm.id, ssh.id).unwrap_err();
    assert!(matches!(err, SectionServiceError::AlreadyLinked { .. }));

    let compound = compounds
        .add_compound(
            project,
            CompoundDraft {
                name: "Batch".to_string(),
                section: Some(cm.id),
                ..CompoundDraft::default()
            },
        )
        .unwrap();
    compounds.add_process(project, compound.id, ssh.id, None).unwrap();

    let detached = processes.delete_process(project, ssh.id).unwrap();
    assert_eq!(detached.sections, vec![cm.id]);
    assert_eq!(detached.compounds, vec![compound.id]);

    let section_refs = processes.process_refs(project, RefScope::Section(cm.id)).unwrap();
    assert_eq!(section_refs.len(), 1);
    assert_eq!(section_refs[0].id, keep.id);
    assert!(compounds.get_compound(project, compound.id).unwrap().process_refs.is_empty());
    assert!(matches!(
        processes.get_process(project, ssh.id).unwrap_err(),
        ProcessServiceError::ProcessNotFound(_)
    ));
}

#[test]
fn deleting_a_compound_keeps_its_processes() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();
    let processes = harness.graph.processes().unwrap();
    let compounds = harness.graph.compounds().unwrap();

    let cm = sections.add_section(project, None, "CM", None).unwrap();
    let member = processes.add_process(project, draft("Member")).unwrap();
    let compound = compounds
        .add_compound(
            project,
            CompoundDraft {
                name: "Batch".to_string(),
                section: Some(cm.id),
                ..CompoundDraft::default()
            },
        )
        .unwrap();
    compounds.add_process(project, compound.id, member.id, None).unwrap();

    let renamed = compounds
        .update_compound(
            project,
            compound.id,
            CompoundUpdate {
                name: Some("Batch 2".to_string()),
                ..CompoundUpdate::default()
            },
        )
        .unwrap();
    assert_eq!(sections.get_section(project, cm.id).unwrap().compound_refs[0].name, renamed.name);

    let detached = compounds.delete_compound(project, compound.id).unwrap();
    assert_eq!(detached.sections, vec![cm.id]);
    assert!(sections.get_section(project, cm.id).unwrap().compound_refs.is_empty());
    assert_eq!(processes.list_processes(project).unwrap().len(), 1);
    assert!(processes.get_process(project, member.id).unwrap().compounds.is_empty());
}

#[test]
fn section_compound_links_sync_both_sides() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();
    let compounds = harness.graph.compounds().unwrap();

    let cm = sections.add_section(project, None, "CM", None).unwrap();
    let compound = compounds
        .add_compound(
            project,
            CompoundDraft {
                name: "Batch".to_string(),
                ..CompoundDraft::default()
            },
        )
        .unwrap();

    let refs = sections.link_compound(project, cm.id, compound.id).unwrap();
    assert_eq!(refs.len(), 1);
    assert_eq!(refs[0].id, compound.id);
    assert_eq!(refs[0].name, "Batch");
    let err = sections.link_compound(project, cm.id, compound.id).unwrap_err();
    assert!(matches!(err, SectionServiceError::AlreadyLinked { .. }));

    assert_eq!(sections.get_section(project, cm.id).unwrap().compound_refs, refs);
    let loader = harness.graph.loader().unwrap();
    assert_eq!(loader.compound_refs(project, RefScope::Section(cm.id)).unwrap(), refs);
    assert_eq!(
        compounds.get_compound(project, compound.id).unwrap().sections,
        vec!["CM".to_string()]
    );

    let refs = sections.unlink_compound(project, cm.id, compound.id).unwrap();
    assert!(refs.is_empty());
    assert!(sections.get_section(project, cm.id).unwrap().compound_refs.is_empty());
    assert!(loader.compound_refs(project, RefScope::Section(cm.id)).unwrap().is_empty());
    assert!(compounds.get_compound(project, compound.id).unwrap().sections.is_empty());

    let err = sections.unlink_compound(project, cm.id, compound.id).unwrap_err();
    assert!(matches!(
        err,
        SectionServiceError::NotLinked { section, member } if section == cm.id && member == compound.id
    ));
}

#[test]
fn unlinking_a_process_from_a_section_updates_both_sides() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();
    let processes = harness.graph.processes().unwrap();

    let cm = sections.add_section(project, None, "CM", None).unwrap();
    let billing = sections.add_section(project, None, "Billing", None).unwrap();
    let ssh = processes.add_process(project, draft("SSH_BG")).unwrap();
    sections.link_process(project, cm.id, ssh.id).unwrap();
    sections.link_process(project, billing.id, ssh.id).unwrap();
    let mut owners = processes.get_process(project, ssh.id).unwrap().sections;
    owners.sort();
    assert_eq!(owners, vec!["Billing".to_string(), "CM".to_string()]);

    let refs = sections.unlink_process(project, cm.id, ssh.id).unwrap();
    assert!(refs.is_empty());
    assert!(processes.process_refs(project, RefScope::Section(cm.id)).unwrap().is_empty());
    assert_eq!(
        processes.process_refs(project, RefScope::Section(billing.id)).unwrap()[0].id,
        ssh.id
    );
    assert_eq!(
        processes.get_process(project, ssh.id).unwrap().sections,
        vec!["Billing".to_string()]
    );

    let err = sections.unlink_process(project, cm.id, ssh.id).unwrap_err();
    assert!(matches!(err, SectionServiceError::NotLinked { .. }));
}
