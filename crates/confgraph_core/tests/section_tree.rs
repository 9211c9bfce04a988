mod support;

use confgraph_core::service::section_service::SectionServiceError;
use support::Harness;
use uuid::Uuid;

fn names(sections: &[confgraph_core::model::section::SectionConfiguration]) -> Vec<(String, usize)> {
    sections
        .iter()
        .map(|section| (section.name.clone(), section.place))
        .collect()
}

#[test]
fn add_section_appends_or_inserts_and_renumbers() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();

    sections.add_section(project, None, "CM", None).unwrap();
    sections.add_section(project, None, "SQL", None).unwrap();
    let billing = sections.add_section(project, None, "  Billing  ", Some(1)).unwrap();
    assert_eq!(billing.name, "Billing");
    assert_eq!(billing.place, 1);

    let roots = sections.root_sections(project).unwrap();
    assert_eq!(
        names(&roots),
        vec![
            ("CM".to_string(), 0),
            ("Billing".to_string(), 1),
            ("SQL".to_string(), 2)
        ]
    );
}

#[test]
fn blank_and_duplicate_names_are_rejected() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();
    let cm = sections.add_section(project, None, "CM", None).unwrap();

    let err = sections.add_section(project, None, "   ", None).unwrap_err();
    assert!(matches!(err, SectionServiceError::InvalidName(_)));

    let err = sections.add_section(project, None, "CM", None).unwrap_err();
    assert!(matches!(
        err,
        SectionServiceError::DuplicateSection { parent: None, ref name } if name == "CM"
    ));

    // Same name under a different parent is fine.
    let nested = sections.add_section(project, Some(cm.id), "CM", None).unwrap();
    assert_eq!(nested.parent_section, Some(cm.id));
    assert_eq!(sections.root_sections(project).unwrap().len(), 1);
}

#[test]
fn move_section_reparents_subtree_and_renumbers_both_lists() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();
    let a = sections.add_section(project, None, "A", None).unwrap();
    let b = sections.add_section(project, None, "B", None).unwrap();
    let c = sections.add_section(project, None, "C", None).unwrap();
    let leaf = sections.add_section(project, Some(b.id), "Leaf", None).unwrap();

    let moved = sections.move_section(project, b.id, Some(c.id), None).unwrap();
    assert_eq!(moved.parent_section, Some(c.id));
    assert_eq!(moved.place, 0);

    let roots = sections.root_sections(project).unwrap();
    assert_eq!(names(&roots), vec![("A".to_string(), 0), ("C".to_string(), 1)]);
    let moved_leaf = sections.get_section(project, leaf.id).unwrap();
    assert_eq!(moved_leaf.parent_section, Some(b.id));
    let c_children = sections.list_children(project, Some(c.id)).unwrap();
    assert_eq!(c_children[0].id, b.id);
    assert_eq!(c_children[0].sections[0].id, leaf.id);

    // Back to the root, in front.
    sections.move_section(project, b.id, None, Some(0)).unwrap();
    let roots = sections.root_sections(project).unwrap();
    assert_eq!(
        names(&roots),
        vec![
            ("B".to_string(), 0),
            ("A".to_string(), 1),
            ("C".to_string(), 2)
        ]
    );
    assert_eq!(roots[1].id, a.id);
}

#[test]
fn move_into_own_subtree_is_rejected_and_tree_unchanged() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();
    let top = sections.add_section(project, None, "Top", None).unwrap();
    let middle = sections.add_section(project, Some(top.id), "Middle", None).unwrap();
    let bottom = sections.add_section(project, Some(middle.id), "Bottom", None).unwrap();
    let before = sections.root_sections(project).unwrap();

    let err = sections.move_section(project, top.id, Some(bottom.id), None).unwrap_err();
    assert!(matches!(
        err,
        SectionServiceError::CycleDetected { node, parent } if node == top.id && parent == bottom.id
    ));
    let err = sections.move_section(project, top.id, Some(top.id), None).unwrap_err();
    assert!(matches!(err, SectionServiceError::CycleDetected { .. }));

    assert_eq!(sections.root_sections(project).unwrap(), before);
}

#[test]
fn move_to_missing_parent_is_rejected() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();
    let lonely = sections.add_section(project, None, "Lonely", None).unwrap();

    let missing = Uuid::new_v4();
    let err = sections.move_section(project, lonely.id, Some(missing), None).unwrap_err();
    assert!(matches!(err, SectionServiceError::ParentNotFound(id) if id == missing));
}

#[test]
fn rename_keeps_place_and_checks_siblings() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();
    sections.add_section(project, None, "CM", None).unwrap();
    let sql = sections.add_section(project, None, "SQL", None).unwrap();

    let err = sections.rename_section(project, sql.id, "CM").unwrap_err();
    assert!(matches!(err, SectionServiceError::DuplicateSection { .. }));

    let renamed = sections.rename_section(project, sql.id, "Oracle").unwrap();
    assert_eq!(renamed.place, 1);
    assert_eq!(sections.get_section(project, sql.id).unwrap().name, "Oracle");
}

#[test]
fn delete_section_removes_subtree_and_closes_gap() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let sections = harness.graph.sections().unwrap();
    let a = sections.add_section(project, None, "A", None).unwrap();
    let b = sections.add_section(project, None, "B", None).unwrap();
    sections.add_section(project, None, "C", None).unwrap();
    let child = sections.add_section(project, Some(b.id), "Child", None).unwrap();
    let grandchild = sections.add_section(project, Some(child.id), "Grandchild", None).unwrap();

    let mut removed = sections.delete_section(project, b.id).unwrap();
    removed.sort();
    let mut expected = vec![b.id, child.id, grandchild.id];
    expected.sort();
    assert_eq!(removed, expected);

    let roots = sections.root_sections(project).unwrap();
    assert_eq!(names(&roots), vec![("A".to_string(), 0), ("C".to_string(), 1)]);
    assert_eq!(roots[0].id, a.id);
    assert!(matches!(
        sections.get_section(project, grandchild.id).unwrap_err(),
        SectionServiceError::SectionNotFound(_)
    ));

    let store = harness.graph.context().unwrap().store();
    assert_eq!(store.count_rows("sections", project).unwrap(), 2);
}
