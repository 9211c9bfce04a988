mod support;

use confgraph_core::cache::CacheKey;
use confgraph_core::repo::{SectionRow, StoreError};
use confgraph_core::service::project_service::ProjectServiceError;
use confgraph_core::sync::{MirrorRender, PublishOutcome, PublishState, SyncError};
use support::{Harness, RecordingMirror};
use uuid::Uuid;

const REMOTE: &str = "https://git.example.test/billing-flow.git";

#[test]
fn projects_without_mirror_skip_publishing() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    harness.graph.projects().unwrap().configuration(project).unwrap();

    let outcome = harness
        .graph
        .context()
        .unwrap()
        .synchronizer()
        .synchronize(project, |_| Ok(()), MirrorRender::Full)
        .unwrap();
    assert_eq!(outcome.publish, PublishState::Skipped);
    assert_eq!(harness.mirror.publish_count(), 0);
}

#[test]
fn setting_the_repository_publishes_the_tree() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    harness
        .graph
        .sections()
        .unwrap()
        .add_section(project, None, "CM", None)
        .unwrap();

    let config = harness
        .graph
        .projects()
        .unwrap()
        .set_repository_url(project, Some(REMOTE))
        .unwrap();
    assert_eq!(config.repository_url.as_deref(), Some(REMOTE));

    assert_eq!(harness.mirror.publish_count(), 1);
    let checkouts = harness.mirror.checkouts.lock().clone();
    assert_eq!(checkouts[0].0, REMOTE);
    let tree = harness.mirror.last_tree().unwrap();
    let document = String::from_utf8(tree["flow/Flow.json"].clone()).unwrap();
    assert!(document.contains("\"CM\""));
    assert_eq!(harness.scratch_entries(), 0);
}

#[test]
fn metadata_edits_keep_published_assets() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    harness
        .graph
        .projects()
        .unwrap()
        .set_repository_url(project, Some(REMOTE))
        .unwrap();
    harness
        .graph
        .files()
        .unwrap()
        .add_file(project, None, "rates.csv", b"code,rate\n")
        .unwrap();
    let tree = harness.mirror.last_tree().unwrap();
    assert_eq!(tree["flow/etalon_files/rates.csv"], b"code,rate\n".to_vec());

    harness
        .graph
        .sections()
        .unwrap()
        .add_section(project, None, "Billing System", None)
        .unwrap();
    let tree = harness.mirror.last_tree().unwrap();
    assert!(tree.contains_key("flow/etalon_files/rates.csv"));
    let document = String::from_utf8(tree["flow/Flow.json"].clone()).unwrap();
    assert!(document.contains("Billing System"));

    let unchanged = harness
        .graph
        .context()
        .unwrap()
        .synchronizer()
        .synchronize(project, |_| Ok(()), MirrorRender::DocumentOnly)
        .unwrap();
    assert_eq!(unchanged.publish, PublishState::Published(PublishOutcome::Unchanged));
}

#[test]
fn failed_publish_keeps_the_commit_and_reports_divergence() {
    let harness = Harness::with_mirror(RecordingMirror::failing_publish());
    let project = Uuid::new_v4();
    let projects = harness.graph.projects().unwrap();
    projects.configuration(project).unwrap();
    assert!(harness.cache.contains(&CacheKey::Configuration(project)));

    let err = projects.set_repository_url(project, Some(REMOTE)).unwrap_err();
    let ProjectServiceError::Sync(sync) = err else {
        panic!("expected a sync error, got {err:?}");
    };
    assert!(sync.is_committed());
    assert!(matches!(sync, SyncError::Publish { project_id, .. } if project_id == project));

    assert!(!harness.cache.contains(&CacheKey::Configuration(project)));
    let stored = projects.configuration(project).unwrap();
    assert_eq!(stored.repository_url.as_deref(), Some(REMOTE));
    assert_eq!(harness.scratch_entries(), 0);
}

#[test]
fn failed_persist_rolls_back_everything() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    harness.graph.projects().unwrap().configuration(project).unwrap();

    let row = SectionRow {
        id: Uuid::new_v4(),
        source_id: None,
        name: "CM".to_string(),
        parent_id: None,
        place: 0,
    };
    let err = harness
        .graph
        .context()
        .unwrap()
        .synchronizer()
        .synchronize(
            project,
            |tx| {
                tx.upsert_section(project, &row)?;
                Err(StoreError::InvalidData("rejected".to_string()))
            },
            MirrorRender::Full,
        )
        .unwrap_err();
    assert!(!err.is_committed());
    assert!(matches!(err, SyncError::Persist(StoreError::InvalidData(_))));

    let store = harness.graph.context().unwrap().store();
    assert_eq!(store.count_rows("sections", project).unwrap(), 0);
    assert_eq!(harness.mirror.publish_count(), 0);
}

#[test]
fn removing_a_project_deletes_graph_and_objects() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    harness
        .graph
        .sections()
        .unwrap()
        .add_section(project, None, "CM", None)
        .unwrap();
    harness
        .graph
        .files()
        .unwrap()
        .add_file(project, None, "rates.csv", b"x")
        .unwrap();

    let removed = harness.graph.projects().unwrap().remove_project(project).unwrap();
    assert_eq!(removed, 1);
    assert!(harness.objects.is_empty());
    let store = harness.graph.context().unwrap().store();
    assert!(!store.project_exists(project).unwrap());
    assert_eq!(store.count_rows("sections", project).unwrap(), 0);
}
