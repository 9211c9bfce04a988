mod support;

use confgraph_core::model::project::{CommonConfiguration, HeaderConfiguration, PotHeaderConfiguration};
use confgraph_core::service::project_service::ProjectServiceError;
use std::collections::BTreeMap;
use support::Harness;
use uuid::Uuid;

#[test]
fn singletons_round_trip_through_the_store() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let projects = harness.graph.projects().unwrap();

    let common = CommonConfiguration {
        stop_on_failure: true,
        retries: 2,
        variables: BTreeMap::from([("ENV".to_string(), "prod".to_string())]),
    };
    projects.update_common(project, common.clone()).unwrap();
    projects
        .update_header(
            project,
            HeaderConfiguration {
                title: Some("Billing".to_string()),
                fields: BTreeMap::new(),
            },
        )
        .unwrap();
    projects
        .update_pot_header(
            project,
            PotHeaderConfiguration {
                enabled: true,
                columns: vec!["step".to_string(), "result".to_string()],
            },
        )
        .unwrap();
    let config = projects.set_default_target(project, Some(" billing-host ")).unwrap();
    assert_eq!(config.default_target.as_deref(), Some("billing-host"));

    let loader = harness.graph.loader().unwrap();
    assert_eq!(loader.common_configuration(project).unwrap(), common);
    assert_eq!(
        loader.header_configuration(project).unwrap().title.as_deref(),
        Some("Billing")
    );
    assert_eq!(loader.pot_header_configuration(project).unwrap().columns.len(), 2);

    let cleared = projects.set_default_target(project, None).unwrap();
    assert_eq!(cleared.default_target, None);
    assert_eq!(cleared.common, common);
}

#[test]
fn blank_repository_url_clears_the_mirror() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let projects = harness.graph.projects().unwrap();

    projects
        .set_repository_url(project, Some("https://git.example.test/flow.git"))
        .unwrap();
    let config = projects.set_repository_url(project, Some("   ")).unwrap();
    assert_eq!(config.repository_url, None);
    assert!(!config.has_mirror());
    assert_eq!(harness.mirror.publish_count(), 1);
}

#[test]
fn repository_url_that_looks_like_a_git_option_is_rejected() {
    let harness = Harness::new();
    let project = Uuid::new_v4();
    let projects = harness.graph.projects().unwrap();

    let err = projects
        .set_repository_url(project, Some(" --upload-pack=touch /tmp/flow;: "))
        .unwrap_err();
    assert!(matches!(err, ProjectServiceError::InvalidRepositoryUrl(ref url) if url.starts_with("--upload-pack")));
    assert_eq!(projects.configuration(project).unwrap().repository_url, None);
    assert_eq!(harness.mirror.publish_count(), 0);
    assert!(harness.mirror.checkouts.lock().is_empty());
}
