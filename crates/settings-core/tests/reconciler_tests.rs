//! End-to-end runs over in-memory configuration and state

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use settings_core::{
    AdapterRegistry, ConfigResolver, Deployment, MemoryConfigSource, MemoryDirectAdapter,
    MemoryListAdapter, MemoryStore, Reconciler, RunMode,
};

fn deployment() -> Arc<Deployment> {
    Arc::new(
        Deployment::parse(
            r#"
concurrency: 2
configvalidators:
  - plugin: collaborators
    error: Admin access is not allowed for collaborators
    rule:
      kind: forbid_value
      field: permission
      values: [admin]
"#,
        )
        .unwrap(),
    )
}

fn store() -> Arc<MemoryStore> {
    Arc::new(
        MemoryStore::from_snapshot(&json!({
            "api": {
                "repository": {"has_issues": true, "has_wiki": true},
                "labels": [{"name": "bug", "color": "000"}, {"name": "stale", "color": "000"}]
            },
            "web": {
                "repository": {"has_issues": true},
                "labels": []
            },
            "admin": {"repository": {}}
        }))
        .unwrap(),
    )
}

fn source() -> MemoryConfigSource {
    MemoryConfigSource::new()
        .with_baseline(json!({
            "repository": {"has_issues": true, "has_wiki": false},
            "labels": [{"name": "bug", "color": "c00"}],
            "unknown_section": {"ignored": true}
        }))
        .with_repository(
            "web",
            json!({"collaborators": [{"username": "eve", "permission": "admin"}]}),
        )
}

async fn reconciler(store: Arc<MemoryStore>, mode: RunMode) -> Reconciler {
    let deployment = deployment();
    let resolver = ConfigResolver::load(deployment.clone(), Arc::new(source()), store.clone())
        .await
        .unwrap();

    let mut adapters = AdapterRegistry::new();
    adapters.register_direct(Arc::new(MemoryDirectAdapter::new(
        store.clone(),
        "repository",
        &deployment,
    )));
    for section in ["labels", "collaborators"] {
        adapters.register_list(Arc::new(MemoryListAdapter::new(
            store.clone(),
            section,
            &deployment,
        )));
    }
    Reconciler::new(Arc::new(resolver), adapters, mode)
}

#[tokio::test]
async fn dry_run_reports_plan_and_validator_errors() {
    let store = store();
    let before = store.snapshot().await;
    let reconciler = reconciler(store.clone(), RunMode::DryRun).await;

    let report = reconciler.run(["admin", "api", "web"]).await;

    assert!(report.dry_run);
    assert!(report.is_failure());
    assert_eq!(store.snapshot().await, before);

    let by_repo = report.by_repository();
    assert!(!by_repo.contains_key("admin"));

    let api: Vec<(&str, Option<&str>)> = by_repo["api"]
        .iter()
        .map(|c| (c.origin.as_str(), c.endpoint.as_deref()))
        .collect();
    assert_eq!(
        api,
        vec![
            ("labels", Some("PATCH /repos/api/labels/bug")),
            ("labels", Some("DELETE /repos/api/labels/stale")),
            ("repository", Some("PATCH /repos/api")),
        ]
    );

    let web_errors: Vec<&str> = by_repo["web"]
        .iter()
        .filter(|c| c.is_error())
        .filter_map(|c| c.message.as_deref())
        .collect();
    assert_eq!(web_errors, vec!["Admin access is not allowed for collaborators"]);
}

#[tokio::test]
async fn live_run_converges() {
    let store = store();
    let reconciler = reconciler(store.clone(), RunMode::Live).await;

    let first = reconciler.run(["api"]).await;
    assert!(!first.is_failure());
    assert_eq!(first.summary().deletions, 1);
    assert_eq!(
        store.section("api", "repository").await.unwrap(),
        Some(json!({"has_issues": true, "has_wiki": false, "name": "api"}))
    );

    let second = reconciler.run(["api"]).await;
    assert!(second.changes.is_empty(), "{second}");
}

#[tokio::test]
async fn live_validator_failure_is_scoped_to_the_resource() {
    let store = store();
    let reconciler = reconciler(store.clone(), RunMode::Live).await;

    let err = reconciler.run_repository("web").await.unwrap_err();
    assert!(err.is_validation());

    let report = reconciler.run(["web", "api"]).await;
    assert_eq!(report.errors().len(), 1);
    assert_eq!(report.errors()[0].repo, "web");
    assert!(report.by_repository().contains_key("api"));
}

#[tokio::test]
async fn unknown_repository_reports_error_for_direct_section() {
    let store = store();
    let reconciler = reconciler(store, RunMode::DryRun).await;

    let changes = reconciler.run_repository("ghost").await.unwrap();
    assert_eq!(changes.len(), 1);
    assert!(changes[0].is_error());
    assert_eq!(changes[0].origin, "repository");
}
