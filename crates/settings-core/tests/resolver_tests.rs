//! Layer resolution scenarios

use std::sync::Arc;

use pretty_assertions::assert_eq;
use rstest::rstest;
use serde_json::{Value, json};
use settings_core::{
    ConfigResolver, Deployment, EffectiveConfig, Error, MemoryConfigSource, Resolution,
    StaticDirectory,
};

async fn load(deployment: Deployment, source: MemoryConfigSource) -> ConfigResolver {
    ConfigResolver::load(
        Arc::new(deployment),
        Arc::new(source),
        Arc::new(StaticDirectory::new()),
    )
    .await
    .unwrap()
}

async fn resolved(resolver: &ConfigResolver, repo: &str) -> EffectiveConfig {
    match resolver.resolve(repo).await.unwrap() {
        Resolution::Resolved(config) => config,
        Resolution::Excluded => panic!("{repo} unexpectedly excluded"),
    }
}

#[tokio::test]
async fn three_layer_merge() {
    let source = MemoryConfigSource::new()
        .with_baseline(json!({"repository": {"has_issues": true}}))
        .with_group(
            "platform",
            json!({"suborgrepos": ["api"], "repository": {"has_wiki": false}}),
        )
        .with_repository("api", json!({"repository": {"has_issues": false}}));
    let resolver = load(Deployment::default(), source).await;

    let config = resolved(&resolver, "api").await;
    assert_eq!(config.group.as_deref(), Some("platform"));
    assert_eq!(
        config.tree,
        json!({"repository": {"has_issues": false, "has_wiki": false, "name": "api"}})
    );
}

#[tokio::test]
async fn control_sections_are_not_merged() {
    let source = MemoryConfigSource::new()
        .with_baseline(json!({
            "restrictedRepos": ["secret"],
            "configvalidators": [],
            "labels": [{"name": "bug"}]
        }))
        .with_repository("api", json!({"overridevalidators": [], "labels": [{"name": "docs"}]}));
    let resolver = load(Deployment::default(), source).await;

    let config = resolved(&resolver, "api").await;
    let sections: Vec<&str> = config.sections().map(|(name, _)| name).collect();
    assert_eq!(sections, vec!["labels", "repository"]);
    assert_eq!(
        config.section("labels"),
        Some(&json!([{"name": "bug"}, {"name": "docs"}]))
    );
}

#[rstest]
#[case("foo", true)]
#[case("my-repo-test", true)]
#[case("random", false)]
#[case("admin", false)]
#[tokio::test]
async fn include_scope(#[case] repo: &str, #[case] in_scope: bool) {
    let deployment = Deployment {
        restricted_repos: Some(json!({"include": ["foo", ".*-test$"]})),
        ..Deployment::default()
    };
    let resolver = load(deployment, MemoryConfigSource::new()).await;

    assert_eq!(resolver.is_in_scope(repo), in_scope);
    let resolution = resolver.resolve(repo).await.unwrap();
    assert_eq!(resolution == Resolution::Excluded, !in_scope);
}

#[tokio::test]
async fn baseline_restrictions_override_deployment() {
    let deployment = Deployment {
        restricted_repos: Some(json!(["api"])),
        ..Deployment::default()
    };
    let source = MemoryConfigSource::new().with_baseline(json!({"restrictedRepos": ["web"]}));
    let resolver = load(deployment, source).await;

    assert!(resolver.is_in_scope("api"));
    assert!(!resolver.is_in_scope("web"));
}

fn collaborators_guard() -> Deployment {
    Deployment::parse(
        r#"
configvalidators:
  - plugin: collaborators
    error: Admin access is not allowed for collaborators
    rule:
      kind: forbid_value
      field: permission
      values: [admin]
overridevalidators:
  - plugin: branches
    error: Required reviews cannot be lowered
    rule:
      kind: no_decrease
      field: protection.required_pull_request_reviews.required_approving_review_count
"#,
    )
    .unwrap()
}

#[tokio::test]
async fn config_validator_rejects_merged_section() {
    let source = MemoryConfigSource::new()
        .with_baseline(json!({"collaborators": [{"username": "alice", "permission": "push"}]}))
        .with_repository(
            "api",
            json!({"collaborators": [{"username": "alice", "permission": "admin"}]}),
        );
    let resolver = load(collaborators_guard(), source).await;

    let err = resolver.resolve("api").await.unwrap_err();
    assert!(matches!(err, Error::Validation { ref section, .. } if section == "collaborators"));
    assert_eq!(err.to_string(), "Admin access is not allowed for collaborators");
}

#[tokio::test]
async fn override_validator_checks_unmerged_layers() {
    let reviews = |count: u64| -> Value {
        json!({"branches": [{"name": "main", "protection": {"required_pull_request_reviews": {"required_approving_review_count": count}}}]})
    };
    let source = MemoryConfigSource::new()
        .with_baseline(reviews(2))
        .with_repository("lax", reviews(1))
        .with_repository("strict", reviews(3));
    let resolver = load(collaborators_guard(), source).await;

    let err = resolver.resolve("lax").await.unwrap_err();
    assert_eq!(err.to_string(), "Required reviews cannot be lowered");

    let config = resolved(&resolver, "strict").await;
    assert_eq!(
        config.tree["branches"][0]["protection"]["required_pull_request_reviews"]
            ["required_approving_review_count"],
        json!(3)
    );
}

#[tokio::test]
async fn baseline_validators_are_honoured() {
    let source = MemoryConfigSource::new()
        .with_baseline(json!({
            "configvalidators": [{
                "plugin": "repository",
                "error": "Repositories must stay private",
                "rule": {"kind": "allow_values", "field": "visibility", "values": ["private", "internal"]}
            }],
            "repository": {"visibility": "private"}
        }))
        .with_repository("site", json!({"repository": {"visibility": "public"}}));
    let resolver = load(Deployment::default(), source).await;

    assert!(resolver.validators().sections().contains(&"repository"));
    let err = resolver.resolve("site").await.unwrap_err();
    assert_eq!(err.to_string(), "Repositories must stay private");
}

#[rstest]
#[case::unknown_kind(json!({"kind": "bogus"}))]
#[case::locked_on_merged_value(json!({"kind": "locked", "field": "visibility"}))]
#[case::no_decrease_on_merged_value(json!({"kind": "no_decrease", "field": "required_approving_review_count"}))]
#[tokio::test]
async fn malformed_validator_fails_load(#[case] rule: Value) {
    let source = MemoryConfigSource::new()
        .with_baseline(json!({"configvalidators": [{"plugin": "repository", "error": "y", "rule": rule}]}));
    let result = ConfigResolver::load(
        Arc::new(Deployment::default()),
        Arc::new(source),
        Arc::new(StaticDirectory::new()),
    )
    .await;
    assert!(matches!(result, Err(Error::InvalidRule { .. })));
}

#[tokio::test]
async fn group_by_team_roster() {
    let source = MemoryConfigSource::new()
        .with_group("frontend", json!({"suborgteams": ["web"], "labels": [{"name": "ui"}]}));
    let directory = StaticDirectory::new().with_team("portal", "web");
    let resolver = ConfigResolver::load(
        Arc::new(Deployment::default()),
        Arc::new(source),
        Arc::new(directory),
    )
    .await
    .unwrap();

    let config = resolved(&resolver, "portal").await;
    assert_eq!(config.group.as_deref(), Some("frontend"));
    assert_eq!(config.section("labels"), Some(&json!([{"name": "ui"}])));

    let other = resolved(&resolver, "backend").await;
    assert_eq!(other.group, None);
    assert_eq!(other.section("labels"), None);
}
