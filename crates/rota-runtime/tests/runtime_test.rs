//! Runtime wiring: configuration, cache backend and lifecycle hooks together

use rota_core::memory::{CollectingNotifier, InMemoryAssignmentStore, InMemoryCacheStore, InMemoryDocumentStore};
use rota_core::{
    ApplyOutcome, AssignmentRule, AssignmentStore, Collaborators, Document, DocumentEvent, HostFlags,
    PlaceholderRenderer, RuleKind,
};
use rota_runtime::Runtime;
use rota_runtime::config::{CacheType, RotaConfig};
use rota_types::FieldValue;
use serial_test::serial;
use std::sync::Arc;

fn runtime_with(config: RotaConfig) -> (Runtime, Arc<InMemoryAssignmentStore>) {
    let assignments = Arc::new(InMemoryAssignmentStore::new());
    let runtime = Runtime::with_collaborators(
        config,
        Collaborators {
            documents: Arc::new(InMemoryDocumentStore::new()),
            cache: Arc::new(InMemoryCacheStore::new()),
            assignments: assignments.clone(),
            renderer: Arc::new(PlaceholderRenderer),
            notifier: Arc::new(CollectingNotifier::new()),
        },
    )
    .expect("runtime should build");
    (runtime, assignments)
}

#[test]
fn test_hooks_forward_events_for_rule_document_types() {
    let (runtime, assignments) = runtime_with(RotaConfig::default());
    let doc = Document::new("Issue", "ISS-1").with_field("status", "Open");

    // No rules yet: the hook is not registered
    assert_eq!(runtime.hooks().on_event(&doc, DocumentEvent::AfterInsert), None);

    runtime
        .registry()
        .create(
            &AssignmentRule::new("Support", "Issue")
                .with_assign_condition("status == 'Open'")
                .with_users(["alice", "bob"])
                .with_description("Please look at {{ name }}"),
        )
        .unwrap();
    assert_eq!(runtime.hooks().registered_document_types(), vec!["Issue".to_string()]);

    match runtime.hooks().on_event(&doc, DocumentEvent::AfterInsert) {
        Some(ApplyOutcome::Assigned { user, .. }) => assert_eq!(user, "alice"),
        other => panic!("expected an assignment, got {other:?}"),
    }
    let open = assignments.list_open("Issue", "ISS-1", 5).unwrap();
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].description, "Please look at ISS-1");

    // Other document types never reach the engine
    let task = Document::new("Task", "T-1").with_field("status", "Open");
    assert_eq!(runtime.hooks().on_event(&task, DocumentEvent::AfterInsert), None);
}

#[test]
fn test_hooks_follow_rule_moves_and_deletes() {
    let (runtime, _) = runtime_with(RotaConfig::default());
    let registry = runtime.registry();

    let rule = AssignmentRule::new("Sales", "Lead").with_assign_condition("1").with_users(["carol"]);
    registry.create(&rule).unwrap();
    assert!(runtime.hooks().is_registered("Lead"));

    registry.update(&AssignmentRule { document_type: "Opportunity".to_string(), ..rule }).unwrap();
    assert!(!runtime.hooks().is_registered("Lead"));
    assert!(runtime.hooks().is_registered("Opportunity"));

    registry.delete("Sales").unwrap();
    assert!(runtime.hooks().registered_document_types().is_empty());
}

#[test]
fn test_configured_engine_settings_are_applied() {
    let config = RotaConfig::parse(
        r#"
[engine]
assignment_lookup_limit = 2
trigger_events = ["on_submit"]
"#,
    )
    .unwrap();
    let (runtime, _) = runtime_with(config);
    assert_eq!(runtime.engine().config().assignment_lookup_limit, 2);

    runtime
        .registry()
        .create(
            &AssignmentRule::new("Approvals", "Expense Claim")
                .with_kind(RuleKind::LoadBalancing)
                .with_assign_condition("amount > 100")
                .with_users(["dana", "erin"]),
        )
        .unwrap();

    let claim = Document::new("Expense Claim", "EXP-1").with_field("amount", FieldValue::Float(250.0));
    assert_eq!(
        runtime.hooks().on_event(&claim, DocumentEvent::AfterInsert),
        Some(ApplyOutcome::Skipped)
    );
    assert!(matches!(
        runtime.hooks().on_event(&claim, DocumentEvent::OnSubmit),
        Some(ApplyOutcome::Assigned { .. })
    ));

    let flags = HostFlags { in_patch: true, ..HostFlags::default() };
    assert_eq!(
        runtime.hooks().on_event_with_flags(&claim, DocumentEvent::OnSubmit, flags),
        Some(ApplyOutcome::Skipped)
    );
}

#[test]
fn test_rule_cache_lives_in_the_configured_backend() {
    let (runtime, _) = runtime_with(RotaConfig::default());
    runtime
        .registry()
        .create(&AssignmentRule::new("Support", "Issue").with_assign_condition("1").with_users(["alice"]))
        .unwrap();

    let doc = Document::new("Issue", "ISS-9");
    runtime.engine().apply(&doc, DocumentEvent::OnUpdate);
    runtime.engine().apply(&doc, DocumentEvent::OnUpdate);

    let stats = runtime.engine().rule_cache().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[cfg(not(feature = "redis-cache"))]
#[test]
fn test_redis_backend_requires_feature() {
    let mut config = RotaConfig::default();
    config.caching.cache_type = CacheType::Redis;
    config.caching.redis_url = Some("redis://127.0.0.1/".to_string());
    assert!(Runtime::from_config(config).is_err());
}

#[test]
#[serial]
fn test_config_file_and_env_profile() {
    let path = std::env::temp_dir().join(format!("rota-runtime-test-{}.toml", std::process::id()));
    std::fs::write(
        &path,
        r#"
[environment]
env_type = "staging"
[engine]
assignment_lookup_limit = 3
[caching]
cache_type = "in_memory"
rule_cache_ttl_minutes = 15
max_entries = 100
[logging]
format = "json"
"#,
    )
    .unwrap();

    unsafe {
        std::env::set_var("ROTA_CONFIG_PATH", &path);
        std::env::set_var("ROTA_ASSIGNMENT_LOOKUP_LIMIT", "7");
    }
    let config = RotaConfig::load().unwrap().apply_profile();
    unsafe {
        std::env::remove_var("ROTA_CONFIG_PATH");
        std::env::remove_var("ROTA_ASSIGNMENT_LOOKUP_LIMIT");
    }
    let _ = std::fs::remove_file(&path);

    assert_eq!(config.environment.env_type, "staging");
    assert_eq!(config.engine.assignment_lookup_limit, 7);
    assert_eq!(config.caching.rule_cache_ttl_minutes, 15);

    let runtime = Runtime::from_config(config).unwrap();
    assert_eq!(runtime.engine().config().assignment_lookup_limit, 7);
}
