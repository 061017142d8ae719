use std::sync::Arc;

use docstore_middleware::StorageError;
use docstore_middleware::model::{Node, NodeId, SessionContext};
use docstore_middleware::registry::{SecurityManager, ServiceRegistry};
use docstore_middleware::test_utils::mem_factory;

struct DenyAll;

impl SecurityManager for DenyAll {
    fn check_permission(&self, _node: &Node, _permission: &str, _principal: &str) -> bool {
        false
    }
}

fn probe_node() -> Node {
    Node::new(NodeId::new("root"), "", false)
}

#[tokio::test]
async fn get_session_builds_the_descriptor_from_the_context() -> Result<(), StorageError> {
    let (factory, probe) = mem_factory("repo-entry");
    let entry = factory.create_entry_point(None);

    let anonymous = entry.get_session(&SessionContext::new()).await?;
    assert!(anonymous.is_live());

    let as_principal = entry
        .get_session(&SessionContext::new().with_principal("alice"))
        .await?;
    assert!(as_principal.is_live());

    // Principal wins over an explicit username.
    let both = SessionContext::new()
        .with_principal("alice")
        .with_username("bob");
    entry.get_session(&both).await?;

    let seen = probe.last_repository().expect("built").seen_descriptors();
    assert_eq!(seen[0].principal(), None);
    assert_eq!(seen[1].principal(), Some("alice"));
    assert_eq!(seen[2].principal(), Some("alice"));
    Ok(())
}

#[tokio::test]
async fn allocation_failure_surfaces_as_a_storage_error() {
    let (factory, probe) = mem_factory("repo-entry-fail");
    let entry = factory.create_entry_point(None);

    probe.fail_next_builds(1);
    let err = entry.get_connection().await.expect_err("build failure");
    assert!(matches!(err, StorageError::Repository(_)));

    // The failure was not cached by the factory.
    let handle = entry.get_connection().await.expect("retry succeeds");
    assert!(handle.is_live());
}

#[tokio::test]
async fn services_initialize_once_and_record_first_access() -> Result<(), StorageError> {
    let (factory, _probe) = mem_factory("repo-entry-services");
    factory.set_property("security-manager", "strict");

    let registry = Arc::new(ServiceRegistry::new());
    registry.register_security_manager("strict", Arc::new(DenyAll));
    let entry = Arc::new(factory.create_entry_point_with_registry(None, registry));

    assert!(!entry.take_first_access());

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let entry = Arc::clone(&entry);
        tasks.push(tokio::spawn(async move {
            entry.initialize_services().await;
        }));
    }
    for task in tasks {
        task.await.expect("join");
    }

    // The marker fires exactly once across all callers.
    assert!(entry.take_first_access());
    assert!(!entry.take_first_access());

    let security = entry.security_manager().expect("initialized");
    assert!(!security.check_permission(&probe_node(), "Read", "alice"));
    Ok(())
}

#[tokio::test]
async fn missing_security_manager_degrades_to_the_default() -> Result<(), StorageError> {
    let (factory, _probe) = mem_factory("repo-entry-fallback");
    factory.set_property("security-manager", "unregistered");

    let entry = factory.create_entry_point(None);
    let handle = entry.get_connection().await?;
    assert!(handle.is_live());

    // The lookup missed, so the allow-all default stands in.
    let security = entry.security_manager().expect("initialized");
    assert!(security.check_permission(&probe_node(), "Write", "anyone"));
    Ok(())
}

#[tokio::test]
async fn schema_manager_resolves_when_registered() -> Result<(), StorageError> {
    struct FixedSchemas;
    impl docstore_middleware::registry::SchemaManager for FixedSchemas {
        fn has_type(&self, type_name: &str) -> bool {
            type_name == "Document"
        }
    }

    let (factory, _probe) = mem_factory("repo-entry-schema");
    factory.set_property("schema-manager", "fixed");

    let registry = Arc::new(ServiceRegistry::new());
    registry.register_schema_manager("fixed", Arc::new(FixedSchemas));
    let entry = factory.create_entry_point_with_registry(None, registry);

    entry.initialize_services().await;
    let schema = entry.schema_manager().expect("registered");
    assert!(schema.has_type("Document"));
    assert!(!schema.has_type("Folder"));
    Ok(())
}
