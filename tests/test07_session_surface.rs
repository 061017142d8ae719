use std::sync::Arc;

use docstore_middleware::StorageError;
use docstore_middleware::descriptor::RequestDescriptor;
use docstore_middleware::model::{Query, QueryKind};
use docstore_middleware::pool::{ConnectionPool, LocalPool};
use docstore_middleware::test_utils::mem_factory;

#[tokio::test]
async fn tree_operations_round_trip_through_the_handle() -> Result<(), StorageError> {
    let (factory, _) = mem_factory("repo-tree");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();
    let handle = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await?;

    let root = handle.get_root_node().await?;
    let folder = handle
        .add_child_node(&root, "folder", None, "Folder", false)
        .await?;
    let doc = handle
        .add_child_node(&folder, "doc", None, "Document", false)
        .await?;
    handle
        .add_child_node(&doc, "attachment", None, "Blob", true)
        .await?;
    handle.save().await?;

    assert_eq!(handle.get_path(&doc).await?, "/folder/doc");
    assert_eq!(
        handle.get_node_by_path("/folder/doc", None).await?.map(|n| n.id().clone()),
        Some(doc.id().clone())
    );
    assert_eq!(
        handle.get_node_by_path("doc", Some(&folder)).await?.map(|n| n.id().clone()),
        Some(doc.id().clone())
    );
    assert_eq!(
        handle.get_node_by_id(doc.id()).await?.map(|n| n.name().to_owned()),
        Some("doc".to_owned())
    );
    assert_eq!(
        handle
            .get_parent_node(&doc)
            .await?
            .map(|n| n.id().clone()),
        Some(folder.id().clone())
    );

    // Complex children are addressed separately from regular ones.
    assert!(handle.has_child_node(&doc, "attachment", true).await?);
    assert!(!handle.has_child_node(&doc, "attachment", false).await?);
    assert!(handle.has_children(&folder, false).await?);
    assert!(!handle.has_children(&folder, true).await?);
    let children = handle.get_children(&folder, None, false).await?;
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name(), "doc");

    let moved = handle.move_node(&doc, &root, "renamed").await?;
    assert_eq!(handle.get_path(&moved).await?, "/renamed");
    let copied = handle.copy_node(&moved, &folder, "copy").await?;
    assert_eq!(handle.get_path(&copied).await?, "/folder/copy");

    handle.remove_node(&copied).await?;
    assert!(handle.get_node_by_id(copied.id()).await?.is_none());
    Ok(())
}

#[tokio::test]
async fn versioning_operations_round_trip() -> Result<(), StorageError> {
    let (factory, _) = mem_factory("repo-versions");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();
    let handle = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await?;

    let root = handle.get_root_node().await?;
    let doc = handle
        .add_child_node(&root, "doc", None, "Document", false)
        .await?;

    let v1 = handle.check_in(&doc, "1.0", Some("first cut")).await?;
    handle.check_out(&doc).await?;
    let v2 = handle.check_in(&doc, "2.0", None).await?;
    assert_ne!(v1.id(), v2.id());

    let versions = handle.get_versions(&doc).await?;
    assert_eq!(versions.len(), 2);
    assert_eq!(versions[0].label(), "1.0");
    assert_eq!(versions[0].description(), Some("first cut"));
    assert_eq!(versions[1].label(), "2.0");

    assert_eq!(
        handle.get_version_by_label(&doc, "1.0").await?.map(|n| n.id().clone()),
        Some(v1.id().clone())
    );
    assert_eq!(
        handle.get_last_version(&doc).await?.map(|n| n.id().clone()),
        Some(v2.id().clone())
    );

    handle.restore_by_label(&doc, "1.0").await?;
    let err = handle
        .restore_by_label(&doc, "9.9")
        .await
        .expect_err("unknown label");
    assert!(matches!(err, StorageError::Other(_)));
    Ok(())
}

#[tokio::test]
async fn proxies_and_queries_round_trip() -> Result<(), StorageError> {
    let (factory, _) = mem_factory("repo-proxies");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();
    let handle = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await?;

    let root = handle.get_root_node().await?;
    let sections = handle
        .add_child_node(&root, "sections", None, "Folder", false)
        .await?;
    let doc = handle
        .add_child_node(&root, "doc", None, "Document", false)
        .await?;
    let version = handle.check_in(&doc, "1.0", None).await?;

    let proxy = handle
        .add_proxy(version.id(), doc.id(), &sections, "doc-proxy", None)
        .await?;
    let found = handle.get_proxies(&doc, Some(&sections)).await?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id(), proxy.id());
    assert!(handle.get_proxies(&doc, Some(&root)).await?.is_empty());

    let hits = handle.query(&Query::nxql("doc")).await?;
    assert!(hits.contains(doc.id()));
    assert!(hits.contains(proxy.id()));
    // Result order is stable (path order for the in-memory backend).
    let again = handle.query(&Query::nxql("doc")).await?;
    assert_eq!(hits, again);

    // The in-memory backend evaluates both query languages as a path
    // substring match, so an xpath statement finds the same nodes.
    let xpath = Query::new("doc", QueryKind::Xpath);
    assert_eq!(xpath.kind(), QueryKind::Xpath);
    assert_eq!(handle.query(&xpath).await?, hits);
    Ok(())
}
