use std::sync::Arc;

use docstore_middleware::StorageError;
use docstore_middleware::descriptor::RequestDescriptor;
use docstore_middleware::pool::{ConnectionPool, LocalPool};
use docstore_middleware::test_utils::mem_factory;

#[tokio::test]
async fn handle_is_live_until_closed() -> Result<(), StorageError> {
    let (factory, _probe) = mem_factory("repo-lifecycle");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();

    let handle = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await?;
    assert!(handle.is_live());

    let root = handle.get_root_node().await?;
    handle.add_child_node(&root, "doc", None, "Document", false).await?;
    assert!(handle.has_child_node(&root, "doc", false).await?);

    handle.close().await;
    assert!(!handle.is_live());
    Ok(())
}

#[tokio::test]
async fn operations_on_closed_handle_fail_without_reaching_the_session() {
    let (factory, _probe) = mem_factory("repo-closed-ops");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();

    let handle = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await
        .expect("allocate");
    let root = handle.get_root_node().await.expect("root");
    handle.close().await;

    let err = handle.get_root_node().await.expect_err("closed handle must fail");
    assert!(matches!(err, StorageError::ClosedHandle));
    let err = handle.save().await.expect_err("closed handle must fail");
    assert!(matches!(err, StorageError::ClosedHandle));
    let err = handle
        .has_children(&root, false)
        .await
        .expect_err("closed handle must fail");
    assert!(matches!(err, StorageError::ClosedHandle));
}

#[tokio::test]
async fn closing_twice_is_a_no_op() {
    let (factory, _probe) = mem_factory("repo-double-close");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();

    let handle = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await
        .expect("allocate");
    handle.close().await;
    handle.close().await;
    assert!(!handle.is_live());
}

#[tokio::test]
async fn shared_handles_tear_down_together_at_branch_end() {
    let (factory, _probe) = mem_factory("repo-shared");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();

    let handle_a = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await
        .expect("allocate");
    let physical = handle_a.physical_connection().expect("associated");
    let handle_b = physical.mint_handle(Arc::downgrade(&pool));

    assert!(handle_a.is_live());
    assert!(handle_b.is_live());
    assert_eq!(physical.handle_count(), 2);

    // Close A explicitly, then force closure for the rest of the branch.
    handle_a.close().await;
    assert!(!handle_a.is_live());
    assert!(handle_b.is_live());

    physical.close_connections();
    assert!(!handle_b.is_live());
    assert_eq!(physical.handle_count(), 0);

    // A second explicit close of A must still be a no-op.
    handle_a.close().await;

    // The session itself survives handle teardown; the connection is
    // pool-managed.
    assert!(physical.session().is_live());
}

#[tokio::test]
async fn disassociated_handle_never_reassociates() {
    let (factory, _probe) = mem_factory("repo-one-way");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();

    let handle = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await
        .expect("allocate");
    let physical = handle.physical_connection().expect("associated");
    handle.close().await;
    assert!(handle.physical_connection().is_none());

    // Reuse mints a fresh handle object over the same physical connection.
    let fresh = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await
        .expect("allocate");
    let reused = fresh.physical_connection().expect("associated");
    assert_eq!(reused.id(), physical.id());
    assert!(!handle.is_live());
    assert!(fresh.is_live());
}
