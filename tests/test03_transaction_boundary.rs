use std::sync::Arc;

use docstore_middleware::StorageError;
use docstore_middleware::descriptor::RequestDescriptor;
use docstore_middleware::pool::{ConnectionPool, LocalPool};
use docstore_middleware::test_utils::mem_factory;
use docstore_middleware::xa::{EndFlags, PrepareVote, StartFlags, XaResource, Xid};

fn branch(id: u8) -> Xid {
    Xid::new(0x4e75, vec![1, 2, 3], vec![id])
}

#[tokio::test]
async fn branch_end_closes_every_handle() -> Result<(), StorageError> {
    let (factory, _probe) = mem_factory("repo-xa");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();

    let handle_a = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await?;
    let physical = handle_a.physical_connection().expect("associated");
    let handle_b = physical.mint_handle(Arc::downgrade(&pool));

    let resource = physical.decorated_resource();
    let xid = branch(1);
    resource.start(&xid, StartFlags::NoFlags).await?;
    resource.end(&xid, EndFlags::Success).await?;

    assert!(!handle_a.is_live());
    assert!(!handle_b.is_live());
    assert_eq!(physical.handle_count(), 0);
    Ok(())
}

#[tokio::test]
async fn failed_end_still_closes_handles_and_propagates() {
    let (factory, probe) = mem_factory("repo-xa-fail");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();

    let handle = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await
        .expect("allocate");
    let physical = handle.physical_connection().expect("associated");
    let resource = physical.decorated_resource();

    probe.xa_control().arm_end_failure();
    let err = resource
        .end(&branch(2), EndFlags::Fail)
        .await
        .expect_err("inner end failure must propagate");
    assert!(matches!(err, StorageError::Transaction(_)));

    // Cleanup ran despite the error.
    assert!(!handle.is_live());
    assert_eq!(physical.handle_count(), 0);
    assert_eq!(probe.xa_control().end_calls(), 1);
}

#[tokio::test]
async fn everything_but_end_delegates_unchanged() -> Result<(), StorageError> {
    let (factory, _probe) = mem_factory("repo-xa-delegate");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();

    let handle = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await?;
    let physical = handle.physical_connection().expect("associated");
    let resource = physical.decorated_resource();
    let inner = physical.session().xa_resource();

    assert!(resource.is_same_rm(inner.as_ref()));
    assert!(resource.set_transaction_timeout(30));
    assert_eq!(resource.transaction_timeout(), 30);

    let xid = branch(3);
    resource.start(&xid, StartFlags::NoFlags).await?;
    assert_eq!(resource.prepare(&xid).await?, PrepareVote::Prepared);
    resource.commit(&xid, false).await?;
    resource.rollback(&xid).await?;
    resource.forget(&xid).await?;
    assert!(resource.recover().await?.is_empty());

    // None of the delegating operations touched the handles.
    assert!(handle.is_live());
    Ok(())
}

#[tokio::test]
async fn connection_is_reusable_after_branch_end() -> Result<(), StorageError> {
    let (factory, _probe) = mem_factory("repo-xa-reuse");
    let local = LocalPool::new();
    let pool = Arc::clone(&local) as Arc<dyn ConnectionPool>;

    let handle = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await?;
    let physical = handle.physical_connection().expect("associated");
    let resource = physical.decorated_resource();

    let xid = branch(5);
    resource.start(&xid, StartFlags::NoFlags).await?;
    resource.end(&xid, EndFlags::Success).await?;
    assert!(!handle.is_live());

    // The caller still closes its dead handle; that routes the owed release
    // and the connection goes back on the free list.
    handle.close().await;
    assert_eq!(local.stats().idle_connections, 1);
    assert_eq!(local.stats().in_use_connections, 0);

    let reused = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await?;
    assert_eq!(
        reused.physical_connection().expect("associated").id(),
        physical.id()
    );
    Ok(())
}

#[tokio::test]
async fn explicit_close_then_branch_end_scenario() {
    let (factory, _probe) = mem_factory("repo-xa-scenario");
    let pool: Arc<dyn ConnectionPool> = LocalPool::new();

    let handle_a = Arc::clone(&pool)
        .allocate(&factory, &RequestDescriptor::anonymous())
        .await
        .expect("allocate");
    let physical = handle_a.physical_connection().expect("associated");
    let handle_b = physical.mint_handle(Arc::downgrade(&pool));
    let resource = physical.decorated_resource();

    handle_a.close().await;
    resource
        .end(&branch(4), EndFlags::Success)
        .await
        .expect("end");

    assert!(!handle_b.is_live());
    // Closing A again after the branch ended must not raise.
    handle_a.close().await;
}
