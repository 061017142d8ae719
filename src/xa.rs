//! Two-phase-commit resource surface and the branch-end decorator that keeps
//! logical handles from outliving their transaction branch.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::error::StorageError;
use crate::physical::PhysicalConnection;

/// Identifier of one transaction branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Xid {
    format_id: i32,
    global_id: Vec<u8>,
    branch_qualifier: Vec<u8>,
}

impl Xid {
    pub fn new(format_id: i32, global_id: Vec<u8>, branch_qualifier: Vec<u8>) -> Self {
        Self {
            format_id,
            global_id,
            branch_qualifier,
        }
    }

    #[must_use]
    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    #[must_use]
    pub fn global_id(&self) -> &[u8] {
        &self.global_id
    }

    #[must_use]
    pub fn branch_qualifier(&self) -> &[u8] {
        &self.branch_qualifier
    }
}

/// Association mode when a branch is started on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartFlags {
    NoFlags,
    Join,
    Resume,
}

/// Disassociation mode when a branch ends on a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndFlags {
    Success,
    Fail,
    Suspend,
}

/// Outcome of the prepare phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareVote {
    Prepared,
    /// No changes to commit; phase two will be skipped for this resource.
    ReadOnly,
}

/// Two-phase-commit participation of one session.
#[async_trait]
pub trait XaResource: Send + Sync {
    /// Stable token identifying the resource manager behind this resource,
    /// used by [`XaResource::is_same_rm`].
    fn resource_token(&self) -> usize;

    /// Whether both resources talk to the same resource manager.
    fn is_same_rm(&self, other: &dyn XaResource) -> bool {
        self.resource_token() == other.resource_token()
    }

    async fn start(&self, xid: &Xid, flags: StartFlags) -> Result<(), StorageError>;

    async fn end(&self, xid: &Xid, flags: EndFlags) -> Result<(), StorageError>;

    async fn prepare(&self, xid: &Xid) -> Result<PrepareVote, StorageError>;

    async fn commit(&self, xid: &Xid, one_phase: bool) -> Result<(), StorageError>;

    async fn rollback(&self, xid: &Xid) -> Result<(), StorageError>;

    async fn forget(&self, xid: &Xid) -> Result<(), StorageError>;

    /// Branches in need of recovery after a crash.
    async fn recover(&self) -> Result<Vec<Xid>, StorageError>;

    /// Current transaction timeout in seconds.
    fn transaction_timeout(&self) -> u64;

    /// Set the transaction timeout; returns false when the resource does not
    /// honor the requested value.
    fn set_transaction_timeout(&self, seconds: u64) -> bool;
}

/// Decorates a session's [`XaResource`] so that ending a transaction branch
/// always tears down every handle associated with its physical connection.
///
/// Everything delegates unchanged except [`XaResource::end`]: after the inner
/// `end` returns, whether it succeeded or not, the paired connection's
/// handles are force-closed, and the inner error (if any) still propagates.
/// This ordering is the leak-prevention guarantee of the whole layer: a
/// branch ending always happens-before the physical connection becomes
/// eligible for reuse by another logical context.
pub struct TransactionBoundaryResource {
    inner: Arc<dyn XaResource>,
    physical: Arc<PhysicalConnection>,
}

impl TransactionBoundaryResource {
    pub(crate) fn new(inner: Arc<dyn XaResource>, physical: Arc<PhysicalConnection>) -> Self {
        Self { inner, physical }
    }

    #[must_use]
    pub fn physical_connection(&self) -> &Arc<PhysicalConnection> {
        &self.physical
    }
}

#[async_trait]
impl XaResource for TransactionBoundaryResource {
    fn resource_token(&self) -> usize {
        self.inner.resource_token()
    }

    async fn start(&self, xid: &Xid, flags: StartFlags) -> Result<(), StorageError> {
        self.inner.start(xid, flags).await
    }

    async fn end(&self, xid: &Xid, flags: EndFlags) -> Result<(), StorageError> {
        let ended = self.inner.end(xid, flags).await;
        // Cleanup must run no matter how the inner end went.
        if let Err(err) = &ended {
            warn!(connection = self.physical.id(), error = %err, "branch end failed, closing handles anyway");
        }
        self.physical.close_connections();
        ended
    }

    async fn prepare(&self, xid: &Xid) -> Result<PrepareVote, StorageError> {
        self.inner.prepare(xid).await
    }

    async fn commit(&self, xid: &Xid, one_phase: bool) -> Result<(), StorageError> {
        self.inner.commit(xid, one_phase).await
    }

    async fn rollback(&self, xid: &Xid) -> Result<(), StorageError> {
        self.inner.rollback(xid).await
    }

    async fn forget(&self, xid: &Xid) -> Result<(), StorageError> {
        self.inner.forget(xid).await
    }

    async fn recover(&self) -> Result<Vec<Xid>, StorageError> {
        self.inner.recover().await
    }

    fn transaction_timeout(&self) -> u64 {
        self.inner.transaction_timeout()
    }

    fn set_transaction_timeout(&self, seconds: u64) -> bool {
        self.inner.set_transaction_timeout(seconds)
    }
}
