//! Pool-managed wrapper around one real store session, tracking the logical
//! handles currently pointing at it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tracing::debug;

use crate::error::StorageError;
use crate::factory::ConnectionFactoryProvider;
use crate::handle::ConnectionHandle;
use crate::pool::ConnectionPool;
use crate::session::Session;
use crate::xa::TransactionBoundaryResource;

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// One physical connection to the store.
///
/// Owns exactly one underlying [`Session`] and mediates access to it through
/// zero or more [`ConnectionHandle`]s. The connection itself is pool-managed:
/// removing the last handle never closes the session, only [`destroy`]
/// (driven by the pool) does.
///
/// [`destroy`]: PhysicalConnection::destroy
pub struct PhysicalConnection {
    id: u64,
    session: Arc<dyn Session>,
    factory: Arc<ConnectionFactoryProvider>,
    // Weak so an application dropping its handle without closing it cannot
    // keep a cycle alive; dead entries are pruned on the next mutation.
    handles: Mutex<Vec<Weak<ConnectionHandle>>>,
    destroyed: AtomicBool,
}

impl PhysicalConnection {
    pub(crate) fn new(
        session: Arc<dyn Session>,
        factory: Arc<ConnectionFactoryProvider>,
    ) -> Arc<Self> {
        let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
        debug!(connection = id, factory = ?factory.name(), "physical connection created");
        Arc::new(Self {
            id,
            session,
            factory,
            handles: Mutex::new(Vec::new()),
            destroyed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn session(&self) -> &Arc<dyn Session> {
        &self.session
    }

    /// The factory this connection originated from; candidate matching keys
    /// on it.
    #[must_use]
    pub fn factory(&self) -> &Arc<ConnectionFactoryProvider> {
        &self.factory
    }

    /// Mint a fresh logical handle associated with this connection.
    ///
    /// Called by pool machinery both for a new checkout and for handle
    /// sharing within an existing one. A disassociated handle is never
    /// re-associated; sharing always mints a new handle object.
    #[must_use]
    pub fn mint_handle(self: &Arc<Self>, pool: Weak<dyn ConnectionPool>) -> Arc<ConnectionHandle> {
        let handle = ConnectionHandle::associated(Arc::clone(self), pool);
        self.lock_handles().push(Arc::downgrade(&handle));
        handle
    }

    pub(crate) fn disassociate(&self, handle: &ConnectionHandle) {
        self.lock_handles().retain(|weak| match weak.upgrade() {
            Some(live) => live.handle_id() != handle.handle_id(),
            None => false,
        });
    }

    /// Force every currently-associated handle into the disassociated state.
    ///
    /// This is the leak-prevention primitive: after it returns, no live
    /// handle referencing this connection remains, however many existed and
    /// whether or not callers closed any of them. Idempotent per handle and
    /// infallible; already-disassociated handles are a no-op.
    pub fn close_connections(&self) {
        let drained = std::mem::take(&mut *self.lock_handles());
        if drained.is_empty() {
            return;
        }
        debug!(connection = self.id, handles = drained.len(), "forcing handles closed");
        for weak in drained {
            if let Some(handle) = weak.upgrade() {
                handle.force_disassociate();
            }
        }
    }

    /// Number of live handles currently associated.
    #[must_use]
    pub fn handle_count(&self) -> usize {
        let mut guard = self.lock_handles();
        guard.retain(|weak| weak.strong_count() > 0);
        guard.len()
    }

    /// The session's two-phase-commit resource, decorated so branch end
    /// always closes this connection's handles.
    #[must_use]
    pub fn decorated_resource(self: &Arc<Self>) -> TransactionBoundaryResource {
        TransactionBoundaryResource::new(self.session.xa_resource(), Arc::clone(self))
    }

    /// Between-checkout reset driven by the pool: equivalent to forcing all
    /// handles closed. The session survives for reuse.
    pub fn cleanup(&self) {
        self.close_connections();
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Evict this connection: force handles closed, then close the
    /// underlying session. Closing the session happens at most once.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the engine fails to release the session.
    pub async fn destroy(&self) -> Result<(), StorageError> {
        self.close_connections();
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        debug!(connection = self.id, "destroying physical connection");
        self.session.close().await
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<Weak<ConnectionHandle>>> {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for PhysicalConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicalConnection")
            .field("id", &self.id)
            .field("handles", &self.handle_count())
            .finish()
    }
}
