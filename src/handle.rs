//! The caller-visible connection object: a short-lived logical handle that
//! delegates every storage operation to its physical connection's session.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use crate::error::StorageError;
use crate::model::{Node, NodeId, Query, VersionInfo};
use crate::physical::PhysicalConnection;
use crate::pool::ConnectionPool;
use crate::session::Session;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Association state of a handle. The transition to `Disassociated` is
/// one-way; a fresh handle must be minted for reuse even though the physical
/// connection and its session survive. The disassociated state retains the
/// connection so a later [`close`] can still route the pool release after
/// forced branch-end closure.
///
/// [`close`]: ConnectionHandle::close
enum HandleState {
    Associated(Arc<PhysicalConnection>),
    Disassociated(Arc<PhysicalConnection>),
}

/// Logical handle over a pooled physical connection.
///
/// Every delegated operation first resolves the association state: once the
/// handle is disassociated (explicit [`close`], or forced closure at
/// transaction-branch end) it fails immediately with
/// [`StorageError::ClosedHandle`] without reaching the underlying session.
///
/// [`close`]: ConnectionHandle::close
pub struct ConnectionHandle {
    id: u64,
    pool: Weak<dyn ConnectionPool>,
    state: Mutex<HandleState>,
    // One-shot: this handle releases its connection through the pool at most
    // once, whichever path disassociated it first.
    released: AtomicBool,
}

impl ConnectionHandle {
    /// Handles start life associated; only [`PhysicalConnection::mint_handle`]
    /// constructs them.
    pub(crate) fn associated(
        physical: Arc<PhysicalConnection>,
        pool: Weak<dyn ConnectionPool>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            pool,
            state: Mutex::new(HandleState::Associated(physical)),
            released: AtomicBool::new(false),
        })
    }

    pub(crate) fn handle_id(&self) -> u64 {
        self.id
    }

    /// True iff the handle is still associated and its session reports live.
    #[must_use]
    pub fn is_live(&self) -> bool {
        match &*self.lock_state() {
            HandleState::Associated(physical) => physical.session().is_live(),
            HandleState::Disassociated(_) => false,
        }
    }

    /// Disassociate, then release the connection back through the pool
    /// machinery. Closing an already-closed handle is a no-op, never an
    /// error. A handle force-disassociated at branch end still owes the pool
    /// its release, so the first `close` after forced closure routes it; the
    /// connection becomes re-poolable either way.
    pub async fn close(&self) {
        let (physical, was_associated) = {
            let mut state = self.lock_state();
            match &*state {
                HandleState::Associated(physical) => {
                    let physical = Arc::clone(physical);
                    *state = HandleState::Disassociated(Arc::clone(&physical));
                    (physical, true)
                }
                HandleState::Disassociated(physical) => (Arc::clone(physical), false),
            }
        };
        if was_associated {
            physical.disassociate(self);
        }
        if self.released.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.release(&physical).await;
        }
    }

    /// Forced closure driven by [`PhysicalConnection::close_connections`].
    /// Only clears the association; set membership is handled by the caller
    /// and the pool release stays owed until the handle is closed.
    pub(crate) fn force_disassociate(&self) {
        let mut state = self.lock_state();
        if let HandleState::Associated(physical) = &*state {
            let physical = Arc::clone(physical);
            *state = HandleState::Disassociated(physical);
        }
    }

    /// The physical connection this handle rides on, while associated.
    #[must_use]
    pub fn physical_connection(&self) -> Option<Arc<PhysicalConnection>> {
        match &*self.lock_state() {
            HandleState::Associated(physical) => Some(Arc::clone(physical)),
            HandleState::Disassociated(_) => None,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve the session for delegation, failing fast when disassociated.
    fn live_session(&self) -> Result<Arc<dyn Session>, StorageError> {
        match &*self.lock_state() {
            HandleState::Associated(physical) => Ok(Arc::clone(physical.session())),
            HandleState::Disassociated(_) => Err(StorageError::ClosedHandle),
        }
    }
}

// Delegated capability surface. Each method is the session operation of the
// same name behind the liveness check; see [`Session`] for semantics.
impl ConnectionHandle {
    /// # Errors
    /// [`StorageError::ClosedHandle`] when disassociated, otherwise whatever
    /// the underlying session raises. All delegated methods below share this
    /// contract.
    pub async fn save(&self) -> Result<(), StorageError> {
        self.live_session()?.save().await
    }

    pub async fn get_root_node(&self) -> Result<Node, StorageError> {
        self.live_session()?.get_root_node().await
    }

    pub async fn get_node_by_id(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        self.live_session()?.get_node_by_id(id).await
    }

    pub async fn get_node_by_path(
        &self,
        path: &str,
        relative_to: Option<&Node>,
    ) -> Result<Option<Node>, StorageError> {
        self.live_session()?.get_node_by_path(path, relative_to).await
    }

    pub async fn has_child_node(
        &self,
        parent: &Node,
        name: &str,
        complex: bool,
    ) -> Result<bool, StorageError> {
        self.live_session()?.has_child_node(parent, name, complex).await
    }

    pub async fn get_child_node(
        &self,
        parent: &Node,
        name: &str,
        complex: bool,
    ) -> Result<Option<Node>, StorageError> {
        self.live_session()?.get_child_node(parent, name, complex).await
    }

    pub async fn has_children(&self, parent: &Node, complex: bool) -> Result<bool, StorageError> {
        self.live_session()?.has_children(parent, complex).await
    }

    pub async fn get_children(
        &self,
        parent: &Node,
        name: Option<&str>,
        complex: bool,
    ) -> Result<Vec<Node>, StorageError> {
        self.live_session()?.get_children(parent, name, complex).await
    }

    pub async fn add_child_node(
        &self,
        parent: &Node,
        name: &str,
        position: Option<u64>,
        type_name: &str,
        complex: bool,
    ) -> Result<Node, StorageError> {
        self.live_session()?
            .add_child_node(parent, name, position, type_name, complex)
            .await
    }

    pub async fn remove_node(&self, node: &Node) -> Result<(), StorageError> {
        self.live_session()?.remove_node(node).await
    }

    pub async fn get_parent_node(&self, node: &Node) -> Result<Option<Node>, StorageError> {
        self.live_session()?.get_parent_node(node).await
    }

    pub async fn get_path(&self, node: &Node) -> Result<String, StorageError> {
        self.live_session()?.get_path(node).await
    }

    pub async fn move_node(
        &self,
        source: &Node,
        dest_parent: &Node,
        new_name: &str,
    ) -> Result<Node, StorageError> {
        self.live_session()?.move_node(source, dest_parent, new_name).await
    }

    pub async fn copy_node(
        &self,
        source: &Node,
        dest_parent: &Node,
        new_name: &str,
    ) -> Result<Node, StorageError> {
        self.live_session()?.copy_node(source, dest_parent, new_name).await
    }

    pub async fn check_in(
        &self,
        node: &Node,
        label: &str,
        description: Option<&str>,
    ) -> Result<Node, StorageError> {
        self.live_session()?.check_in(node, label, description).await
    }

    pub async fn check_out(&self, node: &Node) -> Result<(), StorageError> {
        self.live_session()?.check_out(node).await
    }

    pub async fn restore_by_label(&self, node: &Node, label: &str) -> Result<(), StorageError> {
        self.live_session()?.restore_by_label(node, label).await
    }

    pub async fn get_version_by_label(
        &self,
        node: &Node,
        label: &str,
    ) -> Result<Option<Node>, StorageError> {
        self.live_session()?.get_version_by_label(node, label).await
    }

    pub async fn get_versions(&self, node: &Node) -> Result<Vec<VersionInfo>, StorageError> {
        self.live_session()?.get_versions(node).await
    }

    pub async fn get_last_version(&self, node: &Node) -> Result<Option<Node>, StorageError> {
        self.live_session()?.get_last_version(node).await
    }

    pub async fn get_proxies(
        &self,
        document: &Node,
        parent: Option<&Node>,
    ) -> Result<Vec<Node>, StorageError> {
        self.live_session()?.get_proxies(document, parent).await
    }

    pub async fn add_proxy(
        &self,
        target_id: &NodeId,
        versionable_id: &NodeId,
        parent: &Node,
        name: &str,
        position: Option<u64>,
    ) -> Result<Node, StorageError> {
        self.live_session()?
            .add_proxy(target_id, versionable_id, parent, name, position)
            .await
    }

    pub async fn query(&self, query: &Query) -> Result<Vec<NodeId>, StorageError> {
        self.live_session()?.query(query).await
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let associated = matches!(&*self.lock_state(), HandleState::Associated(_));
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("associated", &associated)
            .finish()
    }
}
