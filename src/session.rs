//! Seam to the external storage engine: one [`Session`] per physical
//! connection, shared by every handle associated with it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::model::{Node, NodeId, Query, VersionInfo};
use crate::xa::XaResource;

/// One live session to the backing document store.
///
/// The storage engine supplying implementations is an external collaborator;
/// this layer only associates sessions with pooled physical connections and
/// multiplexes handles over them. All storage I/O is performed by the engine
/// and may block internally; implementations must be safe to call from many
/// tasks concurrently.
#[async_trait]
pub trait Session: Send + Sync {
    /// Whether the underlying session is still usable.
    fn is_live(&self) -> bool;

    /// The session's two-phase-commit resource, undecorated.
    fn xa_resource(&self) -> Arc<dyn XaResource>;

    /// Close the underlying session. Driven by the pool when a physical
    /// connection is destroyed, never by handle teardown.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the engine fails to release the session.
    async fn close(&self) -> Result<(), StorageError>;

    /// Flush pending changes to the store.
    ///
    /// # Errors
    /// Returns [`StorageError`] on any engine failure.
    async fn save(&self) -> Result<(), StorageError>;

    async fn get_root_node(&self) -> Result<Node, StorageError>;

    async fn get_node_by_id(&self, id: &NodeId) -> Result<Option<Node>, StorageError>;

    /// Resolve a path, absolute or relative to `relative_to` when supplied.
    async fn get_node_by_path(
        &self,
        path: &str,
        relative_to: Option<&Node>,
    ) -> Result<Option<Node>, StorageError>;

    async fn has_child_node(
        &self,
        parent: &Node,
        name: &str,
        complex: bool,
    ) -> Result<bool, StorageError>;

    async fn get_child_node(
        &self,
        parent: &Node,
        name: &str,
        complex: bool,
    ) -> Result<Option<Node>, StorageError>;

    async fn has_children(&self, parent: &Node, complex: bool) -> Result<bool, StorageError>;

    /// Children of `parent`, optionally restricted to `name`, in stored order.
    async fn get_children(
        &self,
        parent: &Node,
        name: Option<&str>,
        complex: bool,
    ) -> Result<Vec<Node>, StorageError>;

    async fn add_child_node(
        &self,
        parent: &Node,
        name: &str,
        position: Option<u64>,
        type_name: &str,
        complex: bool,
    ) -> Result<Node, StorageError>;

    async fn remove_node(&self, node: &Node) -> Result<(), StorageError>;

    async fn get_parent_node(&self, node: &Node) -> Result<Option<Node>, StorageError>;

    async fn get_path(&self, node: &Node) -> Result<String, StorageError>;

    async fn move_node(
        &self,
        source: &Node,
        dest_parent: &Node,
        new_name: &str,
    ) -> Result<Node, StorageError>;

    async fn copy_node(
        &self,
        source: &Node,
        dest_parent: &Node,
        new_name: &str,
    ) -> Result<Node, StorageError>;

    /// Create a version of `node` and return the frozen version node.
    async fn check_in(
        &self,
        node: &Node,
        label: &str,
        description: Option<&str>,
    ) -> Result<Node, StorageError>;

    async fn check_out(&self, node: &Node) -> Result<(), StorageError>;

    async fn restore_by_label(&self, node: &Node, label: &str) -> Result<(), StorageError>;

    async fn get_version_by_label(
        &self,
        node: &Node,
        label: &str,
    ) -> Result<Option<Node>, StorageError>;

    async fn get_versions(&self, node: &Node) -> Result<Vec<VersionInfo>, StorageError>;

    async fn get_last_version(&self, node: &Node) -> Result<Option<Node>, StorageError>;

    /// Proxies pointing at `document`, optionally restricted to those under
    /// `parent`.
    async fn get_proxies(
        &self,
        document: &Node,
        parent: Option<&Node>,
    ) -> Result<Vec<Node>, StorageError>;

    async fn add_proxy(
        &self,
        target_id: &NodeId,
        versionable_id: &NodeId,
        parent: &Node,
        name: &str,
        position: Option<u64>,
    ) -> Result<Node, StorageError>;

    /// Evaluate a query, returning matching node ids in result order.
    async fn query(&self, query: &Query) -> Result<Vec<NodeId>, StorageError>;
}
