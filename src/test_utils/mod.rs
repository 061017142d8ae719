//! In-memory repository backend used by the integration tests (and available
//! to downstream crates under the `test-utils` feature).
//!
//! [`MemRepositoryBuilder`] stands in for the host's engine constructor; the
//! [`MemBuilderProbe`] it hands out lets tests count builds, inject build
//! failures, and arm transaction-end failures without reaching into the
//! stack.

mod store;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::RepositoryConfig;
use crate::descriptor::RequestDescriptor;
use crate::error::StorageError;
use crate::factory::ConnectionFactoryProvider;
use crate::model::{Node, NodeId, Query, VersionInfo};
use crate::repository::{Repository, RepositoryBuilder};
use crate::session::Session;
use crate::xa::{EndFlags, PrepareVote, StartFlags, XaResource, Xid};

use store::StoreInner;

static NEXT_RESOURCE_TOKEN: AtomicUsize = AtomicUsize::new(1);

/// Shared switchboard between a test and every XA resource the backend mints.
#[derive(Default)]
pub struct XaControl {
    fail_next_end: AtomicBool,
    end_calls: AtomicUsize,
}

impl XaControl {
    /// Make the next `end` call fail with a transaction error.
    pub fn arm_end_failure(&self) {
        self.fail_next_end.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn end_calls(&self) -> usize {
        self.end_calls.load(Ordering::SeqCst)
    }
}

/// Recording XA resource over the in-memory store; transactional semantics
/// are not modeled, only the call protocol.
pub struct MemXaResource {
    token: usize,
    control: Arc<XaControl>,
    calls: Mutex<Vec<String>>,
    timeout: AtomicUsize,
}

impl MemXaResource {
    fn new(control: Arc<XaControl>) -> Arc<Self> {
        Arc::new(Self {
            token: NEXT_RESOURCE_TOKEN.fetch_add(1, Ordering::Relaxed),
            control,
            calls: Mutex::new(Vec::new()),
            timeout: AtomicUsize::new(0),
        })
    }

    fn record(&self, call: &str) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.into());
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl XaResource for MemXaResource {
    fn resource_token(&self) -> usize {
        self.token
    }

    async fn start(&self, _xid: &Xid, _flags: StartFlags) -> Result<(), StorageError> {
        self.record("start");
        Ok(())
    }

    async fn end(&self, _xid: &Xid, _flags: EndFlags) -> Result<(), StorageError> {
        self.record("end");
        self.control.end_calls.fetch_add(1, Ordering::SeqCst);
        if self.control.fail_next_end.swap(false, Ordering::SeqCst) {
            return Err(StorageError::Transaction("forced end failure".into()));
        }
        Ok(())
    }

    async fn prepare(&self, _xid: &Xid) -> Result<PrepareVote, StorageError> {
        self.record("prepare");
        Ok(PrepareVote::Prepared)
    }

    async fn commit(&self, _xid: &Xid, _one_phase: bool) -> Result<(), StorageError> {
        self.record("commit");
        Ok(())
    }

    async fn rollback(&self, _xid: &Xid) -> Result<(), StorageError> {
        self.record("rollback");
        Ok(())
    }

    async fn forget(&self, _xid: &Xid) -> Result<(), StorageError> {
        self.record("forget");
        Ok(())
    }

    async fn recover(&self) -> Result<Vec<Xid>, StorageError> {
        self.record("recover");
        Ok(Vec::new())
    }

    fn transaction_timeout(&self) -> u64 {
        self.timeout.load(Ordering::SeqCst) as u64
    }

    fn set_transaction_timeout(&self, seconds: u64) -> bool {
        self.timeout
            .store(usize::try_from(seconds).unwrap_or(usize::MAX), Ordering::SeqCst);
        true
    }
}

/// One session over the shared in-memory store.
pub struct MemSession {
    store: Arc<Mutex<StoreInner>>,
    live: AtomicBool,
    active: Arc<AtomicUsize>,
    xa: Arc<MemXaResource>,
}

impl MemSession {
    fn store(&self) -> MutexGuard<'_, StoreInner> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the store considers the node checked out. Test hook only.
    pub fn is_checked_out(&self, node: &Node) -> Result<bool, StorageError> {
        self.store().is_checked_out(node.id())
    }
}

#[async_trait]
impl Session for MemSession {
    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn xa_resource(&self) -> Arc<dyn XaResource> {
        Arc::clone(&self.xa) as Arc<dyn XaResource>
    }

    async fn close(&self) -> Result<(), StorageError> {
        if self.live.swap(false, Ordering::SeqCst) {
            self.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn save(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get_root_node(&self) -> Result<Node, StorageError> {
        Ok(self.store().root())
    }

    async fn get_node_by_id(&self, id: &NodeId) -> Result<Option<Node>, StorageError> {
        Ok(self.store().node_by_id(id))
    }

    async fn get_node_by_path(
        &self,
        path: &str,
        relative_to: Option<&Node>,
    ) -> Result<Option<Node>, StorageError> {
        Ok(self.store().node_by_path(path, relative_to.map(Node::id)))
    }

    async fn has_child_node(
        &self,
        parent: &Node,
        name: &str,
        complex: bool,
    ) -> Result<bool, StorageError> {
        Ok(self.store().child(parent.id(), name, complex).is_some())
    }

    async fn get_child_node(
        &self,
        parent: &Node,
        name: &str,
        complex: bool,
    ) -> Result<Option<Node>, StorageError> {
        Ok(self.store().child(parent.id(), name, complex))
    }

    async fn has_children(&self, parent: &Node, complex: bool) -> Result<bool, StorageError> {
        Ok(!self.store().children(parent.id(), None, complex)?.is_empty())
    }

    async fn get_children(
        &self,
        parent: &Node,
        name: Option<&str>,
        complex: bool,
    ) -> Result<Vec<Node>, StorageError> {
        self.store().children(parent.id(), name, complex)
    }

    async fn add_child_node(
        &self,
        parent: &Node,
        name: &str,
        position: Option<u64>,
        type_name: &str,
        complex: bool,
    ) -> Result<Node, StorageError> {
        self.store()
            .add_child(parent.id(), name, position, type_name, complex)
    }

    async fn remove_node(&self, node: &Node) -> Result<(), StorageError> {
        self.store().remove(node.id())
    }

    async fn get_parent_node(&self, node: &Node) -> Result<Option<Node>, StorageError> {
        self.store().parent(node.id())
    }

    async fn get_path(&self, node: &Node) -> Result<String, StorageError> {
        self.store().path(node.id())
    }

    async fn move_node(
        &self,
        source: &Node,
        dest_parent: &Node,
        new_name: &str,
    ) -> Result<Node, StorageError> {
        self.store().move_node(source.id(), dest_parent.id(), new_name)
    }

    async fn copy_node(
        &self,
        source: &Node,
        dest_parent: &Node,
        new_name: &str,
    ) -> Result<Node, StorageError> {
        self.store().copy_node(source.id(), dest_parent.id(), new_name)
    }

    async fn check_in(
        &self,
        node: &Node,
        label: &str,
        description: Option<&str>,
    ) -> Result<Node, StorageError> {
        self.store().check_in(node.id(), label, description)
    }

    async fn check_out(&self, node: &Node) -> Result<(), StorageError> {
        self.store().check_out(node.id())
    }

    async fn restore_by_label(&self, node: &Node, label: &str) -> Result<(), StorageError> {
        self.store().restore_by_label(node.id(), label)
    }

    async fn get_version_by_label(
        &self,
        node: &Node,
        label: &str,
    ) -> Result<Option<Node>, StorageError> {
        self.store().version_by_label(node.id(), label)
    }

    async fn get_versions(&self, node: &Node) -> Result<Vec<VersionInfo>, StorageError> {
        self.store().versions(node.id())
    }

    async fn get_last_version(&self, node: &Node) -> Result<Option<Node>, StorageError> {
        self.store().last_version(node.id())
    }

    async fn get_proxies(
        &self,
        document: &Node,
        parent: Option<&Node>,
    ) -> Result<Vec<Node>, StorageError> {
        Ok(self.store().proxies(document.id(), parent.map(Node::id)))
    }

    async fn add_proxy(
        &self,
        target_id: &NodeId,
        versionable_id: &NodeId,
        parent: &Node,
        name: &str,
        position: Option<u64>,
    ) -> Result<Node, StorageError> {
        self.store()
            .add_proxy(target_id, versionable_id, parent.id(), name, position)
    }

    async fn query(&self, query: &Query) -> Result<Vec<NodeId>, StorageError> {
        self.store().query(query.statement())
    }
}

/// In-memory repository: one shared node store, sessions counted in and out.
pub struct MemRepository {
    name: String,
    store: Arc<Mutex<StoreInner>>,
    active: Arc<AtomicUsize>,
    cache_entries: AtomicUsize,
    descriptors: Mutex<Vec<RequestDescriptor>>,
    xa_control: Arc<XaControl>,
}

impl MemRepository {
    /// Request descriptors seen by `new_session`, in order. Test hook only.
    #[must_use]
    pub fn seen_descriptors(&self) -> Vec<RequestDescriptor> {
        self.descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Repository for MemRepository {
    fn name(&self) -> &str {
        &self.name
    }

    async fn new_session(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Arc<dyn Session>, StorageError> {
        self.descriptors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(descriptor.clone());
        self.active.fetch_add(1, Ordering::SeqCst);
        // Pretend each session warms one cache entry.
        self.cache_entries.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MemSession {
            store: Arc::clone(&self.store),
            live: AtomicBool::new(true),
            active: Arc::clone(&self.active),
            xa: MemXaResource::new(Arc::clone(&self.xa_control)),
        }))
    }

    fn active_sessions_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    fn clear_caches(&self) -> usize {
        self.cache_entries.swap(0, Ordering::SeqCst)
    }
}

/// Test-facing window into a [`MemRepositoryBuilder`] after it has been
/// handed to a factory.
#[derive(Clone)]
pub struct MemBuilderProbe {
    builds: Arc<AtomicUsize>,
    fail_remaining: Arc<AtomicUsize>,
    xa_control: Arc<XaControl>,
    built: Arc<Mutex<Vec<Arc<MemRepository>>>>,
}

impl MemBuilderProbe {
    #[must_use]
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    /// The most recently built repository, if any.
    #[must_use]
    pub fn last_repository(&self) -> Option<Arc<MemRepository>> {
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// Make the next `n` repository builds fail.
    pub fn fail_next_builds(&self, n: usize) {
        self.fail_remaining.store(n, Ordering::SeqCst);
    }

    #[must_use]
    pub fn xa_control(&self) -> &Arc<XaControl> {
        &self.xa_control
    }
}

/// Repository builder over the in-memory backend.
pub struct MemRepositoryBuilder {
    builds: Arc<AtomicUsize>,
    fail_remaining: Arc<AtomicUsize>,
    xa_control: Arc<XaControl>,
    built: Arc<Mutex<Vec<Arc<MemRepository>>>>,
    build_delay: Option<Duration>,
}

impl Default for MemRepositoryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MemRepositoryBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            builds: Arc::new(AtomicUsize::new(0)),
            fail_remaining: Arc::new(AtomicUsize::new(0)),
            xa_control: Arc::new(XaControl::default()),
            built: Arc::new(Mutex::new(Vec::new())),
            build_delay: None,
        }
    }

    /// Sleep this long inside `build`, to widen race windows in tests.
    #[must_use]
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = Some(delay);
        self
    }

    #[must_use]
    pub fn probe(&self) -> MemBuilderProbe {
        MemBuilderProbe {
            builds: Arc::clone(&self.builds),
            fail_remaining: Arc::clone(&self.fail_remaining),
            xa_control: Arc::clone(&self.xa_control),
            built: Arc::clone(&self.built),
        }
    }
}

#[async_trait]
impl RepositoryBuilder for MemRepositoryBuilder {
    async fn build(&self, config: RepositoryConfig) -> Result<Arc<dyn Repository>, StorageError> {
        if let Some(delay) = self.build_delay {
            tokio::time::sleep(delay).await;
        }
        self.builds.fetch_add(1, Ordering::SeqCst);
        if self
            .fail_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| {
                remaining.checked_sub(1)
            })
            .is_ok()
        {
            return Err(StorageError::Repository(format!(
                "injected build failure for {}",
                config.name()
            )));
        }
        let repository = Arc::new(MemRepository {
            name: config.name().to_owned(),
            store: Arc::new(Mutex::new(StoreInner::new())),
            active: Arc::new(AtomicUsize::new(0)),
            cache_entries: AtomicUsize::new(0),
            descriptors: Mutex::new(Vec::new()),
            xa_control: Arc::clone(&self.xa_control),
        });
        self.built
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&repository));
        Ok(repository)
    }
}

/// A named factory over a fresh in-memory backend, plus its probe.
#[must_use]
pub fn mem_factory(name: &str) -> (Arc<ConnectionFactoryProvider>, MemBuilderProbe) {
    let builder = MemRepositoryBuilder::new();
    let probe = builder.probe();
    let factory = ConnectionFactoryProvider::new(Box::new(builder));
    factory.set_name(name);
    (factory, probe)
}
