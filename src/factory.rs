//! Factory for physical connections: owns the lazily-built repository and the
//! pool-matching rule.

use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value as JsonValue;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::RepositoryConfig;
use crate::descriptor::RequestDescriptor;
use crate::entry::ConnectionEntryPoint;
use crate::error::StorageError;
use crate::physical::PhysicalConnection;
use crate::pool::{ConnectionPool, LocalPool};
use crate::registry::ServiceRegistry;
use crate::repository::{Repository, RepositoryBuilder};

/// Creates physical connections on demand and owns the underlying repository
/// instance, built exactly once across concurrent first callers.
///
/// Constructed at configuration time with an empty config; properties
/// accumulate via setters until the first connection request triggers the
/// repository build. Identity (equality and hash) is the configured name.
pub struct ConnectionFactoryProvider {
    name: Mutex<Option<String>>,
    config: Mutex<RepositoryConfig>,
    builder: Box<dyn RepositoryBuilder>,
    // Compute-once guard: the first caller builds under the cell's lock,
    // concurrent callers await the same build, and a failed build leaves the
    // cell empty so a later request retries.
    repository: OnceCell<Arc<dyn Repository>>,
}

impl ConnectionFactoryProvider {
    pub fn new(builder: Box<dyn RepositoryBuilder>) -> Arc<Self> {
        Arc::new(Self {
            name: Mutex::new(None),
            config: Mutex::new(RepositoryConfig::default()),
            builder,
            repository: OnceCell::new(),
        })
    }

    /// Configured repository name; also the factory's identity.
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.lock(&self.name).clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.lock(&self.config).set_name(name.clone());
        *self.lock(&self.name) = Some(name);
    }

    pub fn set_property(&self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.lock(&self.config).set_property(key, value);
    }

    #[must_use]
    pub fn config(&self) -> RepositoryConfig {
        self.lock(&self.config).clone()
    }

    /// Wrap this factory and a pool into the application-facing entry point.
    /// When no pool is supplied a fresh in-process [`LocalPool`] is used.
    #[must_use]
    pub fn create_entry_point(
        self: &Arc<Self>,
        pool: Option<Arc<dyn ConnectionPool>>,
    ) -> ConnectionEntryPoint {
        self.create_entry_point_with_registry(pool, Arc::new(ServiceRegistry::new()))
    }

    #[must_use]
    pub fn create_entry_point_with_registry(
        self: &Arc<Self>,
        pool: Option<Arc<dyn ConnectionPool>>,
        registry: Arc<ServiceRegistry>,
    ) -> ConnectionEntryPoint {
        let pool = pool.unwrap_or_else(|| {
            let local: Arc<dyn ConnectionPool> = LocalPool::new();
            local
        });
        ConnectionEntryPoint::new(Arc::clone(self), pool, registry)
    }

    /// Build the repository if needed, then open a new session wrapped in a
    /// fresh [`PhysicalConnection`].
    ///
    /// # Errors
    /// Returns [`StorageError`] when repository construction or session
    /// opening fails. A construction failure is not cached; the next call
    /// retries the build.
    pub async fn create_physical_connection(
        self: &Arc<Self>,
        descriptor: &RequestDescriptor,
    ) -> Result<Arc<PhysicalConnection>, StorageError> {
        let repository = self.repository().await?;
        let session = repository.new_session(descriptor).await?;
        Ok(PhysicalConnection::new(session, Arc::clone(self)))
    }

    /// Pool-matching rule: the first candidate originating from this factory.
    ///
    /// Credential equality on the descriptor is deliberately not consulted:
    /// the default assumption is a single credential per repository, so
    /// factory identity alone decides reuse. Extending to multi-credential
    /// matching would add descriptor equality to this scan.
    #[must_use]
    pub fn match_candidate(
        self: &Arc<Self>,
        candidates: &[Arc<PhysicalConnection>],
        _descriptor: &RequestDescriptor,
    ) -> Option<Arc<PhysicalConnection>> {
        candidates
            .iter()
            .find(|candidate| candidate.factory().as_ref() == self.as_ref())
            .cloned()
    }

    /// Sessions currently open on the repository; 0 when it was never built.
    #[must_use]
    pub fn active_sessions_count(&self) -> usize {
        self.repository
            .get()
            .map_or(0, |repository| repository.active_sessions_count())
    }

    /// Clear repository caches, returning the number of entries cleared; 0
    /// when the repository was never built.
    pub fn clear_caches(&self) -> usize {
        self.repository
            .get()
            .map_or(0, |repository| repository.clear_caches())
    }

    async fn repository(&self) -> Result<&Arc<dyn Repository>, StorageError> {
        self.repository
            .get_or_try_init(|| async {
                let config = self.config();
                debug!(repository = config.name(), "building repository");
                self.builder.build(config).await
            })
            .await
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Two factories are equal iff both have a configured name and the names are
/// equal; an unnamed factory equals nothing, not even itself.
impl PartialEq for ConnectionFactoryProvider {
    fn eq(&self, other: &Self) -> bool {
        match (self.name(), other.name()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }
}

impl Hash for ConnectionFactoryProvider {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.name() {
            Some(name) => name.hash(state),
            None => 0u8.hash(state),
        }
    }
}

impl std::fmt::Debug for ConnectionFactoryProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionFactoryProvider")
            .field("name", &self.name())
            .field("repository_built", &self.repository.get().is_some())
            .finish()
    }
}
