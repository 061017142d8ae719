//! Application-facing entry point: turns caller context into pooled session
//! handles and lazily wires up the auxiliary services.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::OnceCell;
use tracing::debug;

use crate::descriptor::RequestDescriptor;
use crate::error::StorageError;
use crate::factory::ConnectionFactoryProvider;
use crate::handle::ConnectionHandle;
use crate::model::{Credentials, SessionContext};
use crate::pool::ConnectionPool;
use crate::registry::{SchemaManager, SecurityManager, ServiceRegistry};

struct Services {
    schema: Option<Arc<dyn SchemaManager>>,
    security: Arc<dyn SecurityManager>,
}

/// The API application code goes through: obtains handles from the pool and
/// exposes the store-session facade to upstream callers.
///
/// Identity is the (factory, pool) pair. Auxiliary schema/security services
/// are resolved from the registry exactly once, on first use, safely under
/// concurrent first callers.
pub struct ConnectionEntryPoint {
    factory: Arc<ConnectionFactoryProvider>,
    pool: Arc<dyn ConnectionPool>,
    registry: Arc<ServiceRegistry>,
    services: OnceCell<Services>,
    first_access: AtomicBool,
}

impl ConnectionEntryPoint {
    pub(crate) fn new(
        factory: Arc<ConnectionFactoryProvider>,
        pool: Arc<dyn ConnectionPool>,
        registry: Arc<ServiceRegistry>,
    ) -> Self {
        Self {
            factory,
            pool,
            registry,
            services: OnceCell::new(),
            first_access: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn factory(&self) -> &Arc<ConnectionFactoryProvider> {
        &self.factory
    }

    #[must_use]
    pub fn pool(&self) -> &Arc<dyn ConnectionPool> {
        &self.pool
    }

    /// Obtain a handle for an anonymous request.
    ///
    /// # Errors
    /// Returns [`StorageError`] on allocation failure; resource-management
    /// errors from the pool boundary are unwrapped into the same taxonomy.
    pub async fn get_connection(&self) -> Result<Arc<ConnectionHandle>, StorageError> {
        self.get_connection_with(RequestDescriptor::anonymous()).await
    }

    /// Obtain a handle for the given request descriptor.
    ///
    /// # Errors
    /// Same contract as [`ConnectionEntryPoint::get_connection`].
    pub async fn get_connection_with(
        &self,
        descriptor: RequestDescriptor,
    ) -> Result<Arc<ConnectionHandle>, StorageError> {
        self.initialize_services().await;
        let handle = Arc::clone(&self.pool)
            .allocate(&self.factory, &descriptor)
            .await?;
        Ok(handle)
    }

    /// Extract credentials from the caller context (principal wins over an
    /// explicit username), then obtain a handle bound to them.
    ///
    /// # Errors
    /// Same contract as [`ConnectionEntryPoint::get_connection`].
    pub async fn get_session(
        &self,
        context: &SessionContext,
    ) -> Result<Arc<ConnectionHandle>, StorageError> {
        let descriptor = match context.effective_identity() {
            Some(identity) => RequestDescriptor::with_credentials(Credentials::new(identity)),
            None => RequestDescriptor::anonymous(),
        };
        self.get_connection_with(descriptor).await
    }

    /// One-time resolution of the schema and security services. Idempotent
    /// and safe under concurrent first callers: exactly one caller performs
    /// the lookup, everyone else observes the result. A missing or failed
    /// security lookup degrades to the default allow-all manager instead of
    /// failing the call.
    pub async fn initialize_services(&self) {
        self.services
            .get_or_init(|| async {
                let config = self.factory.config();
                let schema = config
                    .schema_manager_name()
                    .and_then(|name| self.registry.schema_manager(name));
                if schema.is_none() {
                    debug!(repository = config.name(), "no schema manager resolved");
                }
                let security = self
                    .registry
                    .security_manager_or_default(config.security_manager_name());
                // Exactly one caller reaches this closure, so the marker
                // fires once per entry point.
                self.first_access.store(true, Ordering::SeqCst);
                Services { schema, security }
            })
            .await;
    }

    /// True on the first call after services were initialized, then false:
    /// lets upstream code fire one-time setup events.
    pub fn take_first_access(&self) -> bool {
        self.first_access.swap(false, Ordering::SeqCst)
    }

    /// Resolved schema manager, once services are initialized.
    #[must_use]
    pub fn schema_manager(&self) -> Option<Arc<dyn SchemaManager>> {
        self.services.get().and_then(|s| s.schema.clone())
    }

    /// Resolved security manager, once services are initialized.
    #[must_use]
    pub fn security_manager(&self) -> Option<Arc<dyn SecurityManager>> {
        self.services.get().map(|s| Arc::clone(&s.security))
    }
}

impl std::fmt::Debug for ConnectionEntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionEntryPoint")
            .field("factory", &self.factory)
            .field("services_initialized", &self.services.get().is_some())
            .finish()
    }
}
