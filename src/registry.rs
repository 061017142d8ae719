//! Named schema/security services resolved at configuration time.
//!
//! Replaces runtime class loading with a registry populated at startup: the
//! repository config names the services it wants, the host registers
//! implementations here, and a documented allow-all default stands in when a
//! security lookup misses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::warn;

use crate::model::Node;

/// Schema service consulted by upstream session code.
pub trait SchemaManager: Send + Sync {
    /// Whether a document type of this name exists.
    fn has_type(&self, type_name: &str) -> bool;
}

/// Security service consulted by upstream session code.
pub trait SecurityManager: Send + Sync {
    fn check_permission(&self, node: &Node, permission: &str, principal: &str) -> bool;
}

/// Fallback security manager: grants everything. Used whenever no security
/// manager is configured or the configured name cannot be resolved.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultSecurityManager;

impl SecurityManager for DefaultSecurityManager {
    fn check_permission(&self, _node: &Node, _permission: &str, _principal: &str) -> bool {
        true
    }
}

/// Registry of named service implementations.
#[derive(Default)]
pub struct ServiceRegistry {
    schema: Mutex<HashMap<String, Arc<dyn SchemaManager>>>,
    security: Mutex<HashMap<String, Arc<dyn SecurityManager>>>,
}

impl ServiceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_schema_manager(&self, name: impl Into<String>, svc: Arc<dyn SchemaManager>) {
        self.lock(&self.schema).insert(name.into(), svc);
    }

    pub fn register_security_manager(
        &self,
        name: impl Into<String>,
        svc: Arc<dyn SecurityManager>,
    ) {
        self.lock(&self.security).insert(name.into(), svc);
    }

    #[must_use]
    pub fn schema_manager(&self, name: &str) -> Option<Arc<dyn SchemaManager>> {
        self.lock(&self.schema).get(name).cloned()
    }

    #[must_use]
    pub fn security_manager(&self, name: &str) -> Option<Arc<dyn SecurityManager>> {
        self.lock(&self.security).get(name).cloned()
    }

    /// Resolve the named security manager, degrading to
    /// [`DefaultSecurityManager`] when the name is absent or unregistered.
    #[must_use]
    pub fn security_manager_or_default(&self, name: Option<&str>) -> Arc<dyn SecurityManager> {
        match name {
            Some(name) => self.security_manager(name).unwrap_or_else(|| {
                warn!(service = name, "security manager not registered, using default");
                Arc::new(DefaultSecurityManager)
            }),
            None => Arc::new(DefaultSecurityManager),
        }
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
