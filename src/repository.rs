use std::sync::Arc;

use async_trait::async_trait;

use crate::config::RepositoryConfig;
use crate::descriptor::RequestDescriptor;
use crate::error::StorageError;
use crate::session::Session;

/// The backing storage engine, built once per factory and shared by every
/// physical connection the factory creates.
#[async_trait]
pub trait Repository: Send + Sync {
    fn name(&self) -> &str;

    /// Open a new session for the given request.
    ///
    /// # Errors
    /// Returns [`StorageError`] if the engine cannot open a session.
    async fn new_session(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<Arc<dyn Session>, StorageError>;

    /// Number of currently-open sessions.
    fn active_sessions_count(&self) -> usize;

    /// Drop engine-level caches, returning how many entries were cleared.
    fn clear_caches(&self) -> usize;
}

/// Host-supplied constructor for the repository instance.
///
/// Construction is expensive and may fail; the factory runs it at most once
/// concurrently and retries on a later request if it failed.
#[async_trait]
pub trait RepositoryBuilder: Send + Sync {
    /// # Errors
    /// Returns [`StorageError::Repository`] when the engine cannot be built.
    async fn build(&self, config: RepositoryConfig) -> Result<Arc<dyn Repository>, StorageError>;
}
