//! Pool seam and the minimal in-process implementation.
//!
//! The real pool (sizing, eviction, transaction enlistment timing) is a host
//! concern; this crate only defines the allocation contract and ships
//! [`LocalPool`], a free-list pool good enough for standalone use and tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::descriptor::RequestDescriptor;
use crate::error::ResourceError;
use crate::factory::ConnectionFactoryProvider;
use crate::handle::ConnectionHandle;
use crate::physical::PhysicalConnection;

/// Allocates logical handles over pooled physical connections.
#[async_trait]
pub trait ConnectionPool: Send + Sync {
    /// Produce a handle for the given factory and request, reusing an idle
    /// physical connection when the factory's matching rule allows it.
    ///
    /// # Errors
    /// Returns [`ResourceError`] (carrying the storage-layer cause when one
    /// exists) if no connection can be produced.
    async fn allocate(
        self: Arc<Self>,
        factory: &Arc<ConnectionFactoryProvider>,
        descriptor: &RequestDescriptor,
    ) -> Result<Arc<ConnectionHandle>, ResourceError>;

    /// Give a physical connection back after a handle was released. The pool
    /// decides whether the connection becomes reusable; connections with
    /// remaining live handles stay checked out.
    async fn release(&self, physical: &Arc<PhysicalConnection>);
}

/// Snapshot of a [`LocalPool`]'s bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total_connections: usize,
    pub idle_connections: usize,
    pub in_use_connections: usize,
}

/// Minimal in-process pool: an unbounded free list matched through
/// [`ConnectionFactoryProvider::match_candidate`]. No sizing, no eviction,
/// no timeouts.
pub struct LocalPool {
    idle: Mutex<Vec<Arc<PhysicalConnection>>>,
    // Ids of destroyed connections already written off the total, so a late
    // release cannot double-count them.
    retired: Mutex<HashSet<u64>>,
    total: AtomicUsize,
}

impl LocalPool {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            idle: Mutex::new(Vec::new()),
            retired: Mutex::new(HashSet::new()),
            total: AtomicUsize::new(0),
        })
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        let idle = self.lock_idle().len();
        let total = self.total.load(Ordering::SeqCst);
        PoolStats {
            total_connections: total,
            idle_connections: idle,
            in_use_connections: total.saturating_sub(idle),
        }
    }

    /// Destroy every idle connection. Checked-out connections are untouched.
    pub async fn drain(&self) {
        let drained = std::mem::take(&mut *self.lock_idle());
        for physical in drained {
            self.retire(&physical);
            if let Err(err) = physical.destroy().await {
                debug!(connection = physical.id(), error = %err, "destroy failed during drain");
            }
        }
    }

    /// Write a destroyed connection off the total, at most once per id.
    fn retire(&self, physical: &Arc<PhysicalConnection>) {
        let newly = self
            .retired
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(physical.id());
        if newly {
            let _ = self
                .total
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| t.checked_sub(1));
        }
    }

    fn lock_idle(&self) -> MutexGuard<'_, Vec<Arc<PhysicalConnection>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ConnectionPool for LocalPool {
    async fn allocate(
        self: Arc<Self>,
        factory: &Arc<ConnectionFactoryProvider>,
        descriptor: &RequestDescriptor,
    ) -> Result<Arc<ConnectionHandle>, ResourceError> {
        let matched = {
            let mut idle = self.lock_idle();
            let matched = factory.match_candidate(&idle, descriptor);
            if let Some(found) = &matched {
                idle.retain(|candidate| !Arc::ptr_eq(candidate, found));
            }
            matched
        };

        let physical = match matched {
            Some(physical) => {
                debug!(connection = physical.id(), "reusing idle physical connection");
                physical
            }
            None => {
                let created = factory
                    .create_physical_connection(descriptor)
                    .await
                    .map_err(|err| ResourceError::new("allocating physical connection", err))?;
                self.total.fetch_add(1, Ordering::SeqCst);
                created
            }
        };

        let pool = Arc::clone(&self) as Arc<dyn ConnectionPool>;
        Ok(physical.mint_handle(Arc::downgrade(&pool)))
    }

    async fn release(&self, physical: &Arc<PhysicalConnection>) {
        if physical.handle_count() > 0 {
            // Other handles still ride this connection; it stays checked out.
            return;
        }
        if physical.is_destroyed() {
            // Destroyed while checked out; write it off instead of re-pooling
            // a dead connection.
            self.retire(physical);
            return;
        }
        physical.cleanup();
        let mut idle = self.lock_idle();
        if !idle.iter().any(|candidate| Arc::ptr_eq(candidate, physical)) {
            idle.push(Arc::clone(physical));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mem_factory;

    #[tokio::test]
    async fn stats_track_checkout_and_release() {
        let (factory, _) = mem_factory("pool-stats");
        let pool = LocalPool::new();

        assert_eq!(
            pool.stats(),
            PoolStats {
                total_connections: 0,
                idle_connections: 0,
                in_use_connections: 0,
            }
        );

        let handle = Arc::clone(&pool)
            .allocate(&factory, &RequestDescriptor::anonymous())
            .await
            .expect("allocate");
        assert_eq!(pool.stats().in_use_connections, 1);
        assert_eq!(pool.stats().idle_connections, 0);

        handle.close().await;
        assert_eq!(pool.stats().idle_connections, 1);
        assert_eq!(pool.stats().in_use_connections, 0);
    }

    #[tokio::test]
    async fn release_with_live_handles_keeps_the_connection_checked_out() {
        let (factory, _) = mem_factory("pool-release-live");
        let pool = LocalPool::new();

        let handle = Arc::clone(&pool)
            .allocate(&factory, &RequestDescriptor::anonymous())
            .await
            .expect("allocate");
        let physical = handle.physical_connection().expect("associated");

        pool.release(&physical).await;
        assert_eq!(pool.stats().idle_connections, 0);
        assert!(handle.is_live());
    }

    #[tokio::test]
    async fn destroyed_connection_is_written_off_on_release() {
        let (factory, _) = mem_factory("pool-write-off");
        let pool = LocalPool::new();

        let handle = Arc::clone(&pool)
            .allocate(&factory, &RequestDescriptor::anonymous())
            .await
            .expect("allocate");
        let physical = handle.physical_connection().expect("associated");
        physical.destroy().await.expect("destroy");

        handle.close().await;
        assert_eq!(
            pool.stats(),
            PoolStats {
                total_connections: 0,
                idle_connections: 0,
                in_use_connections: 0,
            }
        );
    }
}
