//! Transactional connection pooling and handle multiplexing for
//! document-store sessions.
//!
//! Many short-lived logical connections share a small set of expensive
//! physical sessions to the store: a [`ConnectionFactoryProvider`] creates
//! [`PhysicalConnection`]s on demand (building the backing repository exactly
//! once), a pool hands out [`ConnectionHandle`]s over them, and a
//! [`TransactionBoundaryResource`] guarantees that ending a transaction
//! branch closes every handle of its physical connection, so no handle ever
//! outlives the branch that opened it.
//!
//! [`ConnectionFactoryProvider`]: factory::ConnectionFactoryProvider
//! [`PhysicalConnection`]: physical::PhysicalConnection
//! [`ConnectionHandle`]: handle::ConnectionHandle
//! [`TransactionBoundaryResource`]: xa::TransactionBoundaryResource

pub mod config;
pub mod descriptor;
pub mod entry;
pub mod error;
pub mod factory;
pub mod handle;
pub mod model;
pub mod physical;
pub mod pool;
pub mod prelude;
pub mod registry;
pub mod repository;
pub mod session;
pub mod xa;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use error::{ResourceError, StorageError};
