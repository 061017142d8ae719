//! Convenient imports for common functionality.

pub use crate::config::RepositoryConfig;
pub use crate::descriptor::RequestDescriptor;
pub use crate::entry::ConnectionEntryPoint;
pub use crate::error::{ResourceError, StorageError};
pub use crate::factory::ConnectionFactoryProvider;
pub use crate::handle::ConnectionHandle;
pub use crate::model::{Credentials, Node, NodeId, Query, QueryKind, SessionContext, VersionInfo};
pub use crate::physical::PhysicalConnection;
pub use crate::pool::{ConnectionPool, LocalPool, PoolStats};
pub use crate::registry::{
    DefaultSecurityManager, SchemaManager, SecurityManager, ServiceRegistry,
};
pub use crate::repository::{Repository, RepositoryBuilder};
pub use crate::session::Session;
pub use crate::xa::{
    EndFlags, PrepareVote, StartFlags, TransactionBoundaryResource, Xid, XaResource,
};
