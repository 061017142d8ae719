use thiserror::Error;

/// Canonical storage-layer failure for everything flowing through the
/// connector: session operations, repository construction, transaction
/// resource calls.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Repository construction or engine-level failure.
    #[error("repository error: {0}")]
    Repository(String),

    /// A delegated operation was invoked on a disassociated handle. This is a
    /// local precondition check; the underlying session is never reached.
    #[error("operation invoked on a closed connection handle")]
    ClosedHandle,

    /// Failure from the two-phase-commit resource.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Any other storage-layer failure.
    #[error("storage error: {0}")]
    Other(String),
}

/// Failure at the pool/connector boundary. Always carries the underlying
/// [`StorageError`] as its cause when one exists.
#[derive(Debug, Error)]
#[error("resource error: {context}")]
pub struct ResourceError {
    context: String,
    #[source]
    source: Option<StorageError>,
}

impl ResourceError {
    pub fn new(context: impl Into<String>, source: StorageError) -> Self {
        Self {
            context: context.into(),
            source: Some(source),
        }
    }

    /// A boundary failure with no storage-layer cause (e.g. pool bookkeeping).
    pub fn message(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn storage_cause(&self) -> Option<&StorageError> {
        self.source.as_ref()
    }
}

impl From<StorageError> for ResourceError {
    fn from(err: StorageError) -> Self {
        Self::new("storage failure", err)
    }
}

impl From<ResourceError> for StorageError {
    /// Unwraps the storage-layer cause when present so callers above the pool
    /// boundary see a single error taxonomy.
    fn from(err: ResourceError) -> Self {
        match err.source {
            Some(cause) => cause,
            None => StorageError::Other(err.context),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_error_unwraps_its_storage_cause() {
        let err = ResourceError::new("allocating", StorageError::Repository("engine down".into()));
        assert!(err.storage_cause().is_some());
        assert!(matches!(StorageError::from(err), StorageError::Repository(_)));
    }

    #[test]
    fn sourceless_resource_error_maps_to_other() {
        let err = ResourceError::message("pool bookkeeping failed");
        assert!(err.storage_cause().is_none());
        let mapped = StorageError::from(err);
        assert!(matches!(mapped, StorageError::Other(ref msg) if msg == "pool bookkeeping failed"));
    }
}
