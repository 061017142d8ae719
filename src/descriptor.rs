use serde::{Deserialize, Serialize};

use crate::model::Credentials;

/// Immutable pool-matching key describing what kind of physical connection is
/// wanted.
///
/// Equality and hashing are structural over the credentials alone: two
/// descriptors with absent credentials are equal, a present/absent pair never
/// is, and two present credentials compare by value. Nothing else (in
/// particular no transaction context) participates in matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestDescriptor {
    credentials: Option<Credentials>,
}

impl RequestDescriptor {
    /// Descriptor for an anonymous (credential-less) connection request.
    #[must_use]
    pub fn anonymous() -> Self {
        Self { credentials: None }
    }

    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        self.credentials.as_ref().map(Credentials::principal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_credentials_compare_equal() {
        assert_eq!(RequestDescriptor::anonymous(), RequestDescriptor::default());
    }

    #[test]
    fn present_vs_absent_never_equal() {
        let with = RequestDescriptor::with_credentials(Credentials::new("alice"));
        assert_ne!(with, RequestDescriptor::anonymous());
    }
}
