use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a node in the backing store.
///
/// Document stores hand out string/UUID identifiers; keeping the key opaque
/// here means this layer never interprets it, only passes it through.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Lightweight value handle to a stored node.
///
/// Sessions resolve the node by id; the name and complex flag travel with it
/// so callers do not need a round trip for child-addressing operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    id: NodeId,
    name: String,
    complex: bool,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, complex: bool) -> Self {
        Self {
            id,
            name: name.into(),
            complex,
        }
    }

    #[must_use]
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this node is a complex property rather than a regular child.
    #[must_use]
    pub fn is_complex(&self) -> bool {
        self.complex
    }
}

/// Query language accepted by the backing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    Nxql,
    Xpath,
}

/// A query against the store. Evaluation returns an ordered sequence of
/// matching node identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    statement: String,
    kind: QueryKind,
}

impl Query {
    pub fn new(statement: impl Into<String>, kind: QueryKind) -> Self {
        Self {
            statement: statement.into(),
            kind,
        }
    }

    pub fn nxql(statement: impl Into<String>) -> Self {
        Self::new(statement, QueryKind::Nxql)
    }

    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    #[must_use]
    pub fn kind(&self) -> QueryKind {
        self.kind
    }
}

/// Metadata for one stored version of a versionable node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionInfo {
    label: String,
    description: Option<String>,
    created: NaiveDateTime,
}

impl VersionInfo {
    pub fn new(
        label: impl Into<String>,
        description: Option<String>,
        created: NaiveDateTime,
    ) -> Self {
        Self {
            label: label.into(),
            description,
            created,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn created(&self) -> NaiveDateTime {
        self.created
    }
}

/// Caller credentials carried by a connection request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Credentials {
    principal: String,
}

impl Credentials {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
        }
    }

    #[must_use]
    pub fn principal(&self) -> &str {
        &self.principal
    }
}

/// Caller-supplied context for [`ConnectionEntryPoint::get_session`].
///
/// The principal wins over an explicit username when both are present.
///
/// [`ConnectionEntryPoint::get_session`]: crate::entry::ConnectionEntryPoint::get_session
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    principal: Option<String>,
    username: Option<String>,
}

impl SessionContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The effective identity for descriptor construction, if any.
    #[must_use]
    pub fn effective_identity(&self) -> Option<&str> {
        self.principal().or_else(|| self.username())
    }
}
