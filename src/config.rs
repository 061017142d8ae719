use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Connection parameters for the backing repository.
///
/// Built up at configuration time as a loose property bag; the repository
/// builder interprets the keys it understands. Two keys are meaningful to
/// this layer itself: `schema-manager` and `security-manager` name the
/// services resolved from the [`ServiceRegistry`] on first access.
///
/// [`ServiceRegistry`]: crate::registry::ServiceRegistry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    name: String,
    properties: BTreeMap<String, JsonValue>,
}

pub const SCHEMA_MANAGER_KEY: &str = "schema-manager";
pub const SECURITY_MANAGER_KEY: &str = "security-manager";

impl RepositoryConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<JsonValue>) {
        self.properties.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.set_property(key, value);
        self
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&JsonValue> {
        self.properties.get(key)
    }

    #[must_use]
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(JsonValue::as_str)
    }

    #[must_use]
    pub fn schema_manager_name(&self) -> Option<&str> {
        self.property_str(SCHEMA_MANAGER_KEY)
    }

    #[must_use]
    pub fn security_manager_name(&self) -> Option<&str> {
        self.property_str(SECURITY_MANAGER_KEY)
    }

    #[must_use]
    pub fn properties(&self) -> &BTreeMap<String, JsonValue> {
        &self.properties
    }
}
