//! Three-segment fabric identities.
//!
//! Every application, channel and participant on the fabric is addressed by
//! an `organization/namespace/application` triple. The string form and
//! equality are exact triples; an optional numeric instance suffix can be
//! attached for routing but never takes part in comparison.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Error raised when a string does not parse as a fabric identity.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid identity '{0}': expected organization/namespace/application")]
pub struct NameError(pub String);

/// A fabric identity: `organization/namespace/application`.
#[derive(Debug, Clone)]
pub struct Name {
    components: [String; 3],
    /// Optional instance discriminator. Excluded from equality and hashing.
    id: Option<u64>,
}

impl Name {
    pub fn new(
        organization: impl Into<String>,
        namespace: impl Into<String>,
        application: impl Into<String>,
    ) -> Self {
        Self {
            components: [organization.into(), namespace.into(), application.into()],
            id: None,
        }
    }

    /// Parse an `org/namespace/app` string. Exactly three non-empty
    /// segments are required.
    pub fn parse(id: &str) -> Result<Self, NameError> {
        let parts: Vec<&str> = id.split('/').collect();
        if parts.len() != 3 || parts.iter().any(|p| p.is_empty()) {
            return Err(NameError(id.to_string()));
        }
        Ok(Self::new(parts[0], parts[1], parts[2]))
    }

    /// Attach a numeric instance suffix.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }

    pub fn organization(&self) -> &str {
        &self.components[0]
    }

    pub fn namespace(&self) -> &str {
        &self.components[1]
    }

    pub fn application(&self) -> &str {
        &self.components[2]
    }

    pub fn instance_id(&self) -> Option<u64> {
        self.id
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.components[0], self.components[1], self.components[2]
        )
    }
}

impl FromStr for Name {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for Name {
    fn eq(&self, other: &Self) -> bool {
        self.components == other.components
    }
}

impl Eq for Name {}

impl Hash for Name {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.components.hash(state);
    }
}
