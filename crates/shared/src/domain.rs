use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

/// National id or subject code, as typed by the operator and sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExternalKey(pub String);

impl ExternalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ExternalKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl fmt::Display for ExternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Person,
    Subject,
}

impl EntityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Person => "person",
            EntityKind::Subject => "subject",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An external record confirmed by the backend, held only while a workflow is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedEntity {
    pub kind: EntityKind,
    pub external_key: ExternalKey,
    pub display_fields: BTreeMap<String, String>,
    pub resolved: bool,
}

impl ResolvedEntity {
    pub fn new(
        kind: EntityKind,
        external_key: ExternalKey,
        display_fields: BTreeMap<String, String>,
    ) -> Self {
        Self {
            kind,
            external_key,
            display_fields,
            resolved: true,
        }
    }

    pub fn display_field(&self, name: &str) -> Option<&str> {
        self.display_fields.get(name).map(String::as_str)
    }
}

/// Opaque bearer credential. Never empty; `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}
