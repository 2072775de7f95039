//! Typed identifiers.
//!
//! UUID-backed newtypes for record identities and string-backed newtypes
//! for externally supplied identities (entities, nodes). Keeping these
//! distinct at the type level prevents an entity ID from being handed to a
//! lookup that expects a secret ID.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Mint a fresh random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }
    };
}

uuid_id! {
    /// Identity of a stored secret.
    SecretId
}

uuid_id! {
    /// Identity of a policy.
    PolicyId
}

uuid_id! {
    /// Identity of a dynamic-credential lease.
    LeaseId
}

uuid_id! {
    /// Identity of an audit event.
    EventId
}

uuid_id! {
    /// Correlation identifier threading one logical request through audit
    /// events and log lines.
    CorrelationId
}

/// Identity of a cluster node.
///
/// Stable for the lifetime of a node process: `"{hostname}-{8 hex chars}"`.
/// Generated by the cluster coordinator at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub String);

impl NodeId {
    /// Wrap an existing node identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a client of the system — an agent, application, or admin —
/// as bound in policy entity bindings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    /// Wrap an existing entity identifier string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_ids_are_distinct() {
        let a = SecretId::new();
        let b = SecretId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_display_roundtrip() {
        let id = PolicyId::new();
        let parsed = Uuid::parse_str(&id.to_string()).unwrap();
        assert_eq!(id.0, parsed);
    }

    #[test]
    fn test_string_ids() {
        let node = NodeId::new("host-a1b2c3d4");
        assert_eq!(node.as_str(), "host-a1b2c3d4");
        assert_eq!(node.to_string(), "host-a1b2c3d4");
    }

    #[test]
    fn test_serde() {
        let id = EventId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
