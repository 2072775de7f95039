//! Shared domain enums.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of a stored secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecretType {
    /// A value written by an operator or application and read back as-is.
    Static,
    /// A credential issued on demand by an engine and bounded by a lease.
    Dynamic,
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static => write!(f, "static"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

impl FromStr for SecretType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "static" => Ok(Self::Static),
            "dynamic" => Ok(Self::Dynamic),
            other => Err(format!("unknown secret type {other:?}")),
        }
    }
}

/// Lifecycle status of a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    /// Process started, not yet registered for work.
    Starting,
    /// Holding the init lock and initializing the vault.
    Initializing,
    /// Registered but the local vault is sealed.
    Sealed,
    /// Registered and serving with the master key in memory.
    Unsealed,
    /// Clean shutdown in progress; exempt from the stale sweep.
    Shutdown,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Initializing => write!(f, "initializing"),
            Self::Sealed => write!(f, "sealed"),
            Self::Unsealed => write!(f, "unsealed"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

impl FromStr for NodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "initializing" => Ok(Self::Initializing),
            "sealed" => Ok(Self::Sealed),
            "unsealed" => Ok(Self::Unsealed),
            "shutdown" => Ok(Self::Shutdown),
            other => Err(format!("unknown node status {other:?}")),
        }
    }
}

/// Operations a policy can allow on a secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Read and decrypt a secret.
    Read,
    /// Create or update a secret.
    Write,
    /// Delete a secret.
    Delete,
    /// Enumerate secret metadata.
    List,
    /// Trigger a rotation.
    Rotate,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Operation {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Rotate => "rotate",
        }
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "delete" => Ok(Self::Delete),
            "list" => Ok(Self::List),
            "rotate" => Ok(Self::Rotate),
            other => Err(format!("unknown operation {other:?}")),
        }
    }
}

/// Kind of actor behind an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    /// A host agent holding a client certificate.
    Agent,
    /// An application identity resolved through an agent.
    Application,
    /// A human operator.
    Admin,
    /// The control plane itself (timers, coordinators).
    System,
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Application => write!(f, "application"),
            Self::Admin => write!(f, "admin"),
            Self::System => write!(f, "system"),
        }
    }
}

impl FromStr for ActorType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(Self::Agent),
            "application" => Ok(Self::Application),
            "admin" => Ok(Self::Admin),
            "system" => Ok(Self::System),
            other => Err(format!("unknown actor type {other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_roundtrip() {
        for op in [
            Operation::Read,
            Operation::Write,
            Operation::Delete,
            Operation::List,
            Operation::Rotate,
        ] {
            assert_eq!(op.as_str().parse::<Operation>().unwrap(), op);
        }
    }

    #[test]
    fn test_unknown_operation() {
        assert!("explode".parse::<Operation>().is_err());
    }

    #[test]
    fn test_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&NodeStatus::Unsealed).unwrap(),
            "\"unsealed\""
        );
        assert_eq!(
            serde_json::to_string(&SecretType::Dynamic).unwrap(),
            "\"dynamic\""
        );
    }
}
