//! Registry key types.
//!
//! Every object in an emulation is addressed by a `(scope, kind, name)`
//! triple. Scopes namespace objects by autonomous system or internet
//! exchange; kinds tag the role of the object.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Namespace of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Scope {
    /// Emulator-wide objects
    System,
    /// Objects owned by an autonomous system
    As(u32),
    /// Objects owned by an internet exchange
    Ix(u32),
}

impl Scope {
    /// ASN of the scope, 0 for non-AS scopes.
    pub fn asn(&self) -> u32 {
        match self {
            Scope::As(asn) => *asn,
            _ => 0,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::System => write!(f, "system"),
            Scope::As(asn) => write!(f, "{}", asn),
            Scope::Ix(id) => write!(f, "ix{}", id),
        }
    }
}

/// Role of a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Kind {
    /// Network
    Net,
    /// Host node
    HNode,
    /// Router node
    RNode,
    /// Route server at an internet exchange
    Rs,
}

impl Kind {
    /// True for the node kinds.
    pub fn is_node(&self) -> bool {
        !matches!(self, Kind::Net)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Net => "net",
            Kind::HNode => "hnode",
            Kind::RNode => "rnode",
            Kind::Rs => "rs",
        };
        f.write_str(s)
    }
}

/// Fully qualified registry key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistryKey {
    pub scope: Scope,
    pub kind: Kind,
    pub name: String,
}

impl RegistryKey {
    pub fn new(scope: Scope, kind: Kind, name: impl Into<String>) -> Self {
        Self {
            scope,
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scope, self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_display() {
        let key = RegistryKey::new(Scope::As(150), Kind::HNode, "web");
        assert_eq!(key.to_string(), "150/hnode/web");

        let key = RegistryKey::new(Scope::Ix(100), Kind::Rs, "ix100");
        assert_eq!(key.to_string(), "ix100/rs/ix100");

        let key = RegistryKey::new(Scope::System, Kind::Net, "mgmt");
        assert_eq!(key.to_string(), "system/net/mgmt");
    }

    #[test]
    fn test_scope_asn() {
        assert_eq!(Scope::As(2).asn(), 2);
        assert_eq!(Scope::Ix(100).asn(), 0);
        assert_eq!(Scope::System.asn(), 0);
    }
}
