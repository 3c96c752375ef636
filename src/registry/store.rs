//! The object registry.
//!
//! The registry is the single source of truth for every network and node in
//! an emulation. Layers share state exclusively through it. Entries keep
//! their insertion order; the binding resolver relies on that order when
//! several physical nodes satisfy a filter.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::types::{Kind, RegistryKey, Scope};
use crate::error::{EmulatorError, Result};
use crate::node::{Network, Node};

/// An object stored in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Registrable {
    Network(Network),
    Node(Node),
}

impl Registrable {
    /// Kind this object must be registered under.
    pub fn kind(&self) -> Kind {
        match self {
            Registrable::Network(_) => Kind::Net,
            Registrable::Node(node) => node.role().kind(),
        }
    }

    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Registrable::Node(node) => Some(node),
            _ => None,
        }
    }

    pub fn as_network(&self) -> Option<&Network> {
        match self {
            Registrable::Network(net) => Some(net),
            _ => None,
        }
    }
}

/// Scoped key-value store of emulation objects.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Registry {
    objects: IndexMap<RegistryKey, Registrable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object. Fails if the key is taken or if the object
    /// does not match the requested kind.
    pub fn register(
        &mut self,
        scope: Scope,
        kind: Kind,
        name: &str,
        object: Registrable,
    ) -> Result<&mut Registrable> {
        let key = RegistryKey::new(scope, kind, name);
        if object.kind() != kind {
            return Err(EmulatorError::KindMismatch {
                key,
                found: object.kind(),
            });
        }
        if self.objects.contains_key(&key) {
            return Err(EmulatorError::DuplicateKey(key));
        }
        log::debug!("Registered {}", key);
        let entry = self.objects.entry(key).or_insert(object);
        Ok(entry)
    }

    /// Register a node under the kind implied by its role and its own
    /// name, returning the key it was stored under.
    pub fn register_node(&mut self, scope: Scope, node: Node) -> Result<RegistryKey> {
        let key = RegistryKey::new(scope, node.role().kind(), node.name());
        let name = key.name.clone();
        self.register(scope, key.kind, &name, Registrable::Node(node))?;
        Ok(key)
    }

    /// Register a network under its own scope and name.
    pub fn register_network(&mut self, network: Network) -> Result<RegistryKey> {
        let key = RegistryKey::new(network.scope(), Kind::Net, network.name());
        let name = key.name.clone();
        self.register(key.scope, Kind::Net, &name, Registrable::Network(network))?;
        Ok(key)
    }

    pub fn has(&self, scope: Scope, kind: Kind, name: &str) -> bool {
        self.objects.contains_key(&RegistryKey::new(scope, kind, name))
    }

    pub fn get(&self, scope: Scope, kind: Kind, name: &str) -> Option<&Registrable> {
        self.objects.get(&RegistryKey::new(scope, kind, name))
    }

    pub fn get_mut(&mut self, scope: Scope, kind: Kind, name: &str) -> Option<&mut Registrable> {
        self.objects.get_mut(&RegistryKey::new(scope, kind, name))
    }

    /// All objects of one kind within one scope, in insertion order.
    pub fn get_by_type(&self, scope: Scope, kind: Kind) -> Vec<(&RegistryKey, &Registrable)> {
        self.objects
            .iter()
            .filter(|(key, _)| key.scope == scope && key.kind == kind)
            .collect()
    }

    /// All objects within one scope, in insertion order.
    pub fn get_by_scope(&self, scope: Scope) -> Vec<(&RegistryKey, &Registrable)> {
        self.objects
            .iter()
            .filter(|(key, _)| key.scope == scope)
            .collect()
    }

    /// Every registered object, in insertion order.
    pub fn get_all(&self) -> impl Iterator<Item = (&RegistryKey, &Registrable)> {
        self.objects.iter()
    }

    pub fn node(&self, key: &RegistryKey) -> Result<&Node> {
        self.objects
            .get(key)
            .and_then(Registrable::as_node)
            .ok_or_else(|| EmulatorError::NotFound(key.clone()))
    }

    pub fn node_mut(&mut self, key: &RegistryKey) -> Result<&mut Node> {
        match self.objects.get_mut(key) {
            Some(Registrable::Node(node)) => Ok(node),
            _ => Err(EmulatorError::NotFound(key.clone())),
        }
    }

    pub fn network(&self, scope: Scope, name: &str) -> Result<&Network> {
        let key = RegistryKey::new(scope, Kind::Net, name);
        self.objects
            .get(&key)
            .and_then(Registrable::as_network)
            .ok_or(EmulatorError::NotFound(key))
    }

    pub fn network_mut(&mut self, scope: Scope, name: &str) -> Result<&mut Network> {
        let key = RegistryKey::new(scope, Kind::Net, name);
        match self.objects.get_mut(&key) {
            Some(Registrable::Network(net)) => Ok(net),
            _ => Err(EmulatorError::NotFound(key)),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Move every entry of `other` into this registry, keeping this
    /// registry's entries first.
    pub fn absorb(&mut self, other: Registry) -> Result<()> {
        for (key, object) in other.objects {
            if self.objects.contains_key(&key) {
                return Err(EmulatorError::DuplicateKey(key));
            }
            self.objects.insert(key, object);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeRole;

    fn host(name: &str, asn: u32) -> Node {
        Node::new(name, asn, NodeRole::Host)
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = Registry::new();
        registry
            .register(Scope::As(150), Kind::HNode, "web", Registrable::Node(host("web", 150)))
            .unwrap();

        assert!(registry.has(Scope::As(150), Kind::HNode, "web"));
        assert!(!registry.has(Scope::As(151), Kind::HNode, "web"));
        let node = registry.get(Scope::As(150), Kind::HNode, "web").unwrap();
        assert_eq!(node.as_node().unwrap().name(), "web");
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut registry = Registry::new();
        registry.register_node(Scope::As(150), host("web", 150)).unwrap();
        let err = registry.register_node(Scope::As(150), host("web", 150)).unwrap_err();
        assert!(matches!(err, EmulatorError::DuplicateKey(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_kind_mismatch_rejected() {
        let mut registry = Registry::new();
        let err = registry
            .register(Scope::As(150), Kind::RNode, "web", Registrable::Node(host("web", 150)))
            .unwrap_err();
        assert!(matches!(err, EmulatorError::KindMismatch { found: Kind::HNode, .. }));
    }

    #[test]
    fn test_insertion_order_is_preserved() {
        let mut registry = Registry::new();
        for name in ["c", "a", "b"] {
            registry.register_node(Scope::As(2), host(name, 2)).unwrap();
        }
        registry
            .register_node(Scope::As(3), Node::new("r0", 3, NodeRole::Router))
            .unwrap();

        let names: Vec<&str> = registry.get_all().map(|(k, _)| k.name.as_str()).collect();
        assert_eq!(names, vec!["c", "a", "b", "r0"]);

        let hosts: Vec<&str> = registry
            .get_by_type(Scope::As(2), Kind::HNode)
            .into_iter()
            .map(|(k, _)| k.name.as_str())
            .collect();
        assert_eq!(hosts, vec!["c", "a", "b"]);
        assert_eq!(registry.get_by_scope(Scope::As(3)).len(), 1);
    }

    #[test]
    fn test_node_lookup_errors() {
        let registry = Registry::new();
        let key = RegistryKey::new(Scope::As(1), Kind::HNode, "missing");
        assert!(matches!(registry.node(&key), Err(EmulatorError::NotFound(_))));
        assert!(registry.network(Scope::As(1), "net0").is_err());
    }

    #[test]
    fn test_absorb_rejects_duplicates() {
        let mut a = Registry::new();
        a.register_node(Scope::As(1), host("h", 1)).unwrap();
        let mut b = Registry::new();
        b.register_node(Scope::As(2), host("h", 2)).unwrap();
        a.absorb(b).unwrap();
        assert_eq!(a.len(), 2);

        let mut c = Registry::new();
        c.register_node(Scope::As(1), host("h", 1)).unwrap();
        assert!(a.absorb(c).is_err());
    }
}
