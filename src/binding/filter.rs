//! Candidate filters for bindings.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use crate::error::{EmulatorError, Result};
use crate::node::Node;
use crate::utils::ip_utils::Ipv4Prefix;

/// Custom predicate over `(vnode name, candidate node)`.
pub type NodePredicate = Arc<dyn Fn(&str, &Node) -> bool>;

/// Conditions a physical node must meet to be bound to a virtual node.
/// Every condition that is set must hold.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct Filter {
    pub asn: Option<u32>,
    /// Regex matched against the whole node name
    pub node_name: Option<String>,
    /// Any interface carries exactly this address
    pub ip: Option<Ipv4Addr>,
    /// Any interface address lies inside this prefix
    pub prefix: Option<Ipv4Prefix>,
    /// Nodes already bound to another vnode stay candidates
    pub allow_bound: bool,
    #[serde(skip)]
    custom: Option<NodePredicate>,
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter")
            .field("asn", &self.asn)
            .field("node_name", &self.node_name)
            .field("ip", &self.ip)
            .field("prefix", &self.prefix)
            .field("allow_bound", &self.allow_bound)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_asn(mut self, asn: u32) -> Self {
        self.asn = Some(asn);
        self
    }

    pub fn with_node_name(mut self, pattern: impl Into<String>) -> Self {
        self.node_name = Some(pattern.into());
        self
    }

    pub fn with_ip(mut self, ip: Ipv4Addr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn with_prefix(mut self, prefix: Ipv4Prefix) -> Self {
        self.prefix = Some(prefix);
        self
    }

    pub fn with_allow_bound(mut self, allow_bound: bool) -> Self {
        self.allow_bound = allow_bound;
        self
    }

    pub fn with_custom(mut self, predicate: impl Fn(&str, &Node) -> bool + 'static) -> Self {
        self.custom = Some(Arc::new(predicate));
        self
    }

    /// Whether a closure predicate is attached. Such filters cannot be
    /// written to a snapshot.
    pub fn has_custom(&self) -> bool {
        self.custom.is_some()
    }

    pub(crate) fn compile(&self) -> Result<CompiledFilter<'_>> {
        let node_name = self.node_name.as_deref().map(whole_match).transpose()?;
        Ok(CompiledFilter { filter: self, node_name })
    }
}

/// Compile `pattern` so it only matches whole strings.
pub(crate) fn whole_match(pattern: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| EmulatorError::InvalidPattern {
        pattern: pattern.to_string(),
        source,
    })
}

/// A filter with its name pattern compiled.
pub(crate) struct CompiledFilter<'a> {
    filter: &'a Filter,
    node_name: Option<Regex>,
}

impl CompiledFilter<'_> {
    pub(crate) fn filter(&self) -> &Filter {
        self.filter
    }

    pub(crate) fn matches(&self, vnode: &str, node: &Node) -> bool {
        let filter = self.filter;
        if filter.asn.is_some_and(|asn| asn != node.asn()) {
            return false;
        }
        if let Some(pattern) = &self.node_name {
            if !pattern.is_match(node.name()) {
                return false;
            }
        }
        if let Some(ip) = filter.ip {
            if !node.addresses().any(|addr| addr == ip) {
                return false;
            }
        }
        if let Some(prefix) = filter.prefix {
            if !node.addresses().any(|addr| prefix.contains(addr)) {
                return false;
            }
        }
        if let Some(predicate) = &filter.custom {
            if !predicate(vnode, node) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Interface, NodeRole};
    use crate::registry::Scope;

    fn host(name: &str, asn: u32, addr: Ipv4Addr) -> Node {
        let mut node = Node::new(name, asn, NodeRole::Host);
        node.add_interface(Interface {
            scope: Scope::As(asn),
            network: "net0".to_string(),
            address: addr,
            prefix_len: 24,
        });
        node
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = Filter::new();
        let compiled = filter.compile().unwrap();
        assert!(compiled.matches("v", &host("a", 150, Ipv4Addr::new(10, 150, 0, 71))));
    }

    #[test]
    fn test_all_conditions_must_hold() {
        let node = host("web1", 150, Ipv4Addr::new(10, 150, 0, 71));

        let both = Filter::new().with_asn(150).with_node_name("web.*");
        assert!(both.compile().unwrap().matches("v", &node));

        let wrong_asn = Filter::new().with_asn(151).with_node_name("web.*");
        assert!(!wrong_asn.compile().unwrap().matches("v", &node));

        let wrong_ip = Filter::new().with_asn(150).with_ip(Ipv4Addr::new(10, 150, 0, 72));
        assert!(!wrong_ip.compile().unwrap().matches("v", &node));

        let prefix = Filter::new().with_prefix("10.150.0.0/16".parse().unwrap());
        assert!(prefix.compile().unwrap().matches("v", &node));
    }

    #[test]
    fn test_node_name_is_whole_match() {
        let node = host("web10", 150, Ipv4Addr::new(10, 150, 0, 71));
        let filter = Filter::new().with_node_name("web1");
        assert!(!filter.compile().unwrap().matches("v", &node));
    }

    #[test]
    fn test_custom_predicate_sees_vnode() {
        let node = host("db", 151, Ipv4Addr::new(10, 151, 0, 71));
        let filter = Filter::new().with_custom(|vnode, node| vnode == "db_v" && node.asn() == 151);
        assert!(filter.has_custom());
        let compiled = filter.compile().unwrap();
        assert!(compiled.matches("db_v", &node));
        assert!(!compiled.matches("other", &node));
    }

    #[test]
    fn test_invalid_node_name_pattern() {
        let filter = Filter::new().with_node_name("web(");
        assert!(matches!(filter.compile(), Err(EmulatorError::InvalidPattern { .. })));
    }
}
