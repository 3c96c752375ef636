//! Base topology layer.
//!
//! The base layer owns the autonomous systems and internet exchanges of an
//! emulation. It is the bootstrap layer: the emulator configures it before
//! resolving virtual nodes, so every network and node it declares is in the
//! registry by the time bindings are evaluated.
//!
//! ## Addressing
//!
//! - AS networks default to `10.{asn}.{index}.0/24`
//! - IX peering LANs default to `10.{ix}.0.0/24`
//! - a route server takes `.{ix}` on its peering LAN
//! - a router joining an IX takes `.{asn}` when it fits the prefix
//! - everything else follows the network's [`AddressPolicy`]

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::traits::Layer;
use crate::emulator::Emulator;
use crate::error::{EmulatorError, Result};
use crate::node::{AddressPolicy, Interface, Network, NetworkKind, Node, NodeRole};
use crate::registry::{Registry, RegistryKey, Scope};
use crate::utils::ip_utils::Ipv4Prefix;

/// Name and type name of the base layer.
pub const BASE_LAYER: &str = "Base";

/// Options of the base layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BaseConfig {
    pub address_policy: AddressPolicy,
}

/// An autonomous system: local networks plus the nodes attached to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomousSystem {
    asn: u32,
    networks: IndexMap<String, Ipv4Prefix>,
    nodes: IndexMap<String, Node>,
}

impl AutonomousSystem {
    pub fn new(asn: u32) -> Self {
        Self {
            asn,
            networks: IndexMap::new(),
            nodes: IndexMap::new(),
        }
    }

    pub fn asn(&self) -> u32 {
        self.asn
    }

    /// Create a network with the next automatic `/24`.
    pub fn create_network(&mut self, name: &str) -> Result<Ipv4Prefix> {
        let index = self.networks.len() as u32;
        if self.asn > 255 || index > 255 {
            return Err(EmulatorError::Address(format!(
                "cannot derive a prefix for network {} of AS{}; give it an explicit prefix",
                name, self.asn
            )));
        }
        let prefix = Ipv4Prefix::new(Ipv4Addr::new(10, self.asn as u8, index as u8, 0), 24)
            .map_err(EmulatorError::Address)?;
        self.create_network_with_prefix(name, prefix)?;
        Ok(prefix)
    }

    pub fn create_network_with_prefix(&mut self, name: &str, prefix: Ipv4Prefix) -> Result<()> {
        if self.networks.contains_key(name) {
            return Err(self.error(format!("network {} already exists", name)));
        }
        self.networks.insert(name.to_string(), prefix);
        Ok(())
    }

    pub fn create_host(&mut self, name: &str) -> Result<&mut Node> {
        self.create_node(name, NodeRole::Host)
    }

    pub fn create_router(&mut self, name: &str) -> Result<&mut Node> {
        self.create_node(name, NodeRole::Router)
    }

    fn create_node(&mut self, name: &str, role: NodeRole) -> Result<&mut Node> {
        if self.nodes.contains_key(name) {
            return Err(self.error(format!("node {} already exists", name)));
        }
        let node = Node::new(name, self.asn, role);
        Ok(self.nodes.entry(name.to_string()).or_insert(node))
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    pub fn networks(&self) -> &IndexMap<String, Ipv4Prefix> {
        &self.networks
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Combine two declarations of the same AS. Name collisions are
    /// conflicts.
    pub fn merge(mut self, other: AutonomousSystem) -> Result<Self> {
        for (name, prefix) in other.networks {
            if self.networks.contains_key(&name) {
                return Err(EmulatorError::MergeConflict(format!(
                    "network {} defined in both AS{} declarations",
                    name, self.asn
                )));
            }
            self.networks.insert(name, prefix);
        }
        for (name, node) in other.nodes {
            if self.nodes.contains_key(&name) {
                return Err(EmulatorError::MergeConflict(format!(
                    "node {} defined in both AS{} declarations",
                    name, self.asn
                )));
            }
            self.nodes.insert(name, node);
        }
        Ok(self)
    }

    fn error(&self, message: String) -> EmulatorError {
        EmulatorError::Layer {
            layer: format!("{} (AS{})", BASE_LAYER, self.asn),
            message,
        }
    }
}

/// An internet exchange with its peering LAN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternetExchange {
    id: u32,
    prefix: Ipv4Prefix,
}

impl InternetExchange {
    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn prefix(&self) -> Ipv4Prefix {
        self.prefix
    }

    pub fn network_name(&self) -> String {
        format!("ix{}", self.id)
    }
}

/// The bootstrap topology layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Base {
    config: BaseConfig,
    ases: IndexMap<u32, AutonomousSystem>,
    ixes: IndexMap<u32, InternetExchange>,
}

impl Base {
    pub fn new(config: BaseConfig) -> Self {
        Self {
            config,
            ases: IndexMap::new(),
            ixes: IndexMap::new(),
        }
    }

    pub fn config(&self) -> &BaseConfig {
        &self.config
    }

    pub fn create_autonomous_system(&mut self, asn: u32) -> Result<&mut AutonomousSystem> {
        if asn == 0 {
            return Err(EmulatorError::Layer {
                layer: BASE_LAYER.to_string(),
                message: "ASN 0 is reserved for virtual nodes".to_string(),
            });
        }
        if self.ases.contains_key(&asn) {
            return Err(EmulatorError::Layer {
                layer: BASE_LAYER.to_string(),
                message: format!("AS{} already exists", asn),
            });
        }
        Ok(self.ases.entry(asn).or_insert_with(|| AutonomousSystem::new(asn)))
    }

    pub fn autonomous_system(&self, asn: u32) -> Result<&AutonomousSystem> {
        self.ases.get(&asn).ok_or(EmulatorError::UnknownAs(asn))
    }

    pub fn autonomous_system_mut(&mut self, asn: u32) -> Result<&mut AutonomousSystem> {
        self.ases.get_mut(&asn).ok_or(EmulatorError::UnknownAs(asn))
    }

    pub fn asns(&self) -> Vec<u32> {
        self.ases.keys().copied().collect()
    }

    /// Create an IX with the default `10.{id}.0.0/24` peering LAN.
    pub fn create_internet_exchange(&mut self, id: u32) -> Result<&InternetExchange> {
        if id == 0 || id > 255 {
            return Err(EmulatorError::Address(format!(
                "cannot derive a prefix for IX{}; give it an explicit prefix",
                id
            )));
        }
        let prefix = Ipv4Prefix::new(Ipv4Addr::new(10, id as u8, 0, 0), 24)
            .map_err(EmulatorError::Address)?;
        self.create_internet_exchange_with_prefix(id, prefix)
    }

    pub fn create_internet_exchange_with_prefix(
        &mut self,
        id: u32,
        prefix: Ipv4Prefix,
    ) -> Result<&InternetExchange> {
        if self.ixes.contains_key(&id) {
            return Err(EmulatorError::Layer {
                layer: BASE_LAYER.to_string(),
                message: format!("IX{} already exists", id),
            });
        }
        Ok(self.ixes.entry(id).or_insert(InternetExchange { id, prefix }))
    }

    pub fn internet_exchange(&self, id: u32) -> Result<&InternetExchange> {
        self.ixes.get(&id).ok_or(EmulatorError::UnknownIx(id))
    }

    pub fn ix_ids(&self) -> Vec<u32> {
        self.ixes.keys().copied().collect()
    }

    /// Name of the AS network a new host should join: the network whose
    /// prefix holds `address` or covers `prefix`, else the first one.
    pub fn pick_network(
        &self,
        asn: u32,
        address: Option<Ipv4Addr>,
        prefix: Option<Ipv4Prefix>,
    ) -> Result<String> {
        let autonomous_system = self.autonomous_system(asn)?;
        let found = autonomous_system.networks.iter().find(|(_, net_prefix)| {
            address.map_or(true, |addr| net_prefix.contains(addr))
                && prefix.map_or(true, |p| net_prefix.covers(&p) || p.covers(net_prefix))
        });
        found
            .map(|(name, _)| name.clone())
            .ok_or_else(|| EmulatorError::Address(format!("AS{} has no network matching the request", asn)))
    }

    /// Create, attach and register a host after the base layer has been
    /// configured. Used when a binding asks for a brand new node.
    pub fn create_bound_host(
        &self,
        registry: &mut Registry,
        asn: u32,
        name: &str,
        network: &str,
        address: Option<Ipv4Addr>,
    ) -> Result<RegistryKey> {
        self.autonomous_system(asn)?;
        let scope = Scope::As(asn);
        if registry.has(scope, NodeRole::Host.kind(), name) || registry.has(scope, NodeRole::Router.kind(), name) {
            return Err(EmulatorError::Layer {
                layer: BASE_LAYER.to_string(),
                message: format!("node {} already exists in AS{}", name, asn),
            });
        }

        let mut host = Node::new(name, asn, NodeRole::Host);
        host.join_network(network, address);
        attach(registry, &mut host)?;
        log::info!("Created host {} in AS{} on network {}", name, asn, network);
        registry.register_node(scope, host)
    }

    /// Merge another base layer into this one.
    pub fn merge(mut self, other: Base) -> Result<Self> {
        for (asn, theirs) in other.ases {
            match self.ases.get_mut(&asn) {
                Some(mine) => {
                    let taken = std::mem::replace(mine, AutonomousSystem::new(asn));
                    *mine = taken.merge(theirs)?;
                }
                None => {
                    self.ases.insert(asn, theirs);
                }
            }
        }
        for (id, theirs) in other.ixes {
            match self.ixes.get(&id) {
                Some(mine) if mine.prefix != theirs.prefix => {
                    return Err(EmulatorError::MergeConflict(format!(
                        "IX{} declared with prefixes {} and {}",
                        id, mine.prefix, theirs.prefix
                    )));
                }
                Some(_) => {}
                None => {
                    self.ixes.insert(id, theirs);
                }
            }
        }
        Ok(self)
    }

    /// Rebuild a base layer from snapshot state.
    pub fn restore(state: &str) -> Result<Box<dyn Layer>> {
        let base: Base = serde_json::from_str(state)
            .map_err(|e| crate::emulator::snapshot::SnapshotError::LayerState(BASE_LAYER.to_string(), e))?;
        Ok(Box::new(base))
    }
}

/// Turn every pending network join of `node` into an interface, claiming
/// or assigning addresses on the registered networks.
fn attach(registry: &mut Registry, node: &mut Node) -> Result<()> {
    let joins = node.joins().to_vec();
    for join in joins {
        let network = registry.network_mut(join.scope, &join.network)?;
        let address = match join.address {
            Some(address) => {
                network.claim(address, node.name()).map_err(EmulatorError::Address)?;
                address
            }
            None => assign_default(network, node)?,
        };
        node.add_interface(Interface {
            scope: join.scope,
            network: join.network.clone(),
            address,
            prefix_len: network.prefix().len(),
        });
    }
    Ok(())
}

fn assign_default(network: &mut Network, node: &Node) -> Result<Ipv4Addr> {
    // Routers on a peering LAN are numbered after their ASN
    if network.kind() == NetworkKind::InternetExchange && node.role() == NodeRole::Router {
        if let Some(address) = network.prefix().host(node.asn()) {
            if node.asn() != 0 && network.owner_of(address).is_none() {
                network.claim(address, node.name()).map_err(EmulatorError::Address)?;
                return Ok(address);
            }
        }
    }
    network.assign(node.role(), node.name()).map_err(EmulatorError::Address)
}

impl Layer for Base {
    fn name(&self) -> &str {
        BASE_LAYER
    }

    fn configure(&mut self, emulator: &mut Emulator) -> Result<()> {
        let policy = self.config.address_policy;
        let registry = emulator.registry_mut();

        for ix in self.ixes.values() {
            let scope = Scope::Ix(ix.id);
            let name = ix.network_name();
            registry.register_network(Network::new(
                &name,
                scope,
                NetworkKind::InternetExchange,
                ix.prefix,
                policy,
            ))?;

            let mut route_server = Node::new(&name, ix.id, NodeRole::RouteServer);
            route_server.join_ix(ix.id, ix.prefix.host(ix.id));
            attach(registry, &mut route_server)?;
            registry.register_node(scope, route_server)?;
            log::debug!("Configured IX{} on {}", ix.id, ix.prefix);
        }

        for autonomous_system in self.ases.values_mut() {
            let scope = Scope::As(autonomous_system.asn);
            for (name, prefix) in &autonomous_system.networks {
                registry.register_network(Network::new(name, scope, NetworkKind::Local, *prefix, policy))?;
            }
            // Routers first so they keep the top of the router range
            let (mut routers, hosts): (Vec<Node>, Vec<Node>) = autonomous_system
                .nodes
                .drain(..)
                .map(|(_, node)| node)
                .partition(|node| node.role() == NodeRole::Router);
            routers.extend(hosts);
            for mut node in routers {
                attach(registry, &mut node)?;
                registry.register_node(scope, node)?;
            }
            log::debug!(
                "Configured AS{} with {} networks",
                autonomous_system.asn,
                autonomous_system.networks.len()
            );
        }

        log::info!(
            "Base layer registered {} autonomous systems and {} internet exchanges",
            self.ases.len(),
            self.ixes.len()
        );
        Ok(())
    }

    fn render(&mut self, emulator: &mut Emulator) -> Result<()> {
        let registry = emulator.registry();
        let unattached: Vec<String> = registry
            .get_all()
            .filter_map(|(key, object)| object.as_node().map(|node| (key, node)))
            .filter(|(_, node)| node.interfaces().is_empty())
            .map(|(key, _)| key.to_string())
            .collect();
        for key in &unattached {
            log::warn!("Node {} is not attached to any network", key);
        }
        Ok(())
    }

    fn save(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::emulator::snapshot::SnapshotError::LayerState(BASE_LAYER.to_string(), e).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Kind;

    fn two_as_base() -> Base {
        let mut base = Base::new(BaseConfig::default());
        base.create_internet_exchange(100).unwrap();

        let as150 = base.create_autonomous_system(150).unwrap();
        as150.create_network("net0").unwrap();
        as150.create_router("router0").unwrap().join_network("net0", None).join_ix(100, None);
        as150.create_host("web").unwrap().join_network("net0", None);

        let as151 = base.create_autonomous_system(151).unwrap();
        as151.create_network("net0").unwrap();
        as151
            .create_host("db")
            .unwrap()
            .join_network("net0", Some(Ipv4Addr::new(10, 151, 0, 10)));
        base
    }

    #[test]
    fn test_configure_registers_topology() {
        let mut emulator = Emulator::default();
        let mut base = two_as_base();
        base.configure(&mut emulator).unwrap();
        let registry = emulator.registry();

        assert!(registry.has(Scope::Ix(100), Kind::Net, "ix100"));
        assert!(registry.has(Scope::Ix(100), Kind::Rs, "ix100"));
        assert!(registry.has(Scope::As(150), Kind::Net, "net0"));
        assert!(registry.has(Scope::As(150), Kind::RNode, "router0"));
        assert!(registry.has(Scope::As(150), Kind::HNode, "web"));

        let rs = registry.node(&RegistryKey::new(Scope::Ix(100), Kind::Rs, "ix100")).unwrap();
        assert_eq!(rs.addresses().collect::<Vec<_>>(), vec![Ipv4Addr::new(10, 100, 0, 100)]);

        let router = registry.node(&RegistryKey::new(Scope::As(150), Kind::RNode, "router0")).unwrap();
        let addresses: Vec<Ipv4Addr> = router.addresses().collect();
        assert_eq!(addresses, vec![Ipv4Addr::new(10, 150, 0, 254), Ipv4Addr::new(10, 100, 0, 150)]);

        let web = registry.node(&RegistryKey::new(Scope::As(150), Kind::HNode, "web")).unwrap();
        assert_eq!(web.addresses().next(), Some(Ipv4Addr::new(10, 150, 0, 71)));

        let db = registry.node(&RegistryKey::new(Scope::As(151), Kind::HNode, "db")).unwrap();
        assert_eq!(db.addresses().next(), Some(Ipv4Addr::new(10, 151, 0, 10)));
    }

    #[test]
    fn test_automatic_prefixes() {
        let mut base = Base::new(BaseConfig::default());
        let as2 = base.create_autonomous_system(2).unwrap();
        assert_eq!(as2.create_network("a").unwrap().to_string(), "10.2.0.0/24");
        assert_eq!(as2.create_network("b").unwrap().to_string(), "10.2.1.0/24");
        assert!(as2.create_network("a").is_err());

        let big = base.create_autonomous_system(65000).unwrap();
        assert!(big.create_network("net0").is_err());
        big.create_network_with_prefix("net0", "192.168.0.0/24".parse().unwrap()).unwrap();

        assert!(base.create_autonomous_system(2).is_err());
        assert!(base.create_autonomous_system(0).is_err());
    }

    #[test]
    fn test_pick_network_and_bound_host() {
        let mut emulator = Emulator::default();
        let mut base = Base::new(BaseConfig::default());
        let as2 = base.create_autonomous_system(2).unwrap();
        as2.create_network("net0").unwrap();
        as2.create_network("net1").unwrap();
        base.configure(&mut emulator).unwrap();

        assert_eq!(base.pick_network(2, None, None).unwrap(), "net0");
        assert_eq!(base.pick_network(2, Some(Ipv4Addr::new(10, 2, 1, 80)), None).unwrap(), "net1");
        assert!(base.pick_network(2, Some(Ipv4Addr::new(10, 9, 0, 1)), None).is_err());
        assert!(base.pick_network(3, None, None).is_err());

        let key = base
            .create_bound_host(emulator.registry_mut(), 2, "vnode_x", "net1", None)
            .unwrap();
        let host = emulator.registry().node(&key).unwrap();
        assert_eq!(host.addresses().next(), Some(Ipv4Addr::new(10, 2, 1, 71)));

        let err = base.create_bound_host(emulator.registry_mut(), 2, "vnode_x", "net1", None);
        assert!(err.is_err());
    }

    #[test]
    fn test_merge_bases() {
        let mut a = Base::new(BaseConfig::default());
        a.create_autonomous_system(2).unwrap().create_network("net0").unwrap();
        a.create_internet_exchange(100).unwrap();

        let mut b = Base::new(BaseConfig::default());
        let as2 = b.create_autonomous_system(2).unwrap();
        as2.create_network_with_prefix("net1", "10.2.1.0/24".parse().unwrap()).unwrap();
        as2.create_host("h").unwrap();
        b.create_autonomous_system(3).unwrap();
        b.create_internet_exchange(100).unwrap();

        let merged = a.merge(b).unwrap();
        assert_eq!(merged.asns(), vec![2, 3]);
        assert_eq!(merged.autonomous_system(2).unwrap().networks().len(), 2);
        assert_eq!(merged.autonomous_system(2).unwrap().nodes().count(), 1);

        let mut c = Base::new(BaseConfig::default());
        c.create_autonomous_system(2).unwrap().create_network("net0").unwrap();
        assert!(matches!(merged.merge(c), Err(EmulatorError::MergeConflict(_))));
    }
}
