//! Emulated nodes.
//!
//! A node starts as a set of requests (network joins, files, software,
//! start commands). The topology layer turns the joins into concrete
//! interfaces when it assigns addresses; compilers turn the rest into a
//! container build context.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::attributes::Attributes;
use crate::error::{EmulatorError, Result};
use crate::registry::{Kind, Scope};

/// Role of a node in the topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeRole {
    Host,
    Router,
    RouteServer,
}

impl NodeRole {
    /// Registry kind a node of this role is stored under.
    pub fn kind(&self) -> Kind {
        match self {
            NodeRole::Host => Kind::HNode,
            NodeRole::Router => Kind::RNode,
            NodeRole::RouteServer => Kind::Rs,
        }
    }
}

/// A requested network attachment, resolved when addresses are assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkJoin {
    pub scope: Scope,
    pub network: String,
    pub address: Option<Ipv4Addr>,
}

/// A configured network interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub scope: Scope,
    pub network: String,
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

/// A command run when the node starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCommand {
    pub command: String,
    /// Run in the background instead of blocking the start script
    pub fork: bool,
}

/// Port published from the deployment host to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortForward {
    pub host_port: u16,
    pub node_port: u16,
}

/// A host, router or route server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    name: String,
    asn: u32,
    role: NodeRole,
    display_name: Option<String>,
    joins: Vec<NetworkJoin>,
    interfaces: Vec<Interface>,
    files: IndexMap<String, String>,
    software: IndexSet<String>,
    build_commands: Vec<String>,
    start_commands: Vec<StartCommand>,
    port_forwards: Vec<PortForward>,
    attributes: Attributes,
    classes: IndexSet<String>,
}

impl Node {
    pub fn new(name: impl Into<String>, asn: u32, role: NodeRole) -> Self {
        Self {
            name: name.into(),
            asn,
            role,
            display_name: None,
            joins: Vec::new(),
            interfaces: Vec::new(),
            files: IndexMap::new(),
            software: IndexSet::new(),
            build_commands: Vec::new(),
            start_commands: Vec::new(),
            port_forwards: Vec::new(),
            attributes: Attributes::default(),
            classes: IndexSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn asn(&self) -> u32 {
        self.asn
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn set_display_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.display_name = Some(name.into());
        self
    }

    /// Request an attachment to a network of this node's AS.
    pub fn join_network(&mut self, network: &str, address: Option<Ipv4Addr>) -> &mut Self {
        let scope = Scope::As(self.asn);
        self.join(scope, network, address)
    }

    /// Request an attachment to an internet exchange peering LAN.
    pub fn join_ix(&mut self, ix: u32, address: Option<Ipv4Addr>) -> &mut Self {
        let network = format!("ix{}", ix);
        self.join(Scope::Ix(ix), &network, address)
    }

    fn join(&mut self, scope: Scope, network: &str, address: Option<Ipv4Addr>) -> &mut Self {
        self.joins.push(NetworkJoin {
            scope,
            network: network.to_string(),
            address,
        });
        self
    }

    pub fn joins(&self) -> &[NetworkJoin] {
        &self.joins
    }

    pub fn add_interface(&mut self, interface: Interface) {
        self.interfaces.push(interface);
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }

    /// All assigned addresses of the node.
    pub fn addresses(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.interfaces.iter().map(|iface| iface.address)
    }

    pub fn set_file(&mut self, path: impl Into<String>, content: impl Into<String>) -> &mut Self {
        self.files.insert(path.into(), content.into());
        self
    }

    pub fn files(&self) -> &IndexMap<String, String> {
        &self.files
    }

    pub fn add_software(&mut self, package: impl Into<String>) -> &mut Self {
        self.software.insert(package.into());
        self
    }

    pub fn software(&self) -> &IndexSet<String> {
        &self.software
    }

    pub fn add_build_command(&mut self, command: impl Into<String>) -> &mut Self {
        self.build_commands.push(command.into());
        self
    }

    pub fn build_commands(&self) -> &[String] {
        &self.build_commands
    }

    pub fn append_start_command(&mut self, command: impl Into<String>, fork: bool) -> &mut Self {
        self.start_commands.push(StartCommand {
            command: command.into(),
            fork,
        });
        self
    }

    pub fn start_commands(&self) -> &[StartCommand] {
        &self.start_commands
    }

    pub fn add_port_forward(&mut self, host_port: u16, node_port: u16) -> &mut Self {
        self.port_forwards.push(PortForward { host_port, node_port });
        self
    }

    pub fn port_forwards(&self) -> &[PortForward] {
        &self.port_forwards
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attributes_mut(&mut self) -> &mut Attributes {
        &mut self.attributes
    }

    pub fn add_class(&mut self, class: impl Into<String>) -> &mut Self {
        self.classes.insert(class.into());
        self
    }

    pub fn classes(&self) -> &IndexSet<String> {
        &self.classes
    }

    /// Copy the staged customizations of a virtual node onto this node.
    ///
    /// Only placeholders created for a virtual node name (ASN 0) can be
    /// copied; anything else is a real node handed in by mistake.
    pub fn copy_settings(&mut self, vnode: &Node) -> Result<()> {
        if vnode.asn != 0 {
            return Err(EmulatorError::InvalidVirtualNode {
                name: vnode.name.clone(),
                asn: vnode.asn,
            });
        }

        if let Some(display_name) = &vnode.display_name {
            self.display_name = Some(display_name.clone());
        }
        for (path, content) in &vnode.files {
            self.files.insert(path.clone(), content.clone());
        }
        for package in &vnode.software {
            self.software.insert(package.clone());
        }
        self.build_commands.extend(vnode.build_commands.iter().cloned());
        self.start_commands.extend(vnode.start_commands.iter().cloned());
        self.port_forwards.extend(vnode.port_forwards.iter().copied());
        self.attributes.extend_from(&vnode.attributes);
        for class in &vnode.classes {
            self.classes.insert(class.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_kind() {
        assert_eq!(NodeRole::Host.kind(), Kind::HNode);
        assert_eq!(NodeRole::Router.kind(), Kind::RNode);
        assert_eq!(NodeRole::RouteServer.kind(), Kind::Rs);
    }

    #[test]
    fn test_joins() {
        let mut router = Node::new("router0", 150, NodeRole::Router);
        router.join_network("net0", None).join_ix(100, None);
        assert_eq!(router.joins().len(), 2);
        assert_eq!(router.joins()[0].scope, Scope::As(150));
        assert_eq!(router.joins()[1].scope, Scope::Ix(100));
        assert_eq!(router.joins()[1].network, "ix100");
    }

    #[test]
    fn test_copy_settings() {
        let mut vnode = Node::new("web_a", 0, NodeRole::Host);
        vnode
            .set_display_name("Web Server A")
            .set_file("/etc/motd", "hello")
            .add_software("curl")
            .append_start_command("echo up", true)
            .add_port_forward(8080, 80);
        vnode.attributes_mut().set("tier", "frontend");

        let mut host = Node::new("host0", 150, NodeRole::Host);
        host.add_software("iproute2");
        host.copy_settings(&vnode).unwrap();

        assert_eq!(host.display_name(), Some("Web Server A"));
        assert_eq!(host.files().get("/etc/motd").map(String::as_str), Some("hello"));
        assert!(host.software().contains("curl"));
        assert!(host.software().contains("iproute2"));
        assert_eq!(host.start_commands().len(), 1);
        assert!(host.start_commands()[0].fork);
        assert_eq!(host.port_forwards()[0], PortForward { host_port: 8080, node_port: 80 });
        assert_eq!(host.attributes().get_text("tier"), Some("frontend"));
        // Identity is untouched
        assert_eq!(host.name(), "host0");
        assert_eq!(host.asn(), 150);
    }

    #[test]
    fn test_copy_settings_rejects_real_node() {
        let real = Node::new("host1", 151, NodeRole::Host);
        let mut host = Node::new("host0", 150, NodeRole::Host);
        let err = host.copy_settings(&real).unwrap_err();
        assert!(matches!(err, EmulatorError::InvalidVirtualNode { asn: 151, .. }));
    }
}
