//! Emulation description file.
//!
//! A YAML document describing the topology, the services, the virtual node
//! customizations and the bindings of one emulation:
//!
//! ```yaml
//! general:
//!   name: two-as
//!   seed: 42
//!   log_level: info
//!
//! internet_exchanges:
//!   - id: 100
//!
//! autonomous_systems:
//!   - asn: 150
//!     networks:
//!       - name: net0
//!     routers:
//!       - name: router0
//!         networks: [net0]
//!         exchanges: [100]
//!     hosts:
//!       - name: web
//!         network: net0
//!
//! services:
//!   web:
//!     - vnode: site
//!       port: 8080
//!
//! virtual_nodes:
//!   site:
//!     display_name: "Public site"
//!     port_forwards:
//!       - host: 8080
//!         node: 8080
//!
//! bindings:
//!   - pattern: site
//!     action: first
//!     filter:
//!       asn: 150
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::Ipv4Addr;

use crate::binding::{Action, Binding, Filter};
use crate::node::AttributeValue;
use crate::utils::ip_utils::Ipv4Prefix;
use crate::utils::validation::{find_duplicate, validate_name};

/// Top-level emulation description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmulationConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub internet_exchanges: Vec<ExchangeConfig>,
    #[serde(default)]
    pub autonomous_systems: Vec<AutonomousSystemConfig>,
    #[serde(default)]
    pub services: ServicesConfig,
    /// Customizations keyed by virtual node name
    #[serde(default)]
    pub virtual_nodes: IndexMap<String, VirtualNodeConfig>,
    #[serde(default)]
    pub bindings: Vec<BindingConfig>,
}

/// General settings of the emulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    pub name: String,
    /// Seed for random bindings
    #[serde(default)]
    pub seed: u64,
    /// Layer configured before bindings are resolved (default: Base)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap_layer: Option<String>,
    /// Log level (trace, debug, info, warn, error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// An internet exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub id: u32,
    /// Peering LAN (default: 10.<id>.0.0/24)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

/// An autonomous system with its networks and nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutonomousSystemConfig {
    pub asn: u32,
    #[serde(default)]
    pub networks: Vec<NetworkConfig>,
    #[serde(default)]
    pub routers: Vec<RouterConfig>,
    #[serde(default)]
    pub hosts: Vec<HostConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    /// Network prefix (default: 10.<asn>.<index>.0/24)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    pub name: String,
    /// Local networks the router joins
    #[serde(default)]
    pub networks: Vec<String>,
    /// Internet exchanges the router peers at
    #[serde(default)]
    pub exchanges: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostConfig {
    pub name: String,
    pub network: String,
    /// Fixed address (default: next free host address)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Service declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default)]
    pub web: Vec<WebServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebServerConfig {
    pub vnode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Index page; `{nodeName}` and `{asn}` are substituted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

/// Settings staged on a virtual node.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VirtualNodeConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// File contents keyed by path
    #[serde(default)]
    pub files: IndexMap<String, String>,
    #[serde(default)]
    pub software: Vec<String>,
    #[serde(default)]
    pub start_commands: Vec<StartCommandConfig>,
    #[serde(default)]
    pub port_forwards: Vec<PortForwardConfig>,
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCommandConfig {
    pub command: String,
    #[serde(default)]
    pub fork: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PortForwardConfig {
    pub host: u16,
    pub node: u16,
}

/// Attribute value as written in YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeConfig {
    Flag(bool),
    Integer(i64),
    Text(String),
}

impl From<&AttributeConfig> for AttributeValue {
    fn from(value: &AttributeConfig) -> Self {
        match value {
            AttributeConfig::Flag(flag) => AttributeValue::Flag(*flag),
            AttributeConfig::Integer(n) => AttributeValue::Integer(*n),
            AttributeConfig::Text(text) => match text.parse::<Ipv4Addr>() {
                Ok(addr) => AttributeValue::Address(addr),
                Err(_) => AttributeValue::Text(text.clone()),
            },
        }
    }
}

/// A binding rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BindingConfig {
    /// Regex over virtual node names
    pub pattern: String,
    #[serde(default)]
    pub action: Action,
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asn: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
    #[serde(default)]
    pub allow_bound: bool,
}

impl BindingConfig {
    /// Build the runtime binding.
    pub fn to_binding(&self) -> Result<Binding, ValidationError> {
        let invalid = |message: String| ValidationError::InvalidBinding(format!("'{}': {}", self.pattern, message));

        let mut filter = Filter::new().with_allow_bound(self.filter.allow_bound);
        if let Some(asn) = self.filter.asn {
            filter = filter.with_asn(asn);
        }
        if let Some(node_name) = &self.filter.node_name {
            filter = filter.with_node_name(node_name.clone());
        }
        if let Some(ip) = &self.filter.ip {
            let ip = ip
                .parse::<Ipv4Addr>()
                .map_err(|_| invalid(format!("invalid filter ip '{}'", ip)))?;
            filter = filter.with_ip(ip);
        }
        if let Some(prefix) = &self.filter.prefix {
            filter = filter.with_prefix(prefix.parse::<Ipv4Prefix>().map_err(invalid)?);
        }
        Binding::new(self.pattern.clone(), filter, self.action).map_err(|e| invalid(e.to_string()))
    }
}

impl EmulationConfig {
    /// Check the description for consistency before anything is built.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_general()?;

        let exchange_ids: HashSet<u32> = self.internet_exchanges.iter().map(|ix| ix.id).collect();
        if let Some(id) = find_duplicate(self.internet_exchanges.iter().map(|ix| ix.id)) {
            return Err(ValidationError::InvalidExchange(format!("IX{} declared twice", id)));
        }
        for ix in &self.internet_exchanges {
            if ix.id == 0 {
                return Err(ValidationError::InvalidExchange("IX id 0 is reserved".to_string()));
            }
            if let Some(prefix) = &ix.prefix {
                prefix
                    .parse::<Ipv4Prefix>()
                    .map_err(|e| ValidationError::InvalidExchange(format!("IX{}: {}", ix.id, e)))?;
            } else if ix.id > 255 {
                return Err(ValidationError::InvalidExchange(format!(
                    "IX{} needs an explicit prefix",
                    ix.id
                )));
            }
        }

        if let Some(asn) = find_duplicate(self.autonomous_systems.iter().map(|a| a.asn)) {
            return Err(ValidationError::InvalidAutonomousSystem(format!("AS{} declared twice", asn)));
        }
        for autonomous_system in &self.autonomous_systems {
            autonomous_system.validate(&exchange_ids)?;
        }

        if let Some(vnode) = find_duplicate(self.services.web.iter().map(|web| web.vnode.as_str())) {
            return Err(ValidationError::InvalidService(format!(
                "vnode {} has more than one web server",
                vnode
            )));
        }
        for web in &self.services.web {
            validate_name("vnode", &web.vnode).map_err(ValidationError::InvalidService)?;
            if web.port == Some(0) {
                return Err(ValidationError::InvalidService(format!("vnode {}: port 0", web.vnode)));
            }
        }

        for (name, vnode) in &self.virtual_nodes {
            validate_name("vnode", name).map_err(ValidationError::InvalidVirtualNode)?;
            if vnode.port_forwards.iter().any(|fwd| fwd.host == 0 || fwd.node == 0) {
                return Err(ValidationError::InvalidVirtualNode(format!(
                    "vnode {}: port 0 in port_forwards",
                    name
                )));
            }
        }

        for binding in &self.bindings {
            binding.to_binding()?;
        }
        Ok(())
    }

    fn validate_general(&self) -> Result<(), ValidationError> {
        if self.general.name.trim().is_empty() {
            return Err(ValidationError::InvalidGeneral("name cannot be empty".to_string()));
        }
        if let Some(layer) = &self.general.bootstrap_layer {
            if layer.trim().is_empty() {
                return Err(ValidationError::InvalidGeneral(
                    "bootstrap_layer cannot be empty".to_string(),
                ));
            }
        }
        if let Some(level) = &self.general.log_level {
            let known = ["trace", "debug", "info", "warn", "error", "off"];
            if !known.contains(&level.to_lowercase().as_str()) {
                return Err(ValidationError::InvalidGeneral(format!("unknown log_level '{}'", level)));
            }
        }
        Ok(())
    }
}

impl AutonomousSystemConfig {
    fn validate(&self, exchange_ids: &HashSet<u32>) -> Result<(), ValidationError> {
        let invalid = |message: String| ValidationError::InvalidAutonomousSystem(format!("AS{}: {}", self.asn, message));

        if self.asn == 0 {
            return Err(ValidationError::InvalidAutonomousSystem(
                "ASN 0 is reserved for virtual nodes".to_string(),
            ));
        }
        if self.asn > 255 && self.networks.iter().any(|net| net.prefix.is_none()) {
            return Err(invalid("networks need explicit prefixes above ASN 255".to_string()));
        }

        let mut prefixes: IndexMap<&str, Option<Ipv4Prefix>> = IndexMap::new();
        for network in &self.networks {
            validate_name("network", &network.name).map_err(&invalid)?;
            let prefix = network
                .prefix
                .as_deref()
                .map(str::parse::<Ipv4Prefix>)
                .transpose()
                .map_err(&invalid)?;
            if prefixes.insert(network.name.as_str(), prefix).is_some() {
                return Err(invalid(format!("network {} declared twice", network.name)));
            }
        }

        let names = self.routers.iter().map(|r| r.name.as_str()).chain(self.hosts.iter().map(|h| h.name.as_str()));
        if let Some(name) = find_duplicate(names) {
            return Err(invalid(format!("node {} declared twice", name)));
        }

        for router in &self.routers {
            validate_name("router", &router.name).map_err(&invalid)?;
            for network in &router.networks {
                if !prefixes.contains_key(network.as_str()) {
                    return Err(invalid(format!("router {} joins unknown network {}", router.name, network)));
                }
            }
            for ix in &router.exchanges {
                if !exchange_ids.contains(ix) {
                    return Err(invalid(format!("router {} peers at unknown IX{}", router.name, ix)));
                }
            }
        }

        for host in &self.hosts {
            validate_name("host", &host.name).map_err(&invalid)?;
            let prefix = prefixes
                .get(host.network.as_str())
                .ok_or_else(|| invalid(format!("host {} joins unknown network {}", host.name, host.network)))?;
            if let Some(address) = &host.address {
                let address: Ipv4Addr = address
                    .parse()
                    .map_err(|_| invalid(format!("host {} has invalid address '{}'", host.name, address)))?;
                if let Some(prefix) = prefix {
                    if !prefix.contains(address) {
                        return Err(invalid(format!(
                            "host {} address {} is outside {}",
                            host.name, address, prefix
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
    #[error("Invalid internet exchange: {0}")]
    InvalidExchange(String),
    #[error("Invalid autonomous system: {0}")]
    InvalidAutonomousSystem(String),
    #[error("Invalid service configuration: {0}")]
    InvalidService(String),
    #[error("Invalid virtual node: {0}")]
    InvalidVirtualNode(String),
    #[error("Invalid binding {0}")]
    InvalidBinding(String),
}
