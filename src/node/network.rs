//! Networks and per-network address assignment.
//!
//! Each network owns a small address allocator. Hosts are numbered upward
//! from the start of the host range, routers and route servers downward
//! from the top of the router range, and explicitly requested addresses
//! are claimed as-is. Every address is tracked with the node that owns it
//! so collisions are rejected instead of silently producing two nodes with
//! the same address.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

use super::node::NodeRole;
use crate::registry::Scope;
use crate::utils::ip_utils::Ipv4Prefix;

/// Host-part ranges used for automatic address assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressPolicy {
    /// First host offset handed to hosts
    pub host_start: u32,
    /// Last host offset handed to hosts
    pub host_end: u32,
    /// First host offset handed to routers (assigned downward)
    pub router_start: u32,
    /// Last host offset handed to routers
    pub router_end: u32,
}

impl Default for AddressPolicy {
    fn default() -> Self {
        Self {
            host_start: 71,
            host_end: 99,
            router_start: 254,
            router_end: 200,
        }
    }
}

/// What a network is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkKind {
    /// Network inside one autonomous system
    Local,
    /// Peering LAN of an internet exchange
    InternetExchange,
}

/// An emulated layer-2 network with an IPv4 prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Network {
    name: String,
    scope: Scope,
    kind: NetworkKind,
    prefix: Ipv4Prefix,
    policy: AddressPolicy,
    next_host: u32,
    next_router: u32,
    /// Address -> owning node name
    assigned: IndexMap<Ipv4Addr, String>,
}

impl Network {
    pub fn new(
        name: impl Into<String>,
        scope: Scope,
        kind: NetworkKind,
        prefix: Ipv4Prefix,
        policy: AddressPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            kind,
            prefix,
            policy,
            next_host: policy.host_start,
            next_router: policy.router_start,
            assigned: IndexMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn kind(&self) -> NetworkKind {
        self.kind
    }

    pub fn prefix(&self) -> Ipv4Prefix {
        self.prefix
    }

    /// Assign the next free address for a node of the given role.
    pub fn assign(&mut self, role: NodeRole, owner: &str) -> Result<Ipv4Addr, String> {
        loop {
            let offset = match role {
                NodeRole::Host => {
                    if self.next_host > self.policy.host_end {
                        return Err(format!("Host address range exhausted on network {}", self.name));
                    }
                    let offset = self.next_host;
                    self.next_host += 1;
                    offset
                }
                NodeRole::Router | NodeRole::RouteServer => {
                    if self.next_router < self.policy.router_end || self.next_router == 0 {
                        return Err(format!("Router address range exhausted on network {}", self.name));
                    }
                    let offset = self.next_router;
                    self.next_router -= 1;
                    offset
                }
            };

            let addr = self.prefix.host(offset).ok_or_else(|| {
                format!("Offset {} is outside prefix {} of network {}", offset, self.prefix, self.name)
            })?;

            // Skip addresses that were claimed explicitly
            if self.assigned.contains_key(&addr) {
                continue;
            }
            self.assigned.insert(addr, owner.to_string());
            return Ok(addr);
        }
    }

    /// Claim an explicitly requested address.
    pub fn claim(&mut self, addr: Ipv4Addr, owner: &str) -> Result<(), String> {
        if !self.prefix.contains(addr) {
            return Err(format!("Address {} is outside prefix {} of network {}", addr, self.prefix, self.name));
        }
        if self.prefix.offset_of(addr) == Some(0) {
            return Err(format!("Address {} is the network address of {}", addr, self.name));
        }
        match self.assigned.get(&addr) {
            Some(existing) if existing != owner => Err(format!(
                "Address {} on network {} is already assigned to {}",
                addr, self.name, existing
            )),
            Some(_) => Ok(()),
            None => {
                self.assigned.insert(addr, owner.to_string());
                Ok(())
            }
        }
    }

    /// Node that owns `addr` on this network.
    pub fn owner_of(&self, addr: Ipv4Addr) -> Option<&str> {
        self.assigned.get(&addr).map(String::as_str)
    }

    pub fn assigned_count(&self) -> usize {
        self.assigned.len()
    }
}
