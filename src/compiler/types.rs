//! docker-compose file structures.
//!
//! These mirror the subset of the compose file format the compose compiler
//! writes. Maps are `BTreeMap` so the rendered YAML is stable across runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// Top level
// ============================================================================

/// A complete `docker-compose.yml`.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ComposeFile {
    pub version: String,
    pub services: BTreeMap<String, ComposeService>,
    pub networks: BTreeMap<String, ComposeNetwork>,
}

// ============================================================================
// Services
// ============================================================================

/// One container built from a node's build context.
#[derive(Serialize, Deserialize, Debug, Default)]
pub struct ComposeService {
    /// Build context directory, relative to the compose file
    pub build: String,
    pub container_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cap_add: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sysctls: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub privileged: Option<bool>,
    pub networks: BTreeMap<String, ServiceNetwork>,
    /// `host:container` port mappings
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

/// Attachment of a service to a network.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ServiceNetwork {
    pub ipv4_address: String,
}

// ============================================================================
// Networks
// ============================================================================

/// A bridge network with a fixed subnet.
#[derive(Serialize, Deserialize, Debug)]
pub struct ComposeNetwork {
    pub driver: String,
    pub ipam: Ipam,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct Ipam {
    pub config: Vec<IpamConfig>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct IpamConfig {
    pub subnet: String,
}
