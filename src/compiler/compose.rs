//! docker-compose compiler.
//!
//! Output layout:
//!
//! ```text
//! <output>/docker-compose.yml
//! <output>/<kind>_<scope>_<name>/Dockerfile
//! <output>/<kind>_<scope>_<name>/start.sh
//! <output>/<kind>_<scope>_<name>/file_<n>
//! ```
//!
//! Every registered network becomes a bridge network with a fixed subnet,
//! every registered node becomes a service built from its own directory.

use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use super::types::{ComposeFile, ComposeNetwork, ComposeService, Ipam, IpamConfig, ServiceNetwork};
use super::Compiler;
use crate::emulator::Emulator;
use crate::error::Result;
use crate::node::{Network, Node, NodeRole};
use crate::registry::{RegistryKey, Scope};

const LABEL_PREFIX: &str = "org.seedemu";

/// Options of the compose compiler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposeCompilerConfig {
    /// Image every node is built from
    pub base_image: String,
    /// `version` field of the compose file
    pub compose_version: String,
    /// Packages installed on every node
    pub common_software: Vec<String>,
}

impl Default for ComposeCompilerConfig {
    fn default() -> Self {
        Self {
            base_image: "ubuntu:20.04".to_string(),
            compose_version: "3.4".to_string(),
            common_software: vec!["iproute2".to_string()],
        }
    }
}

/// Writes a docker-compose project.
#[derive(Debug, Default)]
pub struct ComposeCompiler {
    config: ComposeCompilerConfig,
}

impl ComposeCompiler {
    pub fn new(config: ComposeCompilerConfig) -> Self {
        Self { config }
    }

    /// Compose network name of a registered network.
    pub fn network_name(scope: Scope, name: &str) -> String {
        format!("net_{}_{}", scope, name)
    }

    /// Build context directory of a registered node.
    pub fn node_dir(key: &RegistryKey) -> String {
        format!("{}_{}_{}", key.kind, key.scope, key.name)
    }

    fn compose_network(network: &Network) -> ComposeNetwork {
        let mut labels = BTreeMap::new();
        labels.insert(format!("{}.scope", LABEL_PREFIX), network.scope().to_string());
        labels.insert(format!("{}.kind", LABEL_PREFIX), format!("{:?}", network.kind()));
        ComposeNetwork {
            driver: "bridge".to_string(),
            ipam: Ipam {
                config: vec![IpamConfig {
                    subnet: network.prefix().to_string(),
                }],
            },
            labels,
        }
    }

    fn compose_service(key: &RegistryKey, node: &Node) -> ComposeService {
        let dir = Self::node_dir(key);
        let networks = node
            .interfaces()
            .iter()
            .map(|iface| {
                (
                    Self::network_name(iface.scope, &iface.network),
                    ServiceNetwork {
                        ipv4_address: iface.address.to_string(),
                    },
                )
            })
            .collect();

        let mut labels = BTreeMap::new();
        labels.insert(format!("{}.asn", LABEL_PREFIX), node.asn().to_string());
        labels.insert(format!("{}.role", LABEL_PREFIX), format!("{:?}", node.role()));
        labels.insert(format!("{}.name", LABEL_PREFIX), node.name().to_string());
        if let Some(display_name) = node.display_name() {
            labels.insert(format!("{}.displayname", LABEL_PREFIX), display_name.to_string());
        }
        if !node.classes().is_empty() {
            let classes: Vec<&str> = node.classes().iter().map(String::as_str).collect();
            labels.insert(format!("{}.class", LABEL_PREFIX), classes.join(","));
        }

        let mut service = ComposeService {
            build: format!("./{}", dir),
            container_name: dir,
            networks,
            ports: node
                .port_forwards()
                .iter()
                .map(|fwd| format!("{}:{}", fwd.host_port, fwd.node_port))
                .collect(),
            labels,
            ..Default::default()
        };

        if node.role() != NodeRole::Host {
            service.cap_add = vec!["ALL".to_string()];
            service.sysctls.insert("net.ipv4.ip_forward".to_string(), "1".to_string());
            service.sysctls.insert("net.ipv4.conf.default.rp_filter".to_string(), "0".to_string());
            service.sysctls.insert("net.ipv4.conf.all.rp_filter".to_string(), "0".to_string());
            service.privileged = Some(true);
        }
        service
    }

    fn dockerfile(&self, node: &Node) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "FROM {}", self.config.base_image);
        let _ = writeln!(out, "ARG DEBIAN_FRONTEND=noninteractive");

        let mut software: Vec<&str> = self.config.common_software.iter().map(String::as_str).collect();
        for package in node.software() {
            if !software.contains(&package.as_str()) {
                software.push(package);
            }
        }
        if !software.is_empty() {
            let _ = writeln!(
                out,
                "RUN apt-get update && apt-get install -y --no-install-recommends {}",
                software.join(" ")
            );
        }
        for command in node.build_commands() {
            let _ = writeln!(out, "RUN {}", command);
        }
        for (index, path) in node.files().keys().enumerate() {
            let _ = writeln!(out, "COPY file_{} {}", index, path);
        }
        let _ = writeln!(out, "COPY start.sh /start.sh");
        let _ = writeln!(out, "RUN chmod +x /start.sh");
        let _ = writeln!(out, "CMD [\"/start.sh\"]");
        out
    }

    fn start_script(node: &Node) -> String {
        let mut out = String::from("#!/bin/bash\n");
        for command in node.start_commands() {
            if command.fork {
                let _ = writeln!(out, "{} &", command.command);
            } else {
                let _ = writeln!(out, "{}", command.command);
            }
        }
        out.push_str("tail -f /dev/null\n");
        out
    }

    fn write_node(&self, output_dir: &Path, key: &RegistryKey, node: &Node) -> Result<()> {
        let dir = output_dir.join(Self::node_dir(key));
        fs::create_dir_all(&dir)?;
        fs::write(dir.join("Dockerfile"), self.dockerfile(node))?;
        fs::write(dir.join("start.sh"), Self::start_script(node))?;
        for (index, content) in node.files().values().enumerate() {
            fs::write(dir.join(format!("file_{}", index)), content)?;
        }
        debug!("Wrote build context {}", dir.display());
        Ok(())
    }
}

impl Compiler for ComposeCompiler {
    fn name(&self) -> &str {
        "Docker Compose"
    }

    fn compile(&mut self, emulator: &Emulator, output_dir: &Path) -> Result<()> {
        let mut compose = ComposeFile {
            version: self.config.compose_version.clone(),
            ..Default::default()
        };

        for (key, object) in emulator.registry().get_all() {
            if let Some(network) = object.as_network() {
                compose
                    .networks
                    .insert(Self::network_name(key.scope, &key.name), Self::compose_network(network));
            } else if let Some(node) = object.as_node() {
                self.write_node(output_dir, key, node)?;
                compose
                    .services
                    .insert(Self::node_dir(key), Self::compose_service(key, node));
            }
        }

        let yaml = serde_yaml::to_string(&compose)?;
        fs::write(output_dir.join("docker-compose.yml"), yaml)?;
        info!(
            "Compose project has {} services on {} networks",
            compose.services.len(),
            compose.networks.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Kind;

    #[test]
    fn test_start_script_backgrounds_forked_commands() {
        let mut node = Node::new("web", 150, NodeRole::Host);
        node.append_start_command("service nginx start", false)
            .append_start_command("python3 -m http.server", true);
        assert_eq!(
            ComposeCompiler::start_script(&node),
            "#!/bin/bash\nservice nginx start\npython3 -m http.server &\ntail -f /dev/null\n"
        );
    }

    #[test]
    fn test_dockerfile_contents() {
        let compiler = ComposeCompiler::default();
        let mut node = Node::new("web", 150, NodeRole::Host);
        node.add_software("nginx-light")
            .add_build_command("mkdir -p /srv")
            .set_file("/etc/motd", "hi");
        let dockerfile = compiler.dockerfile(&node);

        assert!(dockerfile.starts_with("FROM ubuntu:20.04\n"));
        assert!(dockerfile.contains("install -y --no-install-recommends iproute2 nginx-light\n"));
        assert!(dockerfile.contains("RUN mkdir -p /srv\n"));
        assert!(dockerfile.contains("COPY file_0 /etc/motd\n"));
    }

    #[test]
    fn test_router_service_gets_forwarding() {
        let key = RegistryKey::new(Scope::As(150), Kind::RNode, "router0");
        let router = Node::new("router0", 150, NodeRole::Router);
        let service = ComposeCompiler::compose_service(&key, &router);
        assert_eq!(service.container_name, "rnode_150_router0");
        assert_eq!(service.sysctls["net.ipv4.ip_forward"], "1");
        assert_eq!(service.labels["org.seedemu.asn"], "150");

        let host_key = RegistryKey::new(Scope::As(150), Kind::HNode, "web");
        let host = ComposeCompiler::compose_service(&host_key, &Node::new("web", 150, NodeRole::Host));
        assert!(host.cap_add.is_empty());
        assert!(host.sysctls.is_empty());
    }
}
