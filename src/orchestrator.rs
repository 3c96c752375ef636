//! Emulation orchestrator.
//!
//! This module turns an emulation description into an [`Emulator`], merges
//! emulators loaded from snapshots, and drives render plus compilation.

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use log::info;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use crate::compiler::{ComposeCompiler, ComposeCompilerConfig};
use crate::config::{EmulationConfig, VirtualNodeConfig};
use crate::emulator::{default_mergers, Emulator, EmulatorConfig, LayerCatalog};
use crate::layer::{Base, BaseConfig, BASE_LAYER};
use crate::node::Node;
use crate::service::WebService;
use crate::utils::ip_utils::Ipv4Prefix;

/// Build the base layer declared by the description.
pub fn build_base(config: &EmulationConfig) -> Result<Base> {
    let mut base = Base::new(BaseConfig::default());

    for ix in &config.internet_exchanges {
        match &ix.prefix {
            Some(prefix) => {
                let prefix: Ipv4Prefix = prefix.parse().map_err(|e: String| eyre!(e))?;
                base.create_internet_exchange_with_prefix(ix.id, prefix)?;
            }
            None => {
                base.create_internet_exchange(ix.id)?;
            }
        }
    }

    for as_config in &config.autonomous_systems {
        let autonomous_system = base.create_autonomous_system(as_config.asn)?;
        for network in &as_config.networks {
            match &network.prefix {
                Some(prefix) => {
                    let prefix: Ipv4Prefix = prefix.parse().map_err(|e: String| eyre!(e))?;
                    autonomous_system.create_network_with_prefix(&network.name, prefix)?;
                }
                None => {
                    autonomous_system.create_network(&network.name)?;
                }
            }
        }
        for router_config in &as_config.routers {
            let router = autonomous_system.create_router(&router_config.name)?;
            for network in &router_config.networks {
                router.join_network(network, None);
            }
            for ix in &router_config.exchanges {
                router.join_ix(*ix, None);
            }
        }
        for host_config in &as_config.hosts {
            let address = host_config
                .address
                .as_deref()
                .map(str::parse::<Ipv4Addr>)
                .transpose()
                .wrap_err_with(|| format!("Invalid address for host {}", host_config.name))?;
            autonomous_system
                .create_host(&host_config.name)?
                .join_network(&host_config.network, address);
        }
    }

    Ok(base)
}

fn apply_virtual_node(node: &mut Node, config: &VirtualNodeConfig) {
    if let Some(display_name) = &config.display_name {
        node.set_display_name(display_name.clone());
    }
    for (path, content) in &config.files {
        node.set_file(path.clone(), content.clone());
    }
    for package in &config.software {
        node.add_software(package.clone());
    }
    for command in &config.start_commands {
        node.append_start_command(command.command.clone(), command.fork);
    }
    for forward in &config.port_forwards {
        node.add_port_forward(forward.host, forward.node);
    }
    for (key, value) in &config.attributes {
        node.attributes_mut().set(key.clone(), value);
    }
}

/// Build an unrendered emulator from a validated description.
pub fn build_emulator(config: &EmulationConfig) -> Result<Emulator> {
    let mut emulator = Emulator::new(EmulatorConfig {
        bootstrap_layer: config
            .general
            .bootstrap_layer
            .clone()
            .unwrap_or_else(|| BASE_LAYER.to_string()),
        seed: config.general.seed,
    });

    emulator.add_layer(build_base(config)?)?;

    if !config.services.web.is_empty() {
        let mut web = WebService::new();
        for server_config in &config.services.web {
            let server = web.install(&server_config.vnode);
            if let Some(port) = server_config.port {
                server.set_port(port);
            }
            if let Some(index) = &server_config.index {
                server.set_index_content(index.clone());
            }
        }
        emulator.add_layer(web)?;
    }

    for (name, vnode_config) in &config.virtual_nodes {
        apply_virtual_node(emulator.get_virtual_node(name), vnode_config);
    }

    for binding in &config.bindings {
        emulator.add_binding(binding.to_binding()?)?;
    }

    info!(
        "Built emulation '{}' with layers {:?}",
        config.general.name,
        emulator.layer_names()
    );
    Ok(emulator)
}

/// Load snapshots and merge them in order with the built-in mergers.
/// Every snapshot after the first gets `vnode_prefix` on its service
/// virtual nodes.
pub fn load_and_merge(paths: &[PathBuf], vnode_prefix: &str) -> Result<Emulator> {
    merge_snapshots(None, paths, vnode_prefix)
}

/// Merge snapshots into `receiver` in order. Each snapshot merged into
/// an existing emulator gets `vnode_prefix` exactly once; without a
/// receiver the first snapshot takes its place unprefixed.
pub fn merge_snapshots(receiver: Option<Emulator>, paths: &[PathBuf], vnode_prefix: &str) -> Result<Emulator> {
    let catalog = LayerCatalog::with_builtin();
    let mergers = default_mergers();
    let mut merged = receiver;

    for path in paths {
        let loaded = Emulator::load(path, &catalog)
            .wrap_err_with(|| format!("Failed to load snapshot {}", path.display()))?;
        merged = Some(match merged {
            None => loaded,
            Some(current) => current
                .merge(loaded, &mergers, vnode_prefix)
                .wrap_err_with(|| format!("Failed to merge snapshot {}", path.display()))?,
        });
    }

    merged.ok_or_else(|| eyre!("No snapshots given"))
}

/// Render the emulator and write a docker-compose project to `output_dir`.
pub fn generate(mut emulator: Emulator, output_dir: &Path, overwrite: bool) -> Result<()> {
    emulator.render().wrap_err("Render failed")?;

    let mut compiler = ComposeCompiler::new(ComposeCompilerConfig::default());
    emulator
        .compile(&mut compiler, output_dir, overwrite)
        .wrap_err_with(|| format!("Failed to compile into {}", output_dir.display()))?;

    info!("Emulation written to {}", output_dir.display());
    Ok(())
}
