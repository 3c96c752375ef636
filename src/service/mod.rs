//! Services: layers that install servers on virtual nodes.
//!
//! A service never names a physical node. Scripts call `install(vnode)` on
//! the service, which stages a server keyed by the virtual node name. At
//! render time the emulator collects every pending virtual node from every
//! service, resolves them through the bindings, and only then do services
//! touch real nodes:
//!
//! 1. `configure` resolves each staged vnode to its physical node, tags the
//!    node with the service's class and lets the server adjust it
//! 2. `render` installs the server onto the node (packages, files, start
//!    commands)
//!
//! [`ServiceCore`] carries the bookkeeping shared by all services so a
//! concrete service only supplies its server type.

pub mod web;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::emulator::Emulator;
use crate::error::{EmulatorError, Result};
use crate::layer::Layer;
use crate::node::Node;
use crate::registry::RegistryKey;

pub use web::{WebServer, WebService, WEB_SERVICE};

/// A server that one service installs on one node.
pub trait Server {
    /// Adjust the physical node during the configure pass.
    fn configure(&mut self, _node: &mut Node) -> Result<()> {
        Ok(())
    }

    /// Write the server onto the physical node during the render pass.
    fn install(&mut self, node: &mut Node) -> Result<()>;
}

/// The service-specific surface of a layer.
pub trait Service: Layer {
    /// Virtual node names this service has servers staged for, in install
    /// order.
    fn pending_vnodes(&self) -> Vec<String>;

    /// Prefix every pending virtual node name.
    fn rename_pending(&mut self, prefix: &str);
}

/// Pending servers and their resolved targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCore<S> {
    pending: IndexMap<String, S>,
    targets: Vec<(String, RegistryKey)>,
}

impl<S> Default for ServiceCore<S> {
    fn default() -> Self {
        Self {
            pending: IndexMap::new(),
            targets: Vec::new(),
        }
    }
}

impl<S: Server> ServiceCore<S> {
    /// Stage a server for `vnode`, or return the one already staged.
    pub fn install_with(&mut self, vnode: &str, create: impl FnOnce() -> S) -> &mut S {
        self.pending.entry(vnode.to_string()).or_insert_with(create)
    }

    pub fn server(&self, vnode: &str) -> Option<&S> {
        self.pending.get(vnode)
    }

    pub fn server_mut(&mut self, vnode: &str) -> Option<&mut S> {
        self.pending.get_mut(vnode)
    }

    pub fn pending_vnodes(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    /// `(vnode, physical node)` pairs fixed during configure.
    pub fn targets(&self) -> &[(String, RegistryKey)] {
        &self.targets
    }

    pub fn rename_pending(&mut self, prefix: &str) {
        self.pending = std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(vnode, server)| (format!("{}{}", prefix, vnode), server))
            .collect();
    }

    /// Resolve every staged vnode and run the servers' configure step.
    pub fn configure_targets(&mut self, service: &str, emulator: &mut Emulator) -> Result<()> {
        self.targets.clear();
        for (vnode, server) in self.pending.iter_mut() {
            let key = emulator.resolve_vnode(vnode)?;
            let node = emulator.registry_mut().node_mut(&key)?;
            node.add_class(service);
            server.configure(node)?;
            log::debug!("{}: vnode {} runs on {}", service, vnode, key);
            self.targets.push((vnode.clone(), key));
        }
        Ok(())
    }

    /// Install every server onto its resolved node.
    pub fn install_targets(&mut self, service: &str, emulator: &mut Emulator) -> Result<()> {
        for (vnode, key) in &self.targets {
            let server = self.pending.get_mut(vnode).ok_or_else(|| EmulatorError::Layer {
                layer: service.to_string(),
                message: format!("no server staged for vnode {}", vnode),
            })?;
            server.install(emulator.registry_mut().node_mut(key)?)?;
        }
        log::info!("{}: installed {} servers", service, self.targets.len());
        Ok(())
    }

    /// Combine the staged servers of two services. A vnode staged on both
    /// sides is a conflict.
    pub fn merge(mut self, other: ServiceCore<S>) -> Result<Self> {
        for (vnode, server) in other.pending {
            if self.pending.contains_key(&vnode) {
                return Err(EmulatorError::MergeConflict(format!(
                    "vnode {} has a server in both services",
                    vnode
                )));
            }
            self.pending.insert(vnode, server);
        }
        self.targets.clear();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Echo(u16);

    impl Server for Echo {
        fn install(&mut self, node: &mut Node) -> Result<()> {
            node.add_software("echo");
            Ok(())
        }
    }

    #[test]
    fn test_install_with_is_idempotent() {
        let mut core = ServiceCore::<Echo>::default();
        core.install_with("a", || Echo(1));
        core.install_with("a", || Echo(2)).0 += 10;
        core.install_with("b", || Echo(3));

        assert_eq!(core.pending_vnodes(), vec!["a", "b"]);
        assert_eq!(core.server("a"), Some(&Echo(11)));
    }

    #[test]
    fn test_rename_pending_keeps_order() {
        let mut core = ServiceCore::<Echo>::default();
        core.install_with("web", Echo::default);
        core.install_with("db", Echo::default);
        core.rename_pending("east_");
        assert_eq!(core.pending_vnodes(), vec!["east_web", "east_db"]);
    }

    #[test]
    fn test_merge_rejects_shared_vnode() {
        let mut mine = ServiceCore::<Echo>::default();
        mine.install_with("web", Echo::default);
        let mut theirs = ServiceCore::<Echo>::default();
        theirs.install_with("web", Echo::default);
        assert!(matches!(mine.merge(theirs), Err(EmulatorError::MergeConflict(_))));
    }

    #[test]
    fn test_merge_appends_other_servers() {
        let mut mine = ServiceCore::<Echo>::default();
        mine.install_with("a", Echo::default);
        let mut theirs = ServiceCore::<Echo>::default();
        theirs.install_with("b", Echo::default);
        let merged = mine.merge(theirs).unwrap();
        assert_eq!(merged.pending_vnodes(), vec!["a", "b"]);
    }
}
