//! The emulator: owner of the registry, the layers, the bindings and the
//! hooks, and driver of the render pipeline.
//!
//! ## Render pipeline
//!
//! `render()` runs once per emulator:
//!
//! 1. collect every layer's dependency records into one map (reverse
//!    records are inverted; every service depends on the bootstrap layer)
//! 2. configure the bootstrap layer and its dependency chain
//! 3. collect the pending virtual nodes of every service
//! 4. resolve them through the bindings
//! 5. copy staged virtual node settings onto the resolved physical nodes
//! 6. configure every remaining layer, dependencies first
//! 7. clear the lifecycle flags
//! 8. render every layer, dependencies first
//!
//! Any error aborts the pipeline and leaves the emulator unusable for a
//! second render.
//!
//! ## Submodules
//!
//! - [`merge`]: combining two unrendered emulators
//! - [`snapshot`]: dumping and loading an unrendered emulator

pub mod merge;
pub mod snapshot;

use indexmap::{IndexMap, IndexSet};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::binding::{resolve_bindings, Binding, BindingContext};
use crate::compiler::Compiler;
use crate::error::{EmulatorError, Result};
use crate::hook::{Hook, HookPoint, HookTable};
use crate::layer::{downcast_ref, Base, Layer, LayerDatabase, LifecyclePhase, BASE_LAYER};
use crate::node::{Node, NodeRole};
use crate::registry::{Registry, RegistryKey};

pub use merge::{default_mergers, BaseMerger, Merger, WebServiceMerger};
pub use snapshot::{LayerCatalog, SnapshotError};

/// Per-emulator options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmulatorConfig {
    /// Layer configured before bindings are resolved
    pub bootstrap_layer: String,
    /// Seed of the RNG used by random bindings
    pub seed: u64,
}

impl Default for EmulatorConfig {
    fn default() -> Self {
        Self {
            bootstrap_layer: BASE_LAYER.to_string(),
            seed: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderState {
    Pending,
    Running,
    Rendered,
}

/// An emulation under construction.
pub struct Emulator {
    config: EmulatorConfig,
    registry: Registry,
    layers: LayerDatabase,
    bindings: Vec<Binding>,
    hooks: HookTable,
    virtual_nodes: IndexMap<String, Node>,
    dependencies: IndexMap<String, IndexSet<(String, bool)>>,
    resolved: IndexMap<String, RegistryKey>,
    rng: StdRng,
    state: RenderState,
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new(EmulatorConfig::default())
    }
}

impl Emulator {
    pub fn new(config: EmulatorConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            registry: Registry::new(),
            layers: LayerDatabase::new(),
            bindings: Vec::new(),
            hooks: HookTable::new(),
            virtual_nodes: IndexMap::new(),
            dependencies: IndexMap::new(),
            resolved: IndexMap::new(),
            rng,
            state: RenderState::Pending,
        }
    }

    pub fn config(&self) -> &EmulatorConfig {
        &self.config
    }

    // Layers

    pub fn add_layer(&mut self, layer: impl Layer) -> Result<()> {
        self.add_boxed_layer(Box::new(layer))
    }

    pub fn add_boxed_layer(&mut self, layer: Box<dyn Layer>) -> Result<()> {
        self.ensure_pending()?;
        debug!("Adding layer {} ({})", layer.name(), layer.type_name());
        self.layers.add(layer)
    }

    /// A layer by name. `None` while that layer is running.
    pub fn layer(&self, name: &str) -> Option<&dyn Layer> {
        self.layers.get(name)
    }

    pub fn layer_as<T: Layer>(&self, name: &str) -> Option<&T> {
        self.layers.downcast(name)
    }

    pub fn layer_as_mut<T: Layer>(&mut self, name: &str) -> Option<&mut T> {
        self.layers.downcast_mut(name)
    }

    pub fn layer_names(&self) -> Vec<String> {
        self.layers.names()
    }

    // Bindings, hooks and virtual nodes

    pub fn add_binding(&mut self, binding: Binding) -> Result<()> {
        self.ensure_pending()?;
        self.bindings.push(binding);
        Ok(())
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn add_hook(&mut self, hook: impl Hook + 'static) -> Result<()> {
        self.hooks.add(Box::new(hook))
    }

    pub fn hook_names(&self) -> Vec<&str> {
        self.hooks.names()
    }

    /// Staging node for a virtual node name, created on first use.
    /// Everything set on it is copied onto the physical node the name is
    /// bound to.
    pub fn get_virtual_node(&mut self, name: &str) -> &mut Node {
        self.virtual_nodes
            .entry(name.to_string())
            .or_insert_with(|| Node::new(name, 0, NodeRole::Host))
    }

    pub fn virtual_nodes(&self) -> &IndexMap<String, Node> {
        &self.virtual_nodes
    }

    // Registry and resolution

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Physical node key a virtual node was bound to.
    pub fn resolve_vnode(&self, vnode: &str) -> Result<RegistryKey> {
        self.resolved
            .get(vnode)
            .cloned()
            .ok_or_else(|| EmulatorError::NotBound(vnode.to_string()))
    }

    /// The physical node a virtual node was bound to.
    pub fn bound_node(&self, vnode: &str) -> Result<&Node> {
        let key = self.resolve_vnode(vnode)?;
        self.registry.node(&key)
    }

    pub fn resolved_bindings(&self) -> &IndexMap<String, RegistryKey> {
        &self.resolved
    }

    pub fn is_rendered(&self) -> bool {
        self.state == RenderState::Rendered
    }

    fn ensure_pending(&self) -> Result<()> {
        match self.state {
            RenderState::Pending => Ok(()),
            _ => Err(EmulatorError::AlreadyRendered),
        }
    }

    // Render pipeline

    /// Run the two-phase lifecycle. May be called once.
    pub fn render(&mut self) -> Result<()> {
        self.ensure_pending()?;
        self.state = RenderState::Running;
        info!("Rendering emulation with {} layers", self.layers.len());

        self.collect_dependencies();

        let bootstrap = self.config.bootstrap_layer.clone();
        info!("Configuring bootstrap layer {}", bootstrap);
        self.process_layer(&bootstrap, false, LifecyclePhase::Configure, &mut Vec::new())?;

        let pending = self.collect_pending_vnodes()?;
        info!("Resolving {} virtual nodes against {} bindings", pending.len(), self.bindings.len());
        self.resolve_pending(&pending)?;
        self.materialize_virtual_nodes()?;

        info!("Configuring layers");
        for name in self.layers.names() {
            self.process_layer(&name, false, LifecyclePhase::Configure, &mut Vec::new())?;
        }

        self.layers.reset();

        info!("Rendering layers");
        for name in self.layers.names() {
            self.process_layer(&name, false, LifecyclePhase::Render, &mut Vec::new())?;
        }

        self.state = RenderState::Rendered;
        info!("Render finished: {} registry objects", self.registry.len());
        Ok(())
    }

    fn collect_dependencies(&mut self) {
        let bootstrap = self.config.bootstrap_layer.as_str();
        let mut dependencies: IndexMap<String, IndexSet<(String, bool)>> = IndexMap::new();
        for layer in self.layers.iter() {
            let name = layer.name().to_string();
            for dependency in layer.dependencies() {
                if dependency.reverse {
                    dependencies
                        .entry(dependency.target)
                        .or_default()
                        .insert((name.clone(), dependency.optional));
                } else {
                    dependencies
                        .entry(name.clone())
                        .or_default()
                        .insert((dependency.target, dependency.optional));
                }
            }
            if layer.as_service().is_some() && name != bootstrap {
                dependencies
                    .entry(name)
                    .or_default()
                    .insert((bootstrap.to_string(), false));
            }
        }
        self.dependencies = dependencies;
    }

    /// Run `phase` on `name` after its dependencies. `stack` holds the
    /// layers currently being processed, for cycle detection.
    fn process_layer(
        &mut self,
        name: &str,
        optional: bool,
        phase: LifecyclePhase,
        stack: &mut Vec<String>,
    ) -> Result<()> {
        match self.layers.is_done(name) {
            None if optional => {
                debug!("Skipping missing optional layer {}", name);
                return Ok(());
            }
            None => return Err(EmulatorError::MissingLayer(name.to_string())),
            Some(true) => return Ok(()),
            Some(false) => {}
        }
        if stack.iter().any(|entry| entry == name) {
            let mut cycle = stack.clone();
            cycle.push(name.to_string());
            return Err(EmulatorError::DependencyCycle(cycle.join(" -> ")));
        }

        stack.push(name.to_string());
        let dependencies: Vec<(String, bool)> = self
            .dependencies
            .get(name)
            .map(|deps| deps.iter().cloned().collect())
            .unwrap_or_default();
        for (dependency, optional) in dependencies {
            self.process_layer(&dependency, optional, phase, stack)?;
        }
        stack.pop();

        let mut layer = self
            .layers
            .take(name)
            .ok_or_else(|| EmulatorError::DependencyCycle(format!("{} re-entered itself", name)))?;
        let result = self.run_layer(&mut *layer, phase);
        self.layers.restore(name, layer);
        result?;
        self.layers.mark_done(name);
        Ok(())
    }

    fn run_layer(&mut self, layer: &mut dyn Layer, phase: LifecyclePhase) -> Result<()> {
        let name = layer.name().to_string();
        let (before, after) = HookPoint::around(phase);
        self.run_hooks(&name, before)?;
        debug!("Running {} on layer {}", phase, name);
        match phase {
            LifecyclePhase::Configure => layer.configure(self)?,
            LifecyclePhase::Render => layer.render(self)?,
        }
        self.run_hooks(&name, after)
    }

    fn run_hooks(&mut self, layer: &str, point: HookPoint) -> Result<()> {
        let mut hooks = std::mem::take(&mut self.hooks);
        let result = hooks.dispatch(layer, point, self);
        // Hooks added while dispatching run from the next layer call on
        let added = std::mem::replace(&mut self.hooks, hooks);
        self.hooks.absorb(added)?;
        result
    }

    fn collect_pending_vnodes(&self) -> Result<Vec<String>> {
        let mut owners: HashMap<String, &str> = HashMap::new();
        let mut pending = Vec::new();
        for layer in self.layers.iter() {
            let Some(service) = layer.as_service() else {
                continue;
            };
            for vnode in service.pending_vnodes() {
                if owners.insert(vnode.clone(), layer.name()).is_some() {
                    return Err(EmulatorError::DuplicateVirtualNode(vnode));
                }
                pending.push(vnode);
            }
        }
        Ok(pending)
    }

    fn resolve_pending(&mut self, pending: &[String]) -> Result<()> {
        let base = self.layers.iter().find_map(|layer| downcast_ref::<Base>(layer));
        let mut ctx = BindingContext {
            registry: &mut self.registry,
            base,
            rng: &mut self.rng,
        };
        self.resolved = resolve_bindings(pending, &self.bindings, &mut ctx)?;
        Ok(())
    }

    fn materialize_virtual_nodes(&mut self) -> Result<()> {
        for (vnode, staged) in &self.virtual_nodes {
            match self.resolved.get(vnode) {
                Some(key) => {
                    self.registry.node_mut(key)?.copy_settings(staged)?;
                    debug!("Copied settings of vnode {} onto {}", vnode, key);
                }
                None => warn!("Virtual node {} has settings but no service uses it", vnode),
            }
        }
        Ok(())
    }

    // Output

    /// Hand the rendered emulation to a compiler.
    pub fn compile(&self, compiler: &mut dyn Compiler, output_dir: &Path, overwrite: bool) -> Result<()> {
        if !self.is_rendered() {
            return Err(EmulatorError::NotRendered);
        }
        if output_dir.exists() {
            if !overwrite {
                return Err(EmulatorError::OutputExists(output_dir.display().to_string()));
            }
            warn!("Overwriting output directory {}", output_dir.display());
            std::fs::remove_dir_all(output_dir)?;
        }
        std::fs::create_dir_all(output_dir)?;
        info!("Compiling with {} into {}", compiler.name(), output_dir.display());
        compiler.compile(self, output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::Dependency;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Trace = Rc<RefCell<Vec<String>>>;

    struct Probe {
        name: &'static str,
        deps: Vec<Dependency>,
        trace: Trace,
    }

    impl Probe {
        fn new(name: &'static str, deps: Vec<Dependency>, trace: &Trace) -> Self {
            Self {
                name,
                deps,
                trace: trace.clone(),
            }
        }
    }

    impl Layer for Probe {
        fn name(&self) -> &str {
            self.name
        }

        fn dependencies(&self) -> Vec<Dependency> {
            self.deps.clone()
        }

        fn configure(&mut self, _emulator: &mut Emulator) -> Result<()> {
            self.trace.borrow_mut().push(format!("configure:{}", self.name));
            Ok(())
        }

        fn render(&mut self, _emulator: &mut Emulator) -> Result<()> {
            self.trace.borrow_mut().push(format!("render:{}", self.name));
            Ok(())
        }
    }

    fn emulator_with(layers: Vec<Probe>) -> Emulator {
        let mut emulator = Emulator::default();
        for layer in layers {
            emulator.add_layer(layer).unwrap();
        }
        emulator
    }

    #[test]
    fn test_dependencies_run_first() {
        let trace = Trace::default();
        let mut emulator = emulator_with(vec![
            Probe::new("Routing", vec![Dependency::required("Base")], &trace),
            Probe::new("Base", vec![], &trace),
        ]);
        emulator.render().unwrap();

        assert_eq!(
            *trace.borrow(),
            vec!["configure:Base", "configure:Routing", "render:Base", "render:Routing"]
        );
    }

    #[test]
    fn test_reverse_dependency() {
        let trace = Trace::default();
        let mut emulator = emulator_with(vec![
            Probe::new("Base", vec![], &trace),
            Probe::new("Late", vec![], &trace),
            Probe::new("Early", vec![Dependency::required("Late").reversed()], &trace),
        ]);
        emulator.render().unwrap();

        let trace = trace.borrow();
        let early = trace.iter().position(|s| s == "configure:Early").unwrap();
        let late = trace.iter().position(|s| s == "configure:Late").unwrap();
        assert!(early < late);
    }

    #[test]
    fn test_missing_required_dependency() {
        let trace = Trace::default();
        let mut emulator = emulator_with(vec![
            Probe::new("Base", vec![], &trace),
            Probe::new("Routing", vec![Dependency::required("Ospf")], &trace),
        ]);
        let err = emulator.render().unwrap_err();
        assert_eq!(err.to_string(), "Layer Ospf required but missing");
    }

    #[test]
    fn test_missing_bootstrap_layer() {
        let mut emulator = Emulator::default();
        assert!(matches!(emulator.render(), Err(EmulatorError::MissingLayer(name)) if name == "Base"));
    }

    #[test]
    fn test_cycle_is_reported() {
        let trace = Trace::default();
        let mut emulator = emulator_with(vec![
            Probe::new("Base", vec![], &trace),
            Probe::new("A", vec![Dependency::required("B")], &trace),
            Probe::new("B", vec![Dependency::required("A")], &trace),
        ]);
        let err = emulator.render().unwrap_err();
        assert!(matches!(&err, EmulatorError::DependencyCycle(path) if path == "A -> B -> A"));
    }

    #[test]
    fn test_render_twice_refused() {
        let trace = Trace::default();
        let mut emulator = emulator_with(vec![Probe::new("Base", vec![], &trace)]);
        emulator.render().unwrap();
        assert!(emulator.is_rendered());
        assert!(matches!(emulator.render(), Err(EmulatorError::AlreadyRendered)));
    }

    #[test]
    fn test_failed_render_cannot_be_retried() {
        let mut emulator = Emulator::default();
        assert!(emulator.render().is_err());
        assert!(!emulator.is_rendered());
        assert!(matches!(emulator.render(), Err(EmulatorError::AlreadyRendered)));
    }

    #[test]
    fn test_custom_bootstrap_layer() {
        let trace = Trace::default();
        let mut emulator = Emulator::new(EmulatorConfig {
            bootstrap_layer: "Topology".to_string(),
            seed: 1,
        });
        emulator.add_layer(Probe::new("Other", vec![], &trace)).unwrap();
        emulator.add_layer(Probe::new("Topology", vec![], &trace)).unwrap();
        emulator.render().unwrap();
        assert_eq!(trace.borrow()[0], "configure:Topology");
    }

    #[test]
    fn test_virtual_node_is_placeholder() {
        let mut emulator = Emulator::default();
        emulator.get_virtual_node("web").set_display_name("Web");
        emulator.get_virtual_node("web").add_software("curl");

        let vnode = &emulator.virtual_nodes()["web"];
        assert_eq!(vnode.asn(), 0);
        assert_eq!(vnode.display_name(), Some("Web"));
        assert!(vnode.software().contains("curl"));
    }

    #[test]
    fn test_resolve_unbound_vnode() {
        let emulator = Emulator::default();
        assert!(matches!(emulator.resolve_vnode("ghost"), Err(EmulatorError::NotBound(_))));
    }
}
