//! Merging two emulators.
//!
//! Layers are paired by type name. A type present on only one side is
//! adopted as is; a type present on both sides is combined by the
//! [`Merger`] registered for it. Services of the incoming emulator get
//! their virtual node names prefixed first, so two independently built
//! emulations can reuse names like `web` without colliding.

use indexmap::IndexMap;
use log::{debug, info};

use super::{Emulator, RenderState};
use crate::error::{EmulatorError, Result};
use crate::layer::{downcast_box, Base, Layer, BASE_LAYER};
use crate::service::{WebService, WEB_SERVICE};

/// Combines two layers of the same type.
pub trait Merger {
    fn name(&self) -> &str;

    /// Layer type name this merger handles.
    fn target_type(&self) -> &str;

    fn do_merge(&self, mine: Box<dyn Layer>, theirs: Box<dyn Layer>) -> Result<Box<dyn Layer>>;
}

fn expect_type<T: Layer>(layer: Box<dyn Layer>, expected: &'static str) -> Result<Box<T>> {
    let name = layer.name().to_string();
    downcast_box::<T>(layer).ok_or(EmulatorError::LayerType { name, expected })
}

/// Unions autonomous systems and internet exchanges.
#[derive(Debug, Default)]
pub struct BaseMerger;

impl Merger for BaseMerger {
    fn name(&self) -> &str {
        "DefaultBaseMerger"
    }

    fn target_type(&self) -> &str {
        BASE_LAYER
    }

    fn do_merge(&self, mine: Box<dyn Layer>, theirs: Box<dyn Layer>) -> Result<Box<dyn Layer>> {
        let mine = expect_type::<Base>(mine, "Base")?;
        let theirs = expect_type::<Base>(theirs, "Base")?;
        Ok(Box::new(mine.merge(*theirs)?))
    }
}

/// Unions the staged web servers.
#[derive(Debug, Default)]
pub struct WebServiceMerger;

impl Merger for WebServiceMerger {
    fn name(&self) -> &str {
        "DefaultWebServiceMerger"
    }

    fn target_type(&self) -> &str {
        WEB_SERVICE
    }

    fn do_merge(&self, mine: Box<dyn Layer>, theirs: Box<dyn Layer>) -> Result<Box<dyn Layer>> {
        let mine = expect_type::<WebService>(mine, "WebService")?;
        let theirs = expect_type::<WebService>(theirs, "WebService")?;
        Ok(Box::new(mine.merge(*theirs)?))
    }
}

/// Mergers for the built-in layers.
pub fn default_mergers() -> Vec<Box<dyn Merger>> {
    vec![Box::new(BaseMerger), Box::new(WebServiceMerger)]
}

/// Index layers by type name, keeping insertion order.
fn by_type(layers: Vec<Box<dyn Layer>>) -> Result<IndexMap<String, Option<Box<dyn Layer>>>> {
    let mut map = IndexMap::new();
    for layer in layers {
        let type_name = layer.type_name().to_string();
        if map.contains_key(&type_name) {
            return Err(EmulatorError::MergeConflict(format!(
                "more than one layer of type {} in one emulator",
                type_name
            )));
        }
        map.insert(type_name, Some(layer));
    }
    Ok(map)
}

impl Emulator {
    /// Combine this emulator with `other` into a new, unrendered emulator.
    ///
    /// Bindings keep this emulator's first, then `other`'s. Virtual node
    /// settings are unioned, this emulator winning on a name collision.
    /// Objects registered before render in either emulator are carried
    /// over. The result keeps this emulator's config.
    pub fn merge(self, other: Emulator, mergers: &[Box<dyn Merger>], vnode_prefix: &str) -> Result<Emulator> {
        if self.state != RenderState::Pending || other.state != RenderState::Pending {
            return Err(EmulatorError::MergeConflict(
                "cannot merge an emulator that has been rendered".to_string(),
            ));
        }

        let mut layers = by_type(self.layers.into_layers())?;
        let theirs = by_type(other.layers.into_layers())?;

        for (type_name, layer) in theirs {
            let Some(mut layer) = layer else {
                continue;
            };
            if !vnode_prefix.is_empty() {
                if let Some(service) = layer.as_service_mut() {
                    debug!("Prefixing vnodes of {} layer with {}", type_name, vnode_prefix);
                    service.rename_pending(vnode_prefix);
                }
            }

            match layers.get_mut(&type_name) {
                Some(slot) => {
                    let merger = mergers
                        .iter()
                        .find(|merger| merger.target_type() == type_name)
                        .ok_or_else(|| EmulatorError::NoMerger(type_name.clone()))?;
                    let mine = slot
                        .take()
                        .ok_or_else(|| EmulatorError::MergeConflict(format!("layer type {} merged twice", type_name)))?;
                    info!("Merging {} layers with {}", type_name, merger.name());
                    *slot = Some(merger.do_merge(mine, layer)?);
                }
                None => {
                    debug!("Adopting {} layer", type_name);
                    layers.insert(type_name, Some(layer));
                }
            }
        }

        let mut merged = Emulator::new(self.config);
        for layer in layers.into_values().flatten() {
            merged.layers.add(layer)?;
        }

        merged.bindings = self.bindings;
        merged.bindings.extend(other.bindings);

        merged.hooks = self.hooks;
        merged.hooks.absorb(other.hooks)?;

        merged.virtual_nodes = self.virtual_nodes;
        for (name, node) in other.virtual_nodes {
            merged.virtual_nodes.entry(name).or_insert(node);
        }

        merged.registry = self.registry;
        merged.registry.absorb(other.registry)?;

        info!(
            "Merged emulator has {} layers and {} bindings",
            merged.layers.len(),
            merged.bindings.len()
        );
        Ok(merged)
    }
}
