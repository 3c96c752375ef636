//! Binding resolution: turn pending virtual node names into registry keys.

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

use super::{Action, Binding, CompiledBinding};
use crate::error::{EmulatorError, Result};
use crate::layer::Base;
use crate::registry::{Kind, Registry, RegistryKey};
use crate::utils::validation::is_literal_name;

/// What the resolver may read and change while binding.
pub struct BindingContext<'a> {
    pub registry: &'a mut Registry,
    /// Needed for `New` (and `Default` without candidates)
    pub base: Option<&'a Base>,
    pub rng: &'a mut StdRng,
}

/// Resolve every name in `pending` against `bindings`.
///
/// Bindings are tried in order; within a binding, unresolved vnodes are
/// tried in pending order. Fails on the first vnode left unresolved.
pub fn resolve_bindings(
    pending: &[String],
    bindings: &[Binding],
    ctx: &mut BindingContext<'_>,
) -> Result<IndexMap<String, RegistryKey>> {
    let compiled = bindings.iter().map(Binding::compile).collect::<Result<Vec<_>>>()?;
    let mut resolved: IndexMap<String, RegistryKey> = IndexMap::new();
    let mut bound: HashSet<RegistryKey> = HashSet::new();

    for binding in &compiled {
        for vnode in pending {
            if resolved.contains_key(vnode) || !binding.applies_to(vnode) {
                continue;
            }
            if let Some(key) = binding.pick(vnode, ctx, &bound)? {
                log::info!("Bound vnode {} to {} ({:?})", vnode, key, binding.binding.action());
                bound.insert(key.clone());
                resolved.insert(vnode.clone(), key);
            }
        }
    }

    if let Some(vnode) = pending.iter().find(|vnode| !resolved.contains_key(*vnode)) {
        return Err(EmulatorError::UnresolvedVirtualNode(vnode.clone()));
    }
    Ok(resolved)
}

impl CompiledBinding<'_> {
    /// Hosts that pass the filter, in registry order.
    fn candidates(&self, vnode: &str, registry: &Registry, bound: &HashSet<RegistryKey>) -> Vec<RegistryKey> {
        let allow_bound = self.filter.filter().allow_bound;
        registry
            .get_all()
            .filter(|(key, _)| key.kind == Kind::HNode)
            .filter(|(key, _)| allow_bound || !bound.contains(*key))
            .filter_map(|(key, object)| object.as_node().map(|node| (key, node)))
            .filter(|(_, node)| self.filter.matches(vnode, node))
            .map(|(key, _)| key.clone())
            .collect()
    }

    fn pick(
        &self,
        vnode: &str,
        ctx: &mut BindingContext<'_>,
        bound: &HashSet<RegistryKey>,
    ) -> Result<Option<RegistryKey>> {
        let action = self.binding.action();
        if action == Action::New {
            return self.create(vnode, ctx).map(Some);
        }

        let mut candidates = self.candidates(vnode, ctx.registry, bound);
        let picked = match action {
            Action::Default | Action::First => {
                if candidates.is_empty() {
                    None
                } else {
                    Some(candidates.swap_remove(0))
                }
            }
            Action::Last => candidates.pop(),
            Action::Random => candidates.choose(&mut *ctx.rng).cloned(),
            Action::New => None,
        };

        match picked {
            None if action == Action::Default => {
                log::debug!("No candidate for vnode {}, creating a new host", vnode);
                self.create(vnode, ctx).map(Some)
            }
            picked => Ok(picked),
        }
    }

    /// Create and register a new host satisfying the filter.
    fn create(&self, vnode: &str, ctx: &mut BindingContext<'_>) -> Result<RegistryKey> {
        let cannot = |reason: String| EmulatorError::CannotCreateNode {
            vnode: vnode.to_string(),
            reason,
        };
        let base = ctx.base.ok_or_else(|| cannot("no base layer to create hosts in".to_string()))?;
        let filter = self.filter.filter();

        let asn = match filter.asn {
            Some(asn) => asn,
            None => *base
                .asns()
                .choose(&mut *ctx.rng)
                .ok_or_else(|| cannot("no autonomous system exists".to_string()))?,
        };
        let name = match filter.node_name.as_deref() {
            Some(name) if is_literal_name(name) => name.to_string(),
            _ => format!("vnode_{}", vnode),
        };
        let network = base
            .pick_network(asn, filter.ip, filter.prefix)
            .map_err(|e| cannot(e.to_string()))?;

        base.create_bound_host(ctx.registry, asn, &name, &network, filter.ip)
            .map_err(|e| cannot(e.to_string()))
    }
}
