//! Layer hooks.
//!
//! A hook targets one layer by name and gets called immediately around that
//! layer's `configure` and `render` methods. Hooks are additive: they can
//! inspect and mutate the emulator, but they never decide whether the layer
//! counts as done. Hooks targeting the same layer run in the order they were
//! added.

use crate::emulator::Emulator;
use crate::error::{EmulatorError, Result};
use crate::layer::LifecyclePhase;

/// Where in a layer's lifecycle a hook is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookPoint {
    PreConfigure,
    PostConfigure,
    PreRender,
    PostRender,
}

impl HookPoint {
    /// The `(before, after)` points surrounding a lifecycle phase.
    pub fn around(phase: LifecyclePhase) -> (HookPoint, HookPoint) {
        match phase {
            LifecyclePhase::Configure => (HookPoint::PreConfigure, HookPoint::PostConfigure),
            LifecyclePhase::Render => (HookPoint::PreRender, HookPoint::PostRender),
        }
    }
}

/// A callback attached to a named layer.
pub trait Hook {
    /// Unique name of the hook.
    fn name(&self) -> &str;

    /// Name of the layer this hook wraps.
    fn target_layer(&self) -> &str;

    fn pre_configure(&mut self, _emulator: &mut Emulator) -> Result<()> {
        Ok(())
    }

    fn post_configure(&mut self, _emulator: &mut Emulator) -> Result<()> {
        Ok(())
    }

    fn pre_render(&mut self, _emulator: &mut Emulator) -> Result<()> {
        Ok(())
    }

    fn post_render(&mut self, _emulator: &mut Emulator) -> Result<()> {
        Ok(())
    }
}

/// Ordered collection of hooks.
#[derive(Default)]
pub struct HookTable {
    hooks: Vec<Box<dyn Hook>>,
}

impl HookTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, hook: Box<dyn Hook>) -> Result<()> {
        if self.hooks.iter().any(|existing| existing.name() == hook.name()) {
            return Err(EmulatorError::DuplicateHook(hook.name().to_string()));
        }
        self.hooks.push(hook);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.hooks.iter().map(|hook| hook.name()).collect()
    }

    /// Append every hook of `other`, keeping this table's hooks first.
    pub fn absorb(&mut self, other: HookTable) -> Result<()> {
        for hook in other.hooks {
            self.add(hook)?;
        }
        Ok(())
    }

    /// Invoke every hook targeting `layer` at `point`, in registration
    /// order.
    pub fn dispatch(&mut self, layer: &str, point: HookPoint, emulator: &mut Emulator) -> Result<()> {
        for hook in self.hooks.iter_mut().filter(|hook| hook.target_layer() == layer) {
            log::debug!("Running hook {} ({:?}) for layer {}", hook.name(), point, layer);
            match point {
                HookPoint::PreConfigure => hook.pre_configure(emulator)?,
                HookPoint::PostConfigure => hook.post_configure(emulator)?,
                HookPoint::PreRender => hook.pre_render(emulator)?,
                HookPoint::PostRender => hook.post_render(emulator)?,
            }
        }
        Ok(())
    }
}
