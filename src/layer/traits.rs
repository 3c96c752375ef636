//! The layer contract.
//!
//! A layer is a unit of configuration logic. It declares which other layers
//! must run before it and takes part in two passes: `configure`, where it
//! registers and links objects, and `render`, where it writes the final
//! configuration onto nodes. The emulator guarantees that every layer's
//! dependencies finish a pass before the layer itself runs that pass, and
//! that each pass runs at most once per layer.

use std::any::Any;

use crate::emulator::snapshot::SnapshotError;
use crate::emulator::Emulator;
use crate::error::Result;
use crate::service::Service;

/// Type-erasure helpers so layers can be downcast to their concrete type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }
}

/// A dependency record declared by a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// Name of the other layer
    pub target: String,
    /// Skip silently when the other layer was never added
    pub optional: bool,
    /// The other layer depends on the declaring layer instead
    pub reverse: bool,
}

impl Dependency {
    /// `target` must exist and runs first.
    pub fn required(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            optional: false,
            reverse: false,
        }
    }

    /// `target` runs first if it exists.
    pub fn optional(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            optional: true,
            reverse: false,
        }
    }

    /// Flip the edge: the target waits for the declaring layer.
    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }
}

/// Which pass of the lifecycle is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    Configure,
    Render,
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecyclePhase::Configure => f.write_str("configure"),
            LifecyclePhase::Render => f.write_str("render"),
        }
    }
}

/// A pluggable configuration unit.
pub trait Layer: AsAny {
    /// Unique name of this layer within an emulator.
    fn name(&self) -> &str;

    /// Type name used to pair layers when two emulators are merged.
    fn type_name(&self) -> &str {
        self.name()
    }

    fn dependencies(&self) -> Vec<Dependency> {
        Vec::new()
    }

    /// First pass: register objects and wire them together.
    fn configure(&mut self, _emulator: &mut Emulator) -> Result<()> {
        Ok(())
    }

    /// Second pass: write final configuration onto nodes.
    fn render(&mut self, emulator: &mut Emulator) -> Result<()>;

    fn as_service(&self) -> Option<&dyn Service> {
        None
    }

    fn as_service_mut(&mut self) -> Option<&mut dyn Service> {
        None
    }

    /// Serialize the layer's state for a snapshot.
    fn save(&self) -> Result<String> {
        Err(SnapshotError::Unsupported(self.type_name().to_string()).into())
    }
}

/// Downcast a layer to its concrete type.
pub fn downcast_ref<T: Layer>(layer: &dyn Layer) -> Option<&T> {
    layer.as_any().downcast_ref::<T>()
}

/// Downcast a layer to its concrete type, mutably.
pub fn downcast_mut<'a, T: Layer>(layer: &'a mut (dyn Layer + 'static)) -> Option<&'a mut T> {
    layer.as_any_mut().downcast_mut::<T>()
}

/// Take ownership of a layer as its concrete type.
pub fn downcast_box<T: Layer>(layer: Box<dyn Layer>) -> Option<Box<T>> {
    layer.into_any().downcast::<T>().ok()
}
