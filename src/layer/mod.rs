//! Layers: the units of configuration logic.
//!
//! - [`traits`]: the [`Layer`] contract, dependency records and downcasting
//! - [`database`]: the per-emulator layer store with lifecycle flags
//! - [`base`]: the bootstrap topology layer

pub mod base;
pub mod database;
pub mod traits;

pub use base::{AutonomousSystem, Base, BaseConfig, InternetExchange, BASE_LAYER};
pub use database::LayerDatabase;
pub use traits::{downcast_box, downcast_mut, downcast_ref, AsAny, Dependency, Layer, LifecyclePhase};
