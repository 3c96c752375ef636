//! Error taxonomy for the emulation kernel.
//!
//! Every failure the kernel can raise is fatal for the call that raised it:
//! a failed `render()` or `merge()` is never retried or rolled back. Errors
//! carry the offending registry key, layer, hook or virtual node name so the
//! building script can report exactly what went wrong.

use crate::emulator::snapshot::SnapshotError;
use crate::registry::{Kind, RegistryKey};

/// Errors raised by the registry, the layer lifecycle, the binding
/// resolver, the merge algorithm and the compilers.
#[derive(Debug, thiserror::Error)]
pub enum EmulatorError {
    // Configuration errors
    #[error("registry key {0} is already registered")]
    DuplicateKey(RegistryKey),
    #[error("object {0} not found in registry")]
    NotFound(RegistryKey),
    #[error("registry key {key} cannot hold a {found} object")]
    KindMismatch { key: RegistryKey, found: Kind },
    #[error("layer {0} has already been added")]
    DuplicateLayer(String),
    #[error("virtual node {0} is installed by more than one service")]
    DuplicateVirtualNode(String),
    #[error("hook {0} has already been added")]
    DuplicateHook(String),
    #[error("emulator has already been rendered")]
    AlreadyRendered,
    #[error("emulator has not been rendered yet")]
    NotRendered,
    #[error("output directory {0} already exists")]
    OutputExists(String),

    // Dependency errors
    #[error("Layer {0} required but missing")]
    MissingLayer(String),
    #[error("dependency cycle detected: {0}")]
    DependencyCycle(String),
    #[error("layer {name} is not a {expected}")]
    LayerType { name: String, expected: &'static str },

    // Binding errors
    #[error("cannot resolve vnode {0}")]
    UnresolvedVirtualNode(String),
    #[error("vnode {0} is not bound to a physical node")]
    NotBound(String),
    #[error("invalid binding pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("cannot copy settings from virtual node {name}: expected asn 0, found {asn}")]
    InvalidVirtualNode { name: String, asn: u32 },
    #[error("cannot create a node for vnode {vnode}: {reason}")]
    CannotCreateNode { vnode: String, reason: String },

    // Topology errors
    #[error("autonomous system {0} does not exist")]
    UnknownAs(u32),
    #[error("internet exchange {0} does not exist")]
    UnknownIx(u32),
    #[error("address assignment failed: {0}")]
    Address(String),

    // Merge errors
    #[error("no merger found for layer type {0}")]
    NoMerger(String),
    #[error("merge conflict: {0}")]
    MergeConflict(String),

    /// Raised by layer, service and compiler implementations.
    #[error("layer {layer}: {message}")]
    Layer { layer: String, message: String },

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize output: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result alias used across the kernel.
pub type Result<T, E = EmulatorError> = std::result::Result<T, E>;
