//! Emulator snapshots.
//!
//! A snapshot captures an unrendered emulator so it can be loaded back,
//! merged with others and rendered later. The file layout is:
//!
//! ```text
//! magic (8 bytes) | version (u32, little endian) | zstd(bincode(Snapshot))
//! ```
//!
//! Layer state is stored as JSON produced by [`Layer::save`] and rebuilt by
//! the loader registered for the layer's type name in a [`LayerCatalog`].
//! Hooks are code, not data, and are never written.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::{Emulator, EmulatorConfig, RenderState};
use crate::binding::Binding;
use crate::error::Result;
use crate::layer::{Base, Layer, BASE_LAYER};
use crate::node::Node;
use crate::registry::Registry;
use crate::service::{WebService, WEB_SERVICE};

/// Leading bytes of every snapshot file.
pub const SNAPSHOT_MAGIC: &[u8; 8] = b"SEEDEMU\0";
/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;

/// Errors raised while writing or reading snapshots.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("layer {0} does not support snapshots")]
    Unsupported(String),
    #[error("invalid state for layer {0}: {1}")]
    LayerState(String, #[source] serde_json::Error),
    #[error("snapshot encoding failed: {0}")]
    Encode(#[source] bincode::Error),
    #[error("snapshot decoding failed: {0}")]
    Decode(#[source] bincode::Error),
    #[error("not an emulator snapshot")]
    BadMagic,
    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
    #[error("no loader registered for layer type {0}")]
    UnknownLayerType(String),
    #[error("binding '{0}' has a custom filter predicate and cannot be saved")]
    UnpersistableFilter(String),
    #[error("cannot dump an emulator once render has started")]
    DumpAfterRender,
    #[error("snapshot i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct LayerRecord {
    name: String,
    type_name: String,
    state: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    created_at: DateTime<Utc>,
    config: EmulatorConfig,
    registry: Registry,
    layers: Vec<LayerRecord>,
    bindings: Vec<Binding>,
    virtual_nodes: IndexMap<String, Node>,
}

/// Rebuilds a layer from its saved JSON state.
pub type LayerLoader = fn(&str) -> Result<Box<dyn Layer>>;

/// Maps layer type names to loaders.
pub struct LayerCatalog {
    loaders: HashMap<String, LayerLoader>,
}

impl Default for LayerCatalog {
    fn default() -> Self {
        Self::with_builtin()
    }
}

impl LayerCatalog {
    /// A catalog with no loaders.
    pub fn empty() -> Self {
        Self {
            loaders: HashMap::new(),
        }
    }

    /// A catalog that knows the built-in layers.
    pub fn with_builtin() -> Self {
        let mut catalog = Self::empty();
        catalog.register(BASE_LAYER, Base::restore);
        catalog.register(WEB_SERVICE, WebService::restore);
        catalog
    }

    pub fn register(&mut self, type_name: impl Into<String>, loader: LayerLoader) {
        self.loaders.insert(type_name.into(), loader);
    }

    fn load(&self, record: &LayerRecord) -> Result<Box<dyn Layer>> {
        let loader = self
            .loaders
            .get(&record.type_name)
            .ok_or_else(|| SnapshotError::UnknownLayerType(record.type_name.clone()))?;
        loader(&record.state)
    }
}

impl Emulator {
    /// Encode this emulator as snapshot bytes.
    pub fn to_snapshot_bytes(&self) -> Result<Vec<u8>> {
        if self.state != RenderState::Pending {
            return Err(SnapshotError::DumpAfterRender.into());
        }
        if let Some(binding) = self.bindings.iter().find(|binding| binding.filter().has_custom()) {
            return Err(SnapshotError::UnpersistableFilter(binding.pattern().to_string()).into());
        }
        if !self.hooks.is_empty() {
            warn!("Snapshot does not include hooks: {}", self.hooks.names().join(", "));
        }

        let layers = self
            .layers
            .iter()
            .map(|layer| {
                Ok(LayerRecord {
                    name: layer.name().to_string(),
                    type_name: layer.type_name().to_string(),
                    state: layer.save()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let snapshot = Snapshot {
            created_at: Utc::now(),
            config: self.config.clone(),
            registry: self.registry.clone(),
            layers,
            bindings: self.bindings.clone(),
            virtual_nodes: self.virtual_nodes.clone(),
        };

        let payload = bincode::serialize(&snapshot).map_err(SnapshotError::Encode)?;
        let compressed = zstd::encode_all(payload.as_slice(), ZSTD_LEVEL).map_err(SnapshotError::Io)?;

        let mut bytes = Vec::with_capacity(SNAPSHOT_MAGIC.len() + 4 + compressed.len());
        bytes.extend_from_slice(SNAPSHOT_MAGIC);
        bytes.extend_from_slice(&SNAPSHOT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&compressed);
        debug!(
            "Encoded snapshot: {} layers, {} bytes ({} uncompressed)",
            snapshot.layers.len(),
            bytes.len(),
            payload.len()
        );
        Ok(bytes)
    }

    /// Decode an emulator from snapshot bytes.
    pub fn from_snapshot_bytes(bytes: &[u8], catalog: &LayerCatalog) -> Result<Emulator> {
        let header_len = SNAPSHOT_MAGIC.len() + 4;
        if bytes.len() < header_len || &bytes[..SNAPSHOT_MAGIC.len()] != SNAPSHOT_MAGIC {
            return Err(SnapshotError::BadMagic.into());
        }
        let mut version = [0u8; 4];
        version.copy_from_slice(&bytes[SNAPSHOT_MAGIC.len()..header_len]);
        let version = u32::from_le_bytes(version);
        if version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: version,
                expected: SNAPSHOT_VERSION,
            }
            .into());
        }

        let payload = zstd::decode_all(&bytes[header_len..]).map_err(SnapshotError::Io)?;
        let snapshot: Snapshot = bincode::deserialize(&payload).map_err(SnapshotError::Decode)?;
        debug!("Snapshot created at {}", snapshot.created_at.to_rfc3339());

        let mut emulator = Emulator::new(snapshot.config);
        emulator.registry = snapshot.registry;
        for record in &snapshot.layers {
            let layer = catalog.load(record)?;
            if layer.name() != record.name {
                warn!(
                    "Layer {} restored under name {}",
                    record.name,
                    layer.name()
                );
            }
            emulator.layers.add(layer)?;
        }
        emulator.bindings = snapshot.bindings;
        emulator.virtual_nodes = snapshot.virtual_nodes;
        Ok(emulator)
    }

    /// Write a snapshot of this emulator to `path`.
    pub fn dump(&self, path: &Path) -> Result<()> {
        let bytes = self.to_snapshot_bytes()?;
        fs::write(path, bytes).map_err(SnapshotError::Io)?;
        info!("Wrote snapshot to {}", path.display());
        Ok(())
    }

    /// Read a snapshot written by [`Emulator::dump`].
    pub fn load(path: &Path, catalog: &LayerCatalog) -> Result<Emulator> {
        let bytes = fs::read(path).map_err(SnapshotError::Io)?;
        let emulator = Self::from_snapshot_bytes(&bytes, catalog)?;
        info!(
            "Loaded snapshot {} with {} layers",
            path.display(),
            emulator.layers.len()
        );
        Ok(emulator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{Action, Filter};
    use crate::error::EmulatorError;
    use crate::layer::BaseConfig;

    fn sample() -> Emulator {
        let mut base = Base::new(BaseConfig::default());
        let as150 = base.create_autonomous_system(150).unwrap();
        as150.create_network("net0").unwrap();
        as150.create_host("h1").unwrap().join_network("net0", None);

        let mut web = WebService::new();
        web.install("site").set_port(8080);

        let mut emulator = Emulator::default();
        emulator.add_layer(base).unwrap();
        emulator.add_layer(web).unwrap();
        emulator
            .add_binding(Binding::new("site", Filter::new().with_asn(150), Action::First).unwrap())
            .unwrap();
        emulator.get_virtual_node("site").set_display_name("Site");
        emulator
    }

    #[test]
    fn test_bytes_round_trip_preserves_structure() {
        let bytes = sample().to_snapshot_bytes().unwrap();
        assert_eq!(&bytes[..8], SNAPSHOT_MAGIC);

        let loaded = Emulator::from_snapshot_bytes(&bytes, &LayerCatalog::with_builtin()).unwrap();
        assert_eq!(loaded.layer_names(), vec![BASE_LAYER.to_string(), WEB_SERVICE.to_string()]);
        assert_eq!(loaded.bindings().len(), 1);
        assert_eq!(loaded.virtual_nodes()["site"].display_name(), Some("Site"));
        let web = loaded.layer_as::<WebService>(WEB_SERVICE).unwrap();
        assert_eq!(web.server("site").unwrap().port(), 8080);
    }

    #[test]
    fn test_bad_magic_and_version() {
        let catalog = LayerCatalog::with_builtin();
        let err = Emulator::from_snapshot_bytes(b"not a snapshot", &catalog).err().unwrap();
        assert!(matches!(err, EmulatorError::Snapshot(SnapshotError::BadMagic)));

        let mut bytes = sample().to_snapshot_bytes().unwrap();
        bytes[8] = 99;
        let err = Emulator::from_snapshot_bytes(&bytes, &catalog).err().unwrap();
        assert!(matches!(
            err,
            EmulatorError::Snapshot(SnapshotError::UnsupportedVersion { found: 99, expected: 1 })
        ));
    }

    #[test]
    fn test_unknown_layer_type() {
        let bytes = sample().to_snapshot_bytes().unwrap();
        let mut catalog = LayerCatalog::empty();
        catalog.register(BASE_LAYER, Base::restore);
        let err = Emulator::from_snapshot_bytes(&bytes, &catalog).err().unwrap();
        assert!(matches!(err, EmulatorError::Snapshot(SnapshotError::UnknownLayerType(t)) if t == WEB_SERVICE));
    }

    #[test]
    fn test_custom_filter_cannot_be_saved() {
        let mut emulator = Emulator::default();
        let filter = Filter::new().with_custom(|_, _| true);
        emulator.add_binding(Binding::new("x", filter, Action::First).unwrap()).unwrap();
        let err = emulator.to_snapshot_bytes().unwrap_err();
        assert!(matches!(err, EmulatorError::Snapshot(SnapshotError::UnpersistableFilter(p)) if p == "x"));
    }

    #[test]
    fn test_dump_after_render_refused() {
        let mut emulator = sample();
        emulator.render().unwrap();
        let err = emulator.to_snapshot_bytes().unwrap_err();
        assert!(matches!(err, EmulatorError::Snapshot(SnapshotError::DumpAfterRender)));
    }

    #[test]
    fn test_layer_without_save_is_unsupported() {
        struct Plain;
        impl Layer for Plain {
            fn name(&self) -> &str {
                "Plain"
            }
            fn render(&mut self, _emulator: &mut Emulator) -> Result<()> {
                Ok(())
            }
        }
        let mut emulator = Emulator::default();
        emulator.add_layer(Plain).unwrap();
        let err = emulator.to_snapshot_bytes().unwrap_err();
        assert!(matches!(err, EmulatorError::Snapshot(SnapshotError::Unsupported(name)) if name == "Plain"));
    }
}
