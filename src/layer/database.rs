//! Layer database: every added layer with its lifecycle flag.
//!
//! While a layer runs, it is lifted out of its slot so it can receive the
//! emulator mutably; the slot keeps its position so iteration order never
//! changes.

use indexmap::IndexMap;

use super::traits::{downcast_mut, downcast_ref, Layer};
use crate::error::{EmulatorError, Result};

struct LayerSlot {
    layer: Option<Box<dyn Layer>>,
    done: bool,
}

/// Layers keyed by name, in the order they were added.
#[derive(Default)]
pub struct LayerDatabase {
    slots: IndexMap<String, LayerSlot>,
}

impl LayerDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, layer: Box<dyn Layer>) -> Result<()> {
        let name = layer.name().to_string();
        if self.slots.contains_key(&name) {
            return Err(EmulatorError::DuplicateLayer(name));
        }
        self.slots.insert(
            name,
            LayerSlot {
                layer: Some(layer),
                done: false,
            },
        );
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.slots.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// `None` if no layer with this name was added.
    pub fn is_done(&self, name: &str) -> Option<bool> {
        self.slots.get(name).map(|slot| slot.done)
    }

    pub fn mark_done(&mut self, name: &str) {
        if let Some(slot) = self.slots.get_mut(name) {
            slot.done = true;
        }
    }

    /// Clear every lifecycle flag between the configure and render passes.
    pub fn reset(&mut self) {
        for slot in self.slots.values_mut() {
            slot.done = false;
        }
    }

    /// Lift a layer out of its slot. `None` if it is missing or already
    /// lifted (it is running further up the call stack).
    pub fn take(&mut self, name: &str) -> Option<Box<dyn Layer>> {
        self.slots.get_mut(name).and_then(|slot| slot.layer.take())
    }

    pub fn restore(&mut self, name: &str, layer: Box<dyn Layer>) {
        if let Some(slot) = self.slots.get_mut(name) {
            slot.layer = Some(layer);
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Layer> {
        self.slots.get(name).and_then(|slot| slot.layer.as_deref())
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut (dyn Layer + 'static)> {
        self.slots.get_mut(name).and_then(|slot| slot.layer.as_deref_mut())
    }

    pub fn downcast<T: Layer>(&self, name: &str) -> Option<&T> {
        self.get(name).and_then(|layer| downcast_ref::<T>(layer))
    }

    pub fn downcast_mut<T: Layer>(&mut self, name: &str) -> Option<&mut T> {
        self.get_mut(name).and_then(|layer| downcast_mut::<T>(layer))
    }

    /// Layers currently resting in their slots, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &dyn Layer> {
        self.slots.values().filter_map(|slot| slot.layer.as_deref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut (dyn Layer + 'static)> {
        self.slots.values_mut().filter_map(|slot| slot.layer.as_deref_mut())
    }

    /// Consume the database, yielding layers in insertion order.
    pub fn into_layers(self) -> Vec<Box<dyn Layer>> {
        self.slots.into_values().filter_map(|slot| slot.layer).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulator::Emulator;

    struct Named(&'static str);

    impl Layer for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn render(&mut self, _emulator: &mut Emulator) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut db = LayerDatabase::new();
        db.add(Box::new(Named("Base"))).unwrap();
        let err = db.add(Box::new(Named("Base"))).unwrap_err();
        assert!(matches!(err, EmulatorError::DuplicateLayer(name) if name == "Base"));
    }

    #[test]
    fn test_take_and_restore_keep_order() {
        let mut db = LayerDatabase::new();
        db.add(Box::new(Named("A"))).unwrap();
        db.add(Box::new(Named("B"))).unwrap();

        let a = db.take("A").unwrap();
        assert!(db.take("A").is_none());
        assert!(db.get("A").is_none());
        assert_eq!(db.iter().count(), 1);
        db.restore("A", a);

        assert_eq!(db.names(), vec!["A".to_string(), "B".to_string()]);
        assert!(db.downcast::<Named>("B").is_some());
    }

    #[test]
    fn test_done_flags() {
        let mut db = LayerDatabase::new();
        db.add(Box::new(Named("A"))).unwrap();
        assert_eq!(db.is_done("A"), Some(false));
        assert_eq!(db.is_done("Z"), None);
        db.mark_done("A");
        assert_eq!(db.is_done("A"), Some(true));
        db.reset();
        assert_eq!(db.is_done("A"), Some(false));
    }
}
