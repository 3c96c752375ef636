//! Typed per-node attribute store.
//!
//! Services use attributes to pass small facts about a node to other
//! services (for example a controller's port). Values are typed so a
//! consumer never has to parse strings back into numbers or addresses.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Text(String),
    Integer(i64),
    Flag(bool),
    Address(Ipv4Addr),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Text(s) => f.write_str(s),
            AttributeValue::Integer(i) => write!(f, "{}", i),
            AttributeValue::Flag(b) => write!(f, "{}", b),
            AttributeValue::Address(a) => write!(f, "{}", a),
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Text(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Integer(value)
    }
}

impl From<u16> for AttributeValue {
    fn from(value: u16) -> Self {
        AttributeValue::Integer(i64::from(value))
    }
}

impl From<u32> for AttributeValue {
    fn from(value: u32) -> Self {
        AttributeValue::Integer(i64::from(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Flag(value)
    }
}

impl From<Ipv4Addr> for AttributeValue {
    fn from(value: Ipv4Addr) -> Self {
        AttributeValue::Address(value)
    }
}

/// Insertion-ordered attribute map scoped to one node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes {
    values: IndexMap<String, AttributeValue>,
}

impl Attributes {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.values.get(key)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.values.get(key)? {
            AttributeValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        match self.values.get(key)? {
            AttributeValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn get_flag(&self, key: &str) -> Option<bool> {
        match self.values.get(key)? {
            AttributeValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn get_address(&self, key: &str) -> Option<Ipv4Addr> {
        match self.values.get(key)? {
            AttributeValue::Address(a) => Some(*a),
            _ => None,
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AttributeValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Copy every attribute of `other`, overwriting existing keys.
    pub fn extend_from(&mut self, other: &Attributes) {
        for (key, value) in &other.values {
            self.values.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_getters() {
        let mut attrs = Attributes::default();
        attrs.set("controller.port", 6653u16);
        attrs.set("controller.address", Ipv4Addr::new(10, 150, 0, 71));
        attrs.set("role", "controller");
        attrs.set("enabled", true);

        assert_eq!(attrs.get_integer("controller.port"), Some(6653));
        assert_eq!(
            attrs.get_address("controller.address"),
            Some(Ipv4Addr::new(10, 150, 0, 71))
        );
        assert_eq!(attrs.get_text("role"), Some("controller"));
        assert_eq!(attrs.get_flag("enabled"), Some(true));

        // Wrong type yields None instead of a lossy conversion
        assert_eq!(attrs.get_text("controller.port"), None);
        assert_eq!(attrs.get_integer("missing"), None);
    }

    #[test]
    fn test_extend_overwrites() {
        let mut a = Attributes::default();
        a.set("x", 1i64);
        a.set("y", "keep");
        let mut b = Attributes::default();
        b.set("x", 2i64);
        a.extend_from(&b);
        assert_eq!(a.get_integer("x"), Some(2));
        assert_eq!(a.get_text("y"), Some("keep"));
        assert_eq!(a.len(), 2);
    }
}
