//! Virtual node bindings.
//!
//! Services install servers on *virtual node* names. A [`Binding`] maps
//! virtual node names (by regex) to physical nodes chosen with a
//! [`Filter`] and an [`Action`]. Bindings are evaluated once per render,
//! in the order they were added:
//!
//! - for each binding, every still-unresolved virtual node whose name fully
//!   matches the pattern is offered to the binding
//! - the binding looks for candidates among registered hosts (registry
//!   insertion order) that pass the filter
//! - the action picks one candidate, or creates a new host
//!
//! Once a virtual node is resolved it is never reconsidered, so earlier
//! bindings take precedence over later ones. A virtual node left
//! unresolved at the end fails the render.

pub mod filter;
pub mod resolver;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use filter::{Filter, NodePredicate};
pub use resolver::{resolve_bindings, BindingContext};

/// How a binding picks a physical node among the candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Reuse the first candidate, or create a new host if there is none
    #[default]
    Default,
    /// First candidate in registry order
    First,
    /// Last candidate in registry order
    Last,
    /// Candidate drawn from the emulator's seeded RNG
    Random,
    /// Always create a new host satisfying the filter
    New,
}

/// A `(pattern, filter, action)` rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binding {
    pattern: String,
    filter: Filter,
    action: Action,
}

impl Binding {
    /// Build a binding, rejecting invalid patterns up front.
    pub fn new(pattern: impl Into<String>, filter: Filter, action: Action) -> Result<Self> {
        let binding = Self {
            pattern: pattern.into(),
            filter,
            action,
        };
        binding.compile()?;
        Ok(binding)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub(crate) fn compile(&self) -> Result<CompiledBinding<'_>> {
        Ok(CompiledBinding {
            binding: self,
            pattern: filter::whole_match(&self.pattern)?,
            filter: self.filter.compile()?,
        })
    }
}

pub(crate) struct CompiledBinding<'a> {
    binding: &'a Binding,
    pattern: Regex,
    filter: filter::CompiledFilter<'a>,
}

impl CompiledBinding<'_> {
    pub(crate) fn applies_to(&self, vnode: &str) -> bool {
        self.pattern.is_match(vnode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmulatorError;

    #[test]
    fn test_pattern_is_whole_name() {
        let binding = Binding::new("web", Filter::new(), Action::First).unwrap();
        let compiled = binding.compile().unwrap();
        assert!(compiled.applies_to("web"));
        assert!(!compiled.applies_to("web2"));
        assert!(!compiled.applies_to("myweb"));
    }

    #[test]
    fn test_invalid_pattern_rejected_on_creation() {
        let err = Binding::new("web[", Filter::new(), Action::First).unwrap_err();
        assert!(matches!(err, EmulatorError::InvalidPattern { pattern, .. } if pattern == "web["));
    }

    #[test]
    fn test_action_names() {
        let action: Action = serde_yaml::from_str("random").unwrap();
        assert_eq!(action, Action::Random);
        assert_eq!(Action::default(), Action::Default);
    }
}
