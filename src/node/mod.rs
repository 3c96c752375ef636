//! Node and network model.
//!
//! Nodes and networks are the data the registry stores and the compilers
//! consume. Layers create them, services customize them, and virtual nodes
//! stage customizations for nodes that do not exist yet.

pub mod attributes;
pub mod network;
#[allow(clippy::module_inception)]
pub mod node;

pub use attributes::{AttributeValue, Attributes};
pub use network::{AddressPolicy, Network, NetworkKind};
pub use node::{Interface, NetworkJoin, Node, NodeRole, PortForward, StartCommand};
