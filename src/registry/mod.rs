//! # Object Registry Module
//!
//! The registry is the central store every layer reads from and writes to.
//! Layers never hold references to each other's private state: anything
//! that has to cross a layer boundary (networks, hosts, routers, route
//! servers) is registered here and looked up by key.
//!
//! ## Keys
//!
//! Entries are keyed by `(scope, kind, name)`:
//!
//! ```text
//! 150/net/net0        local network of AS150
//! 150/hnode/web       host of AS150
//! 150/rnode/router0   router of AS150
//! ix100/net/ix100     peering LAN of IX100
//! ix100/rs/ix100      route server of IX100
//! ```
//!
//! Re-registering an existing key is an error.
//!
//! ## Ordering
//!
//! Iteration follows insertion order. The binding resolver uses this order
//! to break ties between physical nodes that satisfy the same filter, and
//! the compilers use it for reproducible output.

pub mod store;
pub mod types;

pub use store::{Registrable, Registry};
pub use types::{Kind, RegistryKey, Scope};
