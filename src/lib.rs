//! # seedemu - Layered network emulation builder
//!
//! This library assembles network emulations out of pluggable layers and
//! compiles them into container deployments.
//!
//! ## Overview
//!
//! An [`Emulator`](emulator::Emulator) owns a registry of networks and
//! nodes, a set of layers, the bindings that place virtual nodes on
//! physical nodes, and the hooks wrapped around layer calls. Building an
//! emulation is a two-step affair: describe it (add layers, install
//! services on virtual node names, add bindings), then `render()` it. The
//! rendered registry is handed to a compiler that writes the artifacts.
//!
//! ## Key Features
//!
//! - **Layered configuration**: layers declare dependencies and run in a
//!   dependency-respecting order, once per phase
//! - **Virtual nodes**: services target names, bindings pick the hosts
//! - **Composable**: unrendered emulators can be merged, with per-type
//!   mergers combining layers of the same kind
//! - **Snapshots**: unrendered emulators can be dumped and loaded again
//! - **Reproducible**: every random choice comes from a seeded RNG
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - `registry`: `(scope, kind, name)`-keyed object store
//! - `node`: nodes, networks and typed attributes
//! - `layer`: the layer contract, the layer database and the base layer
//! - `service`: services, servers and the web service
//! - `binding`: virtual node filters, actions and resolution
//! - `hook`: callbacks around layer calls
//! - `emulator`: the render pipeline, merging and snapshots
//! - `compiler`: docker-compose output
//! - `config`: emulation description structures and validation
//! - `config_loader`: description file loading
//! - `orchestrator`: description to emulator to output
//! - `utils`: IPv4 prefixes and name validation
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use seedemu::binding::{Action, Binding, Filter};
//! use seedemu::compiler::ComposeCompiler;
//! use seedemu::emulator::Emulator;
//! use seedemu::layer::{Base, BaseConfig};
//! use seedemu::service::WebService;
//! use std::path::Path;
//!
//! let mut base = Base::new(BaseConfig::default());
//! let as150 = base.create_autonomous_system(150)?;
//! as150.create_network("net0")?;
//! as150.create_host("web")?.join_network("net0", None);
//!
//! let mut web = WebService::new();
//! web.install("site").set_port(8080);
//!
//! let mut emulator = Emulator::default();
//! emulator.add_layer(base)?;
//! emulator.add_layer(web)?;
//! emulator.add_binding(Binding::new("site", Filter::new().with_asn(150), Action::First)?)?;
//!
//! emulator.render()?;
//! emulator.compile(&mut ComposeCompiler::default(), Path::new("output"), true)?;
//! # Ok::<(), seedemu::error::EmulatorError>(())
//! ```
//!
//! ## Description Format
//!
//! The `seedemu` binary builds emulators from YAML descriptions; see
//! [`config`] for the format.

pub mod binding;
pub mod compiler;
pub mod config;
pub mod config_loader;
pub mod emulator;
pub mod error;
pub mod hook;
pub mod layer;
pub mod node;
pub mod orchestrator;
pub mod registry;
pub mod service;
pub mod utils;

pub use emulator::{Emulator, EmulatorConfig};
pub use error::{EmulatorError, Result};
