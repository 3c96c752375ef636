//! Compilers turn a rendered emulator into deployable artifacts.
//!
//! A compiler only reads the emulator: it walks the registry through
//! `get_all()` and writes files below the output directory that
//! [`Emulator::compile`] prepared for it.

pub mod compose;
pub mod types;

use std::path::Path;

use crate::emulator::Emulator;
use crate::error::Result;

pub use compose::{ComposeCompiler, ComposeCompilerConfig};

/// Output backend.
pub trait Compiler {
    fn name(&self) -> &str;

    /// Write artifacts for `emulator` into `output_dir`, which exists and
    /// is empty.
    fn compile(&mut self, emulator: &Emulator, output_dir: &Path) -> Result<()>;
}
