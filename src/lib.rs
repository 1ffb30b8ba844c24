//! Locates format string vulnerable subroutines in Crysis modules and generates the jump
//! hooks that redirect them to safe handlers.
//!
//! The pipeline for a single module is:
//!
//! 1. [`disasm::BinaryVariant::decode`] decodes the `.text` section of every build and
//!    indexes cross-references.
//! 2. Each [`signature::Signature`] locates exactly one subroutine per build.
//! 3. [`memory_patch::MemoryPatch`] sizes a shared [`hook::HookStub`] against every match
//!    and folds the per-build statements into [`cases::Branch`]es.
//!
//! [`generator::generate`] drives these steps for one subsystem.

pub mod builds;
pub mod cases;
pub mod disasm;
pub mod error;
pub mod generator;
pub mod hook;
pub mod image;
pub mod memory_patch;
pub mod signature;
pub mod variant;

pub use error::{Error, Result};
pub use generator::{generate, PatchGenerator};
pub use variant::{Bitness, Subsystem, VariantId};

pub use iced_x86;
pub use pelite;
