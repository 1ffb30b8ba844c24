//! Error types for patch generation.
//!
//! Every error is fatal to the whole run: a hook that does not cover every
//! targeted variant is never emitted.

use thiserror::Error;

use crate::variant::{Bitness, VariantId};

/// Result type alias using our error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{variant}: cannot decode instruction at 0x{address:X}")]
    Decode { variant: VariantId, address: u64 },

    #[error("{signature}: no matching subroutine in {variant}")]
    NoMatch {
        signature: &'static str,
        variant: VariantId,
    },

    #[error("{signature}: {} matching subroutines in {variant} (RVAs {rvas:X?})", rvas.len())]
    AmbiguousMatch {
        signature: &'static str,
        variant: VariantId,
        rvas: Vec<u64>,
    },

    #[error("{signature}: subroutine at RVA 0x{rva:X} in {variant} has {size} bytes, hook needs {required}")]
    SubroutineTooSmall {
        signature: &'static str,
        variant: VariantId,
        rva: u64,
        size: usize,
        required: usize,
    },

    #[error("{signature}: {bitness} hook would overwrite {size} bytes in {variant}, but {expected} bytes in build {expected_build}")]
    InconsistentTargetSize {
        signature: &'static str,
        bitness: Bitness,
        variant: VariantId,
        size: usize,
        expected: usize,
        expected_build: u32,
    },

    #[error("precondition violated: {0}")]
    Precondition(String),

    #[error("encoder error: {0}")]
    Encode(#[from] iced_x86::IcedError),

    #[error("PE error: {0}")]
    Image(#[from] pelite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
