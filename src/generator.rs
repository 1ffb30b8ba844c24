//! Sequential driver running every signature of a subsystem over its variants.

use crate::disasm::BinaryVariant;
use crate::error::Result;
use crate::memory_patch::{GeneratedPatch, MemoryPatch};
use crate::signature::{catalog, Signature};
use crate::variant::Subsystem;

/// Feeds variants of one subsystem to each of its [`MemoryPatch`]es.
///
/// Variants are consumed one at a time. Only the extracted matches outlive a variant, so
/// the hook size check and the case merge run once every variant has been seen.
pub struct PatchGenerator {
    subsystem: Subsystem,
    patches: Vec<MemoryPatch>,
    variants: usize,
}

impl PatchGenerator {
    /// A generator for every cataloged signature of `subsystem`.
    pub fn new(subsystem: Subsystem) -> Self {
        Self::with_signatures(subsystem, catalog::for_subsystem(subsystem))
    }

    pub fn with_signatures(subsystem: Subsystem, signatures: Vec<Box<dyn Signature>>) -> Self {
        Self {
            subsystem,
            patches: signatures
                .into_iter()
                .map(|s| MemoryPatch::new(subsystem, s))
                .collect(),
            variants: 0,
        }
    }

    pub fn subsystem(&self) -> Subsystem {
        self.subsystem
    }

    pub fn patches(&self) -> &[MemoryPatch] {
        &self.patches
    }

    pub fn process(&mut self, variant: &BinaryVariant) -> Result<()> {
        log::debug!("Matching {} signatures in {}", self.patches.len(), variant.id());
        for patch in self.patches.iter_mut() {
            patch.process(variant)?;
        }
        self.variants += 1;
        Ok(())
    }

    pub fn finish(self) -> Result<Vec<GeneratedPatch>> {
        log::debug!(
            "Generating {} {} patches from {} variants",
            self.patches.len(),
            self.subsystem,
            self.variants
        );
        self.patches.into_iter().map(MemoryPatch::finish).collect()
    }
}

/// Runs every signature of `subsystem` over `variants`, loading each one only when the
/// previous one has been fully processed.
///
/// The first error aborts the run.
pub fn generate<I>(subsystem: Subsystem, variants: I) -> Result<Vec<GeneratedPatch>>
where
    I: IntoIterator<Item = Result<BinaryVariant>>,
{
    let mut generator = PatchGenerator::new(subsystem);
    for variant in variants {
        generator.process(&variant?)?;
    }
    generator.finish()
}
