//! Collects the matches of one signature across variants and turns them into patch code.

use fxhash::FxHashSet;

use crate::builds::CRYSIS_WARHEAD_32BIT_BUILDS;
use crate::cases::{Branch, BuildCases};
use crate::disasm::BinaryVariant;
use crate::error::{Error, Result};
use crate::hook::{self, HookStub};
use crate::signature::{Signature, SignatureMatch};
use crate::variant::{Bitness, Subsystem};

const WARHEAD_32BIT_PLACEHOLDER: &str = "// 32-bit Crysis Warhead is not supported";

/// Accumulates the results of one signature in one subsystem.
pub struct MemoryPatch {
    subsystem: Subsystem,
    signature: Box<dyn Signature>,
    processed: FxHashSet<(u32, Bitness)>,
    targets: Vec<SignatureMatch>,
    x64: BuildCases,
    x86: BuildCases,
}

impl MemoryPatch {
    pub fn new(subsystem: Subsystem, signature: Box<dyn Signature>) -> Self {
        Self {
            subsystem,
            signature,
            processed: Default::default(),
            targets: Vec::new(),
            x64: BuildCases::new(Bitness::X64),
            x86: BuildCases::new(Bitness::X86),
        }
    }

    pub fn name(&self) -> &'static str {
        self.signature.name()
    }

    pub fn targets(&self) -> &[SignatureMatch] {
        &self.targets
    }

    fn cases_mut(&mut self, bitness: Bitness) -> &mut BuildCases {
        match bitness {
            Bitness::X64 => &mut self.x64,
            Bitness::X86 => &mut self.x86,
        }
    }

    /// Locates the signature in `variant`, or records its exemption.
    pub fn process(&mut self, variant: &BinaryVariant) -> Result<()> {
        let id = variant.id();
        if id.subsystem != self.subsystem {
            return Err(Error::Precondition(format!(
                "{}: {id} handed to the {} patch",
                self.name(),
                self.subsystem
            )));
        }
        if !self.processed.insert((id.build, id.bitness)) {
            return Err(Error::Precondition(format!(
                "{}: {id} processed twice",
                self.name()
            )));
        }

        if let Some(statement) = self.signature.exemption(&id) {
            log::info!("{}: {id} is exempt", self.name());
            self.cases_mut(id.bitness).push(id.build, statement);
            return Ok(());
        }

        let sub = self.signature.find(variant)?;
        log::info!("{}: found in {id} at RVA {:x}", self.name(), sub.rva());
        self.targets.push(SignatureMatch::new(self.name(), &sub));
        Ok(())
    }

    /// Assembles the hooks and builds the final branch lists.
    pub fn finish(mut self) -> Result<GeneratedPatch> {
        let name = self.name();

        let hooks = match self.targets.is_empty() {
            true => Vec::new(),
            false => Bitness::ALL
                .into_iter()
                .map(|bitness| hook::assemble(name, bitness, &self.targets))
                .collect::<Result<Vec<_>>>()?,
        };

        let subsystem = self.subsystem;
        for target in &self.targets {
            let cases = match target.variant.bitness {
                Bitness::X64 => &mut self.x64,
                Bitness::X86 => &mut self.x86,
            };
            cases.push(
                target.variant.build,
                format!("FillMem(p{subsystem}, 0x{:x}, &code, sizeof(code));", target.rva),
            );
        }

        if self.x86.len() > 1 {
            for &build in CRYSIS_WARHEAD_32BIT_BUILDS {
                self.x86.insert_placeholder(build, WARHEAD_32BIT_PLACEHOLDER)?;
            }
        }

        Ok(GeneratedPatch {
            subsystem,
            name,
            doc: self.signature.doc(),
            params: vec![
                format!("void* p{subsystem}"),
                "int gameBuild".to_owned(),
                self.signature.handler().to_owned(),
            ],
            hooks,
            x64: self.x64.branches(),
            x86: self.x86.branches(),
            targets: self.targets,
        })
    }
}

/// Everything the emitter needs to write one patch function.
#[derive(Debug, Clone)]
pub struct GeneratedPatch {
    pub subsystem: Subsystem,
    pub name: &'static str,
    pub doc: &'static str,
    /// C parameter declarations of the patch function.
    pub params: Vec<String>,
    /// One stub per bitness, 64-bit first. Empty when the patch injects no code.
    pub hooks: Vec<HookStub>,
    pub targets: Vec<SignatureMatch>,
    pub x64: Vec<Branch>,
    pub x86: Vec<Branch>,
}

impl GeneratedPatch {
    pub fn function_name(&self) -> String {
        format!("MemoryPatch::{}::{}", self.subsystem, self.name)
    }

    pub fn hook(&self, bitness: Bitness) -> Option<&HookStub> {
        self.hooks.iter().find(|h| h.bitness == bitness)
    }

    pub fn branches(&self, bitness: Bitness) -> &[Branch] {
        match bitness {
            Bitness::X64 => &self.x64,
            Bitness::X86 => &self.x86,
        }
    }
}
