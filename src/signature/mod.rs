//! Structural signatures identifying a specific subroutine across builds.
//!
//! A [`Pattern`] seeds its search with a literal anchor instruction, expands every anchor
//! occurrence into its enclosing [`Subroutine`] and then checks a list of positional
//! [`Rule`]s against it. Variation between builds is only tolerated where a pattern spells
//! it out (alternate anchor offsets, register-only or opcode-only checks). There are no
//! wildcards and no scoring.

use iced_x86::{Code, Instruction, OpKind, Register};

use crate::disasm::{subroutine::Subroutine, BinaryVariant};
use crate::error::{Error, Result};
use crate::variant::{Bitness, Subsystem, VariantId};

pub mod catalog;
mod cry_warning;
mod game_warning;

pub use cry_warning::HookCryWarning;
pub use game_warning::HookGameWarning;

/// Position of an instruction inside a matching window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Counted from the first instruction of the window.
    Start(usize),
    /// Counted backward from the end of the window; `End(1)` is the last instruction.
    End(usize),
}

impl Position {
    fn resolve(self, window: &[Instruction]) -> Option<&Instruction> {
        match self {
            Position::Start(i) => window.get(i),
            Position::End(n) => window.len().checked_sub(n).map(|i| &window[i]),
        }
    }
}

/// A single check applied to one instruction of a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Same opcode and operands. Address and length are not compared.
    Exact(Instruction),
    /// Same opcode, operands unchecked.
    Code(Code),
    /// The given operand is this register.
    Register { operand: u32, register: Register },
    /// A near branch whose target is the instruction at the given position.
    BranchTarget(Position),
}

impl Predicate {
    pub fn test(&self, window: &[Instruction], at: usize) -> bool {
        let Some(instr) = window.get(at) else {
            return false;
        };
        match self {
            Predicate::Exact(expected) => instr == expected,
            Predicate::Code(code) => instr.code() == *code,
            Predicate::Register { operand, register } => {
                *operand < instr.op_count()
                    && instr.op_kind(*operand) == OpKind::Register
                    && instr.op_register(*operand) == *register
            }
            Predicate::BranchTarget(position) => {
                matches!(
                    instr.op0_kind(),
                    OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64
                ) && position
                    .resolve(window)
                    .is_some_and(|target| target.ip() == instr.near_branch_target())
            }
        }
    }
}

/// A [`Predicate`] bound to an offset in the matching window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    pub at: usize,
    pub predicate: Predicate,
}

impl Rule {
    #[inline]
    pub fn test(&self, window: &[Instruction]) -> bool {
        self.predicate.test(window, self.at)
    }
}

/// Declarative description of one subroutine for one bitness.
#[derive(Debug, Clone)]
pub struct Pattern {
    anchor: Instruction,
    anchor_offsets: Vec<usize>,
    min_len: usize,
    rules: Vec<Rule>,
}

impl Pattern {
    /// A pattern whose anchor must be the first instruction of the subroutine.
    pub fn new(anchor: Instruction) -> Self {
        Self {
            anchor,
            anchor_offsets: vec![0],
            min_len: 1,
            rules: Vec::new(),
        }
    }

    /// Allows the anchor at any of these offsets from the start of the subroutine, to cope
    /// with prologues that only some builds have. Rules are evaluated relative to the anchor.
    pub fn anchor_offsets(mut self, offsets: &[usize]) -> Self {
        self.anchor_offsets = offsets.to_vec();
        self
    }

    /// Minimum number of instructions in the whole subroutine, prologue included.
    pub fn min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    pub fn expect(mut self, at: usize, predicate: Predicate) -> Self {
        self.rules.push(Rule { at, predicate });
        self
    }

    pub fn expect_exact(self, at: usize, instr: Instruction) -> Self {
        self.expect(at, Predicate::Exact(instr))
    }

    pub fn expect_code(self, at: usize, code: Code) -> Self {
        self.expect(at, Predicate::Code(code))
    }

    pub fn anchor(&self) -> &Instruction {
        &self.anchor
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Checks a subroutine found from the anchor at `anchor_index`.
    ///
    /// On failure, returns a short reason for logging.
    pub fn check(
        &self,
        sub: &Subroutine<'_>,
        anchor_index: usize,
    ) -> std::result::Result<(), String> {
        let offset = anchor_index - sub.begin();
        if !self.anchor_offsets.contains(&offset) {
            return Err(format!("anchor at offset {offset}"));
        }
        if sub.len() < self.min_len {
            return Err(format!("only {} instructions", sub.len()));
        }

        let window = &sub.instructions()[offset..];
        match self.rules.iter().position(|r| !r.test(window)) {
            Some(i) => Err(format!("rule {i} failed at offset {}", self.rules[i].at)),
            None => Ok(()),
        }
    }

    /// Every distinct subroutine of `variant` satisfying this pattern, in address order.
    pub fn candidates<'a>(&self, variant: &'a BinaryVariant) -> Vec<Subroutine<'a>> {
        let mut found: Vec<Subroutine<'a>> = Vec::new();

        for (index, instr) in variant.instructions().iter().enumerate() {
            if *instr != self.anchor {
                continue;
            }
            let sub = variant.subroutine_at(index);
            match self.check(&sub, index) {
                Ok(()) => {
                    log::trace!("{}: candidate at {:x}", variant.id(), sub.rva());
                    found.push(sub);
                }
                Err(reason) => {
                    log::trace!("{}: rejected {:x}: {reason}", variant.id(), sub.rva())
                }
            }
        }

        // Two anchors inside the same subroutine still make a single match
        found.dedup_by_key(|s| s.begin());
        found
    }

    /// The single subroutine of `variant` satisfying this pattern.
    pub fn find_unique<'a>(
        &self,
        signature: &'static str,
        variant: &'a BinaryVariant,
    ) -> Result<Subroutine<'a>> {
        let mut found = self.candidates(variant);
        match found.len() {
            0 => Err(Error::NoMatch {
                signature,
                variant: variant.id(),
            }),
            1 => Ok(found.remove(0)),
            _ => Err(Error::AmbiguousMatch {
                signature,
                variant: variant.id(),
                rvas: found.iter().map(Subroutine::rva).collect(),
            }),
        }
    }
}

/// A subroutine located by a signature, detached from the variant it was found in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureMatch {
    pub signature: &'static str,
    pub variant: VariantId,
    /// Address of the subroutine, relative to the image base.
    pub rva: u64,
    /// Encoded length of each instruction of the subroutine, in order.
    pub instruction_lengths: Vec<usize>,
}

impl SignatureMatch {
    pub fn new(signature: &'static str, sub: &Subroutine<'_>) -> Self {
        Self {
            signature,
            variant: sub.variant().id(),
            rva: sub.rva(),
            instruction_lengths: sub.instructions().iter().map(Instruction::len).collect(),
        }
    }

    /// Bytes taken by the fewest leading whole instructions that span at least `required`
    /// bytes, or `None` if the whole subroutine is shorter than that.
    pub fn cover(&self, required: usize) -> Option<usize> {
        let mut size = 0;
        for &len in &self.instruction_lengths {
            size += len;
            if size >= required {
                return Some(size);
            }
        }
        None
    }

    pub fn byte_len(&self) -> usize {
        self.instruction_lengths.iter().sum()
    }
}

/// A named vulnerable subroutine to hook, with one [`Pattern`] per bitness.
pub trait Signature {
    /// Name of the generated patch function.
    fn name(&self) -> &'static str;

    /// Documentation attached to the generated patch function.
    fn doc(&self) -> &'static str;

    /// C declaration of the handler parameter the hook jumps to.
    fn handler(&self) -> &'static str;

    /// Modules containing a copy of the subroutine.
    fn subsystems(&self) -> &'static [Subsystem];

    fn pattern(&self, bitness: Bitness) -> Result<Pattern>;

    /// Variants known not to contain the subroutine at all.
    ///
    /// Returns the statement emitted for that build in place of a hook. The default
    /// expects the subroutine everywhere.
    #[allow(unused_variables)]
    fn exemption(&self, variant: &VariantId) -> Option<&'static str> {
        None
    }

    /// Locates the subroutine in `variant`.
    fn find<'a>(&self, variant: &'a BinaryVariant) -> Result<Subroutine<'a>> {
        self.pattern(variant.id().bitness)?
            .find_unique(self.name(), variant)
    }
}
