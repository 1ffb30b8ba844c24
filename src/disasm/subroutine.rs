use std::ops::Range;

use iced_x86::Instruction;

use super::BinaryVariant;

/// A half-open range of instructions believed to form one compiled function.
///
/// Boundaries are inferred without a control flow graph: the target binaries lay functions
/// out contiguously, each one either reached through a direct call or separated from its
/// neighbours by `INT3` padding. Functions only reached indirectly and not padded will be
/// merged with their neighbour, so a [`Subroutine`] must be confirmed by a signature before
/// it is trusted.
#[derive(Clone, Copy)]
pub struct Subroutine<'a> {
    variant: &'a BinaryVariant,
    begin: usize,
    end: usize,
}

impl<'a> Subroutine<'a> {
    /// Expands outward from the instruction at `index` until a boundary is hit on each side.
    ///
    /// Walking backward stops on an instruction that is a call target, or one preceded by
    /// `INT3`. Walking forward stops before a call target or an `INT3`.
    ///
    /// # Panics
    ///
    /// If `index` is not the index of an instruction of `variant`.
    pub fn enclosing(variant: &'a BinaryVariant, index: usize) -> Self {
        let count = variant.instructions().len();
        assert!(
            index < count,
            "instruction index {index} out of range ({count} instructions)"
        );

        let mut begin = index;
        while begin > 0 && !variant.has_call_xref(begin) && !variant.is_terminator(begin - 1) {
            begin -= 1;
        }

        let mut end = index + 1;
        while end < count && !variant.has_call_xref(end) && !variant.is_terminator(end) {
            end += 1;
        }

        Self {
            variant,
            begin,
            end,
        }
    }

    #[inline]
    pub fn variant(&self) -> &'a BinaryVariant {
        self.variant
    }

    #[inline]
    pub fn begin(&self) -> usize {
        self.begin
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    #[inline]
    pub fn range(&self) -> Range<usize> {
        self.begin..self.end
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    #[inline]
    pub fn instructions(&self) -> &'a [Instruction] {
        &self.variant.instructions()[self.range()]
    }

    /// Address of the first instruction, relative to the image base.
    #[inline]
    pub fn rva(&self) -> u64 {
        self.variant.rva(self.begin)
    }

    /// Size of the subroutine in bytes.
    pub fn byte_len(&self) -> usize {
        self.instructions().iter().map(Instruction::len).sum()
    }

    pub fn dump(&self) -> impl Iterator<Item = String> + 'a {
        let variant = self.variant;
        self.range().map(move |i| variant.format_instruction(i))
    }
}

impl std::fmt::Debug for Subroutine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subroutine")
            .field("variant", &self.variant.id())
            .field("rva", &format_args!("{:x}", self.rva()))
            .field("range", &self.range())
            .finish()
    }
}
