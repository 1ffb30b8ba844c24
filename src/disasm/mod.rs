//! Linear disassembly of a variant's code section.
//!
//! Unlike a recursive traversal, every byte of the section is decoded exactly once, in
//! address order. This is only sound for sections that contain nothing but code and
//! inter-function padding, which holds for the `.text` sections we work with.

use iced_x86::{Code, Decoder, DecoderOptions, Formatter, Instruction, IntelFormatter};

use crate::error::{Error, Result};
use crate::variant::VariantId;

pub mod subroutine;
pub mod xrefs;

use subroutine::Subroutine;
use xrefs::XrefIndex;

/// A contiguous code buffer handed over by the image loader.
#[derive(Debug, Clone, Copy)]
pub struct CodeSection<'a> {
    /// Address the image is mapped at.
    pub image_base: u64,
    /// Size of the whole mapped image, in bytes.
    pub image_size: u64,
    /// Virtual address of the first byte of `bytes`.
    pub address: u64,
    pub bytes: &'a [u8],
}

impl CodeSection<'_> {
    pub fn image_range(&self) -> std::ops::Range<u64> {
        self.image_base..self.image_base + self.image_size
    }
}

/// A fully decoded binary variant along with its cross-reference index.
pub struct BinaryVariant {
    id: VariantId,
    image_base: u64,
    image_size: u64,
    instructions: Vec<Instruction>,
    xrefs: XrefIndex,
}

impl BinaryVariant {
    /// Decodes every instruction of `code` and indexes the references between them.
    ///
    /// Fails on the first byte sequence that is not a valid instruction for the variant's
    /// bitness. A partially decoded image cannot be trusted for pattern matching, so there is
    /// no attempt to resynchronize.
    ///
    /// The code must lie within the image, otherwise references into it could not be
    /// expressed as RVAs.
    pub fn decode(id: VariantId, code: CodeSection<'_>) -> Result<Self> {
        let image = code.image_range();
        let end = code.address.checked_add(code.bytes.len() as u64);
        if !matches!(end, Some(end) if image.start <= code.address && end <= image.end) {
            return Err(Error::Precondition(format!(
                "{id}: code at {:016x} ({} bytes) is outside the image {:016x}..{:016x}",
                code.address,
                code.bytes.len(),
                image.start,
                image.end
            )));
        }

        let decoder = Decoder::with_ip(
            id.bitness.bits(),
            code.bytes,
            code.address,
            DecoderOptions::NONE,
        );

        let instructions = decoder
            .into_iter()
            .map(|instr| match instr.is_invalid() {
                true => Err(Error::Decode {
                    variant: id,
                    address: instr.ip(),
                }),
                false => Ok(instr),
            })
            .collect::<Result<Vec<_>>>()?;

        let xrefs = XrefIndex::build(&instructions, code.image_base, code.image_size);

        log::debug!(
            "{id}: decoded {} instructions at {:016x}, {} xrefs to {} addresses",
            instructions.len(),
            code.address,
            xrefs.count(),
            xrefs.len()
        );

        Ok(Self {
            id,
            image_base: code.image_base,
            image_size: code.image_size,
            instructions,
            xrefs,
        })
    }

    #[inline]
    pub fn id(&self) -> VariantId {
        self.id
    }

    #[inline]
    pub fn image_base(&self) -> u64 {
        self.image_base
    }

    #[inline]
    pub fn image_size(&self) -> u64 {
        self.image_size
    }

    #[inline]
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    #[inline]
    pub fn xrefs(&self) -> &XrefIndex {
        &self.xrefs
    }

    /// Address of the instruction at `index`, relative to the image base.
    #[inline]
    pub fn rva(&self, index: usize) -> u64 {
        self.instructions[index].ip() - self.image_base
    }

    /// Whether the instruction at `index` is the target of a direct near call.
    pub fn has_call_xref(&self, index: usize) -> bool {
        self.xrefs
            .referrers(self.rva(index))
            .iter()
            .any(|&x| is_direct_call(&self.instructions[x]))
    }

    /// Whether the instruction at `index` is inter-function padding.
    #[inline]
    pub fn is_terminator(&self, index: usize) -> bool {
        self.instructions[index].code() == Code::Int3
    }

    /// Expands the instruction at `index` to the subroutine containing it.
    ///
    /// Panics if `index` is out of range, see [`Subroutine::enclosing`].
    pub fn subroutine_at(&self, index: usize) -> Subroutine<'_> {
        Subroutine::enclosing(self, index)
    }

    /// Renders the instruction at `index` as `ADDRESS  disassembly`.
    pub fn format_instruction(&self, index: usize) -> String {
        let mut output = String::new();
        IntelFormatter::new().format(&self.instructions[index], &mut output);
        format!("{:016X} {}", self.instructions[index].ip(), output)
    }

    /// One line per recorded cross-reference, in the order they were indexed.
    pub fn xref_listing(&self) -> impl Iterator<Item = String> + '_ {
        self.xrefs.iter().flat_map(move |(rva, referrers)| {
            referrers
                .iter()
                .map(move |&index| format!("{} -> 0x{rva:x}", self.format_instruction(index)))
        })
    }
}

impl std::fmt::Debug for BinaryVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryVariant")
            .field("id", &self.id)
            .field("image_base", &format_args!("{:016x}", self.image_base))
            .field("image_size", &format_args!("{:x}", self.image_size))
            .field("instructions", &self.instructions.len())
            .field("xrefs", &self.xrefs.count())
            .finish()
    }
}

#[inline]
pub(crate) fn is_direct_call(instr: &Instruction) -> bool {
    matches!(instr.code(), Code::Call_rel32_32 | Code::Call_rel32_64)
}
