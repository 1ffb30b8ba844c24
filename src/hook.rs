//! Absolute jump hooks written over the start of a located subroutine.

use std::ops::Range;

use iced_x86::{BlockEncoder, BlockEncoderOptions, Code, Instruction, InstructionBlock, Register};

use crate::error::{Error, Result};
use crate::signature::SignatureMatch;
use crate::variant::Bitness;

/// Machine code written over the start of every target of one bitness.
///
/// The handler address is left zeroed; whoever applies the hook copies the real pointer
/// into [`HookStub::address_field`] first.
#[derive(Debug, Clone)]
pub struct HookStub {
    pub bitness: Bitness,
    pub instructions: Vec<Instruction>,
    /// Encoding of each entry of `instructions`.
    pub machine_code: Vec<Vec<u8>>,
}

impl HookStub {
    /// Assembles the jump sequence padded with `NOP`s to exactly `size` bytes.
    ///
    /// Fails if the jump sequence alone is larger than `size`.
    pub fn assemble(bitness: Bitness, size: usize) -> Result<Self> {
        let mut instructions = jump_sequence(bitness)?;
        let jump_size = encoded_size(bitness, &instructions)?;
        if jump_size > size {
            return Err(Error::Precondition(format!(
                "{bitness} hook needs {jump_size} bytes, only {size} available"
            )));
        }

        // Pad to a whole instruction boundary of the overwritten code, so the patched
        // function still disassembles cleanly
        instructions.extend((jump_size..size).map(|_| Instruction::with(Code::Nopd)));

        let machine_code = encode_each(bitness, &instructions)?;
        Ok(Self {
            bitness,
            instructions,
            machine_code,
        })
    }

    /// Total encoded size in bytes.
    pub fn size(&self) -> usize {
        self.machine_code.iter().map(Vec::len).sum()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.machine_code.concat()
    }

    /// Byte range of the handler address placeholder.
    pub fn address_field(&self) -> Range<usize> {
        address_field(self.bitness)
    }

    /// C statement storing the `handler` parameter into a `code` array holding this stub.
    pub fn handler_copy_statement(&self) -> String {
        let field = self.address_field();
        format!("std::memcpy(&code[{}], &handler, {});", field.start, field.len())
    }

    /// Stub bytes with `handler` stored in the address placeholder.
    pub fn with_handler(&self, handler: u64) -> Vec<u8> {
        let mut bytes = self.bytes();
        let field = self.address_field();
        let len = field.len();
        bytes[field].copy_from_slice(&handler.to_le_bytes()[..len]);
        bytes
    }
}

/// `MOV reg, 0` followed by `JMP reg`, the shortest absolute jump not needing memory.
pub fn jump_sequence(bitness: Bitness) -> Result<Vec<Instruction>> {
    Ok(match bitness {
        Bitness::X64 => vec![
            Instruction::with2(Code::Mov_r64_imm64, Register::RAX, 0u64)?,
            Instruction::with1(Code::Jmp_rm64, Register::RAX)?,
        ],
        Bitness::X86 => vec![
            Instruction::with2(Code::Mov_r32_imm32, Register::EAX, 0u32)?,
            Instruction::with1(Code::Jmp_rm32, Register::EAX)?,
        ],
    })
}

/// Location of the immediate of the `MOV` in [`jump_sequence`].
pub fn address_field(bitness: Bitness) -> Range<usize> {
    match bitness {
        // REX.W B8+r imm64
        Bitness::X64 => 2..10,
        // B8+r imm32
        Bitness::X86 => 1..5,
    }
}

/// Number of bytes the hook will overwrite in each of `targets` of the given bitness.
///
/// This is the length of the fewest whole leading instructions covering `required` bytes.
/// All targets must agree on it: a hook that consumed a different amount of code per build
/// could not be shared. Returns `None` when no target has this bitness.
pub fn ideal_size(
    signature: &'static str,
    bitness: Bitness,
    required: usize,
    targets: &[SignatureMatch],
) -> Result<Option<usize>> {
    let mut ideal: Option<(usize, u32)> = None;

    for target in targets.iter().filter(|t| t.variant.bitness == bitness) {
        let size = target.cover(required).ok_or(Error::SubroutineTooSmall {
            signature,
            variant: target.variant,
            rva: target.rva,
            size: target.byte_len(),
            required,
        })?;

        match ideal {
            None => ideal = Some((size, target.variant.build)),
            Some((expected, expected_build)) if expected != size => {
                return Err(Error::InconsistentTargetSize {
                    signature,
                    bitness,
                    variant: target.variant,
                    size,
                    expected,
                    expected_build,
                })
            }
            Some(_) => {}
        }
    }

    Ok(ideal.map(|(size, _)| size))
}

/// Builds the hook stub for every target of `bitness` in `targets`.
///
/// Without any target of that bitness the stub is the bare jump sequence.
pub fn assemble(
    signature: &'static str,
    bitness: Bitness,
    targets: &[SignatureMatch],
) -> Result<HookStub> {
    let required = encoded_size(bitness, &jump_sequence(bitness)?)?;
    let size = ideal_size(signature, bitness, required, targets)?.unwrap_or(required);

    log::debug!("{signature}: {bitness} hook is {size} bytes ({required} required)");
    HookStub::assemble(bitness, size)
}

fn encoded_size(bitness: Bitness, instructions: &[Instruction]) -> Result<usize> {
    Ok(encode_each(bitness, instructions)?.iter().map(Vec::len).sum())
}

fn encode_each(bitness: Bitness, instructions: &[Instruction]) -> Result<Vec<Vec<u8>>> {
    let encoded = BlockEncoder::encode(
        bitness.bits(),
        InstructionBlock::new(instructions, 0),
        BlockEncoderOptions::RETURN_NEW_INSTRUCTION_OFFSETS,
    )?;

    let offsets = &encoded.new_instruction_offsets;
    Ok(offsets
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = offsets
                .get(i + 1)
                .map_or(encoded.code_buffer.len(), |&o| o as usize);
            encoded.code_buffer[start as usize..end].to_vec()
        })
        .collect())
}
