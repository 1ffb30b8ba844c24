use iced_x86::{Code, Instruction, MemoryOperand, Register};

use super::{Pattern, Position, Predicate, Signature};
use crate::builds::Game;
use crate::error::Result;
use crate::variant::{Bitness, Subsystem, VariantId};

/// `CryWarning(int module, int severity, const char* format, ...)`.
///
/// Each module links its own copy, so the same signature is located in every module that
/// logs through it.
#[derive(Debug, Default, Clone, Copy)]
pub struct HookCryWarning;

impl Signature for HookCryWarning {
    fn name(&self) -> &'static str {
        "HookCryWarning"
    }

    fn doc(&self) -> &'static str {
        "Used to fix the CryWarning format string vulnerability."
    }

    fn handler(&self) -> &'static str {
        "void (*handler)(int, int, const char* format, ...)"
    }

    fn subsystems(&self) -> &'static [Subsystem] {
        &[
            Subsystem::CryAction,
            Subsystem::CryGame,
            Subsystem::CryNetwork,
            Subsystem::CrySystem,
        ]
    }

    fn pattern(&self, bitness: Bitness) -> Result<Pattern> {
        Ok(match bitness {
            // Some builds save two registers before the stack check, so the anchor may
            // start at offset 2. Index 2 (the global the message buffer is read from)
            // varies too much to check.
            Bitness::X86 => {
                let test_eax =
                    Instruction::with2(Code::Test_rm32_r32, Register::EAX, Register::EAX)?;
                let cmp_null = Instruction::with2(
                    Code::Cmp_rm32_imm8,
                    MemoryOperand::with_base(Register::EAX),
                    0u32,
                )?;

                Pattern::new(Instruction::with2(Code::Mov_r32_imm32, Register::EAX, 0x1000u32)?)
                    .anchor_offsets(&[0, 2])
                    .min_len(30)
                    .expect_code(1, Code::Call_rel32_32)
                    .expect_exact(3, test_eax)
                    .expect_code(4, Code::Je_rel8_32)
                    .expect(4, Predicate::BranchTarget(Position::End(2)))
                    .expect_exact(5, cmp_null)
                    .expect_code(6, Code::Je_rel8_32)
                    .expect(6, Predicate::BranchTarget(Position::End(2)))
            }
            Bitness::X64 => {
                let spill = |displ: i64, register: Register| {
                    Instruction::with2(
                        Code::Mov_rm64_r64,
                        MemoryOperand::with_base_displ(Register::RSP, displ),
                        register,
                    )
                };

                let mov_size = Instruction::with2(Code::Mov_r32_imm32, Register::EAX, 0x1038u32)?;
                let sub_rsp = Instruction::with2(Code::Sub_r64_rm64, Register::RSP, Register::RAX)?;

                Pattern::new(spill(0x18, Register::R8)?)
                    .min_len(32)
                    .expect_exact(1, spill(0x20, Register::R9)?)
                    .expect_exact(2, Instruction::with1(Code::Push_r64, Register::RBX)?)
                    .expect_exact(3, Instruction::with1(Code::Push_r64, Register::RDI)?)
                    .expect_exact(4, mov_size)
                    .expect_code(5, Code::Call_rel32_64)
                    .expect_exact(6, sub_rsp)
            }
        })
    }

    fn exemption(&self, variant: &VariantId) -> Option<&'static str> {
        let warhead_network = variant.bitness == Bitness::X64
            && variant.subsystem == Subsystem::CryNetwork
            && Game::of_build(variant.build) == Some(Game::CrysisWarhead);

        warhead_network.then_some("// Crysis Warhead has no CryWarning in its CryNetwork")
    }
}
