use iced_x86::{Code, Instruction, Register};

use super::{Pattern, Position, Predicate, Signature};
use crate::error::Result;
use crate::variant::{Bitness, Subsystem};

/// `GameWarning(const char* format, ...)`, which forwards its format string unchecked.
#[derive(Debug, Default, Clone, Copy)]
pub struct HookGameWarning;

impl Signature for HookGameWarning {
    fn name(&self) -> &'static str {
        "HookGameWarning"
    }

    fn doc(&self) -> &'static str {
        "Used to fix the GameWarning format string vulnerability."
    }

    fn handler(&self) -> &'static str {
        "void (*handler)(const char* format, ...)"
    }

    fn subsystems(&self) -> &'static [Subsystem] {
        &[Subsystem::CryAction, Subsystem::CryGame]
    }

    fn pattern(&self, bitness: Bitness) -> Result<Pattern> {
        Ok(match bitness {
            // MOV eax, 0x1000
            // CALL __alloca
            // MOV eax, [...]
            // TEST eax, eax
            // JE epilogue
            Bitness::X86 => {
                Pattern::new(Instruction::with2(Code::Mov_r32_imm32, Register::EAX, 0x1000u32)?)
                    .min_len(14)
                    .expect_code(1, Code::Call_rel32_32)
                    .expect_code(2, Code::Mov_r32_rm32)
                    .expect(2, Predicate::Register { operand: 0, register: Register::EAX })
                    .expect_exact(
                        3,
                        Instruction::with2(Code::Test_rm32_r32, Register::EAX, Register::EAX)?,
                    )
                    .expect_code(4, Code::Je_rel8_32)
                    .expect(4, Predicate::BranchTarget(Position::End(2)))
            }
            // TEST rcx, rcx
            // JE ret
            // MOV [rsp+...], rcx / rdx / r8 / r9
            // MOV eax, imm32
            // CALL __chkstk
            Bitness::X64 => {
                let test_rcx =
                    Instruction::with2(Code::Test_rm64_r64, Register::RCX, Register::RCX)?;
                let mut pattern = Pattern::new(test_rcx)
                    .min_len(16)
                    .expect_code(1, Code::Je_rel8_64)
                    .expect(1, Predicate::BranchTarget(Position::End(1)));

                let spilled = [Register::RCX, Register::RDX, Register::R8, Register::R9];
                for (at, register) in (2..).zip(spilled) {
                    pattern = pattern
                        .expect_code(at, Code::Mov_rm64_r64)
                        .expect(at, Predicate::Register { operand: 1, register });
                }

                pattern
                    .expect_code(6, Code::Mov_r32_imm32)
                    .expect(6, Predicate::Register { operand: 0, register: Register::EAX })
                    .expect_code(7, Code::Call_rel32_64)
            }
        })
    }
}
