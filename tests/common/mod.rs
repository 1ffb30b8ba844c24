//! Synthetic variants assembled from hand-written instruction lists.
//!
//! Every instruction pushed to an [`Asm`] gets a unique label as its IP, and branches name
//! their target by label. [`BlockEncoder`] then resolves the labels to real addresses when
//! the code is placed in the image.

#![allow(dead_code)]

use iced_x86::{
    BlockEncoder, BlockEncoderOptions, Code, Instruction, InstructionBlock, MemoryOperand, Register,
};
use memory_patch_gen::disasm::{BinaryVariant, CodeSection};
use memory_patch_gen::{Bitness, Subsystem, VariantId};
use simplelog::*;

pub const IMAGE_BASE_64: u64 = 0x1_8000_0000;
pub const IMAGE_BASE_32: u64 = 0x1000_0000;
pub const TEXT_RVA: u64 = 0x1000;
pub const IMAGE_SIZE: u64 = 0x10_0000;

pub fn init_logger() {
    let _ = TermLogger::init(
        LevelFilter::Trace,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    );
}

pub fn image_base(bitness: Bitness) -> u64 {
    match bitness {
        Bitness::X64 => IMAGE_BASE_64,
        Bitness::X86 => IMAGE_BASE_32,
    }
}

#[derive(Default)]
pub struct Asm {
    instructions: Vec<Instruction>,
}

impl Asm {
    /// Label the next pushed instruction will get.
    pub fn next_label(&self) -> u64 {
        self.instructions.len() as u64 + 1
    }

    pub fn push(&mut self, mut instr: Instruction) -> u64 {
        let label = self.next_label();
        instr.set_ip(label);
        self.instructions.push(instr);
        label
    }

    pub fn int3(&mut self, count: usize) {
        for _ in 0..count {
            self.push(Instruction::with(Code::Int3));
        }
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn assemble(&self, bitness: Bitness, address: u64) -> Vec<u8> {
        BlockEncoder::encode(
            bitness.bits(),
            InstructionBlock::new(&self.instructions, address),
            BlockEncoderOptions::NONE,
        )
        .unwrap()
        .code_buffer
    }

    pub fn variant(&self, id: VariantId) -> BinaryVariant {
        let image_base = image_base(id.bitness);
        let address = image_base + TEXT_RVA;
        let bytes = self.assemble(id.bitness, address);
        BinaryVariant::decode(
            id,
            CodeSection {
                image_base,
                image_size: IMAGE_SIZE,
                address,
                bytes: &bytes,
            },
        )
        .unwrap()
    }
}

pub fn id(subsystem: Subsystem, build: u32, bitness: Bitness) -> VariantId {
    VariantId::new(subsystem, build, bitness)
}

/// `[base+displ]`, with the displacement stored in as few bytes as the decoder would use.
///
/// iced wants the displacement size of a 32-bit displacement to match the address size,
/// which is 8 for 64-bit bases.
pub fn rm(base: Register, displ: i64) -> MemoryOperand {
    let displ_size = match i8::try_from(displ) {
        Ok(_) => 1,
        Err(_) if base.is_gpr64() => 8,
        Err(_) => 4,
    };
    MemoryOperand::new(base, Register::None, 1, displ, displ_size, false, Register::None)
}

/// `XOR eax, eax; RET`, meant to be called. Returns its label.
pub fn helper(asm: &mut Asm) -> u64 {
    let label =
        asm.push(Instruction::with2(Code::Xor_r32_rm32, Register::EAX, Register::EAX).unwrap());
    asm.push(Instruction::with(Code::Retnq));
    label
}

pub fn helper_32(asm: &mut Asm) -> u64 {
    let label =
        asm.push(Instruction::with2(Code::Xor_r32_rm32, Register::EAX, Register::EAX).unwrap());
    asm.push(Instruction::with(Code::Retnd));
    label
}

fn filler_64(asm: &mut Asm, count: usize) {
    for _ in 0..count {
        asm.push(Instruction::with2(Code::Mov_r64_rm64, Register::RCX, Register::RAX).unwrap());
    }
}

fn filler_32(asm: &mut Asm, count: usize) {
    for _ in 0..count {
        asm.push(Instruction::with2(Code::Mov_r32_rm32, Register::ECX, Register::EDX).unwrap());
    }
}

/// A 16 instruction 64-bit `GameWarning`. `spill` is the stack offset of the first argument
/// spill; anything above 0x7F changes the size of the leading instructions.
///
/// Returns the label of the first instruction.
pub fn game_warning_64(asm: &mut Asm, callee: u64, spill: i64) -> u64 {
    let start = asm.next_label();
    let ret = start + 15;

    asm.push(Instruction::with2(Code::Test_rm64_r64, Register::RCX, Register::RCX).unwrap());
    asm.push(Instruction::with_branch(Code::Je_rel8_64, ret).unwrap());
    for (i, reg) in [Register::RCX, Register::RDX, Register::R8, Register::R9]
        .into_iter()
        .enumerate()
    {
        let slot = rm(Register::RSP, spill + 8 * i as i64);
        asm.push(Instruction::with2(Code::Mov_rm64_r64, slot, reg).unwrap());
    }
    asm.push(Instruction::with2(Code::Mov_r32_imm32, Register::EAX, 0x1038u32).unwrap());
    asm.push(Instruction::with_branch(Code::Call_rel32_64, callee).unwrap());
    asm.push(Instruction::with2(Code::Sub_r64_rm64, Register::RSP, Register::RAX).unwrap());
    filler_64(asm, 6);
    let last = asm.push(Instruction::with(Code::Retnq));
    assert_eq!(last, ret);
    start
}

/// A 14 instruction 32-bit `GameWarning`. Returns the label of the first instruction.
pub fn game_warning_32(asm: &mut Asm, callee: u64) -> u64 {
    let start = asm.next_label();
    let epilogue = start + 12;

    asm.push(Instruction::with2(Code::Mov_r32_imm32, Register::EAX, 0x1000u32).unwrap());
    asm.push(Instruction::with_branch(Code::Call_rel32_32, callee).unwrap());
    asm.push(Instruction::with2(Code::Mov_r32_rm32, Register::EAX, rm(Register::EBX, 4)).unwrap());
    asm.push(Instruction::with2(Code::Test_rm32_r32, Register::EAX, Register::EAX).unwrap());
    asm.push(Instruction::with_branch(Code::Je_rel8_32, epilogue).unwrap());
    filler_32(asm, 7);
    let pop = asm.push(Instruction::with1(Code::Pop_r32, Register::ESI).unwrap());
    assert_eq!(pop, epilogue);
    asm.push(Instruction::with(Code::Retnd));
    start
}

/// A 32-bit `CryWarning`, optionally preceded by a two instruction prologue.
///
/// Returns the label of the first instruction.
pub fn cry_warning_32(asm: &mut Asm, callee: u64, prologue: bool) -> u64 {
    let start = asm.next_label();
    if prologue {
        asm.push(Instruction::with1(Code::Push_r32, Register::EBP).unwrap());
        asm.push(Instruction::with2(Code::Mov_r32_rm32, Register::EBP, Register::ESP).unwrap());
    }
    let anchor = asm.next_label();
    let epilogue = anchor + 30;

    asm.push(Instruction::with2(Code::Mov_r32_imm32, Register::EAX, 0x1000u32).unwrap());
    asm.push(Instruction::with_branch(Code::Call_rel32_32, callee).unwrap());
    asm.push(Instruction::with2(Code::Mov_r32_rm32, Register::EAX, rm(Register::EBX, 8)).unwrap());
    asm.push(Instruction::with2(Code::Test_rm32_r32, Register::EAX, Register::EAX).unwrap());
    asm.push(Instruction::with_branch(Code::Je_rel8_32, epilogue).unwrap());
    asm.push(
        Instruction::with2(Code::Cmp_rm32_imm8, MemoryOperand::with_base(Register::EAX), 0u32)
            .unwrap(),
    );
    asm.push(Instruction::with_branch(Code::Je_rel8_32, epilogue).unwrap());
    filler_32(asm, 23);
    let pop = asm.push(Instruction::with1(Code::Pop_r32, Register::ESI).unwrap());
    assert_eq!(pop, epilogue);
    asm.push(Instruction::with(Code::Retnd));
    start
}

/// Decoys: contain the 64-bit `GameWarning` anchor but nothing else of it.
pub fn decoy_64(asm: &mut Asm) {
    asm.push(Instruction::with2(Code::Test_rm64_r64, Register::RCX, Register::RCX).unwrap());
    asm.push(Instruction::with(Code::Retnq));
}

/// `helper`, then one 64-bit `GameWarning` and a decoy, padded with `INT3`.
///
/// `lead` extra helper calls shift the target without changing its code.
pub fn game_warning_image_64(spill: i64, lead: usize) -> Asm {
    let mut asm = Asm::default();
    let callee = helper(&mut asm);
    asm.int3(4);
    for _ in 0..lead {
        asm.push(Instruction::with_branch(Code::Call_rel32_64, callee).unwrap());
        asm.push(Instruction::with(Code::Retnq));
        asm.int3(2);
    }
    game_warning_64(&mut asm, callee, spill);
    asm.int3(4);
    decoy_64(&mut asm);
    asm.int3(4);
    asm
}

pub fn game_warning_image_32() -> Asm {
    let mut asm = Asm::default();
    let callee = helper_32(&mut asm);
    asm.int3(4);
    game_warning_32(&mut asm, callee);
    asm.int3(4);
    asm
}

/// Size of the `.text` section's raw data in [`pe_image`], larger than any code put in it.
pub const PE_TEXT_RAW_SIZE: usize = 0x200;
pub const PE_IMAGE_SIZE: u64 = 0x3000;

const PE_RSRC_RVA: u32 = 0x2000;
const PE_TEXT_OFFSET: usize = 0x200;
const PE_RSRC_OFFSET: usize = 0x400;

fn put_u16(buf: &mut [u8], at: usize, value: u16) {
    buf[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(buf: &mut [u8], at: usize, value: u32) {
    buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u64(buf: &mut [u8], at: usize, value: u64) {
    buf[at..at + 8].copy_from_slice(&value.to_le_bytes());
}

/// A minimal PE file of the given bitness holding `code` in its `.text` section.
///
/// The raw data of `.text` is padded with `INT3` past `code` up to the file alignment, as
/// linkers do. With `build`, a `.rsrc` section carries a version resource whose product
/// version has that build number.
pub fn pe_image(bitness: Bitness, code: &[u8], build: Option<u16>) -> Vec<u8> {
    assert!(code.len() <= PE_TEXT_RAW_SIZE);
    let mut pe = vec![0u8; 0x600];

    // DOS header
    put_u16(&mut pe, 0, 0x5A4D);
    put_u32(&mut pe, 0x3C, 0x40);

    // NT headers
    put_u32(&mut pe, 0x40, 0x0000_4550);
    let (machine, magic, optional_size, data_directory) = match bitness {
        Bitness::X64 => (0x8664, 0x20B, 112, 112),
        Bitness::X86 => (0x14C, 0x10B, 96, 96),
    };
    let optional_size = optional_size + 16 * 8;
    put_u16(&mut pe, 0x44, machine);
    put_u16(&mut pe, 0x46, 2);
    put_u16(&mut pe, 0x54, optional_size as u16);
    put_u16(&mut pe, 0x56, 0x2022);

    let opt = 0x58;
    put_u16(&mut pe, opt, magic);
    put_u32(&mut pe, opt + 16, TEXT_RVA as u32);
    put_u32(&mut pe, opt + 20, TEXT_RVA as u32);
    match bitness {
        Bitness::X64 => put_u64(&mut pe, opt + 24, IMAGE_BASE_64),
        Bitness::X86 => put_u32(&mut pe, opt + 28, IMAGE_BASE_32 as u32),
    }
    put_u32(&mut pe, opt + 32, 0x1000);
    put_u32(&mut pe, opt + 36, 0x200);
    put_u32(&mut pe, opt + 56, PE_IMAGE_SIZE as u32);
    put_u32(&mut pe, opt + 60, PE_TEXT_OFFSET as u32);
    put_u32(&mut pe, opt + data_directory - 4, 16);

    // Section headers
    let text = opt + optional_size;
    pe[text..text + 5].copy_from_slice(b".text");
    put_u32(&mut pe, text + 8, code.len() as u32);
    put_u32(&mut pe, text + 12, TEXT_RVA as u32);
    put_u32(&mut pe, text + 16, PE_TEXT_RAW_SIZE as u32);
    put_u32(&mut pe, text + 20, PE_TEXT_OFFSET as u32);
    put_u32(&mut pe, text + 36, 0x6000_0020);

    pe[PE_TEXT_OFFSET..PE_TEXT_OFFSET + code.len()].copy_from_slice(code);
    pe[PE_TEXT_OFFSET + code.len()..PE_RSRC_OFFSET].fill(0xCC);

    if let Some(build) = build {
        let rsrc = version_resource(build);

        let header = text + 40;
        pe[header..header + 5].copy_from_slice(b".rsrc");
        put_u32(&mut pe, header + 8, rsrc.len() as u32);
        put_u32(&mut pe, header + 12, PE_RSRC_RVA);
        put_u32(&mut pe, header + 16, 0x200);
        put_u32(&mut pe, header + 20, PE_RSRC_OFFSET as u32);
        put_u32(&mut pe, header + 36, 0x4000_0040);

        // Resource table entry of the data directory
        let entry = opt + data_directory + 2 * 8;
        put_u32(&mut pe, entry, PE_RSRC_RVA);
        put_u32(&mut pe, entry + 4, rsrc.len() as u32);

        pe[PE_RSRC_OFFSET..PE_RSRC_OFFSET + rsrc.len()].copy_from_slice(&rsrc);
    } else {
        put_u16(&mut pe, 0x46, 1);
    }

    pe
}

/// A `.rsrc` section holding a single `RT_VERSION` resource, laid out for [`PE_RSRC_RVA`].
fn version_resource(build: u16) -> Vec<u8> {
    const SUBDIRECTORY: u32 = 0x8000_0000;
    let mut rsrc = vec![0u8; 0x58 + 92];

    // Type, name and language directories with one id entry each
    for (dir, id, target) in [
        (0x00, 16, SUBDIRECTORY | 0x18),
        (0x18, 1, SUBDIRECTORY | 0x30),
        (0x30, 0x409, 0x48),
    ] {
        put_u16(&mut rsrc, dir + 14, 1);
        put_u32(&mut rsrc, dir + 16, id);
        put_u32(&mut rsrc, dir + 20, target);
    }

    // Data entry pointing at the VS_VERSIONINFO right after it
    put_u32(&mut rsrc, 0x48, PE_RSRC_RVA + 0x58);
    put_u32(&mut rsrc, 0x4C, 92);

    let info = 0x58;
    put_u16(&mut rsrc, info, 92);
    put_u16(&mut rsrc, info + 2, 52);
    for (i, c) in "VS_VERSION_INFO".encode_utf16().enumerate() {
        put_u16(&mut rsrc, info + 6 + 2 * i, c);
    }

    // VS_FIXEDFILEINFO, aligned after the key
    let fixed = info + 40;
    put_u32(&mut rsrc, fixed, 0xFEEF_04BD);
    put_u32(&mut rsrc, fixed + 4, 0x0001_0000);
    put_u32(&mut rsrc, fixed + 8, 0x0001_0001);
    put_u16(&mut rsrc, fixed + 12, build);
    put_u32(&mut rsrc, fixed + 16, 0x0001_0001);
    put_u16(&mut rsrc, fixed + 20, build);

    rsrc
}
