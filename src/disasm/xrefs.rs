use iced_x86::{Instruction, OpKind};
use indexmap::IndexMap;

// Insertion order follows instruction order, so iterating the index reproduces the
// disassembly order of the first reference to each address
type FxIndexMap<K, V> = IndexMap<K, V, fxhash::FxBuildHasher>;

/// Maps image-relative addresses to the instructions whose operand resolves to them.
///
/// Both memory operands (absolute or RIP-relative) and near branch targets count as
/// references. Anything outside the image is ignored.
#[derive(Debug, Default, Clone)]
pub struct XrefIndex {
    rvas: FxIndexMap<u64, Vec<usize>>,
    count: usize,
}

impl XrefIndex {
    pub fn build(instructions: &[Instruction], image_base: u64, image_size: u64) -> Self {
        let mut index = Self::default();
        let image_end = image_base + image_size;

        for (i, instr) in instructions.iter().enumerate() {
            let Some(address) = referenced_address(instr) else {
                continue;
            };
            if (image_base..image_end).contains(&address) {
                index.rvas.entry(address - image_base).or_default().push(i);
                index.count += 1;
            }
        }
        index
    }

    /// Indices of the instructions referencing `rva`, in ascending order.
    pub fn referrers(&self, rva: u64) -> &[usize] {
        self.rvas.get(&rva).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of distinct referenced addresses.
    pub fn len(&self) -> usize {
        self.rvas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rvas.is_empty()
    }

    /// Total number of recorded references.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &[usize])> {
        self.rvas.iter().map(|(&rva, refs)| (rva, refs.as_slice()))
    }
}

/// Absolute address named by the instruction's memory operand or near branch, if any.
fn referenced_address(instr: &Instruction) -> Option<u64> {
    (0..instr.op_count()).find_map(|op| match instr.op_kind(op) {
        OpKind::NearBranch16 | OpKind::NearBranch32 | OpKind::NearBranch64 => {
            Some(instr.near_branch_target())
        }
        OpKind::Memory => Some(instr.memory_displacement64()),
        _ => None,
    })
}
