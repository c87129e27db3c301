use core::fmt;

use crate::ir::{Block, Function, Inst, SourceSpan};

/// [ProgramPoint] represents a specific location in the execution of a program.
///
/// A sequence of program points can be combined into a control flow graph. A point either sits
/// between two instructions of a block (including the block start and the block end), or refers
/// to a detached instruction, i.e. one with no parent block; the top-level root operation is the
/// common case of the latter.
///
/// Program points are small copyable values with structural equality, so two points constructed
/// from the same location are interchangeable keys: no uniquing step is required to compare them
/// or to use them in the solver's state maps. Positions within a block are stable because blocks
/// are append-only (see the [ir](crate::ir) module docs), and the point "after" an instruction is
/// by construction the same point as "before" its successor instruction.
#[derive(Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ProgramPoint {
    /// The null program point; the default, and never a valid key
    #[default]
    Invalid,
    /// The point just before the instruction at `index` in `block`.
    ///
    /// `index` may be one past the last instruction, which is the block end.
    Block { block: Block, index: u32 },
    /// The point at a detached instruction
    At(Inst),
}

impl ProgramPoint {
    /// Get the program point just before `inst`
    pub fn before(function: &Function, inst: Inst) -> Self {
        match function.inst_block(inst) {
            Some(block) => Self::Block {
                block,
                index: function.inst_position(inst).unwrap(),
            },
            None => Self::At(inst),
        }
    }

    /// Get the program point just after `inst`
    pub fn after(function: &Function, inst: Inst) -> Self {
        match function.inst_block(inst) {
            Some(block) => Self::Block {
                block,
                index: function.inst_position(inst).unwrap() + 1,
            },
            None => Self::At(inst),
        }
    }

    /// Get the program point at the start of `block`
    pub fn at_start_of(block: Block) -> Self {
        Self::Block { block, index: 0 }
    }

    /// Get the program point at the end of `block`, i.e. past its last instruction
    pub fn at_end_of(function: &Function, block: Block) -> Self {
        Self::Block {
            block,
            index: function.num_insts(block) as u32,
        }
    }

    /// Returns true if this program point is at the start of its containing block.
    ///
    /// Always false for detached instructions and the invalid point.
    pub fn is_block_start(&self) -> bool {
        matches!(self, Self::Block { index: 0, .. })
    }

    /// Returns true if this program point is at the end of its containing block.
    ///
    /// Always false for detached instructions and the invalid point.
    pub fn is_block_end(&self, function: &Function) -> bool {
        match self {
            Self::Block { block, index } => *index as usize == function.num_insts(*block),
            Self::At(_) | Self::Invalid => false,
        }
    }

    /// Get the block containing this program point, if any
    pub fn block(&self) -> Option<Block> {
        match self {
            Self::Block { block, .. } => Some(*block),
            Self::At(_) | Self::Invalid => None,
        }
    }

    /// Get the detached instruction this program point refers to, if any
    pub fn inst(&self) -> Option<Inst> {
        match self {
            Self::At(inst) => Some(*inst),
            Self::Block { .. } | Self::Invalid => None,
        }
    }

    /// Get the instruction immediately after this program point.
    ///
    /// For a detached instruction, both the next and the previous instruction are the instruction
    /// itself, matching the framework's treatment of such points as zero-width.
    ///
    /// # Panics
    ///
    /// Panics if called on the invalid point, or at the end of a block.
    pub fn next_inst(&self, function: &Function) -> Inst {
        match self {
            Self::Invalid => panic!("cannot navigate from the invalid program point"),
            Self::At(inst) => *inst,
            Self::Block { block, index } => {
                assert!(
                    !self.is_block_end(function),
                    "no instruction after the end of {block}"
                );
                function.block_insts(*block)[*index as usize]
            }
        }
    }

    /// Get the instruction immediately before this program point.
    ///
    /// # Panics
    ///
    /// Panics if called on the invalid point, or at the start of a block.
    pub fn prev_inst(&self, function: &Function) -> Inst {
        match self {
            Self::Invalid => panic!("cannot navigate from the invalid program point"),
            Self::At(inst) => *inst,
            Self::Block { block, index } => {
                assert!(
                    !self.is_block_start(),
                    "no instruction before the start of {block}"
                );
                function.block_insts(*block)[*index as usize - 1]
            }
        }
    }

    /// Get a source span for this program point, for use in diagnostics.
    ///
    /// The span of a point between instructions is the span of the following instruction, falling
    /// back to the preceding one at the block end, and to the block's own span if it is empty.
    pub fn span(&self, function: &Function) -> SourceSpan {
        match self {
            Self::Invalid => SourceSpan::UNKNOWN,
            Self::At(inst) => function.inst_span(*inst),
            Self::Block { block, index } => {
                let insts = function.block_insts(*block);
                match insts.get(*index as usize).or_else(|| insts.last()) {
                    Some(&inst) => function.inst_span(inst),
                    None => function.block_span(*block),
                }
            }
        }
    }
}

impl fmt::Display for ProgramPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid => f.write_str("<invalid>"),
            Self::At(inst) => write!(f, "at({inst})"),
            Self::Block { block, index: 0 } => write!(f, "start({block})"),
            Self::Block { block, index } => write!(f, "{block}@{index}"),
        }
    }
}

impl fmt::Debug for ProgramPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn two_inst_block() -> (Function, Block, Inst, Inst) {
        let span = SourceSpan::UNKNOWN;
        let mut function = Function::new("test");
        let block = function.create_block(span);
        let a = function.append_inst(block, "a", &[], 0, span);
        let b = function.append_inst(block, "b", &[], 0, span);
        (function, block, a, b)
    }

    #[test]
    fn before_and_after_are_shared_between_neighbors() {
        let (function, block, a, b) = two_inst_block();
        assert_eq!(ProgramPoint::before(&function, a), ProgramPoint::at_start_of(block));
        assert_eq!(ProgramPoint::after(&function, a), ProgramPoint::before(&function, b));
        assert_eq!(ProgramPoint::after(&function, b), ProgramPoint::at_end_of(&function, block));
    }

    #[test]
    fn navigation() {
        let (function, block, a, b) = two_inst_block();
        let start = ProgramPoint::at_start_of(block);
        let end = ProgramPoint::at_end_of(&function, block);
        assert!(start.is_block_start());
        assert!(!start.is_block_end(&function));
        assert!(end.is_block_end(&function));
        assert!(!end.is_block_start());
        assert_eq!(start.next_inst(&function), a);
        assert_eq!(end.prev_inst(&function), b);
        assert_eq!(ProgramPoint::after(&function, a).next_inst(&function), b);
        assert_eq!(ProgramPoint::before(&function, b).prev_inst(&function), a);
    }

    #[test]
    fn detached_points_are_zero_width() {
        let mut function = Function::new("test");
        let inst = function.create_inst("nop", &[], 0, SourceSpan::UNKNOWN);
        let point = ProgramPoint::before(&function, inst);
        assert_eq!(point, ProgramPoint::after(&function, inst));
        assert!(!point.is_block_start());
        assert!(!point.is_block_end(&function));
        assert_eq!(point.next_inst(&function), inst);
        assert_eq!(point.prev_inst(&function), inst);
    }

    #[test]
    #[should_panic(expected = "no instruction after the end of")]
    fn next_inst_at_block_end_is_a_usage_error() {
        let (function, block, _, _) = two_inst_block();
        let _ = ProgramPoint::at_end_of(&function, block).next_inst(&function);
    }

    #[test]
    #[should_panic(expected = "no instruction before the start of")]
    fn prev_inst_at_block_start_is_a_usage_error() {
        let (function, block, _, _) = two_inst_block();
        let _ = ProgramPoint::at_start_of(block).prev_inst(&function);
    }
}
