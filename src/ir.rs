//! A minimal, arena-based IR collaborator for the data-flow framework.
//!
//! The solver itself is generic over "where facts attach": program points, SSA values, and custom
//! anchors. All it requires of the IR is a stable control-flow graph: iteration over the
//! instructions of a block, predecessor/successor navigation between blocks, source locations for
//! diagnostics, and a top-level root to seed initialization from. This module provides exactly
//! that surface and nothing more; in particular there is no rewriting and no verification.
//!
//! Entities are allocated out of [PrimaryMap] arenas and referenced by copyable handles, so blocks
//! and instructions are never moved or freed while a [Function] is alive. Blocks are append-only:
//! an instruction's position within its block is assigned when it is appended and never changes,
//! which is what makes program points stable keys for analysis state.

use core::fmt;

use cranelift_entity::{entity_impl, PrimaryMap};
use smallvec::SmallVec;

/// A handle to a basic block in a [Function]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Block(u32);
entity_impl!(Block, "block");

/// A handle to an instruction in a [Function]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Inst(u32);
entity_impl!(Inst, "inst");

/// A handle to an SSA value in a [Function]
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Value(u32);
entity_impl!(Value, "v");

/// A half-open byte range into the original source of a [Function], used for diagnostics.
///
/// The default span is [SourceSpan::UNKNOWN], which is rendered as `<unknown>`.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    start: u32,
    end: u32,
}

impl SourceSpan {
    /// The span used when no source information is available
    pub const UNKNOWN: Self = Self { start: 0, end: 0 };

    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end, "invalid source span: {start}..{end}");
        Self { start, end }
    }

    #[inline]
    pub const fn start(&self) -> u32 {
        self.start
    }

    #[inline]
    pub const fn end(&self) -> u32 {
        self.end
    }

    #[inline]
    pub const fn is_unknown(&self) -> bool {
        self.start == 0 && self.end == 0
    }
}

impl fmt::Debug for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_unknown() {
            f.write_str("<unknown>")
        } else {
            write!(f, "{}..{}", self.start, self.end)
        }
    }
}

/// Describes how a [Value] is introduced into a [Function]
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ValueDef {
    /// The value is the `index`th result of an instruction
    Result(Inst, u32),
    /// The value is the `index`th parameter of a block
    Param(Block, u32),
}

struct InstData {
    opcode: &'static str,
    block: Option<Block>,
    /// Position within the containing block, assigned on append
    position: u32,
    operands: SmallVec<[Value; 2]>,
    results: SmallVec<[Value; 1]>,
    successors: SmallVec<[Block; 2]>,
    span: SourceSpan,
}

#[derive(Default)]
struct BlockData {
    params: SmallVec<[Value; 2]>,
    insts: Vec<Inst>,
    preds: SmallVec<[Block; 2]>,
    span: SourceSpan,
}

struct ValueData {
    def: ValueDef,
    span: SourceSpan,
}

/// The top-level root operation: a function body consisting of basic blocks.
///
/// The first block created is the entry block. See the module docs for the construction and
/// stability rules.
pub struct Function {
    name: String,
    span: SourceSpan,
    blocks: PrimaryMap<Block, BlockData>,
    insts: PrimaryMap<Inst, InstData>,
    values: PrimaryMap<Value, ValueData>,
    entry: Option<Block>,
}

impl Function {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            span: SourceSpan::UNKNOWN,
            blocks: PrimaryMap::new(),
            insts: PrimaryMap::new(),
            values: PrimaryMap::new(),
            entry: None,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn span(&self) -> SourceSpan {
        self.span
    }

    pub fn set_span(&mut self, span: SourceSpan) {
        self.span = span;
    }

    /// Create a new, empty block.
    ///
    /// The first block created becomes the entry block of the function.
    pub fn create_block(&mut self, span: SourceSpan) -> Block {
        let block = self.blocks.push(BlockData {
            span,
            ..Default::default()
        });
        if self.entry.is_none() {
            self.entry = Some(block);
        }
        block
    }

    /// Get the entry block of this function.
    ///
    /// # Panics
    ///
    /// Panics if no blocks have been created yet.
    pub fn entry_block(&self) -> Block {
        self.entry.expect("function has no entry block")
    }

    /// Append a new parameter value to `block`
    pub fn append_block_param(&mut self, block: Block, span: SourceSpan) -> Value {
        let index = self.blocks[block].params.len() as u32;
        let value = self.values.push(ValueData {
            def: ValueDef::Param(block, index),
            span,
        });
        self.blocks[block].params.push(value);
        value
    }

    /// Create a detached instruction, i.e. one with no parent block.
    ///
    /// Detached instructions can later be attached with [Function::append], or used as-is; the
    /// data-flow framework represents them with a dedicated program point form.
    pub fn create_inst(
        &mut self,
        opcode: &'static str,
        operands: &[Value],
        num_results: usize,
        span: SourceSpan,
    ) -> Inst {
        let inst = self.insts.push(InstData {
            opcode,
            block: None,
            position: 0,
            operands: SmallVec::from_slice(operands),
            results: SmallVec::new(),
            successors: SmallVec::new(),
            span,
        });
        for index in 0..num_results {
            let value = self.values.push(ValueData {
                def: ValueDef::Result(inst, index as u32),
                span,
            });
            self.insts[inst].results.push(value);
        }
        inst
    }

    /// Attach the detached instruction `inst` to the end of `block`.
    ///
    /// # Panics
    ///
    /// Panics if `inst` already has a parent block.
    pub fn append(&mut self, block: Block, inst: Inst) {
        assert!(
            self.insts[inst].block.is_none(),
            "cannot append {inst}: it already belongs to {}",
            self.insts[inst].block.unwrap()
        );
        let position = self.blocks[block].insts.len() as u32;
        self.insts[inst].block = Some(block);
        self.insts[inst].position = position;
        self.blocks[block].insts.push(inst);
    }

    /// Create an instruction and append it to `block` in one step
    pub fn append_inst(
        &mut self,
        block: Block,
        opcode: &'static str,
        operands: &[Value],
        num_results: usize,
        span: SourceSpan,
    ) -> Inst {
        let inst = self.create_inst(opcode, operands, num_results, span);
        self.append(block, inst);
        inst
    }

    /// Create a terminator instruction at the end of `block` transferring control to `successors`.
    ///
    /// Predecessor lists of the successor blocks are updated eagerly.
    pub fn append_branch(
        &mut self,
        block: Block,
        opcode: &'static str,
        operands: &[Value],
        successors: &[Block],
        span: SourceSpan,
    ) -> Inst {
        let inst = self.append_inst(block, opcode, operands, 0, span);
        self.insts[inst].successors = SmallVec::from_slice(successors);
        for &succ in successors {
            if !self.blocks[succ].preds.contains(&block) {
                self.blocks[succ].preds.push(block);
            }
        }
        inst
    }

    /// Get the block containing `inst`, or `None` if it is detached
    #[inline]
    pub fn inst_block(&self, inst: Inst) -> Option<Block> {
        self.insts[inst].block
    }

    /// Get the position of `inst` within its containing block, or `None` if it is detached
    pub fn inst_position(&self, inst: Inst) -> Option<u32> {
        self.insts[inst].block.map(|_| self.insts[inst].position)
    }

    /// Get the instructions of `block`, in program order
    #[inline]
    pub fn block_insts(&self, block: Block) -> &[Inst] {
        &self.blocks[block].insts
    }

    /// Get the number of instructions in `block`
    #[inline]
    pub fn num_insts(&self, block: Block) -> usize {
        self.blocks[block].insts.len()
    }

    #[inline]
    pub fn block_params(&self, block: Block) -> &[Value] {
        &self.blocks[block].params
    }

    /// Get the control-flow successors of `block`, i.e. the successors of its terminator
    pub fn succs(&self, block: Block) -> &[Block] {
        match self.blocks[block].insts.last() {
            Some(&inst) => &self.insts[inst].successors,
            None => &[],
        }
    }

    /// Get the control-flow predecessors of `block`
    #[inline]
    pub fn preds(&self, block: Block) -> &[Block] {
        &self.blocks[block].preds
    }

    /// Iterate over all blocks of this function, in creation order
    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        self.blocks.keys()
    }

    #[inline]
    pub fn opcode(&self, inst: Inst) -> &'static str {
        self.insts[inst].opcode
    }

    #[inline]
    pub fn operands(&self, inst: Inst) -> &[Value] {
        &self.insts[inst].operands
    }

    #[inline]
    pub fn results(&self, inst: Inst) -> &[Value] {
        &self.insts[inst].results
    }

    #[inline]
    pub fn inst_span(&self, inst: Inst) -> SourceSpan {
        self.insts[inst].span
    }

    #[inline]
    pub fn block_span(&self, block: Block) -> SourceSpan {
        self.blocks[block].span
    }

    #[inline]
    pub fn value_span(&self, value: Value) -> SourceSpan {
        self.values[value].span
    }

    #[inline]
    pub fn value_def(&self, value: Value) -> ValueDef {
        self.values[value].def
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}", &self.name)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "function {} {{", &self.name)?;
        for block in self.blocks.keys() {
            write!(f, "{block}(")?;
            for (i, param) in self.blocks[block].params.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{param}")?;
            }
            writeln!(f, "):")?;
            for &inst in self.blocks[block].insts.iter() {
                let data = &self.insts[inst];
                f.write_str("  ")?;
                for (i, result) in data.results.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{result}")?;
                }
                if !data.results.is_empty() {
                    f.write_str(" = ")?;
                }
                write!(f, "{}", data.opcode)?;
                for operand in data.operands.iter() {
                    write!(f, " {operand}")?;
                }
                for succ in data.successors.iter() {
                    write!(f, " {succ}")?;
                }
                writeln!(f)?;
            }
        }
        f.write_str("}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn cfg_navigation() {
        let span = SourceSpan::UNKNOWN;
        let mut function = Function::new("test");
        let entry = function.create_block(span);
        let mid = function.create_block(span);
        let exit = function.create_block(span);
        assert_eq!(function.entry_block(), entry);

        let v0 = function.append_block_param(entry, span);
        let inst = function.append_inst(entry, "copy", &[v0], 1, span);
        function.append_branch(entry, "br", &[], &[mid], span);
        function.append_branch(mid, "br", &[], &[exit], span);
        let result = function.results(inst)[0];
        function.append_branch(exit, "ret", &[result], &[], span);

        assert_eq!(function.succs(entry), &[mid]);
        assert_eq!(function.succs(mid), &[exit]);
        assert_eq!(function.succs(exit), &[]);
        assert_eq!(function.preds(entry), &[]);
        assert_eq!(function.preds(mid), &[entry]);
        assert_eq!(function.preds(exit), &[mid]);

        assert_eq!(function.inst_block(inst), Some(entry));
        assert_eq!(function.inst_position(inst), Some(0));
        assert_eq!(function.num_insts(entry), 2);
        assert_eq!(function.value_def(v0), ValueDef::Param(entry, 0));
        assert_eq!(function.value_def(result), ValueDef::Result(inst, 0));
    }

    #[test]
    fn detached_instructions() {
        let mut function = Function::new("test");
        let block = function.create_block(SourceSpan::UNKNOWN);
        let inst = function.create_inst("nop", &[], 0, SourceSpan::UNKNOWN);
        assert_eq!(function.inst_block(inst), None);
        assert_eq!(function.inst_position(inst), None);

        function.append(block, inst);
        assert_eq!(function.inst_block(inst), Some(block));
        assert_eq!(function.inst_position(inst), Some(0));
    }
}
