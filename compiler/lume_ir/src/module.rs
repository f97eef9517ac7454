//! The IR arena: procs, blocks, instructions, pseudos, literals, symbols.
//!
//! One [`Module`] owns everything produced for one compilation: flat pools
//! indexed by the id types in [`crate::ids`], plus the string interner. The
//! graph is built once (see [`crate::builder`]) and treated as read-only
//! input by the back end.

use crate::{
    BlockId, ConstId, InsnId, Instruction, Literal, Name, ProcId, Pseudo, PseudoRange, StringInterner,
    SymbolId, TypeSet,
};

/// Monotonic register-number generator for one storage class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RegSeq {
    next_reg: u32,
}

impl RegSeq {
    /// Allocate the next register number.
    pub(crate) fn next(&mut self) -> u32 {
        let reg = self.next_reg;
        self.next_reg += 1;
        reg
    }

    /// Allocate `span` consecutive register numbers, returning the first.
    pub(crate) fn advance(&mut self, span: u32) -> u32 {
        let reg = self.next_reg;
        self.next_reg += span;
        reg
    }

    /// High-water mark: the count of registers allocated so far.
    pub(crate) fn count(self) -> u32 {
        self.next_reg
    }
}

/// Kind of a named variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Local,
    Upvalue,
}

/// A named variable with its static type annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub name: Name,
    pub ty: TypeSet,
    pub kind: SymbolKind,
}

/// Descriptor for one upvalue captured by a proc.
///
/// `in_parent_stack` tells the runtime whether the captured variable lives
/// in the parent's frame (`index` is a frame register) or is itself an
/// upvalue of the parent (`index` is into the parent's upvalue table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpvalDesc {
    pub name: Name,
    pub in_parent_stack: bool,
    pub index: u32,
    pub ty: TypeSet,
}

/// A basic block: a label, an owning proc and an ordered instruction list.
///
/// Labels are per-proc. Two labels are reserved: entry (0) and exit (1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub label: u32,
    pub proc: ProcId,
    pub insns: Vec<InsnId>,
}

impl BasicBlock {
    pub const ENTRY_LABEL: u32 = 0;
    pub const EXIT_LABEL: u32 = 1;

    /// An empty block outside the reserved labels is logically deleted
    /// and skipped during emission.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.insns.is_empty()
            && self.label != Self::ENTRY_LABEL
            && self.label != Self::EXIT_LABEL
    }
}

/// One compilation unit: a function body with its blocks, register
/// generators, string constants, upvalues and nested children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proc {
    pub id: ProcId,
    pub parent: Option<ProcId>,
    /// Blocks in emission order. `blocks[0]` is entry, `blocks[1]` is exit.
    pub blocks: Vec<BlockId>,
    pub children: Vec<ProcId>,
    /// String literals referenced by this proc, deduplicated; the position
    /// in this list is the constant-table slot in the emitted prototype.
    pub string_slots: Vec<ConstId>,
    pub upvals: Vec<UpvalDesc>,
    pub num_params: u32,
    pub(crate) locals: RegSeq,
    /// Tagged "any" temps, ranges and range-selects. The high-water mark
    /// sizes the frame's temp window.
    pub(crate) temps: RegSeq,
    /// Integer temps. Boolean temps draw from this generator too.
    pub(crate) int_temps: RegSeq,
    pub(crate) flt_temps: RegSeq,
}

impl Proc {
    /// Number of named local registers (`L`).
    #[must_use]
    pub fn num_locals(&self) -> u32 {
        self.locals.count()
    }

    /// Number of tagged temp registers (`T`) in the frame window.
    #[must_use]
    pub fn num_temps(&self) -> u32 {
        self.temps.count()
    }

    /// Number of native integer/boolean scratch variables.
    #[must_use]
    pub fn num_int_temps(&self) -> u32 {
        self.int_temps.count()
    }

    /// Number of native float scratch variables.
    #[must_use]
    pub fn num_flt_temps(&self) -> u32 {
        self.flt_temps.count()
    }

    /// Physical frame size: locals window plus tagged temp window.
    #[must_use]
    pub fn frame_size(&self) -> u32 {
        self.num_locals() + self.num_temps()
    }

    /// Constant-table slot assigned to a string literal, if this proc
    /// references it.
    #[must_use]
    pub fn string_slot(&self, id: ConstId) -> Option<u32> {
        self.string_slots
            .iter()
            .position(|&slot| slot == id)
            .and_then(|pos| u32::try_from(pos).ok())
    }
}

/// The IR arena for one compilation.
#[derive(Debug)]
pub struct Module {
    pub(crate) interner: StringInterner,
    pub(crate) procs: Vec<Proc>,
    pub(crate) blocks: Vec<BasicBlock>,
    pub(crate) insns: Vec<Instruction>,
    pub(crate) pseudo_pool: Vec<Pseudo>,
    pub(crate) literals: Vec<Literal>,
    pub(crate) symbols: Vec<Symbol>,
    pub(crate) root: ProcId,
}

impl Module {
    /// The root proc of the compilation.
    #[must_use]
    pub fn root(&self) -> ProcId {
        self.root
    }

    /// Total number of procs, root included.
    #[must_use]
    pub fn num_procs(&self) -> usize {
        self.procs.len()
    }

    #[must_use]
    pub fn proc(&self, id: ProcId) -> &Proc {
        &self.procs[id.index()]
    }

    #[must_use]
    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.index()]
    }

    #[must_use]
    pub fn insn(&self, id: InsnId) -> &Instruction {
        &self.insns[id.index()]
    }

    #[must_use]
    pub fn literal(&self, id: ConstId) -> Literal {
        self.literals[id.index()]
    }

    #[must_use]
    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    /// Resolve a pseudo list range into the pool.
    #[must_use]
    pub fn pseudos(&self, range: PseudoRange) -> &[Pseudo] {
        let start = range.start as usize;
        &self.pseudo_pool[start..start + range.len()]
    }

    #[must_use]
    pub fn interner(&self) -> &StringInterner {
        &self.interner
    }

    /// Look up an interned name's text.
    #[must_use]
    pub fn name(&self, name: Name) -> &str {
        self.interner.lookup(name)
    }
}
