//! IR construction API.
//!
//! The linearizer that produces IR lives upstream of this crate; tests and
//! embedders build modules through [`ModuleBuilder`] / [`ProcBuilder`]
//! instead. The builder allocates ids, register numbers and constant-pool
//! slots, and records instructions in block order. It enforces only
//! structural shape; semantic validity (operand arity per opcode, register
//! class discipline) stays the producer's responsibility.

use crate::{
    BasicBlock, BlockId, ConstId, InsnId, Instruction, Literal, Module, Name, Opcode, Proc, ProcId,
    Pseudo, PseudoRange, RegSeq, StringInterner, Symbol, SymbolId, SymbolKind, TypeSet, UpvalDesc,
};
use rustc_hash::FxHashMap;

#[expect(
    clippy::cast_possible_truncation,
    reason = "IR pools never approach u32::MAX entries"
)]
fn pool_index(len: usize) -> u32 {
    len as u32
}

/// Builds one [`Module`].
///
/// Created with a root proc already in place (entry and exit blocks
/// allocated); nested procs are added with [`ModuleBuilder::new_proc`].
pub struct ModuleBuilder {
    module: Module,
    int_consts: FxHashMap<i64, ConstId>,
    flt_consts: FxHashMap<u64, ConstId>,
    str_consts: FxHashMap<Name, ConstId>,
    bool_consts: [Option<ConstId>; 2],
    nil_const: Option<ConstId>,
}

impl ModuleBuilder {
    /// Create a builder with an empty root proc.
    #[must_use]
    pub fn new() -> Self {
        let mut builder = Self {
            module: Module {
                interner: StringInterner::new(),
                procs: Vec::new(),
                blocks: Vec::new(),
                insns: Vec::new(),
                pseudo_pool: Vec::new(),
                literals: Vec::new(),
                symbols: Vec::new(),
                root: ProcId::INVALID,
            },
            int_consts: FxHashMap::default(),
            flt_consts: FxHashMap::default(),
            str_consts: FxHashMap::default(),
            bool_consts: [None, None],
            nil_const: None,
        };
        let root = builder.alloc_proc(None);
        builder.module.root = root;
        builder
    }

    /// The root proc.
    #[must_use]
    pub fn root(&self) -> ProcId {
        self.module.root
    }

    /// Add a nested proc under `parent`. Entry and exit blocks are
    /// allocated immediately; the child's ordinal among its siblings is
    /// its position in the parent's child list.
    pub fn new_proc(&mut self, parent: ProcId) -> ProcId {
        let id = self.alloc_proc(Some(parent));
        self.module.procs[parent.index()].children.push(id);
        id
    }

    /// Obtain the building handle for a proc.
    pub fn proc(&mut self, id: ProcId) -> ProcBuilder<'_> {
        ProcBuilder { builder: self, id }
    }

    /// Intern a string in the module's interner.
    pub fn intern(&self, s: &str) -> Name {
        self.module.interner.intern(s)
    }

    /// Finish building and hand over the module.
    #[must_use]
    pub fn finish(self) -> Module {
        self.module
    }

    fn alloc_proc(&mut self, parent: Option<ProcId>) -> ProcId {
        let id = ProcId::new(pool_index(self.module.procs.len()));
        self.module.procs.push(Proc {
            id,
            parent,
            blocks: Vec::new(),
            children: Vec::new(),
            string_slots: Vec::new(),
            upvals: Vec::new(),
            num_params: 0,
            locals: RegSeq::default(),
            temps: RegSeq::default(),
            int_temps: RegSeq::default(),
            flt_temps: RegSeq::default(),
        });
        // Reserved blocks: label 0 is entry, label 1 is exit
        self.alloc_block(id);
        self.alloc_block(id);
        id
    }

    fn alloc_block(&mut self, proc: ProcId) -> BlockId {
        let label = pool_index(self.module.procs[proc.index()].blocks.len());
        let id = BlockId::new(pool_index(self.module.blocks.len()));
        self.module.blocks.push(BasicBlock {
            label,
            proc,
            insns: Vec::new(),
        });
        self.module.procs[proc.index()].blocks.push(id);
        id
    }

    fn alloc_literal(&mut self, literal: Literal) -> ConstId {
        let id = ConstId::new(pool_index(self.module.literals.len()));
        self.module.literals.push(literal);
        id
    }

    fn alloc_symbol(&mut self, name: Name, ty: TypeSet, kind: SymbolKind) -> SymbolId {
        let id = SymbolId::new(pool_index(self.module.symbols.len()));
        self.module.symbols.push(Symbol { name, ty, kind });
        id
    }

    fn push_pseudos(&mut self, pseudos: &[Pseudo]) -> PseudoRange {
        let start = pool_index(self.module.pseudo_pool.len());
        #[expect(
            clippy::cast_possible_truncation,
            reason = "operand and target lists are tiny"
        )]
        let len = pseudos.len() as u16;
        self.module.pseudo_pool.extend_from_slice(pseudos);
        PseudoRange::new(start, len)
    }
}

impl Default for ModuleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Building handle for one proc.
pub struct ProcBuilder<'a> {
    builder: &'a mut ModuleBuilder,
    id: ProcId,
}

impl ProcBuilder<'_> {
    fn proc_mut(&mut self) -> &mut Proc {
        &mut self.builder.module.procs[self.id.index()]
    }

    fn proc_ref(&self) -> &Proc {
        &self.builder.module.procs[self.id.index()]
    }

    /// The proc's entry block (label 0).
    #[must_use]
    pub fn entry(&self) -> BlockId {
        self.proc_ref().blocks[0]
    }

    /// The proc's exit block (label 1).
    #[must_use]
    pub fn exit(&self) -> BlockId {
        self.proc_ref().blocks[1]
    }

    /// Append a fresh block; its label is the next per-proc index.
    pub fn new_block(&mut self) -> BlockId {
        self.builder.alloc_block(self.id)
    }

    /// Declare a named local, pinning it to the next local register.
    pub fn new_local(&mut self, name: &str, ty: TypeSet) -> Pseudo {
        let name = self.builder.module.interner.intern(name);
        let sym = self.builder.alloc_symbol(name, ty, SymbolKind::Local);
        let reg = self.proc_mut().locals.next();
        Pseudo::Local { sym, reg }
    }

    /// Declare a parameter: a local that also counts toward `num_params`.
    /// Parameters occupy the first local registers in declaration order.
    pub fn new_param(&mut self, name: &str, ty: TypeSet) -> Pseudo {
        let pseudo = self.new_local(name, ty);
        self.proc_mut().num_params += 1;
        pseudo
    }

    /// Declare an upvalue. `captured_index` is where the value is captured
    /// from in the parent: a frame register when `in_parent_stack`, else an
    /// index into the parent's own upvalue table. The returned pseudo
    /// addresses this proc's upvalue table.
    pub fn new_upvalue(
        &mut self,
        name: &str,
        ty: TypeSet,
        in_parent_stack: bool,
        captured_index: u32,
    ) -> Pseudo {
        let name = self.builder.module.interner.intern(name);
        let sym = self.builder.alloc_symbol(name, ty, SymbolKind::Upvalue);
        let proc = self.proc_mut();
        let index = pool_index(proc.upvals.len());
        proc.upvals.push(UpvalDesc {
            name,
            in_parent_stack,
            index: captured_index,
            ty,
        });
        Pseudo::Upvalue { sym, index }
    }

    /// Allocate a temporary of the given static type. Integer, float and
    /// boolean types get native scratch temps (boolean shares the integer
    /// register generator); everything else gets a tagged frame temp.
    pub fn new_temp(&mut self, ty: TypeSet) -> Pseudo {
        let proc = self.proc_mut();
        if ty.is_integer() {
            Pseudo::TempInt {
                reg: proc.int_temps.next(),
            }
        } else if ty.is_float() {
            Pseudo::TempFloat {
                reg: proc.flt_temps.next(),
            }
        } else if ty.is_boolean() {
            Pseudo::TempBool {
                reg: proc.int_temps.next(),
            }
        } else {
            Pseudo::TempAny {
                reg: proc.temps.next(),
            }
        }
    }

    /// Allocate `span` consecutive tagged temp registers as a range.
    pub fn new_range(&mut self, span: u32) -> Pseudo {
        Pseudo::Range {
            start: self.proc_mut().temps.advance(span),
        }
    }

    /// Integer literal, deduplicated by value.
    pub fn const_int(&mut self, value: i64) -> Pseudo {
        let id = match self.builder.int_consts.get(&value) {
            Some(&id) => id,
            None => {
                let id = self.builder.alloc_literal(Literal::Int(value));
                self.builder.int_consts.insert(value, id);
                id
            }
        };
        Pseudo::Constant(id)
    }

    /// Float literal, deduplicated by bit pattern.
    pub fn const_float(&mut self, value: f64) -> Pseudo {
        let bits = value.to_bits();
        let id = match self.builder.flt_consts.get(&bits) {
            Some(&id) => id,
            None => {
                let id = self.builder.alloc_literal(Literal::Float(value));
                self.builder.flt_consts.insert(bits, id);
                id
            }
        };
        Pseudo::Constant(id)
    }

    /// Boolean literal.
    pub fn const_bool(&mut self, value: bool) -> Pseudo {
        let slot = usize::from(value);
        let id = match self.builder.bool_consts[slot] {
            Some(id) => id,
            None => {
                let id = self.builder.alloc_literal(Literal::Bool(value));
                self.builder.bool_consts[slot] = Some(id);
                id
            }
        };
        Pseudo::Constant(id)
    }

    /// Nil literal.
    pub fn const_nil(&mut self) -> Pseudo {
        let id = match self.builder.nil_const {
            Some(id) => id,
            None => {
                let id = self.builder.alloc_literal(Literal::Nil);
                self.builder.nil_const = Some(id);
                id
            }
        };
        Pseudo::Constant(id)
    }

    /// String literal, interned and deduplicated by content. Also assigns
    /// the literal a slot in this proc's emitted constant table, so a
    /// string constant must be created through the proc that uses it.
    pub fn const_str(&mut self, value: &str) -> Pseudo {
        let name = self.builder.module.interner.intern(value);
        let id = match self.builder.str_consts.get(&name) {
            Some(&id) => id,
            None => {
                let id = self.builder.alloc_literal(Literal::Str(name));
                self.builder.str_consts.insert(name, id);
                id
            }
        };
        let proc = self.proc_mut();
        if !proc.string_slots.contains(&id) {
            proc.string_slots.push(id);
        }
        Pseudo::Constant(id)
    }

    /// Append an instruction to a block.
    pub fn emit(
        &mut self,
        block: BlockId,
        opcode: Opcode,
        operands: &[Pseudo],
        targets: &[Pseudo],
    ) -> InsnId {
        let operands = self.builder.push_pseudos(operands);
        let targets = self.builder.push_pseudos(targets);
        let id = InsnId::new(pool_index(self.builder.module.insns.len()));
        self.builder.module.insns.push(Instruction {
            opcode,
            operands,
            targets,
        });
        self.builder.module.blocks[block.index()].insns.push(id);
        id
    }
}
