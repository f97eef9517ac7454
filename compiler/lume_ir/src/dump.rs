//! Plain-text IR dump for debugging and test diagnostics.

use crate::{BasicBlock, Literal, Module, Proc, Pseudo};
use std::fmt;

impl Module {
    /// A `Display` adapter rendering the whole module.
    #[must_use]
    pub fn display(&self) -> ModuleDump<'_> {
        ModuleDump { module: self }
    }
}

/// See [`Module::display`].
pub struct ModuleDump<'a> {
    module: &'a Module,
}

impl fmt::Display for ModuleDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for proc in &self.module.procs {
            write_proc(f, self.module, proc)?;
        }
        Ok(())
    }
}

fn write_proc(f: &mut fmt::Formatter<'_>, module: &Module, proc: &Proc) -> fmt::Result {
    write!(
        f,
        "proc #{} params={} locals={} temps={} itemps={} ftemps={}",
        proc.id.raw(),
        proc.num_params,
        proc.num_locals(),
        proc.num_temps(),
        proc.num_int_temps(),
        proc.num_flt_temps(),
    )?;
    if let Some(parent) = proc.parent {
        write!(f, " parent=#{}", parent.raw())?;
    }
    writeln!(f)?;
    for (i, upval) in proc.upvals.iter().enumerate() {
        let place = if upval.in_parent_stack { "stack" } else { "upval" };
        writeln!(
            f,
            "  upval {i}: {} {} capture={place}[{}]",
            module.name(upval.name),
            upval.ty,
            upval.index,
        )?;
    }
    for (i, &slot) in proc.string_slots.iter().enumerate() {
        if let Literal::Str(name) = module.literal(slot) {
            writeln!(f, "  const {i}: {:?}", module.name(name))?;
        }
    }
    for &block_id in &proc.blocks {
        let block = module.block(block_id);
        if block.is_deleted() {
            continue;
        }
        write_block(f, module, block)?;
    }
    Ok(())
}

fn write_block(f: &mut fmt::Formatter<'_>, module: &Module, block: &BasicBlock) -> fmt::Result {
    writeln!(f, "  B{}:", block.label)?;
    for &insn_id in &block.insns {
        let insn = module.insn(insn_id);
        write!(f, "    {}", insn.opcode)?;
        let operands = module.pseudos(insn.operands);
        if !operands.is_empty() {
            f.write_str(" (")?;
            write_pseudo_list(f, module, operands)?;
            f.write_str(")")?;
        }
        let targets = module.pseudos(insn.targets);
        if !targets.is_empty() {
            f.write_str(" -> (")?;
            write_pseudo_list(f, module, targets)?;
            f.write_str(")")?;
        }
        writeln!(f)?;
    }
    Ok(())
}

fn write_pseudo_list(f: &mut fmt::Formatter<'_>, module: &Module, list: &[Pseudo]) -> fmt::Result {
    for (i, &pseudo) in list.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write_pseudo(f, module, pseudo)?;
    }
    Ok(())
}

fn write_pseudo(f: &mut fmt::Formatter<'_>, module: &Module, pseudo: Pseudo) -> fmt::Result {
    match pseudo {
        Pseudo::Local { sym, reg } => {
            write!(f, "local({})@{reg}", module.name(module.symbol(sym).name))
        }
        Pseudo::Upvalue { sym, index } => {
            write!(f, "upval({})@{index}", module.name(module.symbol(sym).name))
        }
        Pseudo::TempInt { reg } => write!(f, "ti{reg}"),
        Pseudo::TempFloat { reg } => write!(f, "tf{reg}"),
        Pseudo::TempBool { reg } => write!(f, "tb{reg}"),
        Pseudo::TempAny { reg } => write!(f, "t{reg}"),
        Pseudo::Constant(id) => match module.literal(id) {
            Literal::Int(v) => write!(f, "{v}"),
            Literal::Float(v) => write!(f, "{v:?}"),
            Literal::Str(name) => write!(f, "{:?}", module.name(name)),
            Literal::Bool(v) => write!(f, "{v}"),
            Literal::Nil => f.write_str("nil"),
        },
        Pseudo::Range { start } => write!(f, "range@{start}.."),
        Pseudo::RangeSelect { reg } => write!(f, "range@{reg}"),
        Pseudo::FrameSlot { idx } => write!(f, "slot{idx}"),
        Pseudo::Nil => f.write_str("nil"),
        Pseudo::True => f.write_str("true"),
        Pseudo::False => f.write_str("false"),
        Pseudo::Proc(id) => write!(f, "proc#{}", id.raw()),
        Pseudo::Block(id) => write!(f, "B{}", module.block(id).label),
    }
}
