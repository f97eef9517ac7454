//! Per-instruction lowering.
//!
//! Each opcode family has a dedicated emitter. Typed forms (`AddII`,
//! `EqFF`, `IAGetIKey`, ...) lower to native C arithmetic on the scratch
//! variables; generic forms call into the runtime and reload `base`
//! afterwards, since any runtime call may reallocate the stack. Guards
//! set `err_code` and jump to the function's `on_error` label.

use lume_ir::{Instruction, Literal, Module, Opcode, Proc, Pseudo};
use tracing::trace;

use crate::context::CodegenContext;
use crate::CodegenError;

use super::access::{
    emit_move, float_literal, int_literal, is_stack_backed, reg_access, scalar_operand, scalar_var,
};
use super::layout;

fn invalid(insn: &Instruction, detail: impl Into<String>) -> CodegenError {
    CodegenError::InvalidOperands {
        opcode: insn.opcode.mnemonic(),
        detail: detail.into(),
    }
}

fn internal_opcode(insn: &Instruction) -> CodegenError {
    CodegenError::Internal(format!(
        "opcode `{}` routed to the wrong emitter",
        insn.opcode.mnemonic()
    ))
}

fn operand(module: &Module, insn: &Instruction, idx: usize) -> Result<Pseudo, CodegenError> {
    module
        .pseudos(insn.operands)
        .get(idx)
        .copied()
        .ok_or_else(|| invalid(insn, format!("missing operand {idx}")))
}

fn target(module: &Module, insn: &Instruction, idx: usize) -> Result<Pseudo, CodegenError> {
    module
        .pseudos(insn.targets)
        .get(idx)
        .copied()
        .ok_or_else(|| invalid(insn, format!("missing target {idx}")))
}

fn block_label(module: &Module, insn: &Instruction, pseudo: Pseudo) -> Result<u32, CodegenError> {
    match pseudo.as_block() {
        Some(id) => Ok(module.block(id).label),
        None => Err(invalid(insn, format!("expected block, found {pseudo:?}"))),
    }
}

/// Lower one instruction into C statements at the current indent.
pub(super) fn emit_instruction(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    trace!(opcode = insn.opcode.mnemonic(), "lowering instruction");
    match insn.opcode {
        Opcode::Ret => emit_op_ret(ctx, module, proc, insn),
        Opcode::Br => emit_op_br(ctx, module, insn),
        Opcode::Cbr => emit_op_cbr(ctx, module, proc, insn),
        Opcode::Mov | Opcode::MovI | Opcode::MovF => {
            let src = operand(module, insn, 0)?;
            let dst = target(module, insn, 0)?;
            emit_move(ctx, module, proc, src, dst)
        }
        Opcode::MovFI => emit_op_movfi(ctx, module, proc, insn),
        Opcode::MovIF => emit_op_movif(ctx, module, proc, insn),
        Opcode::LoadGlobal
        | Opcode::Get
        | Opcode::GetSKey
        | Opcode::GetIKey
        | Opcode::TGet
        | Opcode::TGetSKey
        | Opcode::TGetIKey
        | Opcode::IAGet
        | Opcode::FAGet => emit_op_load_table(ctx, module, proc, insn),
        Opcode::StoreGlobal
        | Opcode::Put
        | Opcode::PutSKey
        | Opcode::PutIKey
        | Opcode::TPut
        | Opcode::TPutSKey
        | Opcode::TPutIKey
        | Opcode::IAPut
        | Opcode::FAPut => emit_op_store_table(ctx, module, proc, insn),
        Opcode::Call => emit_op_call(ctx, module, proc, insn),
        Opcode::AddFF
        | Opcode::SubFF
        | Opcode::MulFF
        | Opcode::DivFF
        | Opcode::AddII
        | Opcode::SubII
        | Opcode::MulII
        | Opcode::DivII
        | Opcode::BAndII
        | Opcode::BOrII
        | Opcode::BXorII => emit_bin_typed(ctx, module, proc, insn),
        Opcode::ShlII | Opcode::ShrII => emit_shift_typed(ctx, module, proc, insn),
        Opcode::EqII
        | Opcode::LtII
        | Opcode::LeII
        | Opcode::EqFF
        | Opcode::LtFF
        | Opcode::LeFF => emit_comp_typed(ctx, module, proc, insn),
        Opcode::AddFI | Opcode::SubFI | Opcode::MulFI | Opcode::DivFI => {
            emit_bin_flt_int(ctx, module, proc, insn)
        }
        Opcode::SubIF | Opcode::DivIF => emit_bin_int_flt(ctx, module, proc, insn),
        Opcode::Add | Opcode::Sub | Opcode::Mul => emit_op_arith(ctx, module, proc, insn),
        Opcode::Not => emit_op_not(ctx, module, proc, insn),
        Opcode::BNot => emit_op_bnot(ctx, module, proc, insn),
        Opcode::Div
        | Opcode::IDiv
        | Opcode::BAnd
        | Opcode::BOr
        | Opcode::BXor
        | Opcode::Shl
        | Opcode::Shr
        | Opcode::Mod
        | Opcode::Pow => emit_op_binary(ctx, module, proc, insn),
        Opcode::UnmI | Opcode::UnmF => emit_op_unm_typed(ctx, module, proc, insn),
        Opcode::Unm => emit_op_unm(ctx, module, proc, insn),
        Opcode::Eq | Opcode::Lt | Opcode::Le => emit_op_comp(ctx, module, proc, insn),
        Opcode::IAGetIKey | Opcode::FAGetIKey => emit_op_arrayget_ikey(ctx, module, proc, insn),
        Opcode::IAPutIVal | Opcode::FAPutFVal => emit_op_arrayput_val(ctx, module, proc, insn),
        Opcode::ToInt
        | Opcode::ToIArray
        | Opcode::ToFArray
        | Opcode::ToTable
        | Opcode::ToString
        | Opcode::ToClosure => emit_op_guard(ctx, module, proc, insn),
        Opcode::ToFlt => emit_op_toflt(ctx, module, proc, insn),
        Opcode::ToType => emit_op_tousertype(ctx, module, proc, insn),
        Opcode::Closure => emit_op_closure(ctx, module, proc, insn),
        Opcode::NewTable | Opcode::NewIArray | Opcode::NewFArray => {
            emit_op_new(ctx, module, proc, insn)
        }
        Opcode::Close => emit_op_close(ctx, module, proc, insn),
        Opcode::Len | Opcode::LenI => emit_op_len(ctx, module, proc, insn),
        Opcode::Concat | Opcode::Vararg => Err(CodegenError::UnsupportedOpcode {
            mnemonic: insn.opcode.mnemonic(),
        }),
    }
}

fn emit_op_br(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let label = block_label(module, insn, target(module, insn, 0)?)?;
    ctx.writeln(&format!("goto B{label};"));
    Ok(())
}

fn emit_op_cbr(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let cond = operand(module, insn, 0)?;
    let true_label = block_label(module, insn, target(module, insn, 0)?)?;
    let false_label = block_label(module, insn, target(module, insn, 1)?)?;
    match cond {
        Pseudo::False | Pseudo::Nil => ctx.writeln(&format!("goto B{false_label};")),
        Pseudo::True => ctx.writeln(&format!("goto B{true_label};")),
        Pseudo::Constant(id) => {
            // Constant condition folds to an unconditional jump.
            let label = if module.literal(id).is_truthy() {
                true_label
            } else {
                false_label
            };
            ctx.writeln(&format!("goto B{label};"));
        }
        Pseudo::TempBool { reg } => {
            ctx.writeln(&format!(
                "{{ if (ti{reg} != 0) goto B{true_label}; else goto B{false_label}; }}"
            ));
        }
        _ => {
            let acc = reg_access(module, proc, cond, 0)?;
            ctx.writeln("{");
            ctx.indent();
            ctx.writeln(&format!("const LumeValue *src_reg = {acc};"));
            ctx.writeln(&format!("if (!lm_falsy(src_reg)) goto B{true_label};"));
            ctx.writeln(&format!("else goto B{false_label};"));
            ctx.dedent();
            ctx.writeln("}");
        }
    }
    Ok(())
}

/// Copy results into the caller-visible window at `ci->func`, resolve the
/// wanted count, pop the frame and jump to the exit block.
#[expect(
    clippy::cast_possible_truncation,
    reason = "operand lists are tiny"
)]
fn emit_op_ret(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    if !proc.children.is_empty() {
        ctx.writeln("lumeF_close(L, base);");
        ctx.writeln("base = ci->base;");
    }
    let exit_label = block_label(module, insn, target(module, insn, 0)?)?;
    let values = module.pseudos(insn.operands);
    let n = values.len();
    let trailing_range = match values.last() {
        Some(&Pseudo::Range { start }) => Some(start),
        _ => None,
    };
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln("LumeValue *stackbase = ci->func;");
    ctx.writeln("int wanted = ci->nresults;");
    ctx.writeln("rc = wanted == -1 ? 0 : 1;");
    if let Some(start) = trailing_range {
        // A trailing range returns everything from its first register to
        // L->top, so the wanted count is only known at run time.
        let acc = reg_access(module, proc, Pseudo::Range { start }, 0)?;
        ctx.writeln("if (wanted == -1) {");
        ctx.indent();
        ctx.writeln(&format!("LumeValue *start_vararg = {acc};"));
        ctx.writeln(&format!("wanted = (L->top - start_vararg) + {};", n - 1));
        ctx.dedent();
        ctx.writeln("}");
    } else {
        ctx.writeln(&format!("if (wanted == -1) wanted = {n};"));
    }
    ctx.writeln("int j = 0;");
    let fixed = if trailing_range.is_some() { n - 1 } else { n };
    for (i, &value) in values.iter().take(fixed).enumerate() {
        ctx.writeln(&format!("if ({i} < wanted) {{"));
        ctx.indent();
        emit_move(ctx, module, proc, value, Pseudo::FrameSlot { idx: i as u32 })?;
        ctx.dedent();
        ctx.writeln("}");
        ctx.writeln("j++;");
    }
    if let Some(start) = trailing_range {
        let reg = layout::phys_reg(proc, Pseudo::Range { start })?;
        ctx.writeln("{");
        ctx.indent();
        ctx.writeln(&format!("int reg = {reg};"));
        ctx.writeln("while (j < wanted) {");
        ctx.indent();
        ctx.writeln("LumeValue *dest_reg = S(j);");
        ctx.writeln("LumeValue *src_reg = R(reg);");
        ctx.writeln("lm_copy(dest_reg, src_reg);");
        ctx.writeln("j++, reg++;");
        ctx.dedent();
        ctx.writeln("}");
        ctx.dedent();
        ctx.writeln("}");
    }
    ctx.writeln("while (j < wanted) {");
    ctx.indent();
    ctx.writeln("lm_setnil(S(j));");
    ctx.writeln("j++;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.writeln("L->top = S(0) + wanted;");
    ctx.writeln("L->ci = ci->previous;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.writeln(&format!("goto B{exit_label};"));
    Ok(())
}

fn short_string_key(module: &Module, key: Pseudo) -> bool {
    if let Pseudo::Constant(id) = key {
        if let Literal::Str(name) = module.literal(id) {
            return module.name(name).len() < 40;
        }
    }
    false
}

fn emit_op_load_table(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let tab = operand(module, insn, 0)?;
    let key = operand(module, insn, 1)?;
    let dst = target(module, insn, 0)?;
    let fname = if insn.opcode == Opcode::TGetIKey {
        "lumeV_gettable_int"
    } else if insn.opcode == Opcode::TGetSKey || short_string_key(module, key) {
        "lumeV_gettable_str"
    } else {
        "lumeV_gettable"
    };
    let tab_acc = reg_access(module, proc, tab, 0)?;
    let key_acc = reg_access(module, proc, key, 0)?;
    let dst_acc = reg_access(module, proc, dst, 1)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *tab = {tab_acc};"));
    ctx.writeln(&format!("LumeValue *key = {key_acc};"));
    ctx.writeln(&format!("LumeValue *dst = {dst_acc};"));
    ctx.writeln(&format!("{fname}(L, tab, key, dst);"));
    ctx.writeln("base = ci->base;");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_store_table(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let tab = target(module, insn, 0)?;
    let key = target(module, insn, 1)?;
    let src = operand(module, insn, 0)?;
    let fname = if insn.opcode == Opcode::TPutIKey {
        "lumeV_settable_int"
    } else if insn.opcode == Opcode::TPutSKey || short_string_key(module, key) {
        "lumeV_settable_str"
    } else {
        "lumeV_settable"
    };
    let tab_acc = reg_access(module, proc, tab, 0)?;
    let key_acc = reg_access(module, proc, key, 0)?;
    let src_acc = reg_access(module, proc, src, 1)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *tab = {tab_acc};"));
    ctx.writeln(&format!("LumeValue *key = {key_acc};"));
    ctx.writeln(&format!("LumeValue *src = {src_acc};"));
    ctx.writeln(&format!("{fname}(L, tab, key, src);"));
    ctx.writeln("base = ci->base;");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

/// Stage callee and arguments into the result window, fix up `L->top`,
/// then run the runtime call protocol.
#[expect(
    clippy::cast_possible_truncation,
    reason = "operand lists are tiny"
)]
fn emit_op_call(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let result_range = target(module, insn, 0)?;
    let target_reg = match result_range {
        Pseudo::Range { start } => start,
        other => {
            return Err(invalid(
                insn,
                format!("expected result range target, found {other:?}"),
            ))
        }
    };
    let nresults = match target(module, insn, 1)? {
        Pseudo::Constant(id) => match module.literal(id) {
            Literal::Int(v) => v,
            other => {
                return Err(invalid(
                    insn,
                    format!("expected integer result count, found {other:?}"),
                ))
            }
        },
        other => {
            return Err(invalid(
                insn,
                format!("expected constant result count, found {other:?}"),
            ))
        }
    };
    let args = module.pseudos(insn.operands);
    let mut n = args.len();
    if n == 0 {
        return Err(invalid(insn, "missing callee operand"));
    }
    ctx.writeln(&format!(
        "if (lume_stackoverflow(L, {n})) {{ lumeD_growstack(L, {n}); base = ci->base; }}"
    ));
    match args[n - 1] {
        Pseudo::Range { start } => {
            // The trailing range feeds all results of a previous call as
            // arguments; slide the open window into place if its start
            // register is not already where this call wants it.
            let want = target_reg + n as u32 - 1;
            if start != want {
                let src_acc = reg_access(module, proc, Pseudo::Range { start }, 0)?;
                let dst_acc = reg_access(module, proc, Pseudo::TempAny { reg: want }, 0)?;
                ctx.writeln("{");
                ctx.indent();
                ctx.writeln(&format!("LumeValue *src_base = {src_acc};"));
                ctx.writeln(&format!("LumeValue *dest_base = {dst_acc};"));
                ctx.writeln("LumeValue *src = L->top - 1;");
                ctx.writeln("L->top = dest_base + (L->top - src_base);");
                ctx.writeln("LumeValue *dest = L->top - 1;");
                ctx.writeln("while (src >= src_base) {");
                ctx.indent();
                ctx.writeln("lm_copy(dest, src);");
                ctx.writeln("src--;");
                ctx.writeln("dest--;");
                ctx.dedent();
                ctx.writeln("}");
                ctx.dedent();
                ctx.writeln("}");
            }
            n -= 1;
        }
        _ => {
            let top_acc = reg_access(module, proc, Pseudo::TempAny { reg: target_reg }, 0)?;
            ctx.writeln(&format!("L->top = {top_acc} + {n};"));
        }
    }
    for j in (0..n).rev() {
        let dst = Pseudo::TempAny {
            reg: target_reg + j as u32,
        };
        emit_move(ctx, module, proc, args[j], dst)?;
    }
    let ra_acc = reg_access(module, proc, result_range, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *ra = {ra_acc};"));
    ctx.writeln(&format!("int status = lumeD_precall(L, ra, {nresults}, 1);"));
    ctx.writeln("if (status) {");
    ctx.indent();
    ctx.writeln(&format!("if (status == 1 && {nresults} >= 0) {{"));
    ctx.indent();
    ctx.writeln("L->top = ci->top;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("} else {");
    ctx.indent();
    ctx.writeln("status = lumeV_execute(L);");
    ctx.writeln("if (status) {");
    ctx.indent();
    ctx.writeln("L->top = ci->top;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    ctx.writeln("base = ci->base;");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_bin_typed(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let oper = match insn.opcode {
        Opcode::AddFF | Opcode::AddII => "+",
        Opcode::SubFF | Opcode::SubII => "-",
        Opcode::MulFF | Opcode::MulII => "*",
        Opcode::DivFF | Opcode::DivII => "/",
        Opcode::BAndII => "&",
        Opcode::BOrII => "|",
        Opcode::BXorII => "^",
        _ => return Err(internal_opcode(insn)),
    };
    let a = scalar_operand(module, proc, operand(module, insn, 0)?)?;
    let b = scalar_operand(module, proc, operand(module, insn, 1)?)?;
    let tgt = target(module, insn, 0)?;
    if let Some(var) = scalar_var(tgt) {
        ctx.writeln(&format!("{{ {var} = {a} {oper} {b}; }}"));
        Ok(())
    } else if is_stack_backed(tgt) {
        let acc = reg_access(module, proc, tgt, 0)?;
        let setter = if matches!(
            insn.opcode,
            Opcode::AddFF | Opcode::SubFF | Opcode::MulFF | Opcode::DivFF
        ) {
            "lm_setflt"
        } else {
            "lm_setint"
        };
        ctx.writeln(&format!(
            "{{ LumeValue *dst_reg = {acc}; {setter}(dst_reg, {a} {oper} {b}); }}"
        ));
        Ok(())
    } else {
        Err(invalid(insn, format!("bad target {tgt:?}")))
    }
}

fn emit_shift_typed(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let a = scalar_operand(module, proc, operand(module, insn, 0)?)?;
    let b = scalar_operand(module, proc, operand(module, insn, 1)?)?;
    // A right shift is a left shift by the negated count; parenthesized
    // so a negative constant count stays well-formed C.
    let expr = if insn.opcode == Opcode::ShrII {
        format!("lumeV_shiftleft({a}, -({b}))")
    } else {
        format!("lumeV_shiftleft({a}, {b})")
    };
    let tgt = target(module, insn, 0)?;
    if let Some(var) = scalar_var(tgt) {
        ctx.writeln(&format!("{{ {var} = {expr}; }}"));
        Ok(())
    } else if is_stack_backed(tgt) {
        let acc = reg_access(module, proc, tgt, 0)?;
        ctx.writeln(&format!(
            "{{ LumeValue *dst_reg = {acc}; lm_setint(dst_reg, {expr}); }}"
        ));
        Ok(())
    } else {
        Err(invalid(insn, format!("bad target {tgt:?}")))
    }
}

fn emit_comp_typed(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let oper = match insn.opcode {
        Opcode::EqII | Opcode::EqFF => "==",
        Opcode::LtII | Opcode::LtFF => "<",
        Opcode::LeII | Opcode::LeFF => "<=",
        _ => return Err(internal_opcode(insn)),
    };
    let a = scalar_operand(module, proc, operand(module, insn, 0)?)?;
    let b = scalar_operand(module, proc, operand(module, insn, 1)?)?;
    let tgt = target(module, insn, 0)?;
    if let Pseudo::TempBool { reg } = tgt {
        ctx.writeln(&format!("{{ ti{reg} = {a} {oper} {b}; }}"));
        Ok(())
    } else if is_stack_backed(tgt) {
        let acc = reg_access(module, proc, tgt, 0)?;
        ctx.writeln(&format!(
            "{{ LumeValue *dst_reg = {acc}; lm_setbool(dst_reg, {a} {oper} {b}); }}"
        ));
        Ok(())
    } else {
        Err(invalid(insn, format!("bad target {tgt:?}")))
    }
}

fn emit_bin_flt_int(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let oper = match insn.opcode {
        Opcode::AddFI => "+",
        Opcode::SubFI => "-",
        Opcode::MulFI => "*",
        Opcode::DivFI => "/",
        _ => return Err(internal_opcode(insn)),
    };
    let a = scalar_operand(module, proc, operand(module, insn, 0)?)?;
    let b = scalar_operand(module, proc, operand(module, insn, 1)?)?;
    let expr = format!("{a} {oper} ((lume_Float)({b}))");
    emit_flt_result(ctx, module, proc, insn, &expr)
}

fn emit_bin_int_flt(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let oper = match insn.opcode {
        Opcode::SubIF => "-",
        Opcode::DivIF => "/",
        _ => return Err(internal_opcode(insn)),
    };
    let a = scalar_operand(module, proc, operand(module, insn, 0)?)?;
    let b = scalar_operand(module, proc, operand(module, insn, 1)?)?;
    let expr = format!("((lume_Float)({a})) {oper} {b}");
    emit_flt_result(ctx, module, proc, insn, &expr)
}

fn emit_flt_result(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
    expr: &str,
) -> Result<(), CodegenError> {
    let tgt = target(module, insn, 0)?;
    if let Pseudo::TempFloat { reg } = tgt {
        ctx.writeln(&format!("{{ tf{reg} = {expr}; }}"));
        Ok(())
    } else if is_stack_backed(tgt) {
        let acc = reg_access(module, proc, tgt, 0)?;
        ctx.writeln(&format!(
            "{{ LumeValue *dst_reg = {acc}; lm_setflt(dst_reg, {expr}); }}"
        ));
        Ok(())
    } else {
        Err(invalid(insn, format!("bad target {tgt:?}")))
    }
}

fn emit_op_arith(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let (oper, mm) = match insn.opcode {
        Opcode::Add => ("+", "LUME_MM_ADD"),
        Opcode::Sub => ("-", "LUME_MM_SUB"),
        Opcode::Mul => ("*", "LUME_MM_MUL"),
        _ => return Err(internal_opcode(insn)),
    };
    let ra_acc = reg_access(module, proc, target(module, insn, 0)?, 0)?;
    let rb_acc = reg_access(module, proc, operand(module, insn, 0)?, 0)?;
    let rc_acc = reg_access(module, proc, operand(module, insn, 1)?, 1)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *ra = {ra_acc};"));
    ctx.writeln(&format!("LumeValue *rb = {rb_acc};"));
    ctx.writeln(&format!("LumeValue *rc = {rc_acc};"));
    ctx.writeln("lume_Int i = 0;");
    ctx.writeln("lume_Int ic = 0;");
    ctx.writeln("lume_Float n = 0.0;");
    ctx.writeln("lume_Float nc = 0.0;");
    ctx.writeln("if (lm_isint(rb) && lm_isint(rc)) {");
    ctx.indent();
    ctx.writeln("i = lm_int(rb);");
    ctx.writeln("ic = lm_int(rc);");
    ctx.writeln(&format!("lm_setint(ra, (i {oper} ic));"));
    ctx.dedent();
    ctx.writeln("} else if (lm_tofloat_nostr(rb, &n) && lm_tofloat_nostr(rc, &nc)) {");
    ctx.indent();
    ctx.writeln(&format!("lm_setflt(ra, (n {oper} nc));"));
    ctx.dedent();
    ctx.writeln("} else {");
    ctx.indent();
    ctx.writeln(&format!("lumeT_trybinmeta(L, rb, rc, ra, {mm});"));
    ctx.writeln("base = ci->base;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_not(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let ra_acc = reg_access(module, proc, target(module, insn, 0)?, 0)?;
    let rb_acc = reg_access(module, proc, operand(module, insn, 0)?, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *ra = {ra_acc};"));
    ctx.writeln(&format!("LumeValue *rb = {rb_acc};"));
    ctx.writeln("int result = lm_falsy(rb);");
    ctx.writeln("lm_setbool(ra, result);");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_bnot(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let ra_acc = reg_access(module, proc, target(module, insn, 0)?, 0)?;
    let rb_acc = reg_access(module, proc, operand(module, insn, 0)?, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *ra = {ra_acc};"));
    ctx.writeln(&format!("LumeValue *rb = {rb_acc};"));
    ctx.writeln("lumeV_bnot(L, ra, rb);");
    ctx.writeln("base = ci->base;");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_binary(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let op = match insn.opcode {
        Opcode::Div => "LUME_OPDIV",
        Opcode::IDiv => "LUME_OPIDIV",
        Opcode::BAnd => "LUME_OPBAND",
        Opcode::BOr => "LUME_OPBOR",
        Opcode::BXor => "LUME_OPBXOR",
        Opcode::Shl => "LUME_OPSHL",
        Opcode::Shr => "LUME_OPSHR",
        Opcode::Mod => "LUME_OPMOD",
        Opcode::Pow => "LUME_OPPOW",
        _ => return Err(internal_opcode(insn)),
    };
    let ra_acc = reg_access(module, proc, target(module, insn, 0)?, 0)?;
    let rb_acc = reg_access(module, proc, operand(module, insn, 0)?, 0)?;
    let rc_acc = reg_access(module, proc, operand(module, insn, 1)?, 1)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *ra = {ra_acc};"));
    ctx.writeln(&format!("LumeValue *rb = {rb_acc};"));
    ctx.writeln(&format!("LumeValue *rc = {rc_acc};"));
    ctx.writeln(&format!("lumeO_arith(L, {op}, rb, rc, ra);"));
    ctx.writeln("base = ci->base;");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_unm_typed(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let is_int = insn.opcode == Opcode::UnmI;
    let (getter, setter) = if is_int {
        ("lm_int", "lm_setint")
    } else {
        ("lm_flt", "lm_setflt")
    };
    let op = operand(module, insn, 0)?;
    let tgt = target(module, insn, 0)?;
    let op_matches = if is_int {
        matches!(op, Pseudo::TempInt { .. })
    } else {
        matches!(op, Pseudo::TempFloat { .. })
    };
    ctx.writeln("{");
    ctx.indent();
    let rendered = if op_matches || matches!(op, Pseudo::Constant(_)) {
        scalar_operand(module, proc, op)?
    } else {
        let acc = reg_access(module, proc, op, 0)?;
        ctx.writeln(&format!("LumeValue *rb = {acc};"));
        format!("{getter}(rb)")
    };
    let tgt_matches = if is_int {
        matches!(tgt, Pseudo::TempInt { .. })
    } else {
        matches!(tgt, Pseudo::TempFloat { .. })
    };
    if tgt_matches {
        let var = scalar_var(tgt).ok_or_else(|| internal_opcode(insn))?;
        ctx.writeln(&format!("{var} = -({rendered});"));
    } else if is_stack_backed(tgt) {
        let acc = reg_access(module, proc, tgt, 0)?;
        ctx.writeln(&format!("LumeValue *ra = {acc};"));
        ctx.writeln(&format!("{setter}(ra, -({rendered}));"));
    } else {
        return Err(invalid(insn, format!("bad target {tgt:?}")));
    }
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_unm(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let rb_acc = reg_access(module, proc, operand(module, insn, 0)?, 0)?;
    let ra_acc = reg_access(module, proc, target(module, insn, 0)?, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln("lume_Float n = 0.0;");
    ctx.writeln(&format!("LumeValue *rb = {rb_acc};"));
    ctx.writeln(&format!("LumeValue *ra = {ra_acc};"));
    ctx.writeln("if (lm_isint(rb)) {");
    ctx.indent();
    ctx.writeln("lume_Int i = lm_int(rb);");
    ctx.writeln("lm_setint(ra, lm_intop(-, 0, i));");
    ctx.dedent();
    ctx.writeln("} else if (lm_tofloat_nostr(rb, &n)) {");
    ctx.indent();
    ctx.writeln("lm_setflt(ra, -n);");
    ctx.dedent();
    ctx.writeln("} else {");
    ctx.indent();
    ctx.writeln("lumeT_trybinmeta(L, rb, rb, ra, LUME_MM_UNM);");
    ctx.writeln("base = ci->base;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_comp(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let (oper, runtime_fn) = match insn.opcode {
        Opcode::Eq => ("==", "lumeV_equal"),
        Opcode::Lt => ("<", "lumeV_lessthan"),
        Opcode::Le => ("<=", "lumeV_lessequal"),
        _ => return Err(internal_opcode(insn)),
    };
    let rb_acc = reg_access(module, proc, operand(module, insn, 0)?, 0)?;
    let rc_acc = reg_access(module, proc, operand(module, insn, 1)?, 1)?;
    let tgt = target(module, insn, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln("int result = 0;");
    ctx.writeln(&format!("LumeValue *rb = {rb_acc};"));
    ctx.writeln(&format!("LumeValue *rc = {rc_acc};"));
    ctx.writeln("if (lm_isint(rb) && lm_isint(rc)) {");
    ctx.indent();
    ctx.writeln(&format!("result = (lm_int(rb) {oper} lm_int(rc));"));
    ctx.dedent();
    ctx.writeln("} else {");
    ctx.indent();
    ctx.writeln(&format!("result = {runtime_fn}(L, rb, rc);"));
    ctx.writeln("base = ci->base;");
    ctx.dedent();
    ctx.writeln("}");
    if let Pseudo::TempBool { reg } = tgt {
        ctx.writeln(&format!("ti{reg} = result != 0;"));
    } else if is_stack_backed(tgt) {
        let acc = reg_access(module, proc, tgt, 0)?;
        ctx.writeln(&format!("lm_setbool({acc}, result != 0);"));
    } else {
        return Err(invalid(insn, format!("bad target {tgt:?}")));
    }
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

/// Render an integer-valued pseudo as the C expression for an array index.
fn array_key(
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
    key: Pseudo,
) -> Result<String, CodegenError> {
    match key {
        Pseudo::Constant(id) => match module.literal(id) {
            Literal::Int(v) => Ok(int_literal(v)),
            other => Err(invalid(insn, format!("non-integer key {other:?}"))),
        },
        Pseudo::TempInt { reg } => Ok(format!("ti{reg}")),
        _ if is_stack_backed(key) => {
            let acc = reg_access(module, proc, key, 0)?;
            Ok(format!("lm_int({acc})"))
        }
        other => Err(invalid(insn, format!("bad key {other:?}"))),
    }
}

fn emit_op_arrayget_ikey(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let is_int = insn.opcode == Opcode::IAGetIKey;
    let (elem_type, setter) = if is_int {
        ("lume_Int *", "lm_setint")
    } else {
        ("lume_Float *", "lm_setflt")
    };
    let arr = operand(module, insn, 0)?;
    let key = operand(module, insn, 1)?;
    let dst = target(module, insn, 0)?;
    let arr_acc = reg_access(module, proc, arr, 0)?;
    let key_text = array_key(module, proc, insn, key)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeArray *arr = lm_arr({arr_acc});"));
    ctx.writeln(&format!("lume_Unsigned ukey = (lume_Unsigned) {key_text};"));
    ctx.writeln(&format!("{elem_type}iptr = ({elem_type})arr->data;"));
    let dst_matches = if is_int {
        matches!(dst, Pseudo::TempInt { .. })
    } else {
        matches!(dst, Pseudo::TempFloat { .. })
    };
    if dst_matches {
        let var = scalar_var(dst).ok_or_else(|| internal_opcode(insn))?;
        ctx.writeln(&format!("{var} = iptr[ukey];"));
    } else if is_stack_backed(dst) {
        let acc = reg_access(module, proc, dst, 0)?;
        ctx.writeln(&format!("LumeValue *dest_reg = {acc};"));
        ctx.writeln(&format!("{setter}(dest_reg, iptr[ukey]);"));
    } else {
        return Err(invalid(insn, format!("bad target {dst:?}")));
    }
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_arrayput_val(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let is_int = insn.opcode == Opcode::IAPutIVal;
    let (elem_type, getter, setter_fn) = if is_int {
        ("lume_Int *", "lm_int", "lumeA_seti")
    } else {
        ("lume_Float *", "lm_flt", "lumeA_setf")
    };
    let arr = target(module, insn, 0)?;
    let key = target(module, insn, 1)?;
    let src = operand(module, insn, 0)?;
    let src_matches = if is_int {
        matches!(src, Pseudo::TempInt { .. })
    } else {
        matches!(src, Pseudo::TempFloat { .. })
    };
    let src_text = if src_matches {
        scalar_var(src).ok_or_else(|| internal_opcode(insn))?
    } else if is_stack_backed(src) {
        let acc = reg_access(module, proc, src, 0)?;
        format!("{getter}({acc})")
    } else if let Pseudo::Constant(id) = src {
        match module.literal(id) {
            Literal::Int(v) => int_literal(v),
            Literal::Float(v) => float_literal(v),
            other => return Err(invalid(insn, format!("bad source {other:?}"))),
        }
    } else {
        return Err(invalid(insn, format!("bad source {src:?}")));
    };
    let arr_acc = reg_access(module, proc, arr, 0)?;
    let key_text = array_key(module, proc, insn, key)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeArray *arr = lm_arr({arr_acc});"));
    ctx.writeln(&format!("lume_Unsigned ukey = (lume_Unsigned) {key_text};"));
    ctx.writeln(&format!("{elem_type}iptr = ({elem_type})arr->data;"));
    ctx.writeln("if (ukey < (lume_Unsigned)(arr->len)) {");
    ctx.indent();
    ctx.writeln(&format!("iptr[ukey] = {src_text};"));
    ctx.dedent();
    ctx.writeln("} else {");
    ctx.indent();
    ctx.writeln(&format!("{setter_fn}(L, arr, ukey, {src_text});"));
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_movfi(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let rb_acc = reg_access(module, proc, operand(module, insn, 0)?, 0)?;
    let tgt = target(module, insn, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *rb = {rb_acc};"));
    ctx.writeln("lume_Int i = 0;");
    ctx.writeln("if (!lm_toint(rb, &i)) {");
    ctx.indent();
    ctx.writeln("err_code = 1;");
    ctx.writeln("goto on_error;");
    ctx.dedent();
    ctx.writeln("}");
    if let Pseudo::TempInt { reg } = tgt {
        ctx.writeln(&format!("ti{reg} = i;"));
    } else if is_stack_backed(tgt) {
        let acc = reg_access(module, proc, tgt, 0)?;
        ctx.writeln(&format!("LumeValue *ra = {acc};"));
        ctx.writeln("lm_setint(ra, i);");
    } else {
        return Err(invalid(insn, format!("bad target {tgt:?}")));
    }
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_movif(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let rb_acc = reg_access(module, proc, operand(module, insn, 0)?, 0)?;
    let tgt = target(module, insn, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *rb = {rb_acc};"));
    ctx.writeln("lume_Float n = 0.0;");
    ctx.writeln("if (!lm_tofloat(rb, &n)) {");
    ctx.indent();
    ctx.writeln("err_code = 2;");
    ctx.writeln("goto on_error;");
    ctx.dedent();
    ctx.writeln("}");
    if let Pseudo::TempFloat { reg } = tgt {
        ctx.writeln(&format!("tf{reg} = n;"));
    } else if is_stack_backed(tgt) {
        let acc = reg_access(module, proc, tgt, 0)?;
        ctx.writeln(&format!("LumeValue *ra = {acc};"));
        ctx.writeln("lm_setflt(ra, n);");
    } else {
        return Err(invalid(insn, format!("bad target {tgt:?}")));
    }
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_guard(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let (pred, code) = match insn.opcode {
        Opcode::ToInt => ("lm_isint", 1),
        Opcode::ToIArray => ("lm_isiarr", 3),
        Opcode::ToFArray => ("lm_isfarr", 4),
        Opcode::ToTable => ("lm_istab", 5),
        Opcode::ToString => ("lm_isstr", 15),
        Opcode::ToClosure => ("lm_isclosure", 16),
        _ => return Err(internal_opcode(insn)),
    };
    let ra_acc = reg_access(module, proc, target(module, insn, 0)?, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *ra = {ra_acc};"));
    ctx.writeln(&format!("if (!{pred}(ra)) {{"));
    ctx.indent();
    ctx.writeln(&format!("err_code = {code};"));
    ctx.writeln("goto on_error;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_toflt(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let ra_acc = reg_access(module, proc, target(module, insn, 0)?, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *ra = {ra_acc};"));
    ctx.writeln("lume_Float n = 0;");
    ctx.writeln("if (lm_isnum(ra)) {");
    ctx.indent();
    ctx.writeln("n = (lm_isint(ra) ? (lume_Float)lm_int(ra) : lm_flt(ra));");
    ctx.writeln("lm_setflt(ra, n);");
    ctx.dedent();
    ctx.writeln("} else {");
    ctx.indent();
    ctx.writeln("err_code = 2;");
    ctx.writeln("goto on_error;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

/// Nil passes the user-type guard; anything else must carry a short
/// string type name that the runtime accepts for the checked value.
fn emit_op_tousertype(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let ra_acc = reg_access(module, proc, target(module, insn, 0)?, 0)?;
    let rb_acc = reg_access(module, proc, operand(module, insn, 0)?, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *ra = {ra_acc};"));
    ctx.writeln("if (!lm_isnil(ra)) {");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *rb = {rb_acc};"));
    ctx.writeln("if (!lm_isshrstr(rb) || !lumeV_usertype_check(L, lm_str(rb), ra)) {");
    ctx.indent();
    ctx.writeln("err_code = 17;");
    ctx.writeln("goto on_error;");
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_closure(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let child = match operand(module, insn, 0)?.as_proc() {
        Some(id) => id,
        None => return Err(invalid(insn, "expected proc operand")),
    };
    let tgt = target(module, insn, 0)?;
    let reg = layout::phys_reg(proc, tgt)?;
    let ordinal = proc
        .children
        .iter()
        .position(|&c| c == child)
        .ok_or_else(|| {
            CodegenError::Internal(format!("proc {child:?} is not a child of {:?}", proc.id))
        })?;
    ctx.writeln(&format!("lumeV_closure(L, ci, cl, {reg}, {ordinal});"));
    ctx.writeln("base = ci->base;");
    Ok(())
}

fn emit_op_new(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let alloc_fn = match insn.opcode {
        Opcode::NewTable => "lumeV_newtable",
        Opcode::NewIArray => "lumeV_newarray_int",
        Opcode::NewFArray => "lumeV_newarray_flt",
        _ => return Err(internal_opcode(insn)),
    };
    let ra_acc = reg_access(module, proc, target(module, insn, 0)?, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *ra = {ra_acc};"));
    ctx.writeln(&format!("{alloc_fn}(L, ci, ra);"));
    ctx.writeln("base = ci->base;");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_close(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let acc = reg_access(module, proc, operand(module, insn, 0)?, 0)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *clsvar = {acc};"));
    ctx.writeln("lumeF_close(L, clsvar);");
    ctx.writeln("base = ci->base;");
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

fn emit_op_len(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    insn: &Instruction,
) -> Result<(), CodegenError> {
    let tgt = target(module, insn, 0)?;
    let len_acc = reg_access(module, proc, tgt, 0)?;
    let obj_acc = reg_access(module, proc, operand(module, insn, 0)?, 1)?;
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *len = {len_acc};"));
    ctx.writeln(&format!("LumeValue *obj = {obj_acc};"));
    ctx.writeln("lumeV_objlen(L, len, obj);");
    ctx.writeln("base = ci->base;");
    if let Pseudo::TempInt { reg } = tgt {
        // The length landed in the scratch slot the target accessor
        // named; copy it back into the native variable.
        ctx.writeln(&format!("ti{reg} = itmp0.u.i;"));
    }
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use lume_ir::{InsnId, ModuleBuilder, ProcId, TypeSet};
    use pretty_assertions::assert_eq;

    use super::*;

    fn try_lower(module: &Module, root: ProcId, insn: InsnId) -> Result<String, CodegenError> {
        let proc = module.proc(root);
        let mut ctx = CodegenContext::new(module.interner());
        emit_instruction(&mut ctx, module, proc, module.insn(insn))?;
        Ok(ctx.take_output())
    }

    fn lower(module: &Module, root: ProcId, insn: InsnId) -> String {
        try_lower(module, root, insn).unwrap()
    }

    #[test]
    fn test_br_jumps_to_block_label() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let body = pb.new_block();
        let id = pb.emit(entry, Opcode::Br, &[], &[Pseudo::Block(body)]);
        let module = builder.finish();
        assert_eq!(lower(&module, root, id), "goto B2;\n");
    }

    #[test]
    fn test_cbr_on_bool_temp_is_single_line() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let t = pb.new_temp(TypeSet::BOOLEAN);
        let yes = pb.new_block();
        let no = pb.new_block();
        let id = pb.emit(entry, Opcode::Cbr, &[t], &[Pseudo::Block(yes), Pseudo::Block(no)]);
        let module = builder.finish();
        assert_eq!(
            lower(&module, root, id),
            "{ if (ti0 != 0) goto B2; else goto B3; }\n"
        );
    }

    #[test]
    fn test_cbr_on_boxed_value_tests_falsiness() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let local = pb.new_local("flag", TypeSet::ANY);
        let yes = pb.new_block();
        let no = pb.new_block();
        let id = pb.emit(entry, Opcode::Cbr, &[local], &[Pseudo::Block(yes), Pseudo::Block(no)]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("const LumeValue *src_reg = R(0);"));
        assert!(out.contains("if (!lm_falsy(src_reg)) goto B2;"));
        assert!(out.contains("else goto B3;"));
    }

    #[test]
    fn test_cbr_folds_constant_condition() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let zero = pb.const_int(0);
        let yes = pb.new_block();
        let no = pb.new_block();
        let id = pb.emit(entry, Opcode::Cbr, &[zero], &[Pseudo::Block(yes), Pseudo::Block(no)]);
        let module = builder.finish();
        // 0 is truthy here; only nil and false branch the other way.
        assert_eq!(lower(&module, root, id), "goto B2;\n");
    }

    #[test]
    fn test_ret_fixed_result() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let exit = pb.exit();
        let local = pb.new_local("x", TypeSet::ANY);
        let id = pb.emit(entry, Opcode::Ret, &[local], &[Pseudo::Block(exit)]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("LumeValue *stackbase = ci->func;"));
        assert!(out.contains("rc = wanted == -1 ? 0 : 1;"));
        assert!(out.contains("if (wanted == -1) wanted = 1;"));
        assert_eq!(out.matches("if (0 < wanted) {").count(), 1);
        assert!(!out.contains("if (1 < wanted)"));
        assert!(out.contains("lm_setnil(S(j));"));
        assert!(out.contains("L->top = S(0) + wanted;"));
        assert!(out.contains("L->ci = ci->previous;"));
        assert!(out.ends_with("goto B1;\n"));
    }

    #[test]
    fn test_ret_with_trailing_range_counts_at_runtime() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let exit = pb.exit();
        let local = pb.new_local("x", TypeSet::ANY);
        let range = pb.new_range(2);
        let id = pb.emit(entry, Opcode::Ret, &[local, range], &[Pseudo::Block(exit)]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        // one local, so the range starts at physical slot 1
        assert!(out.contains("LumeValue *start_vararg = R(1);"));
        assert!(out.contains("wanted = (L->top - start_vararg) + 1;"));
        assert!(out.contains("int reg = 1;"));
        assert!(out.contains("j++, reg++;"));
    }

    #[test]
    fn test_load_table_upgrades_short_string_key() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let tab = pb.new_local("t", TypeSet::ANY);
        let key = pb.const_str("name");
        let dst = pb.new_temp(TypeSet::ANY);
        let id = pb.emit(entry, Opcode::Get, &[tab, key], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("LumeValue *key = K(0);"));
        assert!(out.contains("lumeV_gettable_str(L, tab, key, dst);"));
        assert!(out.contains("base = ci->base;"));
    }

    #[test]
    fn test_typed_table_get_uses_int_variant() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let tab = pb.new_local("t", TypeSet::TABLE);
        let key = pb.new_temp(TypeSet::INTEGER);
        let dst = pb.new_temp(TypeSet::ANY);
        let id = pb.emit(entry, Opcode::TGetIKey, &[tab, key], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("lumeV_gettable_int(L, tab, key, dst);"));
    }

    #[test]
    fn test_store_table_scratch_slots_do_not_collide() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let tab = pb.new_local("t", TypeSet::ANY);
        let key = pb.const_int(1);
        let val = pb.const_int(2);
        let id = pb.emit(entry, Opcode::Put, &[val], &[tab, key]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("LumeValue *key = &itmp0; itmp0.u.i = 1;"));
        assert!(out.contains("LumeValue *src = &itmp1; itmp1.u.i = 2;"));
        assert!(out.contains("lumeV_settable(L, tab, key, src);"));
    }

    #[test]
    fn test_typed_arith_native_target() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.new_temp(TypeSet::INTEGER);
        let b = pb.const_int(42);
        let dst = pb.new_temp(TypeSet::INTEGER);
        let id = pb.emit(entry, Opcode::AddII, &[a, b], &[dst]);
        let module = builder.finish();
        assert_eq!(lower(&module, root, id), "{ ti1 = ti0 + 42; }\n");
    }

    #[test]
    fn test_typed_arith_on_two_constants_stays_native() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.const_int(3);
        let b = pb.const_int(4);
        let dst = pb.new_temp(TypeSet::INTEGER);
        let id = pb.emit(entry, Opcode::AddII, &[a, b], &[dst]);
        let module = builder.finish();
        assert_eq!(lower(&module, root, id), "{ ti0 = 3 + 4; }\n");
    }

    #[test]
    fn test_typed_arith_boxed_target() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.new_temp(TypeSet::FLOAT);
        let b = pb.new_temp(TypeSet::FLOAT);
        let dst = pb.new_local("r", TypeSet::ANY);
        let id = pb.emit(entry, Opcode::MulFF, &[a, b], &[dst]);
        let module = builder.finish();
        assert_eq!(
            lower(&module, root, id),
            "{ LumeValue *dst_reg = R(0); lm_setflt(dst_reg, tf0 * tf1); }\n"
        );
    }

    #[test]
    fn test_right_shift_negates_count() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.new_temp(TypeSet::INTEGER);
        let b = pb.const_int(2);
        let dst = pb.new_temp(TypeSet::INTEGER);
        let id = pb.emit(entry, Opcode::ShrII, &[a, b], &[dst]);
        let module = builder.finish();
        assert_eq!(
            lower(&module, root, id),
            "{ ti1 = lumeV_shiftleft(ti0, -(2)); }\n"
        );
    }

    #[test]
    fn test_mixed_arith_casts_int_side() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.new_temp(TypeSet::FLOAT);
        let b = pb.new_temp(TypeSet::INTEGER);
        let dst = pb.new_temp(TypeSet::FLOAT);
        let id = pb.emit(entry, Opcode::AddFI, &[a, b], &[dst]);
        let module = builder.finish();
        assert_eq!(
            lower(&module, root, id),
            "{ tf1 = tf0 + ((lume_Float)(ti0)); }\n"
        );
    }

    #[test]
    fn test_typed_comparison_into_bool_temp() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.new_temp(TypeSet::INTEGER);
        let b = pb.const_int(5);
        let dst = pb.new_temp(TypeSet::BOOLEAN);
        let id = pb.emit(entry, Opcode::LeII, &[a, b], &[dst]);
        let module = builder.finish();
        assert_eq!(lower(&module, root, id), "{ ti1 = ti0 <= 5; }\n");
    }

    #[test]
    fn test_generic_arith_falls_back_to_metamethod() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.new_local("a", TypeSet::ANY);
        let b = pb.new_local("b", TypeSet::ANY);
        let dst = pb.new_temp(TypeSet::ANY);
        let id = pb.emit(entry, Opcode::Add, &[a, b], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("if (lm_isint(rb) && lm_isint(rc)) {"));
        assert!(out.contains("lm_setint(ra, (i + ic));"));
        assert!(out.contains("} else if (lm_tofloat_nostr(rb, &n) && lm_tofloat_nostr(rc, &nc)) {"));
        assert!(out.contains("lumeT_trybinmeta(L, rb, rc, ra, LUME_MM_ADD);"));
        assert!(out.contains("base = ci->base;"));
    }

    #[test]
    fn test_generic_binary_calls_runtime_arith() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.new_local("a", TypeSet::ANY);
        let b = pb.new_local("b", TypeSet::ANY);
        let dst = pb.new_temp(TypeSet::ANY);
        let id = pb.emit(entry, Opcode::Mod, &[a, b], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("lumeO_arith(L, LUME_OPMOD, rb, rc, ra);"));
        assert!(out.contains("base = ci->base;"));
    }

    #[test]
    fn test_generic_comparison_has_int_fast_path() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.new_local("a", TypeSet::ANY);
        let b = pb.new_local("b", TypeSet::ANY);
        let dst = pb.new_temp(TypeSet::BOOLEAN);
        let id = pb.emit(entry, Opcode::Lt, &[a, b], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("result = (lm_int(rb) < lm_int(rc));"));
        assert!(out.contains("result = lumeV_lessthan(L, rb, rc);"));
        assert!(out.contains("ti0 = result != 0;"));
    }

    #[test]
    fn test_call_stages_frame_and_dispatches() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let callee = pb.new_local("f", TypeSet::ANY);
        let arg = pb.const_int(10);
        let window = pb.new_range(2);
        let nres = pb.const_int(1);
        let id = pb.emit(entry, Opcode::Call, &[callee, arg], &[window, nres]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("if (lume_stackoverflow(L, 2)) { lumeD_growstack(L, 2); base = ci->base; }"));
        // one local, so the staging window starts at physical slot 1
        assert!(out.contains("L->top = R(1) + 2;"));
        assert!(out.contains("int status = lumeD_precall(L, ra, 1, 1);"));
        assert!(out.contains("status = lumeV_execute(L);"));
        assert!(out.contains("base = ci->base;"));
    }

    #[test]
    fn test_call_slides_trailing_range_into_place() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let callee = pb.new_local("f", TypeSet::ANY);
        let prior = pb.new_range(1);
        let window = pb.new_range(2);
        let nres = pb.const_int(-1);
        let id = pb.emit(entry, Opcode::Call, &[callee, prior], &[window, nres]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        // prior results start at temp 0, the call wants them at temp 2
        assert!(out.contains("LumeValue *src_base = R(1);"));
        assert!(out.contains("LumeValue *dest_base = R(3);"));
        assert!(out.contains("L->top = dest_base + (L->top - src_base);"));
        assert!(out.contains("while (src >= src_base) {"));
        assert!(!out.contains("L->top = R(2) + 2;"));
    }

    #[test]
    fn test_guard_sets_error_code_and_jumps() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let v = pb.new_local("v", TypeSet::ANY);
        let id = pb.emit(entry, Opcode::ToTable, &[], &[v]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("if (!lm_istab(ra)) {"));
        assert!(out.contains("err_code = 5;"));
        assert!(out.contains("goto on_error;"));
    }

    #[test]
    fn test_usertype_guard_allows_nil() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let v = pb.new_local("v", TypeSet::ANY);
        let tyname = pb.const_str("Point");
        let id = pb.emit(entry, Opcode::ToType, &[tyname], &[v]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("if (!lm_isnil(ra)) {"));
        assert!(out.contains("LumeValue *rb = K(0);"));
        assert!(out.contains("!lumeV_usertype_check(L, lm_str(rb), ra)"));
        assert!(out.contains("err_code = 17;"));
    }

    #[test]
    fn test_movfi_coerces_with_error_path() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let v = pb.new_local("v", TypeSet::ANY);
        let dst = pb.new_temp(TypeSet::INTEGER);
        let id = pb.emit(entry, Opcode::MovFI, &[v], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("if (!lm_toint(rb, &i)) {"));
        assert!(out.contains("err_code = 1;"));
        assert!(out.contains("ti0 = i;"));
    }

    #[test]
    fn test_movif_coerces_with_error_path() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let v = pb.new_local("v", TypeSet::ANY);
        let dst = pb.new_temp(TypeSet::FLOAT);
        let id = pb.emit(entry, Opcode::MovIF, &[v], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("if (!lm_tofloat(rb, &n)) {"));
        assert!(out.contains("err_code = 2;"));
        assert!(out.contains("tf0 = n;"));
    }

    #[test]
    fn test_unm_has_three_way_dispatch() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let v = pb.new_local("v", TypeSet::ANY);
        let dst = pb.new_temp(TypeSet::ANY);
        let id = pb.emit(entry, Opcode::Unm, &[v], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("lm_setint(ra, lm_intop(-, 0, i));"));
        assert!(out.contains("lm_setflt(ra, -n);"));
        assert!(out.contains("lumeT_trybinmeta(L, rb, rb, ra, LUME_MM_UNM);"));
    }

    #[test]
    fn test_typed_negation_stays_native() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.new_temp(TypeSet::INTEGER);
        let dst = pb.new_temp(TypeSet::INTEGER);
        let id = pb.emit(entry, Opcode::UnmI, &[a], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("ti1 = -(ti0);"));
        assert!(!out.contains("LumeValue *rb"));
    }

    #[test]
    fn test_closure_uses_child_ordinal() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let _first = builder.new_proc(root);
        let second = builder.new_proc(root);
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let dst = pb.new_local("f", TypeSet::ANY);
        let id = pb.emit(entry, Opcode::Closure, &[Pseudo::Proc(second)], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert_eq!(out, "lumeV_closure(L, ci, cl, 0, 1);\nbase = ci->base;\n");
    }

    #[test]
    fn test_array_get_fast_path() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let arr = pb.new_local("a", TypeSet::INT_ARRAY);
        let key = pb.new_temp(TypeSet::INTEGER);
        let dst = pb.new_temp(TypeSet::INTEGER);
        let id = pb.emit(entry, Opcode::IAGetIKey, &[arr, key], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("LumeArray *arr = lm_arr(R(0));"));
        assert!(out.contains("lume_Unsigned ukey = (lume_Unsigned) ti0;"));
        assert!(out.contains("lume_Int *iptr = (lume_Int *)arr->data;"));
        assert!(out.contains("ti1 = iptr[ukey];"));
    }

    #[test]
    fn test_array_put_checks_bounds() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let arr = pb.new_local("a", TypeSet::FLT_ARRAY);
        let key = pb.const_int(3);
        let val = pb.new_temp(TypeSet::FLOAT);
        let id = pb.emit(entry, Opcode::FAPutFVal, &[val], &[arr, key]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("lume_Float *iptr = (lume_Float *)arr->data;"));
        assert!(out.contains("if (ukey < (lume_Unsigned)(arr->len)) {"));
        assert!(out.contains("iptr[ukey] = tf0;"));
        assert!(out.contains("lumeA_setf(L, arr, ukey, tf0);"));
    }

    #[test]
    fn test_len_reads_back_into_int_temp() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let obj = pb.new_local("t", TypeSet::ANY);
        let dst = pb.new_temp(TypeSet::INTEGER);
        let id = pb.emit(entry, Opcode::LenI, &[obj], &[dst]);
        let module = builder.finish();
        let out = lower(&module, root, id);
        assert!(out.contains("lumeV_objlen(L, len, obj);"));
        assert!(out.contains("ti0 = itmp0.u.i;"));
    }

    #[test]
    fn test_newtable_and_close_reload_base() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let dst = pb.new_local("t", TypeSet::ANY);
        let alloc = pb.emit(entry, Opcode::NewTable, &[], &[dst]);
        let close = pb.emit(entry, Opcode::Close, &[dst], &[]);
        let module = builder.finish();
        let out = lower(&module, root, alloc);
        assert!(out.contains("lumeV_newtable(L, ci, ra);"));
        assert!(out.contains("base = ci->base;"));
        let out = lower(&module, root, close);
        assert!(out.contains("lumeF_close(L, clsvar);"));
    }

    #[test]
    fn test_concat_is_unsupported() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let entry = pb.entry();
        let a = pb.new_local("a", TypeSet::ANY);
        let b = pb.new_local("b", TypeSet::ANY);
        let dst = pb.new_temp(TypeSet::ANY);
        let id = pb.emit(entry, Opcode::Concat, &[a, b], &[dst]);
        let module = builder.finish();
        let err = try_lower(&module, root, id).unwrap_err();
        assert!(matches!(
            err,
            CodegenError::UnsupportedOpcode { mnemonic: "concat" }
        ));
    }
}
