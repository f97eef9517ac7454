//! Per-proc function emission.
//!
//! Each proc becomes one `static int __lumefn_<id>(lume_State *L)` C
//! function: a fixed prologue that materializes frame state from the
//! current call info, native scratch declarations sized to the proc, the
//! tag-initialized scratch value pool, and then every live block in
//! storage order behind a `B<label>:` goto label. The exit block carries
//! the error tail that routes guard failures into `lumeV_raise`.

use lume_ir::{BasicBlock, Module, Proc};
use tracing::debug;

use crate::context::CodegenContext;
use crate::CodegenError;

use super::insn;

/// Emit the complete C function for one proc.
pub(super) fn emit_proc(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
) -> Result<(), CodegenError> {
    debug!(
        proc = proc.id.raw(),
        blocks = proc.blocks.len(),
        "emitting function"
    );
    ctx.writeln(&format!(
        "static int __lumefn_{}(lume_State *L) {{",
        proc.id.raw()
    ));
    ctx.indent();
    emit_prologue(ctx, proc);
    for &block_id in &proc.blocks {
        let block = module.block(block_id);
        if block.is_deleted() {
            continue;
        }
        // Labels sit at column zero, outside the statement indent.
        ctx.write(&format!("B{}:\n", block.label));
        for &insn_id in &block.insns {
            insn::emit_instruction(ctx, module, proc, module.insn(insn_id))?;
        }
        if block.label == BasicBlock::EXIT_LABEL {
            emit_error_tail(ctx);
        }
    }
    ctx.dedent();
    ctx.writeln("}");
    Ok(())
}

/// Frame state, native scratch variables and the tagged scratch pool.
///
/// The pool always provides two slots per tag class; `reg_access` never
/// hands out a discriminator above 1.
fn emit_prologue(ctx: &mut CodegenContext<'_>, proc: &Proc) {
    ctx.writeln("int err_code = 0;");
    ctx.writeln("int rc = 0;");
    ctx.writeln("LumeCallInfo *ci = L->ci;");
    ctx.writeln("LumeClosure *cl = lm_closure(ci->func);");
    ctx.writeln("LumeValue *k = cl->p->k;");
    ctx.writeln("LumeValue *base = ci->base;");
    emit_scalar_decls(ctx, "lume_Int", "ti", proc.num_int_temps());
    emit_scalar_decls(ctx, "lume_Float", "tf", proc.num_flt_temps());
    ctx.writeln("LumeValue itmp0; lm_settag(&itmp0, LUME_TNUMINT);");
    ctx.writeln("LumeValue ftmp0; lm_settag(&ftmp0, LUME_TNUMFLT);");
    ctx.writeln("LumeValue btmp0; lm_settag(&btmp0, LUME_TBOOL);");
    ctx.writeln("LumeValue itmp1; lm_settag(&itmp1, LUME_TNUMINT);");
    ctx.writeln("LumeValue ftmp1; lm_settag(&ftmp1, LUME_TNUMFLT);");
    ctx.writeln("LumeValue btmp1; lm_settag(&btmp1, LUME_TBOOL);");
    ctx.writeln("LumeValue nilval; lm_setnil(&nilval);");
}

/// One declaration line covering a whole native register class,
/// zero-initialized: `lume_Int ti0 = 0, ti1 = 0;`.
fn emit_scalar_decls(ctx: &mut CodegenContext<'_>, c_type: &str, prefix: &str, count: u32) {
    if count == 0 {
        return;
    }
    let mut line = format!("{c_type} ");
    for reg in 0..count {
        if reg > 0 {
            line.push_str(", ");
        }
        line.push_str(&format!("{prefix}{reg} = 0"));
    }
    line.push(';');
    ctx.writeln(&line);
}

fn emit_error_tail(ctx: &mut CodegenContext<'_>) {
    ctx.writeln("return rc;");
    ctx.write("on_error:\n");
    ctx.writeln("lumeV_raise(L, err_code); /* does not return */");
    ctx.writeln("return rc;");
}
