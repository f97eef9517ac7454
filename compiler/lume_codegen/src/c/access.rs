//! Pseudo-register access expressions and the universal move emitter.
//!
//! `reg_access` renders the C expression that reaches a pseudo's storage.
//! For literals and native temps the returned text routes the value
//! through the function's tag-initialized scratch pool and has the shape
//! `&<slot>; <slot>.u.<f> = <value>`; callers splice it after
//! `LumeValue *x = ` so the compound form stays one well-formed line. The
//! `disc` argument picks scratch slot 0 or 1, letting two operands of one
//! instruction coexist without clobbering each other.

use lume_ir::{Literal, Module, Proc, Pseudo};

use crate::context::CodegenContext;
use crate::CodegenError;

use super::layout;

/// Render an integer literal as C source. `i64::MIN` has no direct
/// decimal spelling in C (the minus sign is applied after the literal is
/// parsed), so it becomes an expression.
pub(super) fn int_literal(value: i64) -> String {
    if value == i64::MIN {
        "(-9223372036854775807 - 1)".to_string()
    } else {
        value.to_string()
    }
}

/// Render a float literal as C source. Exponential formatting keeps the
/// shortest round-trip representation valid C even when the value is
/// integral (`1e0`, never a bare `1`). Non-finite values have no literal
/// spelling and become constant expressions.
pub(super) fn float_literal(value: f64) -> String {
    if value.is_nan() {
        "(0.0/0.0)".to_string()
    } else if value == f64::INFINITY {
        "(1.0/0.0)".to_string()
    } else if value == f64::NEG_INFINITY {
        "(-1.0/0.0)".to_string()
    } else {
        format!("{value:e}")
    }
}

/// C expression reaching `pseudo`'s storage, usable after `LumeValue *x = `.
pub(super) fn reg_access(
    module: &Module,
    proc: &Proc,
    pseudo: Pseudo,
    disc: u32,
) -> Result<String, CodegenError> {
    match pseudo {
        Pseudo::Local { .. }
        | Pseudo::TempAny { .. }
        | Pseudo::Range { .. }
        | Pseudo::RangeSelect { .. } => {
            let reg = layout::phys_reg(proc, pseudo)?;
            Ok(format!("R({reg})"))
        }
        Pseudo::FrameSlot { idx } => Ok(format!("S({idx})")),
        Pseudo::Upvalue { index, .. } => Ok(format!("cl->upvals[{index}]->v")),
        Pseudo::Constant(id) => match module.literal(id) {
            Literal::Int(v) => Ok(format!("&itmp{disc}; itmp{disc}.u.i = {}", int_literal(v))),
            Literal::Float(v) => Ok(format!("&ftmp{disc}; ftmp{disc}.u.n = {}", float_literal(v))),
            Literal::Bool(v) => Ok(format!("&btmp{disc}; btmp{disc}.u.b = {}", i32::from(v))),
            Literal::Nil => Ok("&nilval".to_string()),
            Literal::Str(_) => match proc.string_slot(id) {
                Some(slot) => Ok(format!("K({slot})")),
                None => Err(CodegenError::Internal(format!(
                    "string constant {id:?} has no slot in proc {:?}",
                    proc.id
                ))),
            },
        },
        Pseudo::Nil => Ok("&nilval".to_string()),
        Pseudo::True => Ok(format!("&btmp{disc}; btmp{disc}.u.b = 1")),
        Pseudo::False => Ok(format!("&btmp{disc}; btmp{disc}.u.b = 0")),
        Pseudo::TempInt { reg } => Ok(format!("&itmp{disc}; itmp{disc}.u.i = ti{reg}")),
        Pseudo::TempBool { reg } => Ok(format!("&btmp{disc}; btmp{disc}.u.b = ti{reg}")),
        Pseudo::TempFloat { reg } => Ok(format!("&ftmp{disc}; ftmp{disc}.u.n = tf{reg}")),
        Pseudo::Proc(_) | Pseudo::Block(_) => Err(CodegenError::Internal(format!(
            "pseudo {pseudo:?} is not addressable"
        ))),
    }
}

/// Native scratch variable backing an int, bool or float temp.
pub(super) fn scalar_var(pseudo: Pseudo) -> Option<String> {
    match pseudo {
        Pseudo::TempInt { reg } | Pseudo::TempBool { reg } => Some(format!("ti{reg}")),
        Pseudo::TempFloat { reg } => Some(format!("tf{reg}")),
        _ => None,
    }
}

/// Render a pseudo as a native C scalar rvalue: a numeric literal, a
/// native scratch variable, or a typed unboxing read for int/float-typed
/// locals and upvalues.
pub(super) fn scalar_operand(
    module: &Module,
    proc: &Proc,
    pseudo: Pseudo,
) -> Result<String, CodegenError> {
    match pseudo {
        Pseudo::Constant(id) => match module.literal(id) {
            Literal::Int(v) => Ok(int_literal(v)),
            Literal::Float(v) => Ok(float_literal(v)),
            other => Err(CodegenError::Internal(format!(
                "literal {other:?} has no native scalar rendering"
            ))),
        },
        Pseudo::TempInt { reg } | Pseudo::TempBool { reg } => Ok(format!("ti{reg}")),
        Pseudo::TempFloat { reg } => Ok(format!("tf{reg}")),
        Pseudo::Local { sym, .. } | Pseudo::Upvalue { sym, .. } => {
            let ty = module.symbol(sym).ty;
            let acc = reg_access(module, proc, pseudo, 0)?;
            if ty.is_integer() {
                Ok(format!("lm_int({acc})"))
            } else if ty.is_float() {
                Ok(format!("lm_flt({acc})"))
            } else {
                Err(CodegenError::Internal(format!(
                    "symbol pseudo {pseudo:?} is not statically int or float"
                )))
            }
        }
        _ => Err(CodegenError::Internal(format!(
            "pseudo {pseudo:?} has no native scalar rendering"
        ))),
    }
}

/// True for pseudos whose storage is a full tagged stack slot.
pub(super) fn is_stack_backed(pseudo: Pseudo) -> bool {
    matches!(
        pseudo,
        Pseudo::Local { .. } | Pseudo::TempAny { .. } | Pseudo::FrameSlot { .. } | Pseudo::Upvalue { .. }
    )
}

/// Emit a move between two pseudo registers, picking the cheapest legal
/// form: native variable assignment, a tagged setter, a full value copy,
/// or nothing at all when source and destination share a stack slot.
pub(super) fn emit_move(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    src: Pseudo,
    dst: Pseudo,
) -> Result<(), CodegenError> {
    match dst {
        Pseudo::TempFloat { reg } => move_to_flt_temp(ctx, module, proc, src, reg),
        Pseudo::TempInt { reg } => move_to_int_temp(ctx, module, proc, src, reg),
        Pseudo::TempBool { reg } => move_to_bool_temp(ctx, module, proc, src, reg),
        _ if is_stack_backed(dst) => move_to_stack(ctx, module, proc, src, dst),
        _ => Err(CodegenError::Internal(format!(
            "pseudo {dst:?} is not a move destination"
        ))),
    }
}

fn move_to_flt_temp(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    src: Pseudo,
    reg: u32,
) -> Result<(), CodegenError> {
    match src {
        Pseudo::Constant(id) => match module.literal(id) {
            Literal::Float(v) => {
                ctx.writeln(&format!("tf{reg} = {};", float_literal(v)));
                Ok(())
            }
            Literal::Int(v) => {
                ctx.writeln(&format!("tf{reg} = {};", int_literal(v)));
                Ok(())
            }
            other => Err(bad_move_src(format!("{other:?}"), "float temp")),
        },
        Pseudo::TempFloat { reg: src_reg } => {
            ctx.writeln(&format!("tf{reg} = tf{src_reg};"));
            Ok(())
        }
        _ if is_stack_backed(src) => {
            let acc = reg_access(module, proc, src, 0)?;
            ctx.writeln("{");
            ctx.indent();
            ctx.writeln(&format!("const LumeValue *reg = {acc};"));
            ctx.writeln(&format!("tf{reg} = lm_flt(reg);"));
            ctx.dedent();
            ctx.writeln("}");
            Ok(())
        }
        _ => Err(bad_move_src(format!("{src:?}"), "float temp")),
    }
}

fn move_to_int_temp(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    src: Pseudo,
    reg: u32,
) -> Result<(), CodegenError> {
    match src {
        Pseudo::Constant(id) => match module.literal(id) {
            Literal::Int(v) => {
                ctx.writeln(&format!("ti{reg} = {};", int_literal(v)));
                Ok(())
            }
            other => Err(bad_move_src(format!("{other:?}"), "int temp")),
        },
        Pseudo::TempInt { reg: src_reg } | Pseudo::TempBool { reg: src_reg } => {
            ctx.writeln(&format!("ti{reg} = ti{src_reg};"));
            Ok(())
        }
        _ if is_stack_backed(src) => {
            let acc = reg_access(module, proc, src, 0)?;
            ctx.writeln("{");
            ctx.indent();
            ctx.writeln(&format!("const LumeValue *reg = {acc};"));
            ctx.writeln(&format!("ti{reg} = lm_int(reg);"));
            ctx.dedent();
            ctx.writeln("}");
            Ok(())
        }
        _ => Err(bad_move_src(format!("{src:?}"), "int temp")),
    }
}

/// Boolean temps store a truth value, so stack sources narrow through
/// the falsiness predicate rather than a raw payload read.
fn move_to_bool_temp(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    src: Pseudo,
    reg: u32,
) -> Result<(), CodegenError> {
    match src {
        Pseudo::Constant(id) => match module.literal(id) {
            Literal::Int(v) => {
                ctx.writeln(&format!("ti{reg} = {};", int_literal(v)));
                Ok(())
            }
            Literal::Bool(v) => {
                ctx.writeln(&format!("ti{reg} = {};", i32::from(v)));
                Ok(())
            }
            other => Err(bad_move_src(format!("{other:?}"), "bool temp")),
        },
        Pseudo::True => {
            ctx.writeln(&format!("ti{reg} = 1;"));
            Ok(())
        }
        Pseudo::False => {
            ctx.writeln(&format!("ti{reg} = 0;"));
            Ok(())
        }
        Pseudo::TempInt { reg: src_reg } | Pseudo::TempBool { reg: src_reg } => {
            ctx.writeln(&format!("ti{reg} = ti{src_reg};"));
            Ok(())
        }
        _ if is_stack_backed(src) => {
            let acc = reg_access(module, proc, src, 0)?;
            ctx.writeln("{");
            ctx.indent();
            ctx.writeln(&format!("const LumeValue *reg = {acc};"));
            ctx.writeln(&format!("ti{reg} = !lm_falsy(reg);"));
            ctx.dedent();
            ctx.writeln("}");
            Ok(())
        }
        _ => Err(bad_move_src(format!("{src:?}"), "bool temp")),
    }
}

fn move_to_stack(
    ctx: &mut CodegenContext<'_>,
    module: &Module,
    proc: &Proc,
    src: Pseudo,
    dst: Pseudo,
) -> Result<(), CodegenError> {
    if is_stack_backed(src) || matches!(src, Pseudo::RangeSelect { .. }) {
        if layout::same_register(proc, src, dst) {
            return Ok(());
        }
        let src_acc = reg_access(module, proc, src, 0)?;
        let dst_acc = reg_access(module, proc, dst, 0)?;
        ctx.writeln("{");
        ctx.indent();
        ctx.writeln(&format!("const LumeValue *src_reg = {src_acc};"));
        ctx.writeln(&format!("LumeValue *dst_reg = {dst_acc};"));
        ctx.writeln("lm_copy(dst_reg, src_reg);");
        ctx.dedent();
        ctx.writeln("}");
        return Ok(());
    }
    let dst_acc = reg_access(module, proc, dst, 0)?;
    match src {
        Pseudo::TempInt { reg } => {
            set_in_block(ctx, &dst_acc, &format!("lm_setint(dst_reg, ti{reg});"));
            Ok(())
        }
        Pseudo::TempFloat { reg } => {
            set_in_block(ctx, &dst_acc, &format!("lm_setflt(dst_reg, tf{reg});"));
            Ok(())
        }
        Pseudo::TempBool { reg } => {
            set_in_block(ctx, &dst_acc, &format!("lm_setbool(dst_reg, ti{reg});"));
            Ok(())
        }
        Pseudo::True => {
            set_in_block(ctx, &dst_acc, "lm_setbool(dst_reg, 1);");
            Ok(())
        }
        Pseudo::False => {
            set_in_block(ctx, &dst_acc, "lm_setbool(dst_reg, 0);");
            Ok(())
        }
        Pseudo::Nil => {
            set_in_block(ctx, &dst_acc, "lm_setnil(dst_reg);");
            Ok(())
        }
        Pseudo::Constant(id) => match module.literal(id) {
            Literal::Int(v) => {
                set_in_block(ctx, &dst_acc, &format!("lm_setint(dst_reg, {});", int_literal(v)));
                Ok(())
            }
            Literal::Float(v) => {
                set_in_block(ctx, &dst_acc, &format!("lm_setflt(dst_reg, {});", float_literal(v)));
                Ok(())
            }
            Literal::Bool(v) => {
                set_in_block(ctx, &dst_acc, &format!("lm_setbool(dst_reg, {});", i32::from(v)));
                Ok(())
            }
            Literal::Nil => {
                set_in_block(ctx, &dst_acc, "lm_setnil(dst_reg);");
                Ok(())
            }
            Literal::Str(_) => {
                let src_acc = reg_access(module, proc, src, 0)?;
                ctx.writeln("{");
                ctx.indent();
                ctx.writeln(&format!("const LumeValue *src_reg = {src_acc};"));
                ctx.writeln(&format!("LumeValue *dst_reg = {dst_acc};"));
                ctx.writeln("lm_copy(dst_reg, src_reg);");
                ctx.dedent();
                ctx.writeln("}");
                Ok(())
            }
        },
        _ => Err(bad_move_src(format!("{src:?}"), "stack slot")),
    }
}

fn set_in_block(ctx: &mut CodegenContext<'_>, dst_acc: &str, setter: &str) {
    ctx.writeln("{");
    ctx.indent();
    ctx.writeln(&format!("LumeValue *dst_reg = {dst_acc};"));
    ctx.writeln(setter);
    ctx.dedent();
    ctx.writeln("}");
}

fn bad_move_src(src: String, dst: &str) -> CodegenError {
    CodegenError::Internal(format!("cannot move {src} into a {dst}"))
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use lume_ir::{ModuleBuilder, TypeSet};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_int_literal_min() {
        assert_eq!(int_literal(42), "42");
        assert_eq!(int_literal(-7), "-7");
        assert_eq!(int_literal(i64::MIN), "(-9223372036854775807 - 1)");
    }

    #[test]
    fn test_float_literal_is_valid_c() {
        assert_eq!(float_literal(1.5), "1.5e0");
        assert_eq!(float_literal(0.25), "2.5e-1");
        assert_eq!(float_literal(-2.0), "-2e0");
        assert_eq!(float_literal(f64::INFINITY), "(1.0/0.0)");
        assert_eq!(float_literal(f64::NEG_INFINITY), "(-1.0/0.0)");
        assert_eq!(float_literal(f64::NAN), "(0.0/0.0)");
    }

    #[test]
    fn test_reg_access_kinds() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let local = pb.new_local("x", TypeSet::ANY);
        let temp = pb.new_temp(TypeSet::ANY);
        let int_const = pb.const_int(42);
        let str_const = pb.const_str("key");
        let module = builder.finish();
        let proc = module.proc(root);

        assert_eq!(reg_access(&module, proc, local, 0).unwrap(), "R(0)");
        // one local, so tagged temp 0 lands at slot 1
        assert_eq!(reg_access(&module, proc, temp, 0).unwrap(), "R(1)");
        assert_eq!(
            reg_access(&module, proc, int_const, 1).unwrap(),
            "&itmp1; itmp1.u.i = 42"
        );
        assert_eq!(reg_access(&module, proc, str_const, 0).unwrap(), "K(0)");
        assert_eq!(reg_access(&module, proc, Pseudo::Nil, 0).unwrap(), "&nilval");
        assert_eq!(
            reg_access(&module, proc, Pseudo::TempInt { reg: 2 }, 0).unwrap(),
            "&itmp0; itmp0.u.i = ti2"
        );
        assert_eq!(
            reg_access(&module, proc, Pseudo::FrameSlot { idx: 3 }, 0).unwrap(),
            "S(3)"
        );
    }

    #[test]
    fn test_reg_access_upvalue() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let child = builder.new_proc(root);
        let up = builder.proc(child).new_upvalue("env", TypeSet::ANY, true, 0);
        let module = builder.finish();
        assert_eq!(
            reg_access(&module, module.proc(child), up, 0).unwrap(),
            "cl->upvals[0]->v"
        );
    }

    #[test]
    fn test_scalar_operand_typed_local() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let mut pb = builder.proc(root);
        let i = pb.new_local("i", TypeSet::INTEGER);
        let f = pb.new_local("f", TypeSet::FLOAT);
        let any = pb.new_local("a", TypeSet::ANY);
        let c = pb.const_float(0.5);
        let module = builder.finish();
        let proc = module.proc(root);

        assert_eq!(scalar_operand(&module, proc, i).unwrap(), "lm_int(R(0))");
        assert_eq!(scalar_operand(&module, proc, f).unwrap(), "lm_flt(R(1))");
        assert_eq!(scalar_operand(&module, proc, c).unwrap(), "5e-1");
        assert_eq!(
            scalar_operand(&module, proc, Pseudo::TempBool { reg: 1 }).unwrap(),
            "ti1"
        );
        assert!(scalar_operand(&module, proc, any).is_err());
    }

    #[test]
    fn test_move_elides_same_register() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let local = builder.proc(root).new_local("x", TypeSet::ANY);
        let module = builder.finish();
        let proc = module.proc(root);
        let mut ctx = CodegenContext::new(module.interner());

        emit_move(&mut ctx, &module, proc, local, local).unwrap();
        assert_eq!(ctx.take_output(), "");
    }

    #[test]
    fn test_move_int_temp_to_stack() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let local = builder.proc(root).new_local("x", TypeSet::ANY);
        let module = builder.finish();
        let proc = module.proc(root);
        let mut ctx = CodegenContext::new(module.interner());

        emit_move(&mut ctx, &module, proc, Pseudo::TempInt { reg: 0 }, local).unwrap();
        let out = ctx.take_output();
        assert!(out.contains("LumeValue *dst_reg = R(0);"));
        assert!(out.contains("lm_setint(dst_reg, ti0);"));
    }

    #[test]
    fn test_move_stack_to_stack_copies_value() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let (a, b) = {
            let mut pb = builder.proc(root);
            (pb.new_local("a", TypeSet::ANY), pb.new_local("b", TypeSet::ANY))
        };
        let module = builder.finish();
        let proc = module.proc(root);
        let mut ctx = CodegenContext::new(module.interner());

        emit_move(&mut ctx, &module, proc, a, b).unwrap();
        let out = ctx.take_output();
        assert!(out.contains("const LumeValue *src_reg = R(0);"));
        assert!(out.contains("LumeValue *dst_reg = R(1);"));
        assert!(out.contains("lm_copy(dst_reg, src_reg);"));
    }

    #[test]
    fn test_move_local_into_upvalue_copies_value() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let child = builder.new_proc(root);
        let (up, local) = {
            let mut pb = builder.proc(child);
            (
                pb.new_upvalue("env", TypeSet::ANY, true, 0),
                pb.new_local("x", TypeSet::ANY),
            )
        };
        let module = builder.finish();
        let proc = module.proc(child);
        let mut ctx = CodegenContext::new(module.interner());

        emit_move(&mut ctx, &module, proc, local, up).unwrap();
        let out = ctx.take_output();
        assert!(out.contains("const LumeValue *src_reg = R(0);"));
        assert!(out.contains("LumeValue *dst_reg = cl->upvals[0]->v;"));
        assert!(out.contains("lm_copy(dst_reg, src_reg);"));
    }

    #[test]
    fn test_move_int_temp_into_upvalue_widens() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let child = builder.new_proc(root);
        let up = builder.proc(child).new_upvalue("env", TypeSet::ANY, true, 0);
        let module = builder.finish();
        let proc = module.proc(child);
        let mut ctx = CodegenContext::new(module.interner());

        emit_move(&mut ctx, &module, proc, Pseudo::TempInt { reg: 0 }, up).unwrap();
        let out = ctx.take_output();
        assert!(out.contains("LumeValue *dst_reg = cl->upvals[0]->v;"));
        assert!(out.contains("lm_setint(dst_reg, ti0);"));
    }

    #[test]
    fn test_move_narrows_to_bool_through_falsiness() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let local = builder.proc(root).new_local("x", TypeSet::ANY);
        let module = builder.finish();
        let proc = module.proc(root);
        let mut ctx = CodegenContext::new(module.interner());

        emit_move(&mut ctx, &module, proc, local, Pseudo::TempBool { reg: 4 }).unwrap();
        let out = ctx.take_output();
        assert!(out.contains("ti4 = !lm_falsy(reg);"));
    }

    #[test]
    fn test_move_string_constant_from_k() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let (s, local) = {
            let mut pb = builder.proc(root);
            (pb.const_str("greeting"), pb.new_local("x", TypeSet::ANY))
        };
        let module = builder.finish();
        let proc = module.proc(root);
        let mut ctx = CodegenContext::new(module.interner());

        emit_move(&mut ctx, &module, proc, s, local).unwrap();
        let out = ctx.take_output();
        assert!(out.contains("const LumeValue *src_reg = K(0);"));
        assert!(out.contains("lm_copy(dst_reg, src_reg);"));
    }

    #[test]
    fn test_move_rejects_range_source() {
        let mut builder = ModuleBuilder::new();
        let root = builder.root();
        let (r, local) = {
            let mut pb = builder.proc(root);
            (pb.new_range(2), pb.new_local("x", TypeSet::ANY))
        };
        let module = builder.finish();
        let proc = module.proc(root);
        let mut ctx = CodegenContext::new(module.interner());

        assert!(emit_move(&mut ctx, &module, proc, r, local).is_err());
    }
}
