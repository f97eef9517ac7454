//! Closure factory emission.
//!
//! Every translation unit ends with an exported factory that rebuilds the
//! prototype graph at load time: it allocates the root closure, then fills
//! in one `LumeProto` per proc (entry pointer, stack geometry, string
//! constants, upvalue descriptors), recursing through nested procs in the
//! same order the function bodies were emitted. Loading a compiled chunk
//! means calling this factory; running it means calling the closure it
//! returns.

use lume_ir::{Literal, Module, Proc};

use crate::context::CodegenContext;

use super::abi;

/// Emit the exported factory for the module's root proc.
pub(super) fn emit_factory(ctx: &mut CodegenContext<'_>, module: &Module, main_name: &str) {
    let root = module.proc(module.root());
    let export = c_export_name(main_name);
    ctx.writeln(&format!(
        "LUME_EXPORT LumeClosure *{export}(lume_State *L) {{"
    ));
    ctx.indent();
    // Forces the link against the runtime's ABI anchor.
    ctx.writeln("(void)lume_abi_v1;");
    ctx.writeln(&format!(
        "LumeClosure *cl = lumeF_newclosure(L, {});",
        root.upvals.len()
    ));
    ctx.writeln("lm_setclosure(L, L->top, cl);");
    ctx.writeln("lumeD_inctop(L);");
    ctx.writeln("cl->p = lumeF_newproto(L);");
    ctx.writeln("LumeProto *f = cl->p;");
    emit_proto(ctx, module, root);
    ctx.writeln("return cl;");
    ctx.dedent();
    ctx.writeln("}");
}

/// Populate the proto `f` currently in scope, then descend into children.
fn emit_proto(ctx: &mut CodegenContext<'_>, module: &Module, proc: &Proc) {
    ctx.writeln(&format!("f->entry = __lumefn_{};", proc.id.raw()));
    ctx.writeln("f->status = LUME_FN_COMPILED;");
    ctx.writeln(&format!("f->numparams = {};", proc.num_params));
    ctx.writeln("f->is_vararg = 0;");
    ctx.writeln(&format!("f->maxstacksize = {};", proc.frame_size()));

    // Only string constants are materialized; numbers are emitted inline
    // at their use sites.
    let num_strings = proc.string_slots.len();
    ctx.writeln(&format!(
        "f->k = lumeM_newvector(L, {num_strings}, LumeValue);"
    ));
    ctx.writeln(&format!("f->sizek = {num_strings};"));
    ctx.writeln(&format!(
        "{{ int i; for (i = 0; i < {num_strings}; i++) lm_setnil(&f->k[i]); }}"
    ));
    for (slot, &const_id) in proc.string_slots.iter().enumerate() {
        if let Literal::Str(name) = module.literal(const_id) {
            let text = ctx.resolve_name(name);
            let quoted = c_quote(text);
            let len = text.len();
            ctx.writeln(&format!(
                "{{ LumeValue *o = &f->k[{slot}]; lm_setstr(L, o, lumeS_new(L, \"{quoted}\", {len})); }}"
            ));
        }
    }

    let num_upvals = proc.upvals.len();
    ctx.writeln(&format!(
        "f->upvals = lumeM_newvector(L, {num_upvals}, LumeUpvalDesc);"
    ));
    ctx.writeln(&format!("f->sizeupvals = {num_upvals};"));
    for (i, desc) in proc.upvals.iter().enumerate() {
        ctx.writeln(&format!(
            "f->upvals[{i}].instack = {};",
            i32::from(desc.in_parent_stack)
        ));
        ctx.writeln(&format!("f->upvals[{i}].idx = {};", desc.index));
        ctx.writeln(&format!("f->upvals[{i}].name = NULL;"));
        ctx.writeln(&format!(
            "f->upvals[{i}].ptype = {};",
            abi::type_code(desc.ty)
        ));
    }

    let num_children = proc.children.len();
    if num_children > 0 {
        ctx.writeln(&format!(
            "f->p = lumeM_newvector(L, {num_children}, LumeProto *);"
        ));
        ctx.writeln(&format!("f->sizep = {num_children};"));
        ctx.writeln(&format!(
            "{{ int i; for (i = 0; i < {num_children}; i++) f->p[i] = NULL; }}"
        ));
        for (i, &child) in proc.children.iter().enumerate() {
            ctx.writeln(&format!("f->p[{i}] = lumeF_newproto(L);"));
            ctx.writeln("{");
            ctx.indent();
            ctx.writeln("LumeProto *parent = f;");
            ctx.writeln(&format!("f = f->p[{i}];"));
            emit_proto(ctx, module, module.proc(child));
            ctx.writeln("f = parent;");
            ctx.dedent();
            ctx.writeln("}");
        }
    }
}

/// Make the caller-supplied export name a valid C identifier. Names that
/// already qualify pass through untouched; anything else has its foreign
/// characters replaced by underscores and gains the `lume_` prefix when
/// the first character cannot start an identifier.
fn c_export_name(name: &str) -> String {
    let valid = name
        .chars()
        .enumerate()
        .all(|(i, c)| c == '_' || c.is_ascii_alphabetic() || (i > 0 && c.is_ascii_digit()));
    if valid && !name.is_empty() {
        return name.to_string();
    }
    let mut out = String::with_capacity(name.len() + 5);
    if !name.starts_with(|c: char| c == '_' || c.is_ascii_alphabetic()) {
        out.push_str("lume_");
    }
    for c in name.chars() {
        if c == '_' || c.is_ascii_alphanumeric() {
            out.push(c);
        } else {
            out.push('_');
        }
    }
    out
}

/// Escape a string for a C string literal, byte-wise. Printable ASCII
/// passes through; quotes and backslashes get escaped; everything else
/// (control bytes, the bytes of non-ASCII UTF-8) becomes a three-digit
/// octal escape, which cannot swallow a following digit.
fn c_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        match b {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out
}
