//! C translation unit assembly.
//!
//! One [`CCodegen`] run produces: a banner comment, the embedded runtime
//! ABI header, one C function per proc in parent-before-children order,
//! and the exported closure factory that rebuilds the prototype graph at
//! load time.

mod abi;
mod access;
mod function;
mod insn;
mod layout;
mod proto;

pub use abi::{ABI_VERSION, RUNTIME_HEADER, VALUE_SIZE};

use lume_ir::{Module, ProcId};
use smallvec::SmallVec;

use crate::context::CodegenContext;
use crate::{CodegenError, CodegenResult, GenInterface};

/// C code generator for one module.
pub struct CCodegen<'a> {
    module: &'a Module,
    interface: &'a GenInterface<'a>,
}

impl<'a> CCodegen<'a> {
    #[must_use]
    pub fn new(module: &'a Module, interface: &'a GenInterface<'a>) -> Self {
        Self { module, interface }
    }

    /// Generate the complete translation unit.
    pub fn generate(&self) -> CodegenResult {
        let mut ctx = CodegenContext::new(self.module.interner());
        match self.generate_inner(&mut ctx) {
            Ok(()) => {
                self.interface.reporter.debug(&format!(
                    "{}: generated C for {} procs",
                    self.interface.source_name,
                    self.module.num_procs()
                ));
                CodegenResult::success(ctx.take_output())
            }
            Err(err) => {
                self.interface
                    .reporter
                    .error(&format!("{}: {err}", self.interface.source_name));
                CodegenResult::error(err)
            }
        }
    }

    fn generate_inner(&self, ctx: &mut CodegenContext<'_>) -> Result<(), CodegenError> {
        ctx.write(&format!(
            "/* {}: generated by the Lume compiler. Do not edit. */\n",
            self.interface.source_name
        ));
        ctx.write(RUNTIME_HEADER);
        ctx.newline();

        let mut order: SmallVec<[ProcId; 8]> = SmallVec::new();
        collect_proc_order(self.module, self.module.root(), &mut order);
        for &id in &order {
            function::emit_proc(ctx, self.module, self.module.proc(id))?;
            ctx.newline();
        }
        proto::emit_factory(ctx, self.module, self.interface.main_name);
        Ok(())
    }
}

/// Parent-before-children order; matches the textual order of the
/// generated functions so the factory only refers to names already
/// defined above it.
fn collect_proc_order(module: &Module, id: ProcId, order: &mut SmallVec<[ProcId; 8]>) {
    order.push(id);
    for &child in &module.proc(id).children {
        collect_proc_order(module, child, order);
    }
}
