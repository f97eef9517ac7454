//! Physical frame layout.
//!
//! A proc's frame puts named locals first and tagged temps after them:
//! local register `r` occupies frame slot `r`, temp-class register `r`
//! occupies slot `L + r` where `L` is the local count. Native int/float
//! scratch registers live in C locals and have no frame slot at all.
//! `FrameSlot` pseudos index the caller-visible result window instead,
//! which is anchored at the callee value rather than the frame base.

use lume_ir::{Proc, Pseudo};

use crate::CodegenError;

/// Physical frame slot of a stack-resident pseudo.
pub(crate) fn phys_reg(proc: &Proc, pseudo: Pseudo) -> Result<u32, CodegenError> {
    match pseudo {
        Pseudo::Local { reg, .. } => Ok(reg),
        Pseudo::TempAny { reg } | Pseudo::RangeSelect { reg } => Ok(proc.num_locals() + reg),
        Pseudo::Range { start } => Ok(proc.num_locals() + start),
        Pseudo::FrameSlot { idx } => Ok(idx),
        _ => Err(CodegenError::Internal(format!(
            "pseudo {pseudo:?} has no frame slot"
        ))),
    }
}

/// Whether two pseudos denote the same physical stack location, in which
/// case a move between them is elided.
///
/// Conservative: pseudos that do not live on the stack never
/// compare equal, a result-window slot only matches another result-window
/// slot (different base pointer), and a named local only matches the same
/// symbol. Everything else falls through to physical index comparison.
pub(crate) fn same_register(proc: &Proc, a: Pseudo, b: Pseudo) -> bool {
    if !is_stack_resident(a) || !is_stack_resident(b) {
        return false;
    }
    match (a, b) {
        (Pseudo::FrameSlot { idx: ia }, Pseudo::FrameSlot { idx: ib }) => ia == ib,
        (Pseudo::FrameSlot { .. }, _) | (_, Pseudo::FrameSlot { .. }) => false,
        (Pseudo::Local { sym: sa, .. }, Pseudo::Local { sym: sb, .. }) => sa == sb,
        (Pseudo::Local { .. }, _) | (_, Pseudo::Local { .. }) => false,
        _ => match (phys_reg(proc, a), phys_reg(proc, b)) {
            (Ok(ra), Ok(rb)) => ra == rb,
            _ => false,
        },
    }
}

fn is_stack_resident(pseudo: Pseudo) -> bool {
    matches!(
        pseudo,
        Pseudo::Local { .. }
            | Pseudo::TempAny { .. }
            | Pseudo::Range { .. }
            | Pseudo::RangeSelect { .. }
            | Pseudo::FrameSlot { .. }
    )
}
