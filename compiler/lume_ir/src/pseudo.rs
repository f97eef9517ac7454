//! Virtual operands.
//!
//! Instructions reference their inputs and outputs through [`Pseudo`]s.
//! A pseudo names a storage class and a register number (or a literal);
//! it never carries a machine location. The back end maps register-bearing
//! pseudos onto physical frame slots late, during emission.

use crate::{BlockId, ConstId, Name, ProcId, SymbolId};

/// A virtual operand or target of an IR instruction.
///
/// Register numbers are allocated per storage class by the owning `Proc`;
/// they are unique and monotonically increasing within their class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pseudo {
    /// Named local variable pinned to a frame register below the temp window.
    Local { sym: SymbolId, reg: u32 },
    /// Captured variable addressed through the closure's upvalue table.
    Upvalue { sym: SymbolId, index: u32 },
    /// Native integer temporary. Lives in a scalar scratch variable,
    /// never in a frame slot.
    TempInt { reg: u32 },
    /// Native float temporary.
    TempFloat { reg: u32 },
    /// Boolean temporary. Shares the integer register generator and the
    /// integer scratch variables.
    TempBool { reg: u32 },
    /// Tagged-value temporary occupying a frame slot above the locals.
    TempAny { reg: u32 },
    /// Literal from the module's constant pool.
    Constant(ConstId),
    /// Open-ended run of consecutive frame slots starting at `start`,
    /// used to forward multiple values. Only valid in final operand
    /// position.
    Range { start: u32 },
    /// One fixed slot drawn out of a range.
    RangeSelect { reg: u32 },
    /// Explicit frame-relative slot used by synthesized code paths.
    FrameSlot { idx: u32 },
    Nil,
    True,
    False,
    /// Child procedure reference (closure creation).
    Proc(ProcId),
    /// Branch target.
    Block(BlockId),
}

crate::static_assert_size!(Pseudo, 12);

impl Pseudo {
    /// The branch target, if this pseudo is one.
    #[must_use]
    pub fn as_block(self) -> Option<BlockId> {
        match self {
            Pseudo::Block(id) => Some(id),
            _ => None,
        }
    }

    /// The referenced child procedure, if this pseudo is one.
    #[must_use]
    pub fn as_proc(self) -> Option<ProcId> {
        match self {
            Pseudo::Proc(id) => Some(id),
            _ => None,
        }
    }

    /// The constant-pool id, if this pseudo is a constant.
    #[must_use]
    pub fn as_constant(self) -> Option<ConstId> {
        match self {
            Pseudo::Constant(id) => Some(id),
            _ => None,
        }
    }
}

/// A literal constant value.
///
/// Only string literals persist into the emitted prototype's constant
/// table; numeric and boolean literals are inlined at every use site.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(Name),
    Bool(bool),
    Nil,
}

crate::static_assert_size!(Literal, 16);

impl Literal {
    /// Runtime truthiness: everything except `false` and nil is truthy.
    #[must_use]
    pub fn is_truthy(self) -> bool {
        !matches!(self, Literal::Bool(false) | Literal::Nil)
    }
}
