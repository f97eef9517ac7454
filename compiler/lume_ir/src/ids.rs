//! ID and range newtypes for the linearized IR.
//!
//! These types provide type-safe indices into [`Module`](crate::Module)
//! storage, preventing accidental cross-use between the proc, block,
//! instruction, literal and symbol index spaces.

use std::fmt;

macro_rules! define_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Sentinel value indicating "no entry".
            pub const INVALID: $name = $name(u32::MAX);

            /// Create a new id from a raw index.
            #[inline]
            pub const fn new(index: u32) -> Self {
                Self(index)
            }

            /// Get the raw index into the owning pool.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }

            /// Get the raw `u32` value.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Returns `true` if this is a valid (non-sentinel) id.
            #[inline]
            pub const fn is_valid(self) -> bool {
                self.0 != u32::MAX
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if *self == Self::INVALID {
                    write!(f, concat!(stringify!($name), "::INVALID"))
                } else {
                    write!(f, concat!(stringify!($name), "({})"), self.0)
                }
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }
    };
}

define_id! {
    /// Index into [`Module`](crate::Module) proc storage. The root proc of
    /// a module always has id 0; ids are globally unique within a module
    /// and are used to derive the emitted function names.
    ProcId
}

define_id! {
    /// Index into [`Module`](crate::Module) basic-block storage. Note that
    /// this is distinct from a block's per-proc label index; branch
    /// targets carry a `BlockId` and the emitter resolves the label.
    BlockId
}

define_id! {
    /// Index into [`Module`](crate::Module) instruction storage.
    InsnId
}

define_id! {
    /// Index into [`Module`](crate::Module) literal storage. Literals are
    /// deduplicated by value, so equal constants in different procs share
    /// one id.
    ConstId
}

define_id! {
    /// Index into [`Module`](crate::Module) symbol storage (local
    /// variables and upvalues).
    SymbolId
}

/// A contiguous run of pseudos in a [`Module`](crate::Module)'s flat
/// pseudo pool.
///
/// Used for instruction operand and target lists. Operand arity is fixed
/// per opcode, so lists are written once at instruction creation and never
/// grown.
///
/// Layout: `start: u32, len: u16` = 8 bytes.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Default)]
#[repr(C)]
pub struct PseudoRange {
    pub start: u32,
    pub len: u16,
}

impl PseudoRange {
    /// Empty range constant.
    pub const EMPTY: Self = Self { start: 0, len: 0 };

    /// Create a new range.
    #[inline]
    pub const fn new(start: u32, len: u16) -> Self {
        Self { start, len }
    }

    /// Returns `true` if the range contains no elements.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements in the range.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len as usize
    }
}

impl fmt::Debug for PseudoRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PseudoRange({}..{})",
            self.start,
            self.start + u32::from(self.len)
        )
    }
}
