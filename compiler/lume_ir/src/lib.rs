//! Lume IR - Linearized Intermediate Representation
//!
//! This crate contains the data structures the Lume back end consumes:
//! - Ids and list ranges indexing the flat arena pools
//! - Names for interned identifiers, plus the sharded string interner
//! - Pseudos (virtual operands) and literal constants
//! - Opcodes and instructions
//! - Basic blocks, procs and the owning `Module` arena
//! - A builder API standing in for the upstream linearizer
//! - A plain-text dump for debugging and tests
//!
//! # Design Philosophy
//!
//! - **Intern Everything**: strings → `Name(u32)`
//! - **Flatten Everything**: no pointer-linked graphs; `u32` ids into
//!   contiguous pools, operand/target lists as `{start, len}` ranges into
//!   one shared pseudo pool
//! - The module is built once and read-only afterwards; the back end never
//!   mutates IR

/// Compile-time assertion that a type has a specific size.
///
/// Used to prevent accidental size regressions in frequently-allocated types.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

mod builder;
mod dump;
mod ids;
mod insn;
mod interner;
mod module;
mod name;
mod pseudo;
mod types;

pub use builder::{ModuleBuilder, ProcBuilder};
pub use dump::ModuleDump;
pub use ids::{BlockId, ConstId, InsnId, ProcId, PseudoRange, SymbolId};
pub use insn::{Instruction, Opcode};
pub use interner::{InternError, StringInterner, StringLookup};
pub use module::{BasicBlock, Module, Proc, Symbol, SymbolKind, UpvalDesc};
pub use name::Name;
pub use pseudo::{Literal, Pseudo};
pub use types::TypeSet;

pub(crate) use module::RegSeq;
