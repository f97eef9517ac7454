//! Instructions and the opcode roster.
//!
//! The linearizer produces three-address-style instructions: an opcode, an
//! ordered operand list and an ordered target list, both with opcode-specific
//! fixed arity. Typed opcode forms (`AddII`, `EqFF`, `IAGetIKey`, ...) are
//! emitted by the front end when static types are known and lower to native
//! C operations; the generic forms fall back to tagged runtime dispatch.

use crate::PseudoRange;

/// Instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // Control flow
    Ret,
    Br,
    Cbr,

    // Moves and numeric coercions
    Mov,
    MovI,
    MovF,
    /// Int destination from float or any source; errors if not representable.
    MovFI,
    /// Float destination from int or any source; errors if not coercible.
    MovIF,

    // Loads: generic, key-specialized, container-typed
    LoadGlobal,
    Get,
    GetSKey,
    GetIKey,
    TGet,
    TGetSKey,
    TGetIKey,
    IAGet,
    FAGet,

    // Stores
    StoreGlobal,
    Put,
    PutSKey,
    PutIKey,
    TPut,
    TPutSKey,
    TPutIKey,
    IAPut,
    FAPut,

    // Typed array element access through the raw data pointer
    IAGetIKey,
    FAGetIKey,
    IAPutIVal,
    FAPutFVal,

    // Typed binary arithmetic
    AddFF,
    AddFI,
    AddII,
    SubFF,
    SubFI,
    SubIF,
    SubII,
    MulFF,
    MulFI,
    MulII,
    DivFF,
    DivFI,
    DivIF,
    DivII,
    BAndII,
    BOrII,
    BXorII,
    ShlII,
    ShrII,

    // Generic binary arithmetic
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    BAnd,
    BOr,
    BXor,
    Shl,
    Shr,
    Mod,
    Pow,

    // Comparisons
    Eq,
    Lt,
    Le,
    EqII,
    LtII,
    LeII,
    EqFF,
    LtFF,
    LeFF,

    // Unary
    Not,
    BNot,
    Unm,
    UnmI,
    UnmF,
    Len,
    LenI,

    // Type guards
    ToInt,
    ToFlt,
    ToIArray,
    ToFArray,
    ToTable,
    ToString,
    ToClosure,
    ToType,

    // Allocation
    NewTable,
    NewIArray,
    NewFArray,
    Closure,

    // Scope
    Close,

    // Calls
    Call,

    // Produced upstream but not compilable here
    Concat,
    Vararg,
}

impl Opcode {
    /// Lowercase mnemonic used by the IR dump and diagnostics.
    #[must_use]
    pub fn mnemonic(self) -> &'static str {
        match self {
            Opcode::Ret => "ret",
            Opcode::Br => "br",
            Opcode::Cbr => "cbr",
            Opcode::Mov => "mov",
            Opcode::MovI => "movi",
            Opcode::MovF => "movf",
            Opcode::MovFI => "movfi",
            Opcode::MovIF => "movif",
            Opcode::LoadGlobal => "loadglobal",
            Opcode::Get => "get",
            Opcode::GetSKey => "get_skey",
            Opcode::GetIKey => "get_ikey",
            Opcode::TGet => "tget",
            Opcode::TGetSKey => "tget_skey",
            Opcode::TGetIKey => "tget_ikey",
            Opcode::IAGet => "iaget",
            Opcode::FAGet => "faget",
            Opcode::StoreGlobal => "storeglobal",
            Opcode::Put => "put",
            Opcode::PutSKey => "put_skey",
            Opcode::PutIKey => "put_ikey",
            Opcode::TPut => "tput",
            Opcode::TPutSKey => "tput_skey",
            Opcode::TPutIKey => "tput_ikey",
            Opcode::IAPut => "iaput",
            Opcode::FAPut => "faput",
            Opcode::IAGetIKey => "iaget_ikey",
            Opcode::FAGetIKey => "faget_ikey",
            Opcode::IAPutIVal => "iaput_ival",
            Opcode::FAPutFVal => "faput_fval",
            Opcode::AddFF => "addff",
            Opcode::AddFI => "addfi",
            Opcode::AddII => "addii",
            Opcode::SubFF => "subff",
            Opcode::SubFI => "subfi",
            Opcode::SubIF => "subif",
            Opcode::SubII => "subii",
            Opcode::MulFF => "mulff",
            Opcode::MulFI => "mulfi",
            Opcode::MulII => "mulii",
            Opcode::DivFF => "divff",
            Opcode::DivFI => "divfi",
            Opcode::DivIF => "divif",
            Opcode::DivII => "divii",
            Opcode::BAndII => "bandii",
            Opcode::BOrII => "borii",
            Opcode::BXorII => "bxorii",
            Opcode::ShlII => "shlii",
            Opcode::ShrII => "shrii",
            Opcode::Add => "add",
            Opcode::Sub => "sub",
            Opcode::Mul => "mul",
            Opcode::Div => "div",
            Opcode::IDiv => "idiv",
            Opcode::BAnd => "band",
            Opcode::BOr => "bor",
            Opcode::BXor => "bxor",
            Opcode::Shl => "shl",
            Opcode::Shr => "shr",
            Opcode::Mod => "mod",
            Opcode::Pow => "pow",
            Opcode::Eq => "eq",
            Opcode::Lt => "lt",
            Opcode::Le => "le",
            Opcode::EqII => "eqii",
            Opcode::LtII => "ltii",
            Opcode::LeII => "leii",
            Opcode::EqFF => "eqff",
            Opcode::LtFF => "ltff",
            Opcode::LeFF => "leff",
            Opcode::Not => "not",
            Opcode::BNot => "bnot",
            Opcode::Unm => "unm",
            Opcode::UnmI => "unmi",
            Opcode::UnmF => "unmf",
            Opcode::Len => "len",
            Opcode::LenI => "leni",
            Opcode::ToInt => "toint",
            Opcode::ToFlt => "toflt",
            Opcode::ToIArray => "toiarray",
            Opcode::ToFArray => "tofarray",
            Opcode::ToTable => "totable",
            Opcode::ToString => "tostring",
            Opcode::ToClosure => "toclosure",
            Opcode::ToType => "totype",
            Opcode::NewTable => "newtable",
            Opcode::NewIArray => "newiarray",
            Opcode::NewFArray => "newfarray",
            Opcode::Closure => "closure",
            Opcode::Close => "close",
            Opcode::Call => "call",
            Opcode::Concat => "concat",
            Opcode::Vararg => "vararg",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}

/// One IR instruction: an opcode plus operand and target pseudo lists,
/// stored as ranges into the module's pseudo pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub operands: PseudoRange,
    pub targets: PseudoRange,
}
