//! Static type annotations carried on symbols and upvalue descriptors.
//!
//! Lume is dynamically typed, but the front end narrows variables that carry
//! annotations (`x: int`, `a: int[]`, ...). A [`TypeSet`] records which
//! runtime shapes a variable may hold; the code generator consults it to pick
//! native fast paths over tagged dispatch.

use bitflags::bitflags;

bitflags! {
    /// Set of runtime value shapes a variable may take.
    ///
    /// A singleton set is a precise static type; [`TypeSet::ANY`] means the
    /// variable is fully dynamic.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeSet: u16 {
        const NIL = 1 << 0;
        const FALSE = 1 << 1;
        const TRUE = 1 << 2;
        const INTEGER = 1 << 3;
        const FLOAT = 1 << 4;
        const INT_ARRAY = 1 << 5;
        const FLT_ARRAY = 1 << 6;
        const TABLE = 1 << 7;
        const STRING = 1 << 8;
        const CLOSURE = 1 << 9;
        const USERDATA = 1 << 10;

        /// Both boolean shapes.
        const BOOLEAN = Self::FALSE.bits() | Self::TRUE.bits();
        /// Either numeric shape.
        const NUMBER = Self::INTEGER.bits() | Self::FLOAT.bits();
        /// Fully dynamic.
        const ANY = Self::NIL.bits()
            | Self::BOOLEAN.bits()
            | Self::NUMBER.bits()
            | Self::INT_ARRAY.bits()
            | Self::FLT_ARRAY.bits()
            | Self::TABLE.bits()
            | Self::STRING.bits()
            | Self::CLOSURE.bits()
            | Self::USERDATA.bits();
    }
}

impl TypeSet {
    /// Precisely a native integer.
    #[must_use]
    pub fn is_integer(self) -> bool {
        self == TypeSet::INTEGER
    }

    /// Precisely a native float.
    #[must_use]
    pub fn is_float(self) -> bool {
        self == TypeSet::FLOAT
    }

    /// Only boolean shapes (true, false, or either).
    #[must_use]
    pub fn is_boolean(self) -> bool {
        !self.is_empty() && TypeSet::BOOLEAN.contains(self)
    }

    /// Precisely an integer array.
    #[must_use]
    pub fn is_int_array(self) -> bool {
        self == TypeSet::INT_ARRAY
    }

    /// Precisely a float array.
    #[must_use]
    pub fn is_flt_array(self) -> bool {
        self == TypeSet::FLT_ARRAY
    }

    /// Precisely a table.
    #[must_use]
    pub fn is_table(self) -> bool {
        self == TypeSet::TABLE
    }

    /// Precisely a string.
    #[must_use]
    pub fn is_string(self) -> bool {
        self == TypeSet::STRING
    }

    /// Precisely a closure.
    #[must_use]
    pub fn is_closure(self) -> bool {
        self == TypeSet::CLOSURE
    }

    /// Precisely a user-defined type.
    #[must_use]
    pub fn is_userdata(self) -> bool {
        self == TypeSet::USERDATA
    }

    /// Fully dynamic (no static information).
    #[must_use]
    pub fn is_any(self) -> bool {
        self == TypeSet::ANY
    }
}

impl Default for TypeSet {
    fn default() -> Self {
        TypeSet::ANY
    }
}

impl std::fmt::Display for TypeSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_any() {
            return f.write_str("any");
        }
        if self.is_empty() {
            return f.write_str("none");
        }
        let mut first = true;
        let mut put = |f: &mut std::fmt::Formatter<'_>, s: &str| {
            if !first {
                f.write_str("|")?;
            }
            first = false;
            f.write_str(s)
        };
        let mut rest = *self;
        if rest.contains(TypeSet::BOOLEAN) {
            put(f, "bool")?;
            rest.remove(TypeSet::BOOLEAN);
        }
        for (flag, name) in [
            (TypeSet::NIL, "nil"),
            (TypeSet::FALSE, "false"),
            (TypeSet::TRUE, "true"),
            (TypeSet::INTEGER, "int"),
            (TypeSet::FLOAT, "flt"),
            (TypeSet::INT_ARRAY, "iarr"),
            (TypeSet::FLT_ARRAY, "farr"),
            (TypeSet::TABLE, "tab"),
            (TypeSet::STRING, "str"),
            (TypeSet::CLOSURE, "fn"),
            (TypeSet::USERDATA, "user"),
        ] {
            if rest.contains(flag) {
                put(f, name)?;
            }
        }
        Ok(())
    }
}
