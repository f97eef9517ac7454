//! Code generation context and state.
//!
//! The `CodegenContext` owns the output buffer and indentation state for
//! one translation unit, plus a borrow of the module's interner so
//! emitters can resolve names while writing.

use lume_ir::{Name, StringInterner};

/// Code generation context.
pub struct CodegenContext<'a> {
    /// String interner for resolving names.
    pub interner: &'a StringInterner,
    /// Current indentation level.
    indent: usize,
    /// Generated code output.
    output: String,
}

impl<'a> CodegenContext<'a> {
    /// Create a new codegen context.
    #[must_use]
    pub fn new(interner: &'a StringInterner) -> Self {
        Self {
            interner,
            indent: 0,
            output: String::with_capacity(4096),
        }
    }

    /// Resolve a name to its string representation.
    #[inline]
    #[must_use]
    pub fn resolve_name(&self, name: Name) -> &str {
        self.interner.lookup(name)
    }

    /// Increase indentation level.
    pub fn indent(&mut self) {
        self.indent += 1;
    }

    /// Decrease indentation level.
    pub fn dedent(&mut self) {
        debug_assert!(self.indent > 0, "dedent called with zero indent");
        self.indent = self.indent.saturating_sub(1);
    }

    /// Write indentation to output.
    pub fn write_indent(&mut self) {
        for _ in 0..self.indent {
            self.output.push_str("    ");
        }
    }

    /// Write a string to output.
    pub fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    /// Write a line to output (with indentation and newline).
    pub fn writeln(&mut self, s: &str) {
        self.write_indent();
        self.output.push_str(s);
        self.output.push('\n');
    }

    /// Write a newline.
    pub fn newline(&mut self) {
        self.output.push('\n');
    }

    /// Take the generated output.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}
