//! C code generation back end for Lume.
//!
//! Consumes a linearized [`lume_ir::Module`] and produces one freestanding
//! C translation unit that runs against the Lume runtime:
//!
//! ```text
//! lume_ir::Module
//!        ↓
//!     CCodegen        (runtime ABI header + one C function per proc)
//!        ↓
//!   CodegenResult     (C source + any errors)
//! ```
//!
//! Generated functions follow the interpreter's calling convention: they
//! receive a `lume_State *`, address the frame through pointers cached from
//! the current call frame, and return through the shared tail in the exit
//! block. The emitted source has no includes beyond the embedded ABI header
//! and is compiled by the host with any C compiler.

mod c;
mod context;

use std::path::Path;

use lume_ir::Module;

pub use c::{CCodegen, ABI_VERSION, RUNTIME_HEADER, VALUE_SIZE};
pub use context::CodegenContext;

/// Result of code generation.
#[derive(Debug, Default)]
pub struct CodegenResult {
    /// Generated C code (empty if errors occurred).
    pub code: String,
    /// Errors encountered during codegen.
    pub errors: Vec<CodegenError>,
    /// Whether codegen succeeded.
    pub success: bool,
}

impl CodegenResult {
    /// Create a successful result with generated code.
    #[must_use]
    pub fn success(code: String) -> Self {
        Self {
            code,
            errors: Vec::new(),
            success: true,
        }
    }

    /// Create an error result.
    #[must_use]
    pub fn error(err: CodegenError) -> Self {
        Self {
            code: String::new(),
            errors: vec![err],
            success: false,
        }
    }

    /// Check if codegen failed.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.success || !self.errors.is_empty()
    }
}

/// A code generation error.
///
/// These are compiler-author-facing: a well-formed module produced by the
/// front end never triggers them. Runtime failures of the generated code
/// (bad coercions, out-of-bounds writes) are a different animal and travel
/// through the runtime's raise mechanism instead.
#[derive(Debug)]
pub enum CodegenError {
    /// The instruction stream contains an opcode this back end does not
    /// lower (e.g. string concatenation, which the front end is expected
    /// to rewrite into calls).
    UnsupportedOpcode { mnemonic: &'static str },
    /// An instruction's operand or target list does not have the shape
    /// its opcode requires.
    InvalidOperands {
        opcode: &'static str,
        detail: String,
    },
    /// Violated internal assumption; always a bug.
    Internal(String),
    /// Writing the finished translation unit failed.
    Io(std::io::Error),
}

impl std::fmt::Display for CodegenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedOpcode { mnemonic } => {
                write!(f, "opcode `{mnemonic}` is not supported by the C back end")
            }
            Self::InvalidOperands { opcode, detail } => {
                write!(f, "invalid operands for `{opcode}`: {detail}")
            }
            Self::Internal(message) => write!(f, "internal codegen error: {message}"),
            Self::Io(err) => write!(f, "failed to write generated code: {err}"),
        }
    }
}

impl std::error::Error for CodegenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CodegenError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

/// Diagnostic callbacks for one generation run.
///
/// Hosts embedding the compiler can route these into their own logging;
/// [`TraceReporter`] forwards to the `tracing` macros.
pub trait Reporter {
    fn debug(&self, message: &str);
    fn error(&self, message: &str);
}

/// Default [`Reporter`] backed by `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceReporter;

impl Reporter for TraceReporter {
    fn debug(&self, message: &str) {
        tracing::debug!(target: "lume_codegen", "{message}");
    }

    fn error(&self, message: &str) {
        tracing::error!(target: "lume_codegen", "{message}");
    }
}

/// Host-supplied parameters for one generation run.
pub struct GenInterface<'a> {
    /// Name of the compiled chunk; appears in the banner comment of the
    /// generated file and in diagnostics.
    pub source_name: &'a str,
    /// Name of the exported closure factory. Embedders look this symbol up
    /// in the compiled shared object.
    pub main_name: &'a str,
    /// Diagnostic sink.
    pub reporter: &'a dyn Reporter,
}

impl<'a> GenInterface<'a> {
    /// Interface with the default export name and `tracing`-backed
    /// reporting.
    #[must_use]
    pub fn default_for(source_name: &'a str) -> Self {
        Self {
            source_name,
            main_name: "lume_setup",
            reporter: &TraceReporter,
        }
    }
}

/// Generate a C translation unit for `module`.
pub fn generate(module: &Module, interface: &GenInterface<'_>) -> CodegenResult {
    CCodegen::new(module, interface).generate()
}

/// Generate and write the translation unit straight to `path`.
///
/// Convenience for driver tools. Surfaces the first generation error, or
/// the I/O error from the write.
pub fn generate_to_file(module: &Module, main_name: &str, path: &Path) -> Result<(), CodegenError> {
    let source_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("out.c");
    let interface = GenInterface {
        source_name,
        main_name,
        reporter: &TraceReporter,
    };
    let mut result = generate(module, &interface);
    if result.has_errors() {
        let err = result
            .errors
            .drain(..)
            .next()
            .unwrap_or_else(|| CodegenError::Internal("generation failed with no recorded error".into()));
        return Err(err);
    }
    std::fs::write(path, result.code)?;
    Ok(())
}
