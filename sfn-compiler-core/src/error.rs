//! Compile-time error kinds (spec §7).

use thiserror::Error;

/// Every error the compiler can raise while lowering one state machine.
///
/// Compilation of a single machine aborts on the first error; other
/// machines registered in the same process are unaffected (the caller
/// drives that isolation by compiling one function at a time).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("unsupported syntax: {repr}")]
    UnsupportedSyntax { repr: String },

    #[error("unknown callee `{name}`")]
    UnknownCallee { name: String },

    #[error("arity mismatch: expected {expected} output field(s), got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("unsupported condition test: {repr}")]
    UnsupportedTest { repr: String },

    #[error("multiple compute units registered with the same name: {name}")]
    DuplicateRegistration { name: String },

    #[error("with-scope misuse: {reason}")]
    WithScopeMisuse { reason: String },

    #[error("unsupported exception type: {name} (only `Exception` catch-all is supported)")]
    UnsupportedExceptionType { name: String },

    #[error("variable `{name}` read before it was written in any enclosing scope")]
    UndefinedVariable { name: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("function-attribute collection failed: {0}")]
    Attributes(String),

    #[error("I/O error writing build artifact: {0}")]
    Io(String),

    #[error("foreign compute-unit schema load failed: {0}")]
    SchemaLoad(String),
}

pub type CompileResult<T> = Result<T, CompileError>;
