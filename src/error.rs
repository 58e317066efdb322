//! Error types and macros for the compiler.
//!
//! Every failure the pipeline can report is a variant of [`CompileError`].
//! Compilation stops at the first error; there is no recovery or error
//! collection, so each variant carries just enough context for a one-line
//! diagnostic naming the offending token or identifier.

use snafu::Snafu;

/// Result alias used across the compilation pipeline.
pub type CompileResult<T> = Result<T, CompileError>;

/// A fatal compilation error.
#[derive(Debug, Snafu)]
pub enum CompileError {
    /// The scanner produced an `ILLEGAL` token and a later stage consumed it.
    #[snafu(display("scan: illegal token '{token}'"))]
    IllegalToken {
        /// Source text of the offending token.
        token: String,
    },

    /// The parser met a token other than the one the grammar requires.
    #[snafu(display("parse: unexpected token '{found}', expected '{expected}'"))]
    UnexpectedToken {
        /// Canonical spelling of the required token.
        expected: String,
        /// Text of the token actually found.
        found: String,
    },

    /// A function parameter used a type other than `int`.
    #[snafu(display("parse: unsupported parameter type '{name}'"))]
    UnsupportedType {
        /// The rejected type name.
        name: String,
    },

    /// A construct other than a function declaration appeared at file
    /// scope.
    #[snafu(display("parse: unsupported top-level declaration at '{found}'"))]
    UnsupportedTopLevelDecl {
        /// Text of the offending token.
        found: String,
    },

    /// A variable reference has no matching declaration in any enclosing
    /// scope.
    #[snafu(display("validate: undeclared variable '{name}'"))]
    UndeclaredVariable {
        /// The unresolved source name.
        name: String,
    },

    /// A name was declared twice in the same scope.
    #[snafu(display("validate: duplicate declaration of '{name}'"))]
    DuplicateDeclaration {
        /// The redeclared source name.
        name: String,
    },

    /// The left side of an assignment is not a variable reference.
    #[snafu(display("validate: assignment target must be a variable"))]
    InvalidAssignTarget,

    /// A `break` or `continue` appeared outside any loop.
    #[snafu(display("validate: '{stmt}' outside of a loop"))]
    NotInLoop {
        /// The offending statement keyword.
        stmt: String,
    },

    /// A file could not be read or written.
    #[snafu(display("{path}: {source}"))]
    Io {
        /// Path of the file involved.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Prints the provided error message to `stderr`.
#[macro_export]
macro_rules! print_err {
    // General error reporting: prints program name and error message.
    ($program:expr, $($arg:tt)+) => {{
        eprintln!("\x1b[1;1m{}\x1b[0m: \x1b[1;31merror:\x1b[0m {}", $program, format!($($arg)+));
    }};
}
