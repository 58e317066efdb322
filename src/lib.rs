//! Tiny ahead-of-time compiler (`minic`) for a C-like subset language,
//! targeting x86-64 Linux.
//!
//! Source text moves through a fixed pipeline, each stage consuming the
//! previous stage's tree:
//! - `lexer` turns bytes into tokens on demand.
//! - `parser` builds the abstract syntax tree.
//! - `sema` renames every local to a unique form and labels loops.
//! - `ir` flattens the tree into three-address instructions.
//! - `mir` selects virtual x86-64 instructions, then fixes stack slots and
//!   illegal operand forms.
//! - `emit` prints AT&T-syntax assembly for `gcc`/`as` to assemble.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

pub mod args;
pub mod compiler;
pub mod error;

pub use error::{CompileError, CompileResult};

/// Compiles source text into x86-64 AT&T assembly.
///
/// # Errors
///
/// Returns an error if any compilation stage rejects the program.
pub fn compile_to_x86(src: &[u8]) -> CompileResult<String> {
    let mut ast = compiler::parser::parse_file(src, false)?;
    compiler::sema::validate(&mut ast)?;

    let ir = compiler::ir::generate_ir(&ast);
    let mut mir = compiler::mir::generate_mir(&ir);
    mir.fix();

    let mut asm = vec![];
    compiler::emit::emit_x86_64_linux(&mir, &mut asm).expect("writing to a Vec cannot fail");
    Ok(String::from_utf8(asm).expect("emitted assembly should be valid UTF-8"))
}
