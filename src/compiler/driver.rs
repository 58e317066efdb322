//! Compiler driver that orchestrates the multi-stage process of compiling a
//! source file into assembly code.

use std::fs;

use crate::args::Args;
use crate::compiler::{emit, ir, lexer, mir, parser, sema};
use crate::error::{CompileError, CompileResult};

/// Stage names accepted by `-s/--stage`, in pipeline order. Compilation
/// stops after dumping the named stage.
pub const STAGES: [&str; 5] = ["tokenize", "parse", "validate", "ir", "assemble"];

/// Executes the compilation pipeline for a single source file.
///
/// # Errors
///
/// Returns an error if the input cannot be read, any compilation stage
/// fails, or the output cannot be written.
pub fn run_compiler(args: &Args) -> CompileResult<()> {
    let src = fs::read(&args.in_path).map_err(|source| CompileError::Io {
        path: args.in_path.display().to_string(),
        source,
    })?;

    if args.stage == "tokenize" || args.debug {
        if args.debug {
            println!("tokens:");
        }

        dump_tokens(&src);
        println!();

        if args.stage == "tokenize" {
            return Ok(());
        }
    }

    if args.debug {
        println!("parse:");
    }

    let mut ast = parser::parse_file(&src, args.debug)?;

    if args.stage == "parse" || args.debug {
        if args.debug {
            println!("\nast (unvalidated):");
        }

        println!("{ast:#?}");

        if args.stage == "parse" {
            return Ok(());
        }
    }

    sema::validate(&mut ast)?;

    if args.stage == "validate" || args.debug {
        if args.debug {
            println!("ast (validated):");
        }

        println!("{ast:#?}");

        if args.stage == "validate" {
            return Ok(());
        }
    }

    let ir = ir::generate_ir(&ast);

    if args.stage == "ir" || args.debug {
        if args.debug {
            println!("ir:");
        }

        print!("{ir}");

        if args.stage == "ir" {
            return Ok(());
        }
    }

    let mut mir = mir::generate_mir(&ir);

    if args.stage == "assemble" || args.debug {
        if args.debug {
            println!("assembly (unfixed):");
        }

        print!("{mir}");
    }

    mir.fix();

    if args.stage == "assemble" || args.debug {
        if args.debug {
            println!("assembly (fixed):");
        }

        print!("{mir}");

        if args.stage == "assemble" {
            return Ok(());
        }
    }

    let mut asm = vec![];
    emit::emit_x86_64_linux(&mir, &mut asm).expect("writing to a Vec cannot fail");

    if args.debug {
        println!("x86:");
        print!("{}", String::from_utf8_lossy(&asm));
    }

    fs::write(&args.out_path, &asm).map_err(|source| CompileError::Io {
        path: args.out_path.display().to_string(),
        source,
    })
}

/// Prints one line per token until end of input.
fn dump_tokens(src: &[u8]) {
    let mut scanner = lexer::Scanner::new(src);

    let mut line = 1;
    loop {
        let tok = scanner.scan();
        if tok.kind == lexer::TokenKind::Eof {
            break;
        }

        if tok.kind.is_literal() {
            println!("{line:6} {} ({})", tok.kind, tok.lit);
        } else {
            println!("{line:6} {}", tok.kind);
        }

        line += 1;
    }
}
