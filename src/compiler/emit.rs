//! Code Emission
//!
//! Compiler pass that serializes fixed _MIR_ into _gas_-compatible AT&T
//! assembly text for x86-64 Linux.

use std::io::{self, BufWriter, Write};

use crate::compiler::mir::{self, BinaryOperator, Operand, Reg, UnaryOperator};

/// Emits AT&T-syntax assembly for the whole file to `writer`, ending with
/// the note section that marks the stack non-executable.
///
/// # Errors
///
/// Returns an error if the assembly text could not be written.
pub fn emit_x86_64_linux<W: Write>(file: &mir::File, writer: W) -> io::Result<()> {
    let mut writer = BufWriter::new(writer);

    for func in &file.funcs {
        emit_function(func, &mut writer)?;
    }

    writeln!(writer, "\t.section .note.GNU-stack,\"\",@progbits")?;
    writer.flush()
}

fn emit_function<W: Write>(func: &mir::Function, writer: &mut BufWriter<W>) -> io::Result<()> {
    writeln!(writer, "\t.global {}", func.name)?;
    writeln!(writer, "{}:", func.name)?;

    // Prologue: save the caller's frame base and start a new frame at the
    // current stack pointer.
    writeln!(writer, "\tpushq %rbp")?;
    writeln!(writer, "\tmovq %rsp, %rbp")?;

    for inst in &func.instructions {
        emit_instruction(inst, writer)?;
    }

    Ok(())
}

fn emit_instruction<W: Write>(
    inst: &mir::Instruction,
    writer: &mut BufWriter<W>,
) -> io::Result<()> {
    match inst {
        mir::Instruction::Mov(src, dst) => {
            writeln!(writer, "\tmovl {}, {}", emit_operand(src), emit_operand(dst))
        }
        mir::Instruction::Unary(op, v) => {
            let inst = match op {
                UnaryOperator::Neg => "negl",
                UnaryOperator::Not => "notl",
            };
            writeln!(writer, "\t{inst} {}", emit_operand(v))
        }
        mir::Instruction::Binary(op, src, dst) => {
            let inst = match op {
                BinaryOperator::Add => "addl",
                BinaryOperator::Sub => "subl",
                BinaryOperator::Imul => "imull",
            };
            writeln!(writer, "\t{inst} {}, {}", emit_operand(src), emit_operand(dst))
        }
        mir::Instruction::Idiv(v) => writeln!(writer, "\tidiv {}", emit_operand(v)),
        mir::Instruction::Cdq => writeln!(writer, "\tcdq"),
        mir::Instruction::Cmp(c, v) => {
            writeln!(writer, "\tcmpl {}, {}", emit_operand(c), emit_operand(v))
        }
        mir::Instruction::SetCC(code, v) => {
            writeln!(writer, "\tset{code} {}", emit_operand(v))
        }
        // `.L` is the local-label prefix on Linux; these never reach the
        // object file's symbol table.
        mir::Instruction::Jmp(label) => writeln!(writer, "\tjmp .L{label}"),
        mir::Instruction::JmpCC(code, label) => writeln!(writer, "\tj{code} .L{label}"),
        mir::Instruction::Label(label) => writeln!(writer, ".L{label}:"),
        mir::Instruction::Push(v) => writeln!(writer, "\tpushq {}", emit_operand_8(v)),
        mir::Instruction::AllocateStack(n) => writeln!(writer, "\tsubq ${n}, %rsp"),
        mir::Instruction::DeallocateStack(n) => writeln!(writer, "\taddq ${n}, %rsp"),
        mir::Instruction::Call(func) => writeln!(writer, "\tcall {func}"),
        // Epilogue: restore the caller's stack pointer and frame base before
        // returning.
        mir::Instruction::Ret => {
            writeln!(writer, "\tmovq %rbp, %rsp")?;
            writeln!(writer, "\tpopq %rbp")?;
            writeln!(writer, "\tret")
        }
    }
}

/// Renders an operand in its 32-bit form.
fn emit_operand(op: &Operand) -> String {
    match op {
        Operand::Imm(v) => format!("${v}"),
        Operand::Register(r) => register_name(*r, 4).to_string(),
        Operand::Stack(offset) => format!("{offset}(%rbp)"),
        // The fixer removes every pseudo-operand; one surviving to emission
        // is a compiler bug.
        Operand::Pseudo(name) => panic!("emit: pseudo operand '{name}' survived fix-up"),
    }
}

/// Renders an operand in its 64-bit form, for `pushq`.
fn emit_operand_8(op: &Operand) -> String {
    match op {
        Operand::Register(r) => register_name(*r, 8).to_string(),
        _ => emit_operand(op),
    }
}

fn register_name(reg: Reg, size: u8) -> &'static str {
    match (reg, size) {
        (Reg::AX, 4) => "%eax",
        (Reg::AX, 8) => "%rax",
        (Reg::DX, 4) => "%edx",
        (Reg::DX, 8) => "%rdx",
        (Reg::DI, 4) => "%edi",
        (Reg::DI, 8) => "%rdi",
        (Reg::SI, 4) => "%esi",
        (Reg::SI, 8) => "%rsi",
        (Reg::CX, 4) => "%ecx",
        (Reg::CX, 8) => "%rcx",
        (Reg::R8, 4) => "%r8d",
        (Reg::R8, 8) => "%r8",
        (Reg::R9, 4) => "%r9d",
        (Reg::R9, 8) => "%r9",
        (Reg::R10, 4) => "%r10d",
        (Reg::R10, 8) => "%r10",
        (Reg::R11, 4) => "%r11d",
        (Reg::R11, 8) => "%r11",
        (reg, size) => panic!("emit: unsupported size {size} for register {reg:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::mir::{CondCode, Instruction};

    fn emit(file: &mir::File) -> String {
        let mut buf = vec![];
        emit_x86_64_linux(file, &mut buf).expect("emission should succeed");
        String::from_utf8(buf).expect("emitted assembly should be UTF-8")
    }

    fn single_function(instructions: Vec<Instruction>) -> mir::File {
        mir::File {
            funcs: vec![mir::Function {
                name: "main".into(),
                instructions,
            }],
        }
    }

    #[test]
    fn emit_function_boilerplate() {
        let file = single_function(vec![
            Instruction::AllocateStack(0),
            Instruction::Mov(Operand::Imm("10".into()), Operand::Register(Reg::AX)),
            Instruction::Ret,
        ]);

        assert_eq!(
            emit(&file),
            "\t.global main\n\
             main:\n\
             \tpushq %rbp\n\
             \tmovq %rsp, %rbp\n\
             \tsubq $0, %rsp\n\
             \tmovl $10, %eax\n\
             \tmovq %rbp, %rsp\n\
             \tpopq %rbp\n\
             \tret\n\
             \t.section .note.GNU-stack,\"\",@progbits\n"
        );
    }

    #[test]
    fn emit_stack_operands_signed() {
        let file = single_function(vec![Instruction::Mov(
            Operand::Stack(16),
            Operand::Stack(-4),
        )]);
        assert!(emit(&file).contains("\tmovl 16(%rbp), -4(%rbp)\n"));
    }

    #[test]
    fn emit_labels_and_jumps_use_local_prefix() {
        let file = single_function(vec![
            Instruction::JmpCC(CondCode::NE, "or_true.0".into()),
            Instruction::Jmp("or_end.1".into()),
            Instruction::Label("or_true.0".into()),
        ]);

        let out = emit(&file);
        assert!(out.contains("\tjne .Lor_true.0\n"));
        assert!(out.contains("\tjmp .Lor_end.1\n"));
        assert!(out.contains(".Lor_true.0:\n"));
    }

    #[test]
    fn emit_setcc_codes() {
        let file = single_function(vec![
            Instruction::SetCC(CondCode::E, Operand::Stack(-4)),
            Instruction::SetCC(CondCode::GE, Operand::Stack(-8)),
        ]);

        let out = emit(&file);
        assert!(out.contains("\tsete -4(%rbp)\n"));
        assert!(out.contains("\tsetge -8(%rbp)\n"));
    }

    #[test]
    fn emit_push_uses_64_bit_register() {
        let file = single_function(vec![
            Instruction::Push(Operand::Register(Reg::AX)),
            Instruction::Push(Operand::Imm("7".into())),
        ]);

        let out = emit(&file);
        assert!(out.contains("\tpushq %rax\n"));
        assert!(out.contains("\tpushq $7\n"));
    }

    #[test]
    fn emit_call_and_stack_adjustment() {
        let file = single_function(vec![
            Instruction::AllocateStack(8),
            Instruction::Mov(Operand::Imm("5".into()), Operand::Register(Reg::DI)),
            Instruction::Call("addTen".into()),
            Instruction::DeallocateStack(16),
        ]);

        let out = emit(&file);
        assert!(out.contains("\tsubq $8, %rsp\n"));
        assert!(out.contains("\tmovl $5, %edi\n"));
        assert!(out.contains("\tcall addTen\n"));
        assert!(out.contains("\taddq $16, %rsp\n"));
    }

    #[test]
    fn emit_is_deterministic() {
        let file = single_function(vec![
            Instruction::AllocateStack(16),
            Instruction::Mov(Operand::Imm("2".into()), Operand::Stack(-4)),
            Instruction::Unary(UnaryOperator::Neg, Operand::Stack(-4)),
            Instruction::Mov(Operand::Stack(-4), Operand::Register(Reg::AX)),
            Instruction::Ret,
        ]);

        assert_eq!(emit(&file), emit(&file));
    }

    #[test]
    #[should_panic(expected = "survived fix-up")]
    fn emit_pseudo_operand_is_a_bug() {
        let file = single_function(vec![Instruction::Mov(
            Operand::Pseudo("tmp.0".into()),
            Operand::Register(Reg::AX),
        )]);
        let _ = emit(&file);
    }
}
