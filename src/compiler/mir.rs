//! Machine Intermediate Representation
//!
//! Compiler pass that lowers three-address _IR_ into virtual _x86-64_
//! instructions over pseudo-operands, then fixes the result up into
//! encodable form: pseudo-operands become stack slots, a 16-byte-aligned
//! stack allocation is prepended, and instruction forms the hardware
//! rejects are split through scratch registers.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fmt;

use crate::compiler::ir;
use crate::compiler::parser::{BinaryOp, UnaryOp};

type Ident = String;

/// Registers used for passing the first six integer arguments, in order.
const ARG_REGS: [Reg; 6] = [Reg::DI, Reg::SI, Reg::DX, Reg::CX, Reg::R8, Reg::R9];

/// _MIR x86-64_ registers (size agnostic; the emitter picks the subregister).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Reg {
    AX,
    DX,
    DI,
    SI,
    CX,
    R8,
    R9,
    /// Scratch register for rewritten source operands.
    R10,
    /// Scratch register for rewritten destination operands.
    R11,
}

/// Condition codes suffixing `set`/`j` instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CondCode {
    E,
    NE,
    G,
    GE,
    L,
    LE,
}

impl fmt::Display for CondCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = match self {
            CondCode::E => "e",
            CondCode::NE => "ne",
            CondCode::G => "g",
            CondCode::GE => "ge",
            CondCode::L => "l",
            CondCode::LE => "le",
        };
        write!(f, "{code}")
    }
}

/// _MIR_ operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Immediate value, carried as its source text.
    Imm(String),
    /// Named placeholder for a local or temporary; replaced by a stack slot
    /// during fix-up.
    Pseudo(Ident),
    /// `offset(%rbp)`. Locals are negative; stack-passed parameters
    /// positive.
    Stack(i32),
    /// Hardware register.
    Register(Reg),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Imm(v) => write!(f, "{v}"),
            Operand::Pseudo(name) => write!(f, "{name:?}"),
            Operand::Stack(offset) => write!(f, "stack({offset})"),
            Operand::Register(r) => write!(f, "%{r:?}"),
        }
    }
}

/// _MIR_ unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    /// Two's complement negation (`negl`).
    Neg,
    /// One's complement (`notl`).
    Not,
}

impl From<UnaryOp> for UnaryOperator {
    fn from(op: UnaryOp) -> UnaryOperator {
        match op {
            UnaryOp::Negate => UnaryOperator::Neg,
            UnaryOp::Complement => UnaryOperator::Not,
            UnaryOp::Not => panic!("logical not is lowered through cmp/set, not a unary opcode"),
        }
    }
}

/// _MIR_ binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    /// `addl`
    Add,
    /// `subl`
    Sub,
    /// `imull`
    Imul,
}

impl From<BinaryOp> for BinaryOperator {
    fn from(op: BinaryOp) -> BinaryOperator {
        match op {
            BinaryOp::Add => BinaryOperator::Add,
            BinaryOp::Subtract => BinaryOperator::Sub,
            BinaryOp::Multiply => BinaryOperator::Imul,
            _ => panic!("binary operator '{op}' has no direct x86 instruction"),
        }
    }
}

/// _MIR_ instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Copies the first operand into the second.
    Mov(Operand, Operand),
    /// Applies a unary operator to the operand in place.
    Unary(UnaryOperator, Operand),
    /// `Binary(op, src, dst)` computes `dst = dst op src`.
    Binary(BinaryOperator, Operand, Operand),
    /// Signed division of `edx:eax` by the operand.
    Idiv(Operand),
    /// Sign-extends `eax` into `edx:eax`.
    Cdq,
    /// `Cmp(c, v)` sets flags for `v - c`.
    Cmp(Operand, Operand),
    /// Stores the condition-code result as a byte in the operand.
    SetCC(CondCode, Operand),
    /// Unconditional jump to a label.
    Jmp(Ident),
    /// Conditional jump to a label.
    JmpCC(CondCode, Ident),
    /// Jump target.
    Label(Ident),
    /// Pushes the operand on the stack.
    Push(Operand),
    /// Subtracts the byte count from `%rsp`.
    AllocateStack(i32),
    /// Adds the byte count back to `%rsp`.
    DeallocateStack(i32),
    /// Calls a function by name.
    Call(Ident),
    /// Restores the caller's frame and returns.
    Ret,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Mov(src, dst) => write!(f, "{:<16}{src} -> {dst}", "Mov"),
            Instruction::Unary(op, v) => write!(f, "{:<16}{v}", format!("{op:?}")),
            Instruction::Binary(op, src, dst) => {
                write!(f, "{:<16}{src} -> {dst}", format!("{op:?}"))
            }
            Instruction::Idiv(v) => write!(f, "{:<16}{v}", "Idiv"),
            Instruction::Cdq => write!(f, "Cdq"),
            Instruction::Cmp(c, v) => write!(f, "{:<16}{c}, {v}", "Cmp"),
            Instruction::SetCC(code, v) => write!(f, "{:<16}{v}", format!("Set{code}")),
            Instruction::Jmp(label) => write!(f, "{:<16}{label:?}", "Jmp"),
            Instruction::JmpCC(code, label) => {
                write!(f, "{:<16}{label:?}", format!("Jmp{code}"))
            }
            Instruction::Label(label) => write!(f, "{:<16}{label:?}", "Label"),
            Instruction::Push(v) => write!(f, "{:<16}{v}", "Push"),
            Instruction::AllocateStack(n) => write!(f, "{:<16}{n}", "AllocateStack"),
            Instruction::DeallocateStack(n) => write!(f, "{:<16}{n}", "DeallocateStack"),
            Instruction::Call(func) => write!(f, "{:<16}{func}", "Call"),
            Instruction::Ret => write!(f, "Ret"),
        }
    }
}

/// _MIR_ function definition.
#[derive(Debug)]
#[allow(missing_docs)]
pub struct Function {
    pub name: Ident,
    pub instructions: Vec<Instruction>,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Function {}:", self.name)?;
        for inst in &self.instructions {
            writeln!(f, "{:4}{inst}", "")?;
        }
        Ok(())
    }
}

/// _MIR_ for a whole source file.
#[derive(Debug)]
pub struct File {
    /// Functions in declaration order.
    pub funcs: Vec<Function>,
}

impl fmt::Display for File {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for func in &self.funcs {
            write!(f, "{func}")?;
        }
        Ok(())
    }
}

impl File {
    /// Fixes every function up into encodable form: pseudo-operands become
    /// stack slots, a 16-byte-aligned `AllocateStack` is prepended, and
    /// instruction forms x86 rejects are split through scratch registers.
    pub fn fix(&mut self) {
        for func in &mut self.funcs {
            let lowest = func.replace_pseudos();
            func.rewrite_invalid_instructions();
            func.instructions
                .insert(0, Instruction::AllocateStack(round_up_to_multiple_of_16(-lowest)));
        }
    }
}

impl Function {
    /// Pass 1: assigns each pseudo-operand a 4-byte stack slot in order of
    /// first appearance and rewrites it to a `Stack` operand. Stack-passed
    /// parameters are already `Stack` operands and pass through untouched.
    /// Returns the lowest (most negative) offset assigned.
    fn replace_pseudos(&mut self) -> i32 {
        let mut offsets: HashMap<Ident, i32> = HashMap::new();
        let mut last_offset = 0;

        let mut replace = |op: &mut Operand| {
            if let Operand::Pseudo(name) = op {
                let offset = match offsets.entry(name.clone()) {
                    Entry::Occupied(entry) => *entry.get(),
                    Entry::Vacant(entry) => {
                        last_offset -= 4;
                        entry.insert(last_offset);
                        last_offset
                    }
                };
                *op = Operand::Stack(offset);
            }
        };

        for inst in &mut self.instructions {
            match inst {
                Instruction::Mov(l, r) => {
                    replace(l);
                    replace(r);
                }
                Instruction::Unary(_, v) => replace(v),
                Instruction::Binary(_, src, dst) => {
                    replace(src);
                    replace(dst);
                }
                Instruction::Idiv(v) => replace(v),
                Instruction::Cmp(c, v) => {
                    replace(c);
                    replace(v);
                }
                Instruction::SetCC(_, v) => replace(v),
                Instruction::Push(v) => replace(v),
                _ => {}
            }
        }

        last_offset
    }

    /// Pass 2: splits instruction forms the hardware rejects through the
    /// scratch registers `R10` (sources) and `R11` (destinations).
    fn rewrite_invalid_instructions(&mut self) {
        let mut i = 0;

        while i < self.instructions.len() {
            let inst = &self.instructions[i];

            match inst {
                // `mov` cannot copy memory to memory.
                Instruction::Mov(src, dst)
                    if matches!(src, Operand::Stack(_)) && matches!(dst, Operand::Stack(_)) =>
                {
                    let src = src.clone();
                    let dst = dst.clone();

                    self.instructions.splice(
                        i..=i,
                        [
                            Instruction::Mov(src, Operand::Register(Reg::R10)),
                            Instruction::Mov(Operand::Register(Reg::R10), dst),
                        ],
                    );

                    // Skip over the two replacement instructions.
                    i += 1;
                }
                // `idiv` cannot take an immediate operand.
                Instruction::Idiv(v) if matches!(v, Operand::Imm(_)) => {
                    let v = v.clone();

                    self.instructions.splice(
                        i..=i,
                        [
                            Instruction::Mov(v, Operand::Register(Reg::R10)),
                            Instruction::Idiv(Operand::Register(Reg::R10)),
                        ],
                    );

                    i += 1;
                }
                // `add`/`sub` cannot use memory for both operands.
                Instruction::Binary(op, src, dst)
                    if matches!(op, BinaryOperator::Add | BinaryOperator::Sub)
                        && matches!(src, Operand::Stack(_))
                        && matches!(dst, Operand::Stack(_)) =>
                {
                    let op = *op;
                    let src = src.clone();
                    let dst = dst.clone();

                    self.instructions.splice(
                        i..=i,
                        [
                            Instruction::Mov(src, Operand::Register(Reg::R10)),
                            Instruction::Binary(op, Operand::Register(Reg::R10), dst),
                        ],
                    );

                    i += 1;
                }
                // `imul` cannot target memory.
                Instruction::Binary(BinaryOperator::Imul, src, dst)
                    if matches!(dst, Operand::Stack(_)) =>
                {
                    let src = src.clone();
                    let dst = dst.clone();

                    self.instructions.splice(
                        i..=i,
                        [
                            Instruction::Mov(dst.clone(), Operand::Register(Reg::R11)),
                            Instruction::Binary(
                                BinaryOperator::Imul,
                                src,
                                Operand::Register(Reg::R11),
                            ),
                            Instruction::Mov(Operand::Register(Reg::R11), dst),
                        ],
                    );

                    i += 2;
                }
                // `cmp` cannot use memory for both operands.
                Instruction::Cmp(c, v)
                    if matches!(c, Operand::Stack(_)) && matches!(v, Operand::Stack(_)) =>
                {
                    let c = c.clone();
                    let v = v.clone();

                    self.instructions.splice(
                        i..=i,
                        [
                            Instruction::Mov(c, Operand::Register(Reg::R10)),
                            Instruction::Cmp(Operand::Register(Reg::R10), v),
                        ],
                    );

                    i += 1;
                }
                // `cmp` cannot take an immediate second operand.
                Instruction::Cmp(c, v) if matches!(v, Operand::Imm(_)) => {
                    let c = c.clone();
                    let v = v.clone();

                    self.instructions.splice(
                        i..=i,
                        [
                            Instruction::Mov(v, Operand::Register(Reg::R11)),
                            Instruction::Cmp(c, Operand::Register(Reg::R11)),
                        ],
                    );

                    i += 1;
                }
                _ => {}
            }

            i += 1;
        }
    }
}

fn round_up_to_multiple_of_16(n: i32) -> i32 {
    let remainder = n % 16;
    if remainder == 0 {
        return n;
    }
    n + (16 - remainder)
}

/// Lowers _IR_ into virtual _x86-64_ assembly. The result still contains
/// pseudo-operands; [`File::fix`] must run before emission.
pub fn generate_mir(ir: &ir::File) -> File {
    File {
        funcs: ir.funcs.iter().map(lower_function).collect(),
    }
}

fn lower_function(func: &ir::Function) -> Function {
    let mut instructions = vec![];

    // Receive parameters per the System V convention: the first six arrive
    // in registers, the rest above the saved frame pointer.
    for (i, param) in func.params.iter().enumerate() {
        let src = if i < ARG_REGS.len() {
            Operand::Register(ARG_REGS[i])
        } else {
            Operand::Stack(16 + 8 * (i - ARG_REGS.len()) as i32)
        };
        instructions.push(Instruction::Mov(src, Operand::Pseudo(param.clone())));
    }

    for inst in &func.instructions {
        lower_instruction(inst, &mut instructions);
    }

    Function {
        name: func.name.clone(),
        instructions,
    }
}

fn lower_instruction(inst: &ir::Instruction, instructions: &mut Vec<Instruction>) {
    match inst {
        ir::Instruction::Ret(v) => {
            instructions.push(Instruction::Mov(operand(v), Operand::Register(Reg::AX)));
            instructions.push(Instruction::Ret);
        }
        // `!v` has no single instruction: compare against zero and store the
        // flag byte.
        ir::Instruction::Unary {
            op: UnaryOp::Not,
            src,
            dst,
        } => {
            let dst = operand(dst);

            instructions.push(Instruction::Cmp(Operand::Imm("0".into()), operand(src)));
            instructions.push(Instruction::Mov(Operand::Imm("0".into()), dst.clone()));
            instructions.push(Instruction::SetCC(CondCode::E, dst));
        }
        ir::Instruction::Unary { op, src, dst } => {
            let dst = operand(dst);

            instructions.push(Instruction::Mov(operand(src), dst.clone()));
            instructions.push(Instruction::Unary((*op).into(), dst));
        }
        ir::Instruction::Binary { op, v1, v2, dst } => {
            lower_binary(*op, v1, v2, dst, instructions);
        }
        ir::Instruction::Copy { src, dst } => {
            instructions.push(Instruction::Mov(operand(src), operand(dst)));
        }
        ir::Instruction::Jump(label) => {
            instructions.push(Instruction::Jmp(label.clone()));
        }
        ir::Instruction::JumpIfZero { cond, target } => {
            instructions.push(Instruction::Cmp(Operand::Imm("0".into()), operand(cond)));
            instructions.push(Instruction::JmpCC(CondCode::E, target.clone()));
        }
        ir::Instruction::JumpIfNotZero { cond, target } => {
            instructions.push(Instruction::Cmp(Operand::Imm("0".into()), operand(cond)));
            instructions.push(Instruction::JmpCC(CondCode::NE, target.clone()));
        }
        ir::Instruction::Call { func, args, dst } => {
            lower_call(func, args, dst, instructions);
        }
        ir::Instruction::Label(label) => {
            instructions.push(Instruction::Label(label.clone()));
        }
    }
}

fn lower_binary(
    op: BinaryOp,
    v1: &ir::Value,
    v2: &ir::Value,
    dst: &ir::Value,
    instructions: &mut Vec<Instruction>,
) {
    let dst = operand(dst);

    match op {
        // Division leaves the quotient in `eax` and the remainder in `edx`.
        BinaryOp::Divide | BinaryOp::Modulo => {
            instructions.push(Instruction::Mov(operand(v1), Operand::Register(Reg::AX)));
            instructions.push(Instruction::Cdq);
            instructions.push(Instruction::Idiv(operand(v2)));

            let result = if op == BinaryOp::Divide {
                Reg::AX
            } else {
                Reg::DX
            };
            instructions.push(Instruction::Mov(Operand::Register(result), dst));
        }
        BinaryOp::Eq
        | BinaryOp::NotEq
        | BinaryOp::Less
        | BinaryOp::LessEq
        | BinaryOp::Greater
        | BinaryOp::GreaterEq => {
            instructions.push(Instruction::Cmp(operand(v2), operand(v1)));
            instructions.push(Instruction::Mov(Operand::Imm("0".into()), dst.clone()));
            instructions.push(Instruction::SetCC(cond_code(op), dst));
        }
        BinaryOp::LogAnd | BinaryOp::LogOr => {
            panic!("short-circuit operators should have been lowered to jumps in IR")
        }
        _ => {
            instructions.push(Instruction::Mov(operand(v1), dst.clone()));
            // dst = dst op v2
            instructions.push(Instruction::Binary(op.into(), operand(v2), dst));
        }
    }
}

fn lower_call(
    func: &str,
    args: &[ir::Value],
    dst: &ir::Value,
    instructions: &mut Vec<Instruction>,
) {
    // `call` requires %rsp to be 16-byte aligned. Each argument accounts for
    // 8 bytes, so an odd count needs 8 bytes of padding first.
    let padding = if args.len() % 2 == 1 { 8 } else { 0 };
    if padding != 0 {
        instructions.push(Instruction::AllocateStack(padding));
    }

    let reg_count = args.len().min(ARG_REGS.len());
    let (reg_args, stack_args) = args.split_at(reg_count);

    for (arg, reg) in reg_args.iter().zip(ARG_REGS) {
        instructions.push(Instruction::Mov(operand(arg), Operand::Register(reg)));
    }

    // Pushed last-to-first so the seventh argument ends up at 16(%rbp) in
    // the callee. `pushq` cannot take a 4-byte memory operand, so those are
    // staged through AX.
    for arg in stack_args.iter().rev() {
        let op = operand(arg);
        match op {
            Operand::Imm(_) | Operand::Register(_) => {
                instructions.push(Instruction::Push(op));
            }
            _ => {
                instructions.push(Instruction::Mov(op, Operand::Register(Reg::AX)));
                instructions.push(Instruction::Push(Operand::Register(Reg::AX)));
            }
        }
    }

    instructions.push(Instruction::Call(func.to_string()));

    // Deallocates as if every argument had been pushed, counting register
    // arguments too.
    instructions.push(Instruction::DeallocateStack(
        8 * args.len() as i32 + padding,
    ));
    instructions.push(Instruction::Mov(Operand::Register(Reg::AX), operand(dst)));
}

fn operand(value: &ir::Value) -> Operand {
    match value {
        ir::Value::Const(v) => Operand::Imm(v.clone()),
        ir::Value::Var(name) => Operand::Pseudo(name.clone()),
    }
}

fn cond_code(op: BinaryOp) -> CondCode {
    match op {
        BinaryOp::Eq => CondCode::E,
        BinaryOp::NotEq => CondCode::NE,
        BinaryOp::Less => CondCode::L,
        BinaryOp::LessEq => CondCode::LE,
        BinaryOp::Greater => CondCode::G,
        BinaryOp::GreaterEq => CondCode::GE,
        _ => panic!("binary operator '{op}' is not a comparison"),
    }
}
