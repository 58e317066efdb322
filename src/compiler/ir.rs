//! Intermediate Representation
//!
//! Compiler pass that lowers a validated _AST_ into a per-function linear
//! sequence of three-address instructions. Structured control flow is
//! flattened to labels and jumps; every non-trivial sub-expression lands in
//! a fresh temporary.

use std::fmt;

use crate::compiler::parser::{self, BinaryOp, UnaryOp};

type Ident = String;

/// _IR_ values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Constant, carried as its source text.
    Const(String),
    /// Named variable or temporary.
    Var(Ident),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Const(v) => write!(f, "{v}"),
            Value::Var(name) => write!(f, "{name:?}"),
        }
    }
}

/// _IR_ instructions.
#[derive(Debug, PartialEq, Eq)]
pub enum Instruction {
    /// Returns a value to the caller.
    Ret(Value),
    /// Applies a unary operation to `src`, storing the result in `dst`.
    #[allow(missing_docs)]
    Unary { op: UnaryOp, src: Value, dst: Value },
    /// Applies a binary operation to `v1` and `v2`, storing the result in
    /// `dst`.
    #[allow(missing_docs)]
    Binary {
        op: BinaryOp,
        v1: Value,
        v2: Value,
        dst: Value,
    },
    /// Copies `src` into `dst`.
    #[allow(missing_docs)]
    Copy { src: Value, dst: Value },
    /// Unconditional jump to a label.
    Jump(Ident),
    /// Jumps to `target` if `cond` is zero.
    #[allow(missing_docs)]
    JumpIfZero { cond: Value, target: Ident },
    /// Jumps to `target` if `cond` is non-zero.
    #[allow(missing_docs)]
    JumpIfNotZero { cond: Value, target: Ident },
    /// Calls `func` with ordered arguments, storing the result in `dst`.
    #[allow(missing_docs)]
    Call {
        func: Ident,
        args: Vec<Value>,
        dst: Value,
    },
    /// Marks a position in the instruction list as a jump target.
    Label(Ident),
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Ret(v) => write!(f, "{:<16}{v}", "Ret"),
            Instruction::Unary { op, src, dst } => {
                write!(f, "{:<16}{src} -> {dst}", format!("Unary({op})"))
            }
            Instruction::Binary { op, v1, v2, dst } => {
                write!(f, "{:<16}{v1}, {v2} -> {dst}", format!("Binary({op})"))
            }
            Instruction::Copy { src, dst } => write!(f, "{:<16}{src} -> {dst}", "Copy"),
            Instruction::Jump(label) => write!(f, "{:<16}{label:?}", "Jump"),
            Instruction::JumpIfZero { cond, target } => {
                write!(f, "{:<16}{cond} -> {target:?}", "JumpIfZero")
            }
            Instruction::JumpIfNotZero { cond, target } => {
                write!(f, "{:<16}{cond} -> {target:?}", "JumpIfNotZero")
            }
            Instruction::Call { func, args, dst } => {
                write!(f, "{:<16}{func}(", "Call")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ") -> {dst}")
            }
            Instruction::Label(label) => write!(f, "{:<16}{label:?}", "Label"),
        }
    }
}

/// _IR_ function definition.
#[derive(Debug)]
#[allow(missing_docs)]
pub struct Function {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub instructions: Vec<Instruction>,
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Function {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param:?}")?;
        }
        writeln!(f, "):")?;

        for inst in &self.instructions {
            writeln!(f, "{:4}{inst}", "")?;
        }

        Ok(())
    }
}

/// _IR_ for a whole source file.
#[derive(Debug)]
pub struct File {
    /// Lowered functions in declaration order.
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

/// Helper for lowering nested _AST_ expressions into three-address
/// instructions. Temporaries and labels are minted from one counter shared
/// across the whole file.
#[derive(Default)]
struct Lowerer {
    instructions: Vec<Instruction>,
    counter: usize,
}

impl Lowerer {
    /// Allocates a fresh temporary. The `.` guarantees no collision with
    /// user identifiers, which cannot contain one.
    fn new_tmp(&mut self) -> Ident {
        let ident = format!("tmp.{}", self.counter);
        self.counter += 1;
        ident
    }

    /// Allocates a fresh label with a family prefix (`else`, `and_false`, …).
    fn new_label(&mut self, family: &str) -> Ident {
        let label = format!("{family}.{}", self.counter);
        self.counter += 1;
        label
    }

    fn emit(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }
}

/// Lowers a validated _AST_ into _IR_.
pub fn generate_ir(file: &parser::File) -> File {
    let mut lowerer = Lowerer::default();

    let mut funcs = vec![];
    for decl in &file.decls {
        let parser::Decl::Func(func) = decl;
        funcs.push(lower_function(func, &mut lowerer));
    }

    File { funcs }
}

fn lower_function(func: &parser::FuncDecl, lowerer: &mut Lowerer) -> Function {
    for stmt in &func.body {
        lower_stmt(stmt, lowerer);
    }

    Function {
        name: func.name.clone(),
        params: func.params.clone(),
        instructions: std::mem::take(&mut lowerer.instructions),
    }
}

// Statements.

fn lower_stmt(stmt: &parser::Stmt, lowerer: &mut Lowerer) {
    match stmt {
        parser::Stmt::Block(stmts) => {
            for stmt in stmts {
                lower_stmt(stmt, lowerer);
            }
        }
        parser::Stmt::Return(expr) => {
            let value = lower_expr(expr, lowerer);
            lowerer.emit(Instruction::Ret(value));
        }
        parser::Stmt::Expr(expr) => {
            // The result is discarded; only the side-effect instructions
            // remain.
            let _ = lower_expr(expr, lowerer);
        }
        // `let x = e` lowers exactly like `x = e`; unique renaming has
        // already ruled out collisions.
        parser::Stmt::Decl(decl) => {
            let src = lower_expr(&decl.init, lowerer);
            lowerer.emit(Instruction::Copy {
                src,
                dst: Value::Var(decl.name.clone()),
            });
        }
        parser::Stmt::If {
            cond,
            then,
            opt_else,
        } => {
            let else_label = lowerer.new_label("else");
            let end_label = lowerer.new_label("if_end");

            let cond = lower_expr(cond, lowerer);
            lowerer.emit(Instruction::JumpIfZero {
                cond,
                target: else_label.clone(),
            });

            lower_stmt(then, lowerer);
            lowerer.emit(Instruction::Jump(end_label.clone()));

            // The else label is emitted even without an else branch.
            lowerer.emit(Instruction::Label(else_label));
            if let Some(stmt) = opt_else {
                lower_stmt(stmt, lowerer);
            }

            lowerer.emit(Instruction::Label(end_label));
        }
        parser::Stmt::Loop { cond, body, label } => {
            let continue_label = format!("continue.{label}");
            let break_label = format!("break.{label}");

            lowerer.emit(Instruction::Label(continue_label.clone()));

            let cond = lower_expr(cond, lowerer);
            lowerer.emit(Instruction::JumpIfZero {
                cond,
                target: break_label.clone(),
            });

            for stmt in body {
                lower_stmt(stmt, lowerer);
            }

            lowerer.emit(Instruction::Jump(continue_label));
            lowerer.emit(Instruction::Label(break_label));
        }
        parser::Stmt::Break { label } => {
            lowerer.emit(Instruction::Jump(format!("break.{label}")));
        }
        parser::Stmt::Continue { label } => {
            lowerer.emit(Instruction::Jump(format!("continue.{label}")));
        }
    }
}

// Expressions.

fn lower_expr(expr: &parser::Expr, lowerer: &mut Lowerer) -> Value {
    match expr {
        parser::Expr::IntLit(v) => Value::Const(v.clone()),
        parser::Expr::Var(name) => Value::Var(name.clone()),
        parser::Expr::Unary { op, expr } => {
            let src = lower_expr(expr, lowerer);
            let dst = Value::Var(lowerer.new_tmp());

            lowerer.emit(Instruction::Unary {
                op: *op,
                src,
                dst: dst.clone(),
            });

            dst
        }
        parser::Expr::Binary { op, lhs, rhs } => match op {
            BinaryOp::LogAnd => lower_log_and(lhs, rhs, lowerer),
            BinaryOp::LogOr => lower_log_or(lhs, rhs, lowerer),
            _ => {
                let v1 = lower_expr(lhs, lowerer);
                let v2 = lower_expr(rhs, lowerer);
                let dst = Value::Var(lowerer.new_tmp());

                lowerer.emit(Instruction::Binary {
                    op: *op,
                    v1,
                    v2,
                    dst: dst.clone(),
                });

                dst
            }
        },
        parser::Expr::Assign { lvalue, rvalue } => {
            let dst = match &**lvalue {
                parser::Expr::Var(name) => Value::Var(name.clone()),
                _ => panic!("assignment target should be a variable after validation"),
            };

            let src = lower_expr(rvalue, lowerer);
            lowerer.emit(Instruction::Copy {
                src,
                dst: dst.clone(),
            });

            dst
        }
        parser::Expr::Call { func, args } => {
            let args = args.iter().map(|arg| lower_expr(arg, lowerer)).collect();
            let dst = Value::Var(lowerer.new_tmp());

            lowerer.emit(Instruction::Call {
                func: func.clone(),
                args,
                dst: dst.clone(),
            });

            dst
        }
    }
}

/// `lhs && rhs` short-circuits to 0 as soon as either operand is zero.
///
/// Labels are minted before either operand is lowered, and the destination
/// temporary after both; dump label numbering depends on this order.
fn lower_log_and(lhs: &parser::Expr, rhs: &parser::Expr, lowerer: &mut Lowerer) -> Value {
    let false_label = lowerer.new_label("and_false");
    let end_label = lowerer.new_label("and_end");

    let v1 = lower_expr(lhs, lowerer);
    lowerer.emit(Instruction::JumpIfZero {
        cond: v1,
        target: false_label.clone(),
    });

    let v2 = lower_expr(rhs, lowerer);
    lowerer.emit(Instruction::JumpIfZero {
        cond: v2,
        target: false_label.clone(),
    });

    let dst = Value::Var(lowerer.new_tmp());

    lowerer.emit(Instruction::Copy {
        src: Value::Const("1".into()),
        dst: dst.clone(),
    });
    lowerer.emit(Instruction::Jump(end_label.clone()));

    lowerer.emit(Instruction::Label(false_label));
    lowerer.emit(Instruction::Copy {
        src: Value::Const("0".into()),
        dst: dst.clone(),
    });
    lowerer.emit(Instruction::Label(end_label));

    dst
}

/// `lhs || rhs` short-circuits once either operand is non-zero.
///
/// The true branch copies 0, same as the fallthrough branch; the golden
/// compilation outputs encode this result.
fn lower_log_or(lhs: &parser::Expr, rhs: &parser::Expr, lowerer: &mut Lowerer) -> Value {
    let true_label = lowerer.new_label("or_true");
    let end_label = lowerer.new_label("or_end");

    let v1 = lower_expr(lhs, lowerer);
    lowerer.emit(Instruction::JumpIfNotZero {
        cond: v1,
        target: true_label.clone(),
    });

    let v2 = lower_expr(rhs, lowerer);
    lowerer.emit(Instruction::JumpIfNotZero {
        cond: v2,
        target: true_label.clone(),
    });

    let dst = Value::Var(lowerer.new_tmp());

    lowerer.emit(Instruction::Copy {
        src: Value::Const("0".into()),
        dst: dst.clone(),
    });
    lowerer.emit(Instruction::Jump(end_label.clone()));

    lowerer.emit(Instruction::Label(true_label));
    lowerer.emit(Instruction::Copy {
        src: Value::Const("0".into()),
        dst: dst.clone(),
    });
    lowerer.emit(Instruction::Label(end_label));

    dst
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parser::parse_file;
    use crate::compiler::sema;

    fn lower(src: &[u8]) -> File {
        let mut file = parse_file(src, false).expect("program should parse");
        sema::validate(&mut file).expect("program should validate");
        generate_ir(&file)
    }

    #[test]
    fn ir_return_constant() {
        let ir = lower(b"fn main() { return 10; }");
        assert_eq!(
            ir.funcs[0].instructions,
            vec![Instruction::Ret(Value::Const("10".into()))]
        );
    }

    #[test]
    fn ir_unary_chain() {
        let ir = lower(b"fn main() { return ~(-2); }");
        assert_eq!(
            ir.funcs[0].instructions,
            vec![
                Instruction::Unary {
                    op: UnaryOp::Negate,
                    src: Value::Const("2".into()),
                    dst: Value::Var("tmp.0".into()),
                },
                Instruction::Unary {
                    op: UnaryOp::Complement,
                    src: Value::Var("tmp.0".into()),
                    dst: Value::Var("tmp.1".into()),
                },
                Instruction::Ret(Value::Var("tmp.1".into())),
            ]
        );
    }

    #[test]
    fn ir_declaration_lowers_to_copy() {
        let ir = lower(b"fn main() { let a = 1; return a; }");
        assert_eq!(
            ir.funcs[0].instructions,
            vec![
                Instruction::Copy {
                    src: Value::Const("1".into()),
                    dst: Value::Var("a.1".into()),
                },
                Instruction::Ret(Value::Var("a.1".into())),
            ]
        );
    }

    #[test]
    fn ir_log_and_labels_minted_before_operands() {
        // The label pair takes counter values 0 and 1, so the destination
        // temporary is tmp.2.
        let ir = lower(b"fn main() { return 1 && 2; }");
        assert_eq!(
            ir.funcs[0].instructions,
            vec![
                Instruction::JumpIfZero {
                    cond: Value::Const("1".into()),
                    target: "and_false.0".into(),
                },
                Instruction::JumpIfZero {
                    cond: Value::Const("2".into()),
                    target: "and_false.0".into(),
                },
                Instruction::Copy {
                    src: Value::Const("1".into()),
                    dst: Value::Var("tmp.2".into()),
                },
                Instruction::Jump("and_end.1".into()),
                Instruction::Label("and_false.0".into()),
                Instruction::Copy {
                    src: Value::Const("0".into()),
                    dst: Value::Var("tmp.2".into()),
                },
                Instruction::Label("and_end.1".into()),
                Instruction::Ret(Value::Var("tmp.2".into())),
            ]
        );
    }

    #[test]
    fn ir_log_or_copies_zero_on_both_paths() {
        let ir = lower(b"fn main() { return 0 || 1; }");
        let copies: Vec<_> = ir.funcs[0]
            .instructions
            .iter()
            .filter_map(|inst| match inst {
                Instruction::Copy { src: Value::Const(v), .. } => Some(v.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(copies, vec!["0", "0"]);
    }

    #[test]
    fn ir_if_emits_else_label_without_else_branch() {
        let ir = lower(b"fn main() { if (1) { return 2; } return 3; }");
        let insts = &ir.funcs[0].instructions;

        assert!(insts.contains(&Instruction::Label("else.0".into())));
        assert!(insts.contains(&Instruction::Label("if_end.1".into())));
    }

    #[test]
    fn ir_loop_shape() {
        let ir = lower(b"fn main() { loop (0) { break; } return 1; }");
        assert_eq!(
            ir.funcs[0].instructions,
            vec![
                Instruction::Label("continue.loop.1".into()),
                Instruction::JumpIfZero {
                    cond: Value::Const("0".into()),
                    target: "break.loop.1".into(),
                },
                Instruction::Jump("break.loop.1".into()),
                Instruction::Jump("continue.loop.1".into()),
                Instruction::Label("break.loop.1".into()),
                Instruction::Ret(Value::Const("1".into())),
            ]
        );
    }

    #[test]
    fn ir_call_arguments_lowered_left_to_right() {
        let ir = lower(b"fn f(int a, int b) { return a; } fn main() { return f(1 + 2, 3); }");
        let insts = &ir.funcs[1].instructions;

        assert_eq!(
            insts[0],
            Instruction::Binary {
                op: BinaryOp::Add,
                v1: Value::Const("1".into()),
                v2: Value::Const("2".into()),
                dst: Value::Var("tmp.0".into()),
            }
        );
        assert_eq!(
            insts[1],
            Instruction::Call {
                func: "f".into(),
                args: vec![Value::Var("tmp.0".into()), Value::Const("3".into())],
                dst: Value::Var("tmp.1".into()),
            }
        );
    }

    #[test]
    fn ir_counter_shared_across_functions() {
        let ir = lower(b"fn f() { return -1; } fn main() { return -2; }");

        assert!(
            ir.funcs[0]
                .instructions
                .contains(&Instruction::Unary {
                    op: UnaryOp::Negate,
                    src: Value::Const("1".into()),
                    dst: Value::Var("tmp.0".into()),
                })
        );
        // The second function keeps counting where the first left off.
        assert!(
            ir.funcs[1]
                .instructions
                .contains(&Instruction::Unary {
                    op: UnaryOp::Negate,
                    src: Value::Const("2".into()),
                    dst: Value::Var("tmp.1".into()),
                })
        );
    }

    #[test]
    fn ir_jump_targets_are_defined() {
        // Every label referenced by a jump must exist as a Label in the same
        // function.
        let ir = lower(
            b"fn main() {
                  let i = 0;
                  loop (i < 10 && i != 7) {
                      i = i + 1;
                      if (i == 3 || i == 5) { continue; } else { i = i + 2; }
                  }
                  return i;
              }",
        );

        for func in &ir.funcs {
            let labels: std::collections::HashSet<_> = func
                .instructions
                .iter()
                .filter_map(|inst| match inst {
                    Instruction::Label(name) => Some(name.clone()),
                    _ => None,
                })
                .collect();

            for inst in &func.instructions {
                let target = match inst {
                    Instruction::Jump(target) => target,
                    Instruction::JumpIfZero { target, .. } => target,
                    Instruction::JumpIfNotZero { target, .. } => target,
                    _ => continue,
                };
                assert!(labels.contains(target), "undefined jump target '{target}'");
            }
        }
    }
}
