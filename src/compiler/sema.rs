//! Semantic Analysis
//!
//! Compiler pass that validates the _AST_ in a single walk:
//! - every variable reference must resolve to a declaration in scope,
//! - every declared identifier is renamed to a globally unique form,
//! - every loop is stamped with a unique label, and `break`/`continue` are
//!   resolved to their innermost enclosing loop.
//!
//! The output tree is structurally identical to the input; only identifiers
//! and labels change.

use std::collections::HashMap;

use crate::compiler::parser::{Decl, Expr, File, FuncDecl, Stmt, VarDecl};
use crate::error::{CompileError, CompileResult};

type Ident = String;

/// A name binding visible in the current scope.
#[derive(Clone)]
struct VarEntry {
    /// Globally unique renamed form.
    name: Ident,
    /// Whether the binding was introduced by the current scope. Cleared on
    /// scope entry so redeclaration is distinguished from shadowing.
    from_scope: bool,
}

/// Validates the file in place, renaming identifiers and stamping loop
/// labels.
pub fn validate(file: &mut File) -> CompileResult<()> {
    let mut validator = Validator::default();

    for decl in &mut file.decls {
        let Decl::Func(func) = decl;
        validator.validate_func_decl(func)?;
    }

    Ok(())
}

#[derive(Default)]
struct Validator {
    /// Source name → binding for every identifier currently in scope.
    idents: HashMap<Ident, VarEntry>,
    /// Mints `<name>.<N>` renames; the first declaration gets `.1`.
    var_counter: usize,
    /// Mints `loop.<N>` labels; never reset, so sibling loops stay distinct.
    loop_counter: usize,
    /// Labels of the lexically enclosing loops, innermost last.
    loop_stack: Vec<Ident>,
}

impl Validator {
    /// Opens a new scope: every inherited binding keeps its renamed form but
    /// loses its `from_scope` flag. Returns the saved bindings for
    /// [`Validator::exit_scope`].
    fn enter_scope(&mut self) -> HashMap<Ident, VarEntry> {
        let saved = self.idents.clone();
        for entry in self.idents.values_mut() {
            entry.from_scope = false;
        }
        saved
    }

    fn exit_scope(&mut self, saved: HashMap<Ident, VarEntry>) {
        self.idents = saved;
    }

    /// Binds `name` in the current scope, returning its unique renamed form.
    /// Fails if `name` was already declared in this scope.
    fn declare(&mut self, name: &str) -> CompileResult<Ident> {
        if let Some(entry) = self.idents.get(name)
            && entry.from_scope
        {
            return Err(CompileError::DuplicateDeclaration { name: name.into() });
        }

        self.var_counter += 1;
        let renamed = format!("{name}.{}", self.var_counter);

        self.idents.insert(
            name.to_string(),
            VarEntry {
                name: renamed.clone(),
                from_scope: true,
            },
        );

        Ok(renamed)
    }

    // Declarations.

    fn validate_func_decl(&mut self, func: &mut FuncDecl) -> CompileResult<()> {
        // Parameters are bound in the same scope as the body's outer block,
        // so `let` redeclaring a parameter at body top level is a duplicate.
        let saved = self.enter_scope();

        for param in &mut func.params {
            *param = self.declare(param)?;
        }

        for stmt in &mut func.body {
            self.validate_stmt(stmt)?;
        }

        self.exit_scope(saved);
        Ok(())
    }

    fn validate_var_decl(&mut self, decl: &mut VarDecl) -> CompileResult<()> {
        decl.name = self.declare(&decl.name)?;
        self.validate_expr(&mut decl.init)
    }

    // Statements.

    fn validate_stmt(&mut self, stmt: &mut Stmt) -> CompileResult<()> {
        match stmt {
            Stmt::Block(stmts) => {
                let saved = self.enter_scope();
                for stmt in stmts {
                    self.validate_stmt(stmt)?;
                }
                self.exit_scope(saved);
                Ok(())
            }
            Stmt::Return(expr) | Stmt::Expr(expr) => self.validate_expr(expr),
            Stmt::Decl(decl) => self.validate_var_decl(decl),
            Stmt::If {
                cond,
                then,
                opt_else,
            } => {
                self.validate_expr(cond)?;
                self.validate_stmt(then)?;
                if let Some(stmt) = opt_else {
                    self.validate_stmt(stmt)?;
                }
                Ok(())
            }
            Stmt::Loop { cond, body, label } => {
                self.loop_counter += 1;
                *label = format!("loop.{}", self.loop_counter);

                self.loop_stack.push(label.clone());

                self.validate_expr(cond)?;

                let saved = self.enter_scope();
                for stmt in body {
                    self.validate_stmt(stmt)?;
                }
                self.exit_scope(saved);

                self.loop_stack.pop();
                Ok(())
            }
            Stmt::Break { label } => match self.loop_stack.last() {
                Some(enclosing) => {
                    *label = enclosing.clone();
                    Ok(())
                }
                None => Err(CompileError::NotInLoop {
                    stmt: "break".into(),
                }),
            },
            Stmt::Continue { label } => match self.loop_stack.last() {
                Some(enclosing) => {
                    *label = enclosing.clone();
                    Ok(())
                }
                None => Err(CompileError::NotInLoop {
                    stmt: "continue".into(),
                }),
            },
        }
    }

    // Expressions.

    fn validate_expr(&mut self, expr: &mut Expr) -> CompileResult<()> {
        match expr {
            Expr::IntLit(_) => Ok(()),
            Expr::Var(name) => match self.idents.get(name.as_str()) {
                Some(entry) => {
                    *name = entry.name.clone();
                    Ok(())
                }
                None => Err(CompileError::UndeclaredVariable { name: name.clone() }),
            },
            Expr::Unary { expr, .. } => self.validate_expr(expr),
            Expr::Binary { lhs, rhs, .. } => {
                self.validate_expr(lhs)?;
                self.validate_expr(rhs)
            }
            Expr::Assign { lvalue, rvalue } => {
                if !matches!(**lvalue, Expr::Var(_)) {
                    return Err(CompileError::InvalidAssignTarget);
                }
                self.validate_expr(lvalue)?;
                self.validate_expr(rvalue)
            }
            // Callee names live outside the variable namespace; unresolved
            // callees surface at link time.
            Expr::Call { args, .. } => {
                for arg in args {
                    self.validate_expr(arg)?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::parser::parse_file;

    fn validated(src: &[u8]) -> File {
        let mut file = parse_file(src, false).expect("program should parse");
        validate(&mut file).expect("program should validate");
        file
    }

    fn validate_err(src: &[u8]) -> CompileError {
        let mut file = parse_file(src, false).expect("program should parse");
        validate(&mut file).expect_err("program should not validate")
    }

    fn func(file: &File, i: usize) -> &FuncDecl {
        let Decl::Func(func) = &file.decls[i];
        func
    }

    /// Collects every renamed identifier declared in the statement list.
    fn declared_names(stmts: &[Stmt], out: &mut Vec<Ident>) {
        for stmt in stmts {
            match stmt {
                Stmt::Decl(decl) => out.push(decl.name.clone()),
                Stmt::Block(stmts) => declared_names(stmts, out),
                Stmt::If { then, opt_else, .. } => {
                    declared_names(std::slice::from_ref(&**then), out);
                    if let Some(stmt) = opt_else {
                        declared_names(std::slice::from_ref(&**stmt), out);
                    }
                }
                Stmt::Loop { body, .. } => declared_names(body, out),
                _ => {}
            }
        }
    }

    #[test]
    fn validator_renames_unique() {
        let file = validated(
            b"fn f(int x) { let y = x; { let y = 2; } return y; }
              fn g() { let y = 3; return y; }",
        );

        let mut names = vec![];
        names.extend(func(&file, 0).params.iter().cloned());
        declared_names(&func(&file, 0).body, &mut names);
        declared_names(&func(&file, 1).body, &mut names);

        assert_eq!(names.len(), 4);
        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len(), "renames must be unique: {names:?}");
    }

    #[test]
    fn validator_counter_starts_at_one() {
        let file = validated(b"fn main() { let a = 1; return a; }");
        let Stmt::Decl(decl) = &func(&file, 0).body[0] else {
            panic!("expected declaration");
        };
        assert_eq!(decl.name, "a.1");
    }

    #[test]
    fn validator_reference_uses_renamed_form() {
        let file = validated(b"fn main() { let a = 1; return a; }");
        let Stmt::Return(Expr::Var(name)) = &func(&file, 0).body[1] else {
            panic!("expected return of variable");
        };
        assert_eq!(name, "a.1");
    }

    #[test]
    fn validator_shadowing_resolves_to_inner() {
        let file = validated(b"fn main() { let a = 1; { let a = 2; a = 3; } return a; }");
        let body = &func(&file, 0).body;

        let Stmt::Block(inner) = &body[1] else {
            panic!("expected block");
        };
        let Stmt::Decl(inner_decl) = &inner[0] else {
            panic!("expected declaration");
        };
        let Stmt::Expr(Expr::Assign { lvalue, .. }) = &inner[1] else {
            panic!("expected assignment");
        };
        let Stmt::Return(Expr::Var(outer_name)) = &body[2] else {
            panic!("expected return of variable");
        };

        assert!(matches!(&**lvalue, Expr::Var(name) if name == &inner_decl.name));
        assert_ne!(outer_name, &inner_decl.name);
    }

    #[test]
    fn validator_params_visible_in_body() {
        let file = validated(b"fn f(int x) { return x; }");
        let Stmt::Return(Expr::Var(name)) = &func(&file, 0).body[0] else {
            panic!("expected return of variable");
        };
        assert_eq!(name, &func(&file, 0).params[0]);
    }

    #[test]
    fn validator_loop_labels() {
        let file = validated(
            b"fn main() {
                  loop (1) { loop (2) { break; } continue; }
                  loop (3) { break; }
                  return 0;
              }",
        );
        let body = &func(&file, 0).body;

        let Stmt::Loop { label, body: outer, .. } = &body[0] else {
            panic!("expected loop");
        };
        assert_eq!(label, "loop.1");

        let Stmt::Loop { label: inner_label, body: inner, .. } = &outer[0] else {
            panic!("expected nested loop");
        };
        assert_eq!(inner_label, "loop.2");
        assert!(matches!(&inner[0], Stmt::Break { label } if label == "loop.2"));

        // `continue` in the outer body resolves past the nested loop.
        assert!(matches!(&outer[1], Stmt::Continue { label } if label == "loop.1"));

        // Sibling loops receive distinct labels.
        let Stmt::Loop { label: sibling, .. } = &body[1] else {
            panic!("expected sibling loop");
        };
        assert_eq!(sibling, "loop.3");
    }

    #[test]
    fn validator_loop_labels_idempotent() {
        let src = b"fn main() { loop (1) { loop (2) { break; } } loop (3) { continue; } return 0; }";

        let labels = |file: &File| {
            let mut out = vec![];
            fn walk(stmts: &[Stmt], out: &mut Vec<Ident>) {
                for stmt in stmts {
                    if let Stmt::Loop { label, body, .. } = stmt {
                        out.push(label.clone());
                        walk(body, out);
                    }
                }
            }
            walk(&func(file, 0).body, &mut out);
            out
        };

        let once = validated(src);
        let mut twice = validated(src);
        validate(&mut twice).expect("revalidation should succeed");

        assert_eq!(labels(&once), labels(&twice));
    }

    #[test]
    fn validator_undeclared_variable_fatal() {
        let err = validate_err(b"fn main() { return x; }");
        assert!(matches!(
            err,
            CompileError::UndeclaredVariable { name } if name == "x"
        ));
    }

    #[test]
    fn validator_out_of_scope_reference_fatal() {
        let err = validate_err(b"fn main() { { let a = 1; } return a; }");
        assert!(matches!(err, CompileError::UndeclaredVariable { .. }));
    }

    #[test]
    fn validator_duplicate_declaration_fatal() {
        let err = validate_err(b"fn main() { let a = 1; let a = 2; return a; }");
        assert!(matches!(
            err,
            CompileError::DuplicateDeclaration { name } if name == "a"
        ));
    }

    #[test]
    fn validator_param_redeclared_in_body_fatal() {
        let err = validate_err(b"fn f(int x) { let x = 1; return x; }");
        assert!(matches!(err, CompileError::DuplicateDeclaration { .. }));
    }

    #[test]
    fn validator_duplicate_param_fatal() {
        let err = validate_err(b"fn f(int x, int x) { return x; }");
        assert!(matches!(err, CompileError::DuplicateDeclaration { .. }));
    }

    #[test]
    fn validator_assign_to_non_variable_fatal() {
        let err = validate_err(b"fn main() { 1 = 2; }");
        assert!(matches!(err, CompileError::InvalidAssignTarget));
    }

    #[test]
    fn validator_break_outside_loop_fatal() {
        let err = validate_err(b"fn main() { break; }");
        assert!(matches!(err, CompileError::NotInLoop { stmt } if stmt == "break"));
    }

    #[test]
    fn validator_continue_outside_loop_fatal() {
        let err = validate_err(b"fn main() { continue; }");
        assert!(matches!(err, CompileError::NotInLoop { stmt } if stmt == "continue"));
    }
}
