//! Syntax Analysis
//!
//! Compiler pass that parses a stream of tokens into an abstract syntax tree
//! (_AST_). Statements are parsed by recursive descent; expressions by
//! precedence climbing.

use std::fmt;

use crate::compiler::lexer::{Scanner, Token, TokenKind};
use crate::error::{CompileError, CompileResult};

type Ident = String;

/// _AST_ unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-` - arithmetic negation.
    Negate,
    /// `~` - bitwise complement.
    Complement,
    /// `!` - logical not.
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            UnaryOp::Negate => "-",
            UnaryOp::Complement => "~",
            UnaryOp::Not => "!",
        };
        write!(f, "{op}")
    }
}

/// _AST_ binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
    LogAnd,
    LogOr,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
            BinaryOp::LogAnd => "&&",
            BinaryOp::LogOr => "||",
        };
        write!(f, "{op}")
    }
}

/// _AST_ expressions.
#[derive(Debug)]
pub enum Expr {
    /// Integer literal, carried as its source text.
    IntLit(String),
    /// Variable reference by name.
    Var(Ident),
    /// Unary operation.
    #[allow(missing_docs)]
    Unary { op: UnaryOp, expr: Box<Expr> },
    /// Binary operation.
    #[allow(missing_docs)]
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Assignment. The validator requires `lvalue` to be [`Expr::Var`].
    #[allow(missing_docs)]
    Assign {
        lvalue: Box<Expr>,
        rvalue: Box<Expr>,
    },
    /// Function call with ordered arguments.
    #[allow(missing_docs)]
    Call { func: Ident, args: Vec<Expr> },
}

/// _AST_ statements.
#[derive(Debug)]
pub enum Stmt {
    /// `{ stmt* }` - introduces a new scope.
    Block(Vec<Stmt>),
    /// `return expr ;`
    Return(Expr),
    /// Bare expression followed by `;`.
    Expr(Expr),
    /// `let` declaration in statement position.
    Decl(VarDecl),
    /// `if ( cond ) stmt (else stmt)?`
    #[allow(missing_docs)]
    If {
        cond: Expr,
        then: Box<Stmt>,
        opt_else: Option<Box<Stmt>>,
    },
    /// `loop ( cond ) block`. The label is empty until the validator stamps
    /// it.
    #[allow(missing_docs)]
    Loop {
        cond: Expr,
        body: Vec<Stmt>,
        label: Ident,
    },
    /// `break ;` - label backpatched by the validator.
    #[allow(missing_docs)]
    Break { label: Ident },
    /// `continue ;` - label backpatched by the validator.
    #[allow(missing_docs)]
    Continue { label: Ident },
}

/// `let name = init ;`
#[derive(Debug)]
#[allow(missing_docs)]
pub struct VarDecl {
    pub name: Ident,
    pub init: Expr,
}

/// `fn name(int param, …) { … }`
#[derive(Debug)]
#[allow(missing_docs)]
pub struct FuncDecl {
    pub name: Ident,
    pub params: Vec<Ident>,
    pub body: Vec<Stmt>,
}

/// Top-level declarations. Only function declarations can appear at file
/// scope; `let` declarations are statements.
#[derive(Debug)]
pub enum Decl {
    /// Function declaration.
    Func(FuncDecl),
}

/// A parsed source file: an ordered sequence of top-level declarations.
#[derive(Debug)]
pub struct File {
    /// Declarations in source order.
    pub decls: Vec<Decl>,
}

/// Returns the binding power of the token as a binary operator, or -1 if the
/// token cannot continue an expression.
fn precedence(kind: TokenKind) -> i32 {
    match kind {
        TokenKind::Mul | TokenKind::Quo | TokenKind::Rem => 50,
        TokenKind::Add | TokenKind::Sub => 45,
        TokenKind::Less | TokenKind::LessEq | TokenKind::Greater | TokenKind::GreaterEq => 35,
        TokenKind::Eq | TokenKind::NotEq => 30,
        TokenKind::LogAnd => 10,
        TokenKind::LogOr => 5,
        TokenKind::Assign => 1,
        _ => -1,
    }
}

fn binary_op(kind: TokenKind) -> BinaryOp {
    match kind {
        TokenKind::Add => BinaryOp::Add,
        TokenKind::Sub => BinaryOp::Subtract,
        TokenKind::Mul => BinaryOp::Multiply,
        TokenKind::Quo => BinaryOp::Divide,
        TokenKind::Rem => BinaryOp::Modulo,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::NotEq => BinaryOp::NotEq,
        TokenKind::Less => BinaryOp::Less,
        TokenKind::LessEq => BinaryOp::LessEq,
        TokenKind::Greater => BinaryOp::Greater,
        TokenKind::GreaterEq => BinaryOp::GreaterEq,
        TokenKind::LogAnd => BinaryOp::LogAnd,
        TokenKind::LogOr => BinaryOp::LogOr,
        _ => panic!("token '{kind}' is not a binary operator"),
    }
}

/// Parses a source file into an _AST_. With `debug` set, rule entries and
/// consumed tokens are traced to standard output.
pub fn parse_file(src: &[u8], debug: bool) -> CompileResult<File> {
    let mut parser = Parser::new(Scanner::new(src), debug);
    parser.parse_file()
}

struct Parser<'a> {
    scanner: Scanner<'a>,
    tok: Token,

    line: usize,
    indent: usize,
    debug: bool,
}

impl<'a> Parser<'a> {
    fn new(mut scanner: Scanner<'a>, debug: bool) -> Self {
        let tok = scanner.scan();
        Parser {
            scanner,
            tok,
            line: 1,
            indent: 0,
            debug,
        }
    }

    fn parse_file(&mut self) -> CompileResult<File> {
        self.trace("File");

        let mut decls = vec![];
        while self.tok.kind != TokenKind::Eof {
            match self.tok.kind {
                TokenKind::Fn => decls.push(Decl::Func(self.parse_func_decl()?)),
                TokenKind::Illegal => {
                    return Err(CompileError::IllegalToken {
                        token: self.tok.lit.clone(),
                    });
                }
                _ => {
                    return Err(CompileError::UnsupportedTopLevelDecl {
                        found: self.tok.to_string(),
                    });
                }
            }
        }

        Ok(File { decls })
    }

    // Expressions.

    fn parse_expr(&mut self, min_prec: i32) -> CompileResult<Expr> {
        self.trace("Expr");

        let mut l = self.parse_factor()?;
        loop {
            let prec = precedence(self.tok.kind);
            if prec < min_prec {
                break;
            }

            if self.tok.kind == TokenKind::Assign {
                self.next();
                // Recursing with `prec` rather than `prec + 1` makes `=`
                // right-associative: `a = b = c` parses as `a = (b = c)`.
                let rvalue = self.parse_expr(prec)?;
                l = Expr::Assign {
                    lvalue: Box::new(l),
                    rvalue: Box::new(rvalue),
                };
            } else {
                let op = binary_op(self.tok.kind);
                self.next();
                let rhs = self.parse_expr(prec + 1)?;
                l = Expr::Binary {
                    op,
                    lhs: Box::new(l),
                    rhs: Box::new(rhs),
                };
            }
        }

        Ok(l)
    }

    fn parse_factor(&mut self) -> CompileResult<Expr> {
        self.trace("Factor");

        match self.tok.kind {
            TokenKind::Int => {
                let lit = self.tok.lit.clone();
                self.next();
                Ok(Expr::IntLit(lit))
            }
            TokenKind::Sub | TokenKind::Tilde | TokenKind::Not => {
                let op = match self.tok.kind {
                    TokenKind::Sub => UnaryOp::Negate,
                    TokenKind::Tilde => UnaryOp::Complement,
                    _ => UnaryOp::Not,
                };
                self.next();

                // The operand is a factor, not a full expression, so that
                // `-x + y` groups as `(-x) + y`.
                let expr = self.parse_factor()?;
                Ok(Expr::Unary {
                    op,
                    expr: Box::new(expr),
                })
            }
            TokenKind::LParen => {
                self.next();
                let expr = self.parse_expr(0)?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::Ident => {
                let name = self.tok.lit.clone();
                self.next();

                if self.tok.kind == TokenKind::LParen {
                    self.parse_call_expr(name)
                } else {
                    Ok(Expr::Var(name))
                }
            }
            TokenKind::Illegal => Err(CompileError::IllegalToken {
                token: self.tok.lit.clone(),
            }),
            _ => Err(CompileError::UnexpectedToken {
                expected: "<factor>".into(),
                found: self.tok.to_string(),
            }),
        }
    }

    fn parse_call_expr(&mut self, func: Ident) -> CompileResult<Expr> {
        self.trace("CallExpr");

        let mut args = vec![];

        self.expect(TokenKind::LParen)?;
        while self.tok.kind != TokenKind::RParen {
            args.push(self.parse_expr(0)?);

            if self.tok.kind != TokenKind::RParen {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;

        Ok(Expr::Call { func, args })
    }

    // Statements.

    fn parse_stmt(&mut self) -> CompileResult<Stmt> {
        self.trace("Stmt");

        match self.tok.kind {
            TokenKind::LBrace => Ok(Stmt::Block(self.parse_block()?)),
            TokenKind::Return => self.parse_return_stmt(),
            TokenKind::Let => Ok(Stmt::Decl(self.parse_var_decl()?)),
            TokenKind::If => self.parse_if_stmt(),
            TokenKind::Loop => self.parse_loop_stmt(),
            TokenKind::Break => {
                self.next();
                self.expect(TokenKind::Semicolon)?;

                // Placeholder label, backpatched by the validator.
                Ok(Stmt::Break {
                    label: String::new(),
                })
            }
            TokenKind::Continue => {
                self.next();
                self.expect(TokenKind::Semicolon)?;

                // Placeholder label, backpatched by the validator.
                Ok(Stmt::Continue {
                    label: String::new(),
                })
            }
            _ => {
                let expr = self.parse_expr(0)?;
                self.expect(TokenKind::Semicolon)?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn parse_block(&mut self) -> CompileResult<Vec<Stmt>> {
        self.trace("Block");

        self.expect(TokenKind::LBrace)?;
        let mut list = vec![];
        while self.tok.kind != TokenKind::RBrace && self.tok.kind != TokenKind::Eof {
            list.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;

        Ok(list)
    }

    fn parse_return_stmt(&mut self) -> CompileResult<Stmt> {
        self.trace("ReturnStmt");

        self.expect(TokenKind::Return)?;
        let expr = self.parse_expr(0)?;
        self.expect(TokenKind::Semicolon)?;

        Ok(Stmt::Return(expr))
    }

    fn parse_if_stmt(&mut self) -> CompileResult<Stmt> {
        self.trace("IfStmt");

        self.expect(TokenKind::If)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::RParen)?;

        let then = self.parse_stmt()?;

        let mut opt_else = None;
        if self.tok.kind == TokenKind::Else {
            self.next();
            opt_else = Some(Box::new(self.parse_stmt()?));
        }

        Ok(Stmt::If {
            cond,
            then: Box::new(then),
            opt_else,
        })
    }

    fn parse_loop_stmt(&mut self) -> CompileResult<Stmt> {
        self.trace("LoopStmt");

        self.expect(TokenKind::Loop)?;
        self.expect(TokenKind::LParen)?;
        let cond = self.parse_expr(0)?;
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;

        Ok(Stmt::Loop {
            cond,
            body,
            label: String::new(),
        })
    }

    // Declarations.

    fn parse_func_decl(&mut self) -> CompileResult<FuncDecl> {
        self.trace("FuncDecl");

        self.expect(TokenKind::Fn)?;
        let name = self.parse_ident()?;

        let mut params = vec![];

        self.expect(TokenKind::LParen)?;
        while self.tok.kind != TokenKind::RParen {
            let param_type = self.parse_ident()?;
            if param_type != "int" {
                return Err(CompileError::UnsupportedType { name: param_type });
            }

            params.push(self.parse_ident()?);

            if self.tok.kind != TokenKind::RParen {
                self.expect(TokenKind::Comma)?;
            }
        }
        self.expect(TokenKind::RParen)?;

        let body = self.parse_block()?;

        Ok(FuncDecl { name, params, body })
    }

    fn parse_var_decl(&mut self) -> CompileResult<VarDecl> {
        self.trace("VarDecl");

        self.expect(TokenKind::Let)?;
        let name = self.parse_ident()?;
        self.expect(TokenKind::Assign)?;

        let init = self.parse_expr(0)?;
        self.expect(TokenKind::Semicolon)?;

        Ok(VarDecl { name, init })
    }

    fn parse_ident(&mut self) -> CompileResult<Ident> {
        if self.tok.kind != TokenKind::Ident {
            return Err(self.unexpected(TokenKind::Ident));
        }

        let ident = self.tok.lit.clone();
        self.next();
        Ok(ident)
    }

    fn expect(&mut self, kind: TokenKind) -> CompileResult<()> {
        if self.tok.kind != kind {
            return Err(self.unexpected(kind));
        }
        self.next();
        Ok(())
    }

    fn unexpected(&self, expected: TokenKind) -> CompileError {
        if self.tok.kind == TokenKind::Illegal {
            CompileError::IllegalToken {
                token: self.tok.lit.clone(),
            }
        } else {
            CompileError::UnexpectedToken {
                expected: expected.to_string(),
                found: self.tok.to_string(),
            }
        }
    }

    fn next(&mut self) {
        if self.debug {
            if self.tok.kind.is_literal() {
                let kind = self.tok.kind;
                let lit = self.tok.lit.clone();
                self.print_trace(&format!("{kind} ({lit})"));
            } else {
                self.print_trace(&format!("\"{}\"", self.tok.kind));
            }
        }

        self.tok = self.scanner.scan();
    }

    /// Prints an indented rule-entry line when tracing is enabled.
    fn trace(&mut self, rule: &str) {
        if self.debug {
            self.indent = rule_depth(rule);
            self.print_trace(rule);
        }
    }

    fn print_trace(&mut self, msg: &str) {
        const DOTS: &str = ". . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . ";

        let mut i = 2 * self.indent;
        print!("{:6}  ", self.line);
        while i > DOTS.len() {
            print!("{DOTS}");
            i -= DOTS.len();
        }
        println!("{}{msg}", &DOTS[..i]);

        self.line += 1;
    }
}

/// Fixed indentation depth per grammar rule, approximating nesting in the
/// trace output.
fn rule_depth(rule: &str) -> usize {
    match rule {
        "File" => 0,
        "FuncDecl" | "VarDecl" => 1,
        "Block" => 2,
        "Stmt" | "ReturnStmt" | "IfStmt" | "LoopStmt" => 3,
        "Expr" => 4,
        "Factor" | "CallExpr" => 5,
        _ => 6,
    }
}
