//! Lexical Analysis
//!
//! Compiler pass that tokenizes source code, producing one token per call to
//! [`Scanner::scan`]. Tokens are produced on demand; the scanner never
//! buffers more than the current byte.

use std::collections::HashMap;
use std::fmt;

use lazy_static::lazy_static;

lazy_static! {
    /// Reserved words of the language, mapped to their keyword tokens.
    static ref KEYWORDS: HashMap<&'static str, TokenKind> = {
        let mut m = HashMap::new();
        m.insert("let", TokenKind::Let);
        m.insert("return", TokenKind::Return);
        m.insert("if", TokenKind::If);
        m.insert("else", TokenKind::Else);
        m.insert("loop", TokenKind::Loop);
        m.insert("continue", TokenKind::Continue);
        m.insert("break", TokenKind::Break);
        m.insert("fn", TokenKind::Fn);
        m
    };
}

/// Kinds of lexical elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TokenKind {
    /// Byte sequence that does not form any token.
    Illegal,
    /// End of input. Scanning past the end yields `Eof` repeatedly.
    Eof,

    Ident,
    Int,

    Add,       // +
    Sub,       // -
    Mul,       // *
    Quo,       // /
    Rem,       // %
    LogAnd,    // &&
    LogOr,     // ||
    Eq,        // ==
    NotEq,     // !=
    Less,      // <
    LessEq,    // <=
    Greater,   // >
    GreaterEq, // >=
    Assign,    // =
    Not,       // !
    Tilde,     // ~

    LParen,
    RParen,
    LBrace,
    RBrace,
    Semicolon,
    Comma,

    Let,
    Return,
    If,
    Else,
    Loop,
    Continue,
    Break,
    Fn,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Illegal => "ILLEGAL",
            TokenKind::Eof => "EOF",
            TokenKind::Ident => "IDENT",
            TokenKind::Int => "INT",
            TokenKind::Add => "+",
            TokenKind::Sub => "-",
            TokenKind::Mul => "*",
            TokenKind::Quo => "/",
            TokenKind::Rem => "%",
            TokenKind::LogAnd => "&&",
            TokenKind::LogOr => "||",
            TokenKind::Eq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Less => "<",
            TokenKind::LessEq => "<=",
            TokenKind::Greater => ">",
            TokenKind::GreaterEq => ">=",
            TokenKind::Assign => "=",
            TokenKind::Not => "!",
            TokenKind::Tilde => "~",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Let => "let",
            TokenKind::Return => "return",
            TokenKind::If => "if",
            TokenKind::Else => "else",
            TokenKind::Loop => "loop",
            TokenKind::Continue => "continue",
            TokenKind::Break => "break",
            TokenKind::Fn => "fn",
        };
        write!(f, "{s}")
    }
}

impl TokenKind {
    /// Returns `true` for kinds whose text comes from the source rather than
    /// a fixed spelling (`Ident`, `Int`, and the offending bytes of
    /// `Illegal`).
    pub fn is_literal(&self) -> bool {
        matches!(
            self,
            TokenKind::Ident | TokenKind::Int | TokenKind::Illegal
        )
    }
}

/// Minimal lexical element of the language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Kind tag.
    pub kind: TokenKind,
    /// Source text for literal kinds; empty otherwise.
    pub lit: String,
}

impl Token {
    fn new(kind: TokenKind) -> Self {
        Token {
            kind,
            lit: String::new(),
        }
    }

    fn with_lit(kind: TokenKind, lit: String) -> Self {
        Token { kind, lit }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_literal() {
            write!(f, "{}", self.lit)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// Maps an identifier to its keyword kind, or [`TokenKind::Ident`] if it is
/// not a keyword.
pub fn lookup_keyword(ident: &str) -> TokenKind {
    KEYWORDS.get(ident).copied().unwrap_or(TokenKind::Ident)
}

/// On-demand tokenizer over a byte slice.
pub struct Scanner<'a> {
    src: &'a [u8],
    cur: usize,
}

impl<'a> Scanner<'a> {
    /// Returns a new `Scanner` positioned at the start of `src`.
    pub fn new(src: &'a [u8]) -> Self {
        Scanner { src, cur: 0 }
    }

    /// Scans and returns the next token. At end of input, returns
    /// [`TokenKind::Eof`] on every call.
    pub fn scan(&mut self) -> Token {
        self.skip_whitespace();

        let Some(ch) = self.first() else {
            return Token::new(TokenKind::Eof);
        };

        match ch {
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => {
                let lit = self.scan_identifier();
                let kind = lookup_keyword(&lit);
                if kind == TokenKind::Ident {
                    Token::with_lit(kind, lit)
                } else {
                    Token::new(kind)
                }
            }
            b'0'..=b'9' => Token::with_lit(TokenKind::Int, self.scan_number()),
            _ => {
                self.cur += 1;
                match ch {
                    b'+' => Token::new(TokenKind::Add),
                    b'-' => Token::new(TokenKind::Sub),
                    b'*' => Token::new(TokenKind::Mul),
                    b'/' => Token::new(TokenKind::Quo),
                    b'%' => Token::new(TokenKind::Rem),
                    // A lone '&' or '|' is not a token.
                    b'&' => {
                        if self.accept(b'&') {
                            Token::new(TokenKind::LogAnd)
                        } else {
                            Token::with_lit(TokenKind::Illegal, "&".into())
                        }
                    }
                    b'|' => {
                        if self.accept(b'|') {
                            Token::new(TokenKind::LogOr)
                        } else {
                            Token::with_lit(TokenKind::Illegal, "|".into())
                        }
                    }
                    b'=' => {
                        if self.accept(b'=') {
                            Token::new(TokenKind::Eq)
                        } else {
                            Token::new(TokenKind::Assign)
                        }
                    }
                    b'!' => {
                        if self.accept(b'=') {
                            Token::new(TokenKind::NotEq)
                        } else {
                            Token::new(TokenKind::Not)
                        }
                    }
                    b'<' => {
                        if self.accept(b'=') {
                            Token::new(TokenKind::LessEq)
                        } else {
                            Token::new(TokenKind::Less)
                        }
                    }
                    b'>' => {
                        if self.accept(b'=') {
                            Token::new(TokenKind::GreaterEq)
                        } else {
                            Token::new(TokenKind::Greater)
                        }
                    }
                    b'(' => Token::new(TokenKind::LParen),
                    b')' => Token::new(TokenKind::RParen),
                    b'{' => Token::new(TokenKind::LBrace),
                    b'}' => Token::new(TokenKind::RBrace),
                    b';' => Token::new(TokenKind::Semicolon),
                    b',' => Token::new(TokenKind::Comma),
                    b'~' => Token::new(TokenKind::Tilde),
                    b => Token::with_lit(TokenKind::Illegal, (b as char).to_string()),
                }
            }
        }
    }

    /// Consumes an identifier starting at the cursor. The caller has already
    /// checked the first byte.
    fn scan_identifier(&mut self) -> String {
        let start = self.cur;
        while let Some(b) = self.first() {
            if b.is_ascii_alphanumeric() || b == b'_' {
                self.cur += 1;
            } else {
                break;
            }
        }

        std::str::from_utf8(&self.src[start..self.cur])
            .expect("ASCII bytes should be valid UTF-8")
            .to_string()
    }

    /// Consumes a run of decimal digits starting at the cursor.
    fn scan_number(&mut self) -> String {
        let start = self.cur;
        while let Some(b) = self.first() {
            if b.is_ascii_digit() {
                self.cur += 1;
            } else {
                break;
            }
        }

        std::str::from_utf8(&self.src[start..self.cur])
            .expect("ASCII bytes should be valid UTF-8")
            .to_string()
    }

    /// Returns the byte at the cursor, or `None` at end of input.
    #[inline]
    fn first(&self) -> Option<u8> {
        self.src.get(self.cur).copied()
    }

    /// Advances past the next byte if it equals `b`.
    #[inline]
    fn accept(&mut self, b: u8) -> bool {
        if self.first() == Some(b) {
            self.cur += 1;
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.first() {
            if matches!(b, b' ' | b'\t' | b'\n' | b'\r') {
                self.cur += 1;
            } else {
                break;
            }
        }
    }
}
