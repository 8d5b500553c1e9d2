//! Recursive-descent parser from tokens to the template AST.
//!
//! ```text
//! template := (RawText | Block)*
//! Block    := '{' '?'? Expr ('|' Expr)* '}'
//! Expr     := String | Number | Ident ('(' ArgList? ')')?
//! ArgList  := Expr (',' Expr)*
//! ```
//!
//! Every AST node displays as template source, and parsing that source
//! yields an equal AST.

use std::fmt;

use super::lexer::{tokenize, Token, TokenKind};
use crate::error::{CatalogError, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Raw(String),
    Block(Block),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    /// Skips the rest of the chain when the first element is empty.
    pub optional: bool,
    /// The first element yields the head value; the rest are filters.
    pub chain: Vec<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    String(String),
    Number(i64),
    Function { name: String, args: Vec<Expr> },
    /// A bare identifier, resolved as a variable or a zero-argument function
    /// when evaluated.
    FunctionOrVariable(String),
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Node::Raw(text) => write!(f, "{}", text),
            Node::Block(block) => {
                write!(f, "{{")?;
                if block.optional {
                    write!(f, "?")?;
                }
                for (i, expr) in block.chain.iter().enumerate() {
                    if i > 0 {
                        write!(f, "|")?;
                    }
                    write!(f, "{}", expr)?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::String(text) => {
                write!(f, "'")?;
                for c in text.chars() {
                    match c {
                        '\\' => write!(f, "\\\\")?,
                        '\'' => write!(f, "\\'")?,
                        '\n' => write!(f, "\\n")?,
                        '\r' => write!(f, "\\r")?,
                        '\t' => write!(f, "\\t")?,
                        '\u{8}' => write!(f, "\\b")?,
                        c => write!(f, "{}", c)?,
                    }
                }
                write!(f, "'")
            }
            Expr::Number(n) => write!(f, "{}", n),
            Expr::Function { name, args } => {
                write!(f, "{}(", name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Expr::FunctionOrVariable(name) => write!(f, "{}", name),
        }
    }
}

/// Serializes nodes back to template source.
pub fn unparse(nodes: &[Node]) -> String {
    nodes.iter().map(|n| n.to_string()).collect()
}

pub fn parse(source: &str) -> Result<Vec<Node>> {
    let tokens = tokenize(source)?;
    Parser::new(&tokens, source.len()).template()
}

struct Parser<'t> {
    tokens: &'t [Token],
    position: usize,
    end: usize,
}

impl<'t> Parser<'t> {
    fn new(tokens: &'t [Token], end: usize) -> Self {
        Self {
            tokens,
            position: 0,
            end,
        }
    }

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.position)
    }
    fn next(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.position);
        self.position += 1;
        token
    }
    fn offset(&self) -> usize {
        self.peek().map(|t| t.offset).unwrap_or(self.end)
    }
    fn error(&self, message: impl Into<String>) -> CatalogError {
        CatalogError::Syntax {
            message: message.into(),
            offset: self.offset(),
        }
    }
    fn at(&self, kind: TokenKind) -> bool {
        self.peek().map(|t| t.kind == kind).unwrap_or(false)
    }

    fn template(mut self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        while let Some(token) = self.peek() {
            match token.kind {
                TokenKind::RawText => {
                    self.next();
                    nodes.push(Node::Raw(token.value.clone()));
                }
                TokenKind::OpenBrace => nodes.push(Node::Block(self.block()?)),
                TokenKind::CloseBrace => return Err(self.error("'}' without a matching '{'")),
                _ => return Err(self.error(format!("unexpected '{}'", token.value))),
            }
        }
        Ok(nodes)
    }

    fn block(&mut self) -> Result<Block> {
        self.next();
        let optional = self.at(TokenKind::Question);
        if optional {
            self.next();
        }
        if self.at(TokenKind::CloseBrace) {
            return Err(self.error("empty block"));
        }
        let mut chain = vec![self.expr()?];
        loop {
            match self.peek().map(|t| t.kind) {
                Some(TokenKind::Pipe) => {
                    self.next();
                    if self.at(TokenKind::CloseBrace) || self.at(TokenKind::Pipe) || self.peek().is_none() {
                        return Err(self.error("expected an expression after '|'"));
                    }
                    chain.push(self.expr()?);
                }
                Some(TokenKind::CloseBrace) => {
                    self.next();
                    return Ok(Block { optional, chain });
                }
                None => return Err(self.error("unterminated block")),
                Some(_) => return Err(self.error("expected '|' or '}'")),
            }
        }
    }

    fn expr(&mut self) -> Result<Expr> {
        let Some(token) = self.peek() else {
            return Err(self.error("unterminated block"));
        };
        match token.kind {
            TokenKind::String => {
                self.next();
                Ok(Expr::String(token.value.clone()))
            }
            TokenKind::Number => {
                let value = token
                    .value
                    .parse::<i64>()
                    .map_err(|_| self.error(format!("number '{}' is out of range", token.value)))?;
                self.next();
                Ok(Expr::Number(value))
            }
            TokenKind::Identifier => {
                self.next();
                if !self.at(TokenKind::OpenParen) {
                    return Ok(Expr::FunctionOrVariable(token.value.clone()));
                }
                self.next();
                let mut args = Vec::new();
                if self.at(TokenKind::CloseParen) {
                    self.next();
                    return Ok(Expr::Function {
                        name: token.value.clone(),
                        args,
                    });
                }
                loop {
                    args.push(self.expr()?);
                    match self.next().map(|t| t.kind) {
                        Some(TokenKind::Comma) => continue,
                        Some(TokenKind::CloseParen) => break,
                        _ => {
                            self.position -= 1;
                            return Err(self.error(format!("expected ',' or ')' in call to '{}'", token.value)));
                        }
                    }
                }
                Ok(Expr::Function {
                    name: token.value.clone(),
                    args,
                })
            }
            TokenKind::Greater => Err(self.error("'>' is reserved")),
            TokenKind::CloseBrace => Err(self.error("expected an expression")),
            TokenKind::OpenBrace => Err(self.error("unexpected '{' inside a block")),
            _ => Err(self.error(format!("unexpected '{}'", token.value))),
        }
    }
}
