//! Template tokenizer.
//!
//! Outside a block everything up to the next brace is one raw text token.
//! Inside a block whitespace is skipped and the punctuation, identifiers,
//! quoted strings and integers of the expression language are recognized.
//! The two modes are separate logos lexers, morphed into each other at the
//! braces.

use logos::{Lexer, Logos};

use crate::error::{CatalogError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    RawText,
    OpenBrace,
    CloseBrace,
    Pipe,
    OpenParen,
    CloseParen,
    Comma,
    Question,
    /// Reserved; the parser rejects it.
    Greater,
    Identifier,
    String,
    Number,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Raw text, identifier name, unescaped string content or number digits.
    pub value: String,
    /// Byte offset of the token start in the source.
    pub offset: usize,
}

impl Token {
    fn new(kind: TokenKind, value: impl Into<String>, offset: usize) -> Self {
        Self {
            kind,
            value: value.into(),
            offset,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub enum LexError {
    #[default]
    UnexpectedCharacter,
    UnterminatedString,
    InvalidEscape(char),
    DigitIdentifier,
}

impl LexError {
    fn at(self, slice: &str, offset: usize) -> CatalogError {
        let message = match self {
            LexError::UnexpectedCharacter => {
                format!("unexpected character '{}'", slice.chars().next().unwrap_or_default())
            }
            LexError::UnterminatedString => "unterminated string".to_string(),
            LexError::InvalidEscape(c) => format!("invalid escape sequence '\\{}'", c),
            LexError::DigitIdentifier => "identifier cannot start with a digit".to_string(),
        };
        CatalogError::Lexical { message, offset }
    }
}

#[derive(Logos, Debug, PartialEq)]
#[logos(error = LexError)]
enum Text {
    #[token("{")]
    OpenBrace,

    #[token("}")]
    CloseBrace,

    #[regex(r"[^{}]+")]
    Raw,
}

#[derive(Logos, Debug, PartialEq)]
#[logos(error = LexError)]
#[logos(skip r"\s+")]
enum Block {
    #[token("{")]
    OpenBrace,

    #[token("}")]
    CloseBrace,

    #[token("|")]
    Pipe,

    #[token("(")]
    OpenParen,

    #[token(")")]
    CloseParen,

    #[token(",")]
    Comma,

    #[token("?")]
    Question,

    #[token(">")]
    Greater,

    #[regex(r"[\p{Alphabetic}_.#][\p{Alphabetic}_.#0-9]*")]
    Identifier,

    // identifier characters glued to the digits are caught by the callback
    #[regex(r"[-+]?[0-9]+[\p{Alphabetic}_.#0-9]*", number)]
    Number(String),

    // an unterminated string still matches so the callback can report it
    #[regex(r#"'([^'\\]|\\.)*\\?'?"#, quoted)]
    #[regex(r#""([^"\\]|\\.)*\\?"?"#, quoted)]
    String(String),
}

fn number(lex: &mut Lexer<Block>) -> std::result::Result<String, LexError> {
    let slice = lex.slice();
    let digits = slice.strip_prefix('+').unwrap_or(slice);
    let unsigned = digits.strip_prefix('-').unwrap_or(digits);
    if unsigned.chars().all(|c| c.is_ascii_digit()) {
        Ok(digits.to_string())
    } else {
        Err(LexError::DigitIdentifier)
    }
}

fn quoted(lex: &mut Lexer<Block>) -> std::result::Result<String, LexError> {
    let mut chars = lex.slice().chars();
    let quote = chars.next().unwrap_or('\'');
    let mut text = String::new();
    while let Some(c) = chars.next() {
        if c == quote {
            return Ok(text);
        }
        if c == '\\' {
            let escaped = match chars.next() {
                Some('\\') => '\\',
                Some('\'') => '\'',
                Some('"') => '"',
                Some('n') => '\n',
                Some('r') => '\r',
                Some('t') => '\t',
                Some('b') => '\u{8}',
                Some(other) => return Err(LexError::InvalidEscape(other)),
                None => break,
            };
            text.push(escaped);
        } else {
            text.push(c);
        }
    }
    Err(LexError::UnterminatedString)
}

/// Raw text up to an opening brace. Returns whether a block was opened.
fn scan_text(text: &mut Lexer<Text>, tokens: &mut Vec<Token>) -> Result<bool> {
    while let Some(token) = text.next() {
        let offset = text.span().start;
        match token.map_err(|e| e.at(text.slice(), offset))? {
            Text::Raw => tokens.push(Token::new(TokenKind::RawText, text.slice(), offset)),
            Text::CloseBrace => tokens.push(Token::new(TokenKind::CloseBrace, "}", offset)),
            Text::OpenBrace => {
                tokens.push(Token::new(TokenKind::OpenBrace, "{", offset));
                return Ok(true);
            }
        }
    }
    Ok(false)
}

/// Block contents up to the closing brace. Returns whether the block was closed.
fn scan_block(block: &mut Lexer<Block>, tokens: &mut Vec<Token>) -> Result<bool> {
    while let Some(token) = block.next() {
        let offset = block.span().start;
        let (kind, value) = match token.map_err(|e| e.at(block.slice(), offset))? {
            Block::Identifier => (TokenKind::Identifier, block.slice().to_string()),
            Block::Number(digits) => (TokenKind::Number, digits),
            Block::String(text) => (TokenKind::String, text),
            Block::OpenBrace => (TokenKind::OpenBrace, "{".to_string()),
            Block::Pipe => (TokenKind::Pipe, "|".to_string()),
            Block::OpenParen => (TokenKind::OpenParen, "(".to_string()),
            Block::CloseParen => (TokenKind::CloseParen, ")".to_string()),
            Block::Comma => (TokenKind::Comma, ",".to_string()),
            Block::Question => (TokenKind::Question, "?".to_string()),
            Block::Greater => (TokenKind::Greater, ">".to_string()),
            Block::CloseBrace => {
                tokens.push(Token::new(TokenKind::CloseBrace, "}", offset));
                return Ok(true);
            }
        };
        tokens.push(Token::new(kind, value, offset));
    }
    Ok(false)
}

pub fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut text = Text::lexer(source);
    loop {
        if !scan_text(&mut text, &mut tokens)? {
            return Ok(tokens);
        }
        let mut block: Lexer<Block> = text.morph();
        if !scan_block(&mut block, &mut tokens)? {
            return Ok(tokens);
        }
        text = block.morph();
    }
}
