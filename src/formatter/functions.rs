//! Template functions: the trait user functions implement, the error they
//! report, and the built-in set.
//!
//! Used as a filter, a function receives the prior value of the chain as its
//! head. Built-ins see the head prepended to their arguments, so
//! `{x|pad_left(3, '0')}` and `{pad_left(x, 3, '0')}` make the same call.

use bigdecimal::{BigDecimal, RoundingMode};
use chrono::{Local, Utc};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use super::value::{format_date as strftime, Value};
use crate::construct::OtherHasher;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FunctionError {
    #[error("expected {expected} arguments, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("{0}")]
    InvalidArgument(String),
}

pub type FunctionResult = std::result::Result<Value, FunctionError>;

pub trait TemplateFunction {
    /// `head` is `None` for a bare call.
    fn call(&self, head: Option<&Value>, args: &[Value]) -> FunctionResult;
}

impl<F> TemplateFunction for F
where
    F: Fn(Option<&Value>, &[Value]) -> FunctionResult,
{
    fn call(&self, head: Option<&Value>, args: &[Value]) -> FunctionResult {
        self(head, args)
    }
}

/// The head value, if any, followed by the supplied arguments.
pub fn with_head(head: Option<&Value>, args: &[Value]) -> Vec<Value> {
    head.into_iter().chain(args).cloned().collect()
}

/// Fails unless at least `expected` arguments are present.
pub fn need(args: &[Value], expected: usize) -> Result<(), FunctionError> {
    if args.len() < expected {
        Err(FunctionError::Arity {
            expected,
            got: args.len(),
        })
    } else {
        Ok(())
    }
}

fn text(value: &Value) -> String {
    value.to_string()
}

fn number(value: &Value, what: &str) -> Result<f64, FunctionError> {
    value
        .as_number()
        .ok_or_else(|| FunctionError::InvalidArgument(format!("{} '{}' is not a number", what, value)))
}

const MAX_WIDTH: usize = 4096;
const MAX_DECIMALS: usize = 64;
const MAX_WORDS: usize = 1000;

/// A whole number no larger than `limit`.
fn count(value: &Value, what: &str, limit: usize) -> Result<usize, FunctionError> {
    let n = number(value, what)?;
    if n < 0.0 || n.fract() != 0.0 {
        return Err(FunctionError::InvalidArgument(format!("{} must be a whole number, got {}", what, value)));
    }
    if n > limit as f64 {
        return Err(FunctionError::InvalidArgument(format!("{} must not exceed {}, got {}", what, limit, value)));
    }
    Ok(n as usize)
}

// ------------- Built-ins -------------
pub type Builtin = fn(&[Value]) -> FunctionResult;

lazy_static! {
    static ref BUILTINS: HashMap<&'static str, Builtin, OtherHasher> = {
        let mut builtins: HashMap<&'static str, Builtin, OtherHasher> = HashMap::default();
        builtins.insert("lowercase", lowercase);
        builtins.insert("uppercase", uppercase);
        builtins.insert("trim", trim);
        builtins.insert("propercase", propercase);
        builtins.insert("def", def);
        builtins.insert("add", add);
        builtins.insert("sub", sub);
        builtins.insert("wrap", wrap);
        builtins.insert("list", list);
        builtins.insert("join", join);
        builtins.insert("now", now);
        builtins.insert("utc", utc);
        builtins.insert("format_date", format_date);
        builtins.insert("format_num", format_num);
        builtins.insert("pad_left", pad_left);
        builtins.insert("pad_right", pad_right);
        builtins.insert("_lorem", lorem);
        builtins
    };
    static ref DATE_TOKENS: Regex = Regex::new("YYYY|YY|MMMM|MMM|MM|M|DD|D|HH|H|mm|ss").unwrap();
}

/// Looks up a built-in by its lower-case name.
pub fn builtin(name: &str) -> Option<Builtin> {
    BUILTINS.get(name).copied()
}

pub fn builtin_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = BUILTINS.keys().copied().collect();
    names.sort_unstable();
    names
}

fn lowercase(args: &[Value]) -> FunctionResult {
    need(args, 1)?;
    Ok(text(&args[0]).to_lowercase().into())
}

fn uppercase(args: &[Value]) -> FunctionResult {
    need(args, 1)?;
    Ok(text(&args[0]).to_uppercase().into())
}

fn trim(args: &[Value]) -> FunctionResult {
    need(args, 1)?;
    Ok(text(&args[0]).trim().into())
}

fn propercase(args: &[Value]) -> FunctionResult {
    need(args, 1)?;
    let mut proper = String::new();
    let mut word_start = true;
    for c in text(&args[0]).chars() {
        if c.is_alphanumeric() {
            if word_start {
                proper.extend(c.to_uppercase());
            } else {
                proper.extend(c.to_lowercase());
            }
            word_start = false;
        } else {
            proper.push(c);
            word_start = c.is_whitespace() || c == '-';
        }
    }
    Ok(proper.into())
}

/// The value, or the fallback when the value is empty.
fn def(args: &[Value]) -> FunctionResult {
    need(args, 2)?;
    Ok(if args[0].is_empty() { args[1].clone() } else { args[0].clone() })
}

fn add(args: &[Value]) -> FunctionResult {
    need(args, 2)?;
    Ok(Value::Number(number(&args[0], "left operand")? + number(&args[1], "right operand")?))
}

fn sub(args: &[Value]) -> FunctionResult {
    need(args, 2)?;
    Ok(Value::Number(number(&args[0], "left operand")? - number(&args[1], "right operand")?))
}

/// Replaces every `@` in the pattern with the value.
fn wrap(args: &[Value]) -> FunctionResult {
    need(args, 2)?;
    Ok(text(&args[1]).replace('@', &text(&args[0])).into())
}

fn list(args: &[Value]) -> FunctionResult {
    Ok(Value::List(args.to_vec()))
}

fn join(args: &[Value]) -> FunctionResult {
    need(args, 1)?;
    let separator = args.get(1).map(text).unwrap_or_else(|| ", ".to_string());
    Ok(match &args[0] {
        Value::List(items) => items.iter().map(text).collect::<Vec<_>>().join(&separator).into(),
        other => text(other).into(),
    })
}

fn now(_: &[Value]) -> FunctionResult {
    Ok(Value::Date(Local::now().fixed_offset()))
}

/// The given date (or now) in UTC.
fn utc(args: &[Value]) -> FunctionResult {
    match args.first() {
        None => Ok(Value::Date(Utc::now().fixed_offset())),
        Some(value) => value
            .as_date()
            .map(|d| Value::Date(d.with_timezone(&Utc).fixed_offset()))
            .ok_or_else(|| FunctionError::InvalidArgument(format!("'{}' is not a date", value))),
    }
}

/// Accepts strftime patterns as well as `YYYY-MM-DD`-style tokens.
fn format_date(args: &[Value]) -> FunctionResult {
    need(args, 2)?;
    let date = args[0]
        .as_date()
        .ok_or_else(|| FunctionError::InvalidArgument(format!("'{}' is not a date", args[0])))?;
    let pattern = text(&args[1]);
    let pattern = if pattern.contains('%') {
        pattern
    } else {
        DATE_TOKENS
            .replace_all(&pattern, |caps: &Captures| {
                match &caps[0] {
                    "YYYY" => "%Y",
                    "YY" => "%y",
                    "MMMM" => "%B",
                    "MMM" => "%b",
                    "MM" => "%m",
                    "M" => "%-m",
                    "DD" => "%d",
                    "D" => "%-d",
                    "HH" => "%H",
                    "H" => "%-H",
                    "mm" => "%M",
                    _ => "%S",
                }
                .to_string()
            })
            .into_owned()
    };
    strftime(&date, &pattern)
        .map(Value::String)
        .ok_or_else(|| FunctionError::InvalidArgument(format!("'{}' is not a date pattern", pattern)))
}

/// Rounds half away from zero on the decimal representation.
fn format_num(args: &[Value]) -> FunctionResult {
    need(args, 2)?;
    let decimals = count(&args[1], "decimals", MAX_DECIMALS)? as i64;
    let digits = match &args[0] {
        Value::String(s) => s.trim().to_string(),
        other => text(&Value::Number(number(other, "value")?)),
    };
    let decimal = BigDecimal::from_str(&digits)
        .map_err(|_| FunctionError::InvalidArgument(format!("'{}' is not a number", digits)))?;
    Ok(decimal.with_scale_round(decimals, RoundingMode::HalfUp).to_string().into())
}

fn pad(args: &[Value], left: bool) -> FunctionResult {
    need(args, 2)?;
    let value = text(&args[0]);
    let width = count(&args[1], "width", MAX_WIDTH)?;
    let fill = match args.get(2).map(text) {
        None => ' ',
        Some(fill) => fill
            .chars()
            .next()
            .ok_or_else(|| FunctionError::InvalidArgument("fill must not be empty".into()))?,
    };
    let missing = width.saturating_sub(value.chars().count());
    let padding: String = std::iter::repeat_n(fill, missing).collect();
    Ok(if left { padding + &value } else { value + &padding }.into())
}

fn pad_left(args: &[Value]) -> FunctionResult {
    pad(args, true)
}

fn pad_right(args: &[Value]) -> FunctionResult {
    pad(args, false)
}

const LOREM: &[&str] = &[
    "lorem", "ipsum", "dolor", "sit", "amet", "consectetur", "adipiscing", "elit", "sed", "do", "eiusmod",
    "tempor", "incididunt", "ut", "labore", "et", "dolore", "magna", "aliqua",
];

/// Placeholder text of the given number of words.
fn lorem(args: &[Value]) -> FunctionResult {
    let words = match args.last() {
        Some(value) => count(value, "words", MAX_WORDS)?,
        None => 8,
    };
    Ok(LOREM.iter().cycle().take(words).copied().collect::<Vec<_>>().join(" ").into())
}
